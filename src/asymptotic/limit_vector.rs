/*!

  Limit vectors: 2-tuples of directions that decompose an addition,
  multiplication or division into two sub-limit-problems while preserving
  the direction of the whole expression. The tables list exactly the
  compatible combinations.

*/

use std::fmt::{Display, Formatter};

use num_traits::Signed;

use crate::expr::Expr;

/// The direction a (sub-)expression is driven into. `Pos` means "positive,
/// possibly bounded" and is refined to `PosInf` or `PosCons` during the
/// search.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Direction {
  Pos,
  PosInf,
  NegInf,
  PosCons,
  NegCons,
}

impl Display for Direction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Direction::Pos     => "+/+!",
      Direction::PosInf  => "+",
      Direction::NegInf  => "-",
      Direction::PosCons => "+!",
      Direction::NegCons => "-!",
    };
    write!(f, "{}", name)
  }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct LimitVector {
  kind  : Direction,
  first : Direction,
  second: Direction,
}

const fn lv(kind: Direction, first: Direction, second: Direction) -> LimitVector {
  LimitVector { kind, first, second }
}

use Direction::{NegCons, NegInf, PosCons, PosInf};

pub const ADDITION: [LimitVector; 12] = [
  // increasing limit vectors
  lv(PosInf, PosInf, PosInf),
  lv(PosInf, PosInf, PosCons),
  lv(PosInf, PosCons, PosInf),
  lv(PosInf, PosInf, NegCons),
  lv(PosInf, NegCons, PosInf),
  // decreasing limit vectors
  lv(NegInf, NegInf, NegInf),
  lv(NegInf, NegInf, NegCons),
  lv(NegInf, NegCons, NegInf),
  lv(NegInf, NegInf, PosCons),
  lv(NegInf, PosCons, NegInf),
  // positive limit vectors
  lv(PosCons, PosCons, PosCons),
  // negative limit vectors
  lv(NegCons, NegCons, NegCons),
];

pub const MULTIPLICATION: [LimitVector; 16] = [
  // increasing limit vectors
  lv(PosInf, PosInf, PosInf),
  lv(PosInf, PosInf, PosCons),
  lv(PosInf, PosCons, PosInf),
  lv(PosInf, NegInf, NegInf),
  lv(PosInf, NegInf, NegCons),
  lv(PosInf, NegCons, NegInf),
  // decreasing limit vectors
  lv(NegInf, NegInf, PosInf),
  lv(NegInf, PosInf, NegInf),
  lv(NegInf, NegInf, PosCons),
  lv(NegInf, PosCons, NegInf),
  lv(NegInf, PosInf, NegCons),
  lv(NegInf, NegCons, PosInf),
  // positive limit vectors
  lv(PosCons, PosCons, PosCons),
  lv(PosCons, NegCons, NegCons),
  // negative limit vectors
  lv(NegCons, PosCons, NegCons),
  lv(NegCons, NegCons, PosCons),
];

pub const DIVISION: [LimitVector; 8] = [
  // increasing limit vectors
  lv(PosInf, PosInf, PosCons),
  lv(PosInf, NegInf, NegCons),
  // decreasing limit vectors
  lv(NegInf, NegInf, PosCons),
  lv(NegInf, PosInf, NegCons),
  // positive limit vectors
  lv(PosCons, PosCons, PosCons),
  lv(PosCons, NegCons, NegCons),
  // negative limit vectors
  lv(NegCons, NegCons, PosCons),
  lv(NegCons, PosCons, NegCons),
];

impl LimitVector {
  pub fn kind(&self) -> Direction {
    self.kind
  }

  pub fn first(&self) -> Direction {
    self.first
  }

  pub fn second(&self) -> Direction {
    self.second
  }

  /// Applicable iff `dir` matches the kind, or `dir` is `Pos` and the kind
  /// is increasing or positive.
  pub fn is_applicable(&self, dir: Direction) -> bool {
    dir == self.kind
        || (dir == Direction::Pos
            && (self.kind == Direction::PosInf || self.kind == Direction::PosCons))
  }

  /// Rules out combinations that are trivially unsolvable for the given
  /// operand expressions.
  pub fn makes_sense(&self, l: &Expr, r: &Expr) -> bool {
    if trivially_unsatisfiable(l, self.first) || trivially_unsatisfiable(r, self.second) {
      return false;
    }
    if l == r && self.first != self.second {
      return false;
    }
    // even powers cannot be driven negative
    if is_negative(self.first) && is_even_power(l) {
      return false;
    }
    if is_negative(self.second) && is_even_power(r) {
      return false;
    }
    true
  }
}

fn is_negative(dir: Direction) -> bool {
  dir == Direction::NegCons || dir == Direction::NegInf
}

fn is_even_power(expr: &Expr) -> bool {
  if let Expr::Pow(_, exponent) = expr {
    if let Some(k) = exponent.as_number() {
      return k.is_integer() && (k.to_integer() % 2) == num_bigint::BigInt::from(0);
    }
  }
  false
}

/// A constant cannot tend to infinity, and a constant of the wrong sign
/// cannot satisfy a sign direction.
pub fn trivially_unsatisfiable(expr: &Expr, dir: Direction) -> bool {
  match expr.as_number() {
    Some(value) => match dir {
      Direction::PosInf | Direction::NegInf => true,
      Direction::Pos | Direction::PosCons   => !value.is_positive(),
      Direction::NegCons                    => !value.is_negative(),
    },
    None        => false,
  }
}

/// The table entries applicable to an expression with the given direction.
pub fn applicable(table: &[LimitVector], dir: Direction) -> Vec<LimitVector> {
  table.iter().filter(|lv| lv.is_applicable(dir)).copied().collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn applicability() {
    let increasing = lv(PosInf, PosInf, PosCons);
    assert!(increasing.is_applicable(Direction::PosInf));
    assert!(increasing.is_applicable(Direction::Pos));
    assert!(!increasing.is_applicable(Direction::NegInf));

    let negative = lv(NegCons, NegCons, NegCons);
    assert!(negative.is_applicable(Direction::NegCons));
    assert!(!negative.is_applicable(Direction::Pos));
  }

  #[test]
  fn sense_checks() {
    let vector = lv(PosInf, PosInf, PosCons);
    // a constant cannot tend to infinity
    assert!(!vector.makes_sense(&Expr::int(5), &Expr::int(1)));
    assert!(vector.makes_sense(&Expr::var(0), &Expr::int(1)));
    // equal operands need equal directions
    let mixed = lv(PosInf, PosInf, PosCons);
    assert!(!mixed.makes_sense(&Expr::var(0), &Expr::var(0)));
  }
}
