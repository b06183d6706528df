/*!

  The totally ordered complexity lattice:

  `Unknown < Const < Poly(1) < Poly(2) < … < Exp < Unbounded < Nonterm`

  Complexities over-approximate asymptotic growth and support addition,
  multiplication and integer exponentiation, matching the corresponding
  operations on cost expressions.

*/

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Complexity {
  /// Nothing is known; bottom element.
  Unknown,
  /// Constant runtime, `Omega(1)`.
  Const,
  /// Polynomial runtime of the given degree (degree >= 1).
  Poly(u32),
  /// Exponential runtime.
  Exp,
  /// Unbounded runtime witnessed by an unrestricted temporary variable.
  Unbounded,
  /// Non-terminating run with positive cost; top element.
  Nonterm,
}

impl Complexity {
  /// Rank in the total order; polynomial ranks encode the degree.
  fn rank(&self) -> (u8, u32) {
    match self {
      Complexity::Unknown   => (0, 0),
      Complexity::Const     => (1, 0),
      Complexity::Poly(d)   => (2, *d),
      Complexity::Exp       => (3, 0),
      Complexity::Unbounded => (4, 0),
      Complexity::Nonterm   => (5, 0),
    }
  }

  /// Builds a polynomial complexity, mapping degree 0 to `Const`.
  pub fn poly(degree: u32) -> Complexity {
    if degree == 0 {
      Complexity::Const
    } else {
      Complexity::Poly(degree)
    }
  }

  pub fn is_unknown(&self) -> bool {
    *self == Complexity::Unknown
  }

  /// The WST-style answer line for this complexity.
  pub fn to_wst_string(&self) -> String {
    match self {
      Complexity::Unknown   => "MAYBE".to_string(),
      Complexity::Const     => "WORST_CASE(Omega(1),?)".to_string(),
      Complexity::Poly(d)   => format!("WORST_CASE(Omega(n^{}),?)", d),
      Complexity::Exp       => "WORST_CASE(Omega(EXP),?)".to_string(),
      Complexity::Unbounded => "WORST_CASE(INF,?)".to_string(),
      Complexity::Nonterm   => "WORST_CASE(NON_TERM,?)".to_string(),
    }
  }

  /// Over-approximation of the complexity of a sum.
  pub fn add(self, other: Complexity) -> Complexity {
    // `Unknown` poisons the estimate: an unclassified summand may dominate.
    if self == Complexity::Unknown || other == Complexity::Unknown {
      return Complexity::Unknown;
    }
    self.max(other)
  }

  /// Over-approximation of the complexity of a product.
  pub fn mul(self, other: Complexity) -> Complexity {
    if self == Complexity::Unknown || other == Complexity::Unknown {
      return Complexity::Unknown;
    }
    match (self, other) {
      (Complexity::Poly(a), Complexity::Poly(b)) => Complexity::Poly(a + b),
      _                                          => self.max(other),
    }
  }

  /// Over-approximation of the complexity of an integer power.
  pub fn pow(self, exponent: u32) -> Complexity {
    if exponent == 0 {
      return Complexity::Const;
    }
    match self {
      Complexity::Poly(d) => Complexity::Poly(d * exponent),
      other               => other,
    }
  }
}

impl PartialOrd for Complexity {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Complexity {
  fn cmp(&self, other: &Self) -> Ordering {
    self.rank().cmp(&other.rank())
  }
}

impl Display for Complexity {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Complexity::Unknown   => write!(f, "?"),
      Complexity::Const     => write!(f, "Omega(1)"),
      Complexity::Poly(d)   => write!(f, "Omega(n^{})", d),
      Complexity::Exp       => write!(f, "Omega(EXP)"),
      Complexity::Unbounded => write!(f, "INF"),
      Complexity::Nonterm   => write!(f, "NONTERM"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn total_order() {
    let chain = [
      Complexity::Unknown,
      Complexity::Const,
      Complexity::Poly(1),
      Complexity::Poly(2),
      Complexity::Exp,
      Complexity::Unbounded,
      Complexity::Nonterm,
    ];
    for window in chain.windows(2) {
      assert!(window[0] < window[1]);
    }
  }

  #[test]
  fn arithmetic() {
    assert_eq!(Complexity::Poly(1).add(Complexity::Poly(2)), Complexity::Poly(2));
    assert_eq!(Complexity::Poly(1).mul(Complexity::Poly(2)), Complexity::Poly(3));
    assert_eq!(Complexity::Const.mul(Complexity::Poly(2)), Complexity::Poly(2));
    assert_eq!(Complexity::Poly(2).pow(3), Complexity::Poly(6));
    assert_eq!(Complexity::Exp.mul(Complexity::Poly(4)), Complexity::Exp);
    assert_eq!(Complexity::Unknown.add(Complexity::Exp), Complexity::Unknown);
    assert_eq!(Complexity::Nonterm.add(Complexity::Poly(1)), Complexity::Nonterm);
  }

  #[test]
  fn poly_zero_is_const() {
    assert_eq!(Complexity::poly(0), Complexity::Const);
    assert_eq!(Complexity::Poly(2).pow(0), Complexity::Const);
  }
}
