/*!

  `Expr` is a symbolic arithmetic term over variables and rational constants,
  closed under addition, multiplication and integer powers, plus a
  distinguished `Nonterm` sentinel that is only meaningful inside cost
  expressions. Expressions are immutable values in canonical form: sums and
  products are flattened, sorted and constant-folded by the smart
  constructors, so structural equality is equality up to canonical form.

*/

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::complexity::Complexity;
use crate::expr::Substitution;
use crate::{Numeric, VariableIdx};

/// The largest integer exponent that `expand` multiplies out.
const MAX_EXPAND_EXPONENT: u32 = 16;

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Expr {
  /// A rational constant.
  Number(Numeric),
  /// A variable, identified by its index in the variable manager.
  Var(VariableIdx),
  /// Sentinel for non-terminating cost. Only valid inside cost expressions.
  Nonterm,
  Add(Vec<Expr>),
  Mul(Vec<Expr>),
  Pow(Box<Expr>, Box<Expr>),
}

// region Construction

impl Expr {
  pub fn int(value: i64) -> Expr {
    Expr::Number(Numeric::from_integer(BigInt::from(value)))
  }

  pub fn num(value: Numeric) -> Expr {
    Expr::Number(value)
  }

  pub fn var(index: VariableIdx) -> Expr {
    Expr::Var(index)
  }

  pub fn zero() -> Expr {
    Expr::int(0)
  }

  pub fn one() -> Expr {
    Expr::int(1)
  }

  /// Builds a sum in canonical form: nested sums are flattened, constants are
  /// folded, zero summands are dropped and the summands are sorted.
  pub fn add_terms(terms: Vec<Expr>) -> Expr {
    let mut constant = Numeric::zero();
    let mut rest: Vec<Expr> = Vec::new();

    for term in terms {
      match term {
        Expr::Number(n)   => constant += n,
        Expr::Add(inner)  => {
          for sub in inner {
            match sub {
              Expr::Number(n) => constant += n,
              other           => rest.push(other),
            }
          }
        }
        other             => rest.push(other),
      }
    }

    if !constant.is_zero() || rest.is_empty() {
      rest.push(Expr::Number(constant));
    }
    rest.sort();

    if rest.len() == 1 {
      rest.pop().unwrap()
    } else {
      Expr::Add(rest)
    }
  }

  /// Builds a product in canonical form; a zero factor collapses the product.
  pub fn mul_factors(factors: Vec<Expr>) -> Expr {
    let mut constant = Numeric::one();
    let mut rest: Vec<Expr> = Vec::new();

    for factor in factors {
      match factor {
        Expr::Number(n)  => constant *= n,
        Expr::Mul(inner) => {
          for sub in inner {
            match sub {
              Expr::Number(n) => constant *= n,
              other           => rest.push(other),
            }
          }
        }
        other            => rest.push(other),
      }
    }

    if constant.is_zero() {
      return Expr::zero();
    }
    if !constant.is_one() || rest.is_empty() {
      rest.push(Expr::Number(constant));
    }
    rest.sort();

    if rest.len() == 1 {
      rest.pop().unwrap()
    } else {
      Expr::Mul(rest)
    }
  }

  /// Builds a power, evaluating constant bases with small integer exponents.
  pub fn pow(base: Expr, exponent: Expr) -> Expr {
    if let Expr::Number(e) = &exponent {
      if e.is_zero() {
        return Expr::one();
      }
      if e.is_one() {
        return base;
      }
      if e.is_integer() {
        if let Expr::Number(b) = &base {
          if let Some(k) = e.to_integer().to_i64() {
            if k.unsigned_abs() <= MAX_EXPAND_EXPONENT as u64 && !(b.is_zero() && k < 0) {
              return Expr::Number(numeric_pow(b, k));
            }
          }
        }
      }
    }
    Expr::Pow(Box::new(base), Box::new(exponent))
  }
}

/// `base^k` for integer `k`; `k < 0` inverts (the base must be nonzero).
pub fn numeric_pow(base: &Numeric, k: i64) -> Numeric {
  let mut result = Numeric::one();
  for _ in 0..k.unsigned_abs() {
    result *= base.clone();
  }
  if k < 0 {
    result = result.recip();
  }
  result
}

impl std::ops::Add for Expr {
  type Output = Expr;

  fn add(self, other: Expr) -> Expr {
    Expr::add_terms(vec![self, other])
  }
}

impl std::ops::Sub for Expr {
  type Output = Expr;

  fn sub(self, other: Expr) -> Expr {
    Expr::add_terms(vec![self, -other])
  }
}

impl std::ops::Mul for Expr {
  type Output = Expr;

  fn mul(self, other: Expr) -> Expr {
    Expr::mul_factors(vec![self, other])
  }
}

impl std::ops::Neg for Expr {
  type Output = Expr;

  fn neg(self) -> Expr {
    Expr::mul_factors(vec![Expr::int(-1), self])
  }
}

// endregion

// region Queries

impl Expr {
  pub fn is_zero(&self) -> bool {
    matches!(self, Expr::Number(n) if n.is_zero())
  }

  pub fn is_one(&self) -> bool {
    matches!(self, Expr::Number(n) if n.is_one())
  }

  pub fn as_number(&self) -> Option<&Numeric> {
    match self {
      Expr::Number(n) => Some(n),
      _               => None,
    }
  }

  pub fn as_var(&self) -> Option<VariableIdx> {
    match self {
      Expr::Var(v) => Some(*v),
      _            => None,
    }
  }

  pub fn is_var(&self) -> bool {
    matches!(self, Expr::Var(_))
  }

  /// Syntactic check for the non-termination sentinel.
  pub fn is_nonterm(&self) -> bool {
    matches!(self, Expr::Nonterm)
  }

  /// True iff the sentinel occurs anywhere in this expression.
  pub fn has_nonterm(&self) -> bool {
    match self {
      Expr::Nonterm     => true,
      Expr::Number(_)   => false,
      Expr::Var(_)      => false,
      Expr::Add(terms)  => terms.iter().any(Expr::has_nonterm),
      Expr::Mul(terms)  => terms.iter().any(Expr::has_nonterm),
      Expr::Pow(b, e)   => b.has_nonterm() || e.has_nonterm(),
    }
  }

  pub fn is_integer_constant(&self) -> bool {
    matches!(self, Expr::Number(n) if n.is_integer())
  }

  pub fn is_rational_constant(&self) -> bool {
    matches!(self, Expr::Number(_))
  }

  /// A rational number that is not an integer.
  pub fn is_proper_rational(&self) -> bool {
    matches!(self, Expr::Number(n) if !n.is_integer())
  }

  /// Of the form `e^k` for a natural `k >= 2`.
  pub fn is_proper_natural_power(&self) -> bool {
    if let Expr::Pow(_, exponent) = self {
      if let Expr::Number(k) = exponent.as_ref() {
        return k.is_integer() && *k >= Numeric::from_integer(BigInt::from(2));
      }
    }
    false
  }

  pub fn collect_variables(&self, result: &mut BTreeSet<VariableIdx>) {
    match self {
      Expr::Var(v)     => {
        result.insert(*v);
      }
      Expr::Add(terms) | Expr::Mul(terms) => {
        for term in terms {
          term.collect_variables(result);
        }
      }
      Expr::Pow(b, e)  => {
        b.collect_variables(result);
        e.collect_variables(result);
      }
      _                => {}
    }
  }

  pub fn variables(&self) -> BTreeSet<VariableIdx> {
    let mut result = BTreeSet::new();
    self.collect_variables(&mut result);
    result
  }

  pub fn has_variable_with<P: Fn(VariableIdx) -> bool + Copy>(&self, predicate: P) -> bool {
    match self {
      Expr::Var(v)     => predicate(*v),
      Expr::Add(terms) | Expr::Mul(terms) => terms.iter().any(|t| t.has_variable_with(predicate)),
      Expr::Pow(b, e)  => b.has_variable_with(predicate) || e.has_variable_with(predicate),
      _                => false,
    }
  }

  pub fn contains_var(&self, var: VariableIdx) -> bool {
    self.has_variable_with(|v| v == var)
  }

  pub fn has_no_variables(&self) -> bool {
    !self.has_variable_with(|_| true)
  }

  pub fn has_exactly_one_variable(&self) -> bool {
    let vars = self.variables();
    vars.len() == 1
  }

  pub fn has_at_most_one_variable(&self) -> bool {
    self.variables().len() <= 1
  }

  pub fn has_at_least_two_variables(&self) -> bool {
    self.variables().len() >= 2
  }

  pub fn get_a_variable(&self) -> Option<VariableIdx> {
    self.variables().into_iter().next()
  }
}

// endregion

// region Substitution and structural replacement

impl Expr {
  /// Applies a variable substitution. All captured names are tracked program
  /// variables, so the substitution is capture-free by construction.
  pub fn subs(&self, sigma: &Substitution) -> Expr {
    if sigma.is_empty() {
      return self.clone();
    }
    match self {
      Expr::Var(v)     => sigma.get(*v).cloned().unwrap_or_else(|| self.clone()),
      Expr::Add(terms) => Expr::add_terms(terms.iter().map(|t| t.subs(sigma)).collect()),
      Expr::Mul(terms) => Expr::mul_factors(terms.iter().map(|t| t.subs(sigma)).collect()),
      Expr::Pow(b, e)  => Expr::pow(b.subs(sigma), e.subs(sigma)),
      other            => other.clone(),
    }
  }

  /// Structural replacement: every subterm equal to `pattern` becomes
  /// `replacement`. This covers the nonlinear case (`x^2 := y`).
  pub fn replace(&self, pattern: &Expr, replacement: &Expr) -> Expr {
    if self == pattern {
      return replacement.clone();
    }
    match self {
      Expr::Add(terms) => {
        Expr::add_terms(terms.iter().map(|t| t.replace(pattern, replacement)).collect())
      }
      Expr::Mul(terms) => {
        Expr::mul_factors(terms.iter().map(|t| t.replace(pattern, replacement)).collect())
      }
      Expr::Pow(b, e)  => {
        Expr::pow(b.replace(pattern, replacement), e.replace(pattern, replacement))
      }
      other            => other.clone(),
    }
  }

  /// Collects all subterms that are powers (used for exponential detection).
  pub fn collect_powers(&self, found: &mut Vec<Expr>) {
    match self {
      Expr::Pow(b, e)  => {
        found.push(self.clone());
        b.collect_powers(found);
        e.collect_powers(found);
      }
      Expr::Add(terms) | Expr::Mul(terms) => {
        for term in terms {
          term.collect_powers(found);
        }
      }
      _                => {}
    }
  }
}

// endregion

// region Polynomial view

/// A monomial maps irreducible atoms (variables or opaque powers) to their
/// positive integer exponents; the empty monomial is the constant one.
type Monomial = BTreeMap<Expr, u32>;

/// Sparse multivariate polynomial over `Monomial`s, the workhorse behind
/// `expand`, `degree` and `coeff`.
#[derive(Clone, Debug, Default)]
pub(crate) struct PolynomialView {
  terms: BTreeMap<Monomial, Numeric>,
}

impl PolynomialView {
  fn constant(value: Numeric) -> PolynomialView {
    let mut terms = BTreeMap::new();
    if !value.is_zero() {
      terms.insert(Monomial::new(), value);
    }
    PolynomialView { terms }
  }

  fn atom(atom: Expr) -> PolynomialView {
    let mut monomial = Monomial::new();
    monomial.insert(atom, 1);
    let mut terms = BTreeMap::new();
    terms.insert(monomial, Numeric::one());
    PolynomialView { terms }
  }

  fn add(mut self, other: PolynomialView) -> PolynomialView {
    for (monomial, coefficient) in other.terms {
      let entry = self.terms.entry(monomial).or_insert_with(Numeric::zero);
      *entry += coefficient;
    }
    self.terms.retain(|_, c| !c.is_zero());
    self
  }

  fn mul(&self, other: &PolynomialView) -> PolynomialView {
    let mut result: BTreeMap<Monomial, Numeric> = BTreeMap::new();
    for (m1, c1) in &self.terms {
      for (m2, c2) in &other.terms {
        let mut monomial = m1.clone();
        for (atom, exp) in m2 {
          *monomial.entry(atom.clone()).or_insert(0) += exp;
        }
        let entry = result.entry(monomial).or_insert_with(Numeric::zero);
        *entry += c1 * c2;
      }
    }
    result.retain(|_, c| !c.is_zero());
    PolynomialView { terms: result }
  }

  fn pow(&self, exponent: u32) -> PolynomialView {
    let mut result = PolynomialView::constant(Numeric::one());
    for _ in 0..exponent {
      result = result.mul(self);
    }
    result
  }

  fn to_expr(&self) -> Expr {
    let mut summands = Vec::with_capacity(self.terms.len());
    for (monomial, coefficient) in &self.terms {
      let mut factors = vec![Expr::Number(coefficient.clone())];
      for (atom, exp) in monomial {
        factors.push(Expr::pow(atom.clone(), Expr::int(*exp as i64)));
      }
      summands.push(Expr::mul_factors(factors));
    }
    Expr::add_terms(summands)
  }
}

impl Expr {
  pub(crate) fn polynomial_view(&self) -> PolynomialView {
    match self {
      Expr::Number(n)  => PolynomialView::constant(n.clone()),
      Expr::Var(_) | Expr::Nonterm => PolynomialView::atom(self.clone()),
      Expr::Add(terms) => {
        let mut result = PolynomialView::default();
        for term in terms {
          result = result.add(term.polynomial_view());
        }
        result
      }
      Expr::Mul(terms) => {
        let mut result = PolynomialView::constant(Numeric::one());
        for term in terms {
          result = result.mul(&term.polynomial_view());
        }
        result
      }
      Expr::Pow(base, exponent) => {
        if let Expr::Number(e) = exponent.as_ref() {
          if e.is_integer() && e.is_positive() {
            if let Some(k) = e.to_integer().to_u32() {
              if k <= MAX_EXPAND_EXPONENT {
                return base.polynomial_view().pow(k);
              }
            }
          }
        }
        // Irreducible: normalise base and exponent, keep the power opaque.
        PolynomialView::atom(Expr::pow(base.expand(), exponent.expand()))
      }
    }
  }

  /// Multiplies out products and integer powers and combines like monomials.
  pub fn expand(&self) -> Expr {
    self.polynomial_view().to_expr()
  }

  /// True iff the expression is a polynomial over its variables (no opaque
  /// powers, no sentinel).
  pub fn is_polynomial(&self) -> bool {
    self
        .polynomial_view()
        .terms
        .keys()
        .all(|monomial| monomial.keys().all(Expr::is_var))
  }

  /// True iff the expression is polynomial in the given variable: the
  /// variable does not occur inside any opaque atom.
  pub fn is_polynomial_in(&self, var: VariableIdx) -> bool {
    self.polynomial_view().terms.keys().all(|monomial| {
      monomial
          .keys()
          .all(|atom| atom.as_var() == Some(var) || !atom.contains_var(var))
    })
  }

  /// The degree of `var` in this expression. Only meaningful when
  /// `is_polynomial_in(var)` holds.
  pub fn degree(&self, var: VariableIdx) -> u32 {
    let key = Expr::Var(var);
    self
        .polynomial_view()
        .terms
        .keys()
        .map(|monomial| monomial.get(&key).copied().unwrap_or(0))
        .max()
        .unwrap_or(0)
  }

  /// The coefficient of `var^degree`, i.e., the sum of all monomials with
  /// exactly that power of `var`, with the power removed.
  pub fn coeff(&self, var: VariableIdx, degree: u32) -> Expr {
    let key = Expr::Var(var);
    let view = self.polynomial_view();
    let mut summands = Vec::new();
    for (monomial, coefficient) in &view.terms {
      if monomial.get(&key).copied().unwrap_or(0) == degree {
        let mut factors = vec![Expr::Number(coefficient.clone())];
        for (atom, exp) in monomial {
          if atom != &key {
            factors.push(Expr::pow(atom.clone(), Expr::int(*exp as i64)));
          }
        }
        summands.push(Expr::mul_factors(factors));
      }
    }
    Expr::add_terms(summands)
  }

  /// The highest total degree of any monomial. Only meaningful for
  /// polynomial expressions.
  pub fn max_degree(&self) -> u32 {
    self
        .polynomial_view()
        .terms
        .keys()
        .map(|monomial| monomial.values().sum::<u32>())
        .max()
        .unwrap_or(0)
  }

  /// True iff the expression is linear in the given variables (all variables
  /// if `None`). `x*y` is not linear even though each variable has degree 1.
  pub fn is_linear(&self, vars: Option<&BTreeSet<VariableIdx>>) -> bool {
    let all_vars;
    let considered = match vars {
      Some(set) => set,
      None      => {
        all_vars = self.variables();
        &all_vars
      }
    };
    for monomial in self.polynomial_view().terms.keys() {
      let mut considered_degree = 0;
      for (atom, exp) in monomial {
        match atom.as_var() {
          Some(v) if considered.contains(&v) => considered_degree += exp,
          Some(_)                            => {}
          None                               => {
            if atom.has_variable_with(|v| considered.contains(&v)) {
              return false;
            }
          }
        }
      }
      if considered_degree > 1 {
        return false;
      }
    }
    true
  }

  /// Splits this expression into numerator and denominator. Only products
  /// with negative-exponent powers have a nontrivial denominator.
  pub fn numer_denom(&self) -> (Expr, Expr) {
    match self {
      Expr::Number(n)  => (
        Expr::Number(Numeric::from_integer(n.numer().clone())),
        Expr::Number(Numeric::from_integer(n.denom().clone())),
      ),
      Expr::Mul(terms) => {
        let mut numer = Vec::new();
        let mut denom = Vec::new();
        for term in terms {
          match term {
            Expr::Pow(b, e) if is_negative_integer(e) => {
              let inverted = Expr::Number(-e.as_number().unwrap().clone());
              denom.push(Expr::pow(b.as_ref().clone(), inverted));
            }
            Expr::Number(n) if !n.is_integer() => {
              numer.push(Expr::Number(Numeric::from_integer(n.numer().clone())));
              denom.push(Expr::Number(Numeric::from_integer(n.denom().clone())));
            }
            other => numer.push(other.clone()),
          }
        }
        (Expr::mul_factors(numer), Expr::mul_factors(denom))
      }
      Expr::Pow(b, e) if is_negative_integer(e) => {
        let inverted = Expr::Number(-e.as_number().unwrap().clone());
        (Expr::one(), Expr::pow(b.as_ref().clone(), inverted))
      }
      other            => (other.clone(), Expr::one()),
    }
  }
}

fn is_negative_integer(e: &Expr) -> bool {
  matches!(e, Expr::Number(n) if n.is_integer() && n.is_negative())
}

// endregion

// region Complexity estimation

impl Expr {
  /// Syntactic over-approximation of the asymptotic growth of this
  /// expression as its variables tend to infinity. Shapes that cannot be
  /// classified yield `Unknown`.
  pub fn complexity(&self) -> Complexity {
    if self.is_nonterm() {
      return Complexity::Nonterm;
    }
    complexity_of(&self.expand())
  }
}

fn complexity_of(term: &Expr) -> Complexity {
  match term {
    // Both positive and negative constants count as `Const`: the estimate
    // over-approximates, e.g. `a - b` is `Omega(n)`.
    Expr::Number(_)  => Complexity::Const,
    Expr::Nonterm    => Complexity::Nonterm,
    Expr::Var(_)     => Complexity::Poly(1),
    Expr::Add(terms) => {
      terms
          .iter()
          .map(complexity_of)
          .fold(Complexity::Const, Complexity::add)
    }
    Expr::Mul(terms) => {
      terms
          .iter()
          .map(complexity_of)
          .fold(Complexity::Const, Complexity::mul)
    }
    Expr::Pow(base, exponent) => {
      if complexity_of(exponent) > Complexity::Const {
        // Non-constant exponent: exponential unless the base is degenerate.
        let degenerate = base.is_zero()
            || base.is_one()
            || **base == Expr::int(-1);
        if degenerate {
          Complexity::Const
        } else {
          Complexity::Exp
        }
      } else {
        match exponent.as_number() {
          Some(k) if k.is_integer() && !k.is_negative() => {
            match k.to_integer().to_u32() {
              Some(k) => complexity_of(base).pow(k),
              None    => Complexity::Unknown,
            }
          }
          _ => Complexity::Unknown,
        }
      }
    }
  }
}

// endregion

// region Display

impl Expr {
  fn write_prec(&self, f: &mut Formatter<'_>, parent_prec: u8) -> std::fmt::Result {
    let prec = match self {
      Expr::Add(_)    => 1,
      Expr::Mul(_)    => 2,
      Expr::Pow(_, _) => 3,
      _               => 4,
    };
    let parens = prec < parent_prec
        || matches!(self, Expr::Number(n) if n.is_negative() && parent_prec > 1);
    if parens {
      write!(f, "(")?;
    }
    match self {
      Expr::Number(n) => {
        if n.is_integer() {
          write!(f, "{}", n.numer())?;
        } else {
          write!(f, "{}/{}", n.numer(), n.denom())?;
        }
      }
      Expr::Var(v)    => write!(f, "x{}", v)?,
      Expr::Nonterm   => write!(f, "NONTERM")?,
      Expr::Add(terms) => {
        for (i, term) in terms.iter().enumerate() {
          if i > 0 {
            write!(f, "+")?;
          }
          term.write_prec(f, 1)?;
        }
      }
      Expr::Mul(terms) => {
        for (i, term) in terms.iter().enumerate() {
          if i > 0 {
            write!(f, "*")?;
          }
          term.write_prec(f, 2)?;
        }
      }
      Expr::Pow(b, e) => {
        b.write_prec(f, 4)?;
        write!(f, "^")?;
        e.write_prec(f, 4)?;
      }
    }
    if parens {
      write!(f, ")")?;
    }
    Ok(())
  }
}

impl Display for Expr {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    self.write_prec(f, 0)
  }
}

// endregion

#[cfg(test)]
mod tests {
  use super::*;

  fn x() -> Expr {
    Expr::var(0)
  }

  fn y() -> Expr {
    Expr::var(1)
  }

  #[test]
  fn canonical_form() {
    assert_eq!(x() + y(), y() + x());
    assert_eq!(x() + Expr::zero(), x());
    assert_eq!(x() * Expr::one(), x());
    assert_eq!(x() * Expr::zero(), Expr::zero());
    assert_eq!(Expr::int(2) + Expr::int(3), Expr::int(5));
    assert_eq!(Expr::pow(Expr::int(2), Expr::int(10)), Expr::int(1024));
  }

  #[test]
  fn expansion_combines_monomials() {
    // (x + 1)^2 = x^2 + 2x + 1
    let square = Expr::pow(x() + Expr::one(), Expr::int(2)).expand();
    let explicit =
        Expr::pow(x(), Expr::int(2)) + Expr::int(2) * x() + Expr::one();
    assert_eq!(square, explicit.expand());

    // (x + y)*(x - y) = x^2 - y^2
    let product = ((x() + y()) * (x() - y())).expand();
    let expected = Expr::pow(x(), Expr::int(2)) - Expr::pow(y(), Expr::int(2));
    assert_eq!(product, expected.expand());
  }

  #[test]
  fn degree_and_coeff() {
    let e = (Expr::int(3) * Expr::pow(x(), Expr::int(2)) * y() + x() + Expr::int(7)).expand();
    assert_eq!(e.degree(0), 2);
    assert_eq!(e.degree(1), 1);
    assert_eq!(e.coeff(0, 2), Expr::int(3) * y());
    assert_eq!(e.coeff(0, 1), Expr::one());
    assert_eq!(e.coeff(0, 0), Expr::int(7));
    assert_eq!(e.max_degree(), 3);
  }

  #[test]
  fn linearity() {
    assert!((Expr::int(2) * x() + y()).is_linear(None));
    assert!(!(x() * y()).is_linear(None));
    assert!(!Expr::pow(x(), Expr::int(2)).is_linear(None));
    // x*y is linear in {x} alone: y is just a coefficient there
    let mut only_x = BTreeSet::new();
    only_x.insert(0);
    assert!((x() * y()).is_linear(Some(&only_x)));
  }

  #[test]
  fn substitution_monoid() {
    // subs is a homomorphism: applying composed maps equals sequential application
    let mut first = Substitution::new();
    first.put(0, y() + Expr::one());
    let mut second = Substitution::new();
    second.put(1, Expr::int(3));

    let e = x() * x() + y();
    let sequential = e.subs(&first).subs(&second);
    let composed = first.compose(&second);
    assert_eq!(sequential, e.subs(&composed));
  }

  #[test]
  fn nonlinear_structural_substitution() {
    let pattern = Expr::pow(x(), Expr::int(2));
    let e = pattern.clone() + x();
    let replaced = e.replace(&pattern, &y());
    assert_eq!(replaced, y() + x());
  }

  #[test]
  fn complexity_estimation() {
    assert_eq!(Expr::int(42).complexity(), Complexity::Const);
    assert_eq!(x().complexity(), Complexity::Poly(1));
    assert_eq!((x() * y()).complexity(), Complexity::Poly(2));
    assert_eq!((x() + y()).complexity(), Complexity::Poly(1));
    assert_eq!(Expr::pow(x(), Expr::int(3)).complexity(), Complexity::Poly(3));
    assert_eq!(Expr::pow(Expr::int(2), x()).complexity(), Complexity::Exp);
    assert_eq!(Expr::pow(Expr::one(), x()).complexity(), Complexity::Const);
    assert_eq!(Expr::Nonterm.complexity(), Complexity::Nonterm);
  }

  #[test]
  fn numer_denom_of_rational() {
    let half = Expr::num(Numeric::new(BigInt::from(1), BigInt::from(2)));
    let (n, d) = half.numer_denom();
    assert_eq!(n, Expr::one());
    assert_eq!(d, Expr::int(2));
  }
}
