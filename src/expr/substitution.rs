/*!

  A `Substitution` is a finite map from variables to expressions. Updates of
  rules are substitutions whose keys are tracked program variables; missing
  entries mean identity.

*/

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::expr::Expr;
use crate::VariableIdx;

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
pub struct Substitution {
  map: BTreeMap<VariableIdx, Expr>,
}

impl Substitution {
  pub fn new() -> Substitution {
    Substitution::default()
  }

  pub fn single(var: VariableIdx, value: Expr) -> Substitution {
    let mut result = Substitution::new();
    result.put(var, value);
    result
  }

  pub fn put(&mut self, var: VariableIdx, value: Expr) {
    self.map.insert(var, value);
  }

  pub fn remove(&mut self, var: VariableIdx) -> Option<Expr> {
    self.map.remove(&var)
  }

  pub fn get(&self, var: VariableIdx) -> Option<&Expr> {
    self.map.get(&var)
  }

  /// The update of `var`, which is `var` itself for missing entries.
  pub fn update_of(&self, var: VariableIdx) -> Expr {
    self.map.get(&var).cloned().unwrap_or(Expr::Var(var))
  }

  pub fn contains(&self, var: VariableIdx) -> bool {
    self.map.contains_key(&var)
  }

  pub fn is_empty(&self) -> bool {
    self.map.is_empty()
  }

  pub fn len(&self) -> usize {
    self.map.len()
  }

  pub fn domain(&self) -> impl Iterator<Item = VariableIdx> + '_ {
    self.map.keys().copied()
  }

  pub fn iter(&self) -> btree_map::Iter<'_, VariableIdx, Expr> {
    self.map.iter()
  }

  /// Variables of both the domain and all right-hand sides.
  pub fn collect_all_variables(&self, result: &mut std::collections::BTreeSet<VariableIdx>) {
    for (var, value) in &self.map {
      result.insert(*var);
      value.collect_variables(result);
    }
  }

  /// Composition: applying the result is equivalent to applying `self` first
  /// and `after` second.
  pub fn compose(&self, after: &Substitution) -> Substitution {
    let mut result = Substitution::new();
    for (var, value) in &self.map {
      result.put(*var, value.subs(after));
    }
    for (var, value) in &after.map {
      if !result.contains(*var) {
        result.put(*var, value.clone());
      }
    }
    result
  }

  /// Drops trivial entries `x := x`. Returns true iff anything was removed.
  pub fn remove_identities(&mut self) -> bool {
    let before = self.map.len();
    self.map.retain(|var, value| value.as_var() != Some(*var));
    before != self.map.len()
  }
}

impl IntoIterator for Substitution {
  type Item = (VariableIdx, Expr);
  type IntoIter = btree_map::IntoIter<VariableIdx, Expr>;

  fn into_iter(self) -> Self::IntoIter {
    self.map.into_iter()
  }
}

impl Display for Substitution {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{{{}}}",
      self.map.iter().map(|(v, e)| format!("x{}: {}", v, e)).join(", ")
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn composition_order() {
    // first: x -> y + 1, then: y -> 3 gives x -> 4
    let mut first = Substitution::new();
    first.put(0, Expr::var(1) + Expr::one());
    let mut second = Substitution::new();
    second.put(1, Expr::int(3));

    let composed = first.compose(&second);
    assert_eq!(composed.get(0), Some(&Expr::int(4)));
    assert_eq!(composed.get(1), Some(&Expr::int(3)));
  }

  #[test]
  fn identity_removal() {
    let mut subs = Substitution::new();
    subs.put(0, Expr::var(0));
    subs.put(1, Expr::var(0));
    assert!(subs.remove_identities());
    assert!(!subs.contains(0));
    assert!(subs.contains(1));
  }
}
