/*!

  Manages variables: maps between indices, printable names and type tags,
  and keeps track of which variables are temporary. Program variables are
  tracked and may appear on both sides of updates; temporary variables are
  free and may only appear in guards and right-hand sides. Untracked symbols
  are internal helpers (metering coefficients, Farkas multipliers); two
  untracked symbols with the same base name are distinct.

  The registry is append-only: variables are never removed.

*/

use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};

use crate::VariableIdx;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum VarType {
  Int,
  Real,
}

#[derive(Clone, Debug)]
struct VariableData {
  name     : String,
  var_type : VarType,
}

#[derive(Clone, Debug, Default)]
pub struct VariableManager {
  variables          : Vec<VariableData>,
  temporary_variables: BTreeSet<VariableIdx>,
  untracked_variables: BTreeSet<VariableIdx>,
  // Reverse mapping for efficiency
  name_lookup        : HashMap<String, VariableIdx>,
}

impl VariableManager {
  pub fn new() -> VariableManager {
    VariableManager::default()
  }

  fn fresh_name(&self, basename: &str) -> String {
    if !self.name_lookup.contains_key(basename) {
      return basename.to_string();
    }
    let mut suffix = 1usize;
    loop {
      let candidate = format!("{}_{}", basename, suffix);
      if !self.name_lookup.contains_key(&candidate) {
        return candidate;
      }
      suffix += 1;
    }
  }

  fn register(&mut self, basename: &str, var_type: VarType) -> VariableIdx {
    let name = self.fresh_name(basename);
    let index = self.variables.len();
    self.name_lookup.insert(name.clone(), index);
    self.variables.push(VariableData { name, var_type });
    index
  }

  /// Adds a fresh tracked program variable. The given name is used if it is
  /// still available, otherwise a numeric suffix is appended.
  pub fn add_fresh_variable(&mut self, basename: &str) -> VariableIdx {
    self.register(basename, VarType::Int)
  }

  /// Adds a fresh temporary variable.
  pub fn add_fresh_temporary_variable(&mut self, basename: &str) -> VariableIdx {
    let index = self.register(basename, VarType::Int);
    self.temporary_variables.insert(index);
    index
  }

  /// Generates a fresh symbol that does not enter the tracked pool. Used for
  /// metering coefficients and Farkas multipliers.
  pub fn fresh_untracked_symbol(&mut self, basename: &str, var_type: VarType) -> VariableIdx {
    let index = self.register(basename, var_type);
    self.untracked_variables.insert(index);
    index
  }

  /// Looks up a variable by name, registering a new tracked variable if the
  /// name is unknown. Used by the parsers.
  pub fn get_or_add_variable(&mut self, name: &str) -> VariableIdx {
    if let Some(index) = self.name_lookup.get(name) {
      return *index;
    }
    self.register(name, VarType::Int)
  }

  pub fn find_variable(&self, name: &str) -> Option<VariableIdx> {
    self.name_lookup.get(name).copied()
  }

  /// Marks an existing tracked variable as temporary (parser support).
  pub fn mark_temporary(&mut self, var: VariableIdx) {
    self.temporary_variables.insert(var);
  }

  pub fn is_temp_var(&self, var: VariableIdx) -> bool {
    self.temporary_variables.contains(&var)
  }

  pub fn is_untracked(&self, var: VariableIdx) -> bool {
    self.untracked_variables.contains(&var)
  }

  pub fn temp_vars(&self) -> &BTreeSet<VariableIdx> {
    &self.temporary_variables
  }

  pub fn var_type(&self, var: VariableIdx) -> VarType {
    self.variables[var].var_type
  }

  pub fn var_name(&self, var: VariableIdx) -> &str {
    &self.variables[var].name
  }

  pub fn var_count(&self) -> usize {
    self.variables.len()
  }

  /// All tracked program variables, i.e., neither temporary nor untracked.
  pub fn program_variables(&self) -> Vec<VariableIdx> {
    (0..self.variables.len())
        .filter(|v| !self.is_temp_var(*v) && !self.is_untracked(*v))
        .collect()
  }
}

impl Display for VariableManager {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    for (index, data) in self.variables.iter().enumerate() {
      let kind = if self.untracked_variables.contains(&index) {
        "untracked"
      } else if self.temporary_variables.contains(&index) {
        "temp"
      } else {
        "var"
      };
      writeln!(f, "{} {}: {}", kind, index, data.name)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fresh_names_get_suffixes() {
    let mut manager = VariableManager::new();
    let a = manager.add_fresh_variable("x");
    let b = manager.add_fresh_variable("x");
    assert_ne!(a, b);
    assert_eq!(manager.var_name(a), "x");
    assert_eq!(manager.var_name(b), "x_1");
  }

  #[test]
  fn untracked_symbols_are_distinct() {
    let mut manager = VariableManager::new();
    let a = manager.fresh_untracked_symbol("c", VarType::Real);
    let b = manager.fresh_untracked_symbol("c", VarType::Real);
    assert_ne!(a, b);
    assert!(manager.is_untracked(a));
    assert!(!manager.is_temp_var(a));
    assert_eq!(manager.var_type(b), VarType::Real);
  }

  #[test]
  fn temporary_pool_is_disjoint() {
    let mut manager = VariableManager::new();
    let x = manager.add_fresh_variable("x");
    let t = manager.add_fresh_temporary_variable("t");
    assert!(!manager.is_temp_var(x));
    assert!(manager.is_temp_var(t));
    assert_eq!(manager.program_variables(), vec![x]);
  }
}
