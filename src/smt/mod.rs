/*!

  The SMT driver: a uniform `push`/`pop`/`add`/`check`/`model` interface over
  a built-in decision procedure. Linear systems are decided by equality-free
  Fourier-Motzkin elimination over the rationals (`Unsat` is definitive);
  integer models are completed by rounding and a bounded randomised search.
  Nonlinear systems are only ever `Sat` (a verified model was found) or
  `Unknown`. Every query carries its own time budget; the driver never
  blocks longer.

*/

pub mod linear;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use num_traits::{One, Signed, ToPrimitive, Zero};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Config;
use crate::expr::{BoolExpr, Expr, Guard, Relation, Substitution};
use crate::its::{VarType, VariableManager};
use crate::{Numeric, VariableIdx};

use linear::{constraints_of, feasible, LinearConstraint, LinearResult};

/// Disjuncts examined per check before giving up.
const DNF_CAP: usize = 32;
/// Attempts of the randomised integer search.
const SEARCH_ATTEMPTS: usize = 3_000;
/// Fractional variables tolerated by exhaustive rounding.
const ROUNDING_CAP: usize = 10;

// region Result, logic and model types

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum SmtResult {
  Sat,
  Unsat,
  Unknown,
}

impl Display for SmtResult {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      SmtResult::Sat     => write!(f, "sat"),
      SmtResult::Unsat   => write!(f, "unsat"),
      SmtResult::Unknown => write!(f, "unknown"),
    }
  }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Logic {
  LinearInt,
  LinearMixed,
  NonlinearInt,
  NonlinearMixed,
}

/// Selects the weakest sufficient logic by inspecting the shapes of the
/// asserted guards and the substitutions that will be applied to them.
pub fn choose_logic(vm: &VariableManager, guards: &[&Guard], subs: &[&Substitution]) -> Logic {
  let mut linear = guards.iter().all(|g| g.is_linear())
      && subs.iter().all(|s| s.iter().all(|(_, e)| e.is_linear(None)));
  let mut mixed = false;

  for guard in guards {
    for var in guard.variables() {
      if vm.var_type(var) == VarType::Real {
        mixed = true;
      }
    }
  }
  for sub in subs {
    // substituting nonlinear terms into linear guards yields nonlinear facts
    if !sub.iter().all(|(_, e)| e.is_polynomial()) {
      linear = false;
    }
  }

  match (linear, mixed) {
    (true, false)  => Logic::LinearInt,
    (true, true)   => Logic::LinearMixed,
    (false, false) => Logic::NonlinearInt,
    (false, true)  => Logic::NonlinearMixed,
  }
}

/// A satisfying assignment. Variables without an entry are zero.
#[derive(Clone, Debug, Default)]
pub struct Model {
  values: BTreeMap<VariableIdx, Numeric>,
}

impl Model {
  pub fn new() -> Model {
    Model::default()
  }

  pub fn set(&mut self, var: VariableIdx, value: Numeric) {
    self.values.insert(var, value);
  }

  pub fn get(&self, var: VariableIdx) -> Numeric {
    self.values.get(&var).cloned().unwrap_or_else(Numeric::zero)
  }

  pub fn contains(&self, var: VariableIdx) -> bool {
    self.values.contains_key(&var)
  }

  pub fn iter(&self) -> std::collections::btree_map::Iter<'_, VariableIdx, Numeric> {
    self.values.iter()
  }
}

// endregion

// region Evaluation

/// Evaluates an expression under a model; `None` for the nontermination
/// sentinel and for powers the evaluator cannot handle.
pub fn evaluate_expr(expr: &Expr, model: &Model) -> Option<Numeric> {
  match expr {
    Expr::Number(n)  => Some(n.clone()),
    Expr::Var(v)     => Some(model.get(*v)),
    Expr::Nonterm    => None,
    Expr::Add(terms) => {
      let mut result = Numeric::zero();
      for term in terms {
        result += evaluate_expr(term, model)?;
      }
      Some(result)
    }
    Expr::Mul(terms) => {
      let mut result = Numeric::one();
      for term in terms {
        result *= evaluate_expr(term, model)?;
      }
      Some(result)
    }
    Expr::Pow(base, exponent) => {
      let base = evaluate_expr(base, model)?;
      let exponent = evaluate_expr(exponent, model)?;
      if !exponent.is_integer() {
        return None;
      }
      let k = exponent.to_integer().to_i64()?;
      if k.unsigned_abs() > 64 || (base.is_zero() && k < 0) {
        return None;
      }
      Some(crate::expr::numeric_pow(&base, k))
    }
  }
}

pub fn evaluate_relation(relation: &Relation, model: &Model) -> Option<bool> {
  let lhs = evaluate_expr(relation.lhs(), model)?;
  let rhs = evaluate_expr(relation.rhs(), model)?;
  let result = match relation.op() {
    crate::expr::RelOp::Eq  => lhs == rhs,
    crate::expr::RelOp::Neq => lhs != rhs,
    crate::expr::RelOp::Lt  => lhs < rhs,
    crate::expr::RelOp::Le  => lhs <= rhs,
    crate::expr::RelOp::Gt  => lhs > rhs,
    crate::expr::RelOp::Ge  => lhs >= rhs,
  };
  Some(result)
}

fn satisfies(relations: &[Relation], model: &Model) -> bool {
  relations.iter().all(|r| evaluate_relation(r, model) == Some(true))
}

/// Case-splits `t != 0` into `t < 0 || t > 0` so that disequalities stay on
/// the linear path.
fn eliminate_disequalities(formula: &BoolExpr) -> BoolExpr {
  match formula {
    BoolExpr::Rel(rel) if rel.op() == crate::expr::RelOp::Neq => BoolExpr::or(vec![
      BoolExpr::Rel(Relation::lt(rel.lhs().clone(), rel.rhs().clone())),
      BoolExpr::Rel(Relation::gt(rel.lhs().clone(), rel.rhs().clone())),
    ]),
    BoolExpr::And(inner) => BoolExpr::and(inner.iter().map(eliminate_disequalities).collect()),
    BoolExpr::Or(inner)  => BoolExpr::or(inner.iter().map(eliminate_disequalities).collect()),
    other                => other.clone(),
  }
}

// endregion

// region Solver

pub struct Solver {
  /// Variable type snapshot; variables registered later default to `Int`.
  types     : Vec<VarType>,
  assertions: Vec<BoolExpr>,
  stack     : Vec<usize>,
  timeout   : Duration,
  model     : Option<Model>,
  rng       : StdRng,
}

impl Solver {
  pub fn new(vm: &VariableManager, config: &Config) -> Solver {
    Solver {
      types     : (0..vm.var_count()).map(|v| vm.var_type(v)).collect(),
      assertions: Vec::new(),
      stack     : Vec::new(),
      timeout   : Duration::from_millis(config.smt_timeout_ms),
      model     : None,
      rng       : StdRng::seed_from_u64(0x5eed),
    }
  }

  /// A fresh, empty solver sharing the type snapshot of an existing one.
  pub fn new_from(other: &Solver, config: &Config) -> Solver {
    Solver {
      types     : other.types.clone(),
      assertions: Vec::new(),
      stack     : Vec::new(),
      timeout   : Duration::from_millis(config.smt_timeout_ms),
      model     : None,
      rng       : StdRng::seed_from_u64(0x5eed),
    }
  }

  pub fn set_timeout(&mut self, timeout: Duration) {
    self.timeout = timeout;
  }

  pub fn push(&mut self) {
    self.stack.push(self.assertions.len());
  }

  pub fn pop(&mut self) {
    if let Some(mark) = self.stack.pop() {
      self.assertions.truncate(mark);
    }
  }

  pub fn pop_all(&mut self) {
    self.stack.clear();
    self.assertions.clear();
  }

  pub fn reset_solver(&mut self) {
    self.pop_all();
    self.model = None;
  }

  pub fn add(&mut self, formula: BoolExpr) {
    self.assertions.push(formula);
  }

  pub fn add_relation(&mut self, relation: Relation) {
    self.assertions.push(BoolExpr::Rel(relation));
  }

  pub fn add_guard(&mut self, guard: &Guard) {
    self.assertions.push(BoolExpr::from_guard(guard));
  }

  /// Defined only after a `Sat` result.
  pub fn model(&self) -> &Model {
    self.model.as_ref().expect("model() before a sat result")
  }

  fn var_type(&self, var: VariableIdx) -> VarType {
    self.types.get(var).copied().unwrap_or(VarType::Int)
  }

  pub fn check(&mut self) -> SmtResult {
    self.model = None;
    let deadline = Instant::now() + self.timeout;

    let formula = eliminate_disequalities(&BoolExpr::and(self.assertions.clone()));
    match &formula {
      BoolExpr::True  => {
        self.model = Some(Model::new());
        return SmtResult::Sat;
      }
      BoolExpr::False => return SmtResult::Unsat,
      _               => {}
    }

    let disjuncts = formula.dnf();
    let truncated = disjuncts.len() > DNF_CAP;
    let mut any_unknown = truncated;

    for disjunct in disjuncts.into_iter().take(DNF_CAP) {
      match self.check_conjunction(&disjunct, deadline) {
        SmtResult::Sat     => return SmtResult::Sat,
        SmtResult::Unknown => any_unknown = true,
        SmtResult::Unsat   => {}
      }
      if Instant::now() >= deadline {
        any_unknown = true;
        break;
      }
    }

    if any_unknown {
      SmtResult::Unknown
    } else {
      SmtResult::Unsat
    }
  }

  fn check_conjunction(&mut self, guard: &Guard, deadline: Instant) -> SmtResult {
    let mut relations: Vec<Relation> = Vec::new();
    for relation in guard {
      match relation.trivial_truth() {
        Some(false) => return SmtResult::Unsat,
        Some(true)  => {}
        None        => relations.push(relation.clone()),
      }
    }
    if relations.is_empty() {
      self.model = Some(Model::new());
      return SmtResult::Sat;
    }

    let all_int = relations
        .iter()
        .flat_map(|r| r.variables())
        .all(|v| self.var_type(v) == VarType::Int);

    // disequalities are checked against the candidate model afterwards
    let mut constraints: Vec<LinearConstraint> = Vec::new();
    let mut all_linear = true;
    for relation in &relations {
      if relation.op() == crate::expr::RelOp::Neq {
        all_linear = false;
        continue;
      }
      match constraints_of(relation, all_int) {
        Some(cs) => constraints.extend(cs),
        None     => {
          all_linear = false;
        }
      }
    }

    if all_linear {
      match feasible(&constraints) {
        LinearResult::Infeasible   => return SmtResult::Unsat,
        LinearResult::TooBig       => return SmtResult::Unknown,
        LinearResult::Model(values) => {
          if let Some(model) = self.repair_model(values, &relations, deadline) {
            self.model = Some(model);
            return SmtResult::Sat;
          }
          return SmtResult::Unknown;
        }
      }
    }

    // Nonlinear or with disequalities: search for a verified integer model.
    match self.search_model(&relations, deadline) {
      Some(model) => {
        self.model = Some(model);
        SmtResult::Sat
      }
      None        => SmtResult::Unknown,
    }
  }

  /// Rounds fractional values of integer variables and verifies the result
  /// against the original relations.
  fn repair_model(
    &mut self,
    values: BTreeMap<VariableIdx, Numeric>,
    relations: &[Relation],
    deadline: Instant,
  ) -> Option<Model> {
    let mut model = Model::new();
    for (var, value) in &values {
      model.set(*var, value.clone());
    }
    if satisfies(relations, &model) && self.integral_where_needed(&model) {
      return Some(model);
    }

    let fractional: Vec<VariableIdx> = values
        .iter()
        .filter(|(v, value)| self.var_type(**v) == VarType::Int && !value.is_integer())
        .map(|(v, _)| *v)
        .collect();

    if !fractional.is_empty() && fractional.len() <= ROUNDING_CAP {
      // exhaustive floor/ceil combinations
      for mask in 0u32..(1u32 << fractional.len()) {
        let mut candidate = model.clone();
        for (bit, var) in fractional.iter().enumerate() {
          let value = values[var].clone();
          let rounded = if mask & (1u32 << bit) == 0 { value.floor() } else { value.ceil() };
          candidate.set(*var, rounded);
        }
        if satisfies(relations, &candidate) && self.integral_where_needed(&candidate) {
          return Some(candidate);
        }
        if Instant::now() >= deadline {
          return None;
        }
      }
    }

    self.search_model(relations, deadline)
  }

  fn integral_where_needed(&self, model: &Model) -> bool {
    model
        .iter()
        .all(|(v, value)| self.var_type(*v) == VarType::Real || value.is_integer())
  }

  /// Bounded randomised search for an integer model, seeded with constants
  /// occurring in the relations.
  fn search_model(&mut self, relations: &[Relation], deadline: Instant) -> Option<Model> {
    let mut variables: BTreeSet<VariableIdx> = BTreeSet::new();
    for relation in relations {
      relation.collect_variables(&mut variables);
    }
    let variables: Vec<VariableIdx> = variables.into_iter().collect();

    let mut candidates: Vec<i64> = (-4..=4).collect();
    for relation in relations {
      let difference = (relation.lhs().clone() - relation.rhs().clone()).expand();
      if let Some((_, constant)) = linear::linear_form(&difference) {
        if let Some(k) = constant.to_integer().to_i64() {
          for delta in -1..=1 {
            candidates.push(-k + delta);
            candidates.push(k + delta);
          }
        }
      }
    }
    candidates.sort_unstable();
    candidates.dedup();

    // deterministic probes first
    for probe in [0i64, 1, -1, 2] {
      let mut model = Model::new();
      for var in &variables {
        model.set(*var, Numeric::from_integer(probe.into()));
      }
      if satisfies(relations, &model) {
        return Some(model);
      }
    }

    for _ in 0..SEARCH_ATTEMPTS {
      if Instant::now() >= deadline {
        return None;
      }
      let mut model = Model::new();
      for var in &variables {
        let value = candidates[self.rng.gen_range(0..candidates.len())];
        model.set(*var, Numeric::from_integer(value.into()));
      }
      if satisfies(relations, &model) {
        return Some(model);
      }
    }
    None
  }
}

// endregion

// region Convenience entry points

/// One-shot satisfiability check of a conjunctive guard.
pub fn check_guard(vm: &VariableManager, config: &Config, guard: &Guard) -> SmtResult {
  let mut solver = Solver::new(vm, config);
  solver.add_guard(guard);
  solver.check()
}

/// One-shot satisfiability check of an arbitrary formula.
pub fn check_formula(vm: &VariableManager, config: &Config, formula: BoolExpr) -> SmtResult {
  let mut solver = Solver::new(vm, config);
  solver.add(formula);
  solver.check()
}

/// `premise => conclusion` iff `premise && !conclusion` is unsatisfiable.
pub fn is_implication(
  vm: &VariableManager,
  config: &Config,
  premise: &Guard,
  conclusion: &Relation,
) -> bool {
  let mut solver = Solver::new(vm, config);
  solver.add_guard(premise);
  solver.add_relation(conclusion.negated());
  solver.check() == SmtResult::Unsat
}

// endregion

#[cfg(test)]
mod tests {
  use super::*;

  fn setup() -> (VariableManager, Config) {
    let mut vm = VariableManager::new();
    vm.add_fresh_variable("x");
    vm.add_fresh_variable("y");
    (vm, Config::default())
  }

  #[test]
  fn linear_sat_and_unsat() {
    let (vm, config) = setup();
    let sat = Guard::new(vec![
      Relation::gt(Expr::var(0), Expr::zero()),
      Relation::lt(Expr::var(0), Expr::int(10)),
    ]);
    assert_eq!(check_guard(&vm, &config, &sat), SmtResult::Sat);

    let unsat = Guard::new(vec![
      Relation::gt(Expr::var(0), Expr::zero()),
      Relation::lt(Expr::var(0), Expr::zero()),
    ]);
    assert_eq!(check_guard(&vm, &config, &unsat), SmtResult::Unsat);
  }

  #[test]
  fn integer_gap_is_unsat() {
    let (vm, config) = setup();
    // 0 < x < 1 has no integer solution; the shift makes this definitive
    let guard = Guard::new(vec![
      Relation::gt(Expr::var(0), Expr::zero()),
      Relation::lt(Expr::var(0), Expr::one()),
    ]);
    assert_eq!(check_guard(&vm, &config, &guard), SmtResult::Unsat);
  }

  #[test]
  fn model_is_verified() {
    let (vm, config) = setup();
    let mut solver = Solver::new(&vm, &config);
    solver.add_guard(&Guard::new(vec![
      Relation::ge(Expr::var(0), Expr::int(3)),
      Relation::le(Expr::var(0) + Expr::var(1), Expr::int(5)),
    ]));
    assert_eq!(solver.check(), SmtResult::Sat);
    let model = solver.model();
    assert!(model.get(0) >= Numeric::from_integer(3.into()));
    assert!(model.get(0) + model.get(1) <= Numeric::from_integer(5.into()));
  }

  #[test]
  fn nonlinear_model_search() {
    let (vm, config) = setup();
    // x * x == 4 and x > 0
    let guard = Guard::new(vec![
      Relation::eq(Expr::var(0) * Expr::var(0), Expr::int(4)),
      Relation::gt(Expr::var(0), Expr::zero()),
    ]);
    let mut solver = Solver::new(&vm, &config);
    solver.add_guard(&guard);
    assert_eq!(solver.check(), SmtResult::Sat);
    assert_eq!(solver.model().get(0), Numeric::from_integer(2.into()));
  }

  #[test]
  fn push_pop_scopes() {
    let (vm, config) = setup();
    let mut solver = Solver::new(&vm, &config);
    solver.add_relation(Relation::gt(Expr::var(0), Expr::zero()));
    solver.push();
    solver.add_relation(Relation::lt(Expr::var(0), Expr::zero()));
    assert_eq!(solver.check(), SmtResult::Unsat);
    solver.pop();
    assert_eq!(solver.check(), SmtResult::Sat);
  }

  #[test]
  fn implication_check() {
    let (vm, config) = setup();
    let premise = Guard::new(vec![Relation::gt(Expr::var(0), Expr::int(2))]);
    assert!(is_implication(&vm, &config, &premise, &Relation::gt(Expr::var(0), Expr::zero())));
    assert!(!is_implication(&vm, &config, &premise, &Relation::gt(Expr::var(0), Expr::int(5))));
  }

  #[test]
  fn logic_selection() {
    let (vm, _) = setup();
    let linear = Guard::new(vec![Relation::gt(Expr::var(0), Expr::zero())]);
    assert_eq!(choose_logic(&vm, &[&linear], &[]), Logic::LinearInt);
    let nonlinear = Guard::new(vec![Relation::gt(Expr::var(0) * Expr::var(1), Expr::zero())]);
    assert_eq!(choose_logic(&vm, &[&nonlinear], &[]), Logic::NonlinearInt);
  }

  #[test]
  fn disequality_via_search() {
    let (vm, config) = setup();
    let guard = Guard::new(vec![
      Relation::new(Expr::var(0), crate::expr::RelOp::Neq, Expr::zero()),
      Relation::ge(Expr::var(0), Expr::zero()),
      Relation::le(Expr::var(0), Expr::int(2)),
    ]);
    assert_eq!(check_guard(&vm, &config, &guard), SmtResult::Sat);
  }
}
