/*!

  The acceleration calculus: discharges each literal of a simple loop's
  guard with one of five rules (recurrence, monotonic decrease, eventual
  weak decrease, eventual weak increase, fixpoint). If every literal is
  discharged, the loop is accelerated; if only the nontermination-preserving
  rules were used and the cost is provably positive, the accelerated rule
  additionally witnesses non-termination via a recurrent set.

  Every discharge is validated by an SMT query under the accumulated
  conditions; a query returning unknown fails the attempt for that literal.

*/

use crate::config::Config;
use crate::expr::{Expr, Guard, Relation, Substitution};
use crate::its::{ItsProblem, Rule};
use crate::proof::Proof;
use crate::smt::{SmtResult, Solver};
use crate::{LocationIdx, VariableIdx};

use super::recurrence;

pub struct AccelerationProblem<'c> {
  todo          : Vec<Relation>,
  res           : Guard,
  up            : Substitution,
  closed        : Option<Substitution>,
  cost          : Expr,
  iterated_cost : Expr,
  n             : VariableIdx,
  guard         : Guard,
  validity_bound: u32,
  nonterm       : bool,
  proof         : Proof,
  /// Accumulated context of all successful discharges.
  solver        : Solver,
  /// Scratch solver for the per-rule implication checks.
  solver2       : Solver,
  config        : &'c Config,
}

/// One way to accelerate the loop: the new guard and whether it also
/// witnesses non-termination.
#[derive(Clone, Debug)]
pub struct CalculusResult {
  pub guard  : Guard,
  pub nonterm: bool,
}

impl<'c> AccelerationProblem<'c> {
  /// Sets the problem up for a linear simple loop. A fresh iteration
  /// counter is registered; the closed form may be unavailable, which
  /// restricts the calculus to the nontermination-preserving rules.
  pub fn init(its: &mut ItsProblem, config: &'c Config, rule: &Rule) -> AccelerationProblem<'c> {
    debug_assert!(rule.is_linear() && rule.is_simple_loop());
    let n = its.add_fresh_temporary_variable("n");
    let closed = recurrence::iterate_rule(rule, n);
    let (closed_update, iterated_cost, validity_bound) = match closed {
      Some(result) => (Some(result.update), result.cost, result.validity_bound),
      None         => (None, rule.cost().clone(), 0),
    };

    let solver = Solver::new(its.var_manager(), config);
    let solver2 = Solver::new(its.var_manager(), config);

    // The calculus operates on literals in the normal form `t > 0`.
    let guard = rule.guard().normalized();

    AccelerationProblem {
      todo          : guard.iter().cloned().collect(),
      res           : Guard::empty(),
      up            : rule.update(0).clone(),
      closed        : closed_update,
      cost          : rule.cost().clone(),
      iterated_cost,
      n,
      guard,
      validity_bound,
      nonterm       : true,
      proof         : Proof::new(),
      solver,
      solver2,
      config,
    }
  }

  pub fn iteration_counter(&self) -> VariableIdx {
    self.n
  }

  pub fn closed_form(&self) -> Option<&Substitution> {
    self.closed.as_ref()
  }

  pub fn accelerated_cost(&self) -> &Expr {
    &self.iterated_cost
  }

  pub fn validity_bound(&self) -> u32 {
    self.validity_bound
  }

  pub fn proof(&self) -> &Proof {
    &self.proof
  }

  /// The literal under the closed-form update at iteration `n - 1`.
  fn at_last_iteration(&self, rel: &Relation) -> Relation {
    let closed = self.closed.as_ref().unwrap();
    let shifted = Substitution::single(self.n, Expr::var(self.n) - Expr::one());
    rel.subs(closed).subs(&shifted)
  }

  /// Accepts `condition` into the accumulated result if it keeps the
  /// context satisfiable.
  fn commit(&mut self, conditions: &[Relation]) -> bool {
    self.solver.push();
    for condition in conditions {
      self.solver.add_relation(condition.clone());
    }
    if self.solver.check() == SmtResult::Sat {
      for condition in conditions {
        self.res.push(condition.clone());
      }
      true
    } else {
      self.solver.pop();
      false
    }
  }

  /// Rule 1: `l` is preserved by every iteration, so it is kept as is.
  fn recurrence(&mut self, rel: &Relation) -> bool {
    self.solver2.push();
    self.solver2.add_relation(rel.clone());
    let mut ok = self.solver2.check() == SmtResult::Sat;
    if ok {
      self.solver2.add_relation(rel.subs(&self.up).negated());
      ok = self.solver2.check() == SmtResult::Unsat;
    }
    if ok && self.commit(&[rel.clone()]) {
      self.proof.append(format!("discharged {} with recurrence, kept {}", rel, rel));
      self.solver2.pop();
      self.solver2.add_relation(rel.clone());
      return true;
    }
    self.solver2.pop();
    false
  }

  /// Rule 2: `l` decreases towards its exit, so it only has to hold at the
  /// last iteration.
  fn monotonicity(&mut self, rel: &Relation) -> bool {
    if self.closed.is_none() {
      return false;
    }
    self.solver2.push();
    self.solver2.add_relation(rel.subs(&self.up));
    let mut ok = self.solver2.check() == SmtResult::Sat;
    if ok {
      self.solver2.add_relation(rel.negated());
      ok = self.solver2.check() == SmtResult::Unsat;
    }
    if ok {
      let last = self.at_last_iteration(rel);
      if self.commit(&[last.clone()]) {
        self.nonterm = false;
        self.proof.append(format!("discharged {} with monotonic decrease, got {}", rel, last));
        self.solver2.pop();
        self.solver2.add_relation(rel.clone());
        return true;
      }
    }
    self.solver2.pop();
    false
  }

  /// Rule 3: once the left-hand side starts decreasing it keeps doing so,
  /// hence `l` at the first and at the last iteration suffice.
  fn eventual_weak_decrease(&mut self, rel: &Relation) -> bool {
    if self.closed.is_none() {
      return false;
    }
    let updated = rel.lhs().subs(&self.up);
    let dec = Relation::ge(rel.lhs().clone(), updated.clone());
    let dec_dec = Relation::ge(updated.clone(), updated.subs(&self.up));

    self.solver2.push();
    self.solver2.add_relation(dec);
    let mut ok = self.solver2.check() == SmtResult::Sat;
    if ok {
      self.solver2.add_relation(dec_dec.negated());
      ok = self.solver2.check() == SmtResult::Unsat;
    }
    if ok {
      let last = self.at_last_iteration(rel);
      if self.commit(&[rel.clone(), last.clone()]) {
        self.nonterm = false;
        self.proof.append(format!(
          "discharged {} with eventual decrease, got {} and {}",
          rel, rel, last
        ));
        self.solver2.pop();
        self.solver2.add_relation(rel.clone());
        return true;
      }
    }
    self.solver2.pop();
    false
  }

  /// Rule 4: once the left-hand side starts increasing it keeps doing so;
  /// `l` itself plus the increase condition are the witness.
  fn eventual_weak_increase(&mut self, rel: &Relation) -> bool {
    let updated = rel.lhs().subs(&self.up);
    let inc = Relation::le(rel.lhs().clone(), updated.clone());
    let inc_inc = Relation::le(updated.clone(), updated.subs(&self.up));

    self.solver2.push();
    self.solver2.add_relation(inc.clone());
    let mut ok = self.solver2.check() == SmtResult::Sat;
    if ok {
      self.solver2.add_relation(inc_inc.negated());
      ok = self.solver2.check() == SmtResult::Unsat;
    }
    if ok && self.commit(&[rel.clone(), inc.clone()]) {
      self.proof.append(format!(
        "discharged {} with eventual increase, got {} and {}",
        rel, rel, inc
      ));
      self.solver2.pop();
      self.solver2.add_relation(rel.clone());
      return true;
    }
    self.solver2.pop();
    false
  }

  /// Rule 5: all variables `l` depends on are fixed by the update.
  fn fixpoint(&mut self, rel: &Relation) -> bool {
    let mut conditions = vec![rel.clone()];
    for var in relevant_variables(rel, &self.up) {
      conditions.push(Relation::eq(Expr::var(var), self.up.update_of(var)));
    }

    let mut all = self.guard.clone();
    for condition in &conditions {
      all.push(condition.clone());
    }
    // the fixpoint must be reachable at all
    let mut probe = Solver::new_from(&self.solver, self.config);
    probe.add_guard(&all);
    if probe.check() != SmtResult::Sat {
      return false;
    }

    if self.commit(&conditions) {
      self.proof.append(format!("discharged {} with fixpoint", rel));
      return true;
    }
    false
  }

  fn try_discharge(&mut self, rel: &Relation, rules: &[DischargeRule]) -> bool {
    for rule in rules {
      let success = match rule {
        DischargeRule::Recurrence           => self.recurrence(rel),
        DischargeRule::Monotonicity         => self.monotonicity(rel),
        DischargeRule::EventualWeakDecrease => self.eventual_weak_decrease(rel),
        DischargeRule::EventualWeakIncrease => self.eventual_weak_increase(rel),
        DischargeRule::Fixpoint             => self.fixpoint(rel),
      };
      if success {
        return true;
      }
    }
    false
  }

  fn run_to_fixpoint(&mut self, rules: &[DischargeRule]) {
    loop {
      let mut changed = false;
      let mut remaining = Vec::new();
      let todo = std::mem::take(&mut self.todo);
      for rel in todo {
        if self.try_discharge(&rel, rules) {
          changed = true;
        } else {
          remaining.push(rel);
        }
      }
      self.todo = remaining;
      if !changed || self.todo.is_empty() {
        break;
      }
    }
  }

  /// Runs the calculus. At most two results: the accelerated guard, and
  /// possibly a second, nontermination-witnessing guard from a restricted
  /// second pass.
  pub fn compute(&mut self) -> Vec<CalculusResult> {
    self.proof.append(format!("accelerating {} wrt. {}", self.guard, self.up));
    self
        .solver
        .add_relation(Relation::ge(Expr::var(self.n), Expr::int(self.validity_bound as i64)));
    self.solver.push();

    let all_rules = [
      DischargeRule::Recurrence,
      DischargeRule::Monotonicity,
      DischargeRule::EventualWeakDecrease,
      DischargeRule::EventualWeakIncrease,
      DischargeRule::Fixpoint,
    ];
    self.run_to_fixpoint(&all_rules);

    let mut results = Vec::new();
    if !self.todo.is_empty() {
      return results;
    }

    let cost_positive = smt_cost_positive(&self.guard, &self.cost, &self.solver, self.config);
    if self.nonterm {
      self.nonterm = cost_positive;
    }
    results.push(CalculusResult { guard: self.res.clone(), nonterm: self.nonterm });

    if !self.nonterm && self.closed.is_some() && cost_positive {
      // second pass restricted to the nontermination-preserving rules
      self.proof.append("done, trying nonterm");
      self.todo = self.guard.iter().cloned().collect();
      self.res = Guard::empty();
      self.nonterm = true;
      self.solver.pop_all();
      self.solver2.pop_all();
      self.solver.push();

      let nonterm_rules = [
        DischargeRule::Recurrence,
        DischargeRule::EventualWeakIncrease,
        DischargeRule::Fixpoint,
      ];
      self.run_to_fixpoint(&nonterm_rules);
      if self.todo.is_empty() {
        results.push(CalculusResult { guard: self.res.clone(), nonterm: true });
      }
    }

    results
  }
}

#[derive(Copy, Clone)]
enum DischargeRule {
  Recurrence,
  Monotonicity,
  EventualWeakDecrease,
  EventualWeakIncrease,
  Fixpoint,
}

/// The variables of `rel`, closed under dependencies through the update.
fn relevant_variables(rel: &Relation, up: &Substitution) -> Vec<VariableIdx> {
  let mut result: Vec<VariableIdx> = rel.variables().into_iter().collect();
  loop {
    let mut added = false;
    for var in result.clone() {
      if let Some(value) = up.get(var) {
        for dep in value.variables() {
          if !result.contains(&dep) {
            result.push(dep);
            added = true;
          }
        }
      }
    }
    if !added {
      break;
    }
  }
  result.sort_unstable();
  result
}

fn smt_cost_positive(guard: &Guard, cost: &Expr, reference: &Solver, config: &Config) -> bool {
  let mut solver = Solver::new_from(reference, config);
  solver.add_guard(guard);
  solver.add_relation(Relation::gt(cost.clone(), Expr::zero()).negated());
  solver.check() == SmtResult::Unsat
}

// region Building accelerated rules

/// An accelerated rendition of a simple loop.
#[derive(Clone, Debug)]
pub struct AcceleratedLoop {
  pub rule   : Rule,
  pub nonterm: bool,
  pub info   : String,
}

/// Runs the calculus on a linear simple loop and builds the accelerated
/// rules. Nontermination witnesses are redirected to `sink` with cost
/// `NONTERM`; ordinary results keep the loop shape with the closed-form
/// update and the iterated cost.
pub fn accelerate_loop(
  its: &mut ItsProblem,
  config: &Config,
  rule: &Rule,
  sink: LocationIdx,
) -> (Vec<AcceleratedLoop>, Proof) {
  let mut problem = AccelerationProblem::init(its, config, rule);
  let calculus_results = problem.compute();

  let mut accelerated = Vec::new();
  for result in calculus_results {
    if result.nonterm {
      let lhs_guard = result.guard.clone();
      let nonterm_rule = Rule::new_linear(
        rule.lhs_loc(),
        lhs_guard,
        Expr::Nonterm,
        sink,
        Substitution::new(),
      );
      accelerated.push(AcceleratedLoop {
        rule   : nonterm_rule,
        nonterm: true,
        info   : "recurrent set".to_string(),
      });
    } else if let Some(closed) = problem.closed_form() {
      let mut guard = result.guard.clone();
      let bound = problem.validity_bound().max(1);
      guard.push(Relation::ge(
        Expr::var(problem.iteration_counter()),
        Expr::int(bound as i64),
      ));
      let accelerated_rule = Rule::new_linear(
        rule.lhs_loc(),
        guard,
        problem.accelerated_cost().clone(),
        rule.rhs_loc(0),
        closed.clone(),
      );
      accelerated.push(AcceleratedLoop {
        rule   : accelerated_rule,
        nonterm: false,
        info   : "acceleration calculus".to_string(),
      });
    }
  }

  (accelerated, problem.proof().clone())
}

// endregion

#[cfg(test)]
mod tests {
  use super::*;
  use crate::its::VariableManager;

  fn simple_its() -> (ItsProblem, LocationIdx, VariableIdx) {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (its, start) = ItsProblem::with_start(vm, "f");
    (its, start, x)
  }

  #[test]
  fn counting_loop_accelerates() {
    let (mut its, start, x) = simple_its();
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    let mut update = Substitution::new();
    update.put(x, Expr::var(x) - Expr::one());
    let rule = Rule::new_linear(start, guard, Expr::one(), start, update);
    its.add_rule(rule.clone());
    let sink = its.add_location();

    let config = Config::default();
    let (results, _) = accelerate_loop(&mut its, &config, &rule, sink);
    assert!(!results.is_empty());
    let accel = results.iter().find(|r| !r.nonterm).expect("terminating acceleration");
    // the accelerated cost is the iteration counter, a fresh temporary
    let n = accel.rule.cost().as_var().expect("cost n");
    assert!(its.is_temp_var(n));
    assert!(accel.rule.is_simple_loop());
    // the closed-form update appears on the right-hand side
    assert_eq!(
      accel.rule.update(0).get(x).unwrap().clone(),
      (Expr::var(x) - Expr::var(n)).expand()
    );
  }

  #[test]
  fn stuck_loop_witnesses_nontermination() {
    // x > 0 with identity update and positive cost never terminates
    let (mut its, start, x) = simple_its();
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    let rule = Rule::new_linear(start, guard, Expr::one(), start, Substitution::new());
    its.add_rule(rule.clone());
    let sink = its.add_location();

    let config = Config::default();
    let (results, _) = accelerate_loop(&mut its, &config, &rule, sink);
    assert!(results.iter().any(|r| r.nonterm));
    let witness = results.iter().find(|r| r.nonterm).unwrap();
    assert!(witness.rule.cost().is_nonterm());
    assert_eq!(witness.rule.rhs_loc(0), sink);
  }

  #[test]
  fn conflict_shape_is_handled_by_decrease_to_exit() {
    // x > y with x := x - 1, y := y + 1 accelerates via eventual decrease
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let y = vm.add_fresh_variable("y");
    let (mut its, start) = ItsProblem::with_start(vm, "f");
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::var(y))]);
    let mut update = Substitution::new();
    update.put(x, Expr::var(x) - Expr::one());
    update.put(y, Expr::var(y) + Expr::one());
    let rule = Rule::new_linear(start, guard, Expr::one(), start, update);
    its.add_rule(rule.clone());
    let sink = its.add_location();

    let config = Config::default();
    let (results, _) = accelerate_loop(&mut its, &config, &rule, sink);
    assert!(results.iter().any(|r| !r.nonterm));
  }
}
