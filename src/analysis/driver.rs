/*!

  The top-level analysis: preprocess, then a fix-point of acceleration,
  chaining and pruning, and finally the asymptotic bound computation over
  the rules leaving the initial location. The two phases poll the soft and
  hard timeout cooperatively between major operations, so a partial result
  is always available.

*/

use std::collections::BTreeSet;
use std::time::Duration;

use log::debug;

use crate::accelerate;
use crate::asymptotic;
use crate::complexity::Complexity;
use crate::config::Config;
use crate::expr::{Expr, Guard, Relation};
use crate::its::{ItsProblem, Rule};
use crate::proof::Proof;
use crate::smt::{self, SmtResult};
use crate::timeout::Timeout;
use crate::{LocationIdx, LocationSet, TransIdx};

use super::chain::chain_rules;
use super::chain_strategy;
use super::preprocess::Preprocess;
use super::prune::Pruning;

/// The final runtime result: complexity, the witnessing cost and guard, and
/// the aggregated proof.
#[derive(Clone, Debug)]
pub struct RuntimeResult {
  pub cpx        : Complexity,
  /// The cost after solving by the asymptotic check.
  pub solved_cost: Expr,
  /// The cost before solving.
  pub cost       : Expr,
  pub guard      : Option<Guard>,
  pub proof      : Proof,
}

impl RuntimeResult {
  pub fn new() -> RuntimeResult {
    RuntimeResult {
      cpx        : Complexity::Unknown,
      solved_cost: Expr::zero(),
      cost       : Expr::zero(),
      guard      : None,
      proof      : Proof::new(),
    }
  }

  fn update(&mut self, guard: Guard, cost: Expr, solved_cost: Expr, cpx: Complexity) {
    self.guard = Some(guard);
    self.cost = cost;
    self.solved_cost = solved_cost;
    self.cpx = cpx;
  }

  /// The WST-style answer line.
  pub fn result_line(&self, config: &Config) -> String {
    if config.nonterm_mode {
      if self.cpx == Complexity::Nonterm {
        "NO".to_string()
      } else {
        "MAYBE".to_string()
      }
    } else {
      self.cpx.to_wst_string()
    }
  }
}

impl Default for RuntimeResult {
  fn default() -> Self {
    RuntimeResult::new()
  }
}

pub struct Analysis<'a> {
  its    : &'a mut ItsProblem,
  config : &'a Config,
  timeout: Timeout,
}

impl<'a> Analysis<'a> {
  pub fn new(its: &'a mut ItsProblem, config: &'a Config) -> Analysis<'a> {
    let timeout = Timeout::new(config.timeout);
    Analysis { its, config, timeout }
  }

  /// Runs the full analysis: simplification up to the soft timeout, then
  /// the bound computation up to the hard timeout.
  pub fn run(mut self) -> RuntimeResult {
    let mut result = RuntimeResult::new();
    let mut proof = Proof::new();

    self.simplify(&mut result, &mut proof);
    if self.timeout.soft() {
      debug!("aborted simplification due to the soft timeout");
    }
    if self.config.print_simplified {
      print!("{}", crate::its::print_koat(self.its));
    }
    self.finalize(&mut result);

    proof.newline();
    proof.result("Proved the following lower bound");
    proof.result(format!("Complexity:  {}", result.cpx));
    proof.append(format!("Solved cost: {}", result.solved_cost));
    let mut combined = proof;
    combined.concat(result.proof);
    result.proof = combined;
    result
  }

  // region Simplification

  fn simplify(&mut self, result: &mut RuntimeResult, proof: &mut Proof) {
    proof.major_step("Initial ITS", self.its);

    if !self.config.nonterm_mode && self.config.cost_check {
      if self.ensure_nonnegative_costs() {
        proof.minor_step("Ensure Cost >= 0", self.its);
      }
    }

    if self.ensure_proper_initial_location() {
      proof.minor_step("Added a fresh start location without incoming rules", self.its);
    }

    if !self.config.nonterm_mode && self.config.const_cpx_check {
      self.check_constant_complexity(result, proof);
    }

    if Pruning::remove_leaves_and_unreachable(self.its) {
      proof.minor_step("Removed unreachable rules and leafs", self.its);
    }
    if self.remove_unsat_rules() {
      proof.minor_step("Removed rules with unsatisfiable guard", self.its);
    }
    if Pruning::remove_leaves_and_unreachable(self.its) {
      proof.minor_step("Removed unreachable rules and leafs", self.its);
    }

    if self.config.preprocessing {
      if self.preprocess_rules() {
        proof.minor_step("Simplified rules", self.its);
      }
    }

    // no lower bound can be proved for an empty problem
    if self.its.is_empty() {
      return;
    }

    let mut accelerated_once = false;

    while !self.is_fully_simplified() && !self.timeout.soft() {
      let mut outer_changed = false;

      // repeat acceleration and linear chaining as long as they progress
      loop {
        let mut changed = false;
        let mut accelerated_rules: BTreeSet<TransIdx> = BTreeSet::new();

        if self.accelerate_simple_loops(&mut accelerated_rules, proof) {
          changed = true;
          accelerated_once = true;
          proof.major_step("Accelerated simple loops", self.its);
        }
        if self.timeout.soft() {
          break;
        }

        if let Some(sub_proof) = chain_strategy::chain_accelerated_rules(
          self.its,
          self.config,
          &self.timeout,
          &accelerated_rules,
        ) {
          changed = true;
          proof.concat(sub_proof);
          proof.major_step("Chained accelerated rules with incoming rules", self.its);
        }

        if Pruning::remove_leaves_and_unreachable(self.its) {
          changed = true;
          proof.major_step("Removed unreachable locations and irrelevant leafs", self.its);
        }

        if let Some(sub_proof) =
            chain_strategy::chain_linear_paths(self.its, self.config, &self.timeout)
        {
          changed = true;
          proof.concat(sub_proof);
          proof.major_step("Eliminated locations on linear paths", self.its);
        }

        outer_changed |= changed;
        if !changed || self.timeout.soft() {
          break;
        }
      }

      if self.is_fully_simplified() || self.timeout.soft() {
        break;
      }

      // escalate when the cheap steps are stuck
      if let Some(sub_proof) =
          chain_strategy::chain_tree_paths(self.its, self.config, &self.timeout)
      {
        outer_changed = true;
        proof.concat(sub_proof);
        proof.major_step("Eliminated locations on tree-shaped paths", self.its);
      } else {
        let mut elimination_proof = Proof::new();
        if let Some(name) = chain_strategy::eliminate_a_location(
          self.its,
          self.config,
          &self.timeout,
          &mut elimination_proof,
        ) {
          outer_changed = true;
          proof.concat(elimination_proof);
          proof.major_step(&format!("Eliminated location {}", name), self.its);
        }
      }

      if self.is_fully_simplified() {
        break;
      }

      // merge duplicates and prune parallel rules once acceleration has
      // produced comparable complexities
      if accelerated_once && self.prune_rules() {
        outer_changed = true;
        proof.major_step("Applied pruning (of leafs and parallel rules)", self.its);
      }

      // nothing left that could make progress: salvage a partial result
      if !outer_changed {
        proof.warning("Simplification is stuck, continuing with the partial result");
        break;
      }
    }
  }

  fn ensure_nonnegative_costs(&mut self) -> bool {
    let mut changed = false;
    for id in self.its.all_transitions() {
      if let Some(new_rule) = Preprocess::ensure_nonnegative_cost(self.its.rule(id)) {
        self.its.remove_rule(id);
        self.its.add_rule(new_rule);
        changed = true;
      }
    }
    changed
  }

  /// Inserts a fresh start location when the initial one has incoming
  /// rules, so chaining never destroys entry points.
  fn ensure_proper_initial_location(&mut self) -> bool {
    if self.its.has_transitions_to(self.its.initial_location()) {
      let new_start = self.its.add_location();
      let old_start = self.its.initial_location();
      self.its.add_rule(Rule::dummy(new_start, old_start));
      self.its.set_initial_location(new_start);
      return true;
    }
    false
  }

  fn remove_unsat_rules(&mut self) -> bool {
    let mut changed = false;
    for id in self.its.all_transitions() {
      let guard = self.its.rule(id).guard().clone();
      if smt::check_guard(self.its.var_manager(), self.config, &guard) == SmtResult::Unsat {
        self.its.remove_rule(id);
        changed = true;
      }
    }
    changed
  }

  fn preprocess_rules(&mut self) -> bool {
    let mut changed = false;
    for id in self.its.all_transitions() {
      if self.timeout.soft() {
        return changed;
      }
      let rule = self.its.rule(id).clone();
      if let Some(new_rule) = Preprocess::preprocess_rule(self.its, self.config, &rule) {
        self.its.remove_rule(id);
        self.its.add_rule(new_rule);
        changed = true;
      }
    }

    // drop duplicates between every pair of adjacent locations
    for node in self.its.locations() {
      for succ in self.its.successor_locations(node) {
        let parallel = self.its.transitions_from_to(node, succ);
        if !Pruning::remove_duplicate_rules(self.its, &parallel, true).is_empty() {
          changed = true;
        }
      }
    }
    changed
  }

  fn is_fully_simplified(&self) -> bool {
    self
        .its
        .locations()
        .into_iter()
        .all(|loc| self.its.is_initial_location(loc) || !self.its.has_transitions_from(loc))
  }

  fn accelerate_simple_loops(
    &mut self,
    accelerated_rules: &mut BTreeSet<TransIdx>,
    proof: &mut Proof,
  ) -> bool {
    let mut changed = false;
    for loc in self.its.locations() {
      if self.timeout.soft() {
        break;
      }
      if let Some(sub_proof) = accelerate::accelerate_simple_loops(
        self.its,
        self.config,
        &self.timeout,
        loc,
        accelerated_rules,
      ) {
        proof.concat(sub_proof);
        changed = true;
      }
    }
    changed
  }

  fn prune_rules(&mut self) -> bool {
    let mut changed = Pruning::remove_leaves_and_unreachable(self.its);
    if self.config.pruning_enabled {
      changed |= Pruning::prune_parallel_rules(self.its, self.config, &self.timeout);
    }
    changed
  }

  /// The Omega(1) shortcut: some initial rule with satisfiable
  /// `guard && cost >= 1` witnesses constant complexity.
  fn check_constant_complexity(&mut self, result: &mut RuntimeResult, proof: &mut Proof) {
    for id in self.its.transitions_from(self.its.initial_location()) {
      let rule = self.its.rule(id);
      let mut guard = rule.guard().clone();
      guard.push(Relation::ge(rule.cost().clone(), Expr::one()));

      if smt::check_guard(self.its.var_manager(), self.config, &guard) == SmtResult::Sat {
        proof.newline();
        proof.result("The following rule witnesses the lower bound Omega(1):");
        proof.append(crate::its::print_labeled_rule(id, self.its));
        let rule = self.its.rule(id);
        result.update(
          rule.guard().clone(),
          rule.cost().clone(),
          rule.cost().clone(),
          Complexity::Const,
        );
        return;
      }
    }
  }

  // endregion

  // region Final complexity computation

  fn finalize(&mut self, result: &mut RuntimeResult) {
    if !self.timeout.soft() {
      // duplicates (ignoring updates) would only waste asymptotic checks
      let initial_rules = self.its.transitions_from(self.its.initial_location());
      if !Pruning::remove_duplicate_rules(self.its, &initial_rules, false).is_empty() {
        result.proof.section("Removed duplicate rules (ignoring updates)");
      }
    }

    result.proof.headline("Computing asymptotic complexity");

    if self.timeout.soft() || !self.is_fully_simplified() {
      // salvage what we can: drop constant paths, then contract levels
      self.remove_constant_paths_after_timeout();
      self.max_partial_result(result);
    } else {
      let rules = self.its.transitions_from(self.its.initial_location());
      self.max_runtime_of(&rules, result);
    }
  }

  fn max_runtime_of(&mut self, rules: &[TransIdx], result: &mut RuntimeResult) {
    if self.config.nonterm_mode {
      for id in rules {
        let rule = self.its.rule(*id);
        if !rule.cost().is_nonterm() {
          continue;
        }
        let guard = rule.guard().clone();
        if smt::check_guard(self.its.var_manager(), self.config, &guard) == SmtResult::Sat {
          result.update(guard, Expr::Nonterm, Expr::Nonterm, Complexity::Nonterm);
          result.proof.result(format!("Proved nontermination of rule {}.", id));
          return;
        }
      }
      return;
    }

    let mut todo: Vec<TransIdx> = rules.to_vec();
    todo.sort_by(|a, b| self.rule_priority(*a).cmp(&self.rule_priority(*b)));

    for id in todo {
      if self.timeout.hard() {
        break;
      }
      let mut rule = self.its.rule(id).clone();

      // the syntactic estimate is an upper bound, so unpromising rules can
      // be skipped; temporary variables may still hide unbounded cost
      let has_temp_var = !rule.cost().is_nonterm() && {
        let its = &self.its;
        rule.cost().has_variable_with(|v| its.is_temp_var(v))
      };
      if rule.cost().complexity() <= result.cpx.max(Complexity::Const) && !has_temp_var {
        continue;
      }

      result.proof.section(format!("Computing asymptotic complexity for rule {}", id));
      if let Some(simplified) = Preprocess::simplify_guard(&rule) {
        rule = simplified;
      }

      let budget = if self.timeout.soft() {
        Duration::from_millis(self.config.limit_timeout_final_fast_ms)
      } else {
        Duration::from_millis(self.config.limit_timeout_final_ms)
      };

      let is_polynomial = rule.cost().is_polynomial() && rule.guard().is_polynomial();
      let mut check_result = None;
      if is_polynomial && self.config.limit_strategy.smt_enabled() {
        check_result = Some(asymptotic::determine_complexity_via_smt(
          self.its,
          self.config,
          rule.guard(),
          rule.cost(),
          result.cpx,
          budget,
        ));
      }

      let needs_calculus = match &check_result {
        Some(res) => res.complexity == Complexity::Unknown,
        None      => true,
      };
      if needs_calculus && self.config.limit_strategy.calculus_enabled() {
        check_result = Some(asymptotic::determine_complexity(
          self.its,
          self.config,
          rule.guard(),
          rule.cost(),
          true,
          result.cpx,
          budget,
        ));
      }

      if let Some(res) = check_result {
        if res.complexity > result.cpx {
          result.proof.newline();
          result.proof.result(format!("Proved lower bound {}.", res.complexity));
          result.proof.sub_proof(res.proof.clone(), "limit calculus");
          result.update(
            rule.guard().clone(),
            rule.cost().clone(),
            res.solved_cost.clone(),
            res.complexity,
          );
          if result.cpx >= Complexity::Unbounded {
            return;
          }
        }
      }
    }
  }

  /// Sort key: non-terminating first, then likely-exponential, then costs
  /// with temporaries, then the syntactic bound, then small guards.
  fn rule_priority(&self, id: TransIdx) -> (bool, bool, bool, std::cmp::Reverse<u32>, usize) {
    let rule = self.its.rule(id);
    let cost = rule.cost().expand();
    let its = &self.its;
    let nonterm = cost.is_nonterm();
    let nonpoly = !cost.is_polynomial() && !nonterm;
    let has_temp = !nonterm && cost.has_variable_with(|v| its.is_temp_var(v));
    let degree = match cost.complexity() {
      Complexity::Poly(d) => d,
      Complexity::Const   => 0,
      _                   => u32::MAX,
    };
    (!nonterm, !nonpoly, !has_temp, std::cmp::Reverse(degree), rule.guard().len())
  }

  /// Removes every path whose reachable rules all have constant cost.
  fn remove_constant_paths_after_timeout(&mut self) {
    fn walk(its: &mut ItsProblem, current: LocationIdx, visited: &mut LocationSet) -> bool {
      if visited.contains(current) {
        return true; // loops back, nothing new here
      }
      visited.insert(current);

      for next in its.successor_locations(current) {
        if walk(its, next, visited) {
          for id in its.transitions_from_to(current, next) {
            if its.rule(id).cost().complexity() <= Complexity::Const {
              its.remove_rule(id);
            }
          }
        }
      }
      !its.has_transitions_from(current)
    }

    let mut visited = LocationSet::new();
    let initial = self.its.initial_location();
    walk(self.its, initial, &mut visited);
  }

  /// Repeatedly evaluates the rules at the initial location and contracts
  /// one level of the graph, until the hard timeout. Without timeouts the
  /// number of contractions is bounded instead.
  fn max_partial_result(&mut self, result: &mut RuntimeResult) {
    let initial = self.its.initial_location();
    let mut rounds = 0;

    loop {
      let rules = self.its.transitions_from(initial);
      self.max_runtime_of(&rules, result);
      if result.cpx >= Complexity::Unbounded || self.timeout.hard() {
        return;
      }
      rounds += 1;
      if !self.timeout.enabled() && rounds > 3 {
        return;
      }

      let successors: Vec<LocationIdx> = self
          .its
          .successor_locations(initial)
          .into_iter()
          .filter(|loc| *loc != initial)
          .collect();
      if successors.is_empty() {
        return;
      }

      let mut changed = false;
      for succ in successors {
        for first in self.its.transitions_from_to(initial, succ) {
          let first_rule = self.its.rule(first).clone();
          for second in self.its.transitions_from(succ) {
            if second == first {
              continue;
            }
            let second_rule = self.its.rule(second).clone();
            if let Some(chained) =
                chain_rules(self.its, self.config, &first_rule, &second_rule, true)
            {
              self.its.add_rule(chained);
              changed = true;
            }
            if self.timeout.hard() {
              return;
            }
          }
          self.its.remove_rule(first);
        }
      }
      if !changed {
        return;
      }
    }
  }

  // endregion
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::Substitution;
  use crate::its::{RuleLhs, RuleRhs, VariableManager};

  fn run(its: &mut ItsProblem, config: &Config) -> RuntimeResult {
    Analysis::new(its, config).run()
  }

  fn plain_config() -> Config {
    Config { plain_output: true, ..Config::default() }
  }

  /// start -> loop location, plus a counting loop `x > 0: x := x - 1`.
  fn counting_its() -> ItsProblem {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (mut its, start) = ItsProblem::with_start(vm, "start");
    let body = its.add_named_location("body");
    its.add_rule(Rule::new_linear(start, Guard::empty(), Expr::zero(), body, Substitution::new()));
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    let mut update = Substitution::new();
    update.put(x, Expr::var(x) - Expr::one());
    its.add_rule(Rule::new_linear(body, guard, Expr::one(), body, update));
    its
  }

  #[test]
  fn counting_loop_is_linear() {
    let mut its = counting_its();
    let config = plain_config();
    let result = run(&mut its, &config);
    assert_eq!(result.cpx, Complexity::Poly(1));
    assert_eq!(result.result_line(&config), "WORST_CASE(Omega(n^1),?)");
  }

  #[test]
  fn nested_loops_are_quadratic() {
    // outer: y > 0, y := y - 1, resets x := z; inner: x > 0 && y > 0,
    // x := x - 1 with cost 1
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let y = vm.add_fresh_variable("y");
    let z = vm.add_fresh_variable("z");
    let (mut its, start) = ItsProblem::with_start(vm, "start");
    let outer = its.add_named_location("outer");
    let inner = its.add_named_location("inner");

    its.add_rule(Rule::new_linear(start, Guard::empty(), Expr::zero(), outer, Substitution::new()));

    // outer -> inner: enter the inner loop, x := z
    let mut enter = Substitution::new();
    enter.put(x, Expr::var(z));
    its.add_rule(Rule::new_linear(
      outer,
      Guard::new(vec![Relation::gt(Expr::var(y), Expr::zero())]),
      Expr::zero(),
      inner,
      enter,
    ));

    // inner self loop: x > 0, x := x - 1, cost 1
    let mut dec_x = Substitution::new();
    dec_x.put(x, Expr::var(x) - Expr::one());
    its.add_rule(Rule::new_linear(
      inner,
      Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]),
      Expr::one(),
      inner,
      dec_x,
    ));

    // inner -> outer: y := y - 1
    let mut dec_y = Substitution::new();
    dec_y.put(y, Expr::var(y) - Expr::one());
    its.add_rule(Rule::new_linear(inner, Guard::empty(), Expr::zero(), outer, dec_y));

    let config = plain_config();
    let result = run(&mut its, &config);
    assert!(result.cpx >= Complexity::Poly(2), "got {}", result.cpx);
  }

  #[test]
  fn stuck_loop_is_nonterminating() {
    // x > 0 with identity update and positive cost
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (mut its, start) = ItsProblem::with_start(vm, "start");
    let body = its.add_named_location("body");
    its.add_rule(Rule::new_linear(start, Guard::empty(), Expr::zero(), body, Substitution::new()));
    its.add_rule(Rule::new_linear(
      body,
      Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]),
      Expr::one(),
      body,
      Substitution::new(),
    ));

    let config = plain_config();
    let result = run(&mut its, &config);
    assert_eq!(result.cpx, Complexity::Nonterm);
    assert_eq!(result.result_line(&config), "WORST_CASE(NON_TERM,?)");

    // the same system in nontermination mode answers NO
    let mut its = {
      let mut vm = VariableManager::new();
      let x = vm.add_fresh_variable("x");
      let (mut its, start) = ItsProblem::with_start(vm, "start");
      let body = its.add_named_location("body");
      its.add_rule(Rule::new_linear(start, Guard::empty(), Expr::zero(), body, Substitution::new()));
      its.add_rule(Rule::new_linear(
        body,
        Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]),
        Expr::one(),
        body,
        Substitution::new(),
      ));
      its
    };
    let nonterm_config = Config { nonterm_mode: true, ..plain_config() };
    let result = run(&mut its, &nonterm_config);
    assert_eq!(result.result_line(&nonterm_config), "NO");
  }

  #[test]
  fn doubling_loop_is_at_least_exponential() {
    // x > 0, x := 2x with cost x
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (mut its, start) = ItsProblem::with_start(vm, "start");
    let body = its.add_named_location("body");
    its.add_rule(Rule::new_linear(start, Guard::empty(), Expr::zero(), body, Substitution::new()));
    let mut update = Substitution::new();
    update.put(x, Expr::int(2) * Expr::var(x));
    its.add_rule(Rule::new_linear(
      body,
      Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]),
      Expr::var(x),
      body,
      update,
    ));

    let config = plain_config();
    let result = run(&mut its, &config);
    assert!(result.cpx >= Complexity::Exp, "got {}", result.cpx);
  }

  #[test]
  fn race_between_counters_is_linear() {
    // x > y, x := x - 1, y := y + 1, cost 1
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let y = vm.add_fresh_variable("y");
    let (mut its, start) = ItsProblem::with_start(vm, "start");
    let body = its.add_named_location("body");
    its.add_rule(Rule::new_linear(start, Guard::empty(), Expr::zero(), body, Substitution::new()));
    let mut update = Substitution::new();
    update.put(x, Expr::var(x) - Expr::one());
    update.put(y, Expr::var(y) + Expr::one());
    its.add_rule(Rule::new_linear(
      body,
      Guard::new(vec![Relation::gt(Expr::var(x), Expr::var(y))]),
      Expr::one(),
      body,
      update,
    ));

    let config = plain_config();
    let result = run(&mut its, &config);
    assert!(result.cpx >= Complexity::Poly(1), "got {}", result.cpx);
  }

  #[test]
  fn constant_shortcut() {
    // a single initial rule with cost 1 and an unrelated zero-cost rest
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (mut its, start) = ItsProblem::with_start(vm, "start");
    let end = its.add_named_location("end");
    its.add_rule(Rule::new_linear(
      start,
      Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]),
      Expr::one(),
      end,
      Substitution::new(),
    ));
    its.add_rule(Rule::new_linear(end, Guard::empty(), Expr::zero(), end, Substitution::new()));

    let config = plain_config();
    let result = run(&mut its, &config);
    assert!(result.cpx >= Complexity::Const, "got {}", result.cpx);
  }

  #[test]
  fn empty_problem_stays_unknown() {
    let vm = VariableManager::new();
    let (mut its, _) = ItsProblem::with_start(vm, "start");
    let config = plain_config();
    let result = run(&mut its, &config);
    assert_eq!(result.cpx, Complexity::Unknown);
    assert_eq!(result.result_line(&config), "MAYBE");
  }

  #[test]
  fn nonlinear_rule_with_two_branches() {
    // a nonlinear rule whose two branches both count down
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (mut its, start) = ItsProblem::with_start(vm, "start");
    let body = its.add_named_location("body");
    its.add_rule(Rule::new_linear(start, Guard::empty(), Expr::zero(), body, Substitution::new()));
    let mut update = Substitution::new();
    update.put(x, Expr::var(x) - Expr::one());
    its.add_rule(Rule::new(
      RuleLhs::new(
        body,
        Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]),
        Expr::one(),
      ),
      vec![RuleRhs::new(body, update.clone()), RuleRhs::new(body, update)],
    ));

    let config = plain_config();
    let result = run(&mut its, &config);
    // both branches shrink x, so the runtime is at least linear; partial
    // deletion may even find the exponential bound
    assert!(result.cpx >= Complexity::Poly(1), "got {}", result.cpx);
  }
}
