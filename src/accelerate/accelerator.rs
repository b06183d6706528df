/*!

  The acceleration strategy layer. For every simple loop at a location it
  tries forward acceleration (metering), falls back to the calculus
  (backward), applies partial deletion to stubborn nonlinear rules, and
  nests pairs of accelerated loops. Accelerated rules replace the original
  loops unless acceleration failed, in which case the loop is kept for
  chaining.

*/

use std::collections::BTreeSet;
use std::time::Duration;

use log::debug;

use crate::analysis::{chain_rules, Preprocess, Pruning};
use crate::asymptotic;
use crate::complexity::Complexity;
use crate::config::Config;
use crate::expr::Expr;
use crate::its::{ItsProblem, Rule};
use crate::proof::Proof;
use crate::smt::{self, SmtResult};
use crate::timeout::Timeout;
use crate::{LocationIdx, TransIdx};

use super::calculus;
use super::forward::{self, ForwardStatus, MeteredRule};
use super::strengthening;

/// Envelope for one acceleration attempt.
#[derive(Clone, Debug)]
pub enum AccelerationStatus {
  Success,
  PartialSuccess,
  Failure,
}

#[derive(Clone, Debug)]
pub struct AccelerationResult {
  pub status: AccelerationStatus,
  pub rules : Vec<MeteredRule>,
  pub proof : Proof,
}

impl AccelerationResult {
  fn failure() -> AccelerationResult {
    AccelerationResult {
      status: AccelerationStatus::Failure,
      rules : Vec::new(),
      proof : Proof::new(),
    }
  }

  fn succeeded(&self) -> bool {
    !matches!(self.status, AccelerationStatus::Failure)
  }
}

// Potential candidate for nesting: the original rule and its accelerated
// counterpart, with the complexity reached so far.
#[derive(Clone, Debug)]
struct NestingCandidate {
  old_rule: TransIdx,
  new_rule: TransIdx,
  cpx     : Complexity,
}

struct Accelerator<'a> {
  its            : &'a mut ItsProblem,
  config         : &'a Config,
  timeout        : &'a Timeout,
  target_loc     : LocationIdx,
  sink_loc       : LocationIdx,
  resulting_rules: &'a mut BTreeSet<TransIdx>,
  keep_rules     : BTreeSet<TransIdx>,
  proof          : Proof,
}

impl<'a> Accelerator<'a> {
  fn add_resulting_rule(&mut self, rule: Rule) -> TransIdx {
    let id = self.its.add_rule(rule);
    self.resulting_rules.insert(id);
    id
  }

  fn complexity_of(&mut self, guard: &crate::expr::Guard, cost: &Expr) -> Complexity {
    asymptotic::determine_complexity_via_smt(
      self.its,
      self.config,
      guard,
      cost,
      Complexity::Unknown,
      Duration::from_millis(self.config.limit_timeout_ms),
    )
    .complexity
  }

  // region Preprocessing

  /// Simplifies all simple loops and removes duplicates among them. This
  /// is especially useful to eliminate temporaries before metering.
  fn simplify_simple_loops(&mut self) -> bool {
    let mut changed = false;
    if self.config.simplify_before_accel {
      for id in self.its.simple_loops_at(self.target_loc) {
        if let Some(simplified) = Preprocess::simplify_rule(self.its, self.its.rule(id)) {
          self.its.remove_rule(id);
          self.its.add_rule(simplified);
          changed = true;
        }
        if self.timeout.soft() {
          return changed;
        }
      }
    }
    let loops = self.its.simple_loops_at(self.target_loc);
    if !Pruning::remove_duplicate_rules(self.its, &loops, true).is_empty() {
      changed = true;
    }
    changed
  }

  // endregion

  // region Unrolling

  /// Chains a loop with itself when the update oscillates (negative linear
  /// self-coefficient) or when self-chaining strictly grows the set of
  /// constant-updated variables.
  fn unroll(&self, rule: &Rule) -> Option<Rule> {
    debug_assert!(rule.is_linear());
    let update = rule.update(0);

    let oscillates = update.iter().any(|(var, value)| {
      value.contains_var(*var)
          && value.is_polynomial_in(*var)
          && value.degree(*var) == 1
          && value
              .coeff(*var, 1)
              .as_number()
              .map(num_traits::Signed::is_negative)
              .unwrap_or(false)
    });
    if oscillates {
      return chain_rules(self.its, self.config, rule, rule, false);
    }

    let constant_updates = |r: &Rule| {
      r.update(0)
          .iter()
          .filter(|(var, value)| {
            !value.variables().is_empty() && !value.contains_var(**var)
          })
          .count()
    };
    let chained = chain_rules(self.its, self.config, rule, rule, false)?;
    if constant_updates(&chained) != constant_updates(rule) {
      Some(chained)
    } else {
      None
    }
  }

  // endregion

  // region Acceleration

  /// Forward acceleration first, then the calculus; nontermination
  /// witnesses from the calculus are always collected.
  fn try_accelerate(&mut self, rule: &Rule) -> AccelerationResult {
    if !rule.is_linear() {
      let result = forward::forward_accelerate(self.its, self.config, rule, self.sink_loc);
      return match result.status {
        ForwardStatus::Success                => AccelerationResult {
          status: AccelerationStatus::Success,
          rules : result.rules,
          proof : Proof::new(),
        },
        ForwardStatus::SuccessWithRestriction => AccelerationResult {
          status: AccelerationStatus::PartialSuccess,
          rules : result.rules,
          proof : Proof::new(),
        },
        _                                     => AccelerationResult::failure(),
      };
    }

    // unroll if necessary
    let unrolled = self.unroll(rule);
    if unrolled.is_some() {
      self.proof.section("Unrolled loop before acceleration");
    }
    let rule = unrolled.as_ref().unwrap_or(rule);

    if smt::check_guard(self.its.var_manager(), self.config, rule.guard()) != SmtResult::Sat {
      return AccelerationResult::failure();
    }

    let mut rules: Vec<MeteredRule> = Vec::new();
    let mut restricted = false;

    let forward_result = forward::forward_accelerate(self.its, self.config, rule, self.sink_loc);
    let forward_succeeded = forward_result.succeeded();
    restricted |= forward_result.status == ForwardStatus::SuccessWithRestriction;
    rules.extend(forward_result.rules);

    let (calculus_rules, mut calculus_proof) =
        calculus::accelerate_loop(self.its, self.config, rule, self.sink_loc);
    for accelerated in calculus_rules {
      // when forward acceleration already described the iterated behaviour,
      // the calculus only contributes nontermination witnesses
      if accelerated.nonterm || !forward_succeeded {
        rules.push(MeteredRule { info: accelerated.info, rule: accelerated.rule });
      }
    }

    // last resort: extend the guard by a Farkas-found invariant and retry
    if rules.is_empty() {
      for strengthened in
          strengthening::strengthen_by_invariants(self.its, self.config, rule)
      {
        if let Some(accelerated) =
            forward::accelerate_fast(self.its, self.config, &strengthened, self.sink_loc)
        {
          rules.push(MeteredRule {
            info: format!("{} (after invariant strengthening)", accelerated.info),
            rule: accelerated.rule,
          });
        }
        let (retry_rules, retry_proof) =
            calculus::accelerate_loop(self.its, self.config, &strengthened, self.sink_loc);
        calculus_proof.concat(retry_proof);
        for accelerated in retry_rules {
          rules.push(MeteredRule {
            info: format!("{} (after invariant strengthening)", accelerated.info),
            rule: accelerated.rule,
          });
        }
        if !rules.is_empty() {
          restricted = true;
          break;
        }
      }
    }

    if rules.is_empty() {
      AccelerationResult::failure()
    } else {
      let status = if restricted {
        AccelerationStatus::PartialSuccess
      } else {
        AccelerationStatus::Success
      };
      AccelerationResult { status, rules, proof: calculus_proof }
    }
  }

  /// Retries a failing nonlinear rule after deleting right-hand sides:
  /// pairs first (still exponential), single rhss last.
  fn accelerate_or_shorten(&mut self, rule: &Rule) -> AccelerationResult {
    let result = self.try_accelerate(rule);
    if !self.config.partial_deletion || rule.is_linear() || result.succeeded() {
      return result;
    }

    let rhss = rule.rhss();
    let mut candidates: Vec<Rule> = Vec::new();
    for i in 0..rhss.len() {
      for j in i + 1..rhss.len() {
        candidates.push(Rule::new(
          rule.lhs().clone(),
          vec![rhss[i].clone(), rhss[j].clone()],
        ));
      }
    }
    for rhs in rhss {
      candidates.push(Rule::new(rule.lhs().clone(), vec![rhs.clone()]));
    }

    for candidate in candidates {
      if self.timeout.soft() {
        break;
      }
      let shortened = self.try_accelerate(&candidate);
      if shortened.succeeded() {
        let rules = shortened
            .rules
            .into_iter()
            .map(|m| MeteredRule {
              info: format!("{} (after partial deletion)", m.info),
              rule: m.rule,
            })
            .collect();
        return AccelerationResult {
          status: AccelerationStatus::PartialSuccess,
          rules,
          proof : shortened.proof,
        };
      }
    }

    result
  }

  // endregion

  // region Nesting

  fn nest_rules(&mut self, inner: &NestingCandidate, outer: &NestingCandidate) {
    // avoid nesting a loop with itself
    if inner.old_rule == outer.old_rule {
      return;
    }
    if !self.its.has_rule(inner.new_rule) || !self.its.has_rule(outer.new_rule) {
      return;
    }
    let first = self.its.rule(inner.new_rule).clone();
    let second = self.its.rule(outer.new_rule).clone();
    if first.cost().has_nonterm() || second.cost().has_nonterm() {
      return;
    }

    let nested = match chain_rules(self.its, self.config, &first, &second, true) {
      Some(nested) => nested,
      None         => return,
    };
    let nested = Preprocess::simplify_rule(self.its, &nested).unwrap_or(nested);
    if !nested.is_simple_loop() || !nested.is_linear() {
      return;
    }

    let current = inner.cpx.max(outer.cpx);
    let (accelerated, _) =
        calculus::accelerate_loop(self.its, self.config, &nested, self.sink_loc);
    for candidate in accelerated {
      if candidate.nonterm {
        continue;
      }
      let guard = candidate.rule.guard().clone();
      let cost = candidate.rule.cost().clone();
      let cpx = self.complexity_of(&guard, &cost);
      if cpx > current {
        let added = self.add_resulting_rule(candidate.rule.clone());
        self.keep_rules.remove(&outer.old_rule);
        self.proof.append(format!(
          "Nested simple loops {} (outer) and {} (inner), yielding rule {}.",
          outer.old_rule, inner.old_rule, added
        ));
        // also try the nested rule prefixed by the outer accelerated loop
        if let Some(chained) =
            chain_rules(self.its, self.config, &second, &candidate.rule, true)
        {
          let extra = self.add_resulting_rule(chained);
          self.proof.append(format!("Chained with the outer loop, yielding rule {}.", extra));
        }
      }
    }
  }

  fn perform_nesting(&mut self, orig: Vec<NestingCandidate>, todo: Vec<NestingCandidate>) {
    for inner in &orig {
      for outer in &orig {
        if inner.old_rule != outer.old_rule {
          self.nest_rules(inner, outer);
        }
        if self.timeout.soft() {
          return;
        }
      }
    }
    for inner in &orig {
      for outer in &todo {
        self.nest_rules(inner, outer);
        self.nest_rules(outer, inner);
        if self.timeout.soft() {
          return;
        }
      }
    }
  }

  // endregion

  // region Main algorithm

  fn run(&mut self) {
    self.simplify_simple_loops();

    let loops = self.its.simple_loops_at(self.target_loc);
    if loops.is_empty() {
      return;
    }

    // original linear loops are candidates for outer loops when nesting
    let mut orig_candidates: Vec<NestingCandidate> = Vec::new();
    for id in &loops {
      let rule = self.its.rule(*id);
      if rule.is_linear() {
        let guard = rule.guard().clone();
        let cost = rule.cost().clone();
        let cpx = self.complexity_of(&guard, &cost);
        orig_candidates.push(NestingCandidate { old_rule: *id, new_rule: *id, cpx });
      }
    }

    let mut nesting_candidates: Vec<NestingCandidate> = Vec::new();
    for id in &loops {
      if self.timeout.soft() {
        return;
      }
      let rule = self.its.rule(*id).clone();
      let result = self.accelerate_or_shorten(&rule);
      self.proof.concat(result.proof.clone());

      if !matches!(result.status, AccelerationStatus::Success) {
        self.keep_rules.insert(*id);
      }
      if result.succeeded() {
        for metered in result.rules {
          let accelerated_rule = metered.rule.clone();
          let added = self.add_resulting_rule(metered.rule);
          self.proof.append(format!(
            "Accelerated rule {} with {}, yielding rule {}.",
            id, metered.info, added
          ));
          if accelerated_rule.is_simple_loop() && accelerated_rule.is_linear() {
            let guard = accelerated_rule.guard().clone();
            let cost = accelerated_rule.cost().clone();
            let cpx = self.complexity_of(&guard, &cost);
            nesting_candidates.push(NestingCandidate {
              old_rule: *id,
              new_rule: added,
              cpx,
            });
          }
        }
      } else {
        self.proof.append(format!("Failed to accelerate rule {}.", id));
      }
    }

    if self.config.try_nesting {
      self.perform_nesting(orig_candidates, nesting_candidates);
      if self.timeout.soft() {
        return;
      }
    }

    // simplify the guards of accelerated rules; acceleration and nesting
    // tend to leave superfluous constraints behind
    for id in self.resulting_rules.clone() {
      if !self.its.has_rule(id) {
        continue;
      }
      if let Some(simplified) = Preprocess::simplify_guard(self.its.rule(id)) {
        self.its.remove_rule(id);
        self.resulting_rules.remove(&id);
        let added = self.its.add_rule(simplified);
        self.resulting_rules.insert(added);
      }
    }

    self.remove_old_loops(&loops);

    // drop the sink again if nothing ended up using it
    if !self.its.has_transitions_to(self.sink_loc) {
      self.its.remove_only_location(self.sink_loc);
    }
  }

  fn remove_old_loops(&mut self, loops: &[TransIdx]) {
    let mut removed = Vec::new();
    for id in loops {
      if !self.keep_rules.contains(id) && self.its.has_rule(*id) {
        self.its.remove_rule(*id);
        removed.push(*id);
      }
    }
    if !removed.is_empty() {
      self.proof.deletion(&removed);
    }

    // loops kept for chaining take part in the follow-up steps as well
    for id in &self.keep_rules {
      self.resulting_rules.insert(*id);
    }

    // similar loops can produce identical accelerated rules
    let resulting: Vec<TransIdx> = self.resulting_rules.iter().copied().collect();
    let duplicates = Pruning::remove_duplicate_rules(self.its, &resulting, true);
    for id in duplicates {
      self.resulting_rules.remove(&id);
    }
  }

  // endregion
}

/// Accelerates all simple loops at the given location. Returns the proof of
/// the performed steps, or `None` if there were no simple loops.
pub fn accelerate_simple_loops(
  its: &mut ItsProblem,
  config: &Config,
  timeout: &Timeout,
  loc: LocationIdx,
  resulting_rules: &mut BTreeSet<TransIdx>,
) -> Option<Proof> {
  if its.simple_loops_at(loc).is_empty() {
    return None;
  }
  debug!("accelerating simple loops at location {}", loc);

  // fresh sink per run, for nonterm and nonlinear rules
  let sink_loc = its.add_location();
  let mut accelerator = Accelerator {
    its,
    config,
    timeout,
    target_loc: loc,
    sink_loc,
    resulting_rules,
    keep_rules: BTreeSet::new(),
    proof: Proof::new(),
  };
  accelerator.run();
  Some(accelerator.proof.clone())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::{Guard, Relation, Substitution};
  use crate::its::VariableManager;

  #[test]
  fn loops_are_replaced_by_accelerated_rules() {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (mut its, start) = ItsProblem::with_start(vm, "f");
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    let mut update = Substitution::new();
    update.put(x, Expr::var(x) - Expr::one());
    let original = its.add_rule(Rule::new_linear(start, guard, Expr::one(), start, update));

    let config = Config::default();
    let timeout = Timeout::disabled();
    let mut resulting = BTreeSet::new();
    let proof =
        accelerate_simple_loops(&mut its, &config, &timeout, start, &mut resulting);
    assert!(proof.is_some());
    assert!(!resulting.is_empty());
    // the original loop is gone, an accelerated one exists
    assert!(!its.has_rule(original));
    let accelerated = resulting.iter().find(|id| its.has_rule(**id)).unwrap();
    assert!(its.rule(*accelerated).cost().complexity() >= Complexity::Poly(1));
  }

  #[test]
  fn nonterminating_loop_yields_sink_rule() {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (mut its, start) = ItsProblem::with_start(vm, "f");
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    its.add_rule(Rule::new_linear(start, guard, Expr::one(), start, Substitution::new()));

    let config = Config::default();
    let timeout = Timeout::disabled();
    let mut resulting = BTreeSet::new();
    accelerate_simple_loops(&mut its, &config, &timeout, start, &mut resulting);

    let has_nonterm = resulting
        .iter()
        .filter(|id| its.has_rule(**id))
        .any(|id| its.rule(*id).cost().is_nonterm());
    assert!(has_nonterm);
  }
}
