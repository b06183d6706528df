/*!

  Determines the asymptotic complexity of a single rule's guard and cost.
  The guard is normalized, turned into a limit problem, and solved either by
  the direct SMT encoding (polynomial problems) or by the limit calculus:
  transformations are applied in a cheap-first order, alternative branches
  are pushed onto a backtracking stack, and solved problems are turned into
  a variable assignment whose dominant term gives the complexity.

*/

use std::time::{Duration, Instant};

use num_traits::{Signed, ToPrimitive};

use crate::complexity::Complexity;
use crate::config::Config;
use crate::expr::{Expr, Guard, Relation, Substitution};
use crate::its::ItsProblem;
use crate::proof::Proof;
use crate::smt::{self, SmtResult, Solver};
use crate::VariableIdx;

use super::limit_problem::{InftyExpression, LimitProblem};
use super::limit_smt;
use super::limit_vector::{self, Direction, LimitVector};

/// Result of the asymptotic complexity computation.
#[derive(Clone, Debug)]
pub struct AsymptoticResult {
  pub complexity        : Complexity,
  /// The cost after expressing all variables in terms of `n`.
  pub solved_cost       : Expr,
  /// Whether some non-temporary variable needed a super-linear solution.
  pub upper_bound_gt_one: bool,
  /// The number of variables that grow with `n`.
  pub infty_vars        : usize,
  pub proof             : Proof,
}

impl AsymptoticResult {
  pub fn unknown() -> AsymptoticResult {
    AsymptoticResult {
      complexity        : Complexity::Unknown,
      solved_cost       : Expr::zero(),
      upper_bound_gt_one: false,
      infty_vars        : 0,
      proof             : Proof::new(),
    }
  }
}

#[derive(Clone, Debug)]
struct ComplexityResult {
  solution   : Substitution,
  complexity : Complexity,
  upper_bound: u32,
  infty_vars : usize,
}

impl ComplexityResult {
  fn none() -> ComplexityResult {
    ComplexityResult {
      solution   : Substitution::new(),
      complexity : Complexity::Unknown,
      upper_bound: 0,
      infty_vars : 0,
    }
  }
}

struct AsymptoticBound<'a> {
  its           : &'a mut ItsProblem,
  config        : &'a Config,
  guard         : Guard,
  cost          : Expr,
  final_check   : bool,
  limit_problems: Vec<LimitProblem>,
  solved        : Vec<LimitProblem>,
  substitutions : Vec<Substitution>,
  best          : ComplexityResult,
  proof         : Proof,
  deadline      : Instant,
}

impl<'a> AsymptoticBound<'a> {
  fn timed_out(&self) -> bool {
    Instant::now() >= self.deadline
  }

  fn record_solved(&mut self, problem: &LimitProblem) {
    self.solved.push(problem.clone());
    self.proof.append("Solved the limit problem by the following transformations:");
    for line in problem.proof_log() {
      self.proof.append(line.clone());
    }
  }

  // region Solution evaluation

  /// Composes the substitution chain of a solved problem with its final
  /// solution; variables untouched by the chain are frozen to zero.
  fn calc_solution(&self, problem: &LimitProblem) -> Substitution {
    debug_assert!(problem.is_solved());
    let mut solution = Substitution::new();
    for index in problem.substitution_indices() {
      solution = solution.compose(&self.substitutions[*index]);
    }
    solution = solution.compose(&problem.solution());

    let mut zero = Substitution::new();
    let mut vars = self.guard.variables();
    self.cost.collect_variables(&mut vars);
    for var in vars {
      if !solution.contains(var) {
        zero.put(var, Expr::zero());
      }
    }
    solution.compose(&zero)
  }

  /// The highest degree of `n` among the solutions of non-temporary
  /// variables.
  fn find_upper_bound(&self, problem: &LimitProblem, solution: &Substitution) -> u32 {
    let n = problem.n();
    let mut upper_bound = 0;
    for (var, value) in solution.iter() {
      if !self.its.is_temp_var(*var) {
        upper_bound = upper_bound.max(value.degree(n));
      }
    }
    upper_bound
  }

  /// The degree of the solved cost in `n`, or, for exponential costs, the
  /// largest base coded as a negative number.
  fn find_lower_bound(&self, problem: &LimitProblem, solution: &Substitution) -> i64 {
    let n = problem.n();
    let solved_cost = self.cost.subs(solution).expand();

    if solved_cost.is_polynomial_in(n) && solved_cost.is_polynomial() {
      return solved_cost.degree(n) as i64;
    }

    let mut powers = Vec::new();
    solved_cost.collect_powers(&mut powers);
    let mut lower_bound: i64 = 1;
    for power in powers {
      if let Expr::Pow(base, exponent) = &power {
        if exponent.contains_var(n) && exponent.is_polynomial_in(n) {
          if let Some(value) = base.as_number() {
            if value.is_integer() && value.is_positive() {
              if let Some(base) = value.to_integer().to_i64() {
                lower_bound = lower_bound.max(base);
              }
            }
          }
        }
      }
    }
    // a negative number marks an exponential bound
    -lower_bound
  }

  fn get_complexity(&mut self, problem: &LimitProblem) -> ComplexityResult {
    let solution = self.calc_solution(problem);
    let upper_bound = self.find_upper_bound(problem, &solution);
    let infty_vars = solution.iter().filter(|(_, value)| value.as_number().is_none()).count();

    let complexity;
    if infty_vars == 0 {
      complexity = Complexity::Unknown;
    } else if upper_bound == 0 {
      // only temporary variables grow: the cost is unbounded in the input
      complexity = Complexity::Unbounded;
    } else {
      let lower_bound = self.find_lower_bound(problem, &solution);
      if lower_bound < 0 {
        // exponential, unless the exponent might be sublinear
        complexity = if upper_bound > 1 { Complexity::Unknown } else { Complexity::Exp };
      } else {
        complexity = Complexity::poly(lower_bound as u32 / upper_bound);
      }
    }

    let result = ComplexityResult {
      solution,
      complexity,
      upper_bound,
      infty_vars,
    };
    if result.complexity > self.best.complexity {
      self.best = result.clone();
    }
    result
  }

  /// A solution is adequate when no better one is to be expected from
  /// further backtracking.
  fn is_adequate(&mut self, problem: &LimitProblem) -> bool {
    let result = self.get_complexity(problem);
    if result.complexity == Complexity::Unbounded {
      return true;
    }
    if self.cost.complexity() > result.complexity {
      return false;
    }
    let n = problem.n();
    let solved_cost = self.cost.subs(&result.solution).expand();
    if solved_cost.is_polynomial_in(n) {
      if !self.cost.is_polynomial() {
        return false;
      }
      if self.cost.max_degree() > solved_cost.degree(n) {
        return false;
      }
    }
    // unrestricted temporaries might still push the result to unbounded
    let its = &self.its;
    !self.cost.has_variable_with(|v| its.is_temp_var(v))
  }

  // endregion

  // region Bound propagation

  /// Builds substitutions from guard equalities and variable bounds and
  /// seeds the backtracking stack with their combinations.
  fn propagate_bounds(&mut self, mut current: LimitProblem) {
    if current.is_unsolvable() {
      return;
    }

    // substitutions from equalities, solved for a variable with a trivial
    // coefficient; temporary variables are preferred
    for relation in self.guard.clone() {
      if !relation.is_equality() {
        continue;
      }
      let target = (relation.rhs().clone() - relation.lhs().clone()).expand();
      if !target.is_polynomial() {
        continue;
      }
      let mut vars: Vec<VariableIdx> = target.variables().into_iter().collect();
      vars.sort_by_key(|v| !self.its.is_temp_var(*v));
      for var in vars {
        if let Some(solved) = solve_term_for(&target, var) {
          self.substitutions.push(Substitution::single(var, solved));
          break;
        }
      }
    }
    let equation_count = self.substitutions.len();
    for index in 0..equation_count {
      let sub = self.substitutions[index].clone();
      current.substitute(&sub, index);
    }
    if current.is_unsolvable() {
      return;
    }

    // substitutions from inequalities with a variable on one side
    for relation in self.guard.clone() {
      if relation.is_equality() || relation.op() == crate::expr::RelOp::Neq {
        continue;
      }
      let (var, bound) = match (relation.lhs().as_var(), relation.rhs().as_var()) {
        (Some(v), _) if !relation.rhs().contains_var(v) => (v, false),
        (_, Some(v)) if !relation.lhs().contains_var(v) => (v, true),
        _ => continue,
      };

      let in_problem = current
          .expressions()
          .iter()
          .any(|ex| ex.expr.contains_var(var));
      if !in_problem {
        continue;
      }

      // bring into `var <= r` or `r <= var` shape and tighten strict bounds
      let value = if bound {
        relation.lhs().clone()
      } else {
        relation.rhs().clone()
      };
      if !value.is_polynomial() {
        continue;
      }
      use crate::expr::RelOp;
      let adjusted = match (relation.op(), bound) {
        (RelOp::Lt, false) => value - Expr::one(),        // var < r
        (RelOp::Gt, false) => value + Expr::one(),        // var > r
        (RelOp::Lt, true)  => value + Expr::one(),        // r < var
        (RelOp::Gt, true)  => value - Expr::one(),        // r > var
        _                  => value,
      };
      self.substitutions.push(Substitution::single(var, adjusted.expand()));
    }

    // all combinations of the bound substitutions (when affordable)
    let bound_count = self.substitutions.len() - equation_count;
    if self.final_check && bound_count <= 10 && bound_count > 0 {
      let all = (1u32 << bound_count) - 1;
      for combination in 1..all {
        let mut problem = current.clone();
        for bit in 0..bound_count {
          if combination & (1u32 << bit) != 0 {
            let index = equation_count + bit;
            let sub = self.substitutions[index].clone();
            problem.substitute(&sub, index);
          }
        }
        if !problem.is_unsolvable() {
          self.limit_problems.push(problem);
        }
      }
    }

    // the plain problem without bound substitutions
    if !current.is_unsolvable() {
      self.limit_problems.push(current.clone());
    }

    // the problem with all bound substitutions
    if bound_count > 0 {
      let mut problem = current;
      for index in equation_count..self.substitutions.len() {
        let sub = self.substitutions[index].clone();
        problem.substitute(&sub, index);
      }
      if !problem.is_unsolvable() {
        self.limit_problems.push(problem);
      }
    }
  }

  fn remove_unsat_problems(&mut self) {
    let discard = self.config.problem_discard_size;
    let final_check = self.final_check;
    let vm = self.its.var_manager();
    let config = self.config;
    self.limit_problems.retain(|problem| {
      match smt::check_guard(vm, config, &problem.query()) {
        SmtResult::Unsat   => false,
        SmtResult::Unknown => final_check || problem.size() < discard,
        SmtResult::Sat     => true,
      }
    });
  }

  // endregion

  // region Calculus transformations

  fn create_backtracking_point(&mut self, current: &LimitProblem, ex: &InftyExpression, dir: Direction) {
    debug_assert!(dir == Direction::PosInf || dir == Direction::PosCons);
    if self.final_check && ex.dir == Direction::Pos {
      let mut copy = current.clone();
      copy.add_expression(InftyExpression::new(ex.expr.clone(), dir));
      if !copy.is_unsolvable() {
        self.limit_problems.push(copy);
      }
    }
  }

  fn try_removing_constant(&mut self, current: &mut LimitProblem) -> bool {
    for ex in current.expressions() {
      if current.remove_constant_is_applicable(&ex) {
        current.remove_constant(&ex);
        return true;
      }
    }
    false
  }

  fn try_trimming_polynomial(&mut self, current: &mut LimitProblem) -> bool {
    for ex in current.expressions() {
      if current.trim_polynomial_is_applicable(&ex) {
        self.create_backtracking_point(current, &ex, Direction::PosCons);
        current.trim_polynomial(&ex);
        return true;
      }
    }
    false
  }

  fn try_reducing_exp(&mut self, current: &mut LimitProblem) -> bool {
    for ex in current.expressions() {
      if current.reduce_exp_is_applicable(&ex) {
        self.create_backtracking_point(current, &ex, Direction::PosCons);
        current.reduce_exp(&ex);
        return true;
      }
    }
    false
  }

  fn try_reducing_general_exp(&mut self, current: &mut LimitProblem) -> bool {
    for ex in current.expressions() {
      if current.reduce_general_exp_is_applicable(&ex) {
        self.create_backtracking_point(current, &ex, Direction::PosCons);
        current.reduce_general_exp(&ex);
        return true;
      }
    }
    false
  }

  /// Freezes one variable to a model value obtained from the SMT driver.
  fn try_instantiating_variable(&mut self, current: &mut LimitProblem) -> bool {
    for ex in current.expressions() {
      let dir = ex.dir;
      if ex.expr.has_exactly_one_variable()
          && matches!(dir, Direction::Pos | Direction::PosCons | Direction::NegCons)
      {
        let mut solver = Solver::new(self.its.var_manager(), self.config);
        solver.add_guard(&current.query());
        match solver.check() {
          SmtResult::Unsat => {
            current.set_unsolvable();
          }
          SmtResult::Sat   => {
            let var = ex.expr.get_a_variable().unwrap();
            let value = Expr::num(solver.model().get(var));
            self.substitutions.push(Substitution::single(var, value));
            self.create_backtracking_point(current, &ex, Direction::PosInf);
            let index = self.substitutions.len() - 1;
            let sub = self.substitutions[index].clone();
            current.substitute(&sub, index);
          }
          SmtResult::Unknown => {
            if !self.final_check && current.size() >= self.config.problem_discard_size {
              current.set_unsolvable();
            }
            return false;
          }
        }
        return true;
      }
    }
    false
  }

  /// Replaces one variable by another when their directions line up.
  fn try_substituting_variable(&mut self, current: &mut LimitProblem) -> bool {
    let expressions = current.expressions();
    for (index, first) in expressions.iter().enumerate() {
      if !first.expr.is_var() {
        continue;
      }
      for second in &expressions[index + 1..] {
        if !second.expr.is_var() {
          continue;
        }
        let compatible = matches!(
          (first.dir, second.dir),
          (Direction::Pos | Direction::PosInf, Direction::Pos | Direction::PosInf)
              | (Direction::NegInf, Direction::NegInf)
        );
        if !compatible {
          continue;
        }
        let var = first.expr.as_var().unwrap();
        let sub = Substitution::single(var, second.expr.clone());
        self.substitutions.push(sub.clone());
        self.create_backtracking_point(current, first, Direction::PosCons);
        self.create_backtracking_point(current, second, Direction::PosCons);
        let sub_index = self.substitutions.len() - 1;
        current.substitute(&sub, sub_index);
        return true;
      }
    }
    false
  }

  /// Decomposes an expression into two operands and applies every limit
  /// vector that makes sense, branching on the alternatives.
  fn apply_limit_vectors(
    &mut self,
    current: &mut LimitProblem,
    ex: &InftyExpression,
    l: Expr,
    r: Expr,
    table: &[LimitVector],
  ) -> bool {
    let mut to_apply = Vec::new();
    let mut pos_inf_vector = false;
    let mut pos_cons_vector = false;
    for lv in limit_vector::applicable(table, ex.dir) {
      if lv.makes_sense(&l, &r) {
        if lv.kind() == Direction::PosInf {
          pos_inf_vector = true;
        }
        if lv.kind() == Direction::PosCons {
          pos_cons_vector = true;
        }
        to_apply.push(lv);
      }
    }

    if pos_inf_vector && !pos_cons_vector {
      self.create_backtracking_point(current, ex, Direction::PosCons);
    }
    if pos_cons_vector && !pos_inf_vector {
      self.create_backtracking_point(current, ex, Direction::PosInf);
    }

    if to_apply.is_empty() {
      return false;
    }
    for lv in &to_apply[..to_apply.len() - 1] {
      let mut copy = current.clone();
      copy.apply_limit_vector(&ex.expr, l.clone(), r.clone(), lv);
      if !copy.is_unsolvable() {
        self.limit_problems.push(copy);
      }
    }
    let last = to_apply[to_apply.len() - 1];
    current.apply_limit_vector(&ex.expr, l, r, &last);
    true
  }

  fn try_applying_limit_vector(&mut self, current: &mut LimitProblem, ex: &InftyExpression) -> bool {
    let (l, r, table): (Expr, Expr, &[LimitVector]) = if ex.expr.is_proper_rational() {
      let (numer, denom) = ex.expr.numer_denom();
      (numer, denom, &limit_vector::DIVISION)
    } else {
      match &ex.expr {
        Expr::Add(terms) if terms.len() >= 2 => {
          let l = terms[0].clone();
          let r = Expr::add_terms(terms[1..].to_vec());
          (l, r, &limit_vector::ADDITION[..])
        }
        Expr::Mul(terms) if terms.len() >= 2 => {
          let l = terms[0].clone();
          let r = Expr::mul_factors(terms[1..].to_vec());
          (l, r, &limit_vector::MULTIPLICATION[..])
        }
        Expr::Pow(base, exponent) if ex.expr.is_proper_natural_power() => {
          let k = exponent.as_number().unwrap().to_integer();
          let base = base.as_ref().clone();
          if (k.clone() % 2) == num_bigint::BigInt::from(0) {
            let half = Expr::pow(base.clone(), Expr::num(crate::Numeric::from_integer(k / 2)));
            (half.clone(), half, &limit_vector::MULTIPLICATION[..])
          } else {
            let rest = Expr::pow(
              base.clone(),
              Expr::num(crate::Numeric::from_integer(k - 1)),
            );
            (base, rest, &limit_vector::MULTIPLICATION[..])
          }
        }
        _ => return false,
      }
    };
    self.apply_limit_vectors(current, ex, l, r, table)
  }

  /// Groups the operands so that one side collects a single variable,
  /// which often produces solvable sub-problems for multivariate terms.
  fn try_applying_limit_vector_smartly(
    &mut self,
    current: &mut LimitProblem,
    ex: &InftyExpression,
  ) -> bool {
    let (terms, is_add): (&[Expr], bool) = match &ex.expr {
      Expr::Add(terms) => (terms, true),
      Expr::Mul(terms) => (terms, false),
      _                => return false,
    };

    let neutral = if is_add { Expr::zero() } else { Expr::one() };
    let mut l = neutral.clone();
    let mut r = neutral.clone();
    let mut one_var: Option<VariableIdx> = None;

    for term in terms {
      let vars = term.variables();
      let goes_left = match vars.len() {
        0 => false,
        1 => {
          let var = *vars.iter().next().unwrap();
          match one_var {
            None           => {
              one_var = Some(var);
              true
            }
            Some(existing) => existing == var,
          }
        }
        _ => false,
      };
      let target = if goes_left { &mut l } else { &mut r };
      *target = if is_add {
        target.clone() + term.clone()
      } else {
        target.clone() * term.clone()
      };
    }

    if l == neutral || r == neutral {
      return false;
    }
    let table: &[LimitVector] =
        if is_add { &limit_vector::ADDITION } else { &limit_vector::MULTIPLICATION };
    self.apply_limit_vectors(current, ex, l, r, table)
  }

  // endregion

  // region Main solving loop

  fn try_smt_encoding(&mut self, current: &mut LimitProblem, current_res: Complexity) -> bool {
    let solution =
        limit_smt::apply_encoding(self.its, self.config, current, &self.cost, current_res);
    match solution {
      Some(sub) => {
        self.substitutions.push(sub.clone());
        current.remove_all_constraints();
        let index = self.substitutions.len() - 1;
        current.substitute(&sub, index);
        true
      }
      None      => false,
    }
  }

  /// One transformation step in the cheap-first priority order.
  fn apply_one_step(&mut self, current: &mut LimitProblem) -> bool {
    if self.try_removing_constant(current) {
      return true;
    }

    if self.config.limit_strategy.smt_enabled() && current.is_polynomial() {
      if self.try_smt_encoding(current, Complexity::Const) {
        return true;
      }
      if !self.config.limit_strategy.calculus_enabled() {
        return false;
      }
    }

    if self.try_trimming_polynomial(current) {
      return true;
    }
    if self.try_substituting_variable(current) {
      return true;
    }
    if self.try_reducing_exp(current) {
      return true;
    }
    if self.try_reducing_general_exp(current) {
      return true;
    }
    if self.try_instantiating_variable(current) {
      return true;
    }
    for ex in current.expressions() {
      if ex.expr.has_at_most_one_variable() && self.try_applying_limit_vector(current, &ex) {
        return true;
      }
    }
    for ex in current.expressions() {
      if ex.expr.has_at_least_two_variables()
          && self.try_applying_limit_vector_smartly(current, &ex)
      {
        return true;
      }
    }
    for ex in current.expressions() {
      if self.try_applying_limit_vector(current, &ex) {
        return true;
      }
    }
    false
  }

  fn solve_limit_problem(&mut self) -> bool {
    let mut current = match self.limit_problems.pop() {
      Some(problem) => problem,
      None          => return false,
    };

    loop {
      let progressed = if !current.is_unsolvable() && !current.is_solved() && !self.timed_out()
      {
        self.apply_one_step(&mut current)
      } else {
        false
      };
      if progressed {
        continue;
      }

      if !current.is_unsolvable() && current.is_solved() {
        self.record_solved(&current);
        if self.is_adequate(&current.clone()) {
          return true;
        }
      }

      if self.limit_problems.is_empty() || self.timed_out() {
        return !self.solved.is_empty();
      }
      current = self.limit_problems.pop().unwrap();
    }
  }

  fn solve_via_smt(&mut self, mut current: LimitProblem, current_res: Complexity) -> bool {
    if !self.config.limit_strategy.smt_enabled() || !current.is_polynomial() {
      return false;
    }
    if !self.try_smt_encoding(&mut current, current_res) {
      return false;
    }
    self.record_solved(&current);
    self.is_adequate(&current.clone());
    true
  }

  // endregion
}

/// Solves `target = 0` for `var` if `var` occurs linearly with coefficient
/// plus or minus one and does not occur in the rest.
fn solve_term_for(target: &Expr, var: VariableIdx) -> Option<Expr> {
  if !target.is_polynomial_in(var) || target.degree(var) != 1 {
    return None;
  }
  let coefficient = target.coeff(var, 1);
  let value = coefficient.as_number()?;
  use num_traits::One;
  let rest = (target.clone() - coefficient.clone() * Expr::var(var)).expand();
  if rest.contains_var(var) {
    return None;
  }
  if value.is_one() {
    Some((-rest).expand())
  } else if *value == -crate::Numeric::one() {
    Some(rest)
  } else {
    None
  }
}

fn nonterm_result(guard_satisfiable: bool) -> AsymptoticResult {
  if guard_satisfiable {
    let mut proof = Proof::new();
    proof.append("Guard is satisfiable, yielding nontermination");
    AsymptoticResult {
      complexity        : Complexity::Nonterm,
      solved_cost       : Expr::Nonterm,
      upper_bound_gt_one: false,
      infty_vars        : 0,
      proof,
    }
  } else {
    AsymptoticResult::unknown()
  }
}

fn build_result(bound: AsymptoticBound<'_>) -> AsymptoticResult {
  let mut proof = bound.proof;
  proof.append("Solution:");
  for (var, value) in bound.best.solution.iter() {
    proof.append(format!("{} / {}", bound.its.var_name(*var), value));
  }
  let solved_cost = bound.cost.subs(&bound.best.solution).expand();
  AsymptoticResult {
    complexity        : bound.best.complexity,
    solved_cost,
    upper_bound_gt_one: bound.best.upper_bound > 1,
    infty_vars        : bound.best.infty_vars,
    proof,
  }
}

/// Analyzes the given guard and cost; `final_check` enables the expensive
/// backtracking. `current_res` prunes attempts that cannot improve on an
/// already-known bound.
pub fn determine_complexity(
  its: &mut ItsProblem,
  config: &Config,
  guard: &Guard,
  cost: &Expr,
  final_check: bool,
  current_res: Complexity,
  budget: Duration,
) -> AsymptoticResult {
  let expanded_cost = cost.expand();
  if expanded_cost.has_nonterm() {
    let satisfiable =
        smt::check_guard(its.var_manager(), config, guard) == SmtResult::Sat;
    return nonterm_result(satisfiable);
  }
  if final_check && config.nonterm_mode {
    return AsymptoticResult::unknown();
  }

  let n = its.add_fresh_variable("n");
  let normalized = guard.normalized();
  let initial = LimitProblem::new(&normalized, Some(&expanded_cost), n);

  let mut bound = AsymptoticBound {
    its,
    config,
    guard         : guard.clone(),
    cost          : expanded_cost.clone(),
    final_check,
    limit_problems: Vec::new(),
    solved        : Vec::new(),
    substitutions : Vec::new(),
    best          : ComplexityResult::none(),
    proof         : Proof::new(),
    deadline      : Instant::now() + budget,
  };

  let polynomial = expanded_cost.is_polynomial() && initial.is_polynomial();
  let mut success =
      polynomial && bound.solve_via_smt(initial.clone(), current_res);
  if !success && (!polynomial || config.limit_strategy.calculus_enabled()) {
    bound.propagate_bounds(initial);
    bound.remove_unsat_problems();
    success = bound.solve_limit_problem();
  }

  if success {
    build_result(bound)
  } else {
    let mut result = AsymptoticResult::unknown();
    result.proof.append("Could not solve the limit problem.");
    result
  }
}

/// The cheaper entry point that only tries the SMT encoding.
pub fn determine_complexity_via_smt(
  its: &mut ItsProblem,
  config: &Config,
  guard: &Guard,
  cost: &Expr,
  current_res: Complexity,
  budget: Duration,
) -> AsymptoticResult {
  let expanded_cost = cost.expand();
  if expanded_cost.has_nonterm() {
    let satisfiable =
        smt::check_guard(its.var_manager(), config, guard) == SmtResult::Sat;
    return nonterm_result(satisfiable);
  }

  let n = its.add_fresh_variable("n");
  let normalized = guard.normalized();
  let initial = LimitProblem::new(&normalized, Some(&expanded_cost), n);

  let mut bound = AsymptoticBound {
    its,
    config,
    guard         : guard.clone(),
    cost          : expanded_cost,
    final_check   : false,
    limit_problems: Vec::new(),
    solved        : Vec::new(),
    substitutions : Vec::new(),
    best          : ComplexityResult::none(),
    proof         : Proof::new(),
    deadline      : Instant::now() + budget,
  };

  if bound.solve_via_smt(initial, current_res) {
    build_result(bound)
  } else {
    AsymptoticResult::unknown()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::its::VariableManager;

  fn setup() -> (ItsProblem, VariableIdx, VariableIdx) {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let y = vm.add_fresh_variable("y");
    let (its, _) = ItsProblem::with_start(vm, "f");
    (its, x, y)
  }

  fn budget() -> Duration {
    Duration::from_secs(5)
  }

  #[test]
  fn linear_growth() {
    let (mut its, x, _) = setup();
    let config = Config::default();
    // guard x > 0, cost x
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    let result = determine_complexity(
      &mut its,
      &config,
      &guard,
      &Expr::var(x),
      true,
      Complexity::Const,
      budget(),
    );
    assert_eq!(result.complexity, Complexity::Poly(1));
  }

  #[test]
  fn quadratic_growth() {
    let (mut its, x, _) = setup();
    let config = Config::default();
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    let cost = Expr::pow(Expr::var(x), Expr::int(2));
    let result = determine_complexity(
      &mut its,
      &config,
      &guard,
      &cost,
      true,
      Complexity::Const,
      budget(),
    );
    assert_eq!(result.complexity, Complexity::Poly(2));
  }

  #[test]
  fn exponential_growth() {
    let (mut its, x, _) = setup();
    let config = Config::default();
    // guard x > 0, cost 2^x
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    let cost = Expr::pow(Expr::int(2), Expr::var(x));
    let result = determine_complexity(
      &mut its,
      &config,
      &guard,
      &cost,
      true,
      Complexity::Const,
      budget(),
    );
    assert_eq!(result.complexity, Complexity::Exp);
  }

  #[test]
  fn unsatisfiable_guard_is_unknown() {
    let (mut its, x, _) = setup();
    let config = Config::default();
    let guard = Guard::new(vec![
      Relation::gt(Expr::var(x), Expr::zero()),
      Relation::lt(Expr::var(x), Expr::zero()),
    ]);
    let result = determine_complexity(
      &mut its,
      &config,
      &guard,
      &Expr::var(x),
      true,
      Complexity::Const,
      budget(),
    );
    assert_eq!(result.complexity, Complexity::Unknown);
  }

  #[test]
  fn nonterm_cost() {
    let (mut its, x, _) = setup();
    let config = Config::default();
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    let result = determine_complexity(
      &mut its,
      &config,
      &guard,
      &Expr::Nonterm,
      true,
      Complexity::Const,
      budget(),
    );
    assert_eq!(result.complexity, Complexity::Nonterm);
  }

  #[test]
  fn temporary_variable_cost_is_unbounded() {
    let (mut its, x, _) = setup();
    let t = its.add_fresh_temporary_variable("t");
    let config = Config::default();
    // guard x > 0 && t > 0, cost t: t is unrestricted, so the cost is
    // unbounded in the input size
    let guard = Guard::new(vec![
      Relation::gt(Expr::var(x), Expr::zero()),
      Relation::gt(Expr::var(t), Expr::zero()),
    ]);
    let result = determine_complexity(
      &mut its,
      &config,
      &guard,
      &Expr::var(t),
      true,
      Complexity::Const,
      budget(),
    );
    assert_eq!(result.complexity, Complexity::Unbounded);
  }
}
