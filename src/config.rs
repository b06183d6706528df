/*!

  The flat configuration record. Covers the CLI surface plus the tunables of
  the individual components; passed by reference to every component that
  reads it. There are no configuration globals.

*/

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum LimitStrategy {
  Smt,
  Calculus,
  SmtAndCalculus,
}

impl LimitStrategy {
  pub fn smt_enabled(&self) -> bool {
    matches!(self, LimitStrategy::Smt | LimitStrategy::SmtAndCalculus)
  }

  pub fn calculus_enabled(&self) -> bool {
    matches!(self, LimitStrategy::Calculus | LimitStrategy::SmtAndCalculus)
  }
}

#[derive(Clone, Debug)]
pub struct Config {
  // CLI surface
  /// Total wall-clock timeout in seconds; `None` disables timeouts.
  pub timeout              : Option<u64>,
  /// 0 = none, 1 = minimal, 2 = default, 3 = verbose (with ITS dumps).
  pub proof_level          : u32,
  /// Disable ANSI colour in the proof output.
  pub plain_output         : bool,
  /// Dump the simplified ITS in input format before the bound computation.
  pub print_simplified     : bool,
  /// Permit `/` in input expressions (unsound unless the result is integral).
  pub allow_division       : bool,
  /// Append `cost >= 0` to every guard during preprocessing.
  pub cost_check           : bool,
  /// Run the preprocessing simplification pass.
  pub preprocessing        : bool,
  pub limit_strategy       : LimitStrategy,
  /// Check initial rules for the Omega(1) shortcut.
  pub const_cpx_check      : bool,
  /// Only prove non-termination; costs are ignored.
  pub nonterm_mode         : bool,

  // Tunables
  /// Maximum number of parallel rules between two locations before pruning.
  pub max_parallel_rules   : usize,
  /// Limit problems beyond this size are discarded on solver unknowns.
  pub problem_discard_size : usize,
  /// Per-query budget of the SMT driver, milliseconds.
  pub smt_timeout_ms       : u64,
  /// Budget for one limit-problem run during simplification, milliseconds.
  pub limit_timeout_ms     : u64,
  /// Budget for one limit-problem run in the final bound computation.
  pub limit_timeout_final_ms: u64,
  /// Reduced final budget once the soft timeout has fired.
  pub limit_timeout_final_fast_ms: u64,
  /// Try to nest pairs of accelerated simple loops.
  pub try_nesting          : bool,
  /// Keep incoming rules after successfully chaining them with accelerated
  /// rules (loses fewer paths, yields more rules).
  pub keep_incoming_in_chain_accelerated: bool,
  /// Partial-deletion heuristic for nonlinear rules.
  pub partial_deletion     : bool,
  /// Instantiate temporary variables by their bounds before metering.
  pub temp_var_instantiation: bool,
  /// Add `A >= B` / `A <= B` when metering finds conflicting variables.
  pub conflict_var_heuristic: bool,
  /// Strengthen guards of rules with constant updates before metering.
  pub constant_update_heuristic: bool,
  /// Simplify simple loops before trying to accelerate them.
  pub simplify_before_accel: bool,
  /// Prune parallel rules by complexity.
  pub pruning_enabled      : bool,
}

impl Default for Config {
  fn default() -> Config {
    Config {
      timeout              : None,
      proof_level          : 2,
      plain_output         : false,
      print_simplified     : false,
      allow_division       : false,
      cost_check           : true,
      preprocessing        : true,
      limit_strategy       : LimitStrategy::SmtAndCalculus,
      const_cpx_check      : true,
      nonterm_mode         : false,

      max_parallel_rules   : 3,
      problem_discard_size : 10,
      smt_timeout_ms       : 1_000,
      limit_timeout_ms     : 500,
      limit_timeout_final_ms: 10_000,
      limit_timeout_final_fast_ms: 1_000,
      try_nesting          : true,
      keep_incoming_in_chain_accelerated: false,
      partial_deletion     : true,
      temp_var_instantiation: true,
      conflict_var_heuristic: true,
      constant_update_heuristic: true,
      simplify_before_accel: true,
      pruning_enabled      : true,
    }
  }
}
