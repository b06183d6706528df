/*!

  Computes worst-case runtime lower bounds and non-termination proofs for
  integer transition systems (ITS). An ITS is a directed multigraph of
  locations connected by rules; each rule carries a guard, a cost and one or
  more updates. The analysis simplifies the system by a fix-point of
  chaining, loop acceleration and pruning, and then derives an asymptotic
  lower bound on the accumulated cost of executions leaving the initial
  location.

*/

pub mod accelerate;
pub mod analysis;
pub mod asymptotic;
pub mod complexity;
pub mod config;
pub mod errors;
pub mod expr;
pub mod its;
pub mod parser;
pub mod proof;
pub mod smt;
pub mod timeout;

// Re-exported items
pub use complexity::Complexity;
pub use config::Config;
pub use errors::Error;
pub use expr::{Expr, Guard, Relation, Substitution};
pub use its::{ItsProblem, Rule, VariableManager};
pub use proof::Proof;
pub use timeout::Timeout;

/// A variable is identified by an index into the variable manager's registry.
pub type VariableIdx               = usize;
/// Locations are small integers managed by the ITS problem.
pub type LocationIdx               = usize;
/// Transitions (rule ids) are monotonic and unique for the lifetime of the graph.
pub type TransIdx                  = usize;
pub type VariablePair              = (VariableIdx, VariableIdx);
/// Dense sets of locations, used by the graph traversals.
pub type LocationSet               = bit_set::BitSet;
/// Exact rational scalars used throughout the expression algebra.
pub type Numeric                   = num_rational::BigRational;
