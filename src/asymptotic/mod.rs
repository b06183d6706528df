/*!

  The asymptotic bound analysis: a rule's guard and cost are reduced to a
  limit problem, which is solved either by a direct SMT encoding (for
  polynomial problems) or by the limit calculus with backtracking.

*/

mod bound;
mod limit_problem;
mod limit_smt;
mod limit_vector;

pub use bound::{determine_complexity, determine_complexity_via_smt, AsymptoticResult};
pub use limit_problem::{InftyExpression, LimitProblem};
pub use limit_vector::{Direction, LimitVector};
