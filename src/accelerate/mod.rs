/*!

  Loop acceleration: recurrence closing, Farkas-based metering, the
  per-literal acceleration calculus, invariant guard strengthening, and the
  strategy layer that combines them (with nesting and partial deletion for
  nonlinear rules).

*/

mod accelerator;
mod calculus;
mod farkas;
mod forward;
mod metering;
mod recurrence;
mod strengthening;

pub use accelerator::{accelerate_simple_loops, AccelerationResult, AccelerationStatus};
pub use calculus::AccelerationProblem;
pub use farkas::farkas_apply;
pub use forward::{forward_accelerate, MeteredRule};
pub use metering::{MeteringFinder, MeteringResult};
pub use recurrence::{iterate_rule, RecurrenceResult};
pub use strengthening::strengthen_by_invariants;
