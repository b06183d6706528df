/*!

  Wall-clock limits for the whole run. Two deadlines are derived from the
  configured total: the *soft* timeout aborts simplification so a partial
  result can be salvaged, the *hard* timeout aborts the remaining bound
  computation. Components poll these flags cooperatively between major
  operations; nothing is ever preempted, so every check happens at a point
  where the ITS is consistent.

*/

use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct Timeout {
  start: Instant,
  soft : Option<Duration>,
  hard : Option<Duration>,
}

impl Timeout {
  /// Derives the soft and hard deadlines from the total budget in seconds.
  /// `None` disables timeouts.
  pub fn new(total_seconds: Option<u64>) -> Timeout {
    let hard = total_seconds.map(Duration::from_secs);
    // Leave a third of the budget for the final bound computation.
    let soft = hard.map(|d| d.mul_f64(2.0 / 3.0));
    Timeout { start: Instant::now(), soft, hard }
  }

  pub fn disabled() -> Timeout {
    Timeout::new(None)
  }

  pub fn enabled(&self) -> bool {
    self.hard.is_some()
  }

  /// True once the soft deadline has passed.
  pub fn soft(&self) -> bool {
    match self.soft {
      Some(limit) => self.start.elapsed() >= limit,
      None        => false,
    }
  }

  /// True once the hard deadline has passed.
  pub fn hard(&self) -> bool {
    match self.hard {
      Some(limit) => self.start.elapsed() >= limit,
      None        => false,
    }
  }

  pub fn remaining_soft(&self) -> Duration {
    match self.soft {
      Some(limit) => limit.saturating_sub(self.start.elapsed()),
      None        => Duration::from_secs(u64::MAX / 4),
    }
  }

  pub fn remaining_hard(&self) -> Duration {
    match self.hard {
      Some(limit) => limit.saturating_sub(self.start.elapsed()),
      None        => Duration::from_secs(u64::MAX / 4),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn disabled_never_fires() {
    let timeout = Timeout::disabled();
    assert!(!timeout.enabled());
    assert!(!timeout.soft());
    assert!(!timeout.hard());
  }

  #[test]
  fn soft_precedes_hard() {
    let timeout = Timeout::new(Some(60));
    assert!(timeout.enabled());
    assert!(timeout.remaining_soft() < timeout.remaining_hard());
    assert!(!timeout.soft());
  }
}
