use std::path::PathBuf;

use thiserror::Error as DeriveError;
use user_error::UFE;

/// Fatal errors: anything that aborts the run with exit code 1. Soft
/// failures (solver unknowns, acceleration failures, timeouts) are ordinary
/// result values, not errors.
#[derive(Debug, DeriveError)]
pub enum Error {
  #[error("cannot read {}: {source}", path.display())]
  File {
    path  : PathBuf,
    source: std::io::Error,
  },

  #[error("parse error: {0}")]
  Parse(String),

  #[error("unknown symbol `{0}`")]
  UnknownSymbol(String),

  #[error("division is not allowed (pass --allow-division to permit it)")]
  DivisionNotAllowed,

  #[error("{0}")]
  Usage(String),
}

impl UFE for Error { /* User Facing Error - nothing to implement. */ }
