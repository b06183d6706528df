/*!

  Front ends producing the internal ITS: the native KoAT format, T2, and an
  S-expression transition-system format. The file extension selects the
  parser: `.t2` and `.smt2` have dedicated ones, everything else is read as
  KoAT.

*/

mod koat;
mod sexpression;
mod t2;
mod term;

use std::path::Path;

use crate::config::Config;
use crate::errors::Error;
use crate::its::ItsProblem;

pub use term::{parse_expression, parse_guard, TermParser};

/// Loads an ITS problem from a file, choosing the parser by extension.
pub fn load_from_file(path: &Path, config: &Config) -> Result<ItsProblem, Error> {
  let content = std::fs::read_to_string(path).map_err(|source| Error::File {
    path: path.to_path_buf(),
    source,
  })?;

  let extension = path
      .extension()
      .and_then(|ext| ext.to_str())
      .unwrap_or("")
      .to_ascii_lowercase();

  match extension.as_str() {
    "t2"   => t2::parse(&content, config),
    "smt2" => sexpression::parse(&content, config),
    _      => koat::parse(&content, config),
  }
}
