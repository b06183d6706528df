/*!

  Structured proof output: an append-only list of styled lines, grouped into
  headlined major steps and sectioned minor steps. Printing applies the
  configured proof level and optional ANSI colouring.

*/

use colored::Colorize;

use crate::config::Config;
use crate::its::{print_koat, ItsProblem, Rule};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Style {
  Headline,
  Section,
  Result,
  Warning,
  None,
  /// ITS snapshots inside major/minor steps; only shown at the verbose level.
  Dump,
}

impl Style {
  /// The minimum proof level at which lines of this style are printed.
  fn min_level(&self) -> u32 {
    match self {
      Style::Result                   => 1,
      Style::Headline                 => 1,
      Style::Warning                  => 1,
      Style::Section                  => 2,
      Style::None                     => 2,
      Style::Dump                     => 3,
    }
  }
}

#[derive(Clone, Debug, Default)]
pub struct Proof {
  lines: Vec<(Style, String)>,
}

impl Proof {
  pub fn new() -> Proof {
    Proof::default()
  }

  pub fn is_empty(&self) -> bool {
    self.lines.is_empty()
  }

  pub fn append(&mut self, line: impl Into<String>) {
    self.append_styled(Style::None, line);
  }

  pub fn append_styled(&mut self, style: Style, line: impl Into<String>) {
    let line = line.into();
    for part in line.split('\n') {
      self.lines.push((style, part.to_string()));
    }
  }

  pub fn newline(&mut self) {
    self.lines.push((Style::None, String::new()));
  }

  pub fn headline(&mut self, line: impl Into<String>) {
    self.newline();
    self.append_styled(Style::Headline, line);
  }

  pub fn section(&mut self, line: impl Into<String>) {
    self.newline();
    self.append_styled(Style::Section, line);
  }

  pub fn result(&mut self, line: impl Into<String>) {
    self.append_styled(Style::Result, line);
  }

  pub fn warning(&mut self, line: impl Into<String>) {
    self.newline();
    self.append_styled(Style::Warning, line);
    self.newline();
  }

  pub fn concat(&mut self, other: Proof) {
    self.lines.extend(other.lines);
  }

  /// A major step: headline plus a snapshot of the current ITS.
  pub fn major_step(&mut self, title: &str, its: &ItsProblem) {
    self.headline(title);
    self.append_styled(Style::Dump, print_koat(its));
  }

  /// A minor step: section plus a snapshot of the current ITS.
  pub fn minor_step(&mut self, title: &str, its: &ItsProblem) {
    self.section(title);
    self.append_styled(Style::Dump, print_koat(its));
  }

  /// Standard shape for "rule A became rule B by <what>" lines.
  pub fn rule_transformation(&mut self, old: &Rule, what: &str, new: &Rule, its: &ItsProblem) {
    self.append(format!("Applied {}", what));
    self.append_styled(Style::Dump, format!("Original rule:\n{}", crate::its::rule_to_string(old, its)));
    self.append_styled(Style::Dump, format!("New rule:\n{}", crate::its::rule_to_string(new, its)));
  }

  pub fn deletion(&mut self, removed: &[crate::TransIdx]) {
    let ids = removed.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ");
    self.append(format!("Removed rules: {}", ids));
  }

  /// A named sub-proof, indented by two spaces.
  pub fn sub_proof(&mut self, proof: Proof, label: &str) {
    self.append(format!("Sub-proof ({}):", label));
    for (style, line) in proof.lines {
      self.lines.push((style, format!("  {}", line)));
    }
  }

  /// Renders the proof to a string, honouring the proof level and colours.
  pub fn render(&self, config: &Config) -> String {
    let mut output = String::new();
    for (style, line) in &self.lines {
      if config.proof_level < style.min_level() {
        continue;
      }
      let text = if config.plain_output {
        line.clone()
      } else {
        match style {
          Style::Headline => line.bold().blue().to_string(),
          Style::Section  => line.cyan().to_string(),
          Style::Result   => line.bold().green().to_string(),
          Style::Warning  => line.bold().red().to_string(),
          _               => line.clone(),
        }
      };
      output.push_str(&text);
      output.push('\n');
    }
    output
  }

  pub fn print(&self, config: &Config) {
    if config.proof_level == 0 {
      return;
    }
    print!("{}", self.render(config));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn levels_filter_lines() {
    let mut proof = Proof::new();
    proof.headline("Major");
    proof.section("Minor");
    proof.append("plain");
    proof.append_styled(Style::Dump, "dump");

    let mut config = Config { plain_output: true, ..Config::default() };

    config.proof_level = 1;
    let minimal = proof.render(&config);
    assert!(minimal.contains("Major"));
    assert!(!minimal.contains("Minor"));

    config.proof_level = 2;
    let standard = proof.render(&config);
    assert!(standard.contains("Minor"));
    assert!(standard.contains("plain"));
    assert!(!standard.contains("dump"));

    config.proof_level = 3;
    assert!(proof.render(&config).contains("dump"));
  }

  #[test]
  fn append_splits_lines() {
    let mut proof = Proof::new();
    proof.append("a\nb");
    assert_eq!(proof.lines.len(), 2);
  }
}
