/*!

  Command-line front end: parses the input file (the extension selects the
  format), runs the analysis and prints the WST-style answer followed by
  the proof.

*/

use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use user_error::UFE;

use itslower::analysis::Analysis;
use itslower::config::{Config, LimitStrategy};
use itslower::errors::Error;
use itslower::parser;

#[derive(Parser, Debug)]
#[command(
  name = "itslower",
  about = "Worst-case runtime lower bounds and non-termination proofs for integer transition systems"
)]
struct Cli {
  /// Input file (.koat, .t2 or .smt2; anything else is read as KoAT)
  input: PathBuf,

  /// Total wall-clock timeout in seconds (minimum 10)
  #[arg(long)]
  timeout: Option<u64>,

  /// Detail level for the proof output (0-3)
  #[arg(long, default_value_t = 2)]
  proof_level: u32,

  /// Disable colored output
  #[arg(long)]
  plain: bool,

  /// Print the simplified program in the input format before the analysis
  #[arg(long)]
  print_simplified: bool,

  /// Allow division in the input program (potentially unsound)
  #[arg(long)]
  allow_division: bool,

  /// Don't check that costs are nonnegative (potentially unsound)
  #[arg(long)]
  no_cost_check: bool,

  /// Don't simplify the program before the analysis
  #[arg(long)]
  no_preprocessing: bool,

  /// Strategy for limit problems: smt, calculus or smtAndCalculus
  #[arg(long, default_value = "smtAndCalculus", value_parser = parse_limit_strategy)]
  limit_strategy: LimitStrategy,

  /// Don't check for constant complexity first
  #[arg(long)]
  no_const_cpx: bool,

  /// Only try to prove non-termination
  #[arg(long)]
  nonterm: bool,
}

fn parse_limit_strategy(input: &str) -> Result<LimitStrategy, String> {
  match input.to_ascii_lowercase().as_str() {
    "smt"            => Ok(LimitStrategy::Smt),
    "calculus"       => Ok(LimitStrategy::Calculus),
    "smtandcalculus" => Ok(LimitStrategy::SmtAndCalculus),
    other            => Err(format!(
      "unknown limit strategy `{}` (expected smt, calculus or smtAndCalculus)",
      other
    )),
  }
}

fn build_config(cli: &Cli) -> Result<Config, Error> {
  if let Some(seconds) = cli.timeout {
    if seconds < 10 {
      return Err(Error::Usage("timeout must be at least 10 seconds".to_string()));
    }
  }
  if cli.proof_level > 3 {
    return Err(Error::Usage("proof level must be between 0 and 3".to_string()));
  }
  Ok(Config {
    timeout         : cli.timeout,
    proof_level     : cli.proof_level,
    plain_output    : cli.plain,
    print_simplified: cli.print_simplified,
    allow_division  : cli.allow_division,
    cost_check      : !cli.no_cost_check,
    preprocessing   : !cli.no_preprocessing,
    limit_strategy  : cli.limit_strategy,
    const_cpx_check : !cli.no_const_cpx,
    nonterm_mode    : cli.nonterm,
    ..Config::default()
  })
}

fn main() {
  env_logger::init();

  let cli = match Cli::try_parse() {
    Ok(cli) => cli,
    Err(error) => {
      // help and version requests are completed runs
      if error.use_stderr() {
        eprintln!("{}", error);
        exit(1);
      }
      print!("{}", error);
      exit(0);
    }
  };

  let config = match build_config(&cli) {
    Ok(config) => config,
    Err(error) => {
      error.print();
      exit(1);
    }
  };

  let mut its = match parser::load_from_file(&cli.input, &config) {
    Ok(its) => its,
    Err(error) => {
      error.print();
      exit(1);
    }
  };

  let result = Analysis::new(&mut its, &config).run();

  println!("{}", result.result_line(&config));
  result.proof.print(&config);
}
