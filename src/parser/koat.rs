/*!

  The native KoAT-style input format:

  ```text
  (GOAL COMPLEXITY)
  (STARTTERM (FUNCTIONSYMBOLS start))
  (VAR x y)
  (RULES
    start(x, y) -> f(x, y) :|: x > 0
    f(x, y) -{x}> Com_2(f(x - 1, y), f(x, y - 1)) :|: x > 0 && y > 0
  )
  ```

  Rule costs are written `-{cost}>` (an optional second component after a
  comma is ignored); the default cost is 1. Variables bound by a rule's
  left-hand side are program variables; any other symbol in guards or
  right-hand sides is an under-specified temporary.

*/

use std::collections::BTreeSet;
use std::collections::HashMap;

use crate::config::Config;
use crate::errors::Error;
use crate::expr::{Expr, Guard, Substitution};
use crate::its::{ItsProblem, Rule, RuleLhs, RuleRhs};
use crate::{LocationIdx, VariableIdx};

use super::term::{parse_guard, TermParser};

// Textual form of one rule before locations and variables are resolved.
struct ParsedRule {
  lhs_fun : String,
  lhs_args: Vec<String>,
  cost    : Option<String>,
  rhss    : Vec<(String, Vec<String>)>,
  guard   : Option<String>,
}

struct LocationData {
  index   : LocationIdx,
  arity   : usize,
  lhs_vars: Option<Vec<VariableIdx>>,
}

/// Splits `f(a, g(b), c)`-style argument lists at top-level commas.
fn split_arguments(input: &str) -> Vec<String> {
  let mut result = Vec::new();
  let mut depth = 0usize;
  let mut current = String::new();
  for c in input.chars() {
    match c {
      '(' => {
        depth += 1;
        current.push(c);
      }
      ')' => {
        depth -= 1;
        current.push(c);
      }
      ',' if depth == 0 => {
        result.push(current.trim().to_string());
        current = String::new();
      }
      _ => current.push(c),
    }
  }
  if !current.trim().is_empty() {
    result.push(current.trim().to_string());
  }
  result
}

/// Parses `fun(arg, ...)` into the function name and raw arguments.
fn parse_fun_term(input: &str) -> Result<(String, Vec<String>), Error> {
  let input = input.trim();
  match input.find('(') {
    Some(open) => {
      if !input.ends_with(')') {
        return Err(Error::Parse(format!("malformed term `{}`", input)));
      }
      let name = input[..open].trim().to_string();
      let args = split_arguments(&input[open + 1..input.len() - 1]);
      Ok((name, args))
    }
    None => Ok((input.to_string(), Vec::new())),
  }
}

fn parse_rule_line(line: &str) -> Result<ParsedRule, Error> {
  // split off the guard
  let (head, guard) = match line.find(":|:") {
    Some(position) => (
      &line[..position],
      Some(line[position + 3..].trim().to_string()),
    ),
    None => (line, None),
  };

  // find the arrow, possibly carrying a cost annotation
  let (lhs_text, cost, rhs_text) = if let Some(position) = head.find("-{") {
    let close = head[position..]
        .find("}>")
        .ok_or_else(|| Error::Parse(format!("missing `}}>` in `{}`", line)))?;
    let annotation = &head[position + 2..position + close];
    // a second component is an upper bound, which a lower-bound tool ignores
    let lower = split_arguments(annotation)
        .into_iter()
        .next()
        .unwrap_or_else(|| "1".to_string());
    (
      head[..position].to_string(),
      Some(lower),
      head[position + close + 2..].to_string(),
    )
  } else if let Some(position) = head.find("->") {
    (head[..position].to_string(), None, head[position + 2..].to_string())
  } else {
    return Err(Error::Parse(format!("missing arrow in rule `{}`", line)));
  };

  let (lhs_fun, lhs_args) = parse_fun_term(&lhs_text)?;

  // right-hand side: either a single term or Com_k(t1, ..., tk)
  let rhs_text = rhs_text.trim();
  let (rhs_fun, rhs_args) = parse_fun_term(rhs_text)?;
  let rhss = if rhs_fun.starts_with("Com_") {
    let arity: usize = rhs_fun[4..]
        .parse()
        .map_err(|_| Error::Parse(format!("bad Com arity in `{}`", rhs_text)))?;
    if arity != rhs_args.len() {
      return Err(Error::Parse(format!("Com arity mismatch in `{}`", rhs_text)));
    }
    rhs_args
        .iter()
        .map(|arg| parse_fun_term(arg))
        .collect::<Result<Vec<_>, _>>()?
  } else {
    vec![(rhs_fun, rhs_args)]
  };

  Ok(ParsedRule { lhs_fun, lhs_args, cost, rhss, guard })
}

pub fn parse(content: &str, config: &Config) -> Result<ItsProblem, Error> {
  let mut its = ItsProblem::new();
  let mut declared_vars: Vec<String> = Vec::new();
  let mut start_symbol: Option<String> = None;
  let mut parsed_rules: Vec<ParsedRule> = Vec::new();

  // the section reader tolerates arbitrary line breaks inside (RULES ...)
  let mut in_rules = false;
  for raw_line in content.lines() {
    let line = raw_line.trim();
    if line.is_empty() || line.starts_with("#") || line.starts_with("//") {
      continue;
    }

    if in_rules {
      if line == ")" {
        in_rules = false;
        continue;
      }
      parsed_rules.push(parse_rule_line(line)?);
      continue;
    }

    let upper = line.to_ascii_uppercase();
    if upper.starts_with("(GOAL") {
      continue;
    }
    if upper.starts_with("(STARTTERM") {
      if let Some(position) = line.find("FUNCTIONSYMBOLS") {
        let rest = &line[position + "FUNCTIONSYMBOLS".len()..];
        let name: String = rest
            .chars()
            .skip_while(|c| c.is_whitespace())
            .take_while(|c| !c.is_whitespace() && *c != ')')
            .collect();
        if !name.is_empty() {
          start_symbol = Some(name);
        }
      }
      continue;
    }
    if upper.starts_with("(VAR") {
      let inner = line.trim_start_matches('(').trim_end_matches(')');
      for name in inner.split_whitespace().skip(1) {
        declared_vars.push(name.to_string());
      }
      continue;
    }
    if upper.starts_with("(RULES") {
      in_rules = true;
      continue;
    }
    return Err(Error::Parse(format!("unexpected line `{}`", line)));
  }

  if parsed_rules.is_empty() {
    return Err(Error::Parse("no rules found".to_string()));
  }

  // declared variables become the shared program variables
  for name in &declared_vars {
    its.var_manager_mut().get_or_add_variable(name);
  }

  // First pass over the rules: register every location, fix arities, and
  // let the first lhs occurrence define the canonical variables.
  let mut locations: HashMap<String, LocationData> = HashMap::new();
  let mut register =
      |its: &mut ItsProblem, locations: &mut HashMap<String, LocationData>, name: &str, arity: usize| -> Result<LocationIdx, Error> {
        match locations.get(name) {
          Some(data) => {
            if data.arity != arity {
              return Err(Error::Parse(format!(
                "function symbol `{}` used with inconsistent arity",
                name
              )));
            }
            Ok(data.index)
          }
          None => {
            let index = its.add_named_location(name);
            locations.insert(
              name.to_string(),
              LocationData { index, arity, lhs_vars: None },
            );
            Ok(index)
          }
        }
      };

  for parsed in &parsed_rules {
    register(&mut its, &mut locations, &parsed.lhs_fun, parsed.lhs_args.len())?;
    for arg in &parsed.lhs_args {
      if !is_identifier(arg) {
        return Err(Error::Parse(format!(
          "left-hand side argument `{}` is not a variable",
          arg
        )));
      }
    }
    if locations[&parsed.lhs_fun].lhs_vars.is_none() {
      let vars = parsed
          .lhs_args
          .iter()
          .map(|arg| its.var_manager_mut().get_or_add_variable(arg))
          .collect();
      locations.get_mut(&parsed.lhs_fun).unwrap().lhs_vars = Some(vars);
    }
    for (rhs_fun, rhs_args) in &parsed.rhss {
      register(&mut its, &mut locations, rhs_fun, rhs_args.len())?;
    }
  }

  // variables bound on some left-hand side are the program variables
  let bound: BTreeSet<VariableIdx> = locations
      .values()
      .flat_map(|data| data.lhs_vars.clone().unwrap_or_default())
      .collect();

  // Second pass: convert every rule.
  for parsed in &parsed_rules {
    let lhs_loc = locations[&parsed.lhs_fun].index;
    let canonical = locations[&parsed.lhs_fun].lhs_vars.clone().unwrap();

    // rename this rule's lhs variables to the canonical ones
    let mut rename = Substitution::new();
    for (argument, canonical_var) in parsed.lhs_args.iter().zip(&canonical) {
      let var = its.var_manager_mut().get_or_add_variable(argument);
      if var != *canonical_var {
        rename.put(var, Expr::var(*canonical_var));
      }
    }

    let guard = match &parsed.guard {
      Some(text) => parse_guard(text, its.var_manager_mut(), config)?.subs(&rename),
      None       => Guard::empty(),
    };
    let cost = match &parsed.cost {
      Some(text) => {
        let mut parser = TermParser::new(text, its.var_manager_mut(), config)?;
        parser.expression()?.subs(&rename)
      }
      None       => Expr::one(),
    };

    let mut rhss: Vec<RuleRhs> = Vec::new();
    for (rhs_fun, rhs_args) in &parsed.rhss {
      let rhs_loc = locations[rhs_fun].index;
      // a location that never occurs on a lhs keeps an empty update
      let target_vars = locations[rhs_fun].lhs_vars.clone();
      let mut update = Substitution::new();
      if let Some(target_vars) = target_vars {
        for (variable, argument) in target_vars.iter().zip(rhs_args) {
          let mut parser = TermParser::new(argument, its.var_manager_mut(), config)?;
          let value = parser.expression()?.subs(&rename);
          if value.as_var() != Some(*variable) {
            update.put(*variable, value);
          }
        }
      }
      rhss.push(RuleRhs::new(rhs_loc, update));
    }

    // everything not bound by some lhs is an under-specified temporary
    let rule = Rule::new(RuleLhs::new(lhs_loc, guard, cost), rhss);
    for var in rule.variables() {
      if !bound.contains(&var) && !its.is_temp_var(var) {
        its.var_manager_mut().mark_temporary(var);
      }
    }

    its.add_rule(rule);
  }

  // the initial location: the start symbol, or the first rule's lhs
  let start_name = match start_symbol {
    Some(name) => name,
    None       => parsed_rules[0].lhs_fun.clone(),
  };
  match locations.get(&start_name) {
    Some(data) => its.set_initial_location(data.index),
    None       => return Err(Error::UnknownSymbol(start_name)),
  }

  Ok(its)
}

fn is_identifier(text: &str) -> bool {
  !text.is_empty()
      && text
          .chars()
          .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '\'' || c == '.')
      && !text.chars().next().unwrap().is_ascii_digit()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::Relation;

  #[test]
  fn counting_loop() {
    let content = r#"
      (GOAL COMPLEXITY)
      (STARTTERM (FUNCTIONSYMBOLS start))
      (VAR x)
      (RULES
        start(x) -> f(x)
        f(x) -> f(x - 1) :|: x > 0
      )
    "#;
    let its = parse(content, &Config::default()).unwrap();
    assert_eq!(its.printable_location_name(its.initial_location()), "start");
    assert_eq!(its.rule_count(), 2);

    let x = its.var_manager().find_variable("x").unwrap();
    let loops: Vec<_> = its
        .all_transitions()
        .into_iter()
        .filter(|id| its.rule(*id).is_simple_loop())
        .collect();
    assert_eq!(loops.len(), 1);
    let rule = its.rule(loops[0]);
    assert!(rule.guard().contains(&Relation::gt(Expr::var(x), Expr::zero())));
    assert_eq!(
      rule.update(0).get(x).unwrap().clone(),
      (Expr::var(x) - Expr::one()).expand()
    );
    assert_eq!(*rule.cost(), Expr::one());
  }

  #[test]
  fn costs_and_nonlinear_rules() {
    let content = r#"
      (GOAL COMPLEXITY)
      (STARTTERM (FUNCTIONSYMBOLS f))
      (VAR x y)
      (RULES
        f(x, y) -{x + y}> Com_2(f(x - 1, y), f(x, y - 1)) :|: x > 0 && y > 0
      )
    "#;
    let its = parse(content, &Config::default()).unwrap();
    let id = its.all_transitions()[0];
    let rule = its.rule(id);
    assert_eq!(rule.rhs_count(), 2);
    let x = its.var_manager().find_variable("x").unwrap();
    let y = its.var_manager().find_variable("y").unwrap();
    assert_eq!(*rule.cost(), (Expr::var(x) + Expr::var(y)).expand());
    assert_eq!(rule.guard().len(), 2);
  }

  #[test]
  fn unbound_symbols_become_temporaries() {
    let content = r#"
      (GOAL COMPLEXITY)
      (STARTTERM (FUNCTIONSYMBOLS f))
      (VAR x)
      (RULES
        f(x) -> f(t) :|: t < x
      )
    "#;
    let its = parse(content, &Config::default()).unwrap();
    let t = its.var_manager().find_variable("t").unwrap();
    assert!(its.is_temp_var(t));
    let x = its.var_manager().find_variable("x").unwrap();
    assert!(!its.is_temp_var(x));
  }

  #[test]
  fn division_requires_the_flag() {
    let content = r#"
      (GOAL COMPLEXITY)
      (STARTTERM (FUNCTIONSYMBOLS f))
      (VAR x)
      (RULES
        f(x) -> f(x / 2) :|: x > 1
      )
    "#;
    assert!(matches!(parse(content, &Config::default()), Err(Error::DivisionNotAllowed)));
    let permissive = Config { allow_division: true, ..Config::default() };
    assert!(parse(content, &permissive).is_ok());
  }

  #[test]
  fn malformed_input_is_rejected() {
    assert!(parse("(RULES\nf(x) f(x)\n)", &Config::default()).is_err());
    assert!(parse("", &Config::default()).is_err());
  }
}
