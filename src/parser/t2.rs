/*!

  The T2 input format: numbered locations, `assume` statements and
  sequential assignments.

  ```text
  START: 0;

  FROM: 0;
  assume(x > 0);
  x := x - 1;
  TO: 0;
  ```

  Assignments execute in order, so later right-hand sides see the updated
  values. `nondet()` becomes a fresh temporary variable. Transitions have
  cost 1.

*/

use std::collections::HashMap;

use crate::config::Config;
use crate::errors::Error;
use crate::expr::{Expr, Guard, Substitution};
use crate::its::{ItsProblem, Rule};
use crate::LocationIdx;

use super::term::{parse_expression, parse_guard};

pub fn parse(content: &str, config: &Config) -> Result<ItsProblem, Error> {
  let mut its = ItsProblem::new();
  let mut locations: HashMap<String, LocationIdx> = HashMap::new();
  let mut start: Option<String> = None;

  let mut from: Option<String> = None;
  let mut guard = Guard::empty();
  let mut update = Substitution::new();
  let mut any_rule = false;

  let mut location =
      |its: &mut ItsProblem, locations: &mut HashMap<String, LocationIdx>, name: &str| {
        *locations
            .entry(name.to_string())
            .or_insert_with(|| its.add_named_location(name))
      };

  for statement in content.split(';') {
    let statement = statement.trim();
    if statement.is_empty() || statement.starts_with("//") {
      continue;
    }

    if let Some(rest) = statement.strip_prefix("START:") {
      start = Some(rest.trim().to_string());
      continue;
    }
    if let Some(rest) = statement.strip_prefix("FROM:") {
      if from.is_some() {
        return Err(Error::Parse("FROM without closing TO".to_string()));
      }
      from = Some(rest.trim().to_string());
      guard = Guard::empty();
      update = Substitution::new();
      continue;
    }
    if let Some(rest) = statement.strip_prefix("TO:") {
      let source_name =
          from.take().ok_or_else(|| Error::Parse("TO without FROM".to_string()))?;
      let source = location(&mut its, &mut locations, &source_name);
      let target = location(&mut its, &mut locations, rest.trim());
      let mut finished = Substitution::new();
      std::mem::swap(&mut update, &mut finished);
      finished.remove_identities();
      let mut rule_guard = Guard::empty();
      std::mem::swap(&mut guard, &mut rule_guard);
      its.add_rule(Rule::new_linear(source, rule_guard, Expr::one(), target, finished));
      any_rule = true;
      continue;
    }

    if from.is_none() {
      return Err(Error::Parse(format!("statement `{}` outside FROM/TO", statement)));
    }

    if let Some(inner) = statement.strip_prefix("assume") {
      let inner = inner.trim();
      let inner = inner
          .strip_prefix('(')
          .and_then(|s| s.strip_suffix(')'))
          .ok_or_else(|| Error::Parse(format!("malformed assume `{}`", statement)))?;
      // the assumption reads the current, partially updated state
      let parsed = parse_guard(inner, its.var_manager_mut(), config)?;
      for relation in parsed {
        guard.push(relation.subs(&update));
      }
      continue;
    }

    if let Some(position) = statement.find(":=") {
      let name = statement[..position].trim();
      let var = its.var_manager_mut().get_or_add_variable(name);
      let rhs_text = statement[position + 2..].trim();
      let value = if rhs_text.replace(' ', "") == "nondet()" {
        Expr::var(its.add_fresh_temporary_variable("nondet"))
      } else {
        parse_expression(rhs_text, its.var_manager_mut(), config)?.subs(&update)
      };
      update.put(var, value);
      continue;
    }

    return Err(Error::Parse(format!("cannot parse statement `{}`", statement)));
  }

  if !any_rule {
    return Err(Error::Parse("no transitions found".to_string()));
  }

  let start_name =
      start.ok_or_else(|| Error::Parse("missing START declaration".to_string()))?;
  match locations.get(&start_name) {
    Some(index) => its.set_initial_location(*index),
    None        => return Err(Error::UnknownSymbol(start_name)),
  }

  Ok(its)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::Relation;

  #[test]
  fn counting_loop() {
    let content = r#"
      START: 0;

      FROM: 0;
      assume(x > 0);
      x := x - 1;
      TO: 0;
    "#;
    let its = parse(content, &Config::default()).unwrap();
    let x = its.var_manager().find_variable("x").unwrap();
    assert_eq!(its.rule_count(), 1);
    let rule = its.rule(its.all_transitions()[0]);
    assert!(rule.is_simple_loop());
    assert!(rule.guard().contains(&Relation::gt(Expr::var(x), Expr::zero())));
  }

  #[test]
  fn sequential_assignments() {
    let content = r#"
      START: 0;

      FROM: 0;
      x := x + 1;
      y := x;
      TO: 1;
    "#;
    let its = parse(content, &Config::default()).unwrap();
    let x = its.var_manager().find_variable("x").unwrap();
    let y = its.var_manager().find_variable("y").unwrap();
    let rule = its.rule(its.all_transitions()[0]);
    // y sees the already-incremented x
    assert_eq!(
      rule.update(0).get(y).unwrap().clone(),
      (Expr::var(x) + Expr::one()).expand()
    );
  }

  #[test]
  fn nondet_becomes_temporary() {
    let content = r#"
      START: 0;

      FROM: 0;
      x := nondet();
      TO: 0;
    "#;
    let its = parse(content, &Config::default()).unwrap();
    let x = its.var_manager().find_variable("x").unwrap();
    let rule = its.rule(its.all_transitions()[0]);
    let assigned = rule.update(0).get(x).unwrap().as_var().unwrap();
    assert!(its.is_temp_var(assigned));
  }
}
