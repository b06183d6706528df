/*!

  S-expression transition systems: declared state variables, primed
  post-variables, and transitions whose formulas connect both by
  equalities.

  ```text
  (vars x y)
  (init f)
  (trans f g (and (> x 0) (= x' (- x 1)) (= y' y)))
  ```

  Equalities `(= x' e)` over a post-variable define the update; every other
  literal must only mention pre-variables and goes into the guard.
  Disjunctions are split into parallel rules via DNF. Transitions have
  cost 1, or the value of an optional fourth element.

*/

use std::collections::HashMap;

use num_bigint::BigInt;

use crate::config::Config;
use crate::errors::Error;
use crate::expr::{BoolExpr, Expr, Guard, RelOp, Relation, Substitution};
use crate::its::{ItsProblem, Rule};
use crate::{LocationIdx, Numeric, VariableIdx};

// region S-expression reader

#[derive(Clone, Debug, PartialEq, Eq)]
enum Sexp {
  Atom(String),
  List(Vec<Sexp>),
}

fn read_sexps(input: &str) -> Result<Vec<Sexp>, Error> {
  let mut stack: Vec<Vec<Sexp>> = vec![Vec::new()];
  let mut atom = String::new();

  let mut flush = |stack: &mut Vec<Vec<Sexp>>, atom: &mut String| {
    if !atom.is_empty() {
      stack.last_mut().unwrap().push(Sexp::Atom(std::mem::take(atom)));
    }
  };

  for c in input.chars() {
    match c {
      '(' => {
        flush(&mut stack, &mut atom);
        stack.push(Vec::new());
      }
      ')' => {
        flush(&mut stack, &mut atom);
        let list = stack.pop().ok_or_else(|| Error::Parse("unbalanced ')'".to_string()))?;
        match stack.last_mut() {
          Some(parent) => parent.push(Sexp::List(list)),
          None         => return Err(Error::Parse("unbalanced ')'".to_string())),
        }
      }
      c if c.is_whitespace() => flush(&mut stack, &mut atom),
      ';' => break, // comment until end of input chunk
      _ => atom.push(c),
    }
  }
  flush(&mut stack, &mut atom);

  if stack.len() != 1 {
    return Err(Error::Parse("unbalanced '('".to_string()));
  }
  Ok(stack.pop().unwrap())
}

// endregion

// region Conversion

fn to_expr(sexp: &Sexp, its: &mut ItsProblem, config: &Config) -> Result<Expr, Error> {
  match sexp {
    Sexp::Atom(atom) => {
      if let Ok(value) = atom.parse::<BigInt>() {
        return Ok(Expr::num(Numeric::from_integer(value)));
      }
      Ok(Expr::var(its.var_manager_mut().get_or_add_variable(atom)))
    }
    Sexp::List(items) => {
      let (head, args) = match items.split_first() {
        Some((Sexp::Atom(head), args)) => (head.as_str(), args),
        _ => return Err(Error::Parse(format!("malformed term {:?}", sexp))),
      };
      let mut operands = Vec::with_capacity(args.len());
      for arg in args {
        operands.push(to_expr(arg, its, config)?);
      }
      match head {
        "+" => Ok(Expr::add_terms(operands)),
        "*" => Ok(Expr::mul_factors(operands)),
        "-" => match operands.len() {
          1 => {
            let only = operands.pop().unwrap();
            Ok(-only)
          }
          2 => {
            let second = operands.pop().unwrap();
            let first = operands.pop().unwrap();
            Ok(first - second)
          }
          _ => Err(Error::Parse("`-` expects one or two operands".to_string())),
        },
        "/" => {
          if !config.allow_division {
            return Err(Error::DivisionNotAllowed);
          }
          if operands.len() != 2 {
            return Err(Error::Parse("`/` expects two operands".to_string()));
          }
          let second = operands.pop().unwrap();
          let first = operands.pop().unwrap();
          Ok(first * Expr::pow(second, Expr::int(-1)))
        }
        "^" => {
          if operands.len() != 2 {
            return Err(Error::Parse("`^` expects two operands".to_string()));
          }
          let second = operands.pop().unwrap();
          let first = operands.pop().unwrap();
          Ok(Expr::pow(first, second))
        }
        other => Err(Error::Parse(format!("unknown operator `{}`", other))),
      }
    }
  }
}

fn to_formula(sexp: &Sexp, its: &mut ItsProblem, config: &Config) -> Result<BoolExpr, Error> {
  match sexp {
    Sexp::Atom(atom) if atom == "true"  => Ok(BoolExpr::True),
    Sexp::Atom(atom) if atom == "false" => Ok(BoolExpr::False),
    Sexp::List(items) => {
      let (head, args) = match items.split_first() {
        Some((Sexp::Atom(head), args)) => (head.as_str(), args),
        _ => return Err(Error::Parse(format!("malformed formula {:?}", sexp))),
      };
      match head {
        "and" | "or" => {
          let mut operands = Vec::with_capacity(args.len());
          for arg in args {
            operands.push(to_formula(arg, its, config)?);
          }
          if head == "and" {
            Ok(BoolExpr::and(operands))
          } else {
            Ok(BoolExpr::or(operands))
          }
        }
        "<" | "<=" | ">" | ">=" | "=" => {
          if args.len() != 2 {
            return Err(Error::Parse(format!("`{}` expects two operands", head)));
          }
          let lhs = to_expr(&args[0], its, config)?;
          let rhs = to_expr(&args[1], its, config)?;
          let op = match head {
            "<"  => RelOp::Lt,
            "<=" => RelOp::Le,
            ">"  => RelOp::Gt,
            ">=" => RelOp::Ge,
            _    => RelOp::Eq,
          };
          Ok(BoolExpr::Rel(Relation::new(lhs, op, rhs)))
        }
        other => Err(Error::Parse(format!("unknown connective `{}`", other))),
      }
    }
    other => Err(Error::Parse(format!("malformed formula {:?}", other))),
  }
}

// endregion

/// Splits a disjunct over pre/post variables into guard and update: every
/// equality `post = e` with a pre-variable right-hand side defines the
/// update of the corresponding variable.
fn split_disjunct(
  disjunct: &Guard,
  post_of: &HashMap<VariableIdx, VariableIdx>,
) -> Result<(Guard, Substitution), Error> {
  let post_vars: Vec<VariableIdx> = post_of.values().copied().collect();
  let mut guard = Guard::empty();
  let mut update = Substitution::new();

  for relation in disjunct {
    let mentions_post =
        relation.variables().iter().any(|v| post_vars.contains(v));
    if !mentions_post {
      guard.push(relation.clone());
      continue;
    }
    if relation.op() != RelOp::Eq {
      return Err(Error::Parse(format!(
        "post-variable constraint `{}` is not an equality",
        relation
      )));
    }
    // orient the equality as `post = e`
    let (post, value) = if let Some(var) = relation.lhs().as_var() {
      if post_vars.contains(&var) {
        (var, relation.rhs().clone())
      } else if let Some(var) = relation.rhs().as_var() {
        (var, relation.lhs().clone())
      } else {
        return Err(Error::Parse(format!("cannot orient `{}`", relation)));
      }
    } else if let Some(var) = relation.rhs().as_var() {
      (var, relation.lhs().clone())
    } else {
      return Err(Error::Parse(format!("cannot orient `{}`", relation)));
    };
    if value.variables().iter().any(|v| post_vars.contains(v)) {
      return Err(Error::Parse(format!(
        "update right-hand side `{}` mentions a post-variable",
        value
      )));
    }
    let pre = post_of
        .iter()
        .find(|(_, p)| **p == post)
        .map(|(pre, _)| *pre)
        .ok_or_else(|| Error::Parse("unknown post-variable".to_string()))?;
    update.put(pre, value);
  }

  update.remove_identities();
  Ok((guard, update))
}

pub fn parse(content: &str, config: &Config) -> Result<ItsProblem, Error> {
  let sexps = read_sexps(content)?;
  let mut its = ItsProblem::new();
  let mut locations: HashMap<String, LocationIdx> = HashMap::new();
  let mut post_of: HashMap<VariableIdx, VariableIdx> = HashMap::new();
  let mut start: Option<String> = None;
  let mut any_rule = false;

  let mut location =
      |its: &mut ItsProblem, locations: &mut HashMap<String, LocationIdx>, name: &str| {
        *locations
            .entry(name.to_string())
            .or_insert_with(|| its.add_named_location(name))
      };

  for sexp in &sexps {
    let items = match sexp {
      Sexp::List(items) => items,
      _                 => return Err(Error::Parse(format!("stray atom {:?}", sexp))),
    };
    let (head, args) = match items.split_first() {
      Some((Sexp::Atom(head), args)) => (head.as_str(), args),
      _ => return Err(Error::Parse(format!("malformed form {:?}", sexp))),
    };

    match head {
      "vars" => {
        for arg in args {
          let name = match arg {
            Sexp::Atom(name) => name,
            _                => return Err(Error::Parse("vars expects atoms".to_string())),
          };
          let pre = its.var_manager_mut().get_or_add_variable(name);
          let post = its.var_manager_mut().get_or_add_variable(&format!("{}'", name));
          its.var_manager_mut().mark_temporary(post);
          post_of.insert(pre, post);
        }
      }
      "init" => match args {
        [Sexp::Atom(name)] => start = Some(name.clone()),
        _                  => return Err(Error::Parse("init expects one location".to_string())),
      },
      "trans" => {
        let (from_name, to_name, formula, cost) = match args {
          [Sexp::Atom(from), Sexp::Atom(to), formula] => (from, to, formula, None),
          [Sexp::Atom(from), Sexp::Atom(to), formula, cost] => {
            (from, to, formula, Some(cost))
          }
          _ => return Err(Error::Parse("malformed trans form".to_string())),
        };
        let from = location(&mut its, &mut locations, from_name);
        let to = location(&mut its, &mut locations, to_name);
        let cost = match cost {
          Some(sexp) => to_expr(sexp, &mut its, config)?,
          None       => Expr::one(),
        };

        let formula = to_formula(formula, &mut its, config)?;
        for disjunct in formula.dnf() {
          let (guard, update) = split_disjunct(&disjunct, &post_of)?;
          its.add_rule(Rule::new_linear(from, guard, cost.clone(), to, update));
          any_rule = true;
        }
      }
      other => return Err(Error::Parse(format!("unknown form `{}`", other))),
    }
  }

  if !any_rule {
    return Err(Error::Parse("no transitions found".to_string()));
  }

  // undeclared symbols are under-specified temporaries
  for var in 0..its.var_manager().var_count() {
    let declared =
        post_of.contains_key(&var) || post_of.values().any(|p| *p == var);
    if !declared && !its.is_temp_var(var) {
      its.var_manager_mut().mark_temporary(var);
    }
  }

  let start_name =
      start.ok_or_else(|| Error::Parse("missing init declaration".to_string()))?;
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
  fn pre_post_equalities_become_updates() {
    let content = "(vars x) (init f) (trans f f (and (> x 0) (= x' (- x 1))))";
    let its = parse(content, &Config::default()).unwrap();
    let x = its.var_manager().find_variable("x").unwrap();
    let rule = its.rule(its.all_transitions()[0]);
    assert!(rule.guard().contains(&Relation::gt(Expr::var(x), Expr::zero())));
    assert_eq!(
      rule.update(0).get(x).unwrap().clone(),
      (Expr::var(x) - Expr::one()).expand()
    );
  }

  #[test]
  fn disjunctions_split_into_parallel_rules() {
    let content =
        "(vars x) (init f) (trans f f (or (and (> x 0) (= x' (- x 1))) (and (< x 0) (= x' (+ x 1)))))";
    let its = parse(content, &Config::default()).unwrap();
    assert_eq!(its.rule_count(), 2);
  }

  #[test]
  fn unoriented_post_constraints_are_rejected(){
    let content = "(vars x) (init f) (trans f f (> x' 0))";
    assert!(parse(content, &Config::default()).is_err());
  }
}
