/*!

  Dumps an ITS problem in KoAT syntax, used by `--print-simplified` and for
  the ITS snapshots inside proofs.

*/

use itertools::Itertools;

use crate::expr::Expr;
use crate::its::{ItsProblem, Rule};
use crate::VariableIdx;

fn term_to_string(expr: &Expr, its: &ItsProblem) -> String {
  // Re-render the generic printer's `x<idx>` names with the real names.
  struct Renderer<'a> {
    its: &'a ItsProblem,
  }
  impl<'a> Renderer<'a> {
    fn render(&self, expr: &Expr) -> String {
      match expr {
        Expr::Var(v)     => self.its.var_name(*v).to_string(),
        Expr::Number(_) | Expr::Nonterm => expr.to_string(),
        Expr::Add(terms) => terms.iter().map(|t| self.render_child(t, 1)).join("+"),
        Expr::Mul(terms) => terms.iter().map(|t| self.render_child(t, 2)).join("*"),
        Expr::Pow(b, e)  => {
          format!("{}^{}", self.render_child(b, 3), self.render_child(e, 3))
        }
      }
    }

    fn render_child(&self, expr: &Expr, parent_prec: u8) -> String {
      let prec = match expr {
        Expr::Add(_)    => 1,
        Expr::Mul(_)    => 2,
        Expr::Pow(_, _) => 3,
        Expr::Number(n) if parent_prec > 1 && *n < num_traits::Zero::zero() => 0,
        _               => 4,
      };
      let rendered = self.render(expr);
      if prec < parent_prec {
        format!("({})", rendered)
      } else {
        rendered
      }
    }
  }
  Renderer { its }.render(expr)
}

fn rhs_term(rule: &Rule, index: usize, variables: &[VariableIdx], its: &ItsProblem) -> String {
  let update = rule.update(index);
  let args = variables
      .iter()
      .map(|v| term_to_string(&update.update_of(*v), its))
      .join(",");
  format!("{}({})", its.printable_location_name(rule.rhs_loc(index)), args)
}

pub fn rule_to_string(rule: &Rule, its: &ItsProblem) -> String {
  let variables = its.var_manager().program_variables();
  let args = variables.iter().map(|v| its.var_name(*v)).join(",");
  let lhs = format!("{}({})", its.printable_location_name(rule.lhs_loc()), args);

  let rhs = if rule.is_linear() {
    rhs_term(rule, 0, &variables, its)
  } else {
    format!(
      "Com_{}({})",
      rule.rhs_count(),
      (0..rule.rhs_count()).map(|i| rhs_term(rule, i, &variables, its)).join(",")
    )
  };

  let mut line = format!("{} -{{{}}}> {}", lhs, term_to_string(rule.cost(), its), rhs);
  if !rule.guard().is_empty() {
    let guard = rule
        .guard()
        .iter()
        .map(|rel| {
          format!(
            "{} {} {}",
            term_to_string(rel.lhs(), its),
            rel.op(),
            term_to_string(rel.rhs(), its)
          )
        })
        .join(" && ");
    line.push_str(" :|: ");
    line.push_str(&guard);
  }
  line
}

/// The whole problem in KoAT syntax.
pub fn print_koat(its: &ItsProblem) -> String {
  let mut output = String::new();
  output.push_str("(GOAL COMPLEXITY)\n");
  output.push_str(&format!(
    "(STARTTERM (FUNCTIONSYMBOLS {}))\n",
    its.printable_location_name(its.initial_location())
  ));
  let variables = its.var_manager().program_variables();
  output.push_str(&format!(
    "(VAR {})\n",
    variables.iter().map(|v| its.var_name(*v)).join(" ")
  ));
  output.push_str("(RULES\n");
  for id in its.all_transitions() {
    output.push_str("  ");
    output.push_str(&rule_to_string(its.rule(id), its));
    output.push('\n');
  }
  output.push_str(")\n");
  output
}

/// A labeled one-rule dump for proof lines.
pub fn print_labeled_rule(id: crate::TransIdx, its: &ItsProblem) -> String {
  format!("{}: {}", id, rule_to_string(its.rule(id), its))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::{Guard, Relation, Substitution};
  use crate::its::VariableManager;

  #[test]
  fn koat_round_trippable_shape() {
    let mut manager = VariableManager::new();
    let x = manager.add_fresh_variable("x");
    let (mut its, start) = ItsProblem::with_start(manager, "f");
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    let mut update = Substitution::new();
    update.put(x, Expr::var(x) - Expr::one());
    its.add_rule(Rule::new_linear(start, guard, Expr::one(), start, update));

    let dump = print_koat(&its);
    assert!(dump.contains("(GOAL COMPLEXITY)"));
    assert!(dump.contains("(VAR x)"));
    assert!(dump.contains("f(x) -{1}> f("));
    assert!(dump.contains(":|: x > 0"));
  }
}
