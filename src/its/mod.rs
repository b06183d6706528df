/*!

  The ITS data model: variables, rules and the problem itself, which is a
  hypergraph over locations whose (hyper-)edges are rules indexed by
  transition ids.

*/

mod export;
mod hypergraph;
mod its_problem;
mod rule;
mod variable_manager;

pub use export::{print_koat, print_labeled_rule, rule_to_string};
pub use hypergraph::HyperGraph;
pub use its_problem::ItsProblem;
pub use rule::{Rule, RuleBuilder, RuleLhs, RuleRhs};
pub use variable_manager::{VarType, VariableManager};
