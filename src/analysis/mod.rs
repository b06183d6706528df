/*!

  The simplification pipeline: rule composition (chaining), location
  elimination strategies, preprocessing, pruning and the top-level analysis
  driver.

*/

mod chain;
mod chain_strategy;
mod driver;
mod preprocess;
mod prune;

pub use chain::chain_rules;
pub use chain_strategy::{
  chain_accelerated_rules, chain_linear_paths, chain_tree_paths, eliminate_a_location,
};
pub use driver::{Analysis, RuntimeResult};
pub use preprocess::Preprocess;
pub use prune::Pruning;
