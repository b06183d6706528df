/*!

  The incidence index of the ITS problem: a hypergraph over locations whose
  edges are transitions. A transition has one source and one target per
  right-hand side. The index is derived data, kept consistent by
  `add_transition`/`remove_transition`.

*/

use std::collections::{BTreeMap, BTreeSet};

use crate::{LocationIdx, TransIdx};

#[derive(Clone, Debug, Default)]
pub struct HyperGraph {
  // transition -> (source, targets); targets in rhs order, possibly repeated
  transitions: BTreeMap<TransIdx, (LocationIdx, Vec<LocationIdx>)>,
  outgoing   : BTreeMap<LocationIdx, BTreeSet<TransIdx>>,
  incoming   : BTreeMap<LocationIdx, BTreeSet<TransIdx>>,
}

impl HyperGraph {
  pub fn new() -> HyperGraph {
    HyperGraph::default()
  }

  pub fn add_transition(&mut self, id: TransIdx, source: LocationIdx, targets: Vec<LocationIdx>) {
    self.outgoing.entry(source).or_default().insert(id);
    for target in &targets {
      self.incoming.entry(*target).or_default().insert(id);
    }
    self.transitions.insert(id, (source, targets));
  }

  pub fn remove_transition(&mut self, id: TransIdx) {
    if let Some((source, targets)) = self.transitions.remove(&id) {
      if let Some(set) = self.outgoing.get_mut(&source) {
        set.remove(&id);
      }
      for target in targets {
        if let Some(set) = self.incoming.get_mut(&target) {
          set.remove(&id);
        }
      }
    }
  }

  pub fn source(&self, id: TransIdx) -> Option<LocationIdx> {
    self.transitions.get(&id).map(|(source, _)| *source)
  }

  pub fn targets(&self, id: TransIdx) -> &[LocationIdx] {
    self
        .transitions
        .get(&id)
        .map(|(_, targets)| targets.as_slice())
        .unwrap_or(&[])
  }

  pub fn transitions_from(&self, loc: LocationIdx) -> Vec<TransIdx> {
    self
        .outgoing
        .get(&loc)
        .map(|set| set.iter().copied().collect())
        .unwrap_or_default()
  }

  pub fn transitions_to(&self, loc: LocationIdx) -> Vec<TransIdx> {
    self
        .incoming
        .get(&loc)
        .map(|set| set.iter().copied().collect())
        .unwrap_or_default()
  }

  pub fn transitions_from_to(&self, from: LocationIdx, to: LocationIdx) -> Vec<TransIdx> {
    match self.outgoing.get(&from) {
      Some(set) => {
        set
            .iter()
            .filter(|id| self.targets(**id).contains(&to))
            .copied()
            .collect()
      }
      None      => Vec::new(),
    }
  }

  pub fn has_transitions_from(&self, loc: LocationIdx) -> bool {
    self.outgoing.get(&loc).map(|set| !set.is_empty()).unwrap_or(false)
  }

  pub fn has_transitions_to(&self, loc: LocationIdx) -> bool {
    self.incoming.get(&loc).map(|set| !set.is_empty()).unwrap_or(false)
  }

  pub fn successors(&self, loc: LocationIdx) -> BTreeSet<LocationIdx> {
    let mut result = BTreeSet::new();
    if let Some(set) = self.outgoing.get(&loc) {
      for id in set {
        for target in self.targets(*id) {
          result.insert(*target);
        }
      }
    }
    result
  }

  pub fn predecessors(&self, loc: LocationIdx) -> BTreeSet<LocationIdx> {
    let mut result = BTreeSet::new();
    if let Some(set) = self.incoming.get(&loc) {
      for id in set {
        if let Some(source) = self.source(*id) {
          result.insert(source);
        }
      }
    }
    result
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn incidence_consistency() {
    let mut graph = HyperGraph::new();
    graph.add_transition(0, 0, vec![1, 2]);
    graph.add_transition(1, 1, vec![1]);

    assert_eq!(graph.transitions_from(0), vec![0]);
    assert_eq!(graph.transitions_to(1), vec![0, 1]);
    assert_eq!(graph.transitions_from_to(0, 2), vec![0]);
    assert_eq!(graph.successors(0), [1, 2].iter().copied().collect());
    assert_eq!(graph.predecessors(1), [0, 1].iter().copied().collect());

    graph.remove_transition(0);
    assert!(!graph.has_transitions_from(0));
    assert_eq!(graph.transitions_to(1), vec![1]);
    assert!(graph.transitions_to(2).is_empty());
  }
}
