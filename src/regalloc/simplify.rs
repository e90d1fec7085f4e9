//! Simplification: peel nodes off the graph into the elimination order.
use std::collections::BTreeSet;

use super::{
  error::{GraphResult, InvariantViolation},
  InterferenceGraph, NodeId,
};

/// The order in which nodes left the graph. Every node appears at most once;
/// the colorer walks it backwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EliminationOrder {
  order: Vec<NodeId>,
  seen: BTreeSet<NodeId>,
  /// Nodes that were pushed as potential spills rather than safely.
  speculative: BTreeSet<NodeId>,
}

impl EliminationOrder {
  pub fn new() -> Self {
    EliminationOrder::default()
  }

  fn record(&mut self, id: NodeId, speculative: bool) -> GraphResult<()> {
    if !self.seen.insert(id) {
      return Err(InvariantViolation::DuplicateElimination(id));
    }
    self.order.push(id);
    if speculative {
      self.speculative.insert(id);
    }
    Ok(())
  }

  pub fn as_slice(&self) -> &[NodeId] {
    &self.order
  }

  pub fn contains(&self, id: NodeId) -> bool {
    self.seen.contains(&id)
  }

  pub fn is_speculative(&self, id: NodeId) -> bool {
    self.speculative.contains(&id)
  }

  pub fn num_speculative(&self) -> usize {
    self.speculative.len()
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }
}

impl InterferenceGraph {
  /// Eliminate the lowest-numbered active node whose degree is below `k`.
  /// Such a node can always be colored later, whatever its neighbors get.
  pub fn simplify(&mut self, k: usize, order: &mut EliminationOrder) -> GraphResult<Option<NodeId>> {
    let candidate = self
      .active_nodes()
      .find(|n| n.current_degree() < k)
      .map(|n| n.id());

    if let Some(id) = candidate {
      self.push_on_stack(id)?;
      order.record(id, false)?;
      log::trace!("simplify: {}", id);
    }
    Ok(candidate)
  }

  /// Eliminate the active node with the smallest `spill_cost / degree`, as a
  /// speculative spill. Ties go to the lowest id.
  pub fn select_spill_candidate(&mut self, order: &mut EliminationOrder) -> GraphResult<Option<NodeId>> {
    let mut best: Option<(NodeId, f64)> = None;
    for node in self.active_nodes() {
      let degree = node.current_degree().max(1) as f64;
      let priority = node.spill_cost() / degree;
      match best {
        Some((_, best_priority)) if priority >= best_priority => {}
        Some(_) if priority.is_nan() => {}
        _ => best = Some((node.id(), priority)),
      }
    }

    let candidate = best.map(|(id, _)| id);
    if let Some(id) = candidate {
      self.push_on_stack(id)?;
      order.record(id, true)?;
      log::debug!(
        "potential spill: {} (cost {}, degree {})",
        self.get(id)?.vreg(),
        self.get(id)?.spill_cost(),
        self.get(id)?.current_degree()
      );
    }
    Ok(candidate)
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SimplifyStep {
  Simplified(NodeId),
  SpillCandidate(NodeId),
  Done,
}

/// Drives simplification for one round and owns the elimination order.
pub struct Simplifier {
  k: usize,
  order: EliminationOrder,
}

impl Simplifier {
  pub fn new(k: usize) -> Self {
    Simplifier {
      k,
      order: EliminationOrder::new(),
    }
  }

  /// Remove one node: a safe one if any, otherwise a spill candidate.
  pub fn step(&mut self, graph: &mut InterferenceGraph) -> GraphResult<SimplifyStep> {
    if let Some(id) = graph.simplify(self.k, &mut self.order)? {
      return Ok(SimplifyStep::Simplified(id));
    }
    if let Some(id) = graph.select_spill_candidate(&mut self.order)? {
      return Ok(SimplifyStep::SpillCandidate(id));
    }
    Ok(SimplifyStep::Done)
  }

  pub fn order(&self) -> &EliminationOrder {
    &self.order
  }

  pub fn into_order(self) -> EliminationOrder {
    self.order
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::regalloc::VReg;

  fn graph_with(costs: &[f64], edges: &[(usize, usize)]) -> InterferenceGraph {
    let mut graph = InterferenceGraph::new();
    for (i, cost) in costs.iter().enumerate() {
      graph.add_node(VReg(i as u32), *cost);
    }
    for (a, b) in edges {
      graph.add_edge(NodeId(*a), NodeId(*b)).unwrap();
    }
    graph
  }

  #[test]
  fn test_simplify_takes_low_degree_nodes_in_order() {
    // a path 0 - 1 - 2
    let mut graph = graph_with(&[1.0, 1.0, 1.0], &[(0, 1), (1, 2)]);
    let mut order = EliminationOrder::new();

    assert_eq!(graph.simplify(2, &mut order).unwrap(), Some(NodeId(0)));
    assert_eq!(graph.simplify(2, &mut order).unwrap(), Some(NodeId(1)));
    assert_eq!(graph.simplify(2, &mut order).unwrap(), Some(NodeId(2)));
    assert_eq!(graph.simplify(2, &mut order).unwrap(), None);
    assert_eq!(order.as_slice(), &[NodeId(0), NodeId(1), NodeId(2)]);
    assert_eq!(order.num_speculative(), 0);
  }

  #[test]
  fn test_simplify_stalls_on_high_degree() {
    let mut graph = graph_with(&[1.0, 1.0, 1.0], &[(0, 1), (1, 2), (0, 2)]);
    let mut order = EliminationOrder::new();
    assert_eq!(graph.simplify(2, &mut order).unwrap(), None);
    assert!(order.is_empty());
  }

  #[test]
  fn test_spill_candidate_minimizes_cost_per_degree() {
    // triangle plus a pendant on node 2: degrees 2, 2, 3, 1
    let mut graph = graph_with(&[4.0, 3.0, 4.5, 100.0], &[(0, 1), (1, 2), (0, 2), (2, 3)]);
    let mut order = EliminationOrder::new();

    // 4/2 = 2, 3/2 = 1.5, 4.5/3 = 1.5 -> lowest id among the ties
    let picked = graph.select_spill_candidate(&mut order).unwrap();
    assert_eq!(picked, Some(NodeId(1)));
    assert!(order.is_speculative(NodeId(1)));
    assert_eq!(graph.degree(NodeId(0)).unwrap(), 1);
  }

  #[test]
  fn test_spill_candidate_with_infinite_costs() {
    let mut graph = graph_with(&[f64::INFINITY, f64::INFINITY], &[(0, 1)]);
    let mut order = EliminationOrder::new();
    assert_eq!(
      graph.select_spill_candidate(&mut order).unwrap(),
      Some(NodeId(0))
    );
  }

  #[test]
  fn test_simplifier_eliminates_every_node_once() {
    // K4 with k = 2 needs speculative spills
    let edges = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];
    let mut graph = graph_with(&[1.0, 2.0, 3.0, 4.0], &edges);
    let mut simplifier = Simplifier::new(2);

    let mut steps = vec![];
    loop {
      match simplifier.step(&mut graph).unwrap() {
        SimplifyStep::Done => break,
        step => steps.push(step),
      }
    }

    assert_eq!(steps.len(), 4);
    assert!(matches!(steps[0], SimplifyStep::SpillCandidate(NodeId(0))));
    assert!(matches!(steps[1], SimplifyStep::SpillCandidate(NodeId(1))));
    assert!(matches!(steps[2], SimplifyStep::Simplified(NodeId(2))));
    assert!(matches!(steps[3], SimplifyStep::Simplified(NodeId(3))));

    let mut seen = simplifier.order().as_slice().to_vec();
    seen.sort();
    assert_eq!(seen, vec![NodeId(0), NodeId(1), NodeId(2), NodeId(3)]);
    assert!(!graph.has_active_nodes());
  }

  #[test]
  fn test_elimination_order_rejects_duplicates() {
    let mut order = EliminationOrder::new();
    order.record(NodeId(3), false).unwrap();
    assert_eq!(
      order.record(NodeId(3), true),
      Err(InvariantViolation::DuplicateElimination(NodeId(3)))
    );
  }
}
