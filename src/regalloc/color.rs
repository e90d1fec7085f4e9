use std::collections::BTreeSet;

use super::{
  error::{GraphResult, InvariantViolation},
  EliminationOrder, InterferenceGraph, NodeId,
};

/// Nodes that could not get a color during one round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColorOutcome {
  pub spilled: Vec<NodeId>,
}

impl ColorOutcome {
  pub fn has_spills(&self) -> bool {
    !self.spilled.is_empty()
  }
}

pub struct Colorer {
  k: usize,
}

impl Colorer {
  pub fn new(k: usize) -> Self {
    Colorer { k }
  }

  /// Implements the select phase.
  ///
  /// Nodes are visited in reverse elimination order. Each one gets the lowest
  /// color in `[0, k)` that none of its colored neighbors uses; a node with no
  /// free color is an actual spill and stays uncolored.
  pub fn color(&self, graph: &mut InterferenceGraph, order: &EliminationOrder) -> GraphResult<ColorOutcome> {
    // every node that was not merged away has to come through the order
    if let Some(missing) = graph
      .nodes()
      .find(|n| !n.state().is_merged_into() && !order.contains(n.id()))
    {
      return Err(InvariantViolation::NotEliminated(missing.id()));
    }

    let mut outcome = ColorOutcome::default();
    for &id in order.as_slice().iter().rev() {
      let node = graph.get(id)?;
      if !node.state().is_on_stack() {
        return Err(InvariantViolation::NotEliminated(id));
      }

      let neighbor_colors = node
        .neighbors()
        .iter()
        .filter_map(|n| graph.get(graph.resolve(*n)).ok())
        .filter_map(|n| n.color())
        .collect::<BTreeSet<_>>();

      match (0..self.k).find(|c| !neighbor_colors.contains(c)) {
        Some(color) => graph.get_mut(id)?.set_color(color),
        None => {
          log::debug!(
            "actual spill: {} ({} neighbor colors in use)",
            graph.get(id)?.vreg(),
            neighbor_colors.len()
          );
          outcome.spilled.push(id);
        }
      }
    }

    Ok(outcome)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::regalloc::{Simplifier, SimplifyStep, VReg};

  fn eliminate(graph: &mut InterferenceGraph, k: usize) -> EliminationOrder {
    let mut simplifier = Simplifier::new(k);
    while simplifier.step(graph).unwrap() != SimplifyStep::Done {}
    simplifier.into_order()
  }

  fn graph_with(n: usize, edges: &[(usize, usize)]) -> InterferenceGraph {
    let mut graph = InterferenceGraph::new();
    for i in 0..n {
      graph.add_node(VReg(i as u32), 1.0 + i as f64);
    }
    for (a, b) in edges {
      graph.add_edge(NodeId(*a), NodeId(*b)).unwrap();
    }
    graph
  }

  #[test]
  fn test_color_path_with_two_colors() {
    let mut graph = graph_with(3, &[(0, 1), (1, 2)]);
    let order = eliminate(&mut graph, 2);
    let outcome = Colorer::new(2).color(&mut graph, &order).unwrap();

    assert!(!outcome.has_spills());
    let c = |i| graph.get(NodeId(i)).unwrap().color().unwrap();
    assert_ne!(c(0), c(1));
    assert_ne!(c(1), c(2));
  }

  #[test]
  fn test_last_eliminated_is_colored_first() {
    let mut graph = graph_with(2, &[(0, 1)]);
    let order = eliminate(&mut graph, 2);
    assert_eq!(order.as_slice(), &[NodeId(0), NodeId(1)]);

    Colorer::new(2).color(&mut graph, &order).unwrap();
    assert_eq!(graph.get(NodeId(1)).unwrap().color(), Some(0));
    assert_eq!(graph.get(NodeId(0)).unwrap().color(), Some(1));
  }

  #[test]
  fn test_triangle_with_two_colors_spills_one() {
    let mut graph = graph_with(3, &[(0, 1), (1, 2), (0, 2)]);
    let order = eliminate(&mut graph, 2);
    let outcome = Colorer::new(2).color(&mut graph, &order).unwrap();

    assert_eq!(outcome.spilled, vec![NodeId(0)]);
    assert_eq!(graph.get(NodeId(0)).unwrap().color(), None);
  }

  #[test]
  fn test_merged_neighbors_resolve_to_survivor_color() {
    // 0 and 1 are copies, 2 interferes with 1
    let mut graph = graph_with(3, &[(1, 2)]);
    let survivor = graph.merge(NodeId(0), NodeId(1)).unwrap();
    let order = eliminate(&mut graph, 2);
    assert_eq!(order.len(), 2);

    Colorer::new(2).color(&mut graph, &order).unwrap();
    let merged_color = graph.get(graph.resolve(NodeId(0))).unwrap().color();
    assert_eq!(graph.resolve(NodeId(0)), survivor);
    assert_ne!(merged_color, graph.get(NodeId(2)).unwrap().color());
  }

  #[test]
  fn test_uneliminated_node_is_rejected() {
    let mut graph = graph_with(2, &[]);
    let order = EliminationOrder::new();
    assert_eq!(
      Colorer::new(2).color(&mut graph, &order),
      Err(InvariantViolation::NotEliminated(NodeId(0)))
    );
  }
}
