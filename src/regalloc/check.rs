//! Structural consistency check of the interference graph, used in
//! diagnostic mode and by the tests after every mutation.

use serde::Serialize;

use std::fmt;

use super::{InterferenceGraph, NodeId, NodeState};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Problem {
  /// An active node's counter disagrees with its active neighbors.
  DegreeMismatch {
    node: NodeId,
    recorded: usize,
    actual: usize,
  },
  AsymmetricEdge { from: NodeId, to: NodeId },
  SelfEdge { node: NodeId },
  /// The edge points outside the arena or at a merged-away node.
  DanglingEdge { node: NodeId, neighbor: NodeId },
  /// A merged-away node still holds edges.
  MergedWithEdges { node: NodeId },
  /// A merge chain that never reaches a representative.
  MergeCycle { node: NodeId },
}

impl fmt::Display for Problem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Problem::DegreeMismatch {
        node,
        recorded,
        actual,
      } => write!(
        f,
        "{}: degree is {} but {} active neighbors",
        node, recorded, actual
      ),
      Problem::AsymmetricEdge { from, to } => {
        write!(f, "{} -> {} has no matching {} -> {}", from, to, to, from)
      }
      Problem::SelfEdge { node } => write!(f, "{}: self edge", node),
      Problem::DanglingEdge { node, neighbor } => {
        write!(f, "{}: dangling edge to {}", node, neighbor)
      }
      Problem::MergedWithEdges { node } => write!(f, "{}: merged away but still has edges", node),
      Problem::MergeCycle { node } => write!(f, "{}: merge chain does not terminate", node),
    }
  }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidityReport {
  pub nodes: usize,
  pub edges: usize,
  pub problems: Vec<Problem>,
}

impl ValidityReport {
  pub fn is_valid(&self) -> bool {
    self.problems.is_empty()
  }
}

impl fmt::Display for ValidityReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} nodes, {} edges, {} problem(s)",
      self.nodes,
      self.edges,
      self.problems.len()
    )?;
    for problem in &self.problems {
      write!(f, "\n  {}", problem)?;
    }
    Ok(())
  }
}

impl InterferenceGraph {
  pub fn check(&self) -> ValidityReport {
    let mut problems = vec![];

    for node in self.nodes() {
      let id = node.id();

      if let NodeState::MergedInto(_) = node.state() {
        if !node.neighbors().is_empty() {
          problems.push(Problem::MergedWithEdges { node: id });
        }
        if !self.merge_chain_terminates(id) {
          problems.push(Problem::MergeCycle { node: id });
        }
      }

      let mut active_neighbors = 0;
      for &n in node.neighbors() {
        if n == id {
          problems.push(Problem::SelfEdge { node: id });
          continue;
        }
        let neighbor = match self.get(n) {
          Ok(neighbor) if !neighbor.state().is_merged_into() => neighbor,
          _ => {
            problems.push(Problem::DanglingEdge { node: id, neighbor: n });
            continue;
          }
        };
        if !neighbor.is_adjacent(id) {
          problems.push(Problem::AsymmetricEdge { from: id, to: n });
        }
        if neighbor.is_active() {
          active_neighbors += 1;
        }
      }

      if node.is_active() && node.current_degree() != active_neighbors {
        problems.push(Problem::DegreeMismatch {
          node: id,
          recorded: node.current_degree(),
          actual: active_neighbors,
        });
      }
    }

    ValidityReport {
      nodes: self.len(),
      edges: self.num_edges(),
      problems,
    }
  }

  fn merge_chain_terminates(&self, id: NodeId) -> bool {
    let mut current = id;
    for _ in 0..=self.len() {
      match self.get(current).map(|n| n.state()) {
        Ok(NodeState::MergedInto(next)) => current = next,
        Ok(_) => return true,
        Err(_) => return false,
      }
    }
    false
  }
}
