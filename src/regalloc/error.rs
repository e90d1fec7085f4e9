//! Invariant violations raised by the interference graph.
//!
//! None of these are recoverable: each one means the graph bookkeeping is
//! already corrupted, so they abort the current compilation.

use std::fmt;

use super::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
  /// `remove_neighbor` was asked to drop an edge that does not exist.
  MissingNeighbor { node: NodeId, neighbor: NodeId },
  /// A degree counter would have gone below zero.
  DegreeUnderflow(NodeId),
  /// The node was pushed on the stack twice.
  AlreadyOnStack(NodeId),
  /// The node has been merged away or eliminated and can no longer be mutated.
  NotActive(NodeId),
  /// An edge from a node to itself.
  SelfEdge(NodeId),
  /// A handle that does not belong to this graph.
  UnknownNode(NodeId),
  /// Two interfering nodes were handed to `merge`.
  InterferingMerge(NodeId, NodeId),
  /// The colorer met a node that never went through the elimination order.
  NotEliminated(NodeId),
  /// The elimination order holds the same node twice.
  DuplicateElimination(NodeId),
}

impl fmt::Display for InvariantViolation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    use InvariantViolation::*;
    match self {
      MissingNeighbor { node, neighbor } => write!(
        f,
        "adjacency corrupted: {} is not a neighbor of {}",
        neighbor, node
      ),
      DegreeUnderflow(node) => write!(f, "degree of {} dropped below zero", node),
      AlreadyOnStack(node) => write!(f, "{} is already on the stack", node),
      NotActive(node) => write!(f, "{} is no longer active in the graph", node),
      SelfEdge(node) => write!(f, "self edge on {}", node),
      UnknownNode(node) => write!(f, "{} does not belong to this graph", node),
      InterferingMerge(a, b) => write!(f, "cannot merge interfering nodes {} and {}", a, b),
      NotEliminated(node) => write!(f, "{} was never eliminated before coloring", node),
      DuplicateElimination(node) => write!(f, "{} appears twice in the elimination order", node),
    }
  }
}

impl std::error::Error for InvariantViolation {}

pub type GraphResult<T> = Result<T, InvariantViolation>;
