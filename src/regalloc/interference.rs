use enum_as_inner::EnumAsInner;
use serde::{Serialize, Serializer};

use crate::regalloc::{
  error::{GraphResult, InvariantViolation},
  spill_cost::SpillCostEstimator,
  AllocationProblem,
};

use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
};

/// A virtual register handed out by earlier compiler phases.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct VReg(pub u32);

impl fmt::Display for VReg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "v{}", self.0)
  }
}

// Serialized as `v<N>` so it can key JSON objects
impl Serialize for VReg {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

/// Stable handle of a node inside one graph's arena.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "n{}", self.0)
  }
}

/// Every node is in exactly one of these states. Once a node leaves `Active`
/// it never comes back for the lifetime of the graph.
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumAsInner)]
pub enum NodeState {
  Active,
  OnStack,
  MergedInto(NodeId),
}

/// The live range of one virtual register inside the interference graph.
#[derive(Clone, Debug)]
pub struct Node {
  id: NodeId,
  vreg: VReg,
  adjacency: BTreeSet<NodeId>,
  /// Number of neighbors that are still active.
  current_degree: usize,
  state: NodeState,
  color: Option<usize>,
  spill_cost: f64,
}

impl Node {
  fn new(id: NodeId, vreg: VReg, spill_cost: f64) -> Self {
    Node {
      id,
      vreg,
      adjacency: BTreeSet::new(),
      current_degree: 0,
      state: NodeState::Active,
      color: None,
      spill_cost,
    }
  }

  pub fn id(&self) -> NodeId {
    self.id
  }

  pub fn vreg(&self) -> VReg {
    self.vreg
  }

  pub fn state(&self) -> NodeState {
    self.state
  }

  pub fn is_active(&self) -> bool {
    self.state.is_active()
  }

  pub fn current_degree(&self) -> usize {
    self.current_degree
  }

  pub fn color(&self) -> Option<usize> {
    self.color
  }

  pub fn spill_cost(&self) -> f64 {
    self.spill_cost
  }

  pub fn neighbors(&self) -> &BTreeSet<NodeId> {
    &self.adjacency
  }

  pub fn is_adjacent(&self, other: NodeId) -> bool {
    self.adjacency.contains(&other)
  }

  /// Drop `neighbor` from this node's adjacency set only. The caller is
  /// responsible for the other side of the edge and for degree bookkeeping.
  pub fn remove_neighbor(&mut self, neighbor: NodeId) -> GraphResult<()> {
    if self.adjacency.remove(&neighbor) {
      Ok(())
    } else {
      Err(InvariantViolation::MissingNeighbor {
        node: self.id,
        neighbor,
      })
    }
  }

  /// Number of distinct neighbors the node would have if merged with `other`:
  /// `|adj(self) ∪ adj(other) \ {self, other}|`.
  pub fn combined_degree(&self, other: &Node) -> usize {
    self
      .adjacency
      .union(&other.adjacency)
      .filter(|n| **n != self.id && **n != other.id)
      .count()
  }

  pub(super) fn set_color(&mut self, color: usize) {
    self.color = Some(color);
  }

  fn dec_degree(&mut self) -> GraphResult<()> {
    self.current_degree = self
      .current_degree
      .checked_sub(1)
      .ok_or(InvariantViolation::DegreeUnderflow(self.id))?;
    Ok(())
  }

  fn inc_degree(&mut self) {
    self.current_degree += 1;
  }

  #[cfg(test)]
  pub(super) fn adjacency_mut_for_test(&mut self) -> &mut BTreeSet<NodeId> {
    &mut self.adjacency
  }

  #[cfg(test)]
  pub(super) fn set_state_for_test(&mut self, state: NodeState) {
    self.state = state;
  }
}

/// The interference graph of one allocation attempt. Nodes live in an arena
/// and are never physically removed: elimination and coalescing only change
/// their state.
#[derive(Clone, Debug, Default)]
pub struct InterferenceGraph {
  pub(super) nodes: Vec<Node>,
  index: BTreeMap<VReg, NodeId>,
}

impl InterferenceGraph {
  pub fn new() -> Self {
    InterferenceGraph::default()
  }

  /// Build the graph for one round from the liveness result. Nodes are
  /// numbered in ascending virtual register order.
  pub fn build(
    problem: &AllocationProblem,
    estimator: &dyn SpillCostEstimator,
  ) -> GraphResult<Self> {
    let mut graph = InterferenceGraph::new();
    for vreg in problem.vregs() {
      let usage = problem.usage.get(&vreg).cloned().unwrap_or_default();
      graph.add_node(vreg, estimator.spill_cost(vreg, &usage));
    }

    for (a, b) in problem.interference.edges() {
      if let (Some(a), Some(b)) = (graph.node_of(a), graph.node_of(b)) {
        graph.add_edge(a, b)?;
      }
    }

    log::debug!(
      "built interference graph: {} nodes, {} edges",
      graph.len(),
      graph.num_edges()
    );
    Ok(graph)
  }

  /// Add a node for `vreg`, or return the existing one.
  pub fn add_node(&mut self, vreg: VReg, spill_cost: f64) -> NodeId {
    if let Some(id) = self.index.get(&vreg) {
      return *id;
    }
    let id = NodeId(self.nodes.len());
    self.nodes.push(Node::new(id, vreg, spill_cost));
    self.index.insert(vreg, id);
    id
  }

  /// Insert an undirected edge. Adding an existing edge is a no-op.
  pub fn add_edge(&mut self, a: NodeId, b: NodeId) -> GraphResult<()> {
    self.get(a)?;
    self.get(b)?;
    if a == b {
      return Err(InvariantViolation::SelfEdge(a));
    }
    if self.nodes[a.0].adjacency.contains(&b) {
      return Ok(());
    }

    self.nodes[a.0].adjacency.insert(b);
    self.nodes[b.0].adjacency.insert(a);
    if self.nodes[b.0].is_active() {
      self.nodes[a.0].inc_degree();
    }
    if self.nodes[a.0].is_active() {
      self.nodes[b.0].inc_degree();
    }
    Ok(())
  }

  /// Remove an existing edge from both adjacency sets.
  pub fn remove_edge(&mut self, a: NodeId, b: NodeId) -> GraphResult<()> {
    self.get(a)?;
    self.get(b)?;
    self.nodes[a.0].remove_neighbor(b)?;
    self.nodes[b.0].remove_neighbor(a)?;
    if self.nodes[b.0].is_active() {
      self.nodes[a.0].dec_degree()?;
    }
    if self.nodes[a.0].is_active() {
      self.nodes[b.0].dec_degree()?;
    }
    Ok(())
  }

  /// Mark `id` as eliminated. Every neighbor that is still active loses one
  /// degree; adjacency sets are left untouched.
  pub fn push_on_stack(&mut self, id: NodeId) -> GraphResult<()> {
    match self.get(id)?.state {
      NodeState::Active => {}
      NodeState::OnStack => return Err(InvariantViolation::AlreadyOnStack(id)),
      NodeState::MergedInto(_) => return Err(InvariantViolation::NotActive(id)),
    }

    self.nodes[id.0].state = NodeState::OnStack;
    let neighbors = self.nodes[id.0].adjacency.iter().copied().collect::<Vec<_>>();
    for n in neighbors {
      let neighbor = self.get_mut(n)?;
      if neighbor.is_active() {
        neighbor.dec_degree()?;
      }
    }
    Ok(())
  }

  /// Coalesce two active, non-interfering nodes. The node with the larger
  /// degree survives (lower id on ties) and inherits every edge of the other
  /// one; edges the survivor already has are dropped instead of duplicated.
  ///
  /// Returns the surviving node.
  pub fn merge(&mut self, a: NodeId, b: NodeId) -> GraphResult<NodeId> {
    self.expect_active(a)?;
    self.expect_active(b)?;
    if a == b {
      return Err(InvariantViolation::SelfEdge(a));
    }
    if self.interferes(a, b) {
      return Err(InvariantViolation::InterferingMerge(a, b));
    }

    let (da, db) = (self.nodes[a.0].current_degree, self.nodes[b.0].current_degree);
    let (survivor, victim) = if da > db || (da == db && a < b) {
      (a, b)
    } else {
      (b, a)
    };

    let victim_neighbors = self.nodes[victim.0]
      .adjacency
      .iter()
      .copied()
      .collect::<Vec<_>>();
    for n in victim_neighbors {
      let neighbor = self.get_mut(n)?;
      let n_active = neighbor.is_active();
      neighbor.remove_neighbor(victim)?;
      self.nodes[victim.0].remove_neighbor(n)?;

      if self.nodes[survivor.0].adjacency.contains(&n) {
        // n loses one of its two edges into the merged pair
        if n_active {
          self.get_mut(n)?.dec_degree()?;
        }
      } else {
        self.get_mut(n)?.adjacency.insert(survivor);
        self.nodes[survivor.0].adjacency.insert(n);
        if n_active {
          self.nodes[survivor.0].inc_degree();
        }
      }
    }

    let victim_cost = self.nodes[victim.0].spill_cost;
    self.nodes[survivor.0].spill_cost += victim_cost;

    let victim_node = &mut self.nodes[victim.0];
    victim_node.state = NodeState::MergedInto(survivor);
    victim_node.current_degree = 0;

    log::debug!(
      "coalesced {} into {}",
      self.nodes[victim.0].vreg,
      self.nodes[survivor.0].vreg
    );
    Ok(survivor)
  }

  /// Follow the merge chain of `id` to its representative.
  pub fn resolve(&self, id: NodeId) -> NodeId {
    let mut current = id;
    while let Some(next) = self
      .nodes
      .get(current.0)
      .and_then(|n| n.state.as_merged_into().copied())
    {
      current = next;
    }
    current
  }

  pub fn interferes(&self, a: NodeId, b: NodeId) -> bool {
    self
      .nodes
      .get(a.0)
      .map_or(false, |node| node.adjacency.contains(&b))
  }

  pub fn combined_degree(&self, a: NodeId, b: NodeId) -> GraphResult<usize> {
    Ok(self.get(a)?.combined_degree(self.get(b)?))
  }

  pub fn degree(&self, id: NodeId) -> GraphResult<usize> {
    Ok(self.get(id)?.current_degree)
  }

  pub fn node_of(&self, vreg: VReg) -> Option<NodeId> {
    self.index.get(&vreg).copied()
  }

  pub fn get(&self, id: NodeId) -> GraphResult<&Node> {
    self
      .nodes
      .get(id.0)
      .ok_or(InvariantViolation::UnknownNode(id))
  }

  pub(super) fn get_mut(&mut self, id: NodeId) -> GraphResult<&mut Node> {
    self
      .nodes
      .get_mut(id.0)
      .ok_or(InvariantViolation::UnknownNode(id))
  }

  pub fn nodes(&self) -> impl Iterator<Item = &Node> {
    self.nodes.iter()
  }

  pub fn active_nodes(&self) -> impl Iterator<Item = &Node> {
    self.nodes.iter().filter(|n| n.is_active())
  }

  pub fn has_active_nodes(&self) -> bool {
    self.nodes.iter().any(Node::is_active)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn num_edges(&self) -> usize {
    self.nodes.iter().map(|n| n.adjacency.len()).sum::<usize>() / 2
  }

  fn expect_active(&self, id: NodeId) -> GraphResult<()> {
    if self.get(id)?.is_active() {
      Ok(())
    } else {
      Err(InvariantViolation::NotActive(id))
    }
  }
}
