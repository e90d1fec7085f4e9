use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Plain undirected graph keyed by value. This is the raw interference
/// relation handed over by liveness analysis, before any allocation state is
/// attached to it.
#[derive(Clone, Debug, Default)]
pub struct Graph<T: Hash + Eq>(HashMap<T, HashSet<T>>);

impl<T: Hash + Eq + Ord + Clone + Copy> Graph<T> {
  pub fn new() -> Self {
    Graph(HashMap::new())
  }

  /// Return the neighbors of a node
  ///
  /// # Return
  /// If the node does not exist, return None
  /// If there is no neighbor for this node, return an empty HashSet
  pub fn neighbors(&self, node: &T) -> Option<&HashSet<T>> {
    self.0.get(node)
  }

  pub fn contains(&self, node: &T) -> bool {
    self.0.contains_key(node)
  }

  pub fn has_edge(&self, node1: &T, node2: &T) -> bool {
    self.0.get(node1).map_or(false, |n| n.contains(node2))
  }

  /// All nodes in ascending order
  pub fn nodes(&self) -> Vec<T> {
    let mut nodes = self.0.keys().copied().collect::<Vec<_>>();
    nodes.sort();
    nodes
  }

  /// Every edge once, as `(smaller, larger)`, in ascending order
  pub fn edges(&self) -> Vec<(T, T)> {
    let mut edges = self
      .0
      .iter()
      .flat_map(|(a, ns)| ns.iter().filter(move |b| a < *b).map(move |b| (*a, *b)))
      .collect::<Vec<_>>();
    edges.sort();
    edges
  }

  pub fn num_nodes(&self) -> usize {
    self.0.len()
  }

  pub fn num_edges(&self) -> usize {
    self.0.values().map(HashSet::len).sum::<usize>() / 2
  }

  /// Idempotently add a node into the graph
  pub fn add_node(&mut self, node: T) {
    self.0.entry(node).or_default();
  }

  /// Add edges between a node and its neighbors
  pub fn add_graph_edges<'a>(&mut self, node: T, neighbors: impl IntoIterator<Item = &'a T>)
  where
    T: 'a,
  {
    for neigh in neighbors {
      self.add_graph_edge(node, *neigh);
    }
  }

  /// Add an edge between two nodes, i.e. node1 and node2. A node never
  /// interferes with itself, so `node1 == node2` only adds the node.
  pub fn add_graph_edge(&mut self, node1: T, node2: T) {
    self.add_node(node1);
    self.add_node(node2);
    if node1 == node2 {
      return;
    }

    self.0.entry(node1).or_default().insert(node2);
    self.0.entry(node2).or_default().insert(node1);
  }
}
