//! Implements conservative register coalescing for the allocator
use serde::Deserialize;
use strum_macros::{AsRefStr, Display};

use std::collections::BTreeSet;

use super::{error::GraphResult, InterferenceGraph, NodeId};

/// Which safety test a merge must pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CoalesceTest {
  /// The merged node must have fewer than k neighbors.
  #[default]
  Conservative,
  /// Also accept merges whose union has fewer than k neighbors of
  /// significant degree (>= k).
  Briggs,
}

impl std::str::FromStr for CoalesceTest {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "conservative" => Ok(CoalesceTest::Conservative),
      "briggs" => Ok(CoalesceTest::Briggs),
      other => Err(format!("unknown coalescing test: {}", other)),
    }
  }
}

/// Merges copy-related nodes when doing so cannot make the graph harder to
/// color.
pub struct Coalescer {
  k: usize,
  test: CoalesceTest,
  /// Copy pairs that may still be merged later.
  pending: Vec<(NodeId, NodeId)>,
  merged: usize,
}

impl Coalescer {
  pub fn new(k: usize, test: CoalesceTest, moves: impl IntoIterator<Item = (NodeId, NodeId)>) -> Self {
    // a copy appears once no matter how often it is executed
    let pending = moves
      .into_iter()
      .filter(|(a, b)| a != b)
      .map(|(a, b)| if a < b { (a, b) } else { (b, a) })
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect();
    Coalescer {
      k,
      test,
      pending,
      merged: 0,
    }
  }

  /// One pass over the pending copies. Pairs that were merged, can never be
  /// merged (they interfere or one side has left the graph) or already share
  /// a representative are retired; unsafe pairs are kept for the next pass.
  ///
  /// Returns the number of merges performed.
  pub fn coalesce(&mut self, graph: &mut InterferenceGraph) -> GraphResult<usize> {
    let mut merged = 0;
    let mut still_pending = vec![];

    for (a, b) in std::mem::take(&mut self.pending) {
      let (a, b) = (graph.resolve(a), graph.resolve(b));
      if a == b {
        continue;
      }
      if !graph.get(a)?.is_active() || !graph.get(b)?.is_active() || graph.interferes(a, b) {
        continue;
      }

      if self.is_safe(graph, a, b)? {
        graph.merge(a, b)?;
        merged += 1;
      } else {
        still_pending.push((a, b));
      }
    }

    self.pending = still_pending;
    self.merged += merged;
    Ok(merged)
  }

  pub fn is_safe(&self, graph: &InterferenceGraph, a: NodeId, b: NodeId) -> GraphResult<bool> {
    if graph.combined_degree(a, b)? < self.k {
      return Ok(true);
    }
    match self.test {
      CoalesceTest::Conservative => Ok(false),
      CoalesceTest::Briggs => Ok(self.significant_neighbors(graph, a, b)? < self.k),
    }
  }

  /// Active neighbors of the pair whose degree is at least k.
  fn significant_neighbors(&self, graph: &InterferenceGraph, a: NodeId, b: NodeId) -> GraphResult<usize> {
    let na = graph.get(a)?.neighbors();
    let nb = graph.get(b)?.neighbors();
    let mut count = 0;
    for n in na.union(nb) {
      if *n == a || *n == b {
        continue;
      }
      let neighbor = graph.get(*n)?;
      if neighbor.is_active() && neighbor.current_degree() >= self.k {
        count += 1;
      }
    }
    Ok(count)
  }

  pub fn num_pending(&self) -> usize {
    self.pending.len()
  }

  pub fn num_merged(&self) -> usize {
    self.merged
  }
}
