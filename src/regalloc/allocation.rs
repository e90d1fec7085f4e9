use anyhow::{anyhow, bail, Context as _, Result};

use std::collections::{BTreeMap, BTreeSet};

use crate::{
  regalloc::{
    coalesce::Coalescer, color::Colorer, interference::NodeState, simplify::SimplifyStep,
    spill_cost::SpillCostEstimator, AllocatorConfig, InterferenceGraph, Simplifier, UsageInfo,
    VReg,
  },
  utils::Graph,
};

/// Everything the allocator needs to know about one function and one
/// register class, as produced by liveness analysis.
#[derive(Clone, Debug, Default)]
pub struct AllocationProblem {
  /// Pairs of virtual registers that are live at the same time.
  pub interference: Graph<VReg>,
  /// `(dest, src)` of every register-to-register copy.
  pub moves: Vec<(VReg, VReg)>,
  pub usage: BTreeMap<VReg, UsageInfo>,
}

impl AllocationProblem {
  /// Every virtual register mentioned anywhere in the problem.
  pub fn vregs(&self) -> BTreeSet<VReg> {
    let mut vregs = self.interference.nodes().into_iter().collect::<BTreeSet<_>>();
    vregs.extend(self.usage.keys().copied());
    for (a, b) in &self.moves {
      vregs.insert(*a);
      vregs.insert(*b);
    }
    vregs
  }
}

/// The result of allocating one function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Allocation {
  /// Virtual register -> color (physical register index).
  pub colors: BTreeMap<VReg, usize>,
  /// Virtual registers that need memory traffic.
  pub spilled: BTreeSet<VReg>,
  /// Registers lowered to memory by earlier rounds.
  pub lowered: BTreeSet<VReg>,
  /// Coalesced virtual register -> the register it shares a color with.
  pub coalesced: BTreeMap<VReg, VReg>,
  /// How many nodes were pushed as potential spills in the final round.
  pub speculative: usize,
  /// Allocation rounds run, including the final one.
  pub rounds: usize,
  /// Graph checks that passed in diagnostic mode.
  pub checks: usize,
}

impl Allocation {
  fn collect(graph: &InterferenceGraph) -> Self {
    let mut allocation = Allocation::default();
    for node in graph.nodes() {
      let rep = graph.resolve(node.id());
      if let NodeState::MergedInto(_) = node.state() {
        if let Ok(rep_node) = graph.get(rep) {
          allocation.coalesced.insert(node.vreg(), rep_node.vreg());
        }
      }
      match graph.get(rep).ok().and_then(|n| n.color()) {
        Some(color) => {
          allocation.colors.insert(node.vreg(), color);
        }
        None => {
          allocation.spilled.insert(node.vreg());
        }
      }
    }
    allocation
  }

  pub fn is_complete(&self) -> bool {
    self.spilled.is_empty()
  }
}

/// The function being allocated, seen from the allocator. Liveness and spill
/// code insertion belong to the surrounding compiler.
pub trait AllocationUnit {
  fn name(&self) -> &str;

  /// Run liveness analysis on the current code.
  fn analyze(&self) -> Result<AllocationProblem>;

  /// Lower the given registers to memory so the next round sees shorter
  /// live ranges.
  fn insert_spill_code(&mut self, spilled: &BTreeSet<VReg>) -> Result<()>;
}

/// The allocator is responsible for assigning colors to one function's
/// virtual registers. It holds no state between functions.
pub struct Allocator<'a> {
  config: &'a AllocatorConfig,
  estimator: &'a dyn SpillCostEstimator,
}

impl<'a> Allocator<'a> {
  pub fn new(config: &'a AllocatorConfig, estimator: &'a dyn SpillCostEstimator) -> Self {
    Allocator { config, estimator }
  }

  /// One allocation round: build -> simplify/coalesce -> color.
  ///
  /// Uncolorable nodes end up in `Allocation::spilled`; they are not an error.
  pub fn allocate(&self, problem: &AllocationProblem) -> Result<Allocation> {
    let k = self.config.num_registers();
    let mut checks = 0;

    let mut graph = InterferenceGraph::build(problem, self.estimator)?;
    self.verify(&graph, "build", &mut checks)?;

    let mut coalescer = if self.config.coalescing {
      let moves = problem
        .moves
        .iter()
        .filter_map(|(dst, src)| Some((graph.node_of(*dst)?, graph.node_of(*src)?)))
        .collect::<Vec<_>>();
      Some(Coalescer::new(k, self.config.coalesce_test, moves))
    } else {
      None
    };

    let mut simplifier = Simplifier::new(k);
    loop {
      if let Some(coalescer) = coalescer.as_mut() {
        if coalescer.coalesce(&mut graph)? > 0 {
          self.verify(&graph, "coalesce", &mut checks)?;
        }
      }

      match simplifier.step(&mut graph)? {
        SimplifyStep::Done => break,
        SimplifyStep::Simplified(_) => self.verify(&graph, "simplify", &mut checks)?,
        SimplifyStep::SpillCandidate(_) => self.verify(&graph, "spill select", &mut checks)?,
      }
    }

    let order = simplifier.into_order();
    let outcome = Colorer::new(k).color(&mut graph, &order)?;
    self.verify(&graph, "color", &mut checks)?;

    let mut allocation = Allocation::collect(&graph);
    allocation.speculative = order.num_speculative();
    allocation.checks = checks;
    log::debug!(
      "round done: {} colored, {} spilled ({} potential), {} coalesced",
      allocation.colors.len(),
      outcome.spilled.len(),
      allocation.speculative,
      allocation.coalesced.len()
    );
    Ok(allocation)
  }

  /// Allocate, spill and retry until every remaining virtual register has a
  /// color.
  pub fn allocate_until_fixpoint<U: AllocationUnit>(&self, unit: &mut U) -> Result<Allocation> {
    let mut total_checks = 0;
    let mut lowered = BTreeSet::new();
    for round in 1..=self.config.max_rounds {
      let problem = unit
        .analyze()
        .with_context(|| format!("liveness of {} (round {})", unit.name(), round))?;
      let mut allocation = self
        .allocate(&problem)
        .with_context(|| format!("allocating {} (round {})", unit.name(), round))?;

      total_checks += allocation.checks;
      allocation.rounds = round;
      allocation.checks = total_checks;
      if allocation.is_complete() {
        allocation.lowered = lowered;
        log::debug!("{}: allocated in {} round(s)", unit.name(), round);
        return Ok(allocation);
      }

      log::debug!(
        "{}: round {} spills {:?}",
        unit.name(),
        round,
        allocation.spilled
      );
      unit
        .insert_spill_code(&allocation.spilled)
        .with_context(|| format!("inserting spill code in {} (round {})", unit.name(), round))?;
      lowered.extend(allocation.spilled);
    }

    bail!(
      "register allocation of {} did not converge after {} rounds",
      unit.name(),
      self.config.max_rounds
    )
  }

  fn verify(&self, graph: &InterferenceGraph, phase: &str, checks: &mut usize) -> Result<()> {
    if !self.config.verify {
      return Ok(());
    }
    let report = graph.check();
    if !report.is_valid() {
      return Err(anyhow!("inconsistent interference graph after {}: {}", phase, report));
    }
    *checks += 1;
    Ok(())
  }
}
