//! Spill cost heuristic used to break ties during simplification.

use serde::Serialize;

use super::VReg;

/// Per-register usage facts supplied by instruction selection.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct UsageInfo {
  pub uses: u32,
  pub defs: u32,
  /// Deepest loop nesting level the register is referenced at.
  pub loop_depth: u32,
  /// Set for temporaries introduced by spill code; spilling them again
  /// cannot relieve any pressure.
  pub no_spill: bool,
}

impl UsageInfo {
  pub fn references(&self) -> u32 {
    self.uses + self.defs
  }
}

pub trait SpillCostEstimator {
  /// Higher means more expensive to keep in memory.
  fn spill_cost(&self, vreg: VReg, usage: &UsageInfo) -> f64;
}

/// Chaitin's estimate: every reference costs one memory access, scaled by
/// `loop_weight` for each loop level the register lives in.
#[derive(Copy, Clone, Debug)]
pub struct LoopWeightedCost {
  pub loop_weight: f64,
}

impl LoopWeightedCost {
  pub fn new(loop_weight: f64) -> Self {
    LoopWeightedCost { loop_weight }
  }
}

impl Default for LoopWeightedCost {
  fn default() -> Self {
    LoopWeightedCost::new(10.0)
  }
}

impl SpillCostEstimator for LoopWeightedCost {
  fn spill_cost(&self, _vreg: VReg, usage: &UsageInfo) -> f64 {
    if usage.no_spill {
      return f64::INFINITY;
    }
    let weight = self.loop_weight.powi(usage.loop_depth as i32);
    usage.references() as f64 * weight
  }
}
