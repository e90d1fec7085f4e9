// The module builds the interference graph of one function and colors it with k registers,
// coalescing copies and selecting spills on the way
mod allocation;
mod check;
mod coalesce;
mod color;
mod config;
mod error;
mod interference;
mod simplify;
mod spill_cost;


pub use allocation::{Allocation, AllocationProblem, AllocationUnit, Allocator};
pub use check::{Problem, ValidityReport};
pub use coalesce::{CoalesceTest, Coalescer};
pub use color::{ColorOutcome, Colorer};
pub use config::AllocatorConfig;
pub use error::{GraphResult, InvariantViolation};
pub use interference::{InterferenceGraph, Node, NodeId, NodeState, VReg};
pub use simplify::{EliminationOrder, Simplifier, SimplifyStep};
pub use spill_cost::{LoopWeightedCost, SpillCostEstimator, UsageInfo};
