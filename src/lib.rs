//! Graph-coloring register allocation with conservative coalescing and
//! spill-and-retry, plus the small program format the command line tool
//! runs it on.

pub mod args;
pub mod emit;
pub mod lex;
pub mod parse;
pub mod program;
pub mod regalloc;
pub mod utils;

use anyhow::Result;

use crate::{
  emit::FunctionReport,
  program::Program,
  regalloc::{AllocatorConfig, Allocator, LoopWeightedCost},
};

/// Allocate every function of `program` in place, leaving spill code behind
/// where it was needed.
pub fn allocate_program(program: &mut Program, config: &AllocatorConfig) -> Result<Vec<FunctionReport>> {
  let estimator = LoopWeightedCost::new(config.loop_weight);
  let allocator = Allocator::new(config, &estimator);
  let mut reports = vec![];
  for func in program.functions.iter_mut() {
    let allocation = allocator.allocate_until_fixpoint(func)?;
    reports.push(FunctionReport::new(func, &allocation, config));
  }
  Ok(reports)
}
