//! Report emission

use serde::Serialize;

use std::collections::BTreeMap;
use std::io::prelude::*;

use crate::{
  args::{AllocatorConfig, EmitTarget},
  program::Function,
  regalloc::{Allocation, VReg},
};

/// What the allocator decided for one function.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FunctionReport {
  pub name: String,
  pub rounds: usize,
  /// Virtual register -> physical register name
  pub assignment: BTreeMap<VReg, String>,
  /// Registers that live in stack slots
  pub spilled: Vec<VReg>,
  pub slots: u32,
  /// Coalesced register -> representative
  pub coalesced: BTreeMap<VReg, VReg>,
  pub speculative: usize,
  pub checks: usize,
}

impl FunctionReport {
  pub fn new(func: &Function, allocation: &Allocation, config: &AllocatorConfig) -> Self {
    FunctionReport {
      name: func.name.clone(),
      rounds: allocation.rounds,
      assignment: allocation
        .colors
        .iter()
        .map(|(vreg, color)| (*vreg, config.register_name(*color)))
        .collect(),
      spilled: allocation.lowered.iter().copied().collect(),
      slots: func.num_slots(),
      coalesced: allocation.coalesced.clone(),
      speculative: allocation.speculative,
      checks: allocation.checks,
    }
  }
}

pub fn emit_text(out: &mut impl Write, reports: &[FunctionReport]) -> std::io::Result<()> {
  for report in reports {
    writeln!(
      out,
      "{}: {} round(s), {} register(s) assigned, {} spilled, {} coalesced",
      report.name,
      report.rounds,
      report.assignment.len(),
      report.spilled.len(),
      report.coalesced.len()
    )?;
    for (vreg, register) in &report.assignment {
      match report.coalesced.get(vreg) {
        Some(rep) => writeln!(out, "\t{} -> {} (with {})", vreg, register, rep)?,
        None => writeln!(out, "\t{} -> {}", vreg, register)?,
      }
    }
    if !report.spilled.is_empty() {
      let spilled = report.spilled.iter().map(|v| v.to_string()).collect::<Vec<_>>();
      writeln!(out, "\tspilled: {} ({} slot(s))", spilled.join(", "), report.slots)?;
    }
    if report.checks > 0 {
      writeln!(out, "\tgraph checks passed: {}", report.checks)?;
    }
  }
  Ok(())
}

pub fn emit_json(out: &mut impl Write, reports: &[FunctionReport]) -> std::io::Result<()> {
  serde_json::to_writer_pretty(&mut *out, reports)?;
  writeln!(out)
}

pub fn emit(out: &mut impl Write, target: EmitTarget, reports: &[FunctionReport]) -> std::io::Result<()> {
  match target {
    EmitTarget::Text => emit_text(out, reports),
    EmitTarget::Json => emit_json(out, reports),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeSet;

  fn report() -> FunctionReport {
    let allocation = Allocation {
      colors: BTreeMap::from([(VReg(0), 0), (VReg(1), 1), (VReg(3), 0)]),
      coalesced: BTreeMap::from([(VReg(3), VReg(0))]),
      lowered: BTreeSet::from([VReg(2)]),
      rounds: 2,
      speculative: 1,
      ..Allocation::default()
    };
    let func = Function::new("f".to_string(), vec![], vec![]);
    let config = AllocatorConfig {
      register_names: Some(vec!["eax".to_string(), "ebx".to_string()]),
      ..AllocatorConfig::default()
    };
    FunctionReport::new(&func, &allocation, &config)
  }

  #[test]
  fn test_text_report() {
    let mut out = vec![];
    emit_text(&mut out, &[report()]).unwrap();
    let text = String::from_utf8(out).unwrap();
    let expected = "f: 2 round(s), 3 register(s) assigned, 1 spilled, 1 coalesced
\tv0 -> eax
\tv1 -> ebx
\tv3 -> eax (with v0)
\tspilled: v2 (0 slot(s))
";
    assert_eq!(text, expected);
  }

  #[test]
  fn test_json_report_uses_register_names_as_keys() {
    let mut out = vec![];
    emit_json(&mut out, &[report()]).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json[0]["name"], "f");
    assert_eq!(json[0]["assignment"]["v1"], "ebx");
    assert_eq!(json[0]["coalesced"]["v3"], "v0");
    assert_eq!(json[0]["spilled"][0], "v2");
  }
}
