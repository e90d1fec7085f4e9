//! A small straight-line-with-loops program format. It is the collaborator
//! the allocator runs against from the command line: liveness analysis and
//! spill code insertion both work on it.

pub mod liveness;
pub mod spill;

use anyhow::Result;
use serde::Serialize;

use std::{collections::BTreeSet, fmt};

use crate::regalloc::{AllocationProblem, AllocationUnit, VReg};

/// A stack slot holding a spilled register.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SlotId(pub u32);

impl fmt::Display for SlotId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "s{}", self.0)
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
  Reg(VReg),
  Imm(i64),
}

impl fmt::Display for Operand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Operand::Reg(r) => write!(f, "{}", r),
      Operand::Imm(n) => write!(f, "{}", n),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instr {
  /// `dest = op(args)` or just `op(args)`
  Op {
    dest: Option<VReg>,
    op: String,
    args: Vec<Operand>,
  },
  Const {
    dest: VReg,
    value: i64,
  },
  /// Register to register copy, the only instruction coalescing looks at.
  Move {
    dest: VReg,
    src: VReg,
  },
  Spill {
    slot: SlotId,
    src: VReg,
  },
  Reload {
    dest: VReg,
    slot: SlotId,
  },
}

impl Instr {
  pub fn uses(&self) -> Vec<VReg> {
    match self {
      Instr::Op { args, .. } => args
        .iter()
        .filter_map(|arg| match arg {
          Operand::Reg(r) => Some(*r),
          Operand::Imm(_) => None,
        })
        .collect(),
      Instr::Move { src, .. } | Instr::Spill { src, .. } => vec![*src],
      Instr::Const { .. } | Instr::Reload { .. } => vec![],
    }
  }

  pub fn def(&self) -> Option<VReg> {
    match self {
      Instr::Op { dest, .. } => *dest,
      Instr::Const { dest, .. } | Instr::Move { dest, .. } | Instr::Reload { dest, .. } => {
        Some(*dest)
      }
      Instr::Spill { .. } => None,
    }
  }

  /// `(dest, src)` when the instruction is a copy.
  pub fn as_copy(&self) -> Option<(VReg, VReg)> {
    match self {
      Instr::Move { dest, src } => Some((*dest, *src)),
      _ => None,
    }
  }

  /// Rename used registers with `on_use` and the defined one with `on_def`.
  pub fn rewrite(&mut self, mut on_use: impl FnMut(VReg) -> VReg, mut on_def: impl FnMut(VReg) -> VReg) {
    match self {
      Instr::Op { dest, args, .. } => {
        for arg in args.iter_mut() {
          if let Operand::Reg(r) = arg {
            *r = on_use(*r);
          }
        }
        if let Some(d) = dest {
          *d = on_def(*d);
        }
      }
      Instr::Const { dest, .. } | Instr::Reload { dest, .. } => *dest = on_def(*dest),
      Instr::Move { dest, src } => {
        *src = on_use(*src);
        *dest = on_def(*dest);
      }
      Instr::Spill { src, .. } => *src = on_use(*src),
    }
  }
}

impl fmt::Display for Instr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Instr::Op { dest, op, args } => {
        if let Some(dest) = dest {
          write!(f, "{} = ", dest)?;
        }
        let args = args.iter().map(|a| a.to_string()).collect::<Vec<_>>();
        write!(f, "{}({})", op, args.join(", "))
      }
      Instr::Const { dest, value } => write!(f, "{} = {}", dest, value),
      Instr::Move { dest, src } => write!(f, "{} = {}", dest, src),
      Instr::Spill { slot, src } => write!(f, "spill [{}], {}", slot, src),
      Instr::Reload { dest, slot } => write!(f, "{} = reload [{}]", dest, slot),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stmt {
  Instr(Instr),
  /// The body runs at least once and may repeat.
  Loop(Vec<Stmt>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function {
  pub name: String,
  pub params: Vec<VReg>,
  pub body: Vec<Stmt>,
  /// First register number that is free for spill temporaries.
  next_vreg: u32,
  next_slot: u32,
  /// Spill temporaries; spilling one again would not shorten anything.
  unspillable: BTreeSet<VReg>,
}

impl Function {
  pub fn new(name: String, params: Vec<VReg>, body: Vec<Stmt>) -> Self {
    let mut max_vreg = params.iter().map(|v| v.0).max();
    let mut max_slot = None;
    visit_instrs(&body, &mut |instr| {
      for v in instr.uses().into_iter().chain(instr.def()) {
        max_vreg = max_vreg.max(Some(v.0));
      }
      if let Instr::Spill { slot, .. } | Instr::Reload { slot, .. } = instr {
        max_slot = max_slot.max(Some(slot.0));
      }
    });

    Function {
      name,
      params,
      body,
      next_vreg: max_vreg.map_or(0, |v| v + 1),
      next_slot: max_slot.map_or(0, |s| s + 1),
      unspillable: BTreeSet::new(),
    }
  }

  pub fn fresh_temp(&mut self) -> VReg {
    let v = VReg(self.next_vreg);
    self.next_vreg += 1;
    self.unspillable.insert(v);
    v
  }

  pub fn fresh_slot(&mut self) -> SlotId {
    let s = SlotId(self.next_slot);
    self.next_slot += 1;
    s
  }

  pub fn is_spillable(&self, vreg: VReg) -> bool {
    !self.unspillable.contains(&vreg)
  }

  pub fn num_slots(&self) -> u32 {
    self.next_slot
  }
}

fn visit_instrs(body: &[Stmt], f: &mut impl FnMut(&Instr)) {
  for stmt in body {
    match stmt {
      Stmt::Instr(instr) => f(instr),
      Stmt::Loop(inner) => visit_instrs(inner, f),
    }
  }
}

impl AllocationUnit for Function {
  fn name(&self) -> &str {
    &self.name
  }

  fn analyze(&self) -> Result<AllocationProblem> {
    Ok(liveness::Liveness::from_function(self).into_problem(self))
  }

  fn insert_spill_code(&mut self, spilled: &BTreeSet<VReg>) -> Result<()> {
    spill::insert_spill_code(self, spilled)
  }
}

fn fmt_body(f: &mut fmt::Formatter<'_>, body: &[Stmt], indent: usize) -> fmt::Result {
  for stmt in body {
    match stmt {
      Stmt::Instr(instr) => writeln!(f, "{:indent$}{};", "", instr, indent = indent)?,
      Stmt::Loop(inner) => {
        writeln!(f, "{:indent$}loop {{", "", indent = indent)?;
        fmt_body(f, inner, indent + 2)?;
        writeln!(f, "{:indent$}}}", "", indent = indent)?;
      }
    }
  }
  Ok(())
}

impl fmt::Display for Function {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let params = self.params.iter().map(|p| p.to_string()).collect::<Vec<_>>();
    writeln!(f, "fn {}({}) {{", self.name, params.join(", "))?;
    fmt_body(f, &self.body, 2)?;
    write!(f, "}}")
  }
}

/// Every function of one input file, in source order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
  pub functions: Vec<Function>,
}

impl fmt::Display for Program {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, func) in self.functions.iter().enumerate() {
      if i > 0 {
        writeln!(f)?;
      }
      writeln!(f, "{}", func)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> Function {
    let body = vec![
      Stmt::Instr(Instr::Const { dest: VReg(2), value: 1 }),
      Stmt::Loop(vec![Stmt::Instr(Instr::Op {
        dest: Some(VReg(0)),
        op: "add".to_string(),
        args: vec![Operand::Reg(VReg(0)), Operand::Reg(VReg(2))],
      })]),
      Stmt::Instr(Instr::Reload { dest: VReg(5), slot: SlotId(3) }),
      Stmt::Instr(Instr::Op {
        dest: None,
        op: "ret".to_string(),
        args: vec![Operand::Reg(VReg(5))],
      }),
    ];
    Function::new("f".to_string(), vec![VReg(0)], body)
  }

  #[test]
  fn test_fresh_names_start_past_existing_ones() {
    let mut f = sample();
    assert_eq!(f.fresh_temp(), VReg(6));
    assert_eq!(f.fresh_slot(), SlotId(4));
    assert!(!f.is_spillable(VReg(6)));
    assert!(f.is_spillable(VReg(5)));
  }

  #[test]
  fn test_display_round_trips_through_text_format() {
    let expected = "fn f(v0) {\n  v2 = 1;\n  loop {\n    v0 = add(v0, v2);\n  }\n  v5 = reload [s3];\n  ret(v5);\n}";
    assert_eq!(sample().to_string(), expected);
  }

  #[test]
  fn test_rewrite_renames_uses_and_def_separately() {
    let mut instr = Instr::Move { dest: VReg(1), src: VReg(1) };
    instr.rewrite(|_| VReg(7), |_| VReg(8));
    assert_eq!(instr, Instr::Move { dest: VReg(8), src: VReg(7) });
    assert_eq!(instr.as_copy(), Some((VReg(8), VReg(7))));
  }

  #[test]
  fn test_uses_skip_immediates() {
    let instr = Instr::Op {
      dest: None,
      op: "store".to_string(),
      args: vec![Operand::Imm(4), Operand::Reg(VReg(3))],
    };
    assert_eq!(instr.uses(), vec![VReg(3)]);
    assert_eq!(instr.def(), None);
  }
}
