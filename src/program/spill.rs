//! Spill code insertion: lower spilled registers to stack slots.

use anyhow::{bail, Result};

use std::collections::{BTreeMap, BTreeSet};

use crate::{
  program::{Function, Instr, SlotId, Stmt},
  regalloc::VReg,
};

/// Rewrite `func` so that none of `spilled` lives in a register across
/// instructions. Each use reloads into a fresh temporary right before the
/// instruction and each definition goes through a fresh temporary that is
/// stored right after it. Spilled parameters are stored on entry.
pub fn insert_spill_code(func: &mut Function, spilled: &BTreeSet<VReg>) -> Result<()> {
  if let Some(temp) = spilled.iter().find(|v| !func.is_spillable(**v)) {
    bail!(
      "{} in {} needs a register but was spilled: more values are live inside one instruction than there are registers",
      temp,
      func.name
    );
  }

  let slots = spilled
    .iter()
    .map(|v| (*v, func.fresh_slot()))
    .collect::<BTreeMap<_, _>>();

  let mut entry = vec![];
  let mut params = std::mem::take(&mut func.params);
  for param in params.iter_mut() {
    if let Some(slot) = slots.get(param) {
      let temp = func.fresh_temp();
      *param = temp;
      entry.push(Stmt::Instr(Instr::Spill { slot: *slot, src: temp }));
    }
  }
  func.params = params;

  let body = std::mem::take(&mut func.body);
  let mut rewritten = rewrite_body(func, body, &slots);
  entry.append(&mut rewritten);
  func.body = entry;

  log::debug!(
    "{}: spilled {} register(s), {} slot(s) in use",
    func.name,
    slots.len(),
    func.num_slots()
  );
  Ok(())
}

fn rewrite_body(func: &mut Function, body: Vec<Stmt>, slots: &BTreeMap<VReg, SlotId>) -> Vec<Stmt> {
  let mut out = vec![];
  for stmt in body {
    match stmt {
      Stmt::Loop(inner) => out.push(Stmt::Loop(rewrite_body(func, inner, slots))),
      Stmt::Instr(mut instr) => {
        // one reload per register, even when it is used twice
        let mut reloads: BTreeMap<VReg, VReg> = BTreeMap::new();
        for v in instr.uses() {
          if let (Some(slot), false) = (slots.get(&v), reloads.contains_key(&v)) {
            let temp = func.fresh_temp();
            reloads.insert(v, temp);
            out.push(Stmt::Instr(Instr::Reload { dest: temp, slot: *slot }));
          }
        }

        let mut store = None;
        let def_temp = match instr.def().and_then(|d| slots.get(&d)) {
          Some(slot) => {
            let temp = func.fresh_temp();
            store = Some(Instr::Spill { slot: *slot, src: temp });
            Some(temp)
          }
          None => None,
        };

        instr.rewrite(
          |u| reloads.get(&u).copied().unwrap_or(u),
          |d| def_temp.unwrap_or(d),
        );
        out.push(Stmt::Instr(instr));
        if let Some(store) = store {
          out.push(Stmt::Instr(store));
        }
      }
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parse::parse_str;

  fn function(src: &str) -> Function {
    parse_str(src).unwrap().functions.remove(0)
  }

  #[test]
  fn test_uses_reload_and_defs_store() {
    let mut f = function(
      "fn f() {
        v0 = 1;
        v1 = add(v0, v0);
        ret(v1);
      }",
    );
    insert_spill_code(&mut f, &BTreeSet::from([VReg(0)])).unwrap();
    let expected = "fn f() {
  v2 = 1;
  spill [s0], v2;
  v3 = reload [s0];
  v1 = add(v3, v3);
  ret(v1);
}";
    assert_eq!(f.to_string(), expected);
    assert!(!f.is_spillable(VReg(2)));
    assert!(!f.is_spillable(VReg(3)));
  }

  #[test]
  fn test_spilled_param_is_stored_on_entry() {
    let mut f = function(
      "fn f(v0, v1) {
        loop {
          v1 = add(v1, v0);
        }
        ret(v1);
      }",
    );
    insert_spill_code(&mut f, &BTreeSet::from([VReg(0)])).unwrap();
    assert_eq!(f.params, vec![VReg(2), VReg(1)]);
    let expected = "fn f(v2, v1) {
  spill [s0], v2;
  loop {
    v3 = reload [s0];
    v1 = add(v1, v3);
  }
  ret(v1);
}";
    assert_eq!(f.to_string(), expected);
  }

  #[test]
  fn test_copy_between_spilled_registers() {
    let mut f = function("fn f(v0) { v1 = v0; ret(v1); }");
    insert_spill_code(&mut f, &BTreeSet::from([VReg(0), VReg(1)])).unwrap();
    let expected = "fn f(v2) {
  spill [s0], v2;
  v3 = reload [s0];
  v4 = v3;
  spill [s1], v4;
  v5 = reload [s1];
  ret(v5);
}";
    assert_eq!(f.to_string(), expected);
  }

  #[test]
  fn test_spilling_a_temporary_is_fatal() {
    let mut f = function("fn f() { v0 = 1; ret(v0); }");
    insert_spill_code(&mut f, &BTreeSet::from([VReg(0)])).unwrap();
    let err = insert_spill_code(&mut f, &BTreeSet::from([VReg(1)])).unwrap_err();
    assert!(err.to_string().contains("v1 in f needs a register"));
  }
}
