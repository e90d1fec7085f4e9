//! Parser
// We rely on [lalrpop](https://github.com/lalrpop/lalrpop) for parsing.
// Lalrpop generates a LR(1) parser, the grammar can be found in grammar.lalrpop

use anyhow::{anyhow, bail, Context as _, Result};
use lalrpop_util::{lalrpop_mod, ParseError};
use logos::{Logos, Span};

use std::{collections::BTreeSet, fs, path::Path};

use crate::{
  lex::Token,
  program::{Function, Program},
};

lalrpop_mod!(
  #[allow(clippy::all, unused_imports, unused_parens)]
  grammar
);

/// 1-based line of a byte offset
fn line_of(input: &str, offset: usize) -> usize {
  input[..offset.min(input.len())].matches('\n').count() + 1
}

fn describe(input: &str, err: ParseError<usize, Token<'_>, String>) -> anyhow::Error {
  match err {
    ParseError::InvalidToken { location } => anyhow!("line {}: invalid token", line_of(input, location)),
    ParseError::UnrecognizedEof { location, expected } => anyhow!(
      "line {}: unexpected end of input, expected one of {}",
      line_of(input, location),
      expected.join(", ")
    ),
    ParseError::UnrecognizedToken {
      token: (start, token, _),
      expected,
    } => anyhow!(
      "line {}: unexpected `{}`, expected one of {}",
      line_of(input, start),
      token,
      expected.join(", ")
    ),
    ParseError::ExtraToken {
      token: (start, token, _),
    } => anyhow!("line {}: extra token `{}`", line_of(input, start), token),
    ParseError::User { error } => anyhow!(error),
  }
}

pub fn parse_str(input: &str) -> Result<Program> {
  let lex_stream = Token::lexer(input)
    .spanned()
    .map(|(t, y): (Token, Span)| match t {
      Token::Error => Err(format!(
        "line {}: unrecognized input `{}`",
        line_of(input, y.start),
        &input[y.clone()]
      )),
      t => Ok((y.start, t, y.end)),
    });

  let functions: Vec<Function> = grammar::FunctionsParser::new()
    .parse(lex_stream)
    .map_err(|e| describe(input, e))
    .context("Couldn't parse program")?;

  let mut names = BTreeSet::new();
  for func in &functions {
    if !names.insert(func.name.as_str()) {
      bail!("function {} is defined twice", func.name);
    }
  }
  Ok(Program { functions })
}

pub fn parse_file(path: &Path) -> Result<Program> {
  let input = fs::read_to_string(path).with_context(|| format!("Couldn't read {}", path.display()))?;
  parse_str(&input).with_context(|| format!("in {}", path.display()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::program::{Instr, Operand, SlotId, Stmt};
  use crate::regalloc::VReg;

  #[test]
  fn test_parse_every_statement_form() {
    let program = parse_str(
      "// two functions
      fn first(v0, v1) {
        v2 = add(v0, v1, 4);
        v3 = -7;
        v4 = v2;
        spill [s0], v4;
        v5 = reload [s0];
        loop { call(); }
        ret(v5);
      }
      fn second() {}",
    )
    .unwrap();

    assert_eq!(program.functions.len(), 2);
    let f = &program.functions[0];
    assert_eq!(f.name, "first");
    assert_eq!(f.params, vec![VReg(0), VReg(1)]);
    assert_eq!(
      f.body[0],
      Stmt::Instr(Instr::Op {
        dest: Some(VReg(2)),
        op: "add".to_string(),
        args: vec![Operand::Reg(VReg(0)), Operand::Reg(VReg(1)), Operand::Imm(4)],
      })
    );
    assert_eq!(f.body[1], Stmt::Instr(Instr::Const { dest: VReg(3), value: -7 }));
    assert_eq!(f.body[2], Stmt::Instr(Instr::Move { dest: VReg(4), src: VReg(2) }));
    assert_eq!(f.body[3], Stmt::Instr(Instr::Spill { slot: SlotId(0), src: VReg(4) }));
    assert_eq!(f.body[4], Stmt::Instr(Instr::Reload { dest: VReg(5), slot: SlotId(0) }));
    assert!(matches!(&f.body[5], Stmt::Loop(inner) if inner.len() == 1));
    assert!(program.functions[1].body.is_empty());
  }

  #[test]
  fn test_printed_program_parses_back() {
    let src = "fn f(v0) {\n  loop {\n    v1 = mul(v0, 2);\n  }\n  ret(v1);\n}\n";
    let program = parse_str(src).unwrap();
    assert_eq!(program.to_string(), src);
    assert_eq!(parse_str(&program.to_string()).unwrap(), program);
  }

  #[test]
  fn test_errors_carry_line_numbers() {
    let err = parse_str("fn f() {\n  v0 = 1;\n  v1 = ;\n}").unwrap_err();
    assert!(format!("{:#}", err).contains("line 3"), "{:#}", err);

    let err = parse_str("fn f() {\n  v0 = #;\n}").unwrap_err();
    assert!(format!("{:#}", err).contains("line 2"), "{:#}", err);

    let err = parse_str("fn f() {").unwrap_err();
    assert!(format!("{:#}", err).contains("end of input"), "{:#}", err);
  }

  #[test]
  fn test_duplicate_function_names() {
    let err = parse_str("fn f() {} fn f() {}").unwrap_err();
    assert!(err.to_string().contains("defined twice"));
  }
}
