//! Lexer for the textual program format
// Note this project relies on logos 0.12.1 see docs [here]
// (https://docs.rs/logos/0.12.1/logos/index.html)

use enum_as_inner::EnumAsInner;
use logos::{Lexer, Logos};
use std::fmt;
use strum_macros::AsRefStr;

// Drops the one-letter prefix of `v12` / `s3`
fn from_prefixed<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Result<u32, String> {
  let slice = lex.slice();
  slice[1..]
    .parse()
    .map_err(|e| format!("{} is not a valid index: {:?}", slice, e))
}

fn from_num<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Result<i64, String> {
  let slice = lex.slice();
  slice
    .parse()
    .map_err(|e| format!("Number {} is out of bounds: {:?}", slice, e))
}

impl<'a> fmt::Display for Token<'a> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Token::Ident(s) => write!(f, "{}", s),
      Token::VReg(n) => write!(f, "v{}", n),
      Token::Slot(n) => write!(f, "s{}", n),
      Token::Number(n) => write!(f, "{}", n),
      other => write!(f, "{:?}", other),
    }
  }
}

#[derive(Clone, Logos, Debug, PartialEq, AsRefStr, EnumAsInner)]
#[logos(subpattern identifier = r"[A-Za-z_][A-Za-z0-9_]*")]
pub enum Token<'a> {
  #[regex(r"v[0-9]+", priority = 3, callback = from_prefixed)]
  VReg(u32),
  #[regex(r"s[0-9]+", priority = 3, callback = from_prefixed)]
  Slot(u32),
  #[regex(r"(?&identifier)", priority = 2)]
  Ident(&'a str),
  #[regex(r"-?[0-9]+", from_num)]
  Number(i64),

  #[token("(")]
  LParen,
  #[token(")")]
  RParen,
  #[token("{")]
  LBrace,
  #[token("}")]
  RBrace,
  #[token("[")]
  LBracket,
  #[token("]")]
  RBracket,
  #[token(",")]
  Comma,
  #[token(";")]
  Semicolon,
  #[token("=")]
  Assign,

  // Reserved Keywords
  #[token("fn")]
  Fn,
  #[token("loop")]
  Loop,
  #[token("reload")]
  Reload,
  #[token("spill")]
  Spill,

  #[error]
  #[regex(r"[ \t\n\v\r\f]+", logos::skip)] // Whitespace
  #[regex(r#"(//)[^\n]*"#, logos::skip)] // Single line comment
  Error,
}
