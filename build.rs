// Build file to produce the program grammar parser from src/grammar.lalrpop

extern crate lalrpop;

fn main() {
  lalrpop::process_root().unwrap();
}
