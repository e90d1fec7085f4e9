//! Top Level Environment

use anyhow::{Context as _, Result};

use std::io;
use std::path::Path;
use std::time;

use regcolor::{allocate_program, args, emit, parse};

// Helper macro to time evaluating an expression (like a function call.)
macro_rules! time {
  ( $x:expr ) => {{
    let t1 = time::Instant::now();
    let result = $x;
    (result, t1.elapsed())
  }};
}

fn run(cfg: &args::Config) -> Result<()> {
  let allocator_cfg = cfg.allocator_config()?;
  let filename = cfg.file.as_deref().context("Expected file input")?;

  let (program, parse_time) = time!(parse::parse_file(Path::new(filename)));
  let mut program = program?;

  let (reports, alloc_time) = time!(allocate_program(&mut program, &allocator_cfg));
  let reports = reports?;

  if cfg.dump_program {
    print!("{}", program);
    println!();
  }

  if cfg.verbose {
    println!("Parse time: {} us", parse_time.as_micros());
    println!(
      "Regalloc ({} registers): {} us",
      allocator_cfg.num_registers(),
      alloc_time.as_micros()
    );
  }

  emit::emit(&mut io::stdout().lock(), cfg.emit, &reports)?;
  Ok(())
}

fn main() {
  // make envlogger stdout
  env_logger::builder()
    .target(env_logger::Target::Stdout)
    .format_timestamp(None)
    .init();

  let code = match args::parse_args().and_then(|cfg| run(&cfg)) {
    Ok(()) => 0,
    Err(e) => {
      eprintln!("{:#}", e);
      1
    }
  };
  std::process::exit(code);
}
