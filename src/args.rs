//! Parse command line arguments and the allocator configuration file
//! We expect this to be good enough for a single-purpose tool.
//! You could also use something like clap at the expense of bad compile times.

use anyhow::{bail, Context as _, Result};

use std::{
  env, fs,
  path::{Path, PathBuf},
};

use crate::regalloc::CoalesceTest;
pub use crate::regalloc::AllocatorConfig;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmitTarget {
  Text,
  Json,
}

fn get_default_config_file_path() -> PathBuf {
  let source_dir = env!("CARGO_MANIFEST_DIR");
  Path::new(source_dir).join("regalloc.toml")
}

/// Configuration options for this run.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
  pub verbose: bool,
  pub dump_program: bool,

  pub emit: EmitTarget,
  pub config_file: Option<PathBuf>,
  pub file: Option<String>,

  // Overrides applied on top of the configuration file
  pub registers: Option<usize>,
  pub no_coalesce: bool,
  pub coalesce_test: Option<CoalesceTest>,
  pub check: bool,
}

/// Read `path` if given, otherwise the default configuration file when it
/// exists, otherwise fall back to the built-in defaults.
pub fn load_allocator_config(path: Option<&Path>) -> Result<AllocatorConfig> {
  let path = match path {
    Some(path) => path.to_path_buf(),
    None => {
      let default_path = get_default_config_file_path();
      if !default_path.exists() {
        return Ok(AllocatorConfig::default());
      }
      default_path
    }
  };

  let text = fs::read_to_string(&path)
    .with_context(|| format!("Couldn't read configuration {}", path.display()))?;
  AllocatorConfig::from_toml(&text).with_context(|| format!("Invalid configuration {}", path.display()))
}

impl Config {
  /// Set your defaults here!
  fn default() -> Self {
    Config {
      verbose: false,      // Print timing of each phase
      dump_program: false, // Print the program after spill code insertion

      emit: EmitTarget::Text, // Report format
      config_file: None,      // Allocator configuration, regalloc.toml by default
      file: None,             // Program to allocate

      registers: None,
      no_coalesce: false,
      coalesce_test: None,
      check: false,
    }
  }

  /// Load the allocator configuration and apply the command line overrides.
  pub fn allocator_config(&self) -> Result<AllocatorConfig> {
    let mut config = load_allocator_config(self.config_file.as_deref())?;
    if let Some(k) = self.registers {
      if let Some(names) = &config.register_names {
        if names.len() != k {
          bail!("-k {} contradicts the {} configured register names", k, names.len());
        }
      }
      config.registers = k;
    }
    if self.no_coalesce {
      config.coalescing = false;
    }
    if let Some(test) = self.coalesce_test {
      config.coalesce_test = test;
    }
    if self.check {
      config.verify = true;
    }
    config.validate()?;
    Ok(config)
  }
}

fn next_value<'a>(args: &'a [String], index: &mut usize, flag: &str) -> Result<&'a str> {
  *index += 1;
  match args.get(*index) {
    Some(value) => Ok(value.as_str()),
    None => bail!("Expected a value after {}", flag),
  }
}

fn parse_emit(value: &str) -> Result<EmitTarget> {
  match value {
    "text" => Ok(EmitTarget::Text),
    "json" => Ok(EmitTarget::Json),
    other => bail!("Unknown emit type : {}", other),
  }
}

/// Parses command line input into a configuration.
pub fn parse_args() -> Result<Config> {
  let args: Vec<String> = env::args().skip(1).collect();
  parse_args_from(&args)
}

pub fn parse_args_from(args: &[String]) -> Result<Config> {
  let mut config = Config::default();
  let mut index = 0;
  while index < args.len() {
    match args[index].as_str() {
      "-v" | "--verbose" => config.verbose = true,
      "--dump-program" => config.dump_program = true,
      "--no-coalesce" => config.no_coalesce = true,
      "--check" => config.check = true,
      "-e" | "--emit" => config.emit = parse_emit(next_value(args, &mut index, "--emit")?)?,
      // Account for funky spacing
      "-etext" => config.emit = EmitTarget::Text,
      "-ejson" => config.emit = EmitTarget::Json,
      "-k" => {
        let value = next_value(args, &mut index, "-k")?;
        let k = value
          .parse::<usize>()
          .with_context(|| format!("-k expects a register count, got {}", value))?;
        config.registers = Some(k);
      }
      "--config" => config.config_file = Some(PathBuf::from(next_value(args, &mut index, "--config")?)),
      "--coalesce-test" => {
        let value = next_value(args, &mut index, "--coalesce-test")?;
        config.coalesce_test = Some(value.parse::<CoalesceTest>().map_err(anyhow::Error::msg)?);
      }
      flag if flag.starts_with('-') => bail!("Unknown option {}", flag),
      file => {
        if let Some(previous) = &config.file {
          bail!("Expected one input file, got {} and {}", previous, file);
        }
        config.file = Some(file.to_string());
      }
    };
    index += 1;
  }

  if config.file.is_none() {
    bail!("Expected file input");
  }

  Ok(config)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn args(line: &str) -> Vec<String> {
    line.split_whitespace().map(String::from).collect()
  }

  #[test]
  fn test_parse_all_flags() {
    let config =
      parse_args_from(&args("-v -k 4 --no-coalesce --coalesce-test briggs --check -e json --dump-program f.vr"))
        .unwrap();
    assert!(config.verbose);
    assert!(config.dump_program);
    assert!(config.no_coalesce);
    assert!(config.check);
    assert_eq!(config.registers, Some(4));
    assert_eq!(config.coalesce_test, Some(CoalesceTest::Briggs));
    assert_eq!(config.emit, EmitTarget::Json);
    assert_eq!(config.file.as_deref(), Some("f.vr"));
  }

  #[test]
  fn test_bad_arguments_are_errors() {
    assert!(parse_args_from(&args("-k")).is_err());
    assert!(parse_args_from(&args("-k many f.vr")).is_err());
    assert!(parse_args_from(&args("--emit x86 f.vr")).is_err());
    assert!(parse_args_from(&args("--coalesce-test george f.vr")).is_err());
    assert!(parse_args_from(&args("--frobnicate f.vr")).is_err());
    assert!(parse_args_from(&args("-v")).is_err());
    assert!(parse_args_from(&args("a.vr b.vr")).is_err());
  }

  #[test]
  fn test_command_line_overrides_file() {
    let cli = Config {
      config_file: Some(get_default_config_file_path()),
      registers: Some(2),
      no_coalesce: true,
      check: true,
      ..Config::default()
    };
    let config = cli.allocator_config().unwrap();
    assert_eq!(config.num_registers(), 2);
    assert!(!config.coalescing);
    assert!(config.verify);
  }

  #[test]
  fn test_missing_config_file_is_an_error() {
    let cli = Config {
      config_file: Some(PathBuf::from("/nonexistent/regalloc.toml")),
      ..Config::default()
    };
    assert!(cli.allocator_config().is_err());
  }
}
