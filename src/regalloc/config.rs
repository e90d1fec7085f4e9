//! Allocator knobs, independent of where they are read from.

use anyhow::{bail, Result};
use serde::Deserialize;

use std::collections::BTreeSet;

use super::CoalesceTest;

/// Configuration options for the allocator.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AllocatorConfig {
  /// Number of colors, ignored when `register_names` is given.
  pub registers: usize,
  pub register_names: Option<Vec<String>>,
  pub coalescing: bool,
  pub coalesce_test: CoalesceTest,
  pub max_rounds: usize,
  pub loop_weight: f64,
  /// Check the interference graph after every mutation.
  pub verify: bool,
}

impl Default for AllocatorConfig {
  fn default() -> Self {
    AllocatorConfig {
      registers: 8,
      register_names: None,
      coalescing: true,
      coalesce_test: CoalesceTest::Conservative,
      max_rounds: 16,
      loop_weight: 10.0,
      verify: false,
    }
  }
}

impl AllocatorConfig {
  pub fn from_toml(text: &str) -> Result<Self> {
    Ok(toml::from_str(text)?)
  }

  /// k, the number of colors available.
  pub fn num_registers(&self) -> usize {
    match &self.register_names {
      Some(names) => names.len(),
      None => self.registers,
    }
  }

  pub fn register_name(&self, color: usize) -> String {
    self
      .register_names
      .as_ref()
      .and_then(|names| names.get(color).cloned())
      .unwrap_or_else(|| format!("r{}", color))
  }

  pub fn validate(&self) -> Result<()> {
    if let Some(names) = &self.register_names {
      if names.is_empty() {
        bail!("register_names must not be empty");
      }
      let mut seen = BTreeSet::new();
      for name in names {
        if !seen.insert(name) {
          bail!("register {} is named twice", name);
        }
      }
    }
    if self.num_registers() == 0 {
      bail!("at least one register is needed");
    }
    if self.max_rounds == 0 {
      bail!("max_rounds must be at least 1");
    }
    if !self.loop_weight.is_finite() || self.loop_weight < 1.0 {
      bail!("loop_weight must be a finite number >= 1, got {}", self.loop_weight);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_toml_fills_missing_fields_with_defaults() {
    let config = AllocatorConfig::from_toml("registers = 3\ncoalesce_test = \"briggs\"\n").unwrap();
    assert_eq!(config.num_registers(), 3);
    assert_eq!(config.coalesce_test, CoalesceTest::Briggs);
    assert_eq!(config.max_rounds, 16);
    assert!(config.coalescing);
    assert!(AllocatorConfig::from_toml("colours = 3").is_err());
  }

  #[test]
  fn test_register_names_set_k() {
    let config = AllocatorConfig::from_toml("register_names = [\"eax\", \"ebx\"]").unwrap();
    assert_eq!(config.num_registers(), 2);
    assert_eq!(config.register_name(1), "ebx");
    assert_eq!(AllocatorConfig::default().register_name(5), "r5");
  }

  #[test]
  fn test_validate_rejects_bad_values() {
    let bad = [
      AllocatorConfig { registers: 0, ..AllocatorConfig::default() },
      AllocatorConfig { max_rounds: 0, ..AllocatorConfig::default() },
      AllocatorConfig { loop_weight: f64::NAN, ..AllocatorConfig::default() },
      AllocatorConfig { loop_weight: 0.5, ..AllocatorConfig::default() },
      AllocatorConfig { register_names: Some(vec![]), ..AllocatorConfig::default() },
      AllocatorConfig {
        register_names: Some(vec!["a".to_string(), "a".to_string()]),
        ..AllocatorConfig::default()
      },
    ];
    for config in bad {
      assert!(config.validate().is_err(), "{:?}", config);
    }
    assert!(AllocatorConfig::default().validate().is_ok());
  }
}
