//! Settings type definitions.
//!
//! Every type is camelCase on the wire and `#[serde(default)]`, so a partial
//! JSON file only needs the keys it changes.

mod memory;

pub use memory::*;

use loom_core::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "logging": { "level": "debug" },
///   "memory": { "hybrid": { "workingMemorySize": 20 } }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoomSettings {
    /// Settings schema version.
    pub version: String,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Memory subsystem configuration.
    pub memory: MemorySettings,
}

impl Default for LoomSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_owned(),
            logging: LoggingSettings::default(),
            memory: MemorySettings::default(),
        }
    }
}

impl LoomSettings {
    /// Reject values that would make the memory layer misbehave.
    pub fn validate(&self) -> Result<()> {
        self.memory.validate()
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Stderr output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_owned(),
            format: LogFormat::Compact,
        }
    }
}

pub(crate) fn check_unit_interval(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::InvalidValue(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

pub(crate) fn check_non_zero(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        Err(SettingsError::InvalidValue(format!(
            "{name} must be greater than zero"
        )))
    } else {
        Ok(())
    }
}
