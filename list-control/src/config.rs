use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    errors::ControlError,
    filters::phrase::DEFAULT_DELIMITER,
    search::{DEFAULT_TERMINATE_AFTER, DEFAULT_TIMEOUT, parse_duration_millis},
};

/// Defaults applied when building and refreshing list controls.
///
/// Read from the optional `[list_control]` table of a TOML file:
///
/// ```toml
/// [list_control]
/// default_size = 10
/// timeout = "500ms"
/// terminate_after = 50000
/// delimiter = ", "
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListControlConfig {
    /// Bucket count requested when a control does not set its own size.
    #[serde(default = "default_size")]
    pub default_size: i64,
    #[serde(default = "default_timeout")]
    pub timeout: String,
    #[serde(default = "default_terminate_after")]
    pub terminate_after: u64,
    /// Separator used when rendering multi-select values.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl Default for ListControlConfig {
    fn default() -> Self {
        Self {
            default_size: default_size(),
            timeout: default_timeout(),
            terminate_after: default_terminate_after(),
            delimiter: default_delimiter(),
        }
    }
}

fn default_size() -> i64 {
    5
}

fn default_timeout() -> String {
    DEFAULT_TIMEOUT.to_string()
}

fn default_terminate_after() -> u64 {
    DEFAULT_TERMINATE_AFTER
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    list_control: ListControlConfig,
}

impl ListControlConfig {
    /// Parse a TOML document, falling back to defaults for anything missing.
    pub fn from_toml_str(content: &str) -> Result<Self, ControlError> {
        let file: ConfigFile = toml::from_str(content).map_err(|err| ControlError::Config {
            message: format!("Failed to parse list control config: {err}"),
        })?;
        file.list_control.validate()?;
        Ok(file.list_control)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ControlError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| ControlError::Config {
            message: format!("Failed to read {}: {err}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), ControlError> {
        parse_duration_millis(&self.timeout).map_err(|err| ControlError::Config {
            message: err.to_string(),
        })?;
        Ok(())
    }
}
