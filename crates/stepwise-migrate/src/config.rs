//! Adapter configuration, loadable from YAML.
//!
//! ```yaml
//! dialect: mysql
//! table: app_schema_versions
//! create_table_options: " ENGINE=InnoDB"
//! ```

use crate::adapter::LogFn;
use crate::error::{MigrateError, MigrateResult};
use crate::table::{Dialect, TableAdapter, DEFAULT_TABLE};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for building a [`TableAdapter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterConfig {
    /// Preset supplying placeholders and default table options
    pub dialect: Dialect,

    /// Version table name
    #[serde(default = "default_table")]
    pub table: String,

    /// Overrides the dialect's `CREATE TABLE` suffix when set
    #[serde(default)]
    pub create_table_options: Option<String>,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

impl AdapterConfig {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            table: default_table(),
            create_table_options: None,
        }
    }

    /// Parse a config from YAML text.
    pub fn from_yaml_str(yaml: &str) -> MigrateResult<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| MigrateError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML config file.
    pub fn load(path: &Path) -> MigrateResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| MigrateError::Config {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_yaml_str(&text)
    }

    /// The table name is spliced into SQL, so only plain identifiers are
    /// accepted (optionally schema-qualified).
    pub fn validate(&self) -> MigrateResult<()> {
        let valid = !self.table.is_empty()
            && self.table.split('.').all(|part| {
                !part.is_empty()
                    && !part.starts_with(|c: char| c.is_ascii_digit())
                    && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            });
        if valid {
            Ok(())
        } else {
            Err(MigrateError::Config {
                message: format!("invalid table name '{}'", self.table),
            })
        }
    }
}

impl TableAdapter {
    /// Build an adapter from validated config.
    pub fn from_config(config: &AdapterConfig, log_fn: Option<LogFn>) -> MigrateResult<Self> {
        config.validate()?;
        let mut adapter = TableAdapter::new(config.dialect, log_fn).with_table(&config.table);
        if let Some(options) = &config.create_table_options {
            adapter.create_table_options = options.clone();
        }
        Ok(adapter)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
