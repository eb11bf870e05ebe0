//! TOML-based configuration for Quarry.
//!
//! Supports a config file (quarry.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [source]
//! driver = "sqlite"
//! path = "${DATA_DIR}/shop.db"
//! dialect = "sqlite"
//!
//! [execution]
//! timeout_ms = 5000
//! native_count = true
//!
//! [metamodel]
//! path = "./schema/shop.toml"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::exec::{ExecOptions, SourceError, SqliteSource};
use crate::model::{Metamodel, MetamodelError};
use crate::sql::Dialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    #[error("Unknown dialect: {0}")]
    UnknownDialect(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to open data source: {0}")]
    Source(#[from] SourceError),

    #[error("Failed to load metamodel: {0}")]
    Metamodel(#[from] MetamodelError),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Data source to run queries against.
    pub source: SourceSettings,

    /// Execution defaults for new sessions.
    pub execution: ExecutionSettings,

    /// Where the metamodel is declared.
    pub metamodel: MetamodelSettings,
}

/// Data source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Database driver. Only `sqlite` is built in.
    pub driver: String,

    /// Database path, or `:memory:` (supports ${ENV_VAR} expansion).
    pub path: String,

    /// Rendering dialect. Defaults to the driver's own.
    pub dialect: Option<String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            path: ":memory:".to_string(),
            dialect: None,
        }
    }
}

impl SourceSettings {
    /// Get the path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.path)
    }

    /// The configured dialect, or SQLite.
    pub fn dialect(&self) -> Result<Dialect, SettingsError> {
        match &self.dialect {
            Some(name) => {
                Dialect::from_str(name).ok_or_else(|| SettingsError::UnknownDialect(name.clone()))
            }
            None => Ok(Dialect::Sqlite),
        }
    }

    /// Open the configured data source.
    pub fn open(&self) -> Result<SqliteSource, SettingsError> {
        match self.driver.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => {}
            _ => return Err(SettingsError::UnsupportedDriver(self.driver.clone())),
        }
        let dialect = self.dialect()?;
        let path = self.resolved_path()?;
        let source = if path == ":memory:" {
            SqliteSource::in_memory()?
        } else {
            SqliteSource::open(&path)?
        };
        tracing::debug!(%path, %dialect, "opened sqlite source");
        Ok(source.with_dialect(dialect))
    }
}

/// Execution defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Per-query deadline in milliseconds. 0 disables it.
    pub timeout_ms: u64,

    /// Use the data source's count query when available.
    pub native_count: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 0,
            native_count: true,
        }
    }
}

impl ExecutionSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

impl From<&ExecutionSettings> for ExecOptions {
    fn from(settings: &ExecutionSettings) -> Self {
        ExecOptions {
            timeout: settings.timeout(),
            native_count: settings.native_count,
            ..ExecOptions::default()
        }
    }
}

/// Metamodel location.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MetamodelSettings {
    /// Path to the TOML schema (supports ${ENV_VAR} expansion).
    pub path: Option<String>,
}

impl MetamodelSettings {
    /// Load the configured metamodel, if a path is set.
    pub fn load(&self) -> Result<Option<Metamodel>, SettingsError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let path = expand_env_vars(path)?;
        Ok(Some(Metamodel::from_file(path)?))
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `QUARRY_CONFIG`
    /// 2. `./quarry.toml`
    /// 3. `~/.config/quarry/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("QUARRY_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("quarry.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("quarry").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.source.path.trim().is_empty() {
            return Err(SettingsError::InvalidConfig(
                "source.path must not be empty".into(),
            ));
        }
        self.source.dialect()?;
        Ok(())
    }

    /// Session options derived from `[execution]`.
    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions::from(&self.execution)
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            // $VAR ends at the first non-alphanumeric, non-underscore char
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                var_name.push(ch);
                chars.next();
            }
            if var_name.is_empty() {
                // lone $
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
