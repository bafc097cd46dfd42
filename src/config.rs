//! Configuration loader and validator for the insight CMS.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub import: Import,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// SQLite URL override; when empty the database lives in `data_dir`.
    #[serde(default)]
    pub database_url: String,
}

/// Dataset import settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Import {
    pub default_csv: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// The SQLite URL to connect to: the explicit override when set,
    /// otherwise a `fitness.db` file inside `data_dir`.
    pub fn resolved_database_url(&self) -> String {
        if !self.app.database_url.trim().is_empty() {
            return self.app.database_url.clone();
        }
        format!("sqlite://{}/fitness.db", self.app.data_dir.trim_end_matches('/'))
    }
}

impl Default for Config {
    fn default() -> Self {
        serde_yaml::from_str(example()).expect("built-in example config must parse")
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Like [`load`], but falls back to the built-in defaults when the file does
/// not exist. A present-but-broken file is still an error.
pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
    if path.exists() {
        load(Some(path))
    } else {
        Ok(Config::default())
    }
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.import.default_csv.trim().is_empty() {
        return Err(ConfigError::Invalid("import.default_csv must be non-empty"));
    }
    Ok(())
}

/// Example YAML configuration, also used as the default.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  # Optional override; defaults to sqlite://<data_dir>/fitness.db
  database_url: ""

import:
  default_csv: "Final_data.csv"
"#
}
