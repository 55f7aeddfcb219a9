//! Configuration schema (bqrun.toml)

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default merge sentinel separating hand-written rules from generated ones
pub const DEFAULT_SENTINEL: &str = "# ---- bqrun generated rules (do not edit below) ----";

/// How dependency facts are extracted from the SQL scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractorKind {
    /// In-process tokenizer
    Builtin,

    /// `alphadag` binary on PATH
    Alphadag,

    /// `alphadag` inside its docker image
    AlphadagDocker,
}

impl Default for ExtractorKind {
    fn default() -> Self {
        Self::Builtin
    }
}

impl std::str::FromStr for ExtractorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "builtin" => Ok(Self::Builtin),
            "alphadag" => Ok(Self::Alphadag),
            "alphadag-docker" => Ok(Self::AlphadagDocker),
            other => Err(ConfigError::ParseError(format!(
                "unknown extractor '{}' (expected builtin, alphadag or alphadag-docker)",
                other
            ))),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Command receiving each script on stdin
    pub query_command: String,

    /// Root directory of all completion markers
    pub marker_dir: String,

    /// Generated makefile, relative to the project directory
    pub makefile: String,

    /// Line separating hand-written content from generated rules
    pub sentinel: String,

    /// Default number of parallel jobs
    pub parallel: usize,

    /// Build executor program
    pub make_command: String,

    /// Fact extractor
    pub extractor: ExtractorKind,

    /// Docker image used by the `alphadag-docker` extractor
    pub alphadag_image: String,

    /// Reject cyclic dependencies before handing off to the executor
    pub check_cycles: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            query_command: "bq query".to_string(),
            marker_dir: ".bqrun".to_string(),
            makefile: "Makefile".to_string(),
            sentinel: DEFAULT_SENTINEL.to_string(),
            parallel: 8,
            make_command: "make".to_string(),
            extractor: ExtractorKind::default(),
            alphadag_image: "matts966/alphasql:latest".to_string(),
            check_cycles: false,
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
