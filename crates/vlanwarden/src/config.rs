//! Runtime configuration.
//!
//! Values come from flags, `VW_`-prefixed environment variables, or an
//! optional YAML config file, in that order of precedence. The config
//! file carries the same keys as the flags in snake_case.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 1812;
pub const DEFAULT_DATABASE_FILE: &str = "registry.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// How much the access paths log.
///
/// `Info` logs the request identity, `AccessLog` adds per-packet protocol
/// detail, `Debug` adds decision-branch logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet,
    Info,
    AccessLog,
    Debug,
}

impl Verbosity {
    /// Map `-q` and counted `-v` flags onto a level.
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            Verbosity::Quiet
        } else {
            match verbose {
                0 => Verbosity::Info,
                1 => Verbosity::AccessLog,
                _ => Verbosity::Debug,
            }
        }
    }

    /// Default tracing filter directive for this level.
    pub fn env_filter(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Info | Verbosity::AccessLog => "info",
            Verbosity::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub radius_secret: String,
    pub telegram_token: String,
    /// Chats allowed to talk to the bot; everything else is dropped.
    pub telegram_chat_ids: Vec<i64>,
    pub database_file: PathBuf,
    pub verbosity: Verbosity,
}

impl Config {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The registry store only takes absolute paths; resolve relative
    /// ones against the working directory first.
    pub fn absolute_database_file(&self) -> Result<PathBuf, ConfigError> {
        if self.database_file.is_absolute() {
            Ok(self.database_file.clone())
        } else {
            Ok(std::env::current_dir()?.join(&self.database_file))
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host is empty".to_string()));
        }
        if self.radius_secret.is_empty() {
            return Err(ConfigError::Invalid("RADIUS secret is empty".to_string()));
        }
        if self.database_file.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database file path is empty".to_string()));
        }
        if self.telegram_token.is_empty() {
            return Err(ConfigError::Invalid("Telegram bot token is empty".to_string()));
        }
        if self.telegram_chat_ids.is_empty() {
            return Err(ConfigError::Invalid(
                "no Telegram chat ids configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// Optional config-file counterpart of the CLI flags.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub radius_secret: Option<String>,
    pub telegram_token: Option<String>,
    pub telegram_chat_ids: Option<Vec<i64>>,
    pub database_file: Option<PathBuf>,
    pub verbose: Option<u8>,
    pub quiet: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }
}
