//! Configuration errors
//!
//! A failed reload never replaces the active rule set; the caller gets one of
//! these back and the previous configuration stays in force.

use std::path::PathBuf;

/// Error returned when a configuration cannot be adopted
#[derive(Debug)]
pub enum ConfigError {
    /// Rules file could not be read
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Rule config is not valid JSON or does not fit the schema
    Parse(serde_json::Error),
    /// Flush settings are not valid TOML or do not fit the schema
    Settings(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read rules file '{}': {}", path.display(), source)
            }
            ConfigError::Parse(e) => write!(f, "Invalid rule config: {}", e),
            ConfigError::Settings(e) => write!(f, "Invalid flush settings: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Settings(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Settings(e)
    }
}
