//! Configuration error types.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// File operation that failed while reading or writing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Read,
    Write,
    CreateDir,
}

impl fmt::Display for FileOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read config file"),
            Self::Write => write!(f, "write config file"),
            Self::CreateDir => write!(f, "create config directory"),
        }
    }
}

/// Errors raised while loading, saving or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to {op} '{path}': {source}")]
    Io {
        op: FileOp,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A `[graph]` setting the selected backend cannot work with.
    #[error("invalid graph setting '{key}': {message}")]
    InvalidGraphSetting { key: &'static str, message: String },

    /// A `[security]` value outside the range the credential and session
    /// workflows accept.
    #[error("invalid security policy '{key}': {message}")]
    InvalidSecurityPolicy { key: &'static str, message: String },

    #[error("unknown {kind} '{value}' (expected one of: {expected})")]
    UnknownVariant {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl ConfigError {
    pub fn io(op: FileOp, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn parse_toml(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::ParseToml {
            path: path.into(),
            source,
        }
    }

    pub fn graph(key: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidGraphSetting {
            key,
            message: message.into(),
        }
    }

    pub fn security(key: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidSecurityPolicy {
            key,
            message: message.into(),
        }
    }
}
