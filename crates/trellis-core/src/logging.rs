//! Subscriber setup for applications embedding the library.

use std::fs::OpenOptions;
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;
use trellis_config::{LogFormat, LoggingConfig};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{level}': {message}")]
    InvalidLevel { level: String, message: String },

    #[error("failed to open log file: {0}")]
    File(#[from] std::io::Error),
}

/// Build the event filter: `RUST_LOG` wins over the configured level.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| LoggingError::InvalidLevel {
        level: config.level.clone(),
        message: e.to_string(),
    })
}

/// Install a global fmt subscriber.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(config: &LoggingConfig) -> Result<bool, LoggingError> {
    let filter = env_filter(config)?;

    let (writer, ansi) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);

    let installed = match config.format {
        LogFormat::Text => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    };
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_reported() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            level: "trellis=notalevel".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            env_filter(&config),
            Err(LoggingError::InvalidLevel { .. })
        ));
    }

    #[test]
    fn test_directive_level_parses() {
        let config = LoggingConfig {
            level: "trellis_core=debug,info".to_string(),
            ..Default::default()
        };
        assert!(env_filter(&config).is_ok());
    }
}
