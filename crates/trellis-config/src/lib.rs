//! Trellis Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.trellis/config.toml`
//! - Local config: `.trellis/config.toml` (in the deployment directory)
//! - Caller overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → overrides.

mod error;
mod loader;

pub use error::{ConfigError, FileOp};
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration for Trellis.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TrellisConfig {
    /// Relational store configuration
    pub relational: RelationalConfig,

    /// Graph store configuration
    pub graph: GraphConfig,

    /// Credential, session and invitation policy
    pub security: SecurityConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Relational store (identity, sequences, audit trail) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationalConfig {
    /// SQLite database file (relative paths resolve against the deployment root)
    pub path: PathBuf,

    /// Use a throwaway in-memory database instead of `path`
    pub in_memory: bool,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".trellis/trellis.db"),
            in_memory: false,
        }
    }
}

/// Graph store backend selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    /// In-process graph store (default)
    #[default]
    Embedded,
    /// Remote graph server reached over its REST scripting endpoint
    Rest,
}

impl std::fmt::Display for GraphBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedded => write!(f, "embedded"),
            Self::Rest => write!(f, "rest"),
        }
    }
}

impl std::str::FromStr for GraphBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "embedded" | "memory" => Ok(Self::Embedded),
            "rest" | "http" => Ok(Self::Rest),
            _ => Err(ConfigError::UnknownVariant {
                kind: "graph backend",
                value: s.to_string(),
                expected: "embedded, rest",
            }),
        }
    }
}

/// How the shared helper library reaches the graph store's script engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LibraryStrategy {
    /// Prepend the helper library to every submitted script (default)
    #[default]
    Inline,
    /// Load the library into the session only when a script reports it missing
    Lazy,
}

/// Graph store configuration.
///
/// # Example TOML
///
/// ```toml
/// [graph]
/// backend = "rest"
/// endpoint = "http://localhost:7474/db/data/"
/// library_strategy = "lazy"
/// library_files = ["scripts/extra_helpers.groovy"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Which graph store backend to use
    pub backend: GraphBackend,

    /// Base URL of the graph server (REST backend only)
    pub endpoint: String,

    /// Request timeout in seconds (REST backend only)
    pub timeout_secs: u64,

    /// Additional helper library files appended after the bundled helpers
    pub library_files: Vec<PathBuf>,

    /// Helper library delivery strategy
    pub library_strategy: LibraryStrategy,

    /// Wrap composed scripts in the store's atomic block
    pub transactional: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackend::default(),
            endpoint: "http://localhost:7474/db/data/".to_string(),
            timeout_secs: 30,
            library_files: Vec::new(),
            library_strategy: LibraryStrategy::default(),
            transactional: true,
        }
    }
}

impl GraphConfig {
    /// Validate backend-specific settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == GraphBackend::Rest {
            if self.endpoint.is_empty() {
                return Err(ConfigError::graph(
                    "graph.endpoint",
                    "required when graph.backend is 'rest'",
                ));
            }
            if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
                return Err(ConfigError::graph(
                    "graph.endpoint",
                    format!("'{}' is not an http(s) URL", self.endpoint),
                ));
            }
            if self.timeout_secs == 0 {
                return Err(ConfigError::graph(
                    "graph.timeout_secs",
                    "must be greater than zero",
                ));
            }
        }
        Ok(())
    }
}

/// Credential, session and invitation policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Failed password checks tolerated inside the rolling window
    pub password_check_max_failures: u32,

    /// Rolling window for failed password checks, in minutes
    pub password_check_window_mins: i64,

    /// Session expiry after this much inactivity, in seconds
    pub session_max_idle_secs: i64,

    /// Session expiry regardless of activity, in seconds
    pub session_max_age_secs: i64,

    /// Length of generated invitation codes (never below 20)
    pub invitation_code_len: usize,

    /// Length of the random part of session identifiers
    pub session_token_len: usize,
}

/// Shortest invitation code accepted anywhere.
pub const MIN_INVITATION_CODE_LEN: usize = 20;

/// Longest failed-password window: 30 days.
pub const MAX_PASSWORD_CHECK_WINDOW_MINS: i64 = 30 * 24 * 60;

/// Longest session idle timeout or lifetime: one year.
pub const MAX_SESSION_SECS: i64 = 365 * 24 * 3600;

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            password_check_max_failures: 5,
            password_check_window_mins: 10,
            session_max_idle_secs: 3600,
            session_max_age_secs: 43200,
            invitation_code_len: MIN_INVITATION_CODE_LEN,
            session_token_len: 40,
        }
    }
}

impl SecurityConfig {
    /// Validate policy values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.invitation_code_len < MIN_INVITATION_CODE_LEN {
            return Err(ConfigError::security(
                "security.invitation_code_len",
                format!("must be at least {}", MIN_INVITATION_CODE_LEN),
            ));
        }
        if self.password_check_max_failures == 0 {
            return Err(ConfigError::security(
                "security.password_check_max_failures",
                "must be greater than zero",
            ));
        }
        check_range(
            "security.password_check_window_mins",
            self.password_check_window_mins,
            MAX_PASSWORD_CHECK_WINDOW_MINS,
        )?;
        check_range(
            "security.session_max_idle_secs",
            self.session_max_idle_secs,
            MAX_SESSION_SECS,
        )?;
        check_range(
            "security.session_max_age_secs",
            self.session_max_age_secs,
            MAX_SESSION_SECS,
        )?;
        if self.session_max_idle_secs > self.session_max_age_secs {
            return Err(ConfigError::security(
                "security.session_max_idle_secs",
                "cannot exceed security.session_max_age_secs",
            ));
        }
        Ok(())
    }
}

fn check_range(key: &'static str, value: i64, max: i64) -> Result<(), ConfigError> {
    if value <= 0 {
        return Err(ConfigError::security(key, "must be greater than zero"));
    }
    if value > max {
        return Err(ConfigError::security(key, format!("must not exceed {}", max)));
    }
    Ok(())
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,

    /// Log file path (optional)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

/// Caller overrides for configuration values.
///
/// Applied over file-based config by the embedding application.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override the SQLite database path
    pub relational_path: Option<PathBuf>,

    /// Override the graph backend
    pub graph_backend: Option<GraphBackend>,

    /// Override the graph endpoint
    pub graph_endpoint: Option<String>,

    /// Override the helper library strategy
    pub library_strategy: Option<LibraryStrategy>,

    /// Override log level
    pub log_level: Option<String>,
}

impl TrellisConfig {
    /// Apply overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref path) = overrides.relational_path {
            self.relational.path = path.clone();
        }

        if let Some(backend) = overrides.graph_backend {
            self.graph.backend = backend;
        }

        if let Some(ref endpoint) = overrides.graph_endpoint {
            self.graph.endpoint = endpoint.clone();
        }

        if let Some(strategy) = overrides.library_strategy {
            self.graph.library_strategy = strategy;
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.graph.validate()?;
        self.security.validate()?;
        Ok(())
    }

    /// Resolve the relational database path against a deployment root.
    pub fn relational_path(&self, root: &Path) -> PathBuf {
        if self.relational.path.is_absolute() {
            self.relational.path.clone()
        } else {
            root.join(&self.relational.path)
        }
    }

    /// Resolve the configured helper library files against a deployment root.
    pub fn library_paths(&self, root: &Path) -> Vec<PathBuf> {
        self.graph
            .library_files
            .iter()
            .map(|p| if p.is_absolute() { p.clone() } else { root.join(p) })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrellisConfig::default();
        assert_eq!(
            config.relational.path,
            PathBuf::from(".trellis/trellis.db")
        );
        assert_eq!(config.graph.backend, GraphBackend::Embedded);
        assert_eq!(config.graph.library_strategy, LibraryStrategy::Inline);
        assert!(config.graph.transactional);
        assert_eq!(config.security.password_check_max_failures, 5);
        assert_eq!(config.security.password_check_window_mins, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = TrellisConfig::default();
        let overrides = ConfigOverrides {
            relational_path: Some(PathBuf::from("/var/lib/trellis.db")),
            graph_backend: Some(GraphBackend::Rest),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        config.apply_overrides(&overrides);

        assert_eq!(config.relational.path, PathBuf::from("/var/lib/trellis.db"));
        assert_eq!(config.graph.backend, GraphBackend::Rest);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_relational_path_resolution() {
        let config = TrellisConfig::default();
        let root = PathBuf::from("/srv/trellis");

        assert_eq!(
            config.relational_path(&root),
            PathBuf::from("/srv/trellis/.trellis/trellis.db")
        );
    }

    #[test]
    fn test_relational_path_absolute() {
        let mut config = TrellisConfig::default();
        config.relational.path = PathBuf::from("/data/trellis.db");

        assert_eq!(
            config.relational_path(Path::new("/srv/trellis")),
            PathBuf::from("/data/trellis.db")
        );
    }

    #[test]
    fn test_graph_backend_from_str() {
        assert_eq!(
            "embedded".parse::<GraphBackend>().unwrap(),
            GraphBackend::Embedded
        );
        assert_eq!("REST".parse::<GraphBackend>().unwrap(), GraphBackend::Rest);
        assert!("bolt".parse::<GraphBackend>().is_err());
        assert_eq!(GraphBackend::Rest.to_string(), "rest");
    }

    #[test]
    fn test_rest_backend_requires_http_endpoint() {
        let config = GraphConfig {
            backend: GraphBackend::Rest,
            endpoint: "localhost:7474".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("graph.endpoint"));
    }

    #[test]
    fn test_short_invitation_codes_rejected() {
        let security = SecurityConfig {
            invitation_code_len: 8,
            ..Default::default()
        };
        let err = security.validate().unwrap_err();
        assert!(err.to_string().contains("invitation_code_len"));
    }

    #[test]
    fn test_failure_window_must_be_positive_and_bounded() {
        for window in [0, -10, MAX_PASSWORD_CHECK_WINDOW_MINS + 1, 200_000_000_000_000] {
            let security = SecurityConfig {
                password_check_window_mins: window,
                ..Default::default()
            };
            let err = security.validate().unwrap_err();
            assert!(
                matches!(
                    err,
                    ConfigError::InvalidSecurityPolicy {
                        key: "security.password_check_window_mins",
                        ..
                    }
                ),
                "window {} accepted",
                window
            );
        }

        let security = SecurityConfig {
            password_check_window_mins: MAX_PASSWORD_CHECK_WINDOW_MINS,
            ..Default::default()
        };
        assert!(security.validate().is_ok());
    }

    #[test]
    fn test_session_lifetimes_must_be_positive_and_bounded() {
        let negative_idle = SecurityConfig {
            session_max_idle_secs: -1,
            ..Default::default()
        };
        assert!(negative_idle.validate().is_err());

        let huge_age = SecurityConfig {
            session_max_age_secs: i64::MAX,
            ..Default::default()
        };
        let err = huge_age.validate().unwrap_err();
        assert!(err.to_string().contains("security.session_max_age_secs"));
    }

    #[test]
    fn test_idle_timeout_cannot_exceed_max_age() {
        let security = SecurityConfig {
            session_max_idle_secs: 50_000,
            ..Default::default()
        };
        assert!(security.validate().is_err());
    }

    #[test]
    fn test_graph_config_toml_roundtrip() {
        let config = GraphConfig {
            backend: GraphBackend::Rest,
            endpoint: "https://graph.internal:7473/db/data/".to_string(),
            timeout_secs: 10,
            library_files: vec![PathBuf::from("scripts/extra.groovy")],
            library_strategy: LibraryStrategy::Lazy,
            transactional: true,
        };

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: GraphConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.backend, GraphBackend::Rest);
        assert_eq!(parsed.library_strategy, LibraryStrategy::Lazy);
        assert_eq!(parsed.library_files, vec![PathBuf::from("scripts/extra.groovy")]);
        assert_eq!(parsed.timeout_secs, 10);
    }
}
