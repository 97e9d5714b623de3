//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.trellis/config.toml`
//! 2. Local config: `.trellis/config.toml` (in the deployment root)
//! 3. Caller overrides
//!
//! Later sources override earlier ones.

use crate::error::{ConfigError, FileOp};
use crate::{
    ConfigOverrides, GraphConfig, LoggingConfig, RelationalConfig, SecurityConfig, TrellisConfig,
};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const CONFIG_FILE_NAME: &str = "config.toml";

const GLOBAL_CONFIG_DIR: &str = ".trellis";

const LOCAL_CONFIG_DIR: &str = ".trellis";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    global_config_dir: Option<PathBuf>,

    global_config: Option<TrellisConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader rooted at `~/.trellis`.
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    pub fn local_config_path(&self, root: &Path) -> PathBuf {
        root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a deployment root with optional overrides.
    ///
    /// Merges config in order: global → local → overrides, then validates
    /// the result.
    pub fn load(
        &mut self,
        root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<TrellisConfig, ConfigError> {
        let mut config = TrellisConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        if let Some(local_config) = self.load_local(root)? {
            config = merge_configs(config, local_config);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load only the global configuration (cached after the first read).
    pub fn load_global(&mut self) -> Result<Option<TrellisConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;
        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    pub fn load_local(&self, root: &Path) -> Result<Option<TrellisConfig>, ConfigError> {
        let local_path = self.local_config_path(root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    pub fn save_local(&self, root: &Path, config: &TrellisConfig) -> Result<(), ConfigError> {
        let local_path = self.local_config_path(root);
        save_config_file(&local_path, config)
    }

    /// Create `.trellis/config.toml` with defaults unless it already exists.
    pub fn init_local(&self, root: &Path) -> Result<PathBuf, ConfigError> {
        let local_dir = root.join(LOCAL_CONFIG_DIR);

        if !local_dir.exists() {
            std::fs::create_dir_all(&local_dir)
                .map_err(|e| ConfigError::io(FileOp::CreateDir, &local_dir, e))?;
        }

        let config_path = local_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            save_config_file(&config_path, &TrellisConfig::default())?;
        }

        Ok(config_path)
    }

    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

fn load_config_file(path: &Path) -> Result<TrellisConfig, ConfigError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::io(FileOp::Read, path, e))?;

    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

fn save_config_file(path: &Path, config: &TrellisConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::io(FileOp::CreateDir, parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::io(FileOp::Write, path, e))
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// A field in `overlay` that still holds its default value keeps the base
/// value, so partial files only change what they mention.
fn merge_configs(base: TrellisConfig, overlay: TrellisConfig) -> TrellisConfig {
    TrellisConfig {
        relational: merge_relational(base.relational, overlay.relational),
        graph: merge_graph(base.graph, overlay.graph),
        security: merge_security(base.security, overlay.security),
        logging: merge_logging(base.logging, overlay.logging),
    }
}

fn merge_relational(base: RelationalConfig, overlay: RelationalConfig) -> RelationalConfig {
    let defaults = RelationalConfig::default();
    RelationalConfig {
        path: if overlay.path != defaults.path {
            overlay.path
        } else {
            base.path
        },
        in_memory: overlay.in_memory || base.in_memory,
    }
}

fn merge_graph(base: GraphConfig, overlay: GraphConfig) -> GraphConfig {
    let defaults = GraphConfig::default();
    GraphConfig {
        backend: if overlay.backend != defaults.backend {
            overlay.backend
        } else {
            base.backend
        },
        endpoint: if overlay.endpoint != defaults.endpoint {
            overlay.endpoint
        } else {
            base.endpoint
        },
        timeout_secs: if overlay.timeout_secs != defaults.timeout_secs {
            overlay.timeout_secs
        } else {
            base.timeout_secs
        },
        // Overlay library files extend the base list
        library_files: {
            let mut files = base.library_files;
            for file in overlay.library_files {
                if !files.contains(&file) {
                    files.push(file);
                }
            }
            files
        },
        library_strategy: if overlay.library_strategy != defaults.library_strategy {
            overlay.library_strategy
        } else {
            base.library_strategy
        },
        transactional: overlay.transactional && base.transactional,
    }
}

fn merge_security(base: SecurityConfig, overlay: SecurityConfig) -> SecurityConfig {
    let defaults = SecurityConfig::default();
    macro_rules! pick {
        ($field:ident) => {
            if overlay.$field != defaults.$field {
                overlay.$field
            } else {
                base.$field
            }
        };
    }
    SecurityConfig {
        password_check_max_failures: pick!(password_check_max_failures),
        password_check_window_mins: pick!(password_check_window_mins),
        session_max_idle_secs: pick!(session_max_idle_secs),
        session_max_age_secs: pick!(session_max_age_secs),
        invitation_code_len: pick!(invitation_code_len),
        session_token_len: pick!(session_token_len),
    }
}

fn merge_logging(base: LoggingConfig, overlay: LoggingConfig) -> LoggingConfig {
    LoggingConfig {
        level: if overlay.level != "info" {
            overlay.level
        } else {
            base.level
        },
        format: overlay.format,
        file: overlay.file.or(base.file),
    }
}
