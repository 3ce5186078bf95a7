//! Frontend configuration.
//!
//! Read from the TOML file named by `NOVADE_COMPOSITOR_CONFIG`, or from
//! `<config dir>/novade/compositor.toml`. Every field has a default, and a
//! missing default file yields the default configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "NOVADE_COMPOSITOR_CONFIG";

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_quantum_ms() -> u64 {
    16
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendConfig {
    /// Socket name under `XDG_RUNTIME_DIR`; picked automatically when unset.
    #[serde(default)]
    pub socket_name: Option<String>,
    /// `tracing` filter directives. `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub frame_callbacks: FrameCallbackConfig,
    #[serde(default)]
    pub protocols: ProtocolConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameCallbackConfig {
    /// Heartbeat period for frame callbacks committed without a buffer.
    #[serde(default = "default_quantum_ms")]
    pub quantum_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_true")]
    pub viewporter: bool,
    /// Only takes effect when a timeline importer is available.
    #[serde(default = "default_true")]
    pub explicit_sync: bool,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            socket_name: None,
            log_filter: default_log_filter(),
            frame_callbacks: FrameCallbackConfig::default(),
            protocols: ProtocolConfig::default(),
        }
    }
}

impl Default for FrameCallbackConfig {
    fn default() -> Self {
        Self {
            quantum_ms: default_quantum_ms(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            viewporter: true,
            explicit_sync: true,
        }
    }
}

impl FrontendConfig {
    /// Loads the configuration for this process.
    ///
    /// A file named by [`CONFIG_ENV_VAR`] must exist; the default location
    /// may be absent.
    pub fn load() -> Result<Self, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::load_from_path(Path::new(&path));
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: FrontendConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_callbacks.quantum_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "frame_callbacks.quantum_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(name) = &self.socket_name {
            if name.is_empty() || name.contains('/') {
                return Err(ConfigError::Invalid {
                    field: "socket_name",
                    reason: format!("'{name}' is not a plain socket name"),
                });
            }
        }
        Ok(())
    }

    pub fn frame_quantum(&self) -> Duration {
        Duration::from_millis(self.frame_callbacks.quantum_ms)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("novade").join("compositor.toml"))
}
