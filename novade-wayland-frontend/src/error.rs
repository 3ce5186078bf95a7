//! Error types for the Wayland frontend.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failures of shared-memory pools and buffers.
#[derive(Error, Debug)]
pub enum ShmError {
    #[error("Invalid pool size {0}")]
    InvalidSize(i32),

    #[error("Failed to map pool: {0}")]
    Map(#[from] io::Error),

    #[error("Pool cannot shrink from {current} to {requested} bytes")]
    Shrink { current: usize, requested: i32 },

    #[error("Invalid buffer geometry {width}x{height} with stride {stride}")]
    InvalidGeometry { width: i32, height: i32, stride: i32 },

    #[error("Buffer does not fit its pool: needs {needed} bytes, pool has {available}")]
    OutOfBounds { needed: usize, available: usize },
}

#[derive(Error, Debug)]
pub enum FrontendError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create the Wayland display: {0}")]
    Display(String),

    #[error("Failed to bind the Wayland socket: {0}")]
    Socket(String),

    #[error("Event loop error: {0}")]
    EventLoop(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T, E = FrontendError> = std::result::Result<T, E>;
