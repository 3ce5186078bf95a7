//! # Novade Wayland Frontend
//!
//! The protocol surface of the Novade display server. Requests for
//! `wl_compositor`, `wl_subcompositor`, `wl_shm`, `wp_viewporter` and
//! `wp_linux_drm_syncobj_manager_v1` are decoded here and handed to the
//! [`novade_surface_commit::SurfaceEngine`]; engine errors are turned back
//! into protocol errors on the offending object.
//!
//! The event loop is calloop. It also supplies the engine's executor, fence
//! monitor and frame heartbeat (see [`backend`]).

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocols;
pub mod server;
pub mod shm;
pub mod state;

pub use config::FrontendConfig;
pub use error::{ConfigError, FrontendError, Result, ShmError};
pub use server::Server;
pub use state::FrontendState;
