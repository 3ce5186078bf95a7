//! `novade-compositor`: a headless Wayland compositor serving the surface
//! commit engine.

use anyhow::Context;
use novade_wayland_frontend::logging::init_logging;
use novade_wayland_frontend::{FrontendConfig, Server};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let config = FrontendConfig::load().context("failed to load configuration")?;
    init_logging(&config.log_filter);
    info!(version = env!("CARGO_PKG_VERSION"), "novade-compositor starting");

    let server = Server::new(&config).context("failed to start the compositor")?;
    info!(socket = server.socket_name(), "set WAYLAND_DISPLAY to connect");
    server.run().context("compositor stopped")?;
    Ok(())
}
