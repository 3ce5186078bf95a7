//! Display set-up and the main loop.

use std::sync::Arc;

use calloop::generic::Generic;
use calloop::{EventLoop, Interest, LoopHandle, Mode, PostAction};
use novade_surface_commit::{EngineCollaborators, EngineConfig, SurfaceEngine};
use tracing::{error, info, warn};
use wayland_server::{Display, ListeningSocket};

use crate::backend::{CalloopFenceMonitor, HeadlessStreams, LoopExecutor, TimerHeartbeat};
use crate::config::FrontendConfig;
use crate::error::{FrontendError, Result};
use crate::protocols;
use crate::shm::ShmAllocator;
use crate::state::{ClientState, FrontendState};

/// The running compositor: its display, loop and state.
pub struct Server {
    display: Display<FrontendState>,
    event_loop: EventLoop<'static, FrontendState>,
    state: FrontendState,
    socket_name: String,
}

impl Server {
    pub fn new(config: &FrontendConfig) -> Result<Self> {
        let mut display: Display<FrontendState> =
            Display::new().map_err(|err| FrontendError::Display(err.to_string()))?;
        let event_loop: EventLoop<'static, FrontendState> =
            EventLoop::try_new().map_err(|err| FrontendError::EventLoop(err.to_string()))?;
        let handle = event_loop.handle();

        let (executor, tasks) = LoopExecutor::new();
        LoopExecutor::register(tasks, &handle)?;
        let engine = SurfaceEngine::new(
            EngineCollaborators {
                allocator: Arc::new(ShmAllocator),
                executor: Arc::new(executor),
                streams: Box::new(HeadlessStreams),
                fence_monitor: Box::new(CalloopFenceMonitor::new(handle.clone())),
                heartbeat: Box::new(TimerHeartbeat::new(handle.clone())),
            },
            EngineConfig {
                frame_quantum: config.frame_quantum(),
            },
        );

        let display_handle = display.handle();
        // No render backend is attached, so timelines cannot be imported.
        let state = FrontendState::new(display_handle.clone(), engine, None);
        protocols::create_globals(
            &display_handle,
            &config.protocols,
            state.timeline_importer.is_some(),
        );

        let socket_name = listen(&handle, config.socket_name.as_deref())?;
        watch_display(&handle, &mut display)?;

        Ok(Self {
            display,
            event_loop,
            state,
            socket_name,
        })
    }

    pub fn socket_name(&self) -> &str {
        &self.socket_name
    }

    /// Runs until the event loop fails.
    pub fn run(mut self) -> Result<()> {
        info!(socket = %self.socket_name, "compositor running");
        loop {
            self.event_loop
                .dispatch(None, &mut self.state)
                .map_err(|err| FrontendError::EventLoop(err.to_string()))?;

            if let Err(err) = self.display.dispatch_clients(&mut self.state) {
                error!(error = %err, "failed to dispatch client requests");
            }
            if let Err(err) = self.display.flush_clients() {
                warn!(error = %err, "failed to flush clients");
            }
        }
    }
}

fn listen(handle: &LoopHandle<'static, FrontendState>, name: Option<&str>) -> Result<String> {
    let socket = match name {
        Some(name) => ListeningSocket::bind(name),
        None => ListeningSocket::bind_auto("wayland", 1..33),
    }
    .map_err(|err| FrontendError::Socket(err.to_string()))?;
    let socket_name = socket
        .socket_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    handle
        .insert_source(
            Generic::new(socket, Interest::READ, Mode::Level),
            |_, socket, state| {
                while let Some(stream) = socket.as_ref().accept()? {
                    if let Err(err) = state
                        .display_handle
                        .insert_client(stream, Arc::new(ClientState))
                    {
                        warn!(error = %err, "failed to add client");
                    }
                }
                Ok(PostAction::Continue)
            },
        )
        .map_err(|err| FrontendError::EventLoop(err.error.to_string()))?;
    info!(socket = %socket_name, "listening");
    Ok(socket_name)
}

/// Wakes the loop when clients have requests queued. The requests
/// themselves are dispatched from [`Server::run`].
fn watch_display(
    handle: &LoopHandle<'static, FrontendState>,
    display: &mut Display<FrontendState>,
) -> Result<()> {
    let poll_fd = display.backend().poll_fd().try_clone_to_owned()?;
    handle
        .insert_source(
            Generic::new(poll_fd, Interest::READ, Mode::Level),
            |_, _, _| Ok(PostAction::Continue),
        )
        .map_err(|err| FrontendError::EventLoop(err.error.to_string()))?;
    Ok(())
}
