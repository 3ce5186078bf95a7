//! Event-loop collaborators of the surface engine.
//!
//! Without a renderer the compositor runs headless: streams consume every
//! buffer as soon as it is submitted. Cross-thread work, fence waits and
//! the frame heartbeat all go through the calloop loop that drives the
//! display.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use calloop::channel::{self, Channel, Sender};
use calloop::generic::Generic;
use calloop::timer::{TimeoutAction, Timer};
use calloop::{Interest, LoopHandle, Mode, PostAction, RegistrationToken};
use novade_buffer_handoff::{AcquirePoint, CommittedBuffer, Executor, HandoffError, Task};
use novade_surface_commit::{
    BufferStream, BufferStreamFactory, FenceMonitor, FenceWatchId, HeartbeatTimer, RectangleF,
    Size, SurfaceId,
};
use tracing::{trace, warn};

use crate::error::FrontendError;
use crate::state::FrontendState;

/// Runs tasks on the loop thread. Senders may live on any thread.
pub struct LoopExecutor {
    sender: Mutex<Sender<Task>>,
}

impl LoopExecutor {
    /// Creates the executor and the loop source that drains it.
    pub fn new() -> (Self, Channel<Task>) {
        let (sender, channel) = channel::channel::<Task>();
        (
            Self {
                sender: Mutex::new(sender),
            },
            channel,
        )
    }

    pub fn register(
        channel: Channel<Task>,
        handle: &LoopHandle<'static, FrontendState>,
    ) -> Result<RegistrationToken, FrontendError> {
        handle
            .insert_source(channel, |event, _, _state| {
                if let channel::Event::Msg(task) = event {
                    task();
                }
            })
            .map_err(|err| FrontendError::EventLoop(err.error.to_string()))
    }
}

impl Executor for LoopExecutor {
    fn spawn(&self, task: Task) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if sender.send(task).is_err() {
            warn!("event loop has shut down, dropping task");
        }
    }
}

/// Waits on acquire points with one-shot fd sources.
pub struct CalloopFenceMonitor {
    handle: LoopHandle<'static, FrontendState>,
    tokens: HashMap<FenceWatchId, RegistrationToken>,
}

impl CalloopFenceMonitor {
    pub fn new(handle: LoopHandle<'static, FrontendState>) -> Self {
        Self {
            handle,
            tokens: HashMap::new(),
        }
    }
}

impl FenceMonitor for CalloopFenceMonitor {
    fn watch(
        &mut self,
        surface: SurfaceId,
        watch: FenceWatchId,
        acquire: &AcquirePoint,
    ) -> Result<(), HandoffError> {
        let point = acquire.0.point;
        let fd = acquire
            .readiness_fd()
            .map_err(|source| HandoffError::FenceReadiness { point, source })?;
        let source = Generic::new(fd, Interest::READ, Mode::OneShot);
        let token = self
            .handle
            .insert_source(source, move |_, _, state| {
                trace!(?surface, point, "acquire point signalled");
                state.fence_signalled(surface, watch);
                Ok(PostAction::Remove)
            })
            .map_err(|err| HandoffError::FenceReadiness {
                point,
                source: io::Error::other(err.error.to_string()),
            })?;
        self.tokens.insert(watch, token);
        Ok(())
    }

    fn cancel(&mut self, watch: FenceWatchId) {
        if let Some(token) = self.tokens.remove(&watch) {
            self.handle.remove(token);
        }
    }

    fn completed(&mut self, watch: FenceWatchId) {
        self.tokens.remove(&watch);
    }
}

/// Arms a one-shot calloop timer for each heartbeat.
pub struct TimerHeartbeat {
    handle: LoopHandle<'static, FrontendState>,
}

impl TimerHeartbeat {
    pub fn new(handle: LoopHandle<'static, FrontendState>) -> Self {
        Self { handle }
    }
}

impl HeartbeatTimer for TimerHeartbeat {
    fn arm(&mut self, after: Duration) -> io::Result<()> {
        self.handle
            .insert_source(Timer::from_duration(after), |_, _, state| {
                let sent = state.engine.dispatch_frame_batch();
                trace!(sent, "frame heartbeat");
                TimeoutAction::Drop
            })
            .map_err(|err| io::Error::other(err.error.to_string()))?;
        Ok(())
    }
}

/// A stream with no renderer behind it: every submission is consumed on
/// arrival and held until the next one replaces it.
#[derive(Debug)]
pub struct HeadlessStream {
    surface: SurfaceId,
    latest: Option<Arc<CommittedBuffer>>,
    submissions: u64,
}

impl HeadlessStream {
    pub fn new(surface: SurfaceId) -> Self {
        Self {
            surface,
            latest: None,
            submissions: 0,
        }
    }

    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    pub fn is_showing(&self) -> bool {
        self.latest.is_some()
    }
}

impl BufferStream for HeadlessStream {
    fn submit_buffer(&mut self, buffer: Arc<CommittedBuffer>, logical_size: Size, source: RectangleF) {
        buffer.mark_consumed();
        self.submissions += 1;
        trace!(
            surface = ?self.surface,
            buffer = buffer.buffer().id().raw(),
            ?logical_size,
            ?source,
            "buffer submitted"
        );
        self.latest = Some(buffer);
    }

    fn unmap(&mut self) {
        self.latest = None;
    }
}

#[derive(Debug, Default)]
pub struct HeadlessStreams;

impl BufferStreamFactory for HeadlessStreams {
    fn create_stream(&mut self, surface: SurfaceId) -> Box<dyn BufferStream> {
        Box::new(HeadlessStream::new(surface))
    }
}
