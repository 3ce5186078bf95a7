//! Client buffers, render buffers, and the handoff between them.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Result;

/// Represents a unique identifier for a render buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

impl BufferId {
    /// Creates a new, unique `BufferId`.
    pub fn new_unique() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        BufferId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Pixel formats understood by the compositor.
///
/// These align with the `wl_shm.format` values the frontend advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferFormat {
    /// 32-bit ARGB format, 8 bits per channel, alpha first.
    Argb8888,
    /// 32-bit XRGB format, 8 bits per channel, alpha ignored (X).
    Xrgb8888,
}

impl BufferFormat {
    pub fn bytes_per_pixel(&self) -> i32 {
        match self {
            BufferFormat::Argb8888 | BufferFormat::Xrgb8888 => 4,
        }
    }
}

/// An opaque client-owned buffer resource (`wl_buffer` on the wire).
pub trait ClientBuffer: Send + Sync + fmt::Debug {
    /// Hands the buffer back to its client with the protocol release event.
    fn release(&self);

    /// Whether the buffer may be used with explicit-sync timeline points.
    fn supports_explicit_sync(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}

/// A buffer the renderer can sample from.
pub trait RenderBuffer: Send + Sync + fmt::Debug {
    fn id(&self) -> BufferId;

    /// Width and height in buffer pixels.
    fn dimensions(&self) -> (i32, i32);

    fn format(&self) -> BufferFormat;
}

/// Turns client buffer resources into render buffers.
pub trait BufferAllocator {
    fn buffer_from_resource(&self, buffer: &Arc<dyn ClientBuffer>) -> Result<Arc<dyn RenderBuffer>>;
}

/// A one-shot completion, run at most once.
pub type Completion = Box<dyn FnOnce() + Send>;

/// A buffer submitted to a buffer stream.
///
/// The stream (and through it the renderer) keeps the committed buffer alive
/// for as long as it samples from it. `mark_consumed` is called the first
/// time the content reaches the screen. Dropping the last reference hands
/// ownership back to the client: any consumption completion that never ran
/// runs first, then the release completion, each exactly once.
pub struct CommittedBuffer {
    buffer: Arc<dyn RenderBuffer>,
    on_consumed: Mutex<Option<Completion>>,
    on_release: Mutex<Option<Completion>>,
}

impl CommittedBuffer {
    pub fn new(buffer: Arc<dyn RenderBuffer>, on_consumed: Completion, on_release: Completion) -> Self {
        Self {
            buffer,
            on_consumed: Mutex::new(Some(on_consumed)),
            on_release: Mutex::new(Some(on_release)),
        }
    }

    pub fn buffer(&self) -> &Arc<dyn RenderBuffer> {
        &self.buffer
    }

    /// Signals that the compositor has consumed this buffer's content.
    pub fn mark_consumed(&self) {
        if let Some(done) = take(&self.on_consumed) {
            done();
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.on_consumed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

fn take(slot: &Mutex<Option<Completion>>) -> Option<Completion> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

impl Drop for CommittedBuffer {
    fn drop(&mut self) {
        self.mark_consumed();
        if let Some(release) = take(&self.on_release) {
            tracing::trace!(buffer = ?self.buffer.id(), "returning committed buffer to client");
            release();
        }
    }
}

impl fmt::Debug for CommittedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommittedBuffer")
            .field("buffer", &self.buffer)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}
