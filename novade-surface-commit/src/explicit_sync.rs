//! Explicit-sync bridge.
//!
//! A commit carrying an acquire point is parked until the point signals. The
//! wait is a readiness registration on the event loop through
//! [`FenceMonitor`]; the dispatch thread never blocks on the GPU. There is
//! no timeout: a client that never signals its acquire point stalls its own
//! surface indefinitely.

use std::sync::atomic::{AtomicU64, Ordering};

use novade_buffer_handoff::{AcquirePoint, HandoffError};

use crate::error::ProtocolError;
use crate::pending::{BufferAttachment, PendingState};
use crate::surface::SurfaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceWatchId(u64);

impl FenceWatchId {
    pub fn new_unique() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        FenceWatchId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Event-loop integration for acquire points.
pub trait FenceMonitor {
    /// Starts watching `acquire`. When it signals, the loop must call
    /// `SurfaceEngine::acquire_fence_signalled(surface, watch)`.
    fn watch(
        &mut self,
        surface: SurfaceId,
        watch: FenceWatchId,
        acquire: &AcquirePoint,
    ) -> Result<(), HandoffError>;

    /// Cancels a registration that has not fired.
    fn cancel(&mut self, watch: FenceWatchId);

    /// Forgets a registration that has fired.
    fn completed(&mut self, _watch: FenceWatchId) {}
}

/// A commit parked on its acquire point.
#[derive(Debug)]
pub struct FenceWait {
    pub(crate) watch: FenceWatchId,
    pub(crate) state: PendingState,
}

impl FenceWait {
    pub fn watch(&self) -> FenceWatchId {
        self.watch
    }
}

/// Checks the timeline points of a state about to be committed.
///
/// `sync_attached` tells whether the surface has a live sync object, in
/// which case every attached buffer needs both points.
pub fn validate_points(
    surface: SurfaceId,
    state: &PendingState,
    sync_attached: bool,
) -> Result<(), ProtocolError> {
    let has_points = state.acquire_point.is_some() || state.release_point.is_some();
    let buffer = match &state.buffer {
        BufferAttachment::Attach(buffer) => Some(buffer),
        _ => None,
    };

    if has_points && buffer.is_none() {
        return Err(ProtocolError::SyncNoBuffer { surface });
    }
    let Some(buffer) = buffer else {
        return Ok(());
    };
    if !sync_attached && !has_points {
        return Ok(());
    }

    let Some(acquire) = &state.acquire_point else {
        return Err(ProtocolError::SyncNoAcquirePoint { surface });
    };
    let Some(release) = &state.release_point else {
        return Err(ProtocolError::SyncNoReleasePoint { surface });
    };
    if !buffer.value().supports_explicit_sync() {
        return Err(ProtocolError::SyncUnsupportedBuffer { surface });
    }
    if release.conflicts_with(acquire) {
        return Err(ProtocolError::SyncConflictingPoints { surface });
    }
    Ok(())
}
