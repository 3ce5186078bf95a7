//! Explicit-sync timeline points.
//!
//! A timeline is a GPU synchronization object with a monotonically increasing
//! 64-bit counter. The client names an acquire point the compositor must wait
//! for before using a buffer, and a release point the compositor signals when
//! it no longer needs that buffer.

use std::fmt;
use std::io;
use std::os::fd::OwnedFd;
use std::sync::Arc;

pub trait SyncTimeline: Send + Sync + fmt::Debug {
    /// Returns a file descriptor that becomes readable once `point` has been
    /// signalled (or already is).
    fn readiness_fd(&self, point: u64) -> io::Result<OwnedFd>;

    fn signal(&self, point: u64) -> io::Result<()>;
}

/// Imports client timeline file descriptors.
pub trait TimelineImporter {
    fn import(&self, fd: OwnedFd) -> io::Result<Arc<dyn SyncTimeline>>;
}

/// Combines the two 32-bit halves a point travels as on the wire.
pub fn point_from_wire(hi: u32, lo: u32) -> u64 {
    (u64::from(hi) << 32) | u64::from(lo)
}

#[derive(Clone, Debug)]
pub struct TimelinePoint {
    pub timeline: Arc<dyn SyncTimeline>,
    pub point: u64,
}

impl TimelinePoint {
    pub fn new(timeline: Arc<dyn SyncTimeline>, point: u64) -> Self {
        Self { timeline, point }
    }

    pub fn same_timeline(&self, other: &TimelinePoint) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.timeline) as *const (),
            Arc::as_ptr(&other.timeline) as *const (),
        )
    }
}

/// The point a buffer's content is ready at.
#[derive(Clone, Debug)]
pub struct AcquirePoint(pub TimelinePoint);

/// The point the compositor signals when it has finished with a buffer.
#[derive(Clone, Debug)]
pub struct ReleasePoint(pub TimelinePoint);

impl AcquirePoint {
    pub fn readiness_fd(&self) -> io::Result<OwnedFd> {
        self.0.timeline.readiness_fd(self.0.point)
    }
}

impl ReleasePoint {
    pub fn signal(&self) -> io::Result<()> {
        self.0.timeline.signal(self.0.point)
    }

    /// A release point conflicts with an acquire point on the same timeline
    /// unless it lies strictly after it.
    pub fn conflicts_with(&self, acquire: &AcquirePoint) -> bool {
        self.0.same_timeline(&acquire.0) && self.0.point <= acquire.0.point
    }
}
