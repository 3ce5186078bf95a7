//! # Novade Buffer Handoff
//!
//! Ownership transfer of client buffers between a Wayland client and the
//! compositor. The crate has no protocol knowledge of its own; the frontend
//! wraps its resources in the abstractions defined here and the surface
//! engine moves them through the commit pipeline.
//!
//! - [`lifetime`]: destruction notification for client-owned resources, so the
//!   compositor can hold weak references to them.
//! - [`buffer`]: client/render buffer traits and [`CommittedBuffer`], the unit
//!   whose drop hands a buffer back to its client exactly once.
//! - [`executor`]: posting closures from render threads back onto the
//!   dispatch thread.
//! - [`sync`]: explicit-sync timeline points.

pub mod buffer;
pub mod error;
pub mod executor;
pub mod lifetime;
pub mod sync;

// Re-export key types for convenience.
pub use buffer::{
    BufferAllocator, BufferFormat, BufferId, ClientBuffer, CommittedBuffer, Completion,
    RenderBuffer,
};
pub use error::{HandoffError, Result};
pub use executor::{Executor, QueueExecutor, Task};
pub use lifetime::{LifetimeHandle, LifetimeTracker, Tracked};
pub use sync::{
    point_from_wire, AcquirePoint, ReleasePoint, SyncTimeline, TimelineImporter, TimelinePoint,
};
