//! # Novade Surface Commit
//!
//! The per-surface state machine of the Novade display server: what a client
//! builds up between commits, how a commit turns it into presentable
//! content, and how content is handed back once the renderer is done.
//!
//! - [`engine`]: [`SurfaceEngine`], the arena of surfaces and the commit
//!   pipeline driving everything below.
//! - [`pending`]: the record of not-yet-committed changes and its merge rule.
//! - [`subcompositor`]: subsurface roles, synchronized caching and stacking.
//! - [`viewport`]: crop and scale descriptors.
//! - [`explicit_sync`]: acquire/release timeline points and fence waits.
//! - [`frame_scheduler`]: the heartbeat answering buffer-less frame requests.
//!
//! The engine is single-threaded. Renderer threads only ever touch
//! [`novade_buffer_handoff::CommittedBuffer`], whose notifications come back
//! through the executor supplied at construction.

pub mod engine;
pub mod error;
pub mod explicit_sync;
pub mod frame_scheduler;
pub mod geometry;
pub mod pending;
pub mod region;
pub mod role;
pub mod stream;
pub mod subcompositor;
pub mod surface;
pub mod viewport;

pub use engine::{EngineCollaborators, EngineConfig, SurfaceEngine};
pub use error::{EngineError, ErrorTarget, ProtocolError, Result};
pub use explicit_sync::{FenceMonitor, FenceWatchId};
pub use frame_scheduler::{HeartbeatTimer, DEFAULT_FRAME_QUANTUM};
pub use geometry::{Point, Rectangle, RectangleF, Size, Transform};
pub use pending::{FrameCallback, TrackedBuffer};
pub use region::Region;
pub use role::{RoleKind, SceneSurfaceRef, ShellRole, SurfaceRole, SurfaceSnapshot};
pub use stream::{BufferStream, BufferStreamFactory};
pub use subcompositor::SubsurfaceSyncMode;
pub use surface::{CommitPhase, DestroyReason, StreamSpec, Surface, SurfaceData, SurfaceId};
pub use viewport::ViewportId;
