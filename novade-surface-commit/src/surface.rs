//! The surface entity and the data the engine reports about surface trees.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use novade_buffer_handoff::CommittedBuffer;

use crate::explicit_sync::FenceWait;
use crate::geometry::{Point, Rectangle, Size, Transform};
use crate::pending::{FrameCallback, PendingState};
use crate::role::{RoleKind, SceneSurfaceRef, SurfaceRole};
use crate::stream::BufferStream;
use crate::subcompositor::Stacking;
use crate::viewport::ViewportId;

/// Represents a unique identifier for a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(u64);

impl SurfaceId {
    /// Creates a new, unique `SurfaceId`.
    pub fn new_unique() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        SurfaceId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where a surface stands in the commit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPhase {
    /// Nothing pending.
    Idle,
    /// Requests have been received since the last commit.
    Accumulating,
    /// A commit is parked on its acquire point.
    WaitingOnFence,
}

/// Why a surface is being destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    /// `wl_surface.destroy` from a healthy client.
    ClientRequest,
    /// The client connection is being torn down.
    ClientDisconnected,
}

/// One buffer stream in a surface tree, at its offset from the tree root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub surface: SurfaceId,
    pub offset: Point,
}

/// What the scene needs to know about a surface tree: its streams bottom to
/// top and the combined input shape in root coordinates.
///
/// An explicitly empty input shape contributes a zero-sized rectangle, so
/// consumers can tell "no input" apart from "no shape given".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceData {
    pub streams: Vec<StreamSpec>,
    pub input_shape: Vec<Rectangle>,
}

pub(crate) type SceneSurfaceListener = Box<dyn FnOnce(&SceneSurfaceRef)>;

pub struct Surface {
    pub(crate) id: SurfaceId,
    pub(crate) pending: PendingState,
    pub(crate) phase: CommitPhase,
    /// Displacement of the content, from `wl_surface.offset` or a shell role.
    pub(crate) offset: Point,
    /// Logical size of the mapped content; `None` while unmapped.
    pub(crate) buffer_size: Option<Size>,
    pub(crate) scale: i32,
    pub(crate) transform: Transform,
    pub(crate) viewport: Option<ViewportId>,
    /// `None` accepts input everywhere; `Some(vec![])` nowhere.
    pub(crate) input_shape: Option<Vec<Rectangle>>,
    pub(crate) stream: Box<dyn BufferStream>,
    pub(crate) current_buffer: Option<Arc<CommittedBuffer>>,
    pub(crate) stacking: Stacking,
    pub(crate) role: SurfaceRole,
    /// The first role kind ever assigned; a surface never changes role type.
    pub(crate) role_kind: Option<RoleKind>,
    /// Callbacks waiting on the frame heartbeat.
    pub(crate) frame_callbacks: Vec<Box<dyn FrameCallback>>,
    pub(crate) scene_surface_listeners: Vec<SceneSurfaceListener>,
    pub(crate) sync_attached: bool,
    pub(crate) fence_wait: Option<FenceWait>,
}

impl Surface {
    pub(crate) fn new(id: SurfaceId, stream: Box<dyn BufferStream>) -> Self {
        Self {
            id,
            pending: PendingState::new(),
            phase: CommitPhase::Idle,
            offset: Point::ORIGIN,
            buffer_size: None,
            scale: 1,
            transform: Transform::Normal,
            viewport: None,
            input_shape: None,
            stream,
            current_buffer: None,
            stacking: Stacking::default(),
            role: SurfaceRole::Null,
            role_kind: None,
            frame_callbacks: Vec::new(),
            scene_surface_listeners: Vec::new(),
            sync_attached: false,
            fence_wait: None,
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn phase(&self) -> CommitPhase {
        self.phase
    }

    pub fn offset(&self) -> Point {
        self.offset
    }

    pub fn buffer_size(&self) -> Option<Size> {
        self.buffer_size
    }

    pub fn is_mapped(&self) -> bool {
        self.buffer_size.is_some()
    }

    pub fn scale(&self) -> i32 {
        self.scale
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn viewport(&self) -> Option<ViewportId> {
        self.viewport
    }

    pub fn input_shape(&self) -> Option<&[Rectangle]> {
        self.input_shape.as_deref()
    }

    pub fn role(&self) -> &SurfaceRole {
        &self.role
    }

    pub fn stacking(&self) -> &Stacking {
        &self.stacking
    }

    pub fn pending(&self) -> &PendingState {
        &self.pending
    }

    /// Offset of this surface's content from its parent's origin.
    pub(crate) fn local_offset(&self) -> Point {
        let position = self
            .role
            .as_subsurface()
            .map(|role| role.position)
            .unwrap_or_default();
        position + self.offset
    }

    /// Marks a pre-commit request as received.
    pub(crate) fn touch(&mut self) {
        if self.phase == CommitPhase::Idle {
            self.phase = CommitPhase::Accumulating;
        }
    }

    /// The rectangle content occupies, in surface-local coordinates.
    pub(crate) fn bounds(&self) -> Rectangle {
        Rectangle::from_size(Point::ORIGIN, self.buffer_size.unwrap_or_default())
    }

    /// Whether a surface-local point hits this surface's own input shape.
    pub(crate) fn accepts_input_at(&self, point: Point) -> bool {
        if !self.is_mapped() {
            return false;
        }
        let bounds = self.bounds();
        match &self.input_shape {
            None => bounds.contains(point),
            Some(shape) => shape
                .iter()
                .any(|rect| rect.intersection(&bounds).contains(point)),
        }
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("offset", &self.offset)
            .field("buffer_size", &self.buffer_size)
            .field("scale", &self.scale)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}
