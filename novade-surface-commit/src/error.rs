//! Error types for the surface engine.
//!
//! [`ProtocolError`] values are client mistakes with a fixed wire error
//! code; the frontend posts them on the object [`ProtocolError::target`]
//! names, which terminates only that client. Everything else in
//! [`EngineError`] is a failure of the compositor while serving one
//! request.

use novade_buffer_handoff::HandoffError;
use thiserror::Error;

use crate::role::RoleKind;
use crate::surface::SurfaceId;
use crate::viewport::ViewportId;

/// The protocol object a [`ProtocolError`] must be posted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTarget {
    Surface(SurfaceId),
    /// The `wl_subcompositor` that issued the request.
    Subcompositor,
    Subsurface(SurfaceId),
    /// The `wp_viewporter` that issued the request.
    Viewporter,
    Viewport(ViewportId),
    /// The `wp_linux_drm_syncobj_manager_v1` that issued the request.
    SyncManager,
    SyncSurface(SurfaceId),
    /// The object that tried to give the surface a role.
    RoleIssuer,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("buffer scale {scale} is not positive")]
    InvalidScale { surface: SurfaceId, scale: i32 },

    #[error("buffer transform {transform} is not a wl_output.transform value")]
    InvalidTransform { surface: SurfaceId, transform: i32 },

    #[error("non-zero attach offset ({x}, {y}) is not allowed, use wl_surface.offset")]
    InvalidOffset { surface: SurfaceId, x: i32, y: i32 },

    #[error("surface {surface:?} destroyed before its role object")]
    DefunctRoleObject { surface: SurfaceId },

    #[error("surface {surface:?} already has the {existing:?} role")]
    RoleAlreadyAssigned { surface: SurfaceId, existing: RoleKind },

    #[error("surface {surface:?} cannot become a subsurface")]
    BadSubsurface { surface: SurfaceId },

    #[error("surface {parent:?} cannot be the parent of {surface:?}")]
    BadParent { surface: SurfaceId, parent: SurfaceId },

    #[error("surface {sibling:?} is neither a sibling nor the parent of {surface:?}")]
    BadSibling { surface: SurfaceId, sibling: SurfaceId },

    #[error("surface {surface:?} already has a viewport")]
    ViewportExists { surface: SurfaceId },

    #[error("invalid viewport {what} values")]
    ViewportBadValue { viewport: ViewportId, what: &'static str },

    #[error("viewport destination size is not integral")]
    ViewportBadSize { viewport: ViewportId },

    #[error("viewport source rectangle extends outside the buffer")]
    ViewportOutOfBuffer { viewport: ViewportId },

    #[error("the surface of this viewport no longer exists")]
    ViewportNoSurface { viewport: ViewportId },

    #[error("surface {surface:?} already has an explicit sync object")]
    SyncSurfaceExists { surface: SurfaceId },

    #[error("the surface of this sync object no longer exists")]
    SyncNoSurface { surface: SurfaceId },

    #[error("the attached buffer does not support explicit synchronization")]
    SyncUnsupportedBuffer { surface: SurfaceId },

    #[error("timeline points were set without attaching a buffer")]
    SyncNoBuffer { surface: SurfaceId },

    #[error("a buffer was attached without an acquire point")]
    SyncNoAcquirePoint { surface: SurfaceId },

    #[error("a buffer was attached without a release point")]
    SyncNoReleasePoint { surface: SurfaceId },

    #[error("release point does not follow the acquire point on the same timeline")]
    SyncConflictingPoints { surface: SurfaceId },
}

impl ProtocolError {
    pub fn target(&self) -> ErrorTarget {
        use ProtocolError::*;
        match *self {
            InvalidScale { surface, .. }
            | InvalidTransform { surface, .. }
            | InvalidOffset { surface, .. }
            | DefunctRoleObject { surface } => ErrorTarget::Surface(surface),
            RoleAlreadyAssigned { .. } => ErrorTarget::RoleIssuer,
            BadSubsurface { .. } | BadParent { .. } => ErrorTarget::Subcompositor,
            BadSibling { surface, .. } => ErrorTarget::Subsurface(surface),
            ViewportExists { .. } => ErrorTarget::Viewporter,
            ViewportBadValue { viewport, .. }
            | ViewportBadSize { viewport }
            | ViewportOutOfBuffer { viewport }
            | ViewportNoSurface { viewport } => ErrorTarget::Viewport(viewport),
            SyncSurfaceExists { .. } => ErrorTarget::SyncManager,
            SyncNoSurface { surface }
            | SyncUnsupportedBuffer { surface }
            | SyncNoBuffer { surface }
            | SyncNoAcquirePoint { surface }
            | SyncNoReleasePoint { surface }
            | SyncConflictingPoints { surface } => ErrorTarget::SyncSurface(surface),
        }
    }

    /// The error code posted on the wire, within the interface of
    /// [`ProtocolError::target`].
    pub fn code(&self) -> u32 {
        use ProtocolError::*;
        match self {
            InvalidScale { .. } => 0,
            InvalidTransform { .. } => 1,
            InvalidOffset { .. } => 3,
            DefunctRoleObject { .. } => 4,
            RoleAlreadyAssigned { .. } => 0,
            BadSubsurface { .. } => 0,
            BadParent { .. } => 1,
            BadSibling { .. } => 0,
            ViewportExists { .. } => 0,
            ViewportBadValue { .. } => 0,
            ViewportBadSize { .. } => 1,
            ViewportOutOfBuffer { .. } => 2,
            ViewportNoSurface { .. } => 3,
            SyncSurfaceExists { .. } => 0,
            SyncNoSurface { .. } => 1,
            SyncUnsupportedBuffer { .. } => 2,
            SyncNoBuffer { .. } => 3,
            SyncNoAcquirePoint { .. } => 4,
            SyncNoReleasePoint { .. } => 5,
            SyncConflictingPoints { .. } => 6,
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Resource acquisition failed: {0}")]
    Resource(#[from] HandoffError),

    #[error("Unknown surface {0:?}")]
    UnknownSurface(SurfaceId),

    #[error("Unknown viewport {0:?}")]
    UnknownViewport(ViewportId),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
