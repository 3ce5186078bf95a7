//! The pending-state record: one surface's not-yet-committed changes.
//!
//! Every pre-commit request writes into a [`PendingState`]. A commit takes
//! the record whole and leaves a fresh one behind. Records merge field by
//! field: a field that is set in the newer record wins, a field that is
//! unset leaves the older value alone, and frame callbacks accumulate.

use std::fmt;
use std::sync::Arc;

use novade_buffer_handoff::{AcquirePoint, ClientBuffer, ReleasePoint, Tracked};

use crate::geometry::{Point, Rectangle, Transform};
use crate::viewport::ViewportId;

/// A client buffer paired with the lifetime of its protocol object.
pub type TrackedBuffer = Tracked<Arc<dyn ClientBuffer>>;

/// A client request to be told when it is a good time to draw.
pub trait FrameCallback: Send + fmt::Debug {
    /// Answers the request. `timestamp_ms` has an undefined base.
    fn done(self: Box<Self>, timestamp_ms: u32);
}

#[derive(Debug, Default)]
pub enum BufferAttachment {
    #[default]
    Unchanged,
    /// `attach(NULL)`: the surface unmaps on commit.
    Detach,
    Attach(TrackedBuffer),
}

impl BufferAttachment {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, BufferAttachment::Unchanged)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum InputShapeUpdate {
    #[default]
    Unchanged,
    /// Back to the default of accepting input over the whole surface.
    Reset,
    /// Accept input only within these rectangles. Empty means nowhere.
    Set(Vec<Rectangle>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportChange {
    Associate(ViewportId),
    Dissociate,
}

#[derive(Debug, Default)]
pub struct PendingState {
    pub buffer: BufferAttachment,
    pub scale: Option<i32>,
    pub offset: Option<Point>,
    pub transform: Option<Transform>,
    pub input_shape: InputShapeUpdate,
    pub frame_callbacks: Vec<Box<dyn FrameCallback>>,
    pub viewport: Option<ViewportChange>,
    pub acquire_point: Option<AcquirePoint>,
    pub release_point: Option<ReleasePoint>,
    pub surface_data_invalidated: bool,
}

impl PendingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `newer` over `self`.
    pub fn merge(&mut self, newer: PendingState) {
        let PendingState {
            buffer,
            scale,
            offset,
            transform,
            input_shape,
            frame_callbacks,
            viewport,
            acquire_point,
            release_point,
            surface_data_invalidated,
        } = newer;

        if !buffer.is_unchanged() {
            self.buffer = buffer;
        }
        if scale.is_some() {
            self.scale = scale;
        }
        if offset.is_some() {
            self.offset = offset;
        }
        if transform.is_some() {
            self.transform = transform;
        }
        if input_shape != InputShapeUpdate::Unchanged {
            self.input_shape = input_shape;
        }
        self.frame_callbacks.extend(frame_callbacks);
        if viewport.is_some() {
            self.viewport = viewport;
        }
        if acquire_point.is_some() {
            self.acquire_point = acquire_point;
        }
        if release_point.is_some() {
            self.release_point = release_point;
        }
        self.surface_data_invalidated |= surface_data_invalidated;
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_unchanged()
            && self.scale.is_none()
            && self.offset.is_none()
            && self.transform.is_none()
            && self.input_shape == InputShapeUpdate::Unchanged
            && self.frame_callbacks.is_empty()
            && self.viewport.is_none()
            && self.acquire_point.is_none()
            && self.release_point.is_none()
            && !self.surface_data_invalidated
    }

    /// Whether applying this state changes what the surface tree reports
    /// for input and stacking.
    pub fn needs_surface_data_refresh(&self) -> bool {
        self.offset.is_some()
            || self.input_shape != InputShapeUpdate::Unchanged
            || self.surface_data_invalidated
    }

    pub fn invalidate_surface_data(&mut self) {
        self.surface_data_invalidated = true;
    }

    pub fn take_frame_callbacks(&mut self) -> Vec<Box<dyn FrameCallback>> {
        std::mem::take(&mut self.frame_callbacks)
    }

    /// Removes the buffer attachment together with the timeline points bound
    /// to it, leaving the rest of the state in place.
    pub fn take_buffer(&mut self) -> (BufferAttachment, Option<ReleasePoint>) {
        self.acquire_point = None;
        (
            std::mem::take(&mut self.buffer),
            self.release_point.take(),
        )
    }
}
