//! The buffer-stream sink each surface submits its content to.

use std::sync::Arc;

use novade_buffer_handoff::CommittedBuffer;

use crate::geometry::{RectangleF, Size};
use crate::surface::SurfaceId;

/// Receives committed buffers for one surface.
///
/// The stream holds each submitted buffer for as long as the renderer needs
/// it and drops it once superseded; that drop is what returns the buffer to
/// its client.
pub trait BufferStream {
    /// Submits `buffer`, to be shown at `logical_size`, sampling `source`
    /// (in buffer pixels).
    fn submit_buffer(&mut self, buffer: Arc<CommittedBuffer>, logical_size: Size, source: RectangleF);

    /// Stops showing any content.
    fn unmap(&mut self);
}

pub trait BufferStreamFactory {
    fn create_stream(&mut self, surface: SurfaceId) -> Box<dyn BufferStream>;
}
