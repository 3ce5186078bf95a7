//! Per-surface crop and scale descriptors (`wp_viewport`).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::geometry::{RectangleF, Size};
use crate::surface::SurfaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportId(u64);

impl ViewportId {
    /// Creates a new, unique `ViewportId`.
    pub fn new_unique() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ViewportId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Why a viewport could not be resolved against a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// The surface size would not be integral.
    BadSize,
    /// The source rectangle reaches past the buffer.
    OutOfBuffer,
}

/// A rejected `set_source`/`set_destination` argument set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadValue;

#[derive(Debug, Clone)]
pub struct Viewport {
    pub(crate) surface: Option<SurfaceId>,
    source: Option<RectangleF>,
    destination: Option<Size>,
    dirty: bool,
}

impl Viewport {
    pub fn new(surface: SurfaceId) -> Self {
        Self {
            surface: Some(surface),
            source: None,
            destination: None,
            dirty: false,
        }
    }

    /// The surface this viewport belongs to, if it still exists.
    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    pub fn source(&self) -> Option<RectangleF> {
        self.source
    }

    pub fn destination(&self) -> Option<Size> {
        self.destination
    }

    /// Sets the source rectangle in surface-local coordinates. All four
    /// values at -1 unset it.
    pub fn set_source(&mut self, x: f64, y: f64, width: f64, height: f64) -> Result<(), BadValue> {
        if x == -1.0 && y == -1.0 && width == -1.0 && height == -1.0 {
            self.source = None;
        } else if x < 0.0 || y < 0.0 || width <= 0.0 || height <= 0.0 {
            return Err(BadValue);
        } else {
            self.source = Some(RectangleF::new(x, y, width, height));
        }
        self.dirty = true;
        Ok(())
    }

    /// Sets the destination size. Both values at -1 unset it.
    pub fn set_destination(&mut self, width: i32, height: i32) -> Result<(), BadValue> {
        if width == -1 && height == -1 {
            self.destination = None;
        } else if width <= 0 || height <= 0 {
            return Err(BadValue);
        } else {
            self.destination = Some(Size::new(width, height));
        }
        self.dirty = true;
        Ok(())
    }

    /// Returns whether the viewport changed since the last call and clears
    /// the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Resolves the sampled region and the logical surface size for a buffer
    /// of `buffer_size` pixels at integer `scale`.
    ///
    /// The returned source rectangle is in buffer pixels.
    pub fn resolve(&self, scale: i32, buffer_size: Size) -> Result<(RectangleF, Size), ResolveError> {
        let scale = f64::from(scale.max(1));
        let whole = RectangleF::from_size(buffer_size);

        let source = match self.source {
            None => whole,
            Some(src) => {
                let buffer_src = src.scaled(scale);
                if buffer_src.x + buffer_src.width > whole.width
                    || buffer_src.y + buffer_src.height > whole.height
                {
                    return Err(ResolveError::OutOfBuffer);
                }
                buffer_src
            }
        };

        let logical = match self.destination {
            Some(destination) => destination,
            None => {
                let width = source.width / scale;
                let height = source.height / scale;
                if width.fract() != 0.0 || height.fract() != 0.0 {
                    return Err(ResolveError::BadSize);
                }
                Size::new(width as i32, height as i32)
            }
        };

        Ok((source, logical))
    }
}
