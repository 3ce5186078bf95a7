//! Shared-memory buffers.
//!
//! A `wl_shm_pool` is a client file descriptor mapped read-only into the
//! compositor. Buffers are windows into a pool described by a
//! [`BufferLayout`]; [`ShmAllocator`] turns them into render buffers that
//! keep the pool mapped for as long as the renderer holds them.

use std::any::Any;
use std::fmt;
use std::os::fd::OwnedFd;
use std::sync::{Arc, PoisonError, RwLock};

use memmap2::{Mmap, MmapOptions};
use novade_buffer_handoff::{
    BufferAllocator, BufferFormat, BufferId, ClientBuffer, HandoffError, RenderBuffer,
};
use tracing::{debug, trace};
use wayland_server::protocol::wl_buffer::WlBuffer;
use wayland_server::Resource;

use crate::error::ShmError;

pub struct ShmPool {
    fd: OwnedFd,
    map: RwLock<Mmap>,
}

impl ShmPool {
    pub fn new(fd: OwnedFd, size: i32) -> Result<Self, ShmError> {
        let map = map_pool(&fd, size)?;
        Ok(Self {
            fd,
            map: RwLock::new(map),
        })
    }

    pub fn size(&self) -> usize {
        self.map.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Remaps the pool at `size` bytes. Pools only grow.
    pub fn resize(&self, size: i32) -> Result<(), ShmError> {
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        let requested = usize::try_from(size).map_err(|_| ShmError::InvalidSize(size))?;
        if requested < map.len() {
            return Err(ShmError::Shrink {
                current: map.len(),
                requested: size,
            });
        }
        if requested > map.len() {
            *map = map_pool(&self.fd, size)?;
            debug!(size, "shm pool grown");
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn with_contents<T>(&self, f: impl FnOnce(&[u8]) -> T) -> T {
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        f(&map[..])
    }
}

impl fmt::Debug for ShmPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShmPool")
            .field("fd", &self.fd)
            .field("size", &self.size())
            .finish()
    }
}

fn map_pool(fd: &OwnedFd, size: i32) -> Result<Mmap, ShmError> {
    let len = usize::try_from(size)
        .ok()
        .filter(|len| *len > 0)
        .ok_or(ShmError::InvalidSize(size))?;
    // SAFETY: the mapping is read-only and only ever viewed as plain bytes;
    // a client truncating the file underneath is outside our control, as for
    // every shm compositor.
    let map = unsafe { MmapOptions::new().len(len).map(fd)? };
    Ok(map)
}

/// Where a buffer lives inside its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub offset: i32,
    pub width: i32,
    pub height: i32,
    pub stride: i32,
    pub format: BufferFormat,
}

impl BufferLayout {
    /// Bytes from the start of the pool to the end of the buffer.
    fn end(&self) -> Option<usize> {
        let offset = usize::try_from(self.offset).ok()?;
        let stride = usize::try_from(self.stride).ok()?;
        let height = usize::try_from(self.height).ok()?;
        stride.checked_mul(height)?.checked_add(offset)
    }

    /// Checks the layout against a pool of `pool_size` bytes.
    pub fn validate(&self, pool_size: usize) -> Result<(), ShmError> {
        let min_stride = self.width.checked_mul(self.format.bytes_per_pixel());
        if self.width <= 0
            || self.height <= 0
            || self.offset < 0
            || min_stride.map_or(true, |min| self.stride < min)
        {
            return Err(ShmError::InvalidGeometry {
                width: self.width,
                height: self.height,
                stride: self.stride,
            });
        }
        match self.end() {
            Some(needed) if needed <= pool_size => Ok(()),
            needed => Err(ShmError::OutOfBounds {
                needed: needed.unwrap_or(usize::MAX),
                available: pool_size,
            }),
        }
    }
}

/// The client side of an shm buffer: what the engine tracks between attach
/// and release.
#[derive(Debug)]
pub struct ShmClientBuffer {
    pub resource: WlBuffer,
    pub pool: Arc<ShmPool>,
    pub layout: BufferLayout,
}

impl ClientBuffer for ShmClientBuffer {
    fn release(&self) {
        if self.resource.is_alive() {
            trace!(buffer = %self.resource.id(), "wl_buffer.release");
            self.resource.release();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A renderable view of an shm buffer.
#[derive(Debug)]
pub struct ShmRenderBuffer {
    id: BufferId,
    pool: Arc<ShmPool>,
    layout: BufferLayout,
}

impl ShmRenderBuffer {
    pub fn new(pool: Arc<ShmPool>, layout: BufferLayout) -> Result<Self, ShmError> {
        layout.validate(pool.size())?;
        Ok(Self {
            id: BufferId::new_unique(),
            pool,
            layout,
        })
    }

    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    /// Copies the buffer's rows out of the pool, dropping stride padding.
    #[cfg(test)]
    pub fn copy_pixels(&self) -> Vec<u8> {
        let row = (self.layout.width * self.layout.format.bytes_per_pixel()) as usize;
        let stride = self.layout.stride as usize;
        let offset = self.layout.offset as usize;
        self.pool.with_contents(|bytes| {
            (0..self.layout.height as usize)
                .flat_map(|y| {
                    let start = offset + y * stride;
                    bytes[start..start + row].iter().copied()
                })
                .collect()
        })
    }
}

impl RenderBuffer for ShmRenderBuffer {
    fn id(&self) -> BufferId {
        self.id
    }

    fn dimensions(&self) -> (i32, i32) {
        (self.layout.width, self.layout.height)
    }

    fn format(&self) -> BufferFormat {
        self.layout.format
    }
}

/// Imports shm client buffers. Any other buffer type is unsupported.
#[derive(Debug, Default)]
pub struct ShmAllocator;

impl BufferAllocator for ShmAllocator {
    fn buffer_from_resource(
        &self,
        buffer: &Arc<dyn ClientBuffer>,
    ) -> Result<Arc<dyn RenderBuffer>, HandoffError> {
        let shm = buffer
            .as_any()
            .downcast_ref::<ShmClientBuffer>()
            .ok_or(HandoffError::UnsupportedBuffer)?;
        let render = ShmRenderBuffer::new(shm.pool.clone(), shm.layout)
            .map_err(|err| HandoffError::Import(err.to_string()))?;
        Ok(Arc::new(render))
    }
}
