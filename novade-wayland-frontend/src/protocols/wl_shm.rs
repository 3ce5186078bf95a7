//! `wl_shm`, `wl_shm_pool` and shm-backed `wl_buffer`s.

use std::sync::Arc;

use novade_buffer_handoff::{BufferFormat, HandoffError, LifetimeTracker};
use tracing::{debug, warn};
use wayland_server::backend::ClientId;
use wayland_server::protocol::wl_buffer::{self, WlBuffer};
use wayland_server::protocol::wl_shm::{self, WlShm};
use wayland_server::protocol::wl_shm_pool::{self, WlShmPool};
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource, WEnum};

use crate::error::ShmError;
use crate::shm::{BufferLayout, ShmPool};
use crate::state::FrontendState;

/// User data of a `wl_buffer` created from a pool.
#[derive(Debug)]
pub struct ShmBufferData {
    pub pool: Arc<ShmPool>,
    pub layout: BufferLayout,
    /// Fired when the client destroys the buffer.
    pub lifetime: LifetimeTracker,
}

/// The storage behind a `wl_buffer`'s user data. Buffers from other
/// factories, and shm buffers whose creation was refused, have none.
pub fn shm_storage(data: Option<&Option<ShmBufferData>>) -> Result<&ShmBufferData, HandoffError> {
    data.and_then(Option::as_ref).ok_or(HandoffError::UnsupportedBuffer)
}

fn buffer_format(format: WEnum<wl_shm::Format>) -> Option<BufferFormat> {
    match format {
        WEnum::Value(wl_shm::Format::Argb8888) => Some(BufferFormat::Argb8888),
        WEnum::Value(wl_shm::Format::Xrgb8888) => Some(BufferFormat::Xrgb8888),
        _ => None,
    }
}

impl GlobalDispatch<WlShm, ()> for FrontendState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WlShm>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let shm = data_init.init(resource, ());
        shm.format(wl_shm::Format::Argb8888);
        shm.format(wl_shm::Format::Xrgb8888);
    }
}

impl Dispatch<WlShm, ()> for FrontendState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        resource: &WlShm,
        request: wl_shm::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let wl_shm::Request::CreatePool { id, fd, size } = request else {
            return;
        };
        match ShmPool::new(fd, size) {
            Ok(pool) => {
                debug!(size, "shm pool created");
                data_init.init(id, Some(Arc::new(pool)));
            }
            Err(err) => {
                warn!(size, error = %err, "refusing shm pool");
                data_init.init(id, None::<Arc<ShmPool>>);
                resource.post_error(wl_shm::Error::InvalidFd, err.to_string());
            }
        }
    }
}

/// User data is `None` for a pool that could not be mapped.
impl Dispatch<WlShmPool, Option<Arc<ShmPool>>> for FrontendState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        resource: &WlShmPool,
        request: wl_shm_pool::Request,
        pool: &Option<Arc<ShmPool>>,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_shm_pool::Request::CreateBuffer {
                id,
                offset,
                width,
                height,
                stride,
                format,
            } => {
                let Some(pool) = pool else {
                    data_init.init(id, None::<ShmBufferData>);
                    return;
                };
                let Some(format) = buffer_format(format) else {
                    data_init.init(id, None::<ShmBufferData>);
                    resource.post_error(wl_shm::Error::InvalidFormat, "unsupported shm format");
                    return;
                };
                let layout = BufferLayout {
                    offset,
                    width,
                    height,
                    stride,
                    format,
                };
                if let Err(err) = layout.validate(pool.size()) {
                    data_init.init(id, None::<ShmBufferData>);
                    resource.post_error(wl_shm::Error::InvalidStride, err.to_string());
                    return;
                }
                data_init.init(
                    id,
                    Some(ShmBufferData {
                        pool: pool.clone(),
                        layout,
                        lifetime: LifetimeTracker::new(),
                    }),
                );
            }
            wl_shm_pool::Request::Resize { size } => {
                let Some(pool) = pool else {
                    return;
                };
                match pool.resize(size) {
                    Ok(()) => {}
                    Err(err @ (ShmError::Shrink { .. } | ShmError::InvalidSize(_))) => {
                        resource.post_error(wl_shm::Error::InvalidStride, err.to_string());
                    }
                    Err(err) => resource.post_error(wl_shm::Error::InvalidFd, err.to_string()),
                }
            }
            _ => {}
        }
    }
}

/// User data is `None` for a buffer whose creation was refused.
impl Dispatch<WlBuffer, Option<ShmBufferData>> for FrontendState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &WlBuffer,
        _request: wl_buffer::Request,
        _data: &Option<ShmBufferData>,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }

    fn destroyed(
        _state: &mut Self,
        _client: ClientId,
        _resource: &WlBuffer,
        data: &Option<ShmBufferData>,
    ) {
        if let Some(data) = data {
            data.lifetime.mark_destroyed();
        }
    }
}
