//! `wl_compositor`, `wl_surface`, `wl_region` and `wl_callback`.

use std::sync::{Arc, Mutex, PoisonError};

use novade_buffer_handoff::{HandoffError, Tracked};
use novade_surface_commit::{
    DestroyReason, FrameCallback, Point, ProtocolError, Rectangle, Region, SurfaceId,
    TrackedBuffer,
};
use tracing::{debug, trace, warn};
use wayland_server::backend::ClientId;
use wayland_server::protocol::wl_buffer::WlBuffer;
use wayland_server::protocol::wl_callback::WlCallback;
use wayland_server::protocol::wl_compositor::{self, WlCompositor};
use wayland_server::protocol::wl_region::{self, WlRegion};
use wayland_server::protocol::wl_surface::{self, WlSurface};
use wayland_server::{
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource, WEnum,
};

use super::wl_shm::{shm_storage, ShmBufferData};
use crate::shm::ShmClientBuffer;
use crate::state::FrontendState;

/// `wl_surface.attach` takes no offset from this version on.
const ATTACH_OFFSET_REMOVED_SINCE: u32 = 5;

impl GlobalDispatch<WlCompositor, ()> for FrontendState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WlCompositor>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
    }
}

impl Dispatch<WlCompositor, ()> for FrontendState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &WlCompositor,
        request: wl_compositor::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_compositor::Request::CreateSurface { id } => {
                let surface = state.engine.create_surface();
                let resource = data_init.init(id, surface);
                debug!(?surface, object = %resource.id(), "wl_surface created");
                state.resources.surfaces.insert(surface, resource);
            }
            wl_compositor::Request::CreateRegion { id } => {
                data_init.init(id, Mutex::new(Region::new()));
            }
            _ => {}
        }
    }
}

impl Dispatch<WlSurface, SurfaceId> for FrontendState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WlSurface,
        request: wl_surface::Request,
        id: &SurfaceId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let id = *id;
        let result = match request {
            wl_surface::Request::Attach { buffer, x, y } => {
                if (x, y) != (0, 0) {
                    if resource.version() >= ATTACH_OFFSET_REMOVED_SINCE {
                        warn!(surface = ?id, x, y, "non-zero attach offset");
                        state.report(resource, ProtocolError::InvalidOffset { surface: id, x, y }.into());
                        return;
                    }
                    if let Err(err) = state.offset_by(id, Point::new(x, y)) {
                        state.report(resource, err);
                        return;
                    }
                }
                let buffer = match buffer.as_ref().map(tracked_buffer).transpose() {
                    Ok(buffer) => buffer,
                    Err(err) => {
                        warn!(surface = ?id, error = %err, "attached buffer has no usable storage");
                        state.report(resource, err.into());
                        return;
                    }
                };
                state.engine.attach(id, buffer)
            }
            wl_surface::Request::Frame { callback } => {
                let callback = data_init.init(callback, ());
                state.engine.frame(id, Box::new(FrameDone(callback)))
            }
            wl_surface::Request::SetInputRegion { region } => {
                let region = region.and_then(|r| r.data::<Mutex<Region>>().map(snapshot));
                state.engine.set_input_region(id, region.as_ref())
            }
            wl_surface::Request::Commit => state.engine.commit(id),
            wl_surface::Request::SetBufferTransform { transform } => {
                let raw = match transform {
                    WEnum::Value(value) => u32::from(value) as i32,
                    WEnum::Unknown(raw) => raw as i32,
                };
                state.engine.set_buffer_transform(id, raw)
            }
            wl_surface::Request::SetBufferScale { scale } => state.engine.set_buffer_scale(id, scale),
            wl_surface::Request::Offset { x, y } => state.offset_by(id, Point::new(x, y)),
            // Damage is not tracked: every commit submits the whole buffer.
            wl_surface::Request::Damage { .. }
            | wl_surface::Request::DamageBuffer { .. }
            | wl_surface::Request::SetOpaqueRegion { .. } => Ok(()),
            wl_surface::Request::Destroy => state
                .engine
                .destroy_surface(id, DestroyReason::ClientRequest),
            _ => Ok(()),
        };
        if let Err(err) = result {
            state.report(resource, err);
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, _resource: &WlSurface, id: &SurfaceId) {
        state.resources.surfaces.remove(id);
        if state.engine.contains(*id) {
            // Still present only when the client went away without
            // destroying it cleanly.
            if let Err(err) = state.engine.destroy_surface(*id, DestroyReason::ClientDisconnected) {
                debug!(surface = ?id, error = %err, "surface teardown failed");
            }
        }
    }
}

impl FrontendState {
    /// `wl_surface.offset` and pre-version-5 attach offsets: a displacement
    /// from the current content offset.
    fn offset_by(&mut self, id: SurfaceId, delta: Point) -> novade_surface_commit::Result<()> {
        let current = self
            .engine
            .surface(id)
            .map(|surface| surface.offset())
            .unwrap_or_default();
        self.engine.set_offset(id, current + delta)
    }
}

fn tracked_buffer(buffer: &WlBuffer) -> Result<TrackedBuffer, HandoffError> {
    let data = shm_storage(buffer.data::<Option<ShmBufferData>>())?;
    let client_buffer = ShmClientBuffer {
        resource: buffer.clone(),
        pool: data.pool.clone(),
        layout: data.layout,
    };
    Ok(Tracked::new(Arc::new(client_buffer), data.lifetime.handle()))
}

fn snapshot(region: &Mutex<Region>) -> Region {
    region.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// A `wl_callback` answering one `wl_surface.frame` request.
#[derive(Debug)]
pub struct FrameDone(pub WlCallback);

impl FrameCallback for FrameDone {
    fn done(self: Box<Self>, timestamp_ms: u32) {
        if self.0.is_alive() {
            trace!(callback = %self.0.id(), timestamp_ms, "wl_callback.done");
            self.0.done(timestamp_ms);
        }
    }
}

impl Dispatch<WlCallback, ()> for FrontendState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &WlCallback,
        _request: <WlCallback as Resource>::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

impl Dispatch<WlRegion, Mutex<Region>> for FrontendState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &WlRegion,
        request: wl_region::Request,
        region: &Mutex<Region>,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let mut region = region.lock().unwrap_or_else(PoisonError::into_inner);
        match request {
            wl_region::Request::Add { x, y, width, height } => {
                region.add(Rectangle::new(x, y, width, height));
            }
            wl_region::Request::Subtract { x, y, width, height } => {
                region.subtract(Rectangle::new(x, y, width, height));
            }
            _ => {}
        }
    }
}
