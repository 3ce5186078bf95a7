//! `wl_subcompositor` and `wl_subsurface`.

use novade_surface_commit::{Point, SurfaceId};
use tracing::debug;
use wayland_server::backend::ClientId;
use wayland_server::protocol::wl_subcompositor::{self, WlSubcompositor};
use wayland_server::protocol::wl_subsurface::{self, WlSubsurface};
use wayland_server::protocol::wl_surface::WlSurface;
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource};

use crate::state::FrontendState;

impl GlobalDispatch<WlSubcompositor, ()> for FrontendState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WlSubcompositor>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
    }
}

impl Dispatch<WlSubcompositor, ()> for FrontendState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WlSubcompositor,
        request: wl_subcompositor::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_subcompositor::Request::GetSubsurface { id, surface, parent } => {
                let (Some(surface_id), Some(parent_id)) = (surface_id(&surface), surface_id(&parent)) else {
                    data_init.init(id, SurfaceId::new_unique());
                    resource.post_error(
                        wl_subcompositor::Error::BadSurface,
                        "surface or parent is not a wl_surface of this compositor",
                    );
                    return;
                };
                let subsurface = data_init.init(id, surface_id);
                match state.engine.get_subsurface(surface_id, parent_id) {
                    Ok(()) => {
                        debug!(surface = ?surface_id, parent = ?parent_id, "subsurface created");
                        state.resources.subsurfaces.insert(surface_id, subsurface);
                    }
                    Err(err) => state.report(resource, err),
                }
            }
            _ => {}
        }
    }
}

fn surface_id(surface: &WlSurface) -> Option<SurfaceId> {
    surface.data::<SurfaceId>().copied()
}

impl Dispatch<WlSubsurface, SurfaceId> for FrontendState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WlSubsurface,
        request: wl_subsurface::Request,
        id: &SurfaceId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let id = *id;
        // Requests on a subsurface whose role was refused are ignored.
        if !state.resources.subsurfaces.get(&id).is_some_and(|s| s == resource) {
            return;
        }
        let result = match request {
            wl_subsurface::Request::SetPosition { x, y } => {
                state.engine.set_subsurface_position(id, Point::new(x, y));
                Ok(())
            }
            wl_subsurface::Request::PlaceAbove { sibling } => match surface_id(&sibling) {
                Some(sibling) => state.engine.place_above(id, sibling),
                None => Ok(()),
            },
            wl_subsurface::Request::PlaceBelow { sibling } => match surface_id(&sibling) {
                Some(sibling) => state.engine.place_below(id, sibling),
                None => Ok(()),
            },
            wl_subsurface::Request::SetSync => {
                state.engine.set_sync(id);
                Ok(())
            }
            wl_subsurface::Request::SetDesync => {
                state.engine.set_desync(id);
                Ok(())
            }
            _ => Ok(()),
        };
        if let Err(err) = result {
            state.report(resource, err);
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, resource: &WlSubsurface, id: &SurfaceId) {
        if state.resources.subsurfaces.get(id).is_some_and(|s| s == resource) {
            state.resources.subsurfaces.remove(id);
            state.engine.destroy_subsurface(*id);
        }
    }
}
