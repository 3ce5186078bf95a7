//! `wp_viewporter` and `wp_viewport`.

use novade_surface_commit::{SurfaceId, ViewportId};
use wayland_protocols::wp::viewporter::server::wp_viewport::{self, WpViewport};
use wayland_protocols::wp::viewporter::server::wp_viewporter::{self, WpViewporter};
use wayland_server::backend::ClientId;
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource};

use crate::state::FrontendState;

impl GlobalDispatch<WpViewporter, ()> for FrontendState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WpViewporter>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
    }
}

impl Dispatch<WpViewporter, ()> for FrontendState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WpViewporter,
        request: wp_viewporter::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let wp_viewporter::Request::GetViewport { id, surface } = request else {
            return;
        };
        let Some(surface) = surface.data::<SurfaceId>().copied() else {
            data_init.init(id, None::<ViewportId>);
            return;
        };
        match state.engine.create_viewport(surface) {
            Ok(viewport) => {
                let object = data_init.init(id, Some(viewport));
                state.resources.viewports.insert(viewport, object);
            }
            Err(err) => {
                data_init.init(id, None::<ViewportId>);
                state.report(resource, err);
            }
        }
    }
}

/// User data is `None` for a viewport whose creation was refused.
impl Dispatch<WpViewport, Option<ViewportId>> for FrontendState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WpViewport,
        request: wp_viewport::Request,
        viewport: &Option<ViewportId>,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let Some(viewport) = *viewport else {
            return;
        };
        let result = match request {
            wp_viewport::Request::SetSource { x, y, width, height } => {
                state.engine.set_viewport_source(viewport, x, y, width, height)
            }
            wp_viewport::Request::SetDestination { width, height } => {
                state.engine.set_viewport_destination(viewport, width, height)
            }
            _ => Ok(()),
        };
        if let Err(err) = result {
            state.report(resource, err);
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: ClientId,
        _resource: &WpViewport,
        viewport: &Option<ViewportId>,
    ) {
        if let Some(viewport) = viewport {
            state.resources.viewports.remove(viewport);
            state.engine.destroy_viewport(*viewport);
        }
    }
}
