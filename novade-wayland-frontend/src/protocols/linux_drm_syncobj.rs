//! `wp_linux_drm_syncobj_manager_v1` and its surface and timeline objects.

use std::sync::Arc;

use novade_buffer_handoff::{point_from_wire, AcquirePoint, ReleasePoint, SyncTimeline, TimelinePoint};
use novade_surface_commit::SurfaceId;
use tracing::{debug, warn};
use wayland_protocols::wp::linux_drm_syncobj::v1::server::wp_linux_drm_syncobj_manager_v1::{
    self, WpLinuxDrmSyncobjManagerV1,
};
use wayland_protocols::wp::linux_drm_syncobj::v1::server::wp_linux_drm_syncobj_surface_v1::{
    self, WpLinuxDrmSyncobjSurfaceV1,
};
use wayland_protocols::wp::linux_drm_syncobj::v1::server::wp_linux_drm_syncobj_timeline_v1::{
    self, WpLinuxDrmSyncobjTimelineV1,
};
use wayland_server::backend::ClientId;
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource};

use crate::state::FrontendState;

/// An imported timeline; `None` if the import was refused.
#[derive(Debug)]
pub struct TimelineData(pub Option<Arc<dyn SyncTimeline>>);

impl GlobalDispatch<WpLinuxDrmSyncobjManagerV1, ()> for FrontendState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WpLinuxDrmSyncobjManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
    }
}

impl Dispatch<WpLinuxDrmSyncobjManagerV1, ()> for FrontendState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WpLinuxDrmSyncobjManagerV1,
        request: wp_linux_drm_syncobj_manager_v1::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wp_linux_drm_syncobj_manager_v1::Request::GetSurface { id, surface } => {
                let Some(surface) = surface.data::<SurfaceId>().copied() else {
                    data_init.init(id, None::<SurfaceId>);
                    return;
                };
                match state.engine.create_sync_surface(surface) {
                    Ok(()) => {
                        let object = data_init.init(id, Some(surface));
                        state.resources.sync_surfaces.insert(surface, object);
                    }
                    Err(err) => {
                        data_init.init(id, None::<SurfaceId>);
                        state.report(resource, err);
                    }
                }
            }
            wp_linux_drm_syncobj_manager_v1::Request::ImportTimeline { id, fd } => {
                let imported = match &state.timeline_importer {
                    Some(importer) => importer.import(fd),
                    None => Err(std::io::Error::from(std::io::ErrorKind::Unsupported)),
                };
                match imported {
                    Ok(timeline) => {
                        data_init.init(id, TimelineData(Some(timeline)));
                    }
                    Err(err) => {
                        warn!(error = %err, "timeline import failed");
                        data_init.init(id, TimelineData(None));
                        resource.post_error(
                            wp_linux_drm_syncobj_manager_v1::Error::InvalidTimeline,
                            format!("failed to import timeline: {err}"),
                        );
                    }
                }
            }
            _ => {}
        }
    }
}

/// User data is `None` for a sync object whose creation was refused.
impl Dispatch<WpLinuxDrmSyncobjSurfaceV1, Option<SurfaceId>> for FrontendState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WpLinuxDrmSyncobjSurfaceV1,
        request: wp_linux_drm_syncobj_surface_v1::Request,
        surface: &Option<SurfaceId>,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let Some(surface) = *surface else {
            return;
        };
        let result = match request {
            wp_linux_drm_syncobj_surface_v1::Request::SetAcquirePoint { timeline, point_hi, point_lo } => {
                match timeline_point(&timeline, point_hi, point_lo) {
                    Some(point) => state.engine.set_acquire_point(surface, AcquirePoint(point)),
                    None => Ok(()),
                }
            }
            wp_linux_drm_syncobj_surface_v1::Request::SetReleasePoint { timeline, point_hi, point_lo } => {
                match timeline_point(&timeline, point_hi, point_lo) {
                    Some(point) => state.engine.set_release_point(surface, ReleasePoint(point)),
                    None => Ok(()),
                }
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
        resource: &WpLinuxDrmSyncobjSurfaceV1,
        surface: &Option<SurfaceId>,
    ) {
        let Some(surface) = surface else {
            return;
        };
        if state.resources.sync_surfaces.get(surface).is_some_and(|s| s == resource) {
            state.resources.sync_surfaces.remove(surface);
            state.engine.destroy_sync_surface(*surface);
            debug!(?surface, "explicit sync object destroyed");
        }
    }
}

fn timeline_point(timeline: &WpLinuxDrmSyncobjTimelineV1, hi: u32, lo: u32) -> Option<TimelinePoint> {
    let data = timeline.data::<TimelineData>()?;
    let timeline = data.0.clone()?;
    Some(TimelinePoint::new(timeline, point_from_wire(hi, lo)))
}

impl Dispatch<WpLinuxDrmSyncobjTimelineV1, TimelineData> for FrontendState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &WpLinuxDrmSyncobjTimelineV1,
        _request: wp_linux_drm_syncobj_timeline_v1::Request,
        _data: &TimelineData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}
