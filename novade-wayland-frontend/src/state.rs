//! The state every protocol handler runs against.
//!
//! [`FrontendState`] owns the surface engine and maps engine ids back to the
//! protocol objects that stand for them, so engine errors can be posted on
//! the object they concern.

use std::collections::HashMap;

use novade_buffer_handoff::TimelineImporter;
use novade_surface_commit::{
    EngineError, ErrorTarget, FenceWatchId, ProtocolError, SurfaceEngine, SurfaceId, ViewportId,
};
use tracing::{debug, error, warn};
use wayland_protocols::wp::linux_drm_syncobj::v1::server::wp_linux_drm_syncobj_surface_v1::WpLinuxDrmSyncobjSurfaceV1;
use wayland_protocols::wp::viewporter::server::wp_viewport::WpViewport;
use wayland_server::backend::{self, ClientData, ClientId, DisconnectReason};
use wayland_server::protocol::wl_subsurface::WlSubsurface;
use wayland_server::protocol::wl_surface::WlSurface;
use wayland_server::{DisplayHandle, Resource};

/// `wl_display.error.implementation`.
const DISPLAY_IMPLEMENTATION_ERROR: u32 = 3;

/// Protocol objects by the engine id they stand for.
#[derive(Debug, Default)]
pub struct ResourceMap {
    pub surfaces: HashMap<SurfaceId, WlSurface>,
    pub subsurfaces: HashMap<SurfaceId, WlSubsurface>,
    pub viewports: HashMap<ViewportId, WpViewport>,
    pub sync_surfaces: HashMap<SurfaceId, WpLinuxDrmSyncobjSurfaceV1>,
}

pub struct FrontendState {
    pub display_handle: DisplayHandle,
    pub engine: SurfaceEngine,
    pub resources: ResourceMap,
    /// Supplied by a render backend that can import DRM sync timelines.
    pub timeline_importer: Option<Box<dyn TimelineImporter>>,
}

impl FrontendState {
    pub fn new(
        display_handle: DisplayHandle,
        engine: SurfaceEngine,
        timeline_importer: Option<Box<dyn TimelineImporter>>,
    ) -> Self {
        Self {
            display_handle,
            engine,
            resources: ResourceMap::default(),
            timeline_importer,
        }
    }

    /// Reports a failed request issued on `issuer`.
    ///
    /// Protocol errors are posted on the object they target, falling back to
    /// the issuer when that object is gone. Any other failure disconnects
    /// the issuing client.
    pub fn report<R: Resource>(&self, issuer: &R, err: EngineError) {
        match err {
            EngineError::Protocol(err) => self.post_protocol_error(issuer, &err),
            other => {
                error!(object = %issuer.id(), error = %other, "request failed, disconnecting client");
                self.kill_client(issuer, other.to_string());
            }
        }
    }

    fn post_protocol_error<R: Resource>(&self, issuer: &R, err: &ProtocolError) {
        let code = err.code();
        let message = err.to_string();
        warn!(object = %issuer.id(), code, %message, "protocol error");
        let posted = match err.target() {
            ErrorTarget::Surface(id) => post_on(self.resources.surfaces.get(&id), code, &message),
            ErrorTarget::Subsurface(id) => {
                post_on(self.resources.subsurfaces.get(&id), code, &message)
            }
            ErrorTarget::Viewport(id) => post_on(self.resources.viewports.get(&id), code, &message),
            ErrorTarget::SyncSurface(id) => {
                post_on(self.resources.sync_surfaces.get(&id), code, &message)
            }
            ErrorTarget::Subcompositor
            | ErrorTarget::Viewporter
            | ErrorTarget::SyncManager
            | ErrorTarget::RoleIssuer => false,
        };
        if !posted {
            issuer.post_error(code, message);
        }
    }

    fn kill_client<R: Resource>(&self, issuer: &R, message: String) {
        let Some(client) = issuer.client() else {
            return;
        };
        client.kill(
            &self.display_handle,
            backend::protocol::ProtocolError {
                code: DISPLAY_IMPLEMENTATION_ERROR,
                object_id: 1,
                object_interface: "wl_display".to_string(),
                message,
            },
        );
    }

    /// Resumes a commit parked on an acquire point.
    pub fn fence_signalled(&mut self, surface: SurfaceId, watch: FenceWatchId) {
        let Err(err) = self.engine.acquire_fence_signalled(surface, watch) else {
            return;
        };
        match self.resources.surfaces.get(&surface).cloned() {
            Some(resource) => self.report(&resource, err),
            None => debug!(?surface, error = %err, "deferred commit failed after its surface went away"),
        }
    }
}

fn post_on<T: Resource>(target: Option<&T>, code: u32, message: &str) -> bool {
    match target {
        Some(resource) if resource.is_alive() => {
            resource.post_error(code, message);
            true
        }
        _ => false,
    }
}

/// Per-client data handed to `wayland-server`.
#[derive(Debug, Default)]
pub struct ClientState;

impl ClientData for ClientState {
    fn initialized(&self, client_id: ClientId) {
        debug!(client = ?client_id, "client connected");
    }

    fn disconnected(&self, client_id: ClientId, reason: DisconnectReason) {
        debug!(client = ?client_id, ?reason, "client disconnected");
    }
}
