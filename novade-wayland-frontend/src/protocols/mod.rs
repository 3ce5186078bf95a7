//! Protocol dispatch.
//!
//! One module per global. Handlers translate requests into
//! [`SurfaceEngine`](novade_surface_commit::SurfaceEngine) calls and report
//! failures through [`FrontendState::report`].

pub mod linux_drm_syncobj;
pub mod wl_compositor;
pub mod wl_shm;
pub mod wl_subcompositor;
pub mod wp_viewporter;

use tracing::info;
use wayland_protocols::wp::linux_drm_syncobj::v1::server::wp_linux_drm_syncobj_manager_v1::WpLinuxDrmSyncobjManagerV1;
use wayland_protocols::wp::viewporter::server::wp_viewporter::WpViewporter;
use wayland_server::protocol::{wl_compositor::WlCompositor, wl_shm::WlShm, wl_subcompositor::WlSubcompositor};
use wayland_server::DisplayHandle;

use crate::config::ProtocolConfig;
use crate::state::FrontendState;

pub const COMPOSITOR_VERSION: u32 = 5;
pub const SUBCOMPOSITOR_VERSION: u32 = 1;
pub const SHM_VERSION: u32 = 1;
pub const VIEWPORTER_VERSION: u32 = 1;
pub const SYNCOBJ_MANAGER_VERSION: u32 = 1;

/// Advertises the globals this frontend implements.
///
/// The explicit-sync manager needs a timeline importer as well as being
/// enabled.
pub fn create_globals(dh: &DisplayHandle, protocols: &ProtocolConfig, can_import_timelines: bool) {
    dh.create_global::<FrontendState, WlCompositor, ()>(COMPOSITOR_VERSION, ());
    dh.create_global::<FrontendState, WlSubcompositor, ()>(SUBCOMPOSITOR_VERSION, ());
    dh.create_global::<FrontendState, WlShm, ()>(SHM_VERSION, ());
    if protocols.viewporter {
        dh.create_global::<FrontendState, WpViewporter, ()>(VIEWPORTER_VERSION, ());
    }
    if protocols.explicit_sync && can_import_timelines {
        dh.create_global::<FrontendState, WpLinuxDrmSyncobjManagerV1, ()>(SYNCOBJ_MANAGER_VERSION, ());
    }
    info!(
        viewporter = protocols.viewporter,
        explicit_sync = protocols.explicit_sync && can_import_timelines,
        "globals created"
    );
}
