//! `wp_linux_drm_syncobj_surface_v1` requests.

use novade_buffer_handoff::{AcquirePoint, ReleasePoint};
use tracing::debug;

use super::SurfaceEngine;
use crate::error::{ProtocolError, Result};
use crate::surface::SurfaceId;

impl SurfaceEngine {
    /// Attaches an explicit-sync object to `surface`. From now on every
    /// buffer it commits must come with both timeline points.
    pub fn create_sync_surface(&mut self, surface: SurfaceId) -> Result<()> {
        let target = self.surface_mut(surface)?;
        if target.sync_attached {
            return Err(ProtocolError::SyncSurfaceExists { surface }.into());
        }
        target.sync_attached = true;
        debug!(?surface, "explicit sync enabled");
        Ok(())
    }

    pub fn set_acquire_point(&mut self, surface: SurfaceId, point: AcquirePoint) -> Result<()> {
        let target = self
            .surfaces
            .get_mut(&surface)
            .ok_or(ProtocolError::SyncNoSurface { surface })?;
        target.pending.acquire_point = Some(point);
        target.touch();
        Ok(())
    }

    pub fn set_release_point(&mut self, surface: SurfaceId, point: ReleasePoint) -> Result<()> {
        let target = self
            .surfaces
            .get_mut(&surface)
            .ok_or(ProtocolError::SyncNoSurface { surface })?;
        target.pending.release_point = Some(point);
        target.touch();
        Ok(())
    }

    /// Detaches the sync object. Points set but not yet committed are
    /// dropped; a commit already waiting on its acquire point still
    /// completes.
    pub fn destroy_sync_surface(&mut self, surface: SurfaceId) {
        if let Some(target) = self.surfaces.get_mut(&surface) {
            target.sync_attached = false;
            target.pending.acquire_point = None;
            target.pending.release_point = None;
        }
    }
}
