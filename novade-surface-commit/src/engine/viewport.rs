//! `wp_viewporter` and `wp_viewport` requests.

use tracing::debug;

use super::SurfaceEngine;
use crate::error::{EngineError, ProtocolError, Result};
use crate::pending::ViewportChange;
use crate::surface::SurfaceId;
use crate::viewport::{Viewport, ViewportId};

impl SurfaceEngine {
    /// `wp_viewporter.get_viewport`. The association takes effect on the
    /// next commit.
    pub fn create_viewport(&mut self, surface: SurfaceId) -> Result<ViewportId> {
        let target = self
            .surfaces
            .get_mut(&surface)
            .ok_or(EngineError::UnknownSurface(surface))?;
        let has_current = target
            .viewport
            .is_some_and(|id| self.viewports.contains_key(&id));
        let pending = target.pending.viewport;
        let has_pending = matches!(pending, Some(ViewportChange::Associate(_)));
        let dissociating = pending == Some(ViewportChange::Dissociate);
        if has_pending || (has_current && !dissociating) {
            return Err(ProtocolError::ViewportExists { surface }.into());
        }

        let id = ViewportId::new_unique();
        self.viewports.insert(id, Viewport::new(surface));
        target.pending.viewport = Some(ViewportChange::Associate(id));
        target.touch();
        debug!(?surface, viewport = ?id, "viewport created");
        Ok(id)
    }

    pub fn set_viewport_source(
        &mut self,
        viewport: ViewportId,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Result<()> {
        let surface = self.live_viewport_surface(viewport)?;
        self.viewports
            .get_mut(&viewport)
            .ok_or(EngineError::UnknownViewport(viewport))?
            .set_source(x, y, width, height)
            .map_err(|_| ProtocolError::ViewportBadValue { viewport, what: "source" })?;
        self.surface_mut(surface)?.touch();
        Ok(())
    }

    pub fn set_viewport_destination(&mut self, viewport: ViewportId, width: i32, height: i32) -> Result<()> {
        let surface = self.live_viewport_surface(viewport)?;
        self.viewports
            .get_mut(&viewport)
            .ok_or(EngineError::UnknownViewport(viewport))?
            .set_destination(width, height)
            .map_err(|_| ProtocolError::ViewportBadValue { viewport, what: "destination" })?;
        self.surface_mut(surface)?.touch();
        Ok(())
    }

    /// `wp_viewport.destroy`. The surface drops its crop and scale on the
    /// next commit.
    pub fn destroy_viewport(&mut self, viewport: ViewportId) {
        let Some(removed) = self.viewports.remove(&viewport) else {
            return;
        };
        let Some(target) = removed.surface.and_then(|s| self.surfaces.get_mut(&s)) else {
            return;
        };
        let associated = target.viewport == Some(viewport)
            || target.pending.viewport == Some(ViewportChange::Associate(viewport));
        if associated {
            target.pending.viewport = Some(ViewportChange::Dissociate);
            target.touch();
        }
    }

    fn live_viewport_surface(&self, viewport: ViewportId) -> Result<SurfaceId> {
        let state = self
            .viewports
            .get(&viewport)
            .ok_or(EngineError::UnknownViewport(viewport))?;
        state
            .surface
            .filter(|surface| self.contains(*surface))
            .ok_or_else(|| ProtocolError::ViewportNoSurface { viewport }.into())
    }
}
