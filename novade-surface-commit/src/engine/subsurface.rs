//! `wl_subcompositor` and `wl_subsurface` requests.
//!
//! Requests on a `wl_subsurface` whose surface is gone, or which no longer
//! holds the subsurface role, are ignored.

use tracing::{debug, trace};

use super::SurfaceEngine;
use crate::error::{EngineError, ProtocolError, Result};
use crate::geometry::Point;
use crate::role::{RoleKind, SurfaceRole};
use crate::subcompositor::{Placement, StackEntry, SubsurfaceRole, SubsurfaceSyncMode};
use crate::surface::SurfaceId;

impl SurfaceEngine {
    /// `wl_subcompositor.get_subsurface`.
    pub fn get_subsurface(&mut self, surface: SurfaceId, parent: SurfaceId) -> Result<()> {
        if !self.contains(parent) {
            return Err(EngineError::UnknownSurface(parent));
        }
        if surface == parent || self.is_ancestor(surface, parent) {
            return Err(ProtocolError::BadParent { surface, parent }.into());
        }
        let target = self.surface_mut(surface)?;
        if super::role_conflict(target, RoleKind::Subsurface).is_some() {
            return Err(ProtocolError::BadSubsurface { surface }.into());
        }
        target.role = SurfaceRole::Subsurface(SubsurfaceRole::new(parent));
        target.role_kind = Some(RoleKind::Subsurface);
        self.surface_mut(parent)?.stacking.push_top(surface);
        debug!(?surface, ?parent, "subsurface created");
        Ok(())
    }

    /// Whether `ancestor` is `id`'s parent, grandparent, and so on.
    fn is_ancestor(&self, ancestor: SurfaceId, id: SurfaceId) -> bool {
        let mut current = id;
        while let Some(role) = self
            .surfaces
            .get(&current)
            .and_then(|s| s.role.as_subsurface())
        {
            if role.parent == ancestor {
                return true;
            }
            current = role.parent;
        }
        false
    }

    /// `wl_subsurface.set_position`; takes effect when the parent applies.
    pub fn set_subsurface_position(&mut self, surface: SurfaceId, position: Point) {
        if let Some(role) = self.subsurface_role(surface) {
            role.pending_position = Some(position);
        }
    }

    pub fn place_above(&mut self, surface: SurfaceId, sibling: SurfaceId) -> Result<()> {
        self.place(surface, sibling, Placement::Above)
    }

    pub fn place_below(&mut self, surface: SurfaceId, sibling: SurfaceId) -> Result<()> {
        self.place(surface, sibling, Placement::Below)
    }

    fn place(&mut self, surface: SurfaceId, sibling: SurfaceId, placement: Placement) -> Result<()> {
        let Some(parent) = self.subsurface_role(surface).map(|role| role.parent) else {
            return Ok(());
        };
        let entry = if sibling == parent {
            StackEntry::Parent
        } else {
            StackEntry::Child(sibling)
        };
        let Some(parent_surface) = self.surfaces.get_mut(&parent) else {
            trace!(?surface, "restacking a subsurface whose parent is gone");
            return Ok(());
        };
        if !parent_surface.stacking.place(surface, entry, placement) {
            return Err(ProtocolError::BadSibling { surface, sibling }.into());
        }
        Ok(())
    }

    pub fn set_sync(&mut self, surface: SurfaceId) {
        if let Some(role) = self.subsurface_role(surface) {
            role.sync_mode = SubsurfaceSyncMode::Synchronized;
        }
    }

    /// Switches to desynchronized mode. State already cached stays cached
    /// until the parent applies or the surface commits again.
    pub fn set_desync(&mut self, surface: SurfaceId) {
        if let Some(role) = self.subsurface_role(surface) {
            role.sync_mode = SubsurfaceSyncMode::Desynchronized;
        }
    }

    /// `wl_subsurface.destroy`: the surface loses its role and unmaps at
    /// once. It keeps the subsurface role kind.
    pub fn destroy_subsurface(&mut self, surface: SurfaceId) {
        let Some(target) = self
            .surfaces
            .get_mut(&surface)
            .filter(|s| matches!(s.role, SurfaceRole::Subsurface(_)))
        else {
            return;
        };
        let SurfaceRole::Subsurface(mut role) = std::mem::take(&mut target.role) else {
            return;
        };
        target.stream.unmap();
        target.current_buffer = None;
        target.buffer_size = None;
        if let Some(cached) = role.cached.take() {
            self.discard_state(cached);
        }
        if let Some(parent) = self.surfaces.get_mut(&role.parent) {
            parent.stacking.remove(surface);
            self.refresh_surface_data(role.parent);
        }
        debug!(?surface, "subsurface role destroyed");
    }

    fn subsurface_role(&mut self, surface: SurfaceId) -> Option<&mut SubsurfaceRole> {
        self.surfaces
            .get_mut(&surface)
            .and_then(|s| s.role.as_subsurface_mut())
    }
}
