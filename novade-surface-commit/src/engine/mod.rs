//! The surface engine.
//!
//! [`SurfaceEngine`] owns every surface of one display in an id-keyed arena
//! and runs on the dispatch thread only. Parent, child, viewport and role
//! links are ids, checked against the arena every time they are followed.
//! Everything the engine needs from the outside world (allocation, streams,
//! fences, timers, cross-thread delivery) comes in through
//! [`EngineCollaborators`].

mod commit;
mod subsurface;
mod sync;
mod viewport;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use novade_buffer_handoff::{BufferAllocator, Executor};
use tracing::debug;

use crate::error::{EngineError, ProtocolError, Result};
use crate::explicit_sync::FenceMonitor;
use crate::frame_scheduler::{FrameCallbackScheduler, HeartbeatTimer, DEFAULT_FRAME_QUANTUM};
use crate::geometry::{Point, Rectangle, Transform};
use crate::pending::{BufferAttachment, FrameCallback, InputShapeUpdate, TrackedBuffer};
use crate::region::Region;
use crate::role::{RoleKind, SceneSurfaceRef, ShellRole, SurfaceRole};
use crate::stream::BufferStreamFactory;
use crate::subcompositor::StackEntry;
use crate::surface::{DestroyReason, StreamSpec, Surface, SurfaceData, SurfaceId};
use crate::viewport::{Viewport, ViewportId};

/// The external services the engine drives.
pub struct EngineCollaborators {
    pub allocator: Arc<dyn BufferAllocator>,
    /// Delivers release and consumption notifications back to the dispatch thread.
    pub executor: Arc<dyn Executor>,
    pub streams: Box<dyn BufferStreamFactory>,
    pub fence_monitor: Box<dyn FenceMonitor>,
    pub heartbeat: Box<dyn HeartbeatTimer>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Latency bound for frame callbacks that have no buffer attached.
    pub frame_quantum: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_quantum: DEFAULT_FRAME_QUANTUM,
        }
    }
}

pub struct SurfaceEngine {
    surfaces: HashMap<SurfaceId, Surface>,
    viewports: HashMap<ViewportId, Viewport>,
    allocator: Arc<dyn BufferAllocator>,
    executor: Arc<dyn Executor>,
    streams: Box<dyn BufferStreamFactory>,
    fence_monitor: Box<dyn FenceMonitor>,
    frame_scheduler: FrameCallbackScheduler,
    epoch: Instant,
}

impl SurfaceEngine {
    pub fn new(collaborators: EngineCollaborators, config: EngineConfig) -> Self {
        let EngineCollaborators {
            allocator,
            executor,
            streams,
            fence_monitor,
            heartbeat,
        } = collaborators;
        Self {
            surfaces: HashMap::new(),
            viewports: HashMap::new(),
            allocator,
            executor,
            streams,
            fence_monitor,
            frame_scheduler: FrameCallbackScheduler::new(config.frame_quantum, heartbeat),
            epoch: Instant::now(),
        }
    }

    pub fn surface(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    pub fn contains(&self, id: SurfaceId) -> bool {
        self.surfaces.contains_key(&id)
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    pub fn viewport(&self, id: ViewportId) -> Option<&Viewport> {
        self.viewports.get(&id)
    }

    fn surface_mut(&mut self, id: SurfaceId) -> Result<&mut Surface> {
        self.surfaces
            .get_mut(&id)
            .ok_or(EngineError::UnknownSurface(id))
    }

    /// Milliseconds since the engine started, wrapping as `wl_callback` does.
    fn now_ms(&self) -> u32 {
        timestamp_ms(self.epoch)
    }

    pub fn create_surface(&mut self) -> SurfaceId {
        let id = SurfaceId::new_unique();
        let stream = self.streams.create_stream(id);
        self.surfaces.insert(id, Surface::new(id, stream));
        debug!(surface = ?id, "surface created");
        id
    }

    /// Destroys a surface and everything it owns.
    ///
    /// A surface that still carries a subsurface role may only go away with
    /// its client; a healthy client destroying it first is a protocol
    /// violation and nothing is torn down.
    pub fn destroy_surface(&mut self, id: SurfaceId, reason: DestroyReason) -> Result<()> {
        let surface = self.surfaces.get(&id).ok_or(EngineError::UnknownSurface(id))?;
        if reason == DestroyReason::ClientRequest && matches!(surface.role, SurfaceRole::Subsurface(_)) {
            return Err(ProtocolError::DefunctRoleObject { surface: id }.into());
        }
        let Some(mut surface) = self.surfaces.remove(&id) else {
            return Err(EngineError::UnknownSurface(id));
        };

        if let SurfaceRole::Subsurface(role) = &mut surface.role {
            if let Some(parent) = self.surfaces.get_mut(&role.parent) {
                parent.stacking.remove(id);
            }
            if let Some(cached) = role.cached.take() {
                self.discard_state(cached);
            }
        }
        if let Some(wait) = surface.fence_wait.take() {
            self.fence_monitor.cancel(wait.watch);
            self.discard_state(wait.state);
        }
        self.frame_scheduler.forget(id);
        for viewport in self.viewports.values_mut() {
            if viewport.surface == Some(id) {
                viewport.surface = None;
            }
        }
        if let SurfaceRole::External(role) = &mut surface.role {
            role.surface_destroyed();
        }
        surface.stream.unmap();
        debug!(surface = ?id, ?reason, "surface destroyed");
        // Dropping the surface drops its stream and current buffer, which
        // hands the buffer back to the client.
        Ok(())
    }

    /// `wl_surface.attach`. `None` detaches.
    pub fn attach(&mut self, id: SurfaceId, buffer: Option<TrackedBuffer>) -> Result<()> {
        let surface = self.surface_mut(id)?;
        surface.pending.buffer = match buffer {
            Some(buffer) => BufferAttachment::Attach(buffer),
            None => BufferAttachment::Detach,
        };
        surface.touch();
        Ok(())
    }

    /// `wl_surface.frame`.
    pub fn frame(&mut self, id: SurfaceId, callback: Box<dyn FrameCallback>) -> Result<()> {
        let surface = self.surface_mut(id)?;
        surface.pending.frame_callbacks.push(callback);
        surface.touch();
        Ok(())
    }

    /// `wl_surface.set_input_region`. `None` restores the default of
    /// accepting input everywhere.
    pub fn set_input_region(&mut self, id: SurfaceId, region: Option<&Region>) -> Result<()> {
        let surface = self.surface_mut(id)?;
        surface.pending.input_shape = match region {
            Some(region) => InputShapeUpdate::Set(region.rectangles().to_vec()),
            None => InputShapeUpdate::Reset,
        };
        surface.touch();
        Ok(())
    }

    pub fn set_buffer_scale(&mut self, id: SurfaceId, scale: i32) -> Result<()> {
        let surface = self.surface_mut(id)?;
        if scale <= 0 {
            return Err(ProtocolError::InvalidScale { surface: id, scale }.into());
        }
        surface.pending.scale = Some(scale);
        surface.touch();
        Ok(())
    }

    pub fn set_buffer_transform(&mut self, id: SurfaceId, transform: i32) -> Result<()> {
        let surface = self.surface_mut(id)?;
        let Some(value) = Transform::from_wire(transform) else {
            return Err(ProtocolError::InvalidTransform { surface: id, transform }.into());
        };
        surface.pending.transform = Some(value);
        surface.touch();
        Ok(())
    }

    /// Sets the pending content offset (`wl_surface.offset`, or a shell
    /// role's window geometry).
    pub fn set_offset(&mut self, id: SurfaceId, offset: Point) -> Result<()> {
        let surface = self.surface_mut(id)?;
        surface.pending.offset = Some(offset);
        surface.touch();
        Ok(())
    }

    /// Gives a surface an external shell role.
    pub fn assign_role(&mut self, id: SurfaceId, role: Box<dyn ShellRole>) -> Result<()> {
        let kind = role.kind();
        let surface = self.surface_mut(id)?;
        if let Some(existing) = role_conflict(surface, kind) {
            return Err(ProtocolError::RoleAlreadyAssigned { surface: id, existing }.into());
        }
        surface.role = SurfaceRole::External(role);
        surface.role_kind = Some(kind);
        debug!(surface = ?id, ?kind, "role assigned");
        self.notify_scene_surface_listeners(id);
        Ok(())
    }

    /// Removes an external role. The surface keeps its role kind and may
    /// only ever take a role of that kind again.
    pub fn clear_role(&mut self, id: SurfaceId) -> Option<Box<dyn ShellRole>> {
        let surface = self.surfaces.get_mut(&id)?;
        match std::mem::take(&mut surface.role) {
            SurfaceRole::External(role) => Some(role),
            other => {
                surface.role = other;
                None
            }
        }
    }

    /// Runs `listener` once the surface has a presentable scene surface,
    /// immediately if it already has one.
    pub fn on_scene_surface_created(
        &mut self,
        id: SurfaceId,
        listener: impl FnOnce(&SceneSurfaceRef) + 'static,
    ) -> Result<()> {
        if let Some(scene) = self.scene_surface(id) {
            listener(&scene);
            return Ok(());
        }
        self.surface_mut(id)?
            .scene_surface_listeners
            .push(Box::new(listener));
        Ok(())
    }

    /// The presentable surface behind `id`; subsurfaces share their
    /// parent's.
    pub fn scene_surface(&self, id: SurfaceId) -> Option<SceneSurfaceRef> {
        let mut current = self.surfaces.get(&id)?;
        loop {
            match &current.role {
                SurfaceRole::Null => return None,
                SurfaceRole::External(role) => return role.scene_surface(),
                SurfaceRole::Subsurface(role) => current = self.surfaces.get(&role.parent)?,
            }
        }
    }

    fn notify_scene_surface_listeners(&mut self, id: SurfaceId) {
        let waiting = self
            .surfaces
            .get(&id)
            .is_some_and(|s| !s.scene_surface_listeners.is_empty());
        if !waiting {
            return;
        }
        let Some(scene) = self.scene_surface(id) else {
            return;
        };
        let listeners = match self.surfaces.get_mut(&id) {
            Some(surface) => std::mem::take(&mut surface.scene_surface_listeners),
            None => return,
        };
        for listener in listeners {
            listener(&scene);
        }
    }

    /// Whether commits to `id` are currently cached for a parent: its own
    /// mode is synchronized or any ancestor's is. A destroyed parent counts
    /// as desynchronized.
    pub fn is_synchronized(&self, id: SurfaceId) -> bool {
        let mut current = id;
        loop {
            let Some(role) = self
                .surfaces
                .get(&current)
                .and_then(|s| s.role.as_subsurface())
            else {
                return false;
            };
            if !self.surfaces.contains_key(&role.parent) {
                return false;
            }
            if role.sync_mode == crate::subcompositor::SubsurfaceSyncMode::Synchronized {
                return true;
            }
            current = role.parent;
        }
    }

    /// The surface's own offset plus the positions and offsets of every
    /// live ancestor.
    pub fn total_offset(&self, id: SurfaceId) -> Result<Point> {
        let mut current = self.surfaces.get(&id).ok_or(EngineError::UnknownSurface(id))?;
        let mut total = current.offset;
        while let Some(role) = current.role.as_subsurface() {
            total = total + role.position;
            match self.surfaces.get(&role.parent) {
                Some(parent) => {
                    total = total + parent.offset;
                    current = parent;
                }
                None => break,
            }
        }
        Ok(total)
    }

    /// Streams and input shape of the tree rooted at `root`, bottom to top.
    pub fn surface_data(&self, root: SurfaceId) -> Result<SurfaceData> {
        if !self.contains(root) {
            return Err(EngineError::UnknownSurface(root));
        }
        let mut data = SurfaceData::default();
        self.populate_surface_data(root, Point::ORIGIN, &mut data);
        Ok(data)
    }

    fn populate_surface_data(&self, id: SurfaceId, parent_offset: Point, data: &mut SurfaceData) {
        let Some(surface) = self.surfaces.get(&id) else {
            return;
        };
        let offset = parent_offset + surface.local_offset();
        for entry in surface.stacking.current() {
            match *entry {
                StackEntry::Parent => {
                    data.streams.push(StreamSpec { surface: id, offset });
                    let bounds = surface.bounds().translate(offset);
                    match &surface.input_shape {
                        None => data.input_shape.push(bounds),
                        Some(shape) if shape.is_empty() => {
                            data.input_shape.push(Rectangle::default());
                        }
                        Some(shape) => data.input_shape.extend(
                            shape
                                .iter()
                                .map(|rect| rect.translate(offset).intersection(&bounds)),
                        ),
                    }
                }
                StackEntry::Child(child) => self.populate_surface_data(child, offset, data),
            }
        }
    }

    /// The topmost surface in the tree rooted at `root` accepting input at
    /// `point` (root coordinates).
    pub fn surface_at(&self, root: SurfaceId, point: Point) -> Option<SurfaceId> {
        let surface = self.surfaces.get(&root)?;
        if !surface.is_mapped() {
            return None;
        }
        let local = point - surface.local_offset();
        for entry in surface.stacking.current().iter().rev() {
            match *entry {
                StackEntry::Child(child) => {
                    if let Some(hit) = self.surface_at(child, local) {
                        return Some(hit);
                    }
                }
                StackEntry::Parent => {
                    if surface.accepts_input_at(local) {
                        return Some(root);
                    }
                }
            }
        }
        None
    }

    /// The topmost ancestor reachable from `id` through live parents.
    fn root_of(&self, id: SurfaceId) -> SurfaceId {
        let mut current = id;
        while let Some(parent) = self
            .surfaces
            .get(&current)
            .and_then(|s| s.role.as_subsurface())
            .map(|role| role.parent)
            .filter(|parent| self.surfaces.contains_key(parent))
        {
            current = parent;
        }
        current
    }

    /// Hands fresh surface data for the tree containing `id` to the root's
    /// shell role, if it has one.
    fn refresh_surface_data(&mut self, id: SurfaceId) {
        let root = self.root_of(id);
        let has_shell_role = self
            .surfaces
            .get(&root)
            .is_some_and(|s| matches!(s.role, SurfaceRole::External(_)));
        if !has_shell_role {
            return;
        }
        let Ok(data) = self.surface_data(root) else {
            return;
        };
        if let Some(SurfaceRole::External(role)) = self.surfaces.get_mut(&root).map(|s| &mut s.role) {
            role.refresh_surface_data(&data);
        }
    }
}

/// The kind a surface is locked to, if assigning `kind` would conflict.
fn role_conflict(surface: &Surface, kind: RoleKind) -> Option<RoleKind> {
    if let Some(existing) = surface.role.kind() {
        return Some(existing);
    }
    surface.role_kind.filter(|existing| *existing != kind)
}

fn timestamp_ms(epoch: Instant) -> u32 {
    epoch.elapsed().as_millis() as u32
}
