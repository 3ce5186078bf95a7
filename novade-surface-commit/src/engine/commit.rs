//! The commit pipeline.
//!
//! `commit` validates and snapshots the pending state, parks it on an
//! acquire point if it carries one, and otherwise completes it: cached for
//! the parent when the surface is effectively synchronized, applied
//! otherwise. Applying a surface flushes the cached state of its children.

use std::sync::Arc;
use std::time::Instant;

use novade_buffer_handoff::{
    CommittedBuffer, Completion, Executor, ReleasePoint, RenderBuffer,
};
use tracing::{debug, trace, warn};

use super::{timestamp_ms, SurfaceEngine};
use crate::error::{EngineError, ProtocolError, Result};
use crate::explicit_sync::{validate_points, FenceWait, FenceWatchId};
use crate::geometry::{RectangleF, Size};
use crate::pending::{
    BufferAttachment, FrameCallback, InputShapeUpdate, PendingState, TrackedBuffer, ViewportChange,
};
use crate::role::{SurfaceRole, SurfaceSnapshot};
use crate::surface::{CommitPhase, SurfaceId};
use crate::viewport::{ResolveError, ViewportId};

impl SurfaceEngine {
    /// `wl_surface.commit`.
    pub fn commit(&mut self, id: SurfaceId) -> Result<()> {
        let surface = self.surface_mut(id)?;
        validate_points(id, &surface.pending, surface.sync_attached)?;

        if surface.pending.offset == Some(surface.offset) {
            surface.pending.offset = None;
        }
        let same_shape = match (&surface.pending.input_shape, &surface.input_shape) {
            (InputShapeUpdate::Reset, None) => true,
            (InputShapeUpdate::Set(new), Some(current)) => new == current,
            _ => false,
        };
        if same_shape {
            surface.pending.input_shape = InputShapeUpdate::Unchanged;
        }

        let mut state = std::mem::take(&mut surface.pending);
        let superseded = surface.fence_wait.take();
        surface.phase = CommitPhase::Idle;

        if let Some(wait) = superseded {
            debug!(surface = ?id, "commit supersedes a state waiting on its acquire point");
            self.fence_monitor.cancel(wait.watch);
            let mut older = wait.state;
            let (buffer, release_point) = older.take_buffer();
            release_now(buffer, release_point);
            older.merge(state);
            state = older;
        }

        if let Some(acquire) = state.acquire_point.clone() {
            let watch = FenceWatchId::new_unique();
            if let Err(err) = self.fence_monitor.watch(id, watch, &acquire) {
                warn!(surface = ?id, error = %err, "failed to wait on acquire point");
                self.discard_state(state);
                return Err(err.into());
            }
            trace!(surface = ?id, point = acquire.0.point, "commit waiting on acquire point");
            let surface = self.surface_mut(id)?;
            surface.fence_wait = Some(FenceWait { watch, state });
            surface.phase = CommitPhase::WaitingOnFence;
            return Ok(());
        }

        self.complete_commit(id, state)
    }

    /// Resumes a commit whose acquire point has signalled. Stale watches,
    /// superseded or belonging to a destroyed surface, are ignored.
    pub fn acquire_fence_signalled(&mut self, id: SurfaceId, watch: FenceWatchId) -> Result<()> {
        let Some(surface) = self.surfaces.get_mut(&id) else {
            trace!(surface = ?id, "acquire point signalled for a destroyed surface");
            return Ok(());
        };
        let wait = match surface.fence_wait.take() {
            Some(wait) if wait.watch == watch => wait,
            other => {
                surface.fence_wait = other;
                trace!(surface = ?id, ?watch, "ignoring superseded acquire point");
                return Ok(());
            }
        };
        surface.phase = if surface.pending.is_empty() {
            CommitPhase::Idle
        } else {
            CommitPhase::Accumulating
        };
        self.fence_monitor.completed(watch);
        self.complete_commit(id, wait.state)
    }

    fn complete_commit(&mut self, id: SurfaceId, state: PendingState) -> Result<()> {
        let synchronized = self.is_synchronized(id);
        let surface = self.surface_mut(id)?;

        let state = match surface.role.as_subsurface_mut() {
            Some(role) if synchronized => {
                trace!(surface = ?id, "caching commit until the parent applies");
                role.cache(state);
                return Ok(());
            }
            Some(role) => match role.cached.take() {
                Some(mut cached) => {
                    cached.merge(state);
                    cached
                }
                None => state,
            },
            None => state,
        };

        self.apply_state(id, state)?;

        if let Some(surface) = self.surfaces.get_mut(&id) {
            if let SurfaceRole::External(role) = &mut surface.role {
                let snapshot = SurfaceSnapshot {
                    surface: id,
                    buffer_size: surface.buffer_size,
                    offset: surface.offset,
                    scale: surface.scale,
                    transform: surface.transform,
                };
                role.committed(&snapshot);
            }
        }
        self.notify_scene_surface_listeners(id);
        Ok(())
    }

    /// Makes `state` the current state of `id`.
    ///
    /// Everything that can fail (allocation, viewport resolution) runs
    /// before the surface is touched, so a failed apply leaves the previous
    /// state in place.
    pub(super) fn apply_state(&mut self, id: SurfaceId, mut state: PendingState) -> Result<()> {
        let surface = self.surfaces.get(&id).ok_or(EngineError::UnknownSurface(id))?;

        let scale = state.scale.unwrap_or(surface.scale);
        let transform = state.transform.unwrap_or(surface.transform);
        let viewport_id = match state.viewport {
            Some(ViewportChange::Associate(viewport)) => Some(viewport),
            Some(ViewportChange::Dissociate) => None,
            None => surface.viewport,
        }
        .filter(|viewport| self.viewports.contains_key(viewport));
        let viewport_dirty = viewport_id
            .and_then(|viewport| self.viewports.get(&viewport))
            .is_some_and(|viewport| viewport.is_dirty());
        let viewport_changed = viewport_id != surface.viewport;

        let mut unmap = false;
        let mut incoming: Option<(TrackedBuffer, Arc<dyn RenderBuffer>)> = None;
        match &state.buffer {
            BufferAttachment::Unchanged => {}
            BufferAttachment::Detach => unmap = true,
            BufferAttachment::Attach(tracked) => match tracked.get() {
                Some(client) => {
                    let render = self.allocator.buffer_from_resource(client)?;
                    incoming = Some((tracked.clone(), render));
                }
                None => {
                    debug!(surface = ?id, "attached buffer was destroyed before commit");
                    unmap = true;
                }
            },
        }

        let needs_submission = incoming.is_some()
            || state.scale.is_some()
            || state.transform.is_some()
            || viewport_changed
            || viewport_dirty;
        let geometry = match (&incoming, &surface.current_buffer) {
            _ if unmap || !needs_submission => None,
            (Some((_, render)), _) => Some(render.dimensions()),
            (None, Some(current)) => Some(current.buffer().dimensions()),
            (None, None) => None,
        }
        .map(|(width, height)| {
            let pixels = transform.apply_to_size(Size::new(width, height));
            self.resolve_geometry(viewport_id, scale, pixels)
        })
        .transpose()?;

        let now = self.epoch;
        let callbacks = state.take_frame_callbacks();
        let mut invalidated = state.needs_surface_data_refresh();
        let executor = self.executor.clone();

        let surface = self.surface_mut(id)?;
        if let Some(offset) = state.offset {
            surface.offset = offset;
        }
        match std::mem::take(&mut state.input_shape) {
            InputShapeUpdate::Unchanged => {}
            InputShapeUpdate::Reset => surface.input_shape = None,
            InputShapeUpdate::Set(shape) => surface.input_shape = Some(shape),
        }
        surface.scale = scale;
        surface.transform = transform;
        surface.viewport = viewport_id;

        if unmap {
            surface.stream.unmap();
            surface.current_buffer = None;
            invalidated |= surface.buffer_size.take().is_some();
            let timestamp = timestamp_ms(now);
            for callback in surface.frame_callbacks.drain(..).chain(callbacks) {
                callback.done(timestamp);
            }
            self.frame_scheduler.forget(id);
        } else if let Some((tracked, render)) = incoming {
            let release_point = state.release_point.take();
            let committed = CommittedBuffer::new(
                render,
                consumed_completion(executor.clone(), now, callbacks),
                release_completion(executor, tracked, release_point),
            );
            surface.current_buffer = Some(Arc::new(committed));
        } else if !callbacks.is_empty() {
            surface.frame_callbacks.extend(callbacks);
            if let Err(err) = self.frame_scheduler.request(id) {
                warn!(surface = ?id, error = %err, "failed to arm the frame heartbeat");
            }
        }

        let surface = self.surface_mut(id)?;
        if let (Some((source, logical)), Some(current)) = (geometry, surface.current_buffer.clone()) {
            surface.stream.submit_buffer(current, logical, source);
            if surface.buffer_size != Some(logical) {
                invalidated = true;
            }
            surface.buffer_size = Some(logical);
        }
        invalidated |= surface.stacking.apply_pending();
        let children: Vec<SurfaceId> = surface.stacking.children().collect();

        if let Some(viewport) = viewport_id.and_then(|v| self.viewports.get_mut(&v)) {
            viewport.take_dirty();
        }

        for child in children {
            invalidated |= self.parent_has_committed(child)?;
        }

        if invalidated {
            self.refresh_surface_data(id);
        }
        Ok(())
    }

    /// Applies what a child was holding for its parent. Returns whether the
    /// child moved.
    fn parent_has_committed(&mut self, child: SurfaceId) -> Result<bool> {
        let Some(role) = self
            .surfaces
            .get_mut(&child)
            .and_then(|s| s.role.as_subsurface_mut())
        else {
            return Ok(false);
        };
        let moved = match role.pending_position.take() {
            Some(position) if position != role.position => {
                role.position = position;
                true
            }
            _ => false,
        };
        if let Some(cached) = role.cached.take() {
            trace!(surface = ?child, "applying cached subsurface state");
            self.apply_state(child, cached)?;
            self.notify_scene_surface_listeners(child);
        }
        Ok(moved)
    }

    fn resolve_geometry(
        &self,
        viewport_id: Option<ViewportId>,
        scale: i32,
        pixels: Size,
    ) -> Result<(RectangleF, Size), ProtocolError> {
        match viewport_id.and_then(|id| self.viewports.get(&id).map(|v| (id, v))) {
            Some((id, viewport)) => viewport.resolve(scale, pixels).map_err(|err| match err {
                ResolveError::BadSize => ProtocolError::ViewportBadSize { viewport: id },
                ResolveError::OutOfBuffer => ProtocolError::ViewportOutOfBuffer { viewport: id },
            }),
            None => {
                let scale = scale.max(1);
                Ok((
                    RectangleF::from_size(pixels),
                    Size::new(pixels.width / scale, pixels.height / scale),
                ))
            }
        }
    }

    /// Drops a committed state that will never be applied, returning its
    /// buffer and answering its frame callbacks.
    pub(super) fn discard_state(&mut self, mut state: PendingState) {
        let (buffer, release_point) = state.take_buffer();
        release_now(buffer, release_point);
        let timestamp = self.now_ms();
        for callback in state.take_frame_callbacks() {
            callback.done(timestamp);
        }
    }

    /// Answers the callbacks of every surface in the heartbeat batch. Called
    /// by the event loop when the heartbeat timer fires.
    pub fn dispatch_frame_batch(&mut self) -> usize {
        let timestamp = self.now_ms();
        let mut sent = 0;
        for id in self.frame_scheduler.take_batch() {
            let Some(surface) = self.surfaces.get_mut(&id) else {
                continue;
            };
            for callback in surface.frame_callbacks.drain(..) {
                callback.done(timestamp);
                sent += 1;
            }
        }
        sent
    }
}

/// Returns a buffer that never reached the renderer, on the dispatch thread.
fn release_now(buffer: BufferAttachment, release_point: Option<ReleasePoint>) {
    let BufferAttachment::Attach(tracked) = buffer else {
        return;
    };
    match release_point {
        Some(point) => signal_release(&point),
        None => {
            if let Some(buffer) = tracked.get() {
                buffer.release();
            }
        }
    }
}

fn signal_release(point: &ReleasePoint) {
    if let Err(err) = point.signal() {
        warn!(point = point.0.point, error = %err, "failed to signal release point");
    }
}

fn consumed_completion(
    executor: Arc<dyn Executor>,
    epoch: Instant,
    callbacks: Vec<Box<dyn FrameCallback>>,
) -> Completion {
    Box::new(move || {
        if callbacks.is_empty() {
            return;
        }
        executor.spawn(Box::new(move || {
            let timestamp = timestamp_ms(epoch);
            for callback in callbacks {
                callback.done(timestamp);
            }
        }));
    })
}

fn release_completion(
    executor: Arc<dyn Executor>,
    tracked: TrackedBuffer,
    release_point: Option<ReleasePoint>,
) -> Completion {
    Box::new(move || {
        executor.spawn(Box::new(move || match release_point {
            Some(point) => signal_release(&point),
            None => {
                if let Some(buffer) = tracked.get() {
                    buffer.release();
                }
            }
        }));
    })
}
