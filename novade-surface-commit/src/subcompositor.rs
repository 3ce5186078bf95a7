//! # Subcompositor Logic
//!
//! State for `wl_subsurface` roles and the stacking order of a parent's
//! children. The engine drives these types; this module holds no reference
//! to any other surface. The parent is named by id and re-validated by the
//! caller every time it is used, since either side may be destroyed out of
//! band.

use crate::geometry::Point;
use crate::pending::PendingState;
use crate::surface::SurfaceId;

/// Defines the synchronization behavior of a subsurface relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubsurfaceSyncMode {
    /// The subsurface's state is cached upon its own commit and applied only when
    /// its parent surface's state is applied. This is the default mode.
    #[default]
    Synchronized,
    /// The subsurface's state is applied independently of its parent's commit cycle.
    /// Changes become visible once its own `wl_surface.commit` is processed.
    Desynchronized,
}

/// Holds the state specific to a surface when it acts as a subsurface.
#[derive(Debug)]
pub struct SubsurfaceRole {
    /// The `SurfaceId` of the parent surface. May refer to a destroyed surface.
    pub(crate) parent: SurfaceId,
    pub(crate) sync_mode: SubsurfaceSyncMode,
    /// State committed while synchronized, waiting for the parent.
    pub(crate) cached: Option<PendingState>,
    /// Position relative to the parent, as last applied.
    pub(crate) position: Point,
    /// Set by `wl_subsurface.set_position`, applied on the parent's commit.
    pub(crate) pending_position: Option<Point>,
}

impl SubsurfaceRole {
    /// Creates a new synchronized `SubsurfaceRole` associated with a parent surface.
    ///
    /// # Arguments
    /// * `parent`: The `SurfaceId` of the surface that will be the parent.
    pub fn new(parent: SurfaceId) -> Self {
        Self {
            parent,
            sync_mode: SubsurfaceSyncMode::default(),
            cached: None,
            position: Point::ORIGIN,
            pending_position: None,
        }
    }

    pub fn parent(&self) -> SurfaceId {
        self.parent
    }

    pub fn sync_mode(&self) -> SubsurfaceSyncMode {
        self.sync_mode
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn has_cached_state(&self) -> bool {
        self.cached.is_some()
    }

    /// Merges a commit into the cached state.
    pub(crate) fn cache(&mut self, state: PendingState) {
        match self.cached.as_mut() {
            Some(cached) => cached.merge(state),
            None => self.cached = Some(state),
        }
    }
}

/// One slot in a parent's stacking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEntry {
    /// The parent's own content.
    Parent,
    Child(SurfaceId),
}

/// Where to place a child relative to a sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Above,
    Below,
}

/// The stacking order of a surface's children, bottom to top.
///
/// Reorders made through [`Stacking::place`] are pending until the parent's
/// state is applied. Additions and removals take effect in both orders at
/// once.
#[derive(Debug, Clone)]
pub struct Stacking {
    current: Vec<StackEntry>,
    pending: Option<Vec<StackEntry>>,
}

impl Default for Stacking {
    fn default() -> Self {
        Self {
            current: vec![StackEntry::Parent],
            pending: None,
        }
    }
}

impl Stacking {
    pub fn current(&self) -> &[StackEntry] {
        &self.current
    }

    pub fn children(&self) -> impl Iterator<Item = SurfaceId> + '_ {
        self.current.iter().filter_map(|entry| match entry {
            StackEntry::Child(id) => Some(*id),
            StackEntry::Parent => None,
        })
    }

    pub fn contains(&self, child: SurfaceId) -> bool {
        self.current.contains(&StackEntry::Child(child))
    }

    /// Adds a new child on top of its siblings and the parent.
    pub fn push_top(&mut self, child: SurfaceId) {
        if self.contains(child) {
            tracing::warn!(?child, "subsurface added to the same parent twice");
            return;
        }
        self.current.push(StackEntry::Child(child));
        if let Some(pending) = self.pending.as_mut() {
            pending.push(StackEntry::Child(child));
        }
    }

    pub fn remove(&mut self, child: SurfaceId) {
        let entry = StackEntry::Child(child);
        self.current.retain(|e| *e != entry);
        if let Some(pending) = self.pending.as_mut() {
            pending.retain(|e| *e != entry);
        }
    }

    /// Moves `child` directly above or below `sibling` in the pending order.
    ///
    /// # Returns
    /// `false` if either entry is not part of this stack; the order is left
    /// untouched in that case.
    pub fn place(&mut self, child: SurfaceId, sibling: StackEntry, placement: Placement) -> bool {
        let entry = StackEntry::Child(child);
        if entry == sibling {
            return false;
        }
        let pending = self.pending.get_or_insert_with(|| self.current.clone());
        let Some(from) = pending.iter().position(|e| *e == entry) else {
            return false;
        };
        if !pending.contains(&sibling) {
            return false;
        }
        pending.remove(from);
        let Some(anchor) = pending.iter().position(|e| *e == sibling) else {
            return false;
        };
        let to = match placement {
            Placement::Above => anchor + 1,
            Placement::Below => anchor,
        };
        pending.insert(to, entry);
        true
    }

    /// Makes the pending order current. Returns whether anything changed.
    pub fn apply_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) if pending != self.current => {
                self.current = pending;
                true
            }
            _ => false,
        }
    }
}
