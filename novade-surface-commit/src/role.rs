//! Surface roles.
//!
//! A surface has exactly one role at a time, taken from a closed set: the
//! null placeholder, a subsurface, or an external shell role supplied by
//! window-management code through [`ShellRole`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::geometry::{Point, Size, Transform};
use crate::subcompositor::SubsurfaceRole;
use crate::surface::{SurfaceData, SurfaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Subsurface,
    /// A shell role, named by its protocol interface (e.g. `xdg_toplevel`).
    Shell(&'static str),
}

/// An opaque presentable surface produced by the scene.
#[derive(Clone)]
pub struct SceneSurfaceRef(pub Arc<dyn Any + Send + Sync>);

impl SceneSurfaceRef {
    pub fn ptr_eq(&self, other: &SceneSurfaceRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SceneSurfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SceneSurfaceRef")
            .field(&Arc::as_ptr(&self.0))
            .finish()
    }
}

/// The applied state of a surface, as handed to its role after a commit.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSnapshot {
    pub surface: SurfaceId,
    pub buffer_size: Option<Size>,
    pub offset: Point,
    pub scale: i32,
    pub transform: Transform,
}

/// A role implemented outside the engine (toplevel, popup, layer).
pub trait ShellRole: fmt::Debug {
    fn kind(&self) -> RoleKind;

    /// Called after every applied commit of the surface.
    fn committed(&mut self, snapshot: &SurfaceSnapshot);

    /// The presentable surface, once the role has created one.
    fn scene_surface(&self) -> Option<SceneSurfaceRef>;

    /// The surface tree's streams or input shape changed.
    fn refresh_surface_data(&mut self, _data: &SurfaceData) {}

    fn surface_destroyed(&mut self) {}
}

#[derive(Debug, Default)]
pub enum SurfaceRole {
    #[default]
    Null,
    Subsurface(SubsurfaceRole),
    External(Box<dyn ShellRole>),
}

impl SurfaceRole {
    pub fn kind(&self) -> Option<RoleKind> {
        match self {
            SurfaceRole::Null => None,
            SurfaceRole::Subsurface(_) => Some(RoleKind::Subsurface),
            SurfaceRole::External(role) => Some(role.kind()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SurfaceRole::Null)
    }

    pub fn as_subsurface(&self) -> Option<&SubsurfaceRole> {
        match self {
            SurfaceRole::Subsurface(role) => Some(role),
            _ => None,
        }
    }

    pub fn as_subsurface_mut(&mut self) -> Option<&mut SubsurfaceRole> {
        match self {
            SurfaceRole::Subsurface(role) => Some(role),
            _ => None,
        }
    }
}
