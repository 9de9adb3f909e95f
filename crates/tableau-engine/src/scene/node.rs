use crate::coords::{Matrix2D, Rect, Vec2};

use super::NodeKind;

slotmap::new_key_type! {
    /// Handle to a node owned by a [`Level`](super::Level).
    pub struct NodeId;
}

/// Freshness of one cached quantity.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CacheState {
    Clean,
    Dirty,
}

/// Wraps an angle in degrees into `[0, 360)`. Non-finite input becomes 0.
pub fn normalize_rotation(degrees: f32) -> f32 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let r = degrees.rem_euclid(360.0);
    // Tiny negative inputs round up to exactly 360.
    if r >= 360.0 { 0.0 } else { r }
}

/// One node of the transform hierarchy.
///
/// Fields are only reachable through [`Level`](super::Level), which keeps the
/// cached world values consistent with the local ones.
#[derive(Debug)]
pub struct SceneNode {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,

    pub(crate) local_position: Vec2,
    pub(crate) local_rotation: f32,
    pub(crate) local_scale: Vec2,
    /// Pivot as a fraction of the local bounds.
    pub(crate) origin: Vec2,

    pub(crate) world_position: Vec2,
    pub(crate) world_rotation: f32,
    pub(crate) world_scale: Vec2,
    pub(crate) up: Vec2,
    pub(crate) right: Vec2,

    pub(crate) local_matrix: Matrix2D,
    pub(crate) world_matrix: Matrix2D,
    pub(crate) inverse_world_matrix: Matrix2D,
    pub(crate) world_state: CacheState,
    pub(crate) inverse_state: CacheState,

    pub(crate) immutable: bool,
    pub(crate) pending_destruction: bool,
    pub(crate) kind: NodeKind,
}

impl SceneNode {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            local_position: Vec2::ZERO,
            local_rotation: 0.0,
            local_scale: Vec2::ONE,
            origin: Vec2::ZERO,
            world_position: Vec2::ZERO,
            world_rotation: 0.0,
            world_scale: Vec2::ONE,
            up: Vec2::new(0.0, -1.0),
            right: Vec2::new(1.0, 0.0),
            local_matrix: Matrix2D::IDENTITY,
            world_matrix: Matrix2D::IDENTITY,
            inverse_world_matrix: Matrix2D::IDENTITY,
            world_state: CacheState::Dirty,
            inverse_state: CacheState::Dirty,
            immutable: false,
            pending_destruction: false,
            kind,
        }
    }

    #[inline]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[inline]
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    #[inline]
    pub fn is_pending_destruction(&self) -> bool {
        self.pending_destruction
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.world_state == CacheState::Dirty || self.inverse_state == CacheState::Dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.world_state = CacheState::Dirty;
        self.inverse_state = CacheState::Dirty;
    }

    pub(crate) fn local_bounds(&self) -> Rect {
        self.kind.local_bounds()
    }

    /// Origin fraction resolved to local pixels.
    pub(crate) fn absolute_origin(&self) -> Vec2 {
        let bounds = self.local_bounds();
        bounds.origin + bounds.size.mul_elements(self.origin)
    }
}
