use slotmap::SlotMap;

use crate::coords::{Matrix2D, Rect, Vec2};

use super::{normalize_rotation, CacheState, Drawable, NodeId, NodeKind, SceneError, SceneNode, View};

/// Arena-owned transform hierarchy plus the views that look at it.
///
/// Every node except the root has exactly one parent for as long as it is
/// alive. World-space values are cached per node and recomputed lazily: a
/// setter only marks the node dirty, the next read walks the dirty ancestor
/// chain top-down and brings it up to date.
///
/// # Panics
///
/// Per-node getters and setters index the arena directly and panic on a
/// stale [`NodeId`]. Structural operations (`set_parent`, `spawn_child`, ...)
/// report stale ids as [`SceneError::UnknownNode`] instead.
#[derive(Debug)]
pub struct Level {
    nodes: SlotMap<NodeId, SceneNode>,
    root: NodeId,
    default_view: NodeId,
    active_view: NodeId,

    /// Drawable nodes in registration order.
    drawables: Vec<NodeId>,
    pending_destroy: Vec<NodeId>,
}

impl Level {
    /// Creates a level with an immutable root and an immutable default view
    /// covering `(0, 0)..view_size` in world pixels.
    pub fn new(view_size: Vec2) -> Self {
        let mut nodes = SlotMap::with_key();

        let mut root = SceneNode::new(NodeKind::Plain);
        root.immutable = true;
        let root = nodes.insert(root);

        let mut view = SceneNode::new(NodeKind::View(View::new(view_size)));
        view.immutable = true;
        view.parent = Some(root);
        view.origin = Vec2::splat(0.5);
        view.local_position = view_size * 0.5;
        let default_view = nodes.insert(view);
        nodes[root].children.push(default_view);

        Self {
            nodes,
            root,
            default_view,
            active_view: default_view,
            drawables: Vec::new(),
            pending_destroy: Vec::new(),
        }
    }

    // ── structure ───────────────────────────────────────────────────────────

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn default_view(&self) -> NodeId {
        self.default_view
    }

    #[inline]
    pub fn active_view(&self) -> NodeId {
        self.active_view
    }

    /// Live nodes, including the root, the default view and nodes pending destruction.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Drawable nodes in registration (submission) order.
    #[inline]
    pub fn drawables(&self) -> &[NodeId] {
        &self.drawables
    }

    /// `true` if `ancestor` appears on the parent chain of `id` (not `id` itself).
    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.parent(p);
        }
        false
    }

    /// Spawns a node under the root.
    pub fn spawn(&mut self, kind: impl Into<NodeKind>) -> NodeId {
        let root = self.root;
        self.attach_new(root, kind.into())
    }

    pub fn spawn_child(&mut self, parent: NodeId, kind: impl Into<NodeKind>) -> Result<NodeId, SceneError> {
        let p = self.nodes.get(parent).ok_or(SceneError::UnknownNode)?;
        if p.pending_destruction {
            return Err(SceneError::PendingDestruction);
        }
        Ok(self.attach_new(parent, kind.into()))
    }

    fn attach_new(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let is_drawable = matches!(kind, NodeKind::Drawable(_));
        let mut node = SceneNode::new(kind);
        node.parent = Some(parent);
        let id = self.nodes.insert(node);
        self.nodes[parent].children.push(id);
        if is_drawable {
            self.drawables.push(id);
        }
        log::trace!("spawned node {id:?} under {parent:?}");
        id
    }

    /// Moves `id` under `new_parent` without changing its world pose.
    ///
    /// If `new_parent` currently sits below `id`, the direct children of `id`
    /// are first handed to its old parent so no cycle can form.
    pub fn set_parent(&mut self, id: NodeId, new_parent: NodeId) -> Result<(), SceneError> {
        let node = self.nodes.get(id).ok_or(SceneError::UnknownNode)?;
        let target = self.nodes.get(new_parent).ok_or(SceneError::UnknownNode)?;

        if id == new_parent {
            return Err(SceneError::SelfParent);
        }
        if node.parent == Some(new_parent) {
            return Ok(());
        }
        if node.immutable {
            return Err(SceneError::Immutable);
        }
        if node.pending_destruction || target.pending_destruction {
            return Err(SceneError::PendingDestruction);
        }
        let old_parent = node.parent.ok_or(SceneError::Detached)?;

        if self.is_descendant_of(new_parent, id) {
            let children: Vec<NodeId> = self.nodes[id]
                .children
                .iter()
                .copied()
                .filter(|c| !self.nodes[*c].pending_destruction)
                .collect();
            for child in children {
                self.set_parent(child, old_parent)?;
            }
        }

        // Roll up into world space.
        self.ensure_clean(id);
        let (world_position, world_rotation, world_scale) = {
            let n = &self.nodes[id];
            (n.world_position, n.world_rotation, n.world_scale)
        };

        self.nodes[old_parent].children.retain(|c| *c != id);

        // Roll down into the new parent's space.
        self.ensure_clean(new_parent);
        let (local_position, local_rotation, local_scale) = {
            let p = &self.nodes[new_parent];
            (
                p.inverse_world_matrix.transform_point(world_position),
                normalize_rotation(world_rotation - p.world_rotation),
                Matrix2D::from_scale(p.world_scale).inverse().transform_point(world_scale),
            )
        };

        self.nodes[new_parent].children.push(id);
        let node = &mut self.nodes[id];
        node.parent = Some(new_parent);
        node.local_position = local_position;
        node.local_rotation = local_rotation;
        node.local_scale = local_scale;
        node.mark_dirty();
        self.ensure_clean(id);

        log::debug!("reparented {id:?} from {old_parent:?} to {new_parent:?}");
        Ok(())
    }

    /// Re-attaches `id` to the root, keeping its world pose.
    pub fn unparent(&mut self, id: NodeId) -> Result<(), SceneError> {
        self.set_parent(id, self.root)
    }

    /// Pre-order walk from `start`, returning the number of visited nodes.
    ///
    /// Each child list is snapshotted before descending, so `action` may
    /// reparent or destroy nodes; nodes moved into an already-visited part of
    /// the tree are not revisited.
    pub fn do_recursive<F>(&mut self, start: NodeId, include_self: bool, mut action: F) -> usize
    where
        F: FnMut(&mut Level, NodeId),
    {
        self.visit(start, include_self, &mut action)
    }

    fn visit<F>(&mut self, id: NodeId, include_self: bool, action: &mut F) -> usize
    where
        F: FnMut(&mut Level, NodeId),
    {
        if !self.nodes.contains_key(id) {
            return 0;
        }

        let mut visited = 0;
        if include_self {
            action(self, id);
            visited += 1;
        }

        let children = match self.nodes.get(id) {
            Some(n) => n.children.clone(),
            None => return visited,
        };
        for child in children {
            visited += self.visit(child, true, action);
        }
        visited
    }

    // ── destruction ─────────────────────────────────────────────────────────

    /// Queues `id` and its whole subtree for removal at the next
    /// [`sweep_destroyed`](Self::sweep_destroyed).
    pub fn destroy(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(id) else {
            log::warn!("destroy: unknown node {id:?}");
            return;
        };
        if node.immutable {
            log::warn!("destroy: ignoring immutable node {id:?}");
            return;
        }

        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            let node = &mut self.nodes[n];
            if !node.pending_destruction {
                node.pending_destruction = true;
                self.pending_destroy.push(n);
            }
            stack.extend(node.children.iter().copied());
        }
    }

    #[inline]
    pub fn is_pending_destruction(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|n| n.pending_destruction)
    }

    /// Detaches and frees every node queued by [`destroy`](Self::destroy).
    ///
    /// Returns the number of nodes freed.
    pub fn sweep_destroyed(&mut self) -> usize {
        if self.pending_destroy.is_empty() {
            return 0;
        }
        let pending = std::mem::take(&mut self.pending_destroy);

        for &id in &pending {
            if let Some(parent) = self.nodes.get(id).and_then(|n| n.parent) {
                if let Some(p) = self.nodes.get_mut(parent) {
                    p.children.retain(|c| *c != id);
                }
            }
        }

        let mut freed = 0;
        for id in pending {
            if self.nodes.remove(id).is_some() {
                freed += 1;
            }
        }

        let nodes = &self.nodes;
        self.drawables.retain(|d| nodes.contains_key(*d));
        if !self.nodes.contains_key(self.active_view) {
            self.active_view = self.default_view;
        }

        log::debug!("swept {freed} destroyed nodes");
        freed
    }

    // ── kinds ───────────────────────────────────────────────────────────────

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn drawable(&self, id: NodeId) -> Option<&Drawable> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Drawable(d) => Some(d),
            _ => None,
        }
    }

    /// Mutable access to a drawable. The node's transform is marked dirty,
    /// since its bounds (and therefore its origin) may change.
    pub fn drawable_mut(&mut self, id: NodeId) -> Option<&mut Drawable> {
        let node = self.nodes.get_mut(id)?;
        match &mut node.kind {
            NodeKind::Drawable(d) => {
                node.world_state = CacheState::Dirty;
                node.inverse_state = CacheState::Dirty;
                d.mark_vertices_dirty();
                Some(d)
            }
            _ => None,
        }
    }

    pub fn view(&self, id: NodeId) -> Option<&View> {
        match &self.nodes.get(id)?.kind {
            NodeKind::View(v) => Some(v),
            _ => None,
        }
    }

    pub fn set_view_size(&mut self, id: NodeId, size: Vec2) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::UnknownNode)?;
        match &mut node.kind {
            NodeKind::View(v) => {
                if v.size != size {
                    v.size = size;
                    node.mark_dirty();
                }
                Ok(())
            }
            _ => Err(SceneError::NotAView),
        }
    }

    pub fn set_active_view(&mut self, id: NodeId) -> Result<(), SceneError> {
        let node = self.nodes.get(id).ok_or(SceneError::UnknownNode)?;
        if node.pending_destruction {
            return Err(SceneError::PendingDestruction);
        }
        if !matches!(node.kind, NodeKind::View(_)) {
            return Err(SceneError::NotAView);
        }
        self.active_view = id;
        Ok(())
    }

    /// Resizes the default view to `size` and recenters it on `(0, 0)..size`.
    pub fn fit_default_view(&mut self, size: Vec2) {
        let view = self.default_view;
        if self.set_view_size(view, size).is_ok() {
            self.set_position(view, size * 0.5);
        }
    }

    /// World → NDC for the active view.
    ///
    /// The view's world rectangle maps onto clip space with +Y flipped up.
    pub fn projection(&mut self) -> Matrix2D {
        let view = self.active_view;
        self.ensure_clean(view);
        let node = &self.nodes[view];
        let size = match &node.kind {
            NodeKind::View(v) => v.size,
            _ => return Matrix2D::IDENTITY,
        };
        if size.x == 0.0 || size.y == 0.0 {
            return Matrix2D::IDENTITY;
        }
        let ndc = Matrix2D::new(
            2.0 / size.x, 0.0, -1.0,
            0.0, -2.0 / size.y, 1.0,
            0.0, 0.0, 1.0,
        );
        ndc * node.inverse_world_matrix
    }

    // ── local transform ─────────────────────────────────────────────────────

    pub fn local_position(&self, id: NodeId) -> Vec2 {
        self.nodes[id].local_position
    }

    pub fn local_rotation(&self, id: NodeId) -> f32 {
        self.nodes[id].local_rotation
    }

    pub fn local_scale(&self, id: NodeId) -> Vec2 {
        self.nodes[id].local_scale
    }

    pub fn origin(&self, id: NodeId) -> Vec2 {
        self.nodes[id].origin
    }

    pub fn set_position(&mut self, id: NodeId, position: Vec2) {
        let node = &mut self.nodes[id];
        if node.local_position != position {
            node.local_position = position;
            node.mark_dirty();
        }
    }

    pub fn translate(&mut self, id: NodeId, delta: Vec2) {
        let p = self.nodes[id].local_position;
        self.set_position(id, p + delta);
    }

    pub fn set_rotation(&mut self, id: NodeId, degrees: f32) {
        let rotation = normalize_rotation(degrees);
        let node = &mut self.nodes[id];
        if node.local_rotation != rotation {
            node.local_rotation = rotation;
            node.mark_dirty();
        }
    }

    pub fn rotate(&mut self, id: NodeId, degrees: f32) {
        let r = self.nodes[id].local_rotation;
        self.set_rotation(id, r + degrees);
    }

    pub fn set_scale(&mut self, id: NodeId, scale: Vec2) {
        let node = &mut self.nodes[id];
        if node.local_scale != scale {
            node.local_scale = scale;
            node.mark_dirty();
        }
    }

    /// Sets the pivot as a fraction of the local bounds.
    pub fn set_origin(&mut self, id: NodeId, origin: Vec2) -> Result<(), SceneError> {
        let in_range = |v: f32| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_range(origin.x) || !in_range(origin.y) {
            return Err(SceneError::OriginOutOfRange { x: origin.x, y: origin.y });
        }
        let node = self.nodes.get_mut(id).ok_or(SceneError::UnknownNode)?;
        if node.origin != origin {
            node.origin = origin;
            node.mark_dirty();
        }
        Ok(())
    }

    // ── world transform ─────────────────────────────────────────────────────

    pub fn world_position(&mut self, id: NodeId) -> Vec2 {
        self.ensure_clean(id);
        self.nodes[id].world_position
    }

    pub fn world_rotation(&mut self, id: NodeId) -> f32 {
        self.ensure_clean(id);
        self.nodes[id].world_rotation
    }

    pub fn world_scale(&mut self, id: NodeId) -> Vec2 {
        self.ensure_clean(id);
        self.nodes[id].world_scale
    }

    pub fn local_matrix(&mut self, id: NodeId) -> Matrix2D {
        self.ensure_clean(id);
        self.nodes[id].local_matrix
    }

    pub fn world_matrix(&mut self, id: NodeId) -> Matrix2D {
        self.ensure_clean(id);
        self.nodes[id].world_matrix
    }

    pub fn inverse_world_matrix(&mut self, id: NodeId) -> Matrix2D {
        self.ensure_clean(id);
        self.nodes[id].inverse_world_matrix
    }

    /// Unit vector pointing "up" on screen for the node's world rotation.
    pub fn up(&mut self, id: NodeId) -> Vec2 {
        self.ensure_clean(id);
        self.nodes[id].up
    }

    pub fn right(&mut self, id: NodeId) -> Vec2 {
        self.ensure_clean(id);
        self.nodes[id].right
    }

    pub fn set_world_position(&mut self, id: NodeId, position: Vec2) {
        let parent = self.nodes[id].parent;
        let local = match parent {
            Some(p) => self.inverse_world_matrix(p).transform_point(position),
            None => position,
        };
        self.set_position(id, local);
    }

    pub fn set_world_rotation(&mut self, id: NodeId, degrees: f32) {
        let parent = self.nodes[id].parent;
        let local = match parent {
            Some(p) => degrees - self.world_rotation(p),
            None => degrees,
        };
        self.set_rotation(id, local);
    }

    pub fn set_world_scale(&mut self, id: NodeId, scale: Vec2) {
        let parent = self.nodes[id].parent;
        let local = match parent {
            Some(p) => Matrix2D::from_scale(self.world_scale(p)).inverse().transform_point(scale),
            None => scale,
        };
        self.set_scale(id, local);
    }

    /// Maps a point from the node's local pixels to world space.
    pub fn local_to_world(&mut self, id: NodeId, point: Vec2) -> Vec2 {
        self.world_matrix(id).transform_point(point)
    }

    pub fn world_to_local(&mut self, id: NodeId, point: Vec2) -> Vec2 {
        self.inverse_world_matrix(id).transform_point(point)
    }

    /// Axis-aligned world bounds of the node's local bounds.
    pub fn world_bounds(&mut self, id: NodeId) -> Rect {
        let bounds = self.nodes[id].local_bounds();
        self.world_matrix(id).transform_rect(bounds)
    }

    // ── caching ─────────────────────────────────────────────────────────────

    /// Brings `id` and every ancestor up to date, root first.
    pub fn try_update_matrices(&mut self, id: NodeId) {
        self.ensure_clean(id);
    }

    fn ensure_clean(&mut self, id: NodeId) {
        let mut chain = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            chain.push(n);
            cur = self.nodes[n].parent;
        }
        for n in chain.into_iter().rev() {
            self.recompute(n);
        }
    }

    /// Recomputes one node, assuming its parent is already clean.
    fn recompute(&mut self, id: NodeId) {
        let node = &self.nodes[id];

        if node.world_state == CacheState::Dirty {
            let parent = node.parent.map(|p| {
                let p = &self.nodes[p];
                (p.world_matrix, p.world_rotation, p.world_scale)
            });

            let local = Matrix2D::from_local_transform(
                node.local_position,
                node.local_rotation,
                node.local_scale,
                node.absolute_origin(),
            );
            let (world, position, rotation, scale) = match parent {
                Some((matrix, rotation, scale)) => (
                    matrix * local,
                    matrix.transform_point(node.local_position),
                    normalize_rotation(rotation + node.local_rotation),
                    Matrix2D::from_scale(scale).transform_point(node.local_scale),
                ),
                None => (local, node.local_position, node.local_rotation, node.local_scale),
            };

            let node = &mut self.nodes[id];
            node.local_matrix = local;
            node.world_matrix = world;
            node.world_position = position;
            node.world_rotation = rotation;
            node.world_scale = scale;

            let (s, c) = rotation.to_radians().sin_cos();
            node.right = Vec2::new(c, s);
            node.up = Vec2::new(s, -c);

            node.world_state = CacheState::Clean;
            node.inverse_state = CacheState::Dirty;
            if let NodeKind::Drawable(d) = &mut node.kind {
                d.mark_vertices_dirty();
            }

            let mut stack = node.children.clone();
            while let Some(n) = stack.pop() {
                let child = &mut self.nodes[n];
                child.mark_dirty();
                stack.extend(child.children.iter().copied());
            }
        }

        let node = &mut self.nodes[id];
        if node.inverse_state == CacheState::Dirty {
            node.inverse_world_matrix = node.world_matrix.inverse();
            node.inverse_state = CacheState::Clean;
        }
    }

    // ── frame support ───────────────────────────────────────────────────────

    /// Drawable for this frame's submission, or `None` if hidden, pending
    /// destruction or not a drawable.
    pub(crate) fn frame_drawable(&mut self, id: NodeId) -> Option<&mut Drawable> {
        let node = self.nodes.get_mut(id)?;
        if node.pending_destruction {
            return None;
        }
        match &mut node.kind {
            NodeKind::Drawable(d) if d.is_visible() => Some(d),
            _ => None,
        }
    }

    /// Cleans the node's transform and regenerates its vertices if needed.
    pub(crate) fn refresh_drawable(&mut self, id: NodeId) -> Option<&Drawable> {
        if !self.nodes.contains_key(id) {
            return None;
        }
        self.ensure_clean(id);
        let node = &mut self.nodes[id];
        let world = node.world_matrix;
        match &mut node.kind {
            NodeKind::Drawable(d) => {
                d.refresh_vertices(&world);
                Some(&*d)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::ColorRgba;
    use crate::render::{BlendMode, DrawLayer, RenderProgram, ShaderId};
    use crate::scene::Quad;
    use approx::assert_relative_eq;

    fn level() -> Level {
        Level::new(Vec2::new(800.0, 600.0))
    }

    fn quad_node(level: &mut Level, parent: NodeId, size: f32) -> NodeId {
        let program = RenderProgram::new(BlendMode::Alpha, None, ShaderId(1), DrawLayer(0));
        let drawable = Drawable::new(Quad::new(Vec2::splat(size), ColorRgba::WHITE), program);
        level.spawn_child(parent, drawable).unwrap()
    }

    fn assert_vec_eq(a: Vec2, b: Vec2) {
        assert_relative_eq!(a.x, b.x, epsilon = 1e-3);
        assert_relative_eq!(a.y, b.y, epsilon = 1e-3);
    }

    fn assert_angle_eq(a: f32, b: f32) {
        let d = normalize_rotation(a - b);
        assert!(d < 1e-3 || d > 360.0 - 1e-3, "{a} vs {b}");
    }

    fn assert_mat_eq(a: &Matrix2D, b: &Matrix2D) {
        for (x, y) in a.to_array().iter().zip(b.to_array().iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-3);
        }
    }

    /// Composes the world matrix from local values without touching the caches.
    fn world_from_scratch(level: &Level, id: NodeId) -> Matrix2D {
        let node = &level.nodes[id];
        let local = Matrix2D::from_local_transform(
            node.local_position,
            node.local_rotation,
            node.local_scale,
            node.absolute_origin(),
        );
        match node.parent {
            Some(p) => world_from_scratch(level, p) * local,
            None => local,
        }
    }

    #[test]
    fn new_level_has_immutable_root_and_view() {
        let mut level = level();
        let root = level.root();
        let view = level.default_view();

        assert_eq!(level.node_count(), 2);
        assert_eq!(level.parent(view), Some(root));
        assert!(level.node(root).unwrap().is_immutable());
        assert!(level.node(view).unwrap().is_immutable());
        assert_eq!(level.active_view(), view);
        assert_vec_eq(level.world_position(view), Vec2::new(400.0, 300.0));
    }

    #[test]
    fn child_world_position_follows_parent() {
        let mut level = level();
        let a = level.spawn(NodeKind::Plain);
        level.set_position(a, Vec2::new(10.0, 10.0));
        let b = level.spawn_child(a, NodeKind::Plain).unwrap();
        level.set_position(b, Vec2::new(5.0, 0.0));

        assert_vec_eq(level.world_position(b), Vec2::new(15.0, 10.0));

        level.unparent(b).unwrap();
        assert_eq!(level.parent(b), Some(level.root()));
        assert_vec_eq(level.world_position(b), Vec2::new(15.0, 10.0));
        assert_vec_eq(level.local_position(b), Vec2::new(15.0, 10.0));
    }

    #[test]
    fn reparent_preserves_world_pose() {
        let mut level = level();
        let root = level.root();
        let a = quad_node(&mut level, root, 20.0);
        level.set_origin(a, Vec2::new(0.5, 0.5)).unwrap();
        level.set_position(a, Vec2::new(100.0, 50.0));
        level.set_rotation(a, 30.0);
        level.set_scale(a, Vec2::new(2.0, 2.0));

        let b = level.spawn(NodeKind::Plain);
        level.set_position(b, Vec2::new(-40.0, 12.0));
        level.set_rotation(b, 200.0);
        level.set_scale(b, Vec2::new(0.5, 0.5));

        let child = quad_node(&mut level, a, 4.0);
        level.set_position(child, Vec2::new(3.0, 7.0));
        level.set_rotation(child, 15.0);
        level.set_scale(child, Vec2::new(1.5, 1.5));

        let position = level.world_position(child);
        let rotation = level.world_rotation(child);
        let scale = level.world_scale(child);

        level.set_parent(child, b).unwrap();

        assert_eq!(level.parent(child), Some(b));
        assert_eq!(level.children(b), &[child]);
        assert!(level.children(a).is_empty());
        assert_vec_eq(level.world_position(child), position);
        assert_angle_eq(level.world_rotation(child), rotation);
        assert_vec_eq(level.world_scale(child), scale);
    }

    #[test]
    fn reparent_to_descendant_breaks_cycle() {
        let mut level = level();
        let root = level.root();
        let a = level.spawn(NodeKind::Plain);
        level.set_position(a, Vec2::new(10.0, 0.0));
        let b = level.spawn_child(a, NodeKind::Plain).unwrap();
        level.set_position(b, Vec2::new(0.0, 10.0));
        let c = level.spawn_child(b, NodeKind::Plain).unwrap();
        level.set_position(c, Vec2::new(5.0, 5.0));
        let d = level.spawn_child(a, NodeKind::Plain).unwrap();

        let c_world = level.world_position(c);
        let a_world = level.world_position(a);

        level.set_parent(a, c).unwrap();

        // a's former children now hang off a's old parent.
        assert_eq!(level.parent(b), Some(root));
        assert_eq!(level.parent(d), Some(root));
        assert_eq!(level.parent(c), Some(b));
        assert_eq!(level.parent(a), Some(c));
        assert!(level.children(a).is_empty());
        assert!(!level.is_descendant_of(c, a));
        assert!(level.is_descendant_of(a, b));

        assert_vec_eq(level.world_position(c), c_world);
        assert_vec_eq(level.world_position(a), a_world);
    }

    fn pose(level: &mut Level, id: NodeId) -> (Vec2, f32, Vec2) {
        (level.world_position(id), level.world_rotation(id), level.world_scale(id))
    }

    fn assert_pose_eq(actual: (Vec2, f32, Vec2), expected: (Vec2, f32, Vec2)) {
        assert_vec_eq(actual.0, expected.0);
        assert_angle_eq(actual.1, expected.1);
        assert_vec_eq(actual.2, expected.2);
    }

    #[test]
    fn reparent_keeps_pose_under_rotated_non_uniform_scale() {
        let mut level = level();
        let a = level.spawn(NodeKind::Plain);
        level.set_position(a, Vec2::new(12.0, -4.0));
        level.set_rotation(a, 37.0);
        level.set_scale(a, Vec2::new(3.0, 0.5));
        let b = level.spawn_child(a, NodeKind::Plain).unwrap();
        level.set_position(b, Vec2::new(5.0, 2.0));
        level.set_rotation(b, 250.0);
        level.set_scale(b, Vec2::new(0.25, 2.0));
        let c = level.spawn_child(b, NodeKind::Plain).unwrap();
        level.set_position(c, Vec2::new(-3.0, 6.0));
        level.set_rotation(c, 400.0);
        level.set_scale(c, Vec2::new(1.5, 0.75));

        let other = level.spawn(NodeKind::Plain);
        level.set_position(other, Vec2::new(-20.0, 35.0));
        level.set_rotation(other, 123.0);
        level.set_scale(other, Vec2::new(0.5, 4.0));

        let before = pose(&mut level, c);
        assert_angle_eq(before.1, 327.0);
        assert_vec_eq(before.2, Vec2::new(1.125, 0.75));

        level.set_parent(c, other).unwrap();

        assert_eq!(level.parent(c), Some(other));
        assert_pose_eq(pose(&mut level, c), before);
        assert_vec_eq(level.local_scale(c), Vec2::new(2.25, 0.1875));
        assert_angle_eq(level.local_rotation(c), 204.0);
    }

    #[test]
    fn deep_cycle_break_keeps_every_pose() {
        let mut level = level();
        let root = level.root();
        let a = level.spawn(NodeKind::Plain);
        level.set_position(a, Vec2::new(40.0, 10.0));
        level.set_rotation(a, 30.0);
        // Non-leaf scales stay uniform; a skewed world matrix has no exact
        // position/rotation/scale form.
        level.set_scale(a, Vec2::splat(2.0));
        let b = level.spawn_child(a, NodeKind::Plain).unwrap();
        level.set_position(b, Vec2::new(8.0, 3.0));
        level.set_rotation(b, 100.0);
        let c = level.spawn_child(b, NodeKind::Plain).unwrap();
        level.set_position(c, Vec2::new(-6.0, 2.0));
        level.set_scale(c, Vec2::splat(1.5));
        let d = level.spawn_child(c, NodeKind::Plain).unwrap();
        level.set_position(d, Vec2::new(4.0, 4.0));
        level.set_rotation(d, -45.0);

        let poses: Vec<_> = [a, b, c, d].into_iter().map(|n| pose(&mut level, n)).collect();

        level.set_parent(a, d).unwrap();

        assert_eq!(level.parent(b), Some(root));
        assert_eq!(level.parent(c), Some(b));
        assert_eq!(level.parent(d), Some(c));
        assert_eq!(level.parent(a), Some(d));
        assert!(level.children(a).is_empty());
        for (id, expected) in [a, b, c, d].into_iter().zip(poses) {
            assert_pose_eq(pose(&mut level, id), expected);
        }
    }

    #[test]
    fn set_parent_errors() {
        let mut level = level();
        let root = level.root();
        let view = level.default_view();
        let a = level.spawn(NodeKind::Plain);
        let b = level.spawn(NodeKind::Plain);

        assert_eq!(level.set_parent(a, a), Err(SceneError::SelfParent));
        assert_eq!(level.set_parent(a, root), Ok(()));
        assert_eq!(level.set_parent(view, a), Err(SceneError::Immutable));
        assert_eq!(level.set_parent(root, a), Err(SceneError::Immutable));

        level.destroy(b);
        assert_eq!(level.set_parent(a, b), Err(SceneError::PendingDestruction));
        assert_eq!(level.set_parent(b, a), Err(SceneError::PendingDestruction));

        level.sweep_destroyed();
        assert_eq!(level.set_parent(a, b), Err(SceneError::UnknownNode));
    }

    #[test]
    fn cached_world_matches_fresh_composition() {
        let mut level = level();
        let root = level.root();
        let a = quad_node(&mut level, root, 10.0);
        let b = quad_node(&mut level, a, 6.0);
        let c = quad_node(&mut level, b, 2.0);
        level.set_origin(b, Vec2::new(1.0, 0.0)).unwrap();

        // Warm the caches, then mutate only the top of the chain.
        level.world_matrix(c);
        level.set_position(a, Vec2::new(7.0, -3.0));
        level.set_rotation(a, 45.0);
        level.set_scale(b, Vec2::new(2.0, 0.5));
        level.set_rotation(c, -120.0);

        for id in [a, b, c] {
            let expected = world_from_scratch(&level, id);
            assert_mat_eq(&level.world_matrix(id), &expected);
            assert_mat_eq(&level.inverse_world_matrix(id), &expected.inverse());
            assert!(!level.node(id).unwrap().is_dirty());
        }
    }

    #[test]
    fn setters_mark_dirty_only_on_change() {
        let mut level = level();
        let a = level.spawn(NodeKind::Plain);
        level.world_matrix(a);
        assert!(!level.node(a).unwrap().is_dirty());

        level.set_position(a, Vec2::ZERO);
        level.set_rotation(a, 360.0);
        level.set_scale(a, Vec2::ONE);
        assert!(!level.node(a).unwrap().is_dirty());

        level.set_position(a, Vec2::new(1.0, 0.0));
        assert!(level.node(a).unwrap().is_dirty());
    }

    #[test]
    fn recompute_marks_descendants_dirty() {
        let mut level = level();
        let a = level.spawn(NodeKind::Plain);
        let b = quad_node(&mut level, a, 4.0);
        level.world_matrix(b);
        assert!(!level.node(b).unwrap().is_dirty());

        level.set_position(a, Vec2::new(3.0, 0.0));
        level.world_matrix(a);
        assert!(level.node(b).unwrap().is_dirty());
        assert!(level.drawable(b).unwrap().vertices_dirty());
    }

    #[test]
    fn rotation_setters_normalize() {
        let mut level = level();
        let a = level.spawn(NodeKind::Plain);
        level.set_rotation(a, -90.0);
        assert_relative_eq!(level.local_rotation(a), 270.0, epsilon = 1e-4);

        level.rotate(a, 100.0);
        assert_relative_eq!(level.local_rotation(a), 10.0, epsilon = 1e-4);

        let b = level.spawn_child(a, NodeKind::Plain).unwrap();
        level.set_world_rotation(b, 5.0);
        assert_relative_eq!(level.local_rotation(b), 355.0, epsilon = 1e-4);
        assert_relative_eq!(level.world_rotation(b), 5.0, epsilon = 1e-3);

        level.set_rotation(b, 350.0);
        assert_relative_eq!(level.world_rotation(b), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn world_setters_convert_into_parent_space() {
        let mut level = level();
        let a = level.spawn(NodeKind::Plain);
        level.set_position(a, Vec2::new(100.0, 0.0));
        level.set_rotation(a, 90.0);
        level.set_scale(a, Vec2::new(2.0, 2.0));
        let b = level.spawn_child(a, NodeKind::Plain).unwrap();

        level.set_world_position(b, Vec2::new(100.0, 20.0));
        assert_vec_eq(level.local_position(b), Vec2::new(10.0, 0.0));
        assert_vec_eq(level.world_position(b), Vec2::new(100.0, 20.0));

        level.set_world_scale(b, Vec2::new(4.0, 1.0));
        assert_vec_eq(level.local_scale(b), Vec2::new(2.0, 0.5));
        assert_vec_eq(level.world_scale(b), Vec2::new(4.0, 1.0));
    }

    #[test]
    fn nested_non_uniform_scale_composes_per_axis() {
        let mut level = level();
        let parent = level.spawn(NodeKind::Plain);
        level.set_rotation(parent, 90.0);
        level.set_scale(parent, Vec2::new(2.0, 1.0));
        let child = level.spawn_child(parent, NodeKind::Plain).unwrap();
        level.set_rotation(child, 90.0);
        level.set_scale(child, Vec2::new(1.0, 3.0));

        // Scale composes axis by axis and ignores the parent's rotation,
        // while the matrix carries the full product.
        assert_vec_eq(level.world_scale(child), Vec2::new(2.0, 3.0));
        assert_angle_eq(level.world_rotation(child), 180.0);

        let m = level.world_matrix(child).to_array();
        assert_relative_eq!(m[0], -1.0, epsilon = 1e-4);
        assert_relative_eq!(m[1], 0.0, epsilon = 1e-4);
        assert_relative_eq!(m[3], 0.0, epsilon = 1e-4);
        assert_relative_eq!(m[4], -6.0, epsilon = 1e-4);
    }

    #[test]
    fn direction_vectors_follow_world_rotation() {
        let mut level = level();
        let a = level.spawn(NodeKind::Plain);
        assert_vec_eq(level.right(a), Vec2::new(1.0, 0.0));
        assert_vec_eq(level.up(a), Vec2::new(0.0, -1.0));

        level.set_rotation(a, 90.0);
        assert_vec_eq(level.right(a), Vec2::new(0.0, 1.0));
        assert_vec_eq(level.up(a), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn origin_pivots_the_node() {
        let mut level = level();
        let root = level.root();
        let a = quad_node(&mut level, root, 10.0);
        level.set_position(a, Vec2::new(50.0, 50.0));
        level.set_origin(a, Vec2::new(0.5, 0.5)).unwrap();

        assert_vec_eq(level.local_to_world(a, Vec2::new(5.0, 5.0)), Vec2::new(50.0, 50.0));
        let bounds = level.world_bounds(a);
        assert_vec_eq(bounds.origin, Vec2::new(45.0, 45.0));
        assert_vec_eq(bounds.size, Vec2::new(10.0, 10.0));

        let p = level.world_to_local(a, Vec2::new(45.0, 45.0));
        assert_vec_eq(p, Vec2::ZERO);

        assert_eq!(
            level.set_origin(a, Vec2::new(1.5, 0.0)),
            Err(SceneError::OriginOutOfRange { x: 1.5, y: 0.0 })
        );
        assert!(level.set_origin(a, Vec2::new(f32::NAN, 0.0)).is_err());
    }

    #[test]
    fn destroy_defers_removal_until_sweep() {
        let mut level = level();
        let root = level.root();
        let a = quad_node(&mut level, root, 1.0);
        let b = quad_node(&mut level, a, 1.0);
        let keep = quad_node(&mut level, root, 1.0);
        assert_eq!(level.drawables(), &[a, b, keep]);

        level.destroy(a);
        assert!(level.is_pending_destruction(a));
        assert!(level.is_pending_destruction(b));
        assert!(level.contains(b));

        // Repeated requests are absorbed.
        level.destroy(b);
        assert_eq!(level.sweep_destroyed(), 2);

        assert!(!level.contains(a));
        assert!(!level.contains(b));
        assert_eq!(level.drawables(), &[keep]);
        assert!(!level.children(level.root()).contains(&a));
        assert_eq!(level.sweep_destroyed(), 0);
    }

    #[test]
    fn destroying_immutable_nodes_is_ignored() {
        let mut level = level();
        level.destroy(level.root());
        level.destroy(level.default_view());
        assert_eq!(level.sweep_destroyed(), 0);
        assert_eq!(level.node_count(), 2);
    }

    #[test]
    fn destroyed_active_view_falls_back_to_default() {
        let mut level = level();
        let cam = level.spawn(View::new(Vec2::new(100.0, 100.0)));
        level.set_active_view(cam).unwrap();
        assert_eq!(level.active_view(), cam);

        level.destroy(cam);
        level.sweep_destroyed();
        assert_eq!(level.active_view(), level.default_view());

        let plain = level.spawn(NodeKind::Plain);
        assert_eq!(level.set_active_view(plain), Err(SceneError::NotAView));
    }

    #[test]
    fn do_recursive_visits_pre_order_and_counts() {
        let mut level = level();
        let a = level.spawn(NodeKind::Plain);
        let b = level.spawn_child(a, NodeKind::Plain).unwrap();
        let c = level.spawn_child(b, NodeKind::Plain).unwrap();
        let d = level.spawn_child(a, NodeKind::Plain).unwrap();

        let mut seen = Vec::new();
        let n = level.do_recursive(a, true, |_, id| seen.push(id));
        assert_eq!(n, 4);
        assert_eq!(seen, vec![a, b, c, d]);

        assert_eq!(level.do_recursive(a, false, |_, _| {}), 3);
    }

    #[test]
    fn do_recursive_tolerates_structural_changes() {
        let mut level = level();
        let a = level.spawn(NodeKind::Plain);
        let b = level.spawn_child(a, NodeKind::Plain).unwrap();
        let c = level.spawn_child(a, NodeKind::Plain).unwrap();
        let root = level.root();

        let n = level.do_recursive(a, false, |level, id| {
            if id == b {
                level.set_parent(b, root).unwrap();
            } else {
                level.destroy(id);
            }
        });
        assert_eq!(n, 2);
        assert_eq!(level.parent(b), Some(root));
        assert!(level.is_pending_destruction(c));
    }

    #[test]
    fn default_projection_maps_view_to_clip_space() {
        let mut level = level();
        let proj = level.projection();
        assert_vec_eq(proj.transform_point(Vec2::ZERO), Vec2::new(-1.0, 1.0));
        assert_vec_eq(proj.transform_point(Vec2::new(800.0, 600.0)), Vec2::new(1.0, -1.0));
        assert_vec_eq(proj.transform_point(Vec2::new(400.0, 300.0)), Vec2::ZERO);

        // Moving the camera moves the world the other way.
        let view = level.default_view();
        level.translate(view, Vec2::new(100.0, 0.0));
        let proj = level.projection();
        assert_vec_eq(proj.transform_point(Vec2::new(500.0, 300.0)), Vec2::ZERO);
    }

    #[test]
    fn fit_default_view_tracks_resize() {
        let mut level = level();
        level.fit_default_view(Vec2::new(200.0, 100.0));
        let proj = level.projection();
        assert_vec_eq(proj.transform_point(Vec2::new(200.0, 100.0)), Vec2::new(1.0, -1.0));
    }

    #[test]
    fn hidden_and_pending_drawables_are_skipped_for_frames() {
        let mut level = level();
        let root = level.root();
        let a = quad_node(&mut level, root, 2.0);
        let b = quad_node(&mut level, root, 2.0);
        level.drawable_mut(a).unwrap().set_visible(false);
        level.destroy(b);

        assert!(level.frame_drawable(a).is_none());
        assert!(level.frame_drawable(b).is_none());
    }

    #[test]
    fn refresh_drawable_generates_world_vertices() {
        let mut level = level();
        let root = level.root();
        let a = quad_node(&mut level, root, 2.0);
        level.set_position(a, Vec2::new(10.0, 20.0));

        let d = level.refresh_drawable(a).unwrap();
        assert_eq!(d.vertices().len(), 4);
        assert_eq!(d.vertices()[0].position, [10.0, 20.0]);
        assert!(!d.vertices_dirty());
    }
}
