use crate::coords::{Matrix2D, Rect, Vec2};
use crate::render::{BatchId, BlendMode, DrawLayer, RenderProgram, ShaderId, TextureId, Vertex};

use super::{CacheState, Visual};

/// What a node is, beyond its transform.
#[derive(Debug)]
pub enum NodeKind {
    /// Pure transform node (grouping, pivots).
    Plain,
    Drawable(Drawable),
    View(View),
}

impl NodeKind {
    pub(crate) fn local_bounds(&self) -> Rect {
        match self {
            NodeKind::Plain => Rect::default(),
            NodeKind::Drawable(d) => d.visual.local_bounds(),
            NodeKind::View(v) => Rect::from_size(v.size),
        }
    }
}

impl From<Drawable> for NodeKind {
    fn from(d: Drawable) -> Self {
        NodeKind::Drawable(d)
    }
}

impl From<View> for NodeKind {
    fn from(v: View) -> Self {
        NodeKind::View(v)
    }
}

/// Camera rectangle in the node's local pixels.
///
/// Whatever the view's world transform covers is mapped onto the full frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct View {
    pub size: Vec2,
}

impl View {
    pub fn new(size: Vec2) -> Self {
        Self { size }
    }
}

/// Renderable payload of a node: a [`Visual`] plus the program it is batched under.
#[derive(Debug)]
pub struct Drawable {
    visual: Box<dyn Visual>,
    program: RenderProgram,
    program_state: CacheState,
    vertices: Vec<Vertex>,
    vertex_state: CacheState,
    visible: bool,

    /// Batch this drawable submitted to last; stale ids are re-resolved.
    pub(crate) batch: Option<BatchId>,
}

impl Drawable {
    pub fn new(visual: impl Visual + 'static, program: RenderProgram) -> Self {
        Self {
            visual: Box::new(visual),
            program,
            program_state: CacheState::Dirty,
            vertices: Vec::new(),
            vertex_state: CacheState::Dirty,
            visible: true,
            batch: None,
        }
    }

    #[inline]
    pub fn visual(&self) -> &dyn Visual {
        self.visual.as_ref()
    }

    pub fn set_visual(&mut self, visual: impl Visual + 'static) {
        self.visual = Box::new(visual);
        self.vertex_state = CacheState::Dirty;
    }

    #[inline]
    pub fn program(&self) -> &RenderProgram {
        &self.program
    }

    /// Replaces the program; a different value flags the drawable for batch
    /// reassignment on the next frame.
    pub fn set_program(&mut self, program: RenderProgram) {
        if program != self.program {
            self.program = program;
            self.program_state = CacheState::Dirty;
        }
    }

    pub fn set_texture(&mut self, texture: Option<TextureId>) {
        self.set_program(self.program.with_texture(texture));
    }

    pub fn set_blend_mode(&mut self, blend_mode: BlendMode) {
        self.set_program(self.program.with_blend_mode(blend_mode));
    }

    pub fn set_shader(&mut self, shader: ShaderId) {
        self.set_program(self.program.with_shader(shader));
    }

    pub fn set_layer(&mut self, layer: DrawLayer) {
        self.set_program(self.program.with_layer(layer));
    }

    #[inline]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// World-space vertices from the last regeneration.
    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    pub fn vertices_dirty(&self) -> bool {
        self.vertex_state == CacheState::Dirty
    }

    #[inline]
    pub fn program_dirty(&self) -> bool {
        self.program_state == CacheState::Dirty
    }

    pub(crate) fn mark_vertices_dirty(&mut self) {
        self.vertex_state = CacheState::Dirty;
    }

    /// Clears the reassignment flag, returning whether it was set.
    pub(crate) fn take_program_dirty(&mut self) -> bool {
        let dirty = self.program_dirty();
        self.program_state = CacheState::Clean;
        dirty
    }

    pub(crate) fn refresh_vertices(&mut self, world: &Matrix2D) {
        if self.vertex_state == CacheState::Clean {
            return;
        }
        self.vertices.clear();
        self.visual.generate(world, &mut self.vertices);
        self.vertex_state = CacheState::Clean;
    }
}
