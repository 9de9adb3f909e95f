use super::DrawLayer;

/// How a batch's fragments combine with the target.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum BlendMode {
    /// Straight-alpha "over" compositing.
    #[default]
    Alpha,
    /// `src * src_alpha + dst`.
    Additive,
    /// `src * dst`.
    Multiply,
    /// Overwrite the target.
    None,
}

/// Opaque handle to a GPU texture owned by a [`GpuBackend`](super::GpuBackend).
///
/// Compared by handle, never by content.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u32);

/// Opaque handle to a compiled shader owned by a [`GpuBackend`](super::GpuBackend).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub(crate) u32);

/// Batch grouping key: one distinct GPU draw configuration.
///
/// Two programs are equal iff blend mode, texture handle, shader handle and
/// layer are all equal. The value is immutable; use the `with_*` helpers to
/// derive a replacement.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RenderProgram {
    blend_mode: BlendMode,
    texture: Option<TextureId>,
    shader: ShaderId,
    layer: DrawLayer,
}

impl RenderProgram {
    #[inline]
    pub const fn new(
        blend_mode: BlendMode,
        texture: Option<TextureId>,
        shader: ShaderId,
        layer: DrawLayer,
    ) -> Self {
        Self { blend_mode, texture, shader, layer }
    }

    #[inline]
    pub const fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    #[inline]
    pub const fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    #[inline]
    pub const fn shader(&self) -> ShaderId {
        self.shader
    }

    #[inline]
    pub const fn layer(&self) -> DrawLayer {
        self.layer
    }

    #[inline]
    pub const fn with_blend_mode(self, blend_mode: BlendMode) -> Self {
        Self { blend_mode, ..self }
    }

    #[inline]
    pub const fn with_texture(self, texture: Option<TextureId>) -> Self {
        Self { texture, ..self }
    }

    #[inline]
    pub const fn with_shader(self, shader: ShaderId) -> Self {
        Self { shader, ..self }
    }

    #[inline]
    pub const fn with_layer(self, layer: DrawLayer) -> Self {
        Self { layer, ..self }
    }
}
