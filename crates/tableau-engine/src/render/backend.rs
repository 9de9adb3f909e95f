use wgpu::naga;

use crate::coords::{ColorRgba, Matrix2D};

use super::{RenderProgram, ShaderId, TextureId, Vertex};

/// Where a draw lands.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RenderTarget {
    /// Off-screen color target that batches are flushed into.
    FrameBuffer,
    /// The presented surface; only the post-process composite draws here.
    Screen,
}

/// WGSL shader source. Must define `vs_main` and `fs_main` entry points.
#[derive(Debug, Clone, Copy)]
pub struct ShaderDesc<'a> {
    pub label: &'a str,
    pub source: &'a str,
}

impl<'a> ShaderDesc<'a> {
    pub const VERTEX_ENTRY: &'static str = "vs_main";
    pub const FRAGMENT_ENTRY: &'static str = "fs_main";

    #[inline]
    pub const fn new(label: &'a str, source: &'a str) -> Self {
        Self { label, source }
    }

    /// Default textured/tinted quad shader.
    pub const fn sprite() -> ShaderDesc<'static> {
        ShaderDesc::new("tableau sprite shader", include_str!("shaders/sprite.wgsl"))
    }

    /// Full-screen composite of the frame buffer onto the surface.
    pub const fn post_process() -> ShaderDesc<'static> {
        ShaderDesc::new("tableau post-process shader", include_str!("shaders/post_process.wgsl"))
    }

    /// Parses and validates the WGSL and checks both entry points exist.
    ///
    /// Runs on the CPU, so content errors are reported before any backend
    /// touches the GPU.
    pub fn validate(&self) -> Result<(), GpuError> {
        let fail = |message: String| GpuError::ShaderCompile {
            label: self.label.to_string(),
            message,
        };

        if self.source.trim().is_empty() {
            return Err(fail("empty shader source".to_string()));
        }

        let module = naga::front::wgsl::parse_str(self.source).map_err(|e| fail(e.to_string()))?;
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
            .validate(&module)
            .map_err(|e| fail(e.to_string()))?;

        let entries = [
            (naga::ShaderStage::Vertex, Self::VERTEX_ENTRY),
            (naga::ShaderStage::Fragment, Self::FRAGMENT_ENTRY),
        ];
        for (stage, name) in entries {
            if !module.entry_points.iter().any(|ep| ep.stage == stage && ep.name == name) {
                return Err(fail(format!("missing {stage:?} entry point `{name}`")));
            }
        }
        Ok(())
    }
}

/// Tightly packed RGBA8 texture upload.
#[derive(Debug, Clone, Copy)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub rgba: &'a [u8],
}

impl<'a> TextureDesc<'a> {
    #[inline]
    pub const fn new(label: &'a str, width: u32, height: u32, rgba: &'a [u8]) -> Self {
        Self { label, width, height, rgba }
    }

    pub fn validate(&self) -> Result<(), GpuError> {
        if self.width == 0 || self.height == 0 {
            return Err(GpuError::EmptyTexture { label: self.label.to_string() });
        }
        let expected = self.width as usize * self.height as usize * 4;
        if self.rgba.len() != expected {
            return Err(GpuError::TextureSize {
                label: self.label.to_string(),
                expected,
                actual: self.rgba.len(),
            });
        }
        Ok(())
    }
}

/// Content/resource failures reported by a backend.
///
/// These never abort a frame: the graphics device logs them and falls back.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GpuError {
    #[error("shader `{label}` failed to compile: {message}")]
    ShaderCompile { label: String, message: String },
    #[error("texture `{label}` has zero size")]
    EmptyTexture { label: String },
    #[error("texture `{label}` expected {expected} bytes of RGBA8 data, got {actual}")]
    TextureSize { label: String, expected: usize, actual: usize },
}

/// The GPU operations the batching core relies on.
///
/// Implementations own every GPU resource; handles stay valid until the
/// matching `destroy_*` call.
pub trait GpuBackend {
    fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<ShaderId, GpuError>;

    fn destroy_shader(&mut self, shader: ShaderId);

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, GpuError>;

    fn destroy_texture(&mut self, texture: TextureId);

    /// Color output of the off-screen frame buffer, sampleable by the composite pass.
    fn frame_buffer_texture(&self) -> TextureId;

    /// Clears `target` before any draw into it this frame.
    fn clear(&mut self, target: RenderTarget, color: ColorRgba);

    /// Draws `vertices` (a whole number of quads) as one draw call.
    fn draw_quads(
        &mut self,
        target: RenderTarget,
        program: &RenderProgram,
        projection: &Matrix2D,
        vertices: &[Vertex],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_shaders_pass_validation() {
        assert!(ShaderDesc::sprite().validate().is_ok());
        assert!(ShaderDesc::post_process().validate().is_ok());
    }

    #[test]
    fn shader_without_fragment_entry_is_rejected() {
        let desc = ShaderDesc::new(
            "vertex only",
            "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }",
        );
        let err = desc.validate().unwrap_err();
        assert!(matches!(err, GpuError::ShaderCompile { ref message, .. } if message.contains("fs_main")));
    }

    #[test]
    fn malformed_wgsl_is_rejected_even_with_entry_names() {
        let desc = ShaderDesc::new("broken", "fn vs_main( fn fs_main @@@");
        let err = desc.validate().unwrap_err();
        assert!(matches!(err, GpuError::ShaderCompile { ref label, .. } if label == "broken"));
    }

    #[test]
    fn type_errors_are_rejected() {
        let source = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return 1.0; }\n\
                      @fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";
        assert!(ShaderDesc::new("mistyped", source).validate().is_err());
    }

    #[test]
    fn texture_size_mismatch_is_rejected() {
        let pixels = [0u8; 12];
        let err = TextureDesc::new("t", 2, 2, &pixels).validate().unwrap_err();
        assert_eq!(
            err,
            GpuError::TextureSize { label: "t".into(), expected: 16, actual: 12 }
        );
    }

    #[test]
    fn zero_sized_texture_is_rejected() {
        let err = TextureDesc::new("t", 0, 4, &[]).validate().unwrap_err();
        assert!(matches!(err, GpuError::EmptyTexture { .. }));
    }
}
