use std::collections::HashSet;

use crate::coords::{ColorRgba, Matrix2D};

use super::{
    GpuBackend, GpuError, RenderProgram, RenderTarget, ShaderDesc, ShaderId, TextureDesc,
    TextureId, Vertex,
};

/// A backend call captured by [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    Clear {
        target: RenderTarget,
        color: ColorRgba,
    },
    Draw {
        target: RenderTarget,
        program: RenderProgram,
        projection: Matrix2D,
        vertices: Vec<Vertex>,
    },
}

/// Headless backend that records every call instead of touching a GPU.
///
/// Used for tests and for running the scene/batching pipeline without a
/// window. Shader and texture descriptors go through the same validation as
/// the wgpu backend, so content errors surface identically.
#[derive(Debug)]
pub struct RecordingBackend {
    commands: Vec<BackendCommand>,
    shaders: HashSet<ShaderId>,
    textures: HashSet<TextureId>,
    frame_buffer: TextureId,
    next_id: u32,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        let frame_buffer = TextureId(0);
        let mut textures = HashSet::new();
        textures.insert(frame_buffer);
        Self {
            commands: Vec::new(),
            shaders: HashSet::new(),
            textures,
            frame_buffer,
            next_id: 1,
        }
    }

    /// Every command recorded since the last [`take_commands`](Self::take_commands).
    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<BackendCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Draw commands aimed at `target`, in submission order.
    pub fn draws_to(&self, target: RenderTarget) -> Vec<(&RenderProgram, &Matrix2D, &[Vertex])> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                BackendCommand::Draw { target: t, program, projection, vertices } if *t == target => {
                    Some((program, projection, vertices.as_slice()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    /// Live textures, excluding the frame buffer.
    pub fn live_textures(&self) -> usize {
        self.textures.len() - 1
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}

impl GpuBackend for RecordingBackend {
    fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<ShaderId, GpuError> {
        desc.validate()?;
        let id = ShaderId(self.allocate());
        self.shaders.insert(id);
        Ok(id)
    }

    fn destroy_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, GpuError> {
        desc.validate()?;
        let id = TextureId(self.allocate());
        self.textures.insert(id);
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if texture != self.frame_buffer {
            self.textures.remove(&texture);
        }
    }

    fn frame_buffer_texture(&self) -> TextureId {
        self.frame_buffer
    }

    fn clear(&mut self, target: RenderTarget, color: ColorRgba) {
        self.commands.push(BackendCommand::Clear { target, color });
    }

    fn draw_quads(
        &mut self,
        target: RenderTarget,
        program: &RenderProgram,
        projection: &Matrix2D,
        vertices: &[Vertex],
    ) {
        self.commands.push(BackendCommand::Draw {
            target,
            program: *program,
            projection: *projection,
            vertices: vertices.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_across_resource_kinds() {
        let mut backend = RecordingBackend::new();
        let s = backend.create_shader(&ShaderDesc::sprite()).unwrap();
        let t = backend
            .create_texture(&TextureDesc::new("white", 1, 1, &[255; 4]))
            .unwrap();
        assert_ne!(s.0, t.0);
        assert_ne!(t, backend.frame_buffer_texture());
    }

    #[test]
    fn destroy_releases_resources() {
        let mut backend = RecordingBackend::new();
        let t = backend
            .create_texture(&TextureDesc::new("white", 1, 1, &[255; 4]))
            .unwrap();
        assert_eq!(backend.live_textures(), 1);
        backend.destroy_texture(t);
        assert_eq!(backend.live_textures(), 0);

        // The frame buffer is owned by the backend itself.
        backend.destroy_texture(backend.frame_buffer_texture());
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn invalid_shader_is_not_registered() {
        let mut backend = RecordingBackend::new();
        assert!(backend.create_shader(&ShaderDesc::new("bad", "")).is_err());
        assert_eq!(backend.live_shaders(), 0);
    }
}
