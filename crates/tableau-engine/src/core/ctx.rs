use crate::render::{GpuBackend, GraphicsDevice, RenderProgram, ShaderDesc, ShaderId, TextureDesc, TextureId};
use crate::scene::Level;
use crate::time::FrameTime;
use crate::window::RuntimeCtx;

/// Everything an app can touch during a callback.
pub struct FrameCtx<'a> {
    pub level: &'a mut Level,
    pub graphics: &'a mut GraphicsDevice,
    pub backend: &'a mut dyn GpuBackend,
    pub time: FrameTime,
    pub runtime: &'a mut RuntimeCtx,
}

impl FrameCtx<'_> {
    /// See [`GraphicsDevice::load_texture`].
    pub fn load_texture(&mut self, desc: &TextureDesc<'_>) -> Option<TextureId> {
        self.graphics.load_texture(self.backend, desc)
    }

    /// See [`GraphicsDevice::load_shader`].
    pub fn load_shader(&mut self, desc: &ShaderDesc<'_>) -> ShaderId {
        self.graphics.load_shader(self.backend, desc)
    }

    pub fn sprite_program(&self, texture: Option<TextureId>) -> RenderProgram {
        self.graphics.sprite_program(texture)
    }
}
