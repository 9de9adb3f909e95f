/// An acquired surface texture plus the encoder recording into it.
///
/// Submit promptly: while this is alive the next surface texture cannot be
/// acquired.
pub struct GpuFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
    pub encoder: wgpu::CommandEncoder,
}
