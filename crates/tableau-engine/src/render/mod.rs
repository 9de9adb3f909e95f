//! Render-program batching and GPU backends.
//!
//! Drawables are grouped by [`RenderProgram`] into [`GeometryBatch`]es owned
//! by the [`GraphicsDevice`]. Each frame the batches are flushed in layer order
//! into an off-screen frame buffer, which is then composited onto the screen.
//!
//! Convention:
//! - vertices are world pixels (top-left origin, +Y down)
//! - the active view's projection maps them to clip space in the vertex shader

mod backend;
mod batch;
mod device;
mod layer;
mod program;
mod recording;
mod vertex;
mod wgpu_backend;

pub use backend::{GpuBackend, GpuError, RenderTarget, ShaderDesc, TextureDesc};
pub use batch::{BatchId, BatchState, GeometryBatch, RenderError};
pub use device::{DeviceConfig, FrameStats, GraphicsDevice};
pub use layer::DrawLayer;
pub use program::{BlendMode, RenderProgram, ShaderId, TextureId};
pub use recording::{BackendCommand, RecordingBackend};
pub use vertex::{Vertex, FULLSCREEN_QUAD, QUAD_INDICES, VERTICES_PER_QUAD};
pub use wgpu_backend::WgpuBackend;
