use bytemuck::{Pod, Zeroable};

use crate::coords::{ColorRgba, Vec2};

/// One corner of a quad as uploaded to the GPU.
///
/// Layout (32 bytes):
///
///  offset  0  position  [f32; 2]   loc 0
///  offset  8  color     [f32; 4]   loc 1
///  offset 24  uv        [f32; 2]   loc 2
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
    pub uv: [f32; 2],
}

impl Vertex {
    #[inline]
    pub fn new(position: Vec2, color: ColorRgba, uv: Vec2) -> Self {
        Self {
            position: [position.x, position.y],
            color: color.to_array(),
            uv: [uv.x, uv.y],
        }
    }
}

/// Vertices per quad. Every batch submission is a whole number of quads.
pub const VERTICES_PER_QUAD: usize = 4;

/// Index pattern for one quad (two triangles over TL, TR, BR, BL).
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

/// Quad covering the whole of clip space, sampling the full texture.
pub const FULLSCREEN_QUAD: [Vertex; 4] = [
    Vertex { position: [-1.0, 1.0], color: [1.0; 4], uv: [0.0, 0.0] },
    Vertex { position: [1.0, 1.0], color: [1.0; 4], uv: [1.0, 0.0] },
    Vertex { position: [1.0, -1.0], color: [1.0; 4], uv: [1.0, 1.0] },
    Vertex { position: [-1.0, -1.0], color: [1.0; 4], uv: [0.0, 1.0] },
];
