//! wgpu implementation of [`GpuBackend`].
//!
//! Draw calls are queued while the graphics device runs its frame and replayed
//! by [`WgpuBackend::encode`] into two render passes: the off-screen frame
//! buffer first, then the surface.

use std::collections::{HashMap, HashSet};

use bytemuck::{Pod, Zeroable};

use crate::coords::{ColorRgba, Matrix2D};

use super::{
    BlendMode, GpuBackend, GpuError, RenderProgram, RenderTarget, ShaderDesc, ShaderId,
    TextureDesc, TextureId, Vertex, QUAD_INDICES, VERTICES_PER_QUAD,
};

// ── gpu types ─────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct ProjectionUniform {
    matrix: [[f32; 4]; 4],
}

const PROJECTION_SIZE: u64 = std::mem::size_of::<ProjectionUniform>() as u64;

const VERTEX_ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x2, // position
    1 => Float32x4, // color
    2 => Float32x2  // uv
];

fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRS,
    }
}

fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    let component = |src_factor, dst_factor| wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    };

    match mode {
        BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
        BlendMode::Additive => wgpu::BlendState {
            color: component(wgpu::BlendFactor::SrcAlpha, wgpu::BlendFactor::One),
            alpha: component(wgpu::BlendFactor::One, wgpu::BlendFactor::One),
        },
        BlendMode::Multiply => wgpu::BlendState {
            color: component(wgpu::BlendFactor::Dst, wgpu::BlendFactor::Zero),
            alpha: component(wgpu::BlendFactor::DstAlpha, wgpu::BlendFactor::Zero),
        },
        BlendMode::None => wgpu::BlendState::REPLACE,
    }
}

fn to_wgpu_color(c: ColorRgba) -> wgpu::Color {
    wgpu::Color {
        r: c.r as f64,
        g: c.g as f64,
        b: c.b as f64,
        a: c.a as f64,
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

struct GpuTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct PipelineKey {
    shader: ShaderId,
    blend: BlendMode,
}

#[derive(Debug, Copy, Clone)]
struct QueuedDraw {
    target: RenderTarget,
    pipeline: PipelineKey,
    texture: TextureId,
    projection_slot: u32,
    first_vertex: u32,
    vertex_count: u32,
}

// ── backend ───────────────────────────────────────────────────────────────

/// GPU backend over a wgpu device/queue.
///
/// The frame buffer uses the surface format so one pipeline per
/// (shader, blend mode) serves both targets.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    frame_size: (u32, u32),

    next_id: u32,
    shaders: HashMap<ShaderId, wgpu::ShaderModule>,
    textures: HashMap<TextureId, GpuTexture>,
    frame_buffer: TextureId,
    white: TextureId,

    texture_bgl: wgpu::BindGroupLayout,
    projection_bgl: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    rejected_pipelines: HashSet<PipelineKey>,

    // Per-frame queue, drained by `encode`.
    clears: HashMap<RenderTarget, ColorRgba>,
    draws: Vec<QueuedDraw>,
    vertices: Vec<Vertex>,
    projections: Vec<Matrix2D>,

    projection_stride: u64,
    projection_ubo: Option<wgpu::Buffer>,
    projection_capacity: usize,
    projection_bind_group: Option<wgpu::BindGroup>,

    vbo: Option<wgpu::Buffer>,
    vbo_capacity: usize,
    ibo: Option<wgpu::Buffer>,
    ibo_quads: usize,
}

impl WgpuBackend {
    /// Creates the backend and its frame buffer at `width`×`height` physical pixels.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let projection_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tableau projection bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(PROJECTION_SIZE),
                },
                count: None,
            }],
        });

        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tableau texture bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tableau pipeline layout"),
            bind_group_layouts: &[&projection_bgl, &texture_bgl],
            immediate_size: 0,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("tableau sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;

        let mut backend = Self {
            device: device.clone(),
            queue: queue.clone(),
            format,
            frame_size: (width.max(1), height.max(1)),
            next_id: 0,
            shaders: HashMap::new(),
            textures: HashMap::new(),
            frame_buffer: TextureId(0),
            white: TextureId(0),
            texture_bgl,
            projection_bgl,
            pipeline_layout,
            sampler,
            pipelines: HashMap::new(),
            rejected_pipelines: HashSet::new(),
            clears: HashMap::new(),
            draws: Vec::new(),
            vertices: Vec::new(),
            projections: Vec::new(),
            projection_stride: align_up(PROJECTION_SIZE, alignment.max(1)),
            projection_ubo: None,
            projection_capacity: 0,
            projection_bind_group: None,
            vbo: None,
            vbo_capacity: 0,
            ibo: None,
            ibo_quads: 0,
        };

        backend.frame_buffer = TextureId(backend.allocate());
        backend.create_frame_buffer();

        backend.white = TextureId(backend.allocate());
        let white = backend.upload_texture("tableau white texture", 1, 1, &[255; 4]);
        backend.textures.insert(backend.white, white);

        backend
    }

    #[inline]
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.format
    }

    #[inline]
    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    /// Recreates the frame buffer at the new surface size; its id is unchanged.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == self.frame_size {
            return;
        }
        self.frame_size = (width, height);
        self.create_frame_buffer();
        log::debug!("frame buffer resized to {width}x{height}");
    }

    /// Drops everything queued since the last `encode` (e.g. after a lost frame).
    pub fn discard_frame(&mut self) {
        self.clears.clear();
        self.draws.clear();
        self.vertices.clear();
        self.projections.clear();
    }

    /// Records the queued frame into `encoder`, presenting to `surface_view`.
    pub fn encode(&mut self, encoder: &mut wgpu::CommandEncoder, surface_view: &wgpu::TextureView) {
        self.upload_vertices();
        self.upload_projections();

        if let Some(fb) = self.textures.get(&self.frame_buffer) {
            let view = fb.texture.create_view(&wgpu::TextureViewDescriptor::default());
            self.record_pass(encoder, RenderTarget::FrameBuffer, &view);
        }
        self.record_pass(encoder, RenderTarget::Screen, surface_view);

        self.discard_frame();
    }

    fn record_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: RenderTarget,
        view: &wgpu::TextureView,
    ) {
        let load = match self.clears.get(&target) {
            Some(c) => wgpu::LoadOp::Clear(to_wgpu_color(*c)),
            None if target == RenderTarget::Screen => wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            None => wgpu::LoadOp::Load,
        };

        let label = match target {
            RenderTarget::FrameBuffer => "tableau frame buffer pass",
            RenderTarget::Screen => "tableau screen pass",
        };

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let (Some(vbo), Some(ibo), Some(projection)) = (
            self.vbo.as_ref(),
            self.ibo.as_ref(),
            self.projection_bind_group.as_ref(),
        ) else {
            return;
        };

        rpass.set_vertex_buffer(0, vbo.slice(..));
        rpass.set_index_buffer(ibo.slice(..), wgpu::IndexFormat::Uint32);

        for draw in self.draws.iter().filter(|d| d.target == target) {
            let Some(pipeline) = self.pipelines.get(&draw.pipeline) else { continue };
            let Some(texture) = self.textures.get(&draw.texture) else { continue };

            let offset = (draw.projection_slot as u64 * self.projection_stride) as u32;
            let quads = draw.vertex_count / VERTICES_PER_QUAD as u32;

            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, projection, &[offset]);
            rpass.set_bind_group(1, &texture.bind_group, &[]);
            rpass.draw_indexed(0..quads * QUAD_INDICES.len() as u32, draw.first_vertex as i32, 0..1);
        }
    }

    // ── resources ─────────────────────────────────────────────────────────

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    fn texture_bind_group(&self, label: &str, texture: &wgpu::Texture) -> wgpu::BindGroup {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.texture_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    fn create_frame_buffer(&mut self) {
        let (width, height) = self.frame_size;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tableau frame buffer"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let bind_group = self.texture_bind_group("tableau frame buffer bind group", &texture);
        self.textures.insert(self.frame_buffer, GpuTexture { texture, bind_group });
    }

    fn upload_texture(&self, label: &str, width: u32, height: u32, rgba: &[u8]) -> GpuTexture {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            size,
        );

        let bind_group = self.texture_bind_group(label, &texture);
        GpuTexture { texture, bind_group }
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) -> bool {
        if self.pipelines.contains_key(&key) {
            return true;
        }
        if self.rejected_pipelines.contains(&key) {
            return false;
        }
        let Some(module) = self.shaders.get(&key.shader) else {
            log::warn!("draw with unknown shader {:?} skipped", key.shader);
            return false;
        };

        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("tableau pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some(ShaderDesc::VERTEX_ENTRY),
                compilation_options: Default::default(),
                buffers: &[vertex_layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some(ShaderDesc::FRAGMENT_ENTRY),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.format,
                    blend: Some(blend_state(key.blend)),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(scope.pop()) {
            log::error!("pipeline for {key:?} rejected, draws skipped: {err}");
            self.rejected_pipelines.insert(key);
            return false;
        }

        log::debug!("created pipeline for {key:?}");
        self.pipelines.insert(key, pipeline);
        true
    }

    // ── uploads ───────────────────────────────────────────────────────────

    fn upload_vertices(&mut self) {
        if self.vertices.is_empty() {
            return;
        }

        let needed = self.vertices.len();
        if needed > self.vbo_capacity || self.vbo.is_none() {
            let cap = needed.next_power_of_two().max(64);
            self.vbo = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("tableau vertex buffer"),
                size: (cap * std::mem::size_of::<Vertex>()) as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
            self.vbo_capacity = cap;
        }

        let quads = self.draws.iter().map(|d| d.vertex_count as usize).max().unwrap_or(0)
            / VERTICES_PER_QUAD;
        if quads > self.ibo_quads || self.ibo.is_none() {
            let cap = quads.next_power_of_two().max(64);
            let indices: Vec<u32> = (0..cap as u32)
                .flat_map(|q| QUAD_INDICES.map(|i| q * VERTICES_PER_QUAD as u32 + i))
                .collect();
            let ibo = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("tableau index buffer"),
                size: (indices.len() * std::mem::size_of::<u32>()) as u64,
                usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.queue.write_buffer(&ibo, 0, bytemuck::cast_slice(&indices));
            self.ibo = Some(ibo);
            self.ibo_quads = cap;
        }

        if let Some(vbo) = self.vbo.as_ref() {
            self.queue.write_buffer(vbo, 0, bytemuck::cast_slice(&self.vertices));
        }
    }

    fn upload_projections(&mut self) {
        if self.projections.is_empty() {
            return;
        }

        let needed = self.projections.len();
        if needed > self.projection_capacity || self.projection_ubo.is_none() {
            let cap = needed.next_power_of_two().max(4);
            let ubo = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("tableau projection ubo"),
                size: cap as u64 * self.projection_stride,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.projection_bind_group = Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("tableau projection bind group"),
                layout: &self.projection_bgl,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &ubo,
                        offset: 0,
                        size: wgpu::BufferSize::new(PROJECTION_SIZE),
                    }),
                }],
            }));
            self.projection_ubo = Some(ubo);
            self.projection_capacity = cap;
        }

        let stride = self.projection_stride as usize;
        let mut staging = vec![0u8; needed * stride];
        for (slot, m) in self.projections.iter().enumerate() {
            let u = ProjectionUniform { matrix: m.to_cols_array_4x4() };
            staging[slot * stride..slot * stride + PROJECTION_SIZE as usize]
                .copy_from_slice(bytemuck::bytes_of(&u));
        }
        if let Some(ubo) = self.projection_ubo.as_ref() {
            self.queue.write_buffer(ubo, 0, &staging);
        }
    }
}

impl GpuBackend for WgpuBackend {
    fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<ShaderId, GpuError> {
        desc.validate()?;
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.into()),
        });
        if let Some(err) = pollster::block_on(scope.pop()) {
            return Err(GpuError::ShaderCompile {
                label: desc.label.to_string(),
                message: err.to_string(),
            });
        }
        let id = ShaderId(self.allocate());
        self.shaders.insert(id, module);
        Ok(id)
    }

    fn destroy_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
        self.pipelines.retain(|k, _| k.shader != shader);
        self.rejected_pipelines.retain(|k| k.shader != shader);
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, GpuError> {
        desc.validate()?;
        let texture = self.upload_texture(desc.label, desc.width, desc.height, desc.rgba);
        let id = TextureId(self.allocate());
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if texture == self.frame_buffer || texture == self.white {
            return;
        }
        if let Some(t) = self.textures.remove(&texture) {
            t.texture.destroy();
        }
    }

    fn frame_buffer_texture(&self) -> TextureId {
        self.frame_buffer
    }

    fn clear(&mut self, target: RenderTarget, color: ColorRgba) {
        self.clears.insert(target, color);
    }

    fn draw_quads(
        &mut self,
        target: RenderTarget,
        program: &RenderProgram,
        projection: &Matrix2D,
        vertices: &[Vertex],
    ) {
        if vertices.is_empty() {
            return;
        }
        let pipeline = PipelineKey { shader: program.shader(), blend: program.blend_mode() };
        if !self.ensure_pipeline(pipeline) {
            return;
        }

        if self.projections.last() != Some(projection) {
            self.projections.push(*projection);
        }
        let projection_slot = (self.projections.len() - 1) as u32;

        let first_vertex = self.vertices.len() as u32;
        self.vertices.extend_from_slice(vertices);

        self.draws.push(QueuedDraw {
            target,
            pipeline,
            texture: program.texture().unwrap_or(self.white),
            projection_slot,
            first_vertex,
            vertex_count: vertices.len() as u32,
        });
    }
}
