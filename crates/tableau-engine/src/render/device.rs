use std::collections::HashMap;

use crate::coords::{ColorRgba, Matrix2D};
use crate::scene::{Level, NodeId};

use super::{
    BatchId, BlendMode, DrawLayer, GeometryBatch, GpuBackend, RenderError, RenderProgram,
    RenderTarget, ShaderDesc, ShaderId, TextureDesc, TextureId, FULLSCREEN_QUAD,
};

/// Graphics device configuration.
#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig {
    /// Frame-buffer clear color.
    pub clear_color: ColorRgba,
    /// Vertex capacity reserved for each new batch.
    pub initial_batch_capacity: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            clear_color: ColorRgba::BLACK,
            initial_batch_capacity: 256,
        }
    }
}

/// Counters for one `draw_batches` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Live batches after garbage collection.
    pub batches: usize,
    /// Backend draw calls, including the composite pass.
    pub draw_calls: usize,
    /// Vertices submitted into the frame buffer.
    pub vertices: usize,
    pub batches_created: usize,
    pub batches_removed: usize,
}

/// Owns the live geometry batches and runs the per-frame draw cycle.
///
/// Batches are kept in draw order (ascending layer). Batches on the same
/// layer keep their creation order, so the relative order of same-layer
/// programs depends on which drawable first needed them.
#[derive(Debug)]
pub struct GraphicsDevice {
    config: DeviceConfig,

    batches: Vec<GeometryBatch>,
    by_program: HashMap<RenderProgram, usize>,
    by_id: HashMap<BatchId, usize>,
    next_batch_id: u64,
    hot: bool,

    default_shader: ShaderId,
    post_shader: ShaderId,

    // Reused drawable snapshot; no per-frame allocation once warmed.
    frame_order: Vec<NodeId>,
}

impl GraphicsDevice {
    /// Compiles the built-in shaders on `backend`.
    pub fn new(backend: &mut dyn GpuBackend, config: DeviceConfig) -> Result<Self, RenderError> {
        let default_shader = backend.create_shader(&ShaderDesc::sprite())?;
        let post_shader = backend.create_shader(&ShaderDesc::post_process())?;
        log::debug!("graphics device ready (default shader {default_shader:?}, post shader {post_shader:?})");

        Ok(Self {
            config,
            batches: Vec::new(),
            by_program: HashMap::new(),
            by_id: HashMap::new(),
            next_batch_id: 0,
            hot: false,
            default_shader,
            post_shader,
            frame_order: Vec::new(),
        })
    }

    #[inline]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn set_clear_color(&mut self, color: ColorRgba) {
        self.config.clear_color = color;
    }

    #[inline]
    pub fn default_shader(&self) -> ShaderId {
        self.default_shader
    }

    #[inline]
    pub fn post_process_shader(&self) -> ShaderId {
        self.post_shader
    }

    /// Alpha-blended program on layer 0 using the default shader.
    pub fn sprite_program(&self, texture: Option<TextureId>) -> RenderProgram {
        RenderProgram::new(BlendMode::Alpha, texture, self.default_shader, DrawLayer(0))
    }

    /// `true` between the start and the end of `draw_batches`.
    #[inline]
    pub fn is_hot(&self) -> bool {
        self.hot
    }

    /// Live batches in draw order.
    #[inline]
    pub fn batches(&self) -> &[GeometryBatch] {
        &self.batches
    }

    pub fn batch(&self, id: BatchId) -> Option<&GeometryBatch> {
        self.by_id.get(&id).map(|&slot| &self.batches[slot])
    }

    // ── resources ───────────────────────────────────────────────────────────

    /// Compiles a shader, falling back to the default shader on failure.
    pub fn load_shader(&mut self, backend: &mut dyn GpuBackend, desc: &ShaderDesc<'_>) -> ShaderId {
        match backend.create_shader(desc) {
            Ok(id) => id,
            Err(err) => {
                log::error!("{err}; using the default shader");
                self.default_shader
            }
        }
    }

    /// Uploads a texture. Failures are logged and yield `None`, which draws untextured.
    pub fn load_texture(&mut self, backend: &mut dyn GpuBackend, desc: &TextureDesc<'_>) -> Option<TextureId> {
        match backend.create_texture(desc) {
            Ok(id) => Some(id),
            Err(err) => {
                log::error!("{err}; drawing untextured");
                None
            }
        }
    }

    // ── batches ─────────────────────────────────────────────────────────────

    pub fn find_batch(&self, program: &RenderProgram) -> Option<BatchId> {
        self.by_program.get(program).map(|&slot| self.batches[slot].id())
    }

    /// Registers a batch for `program`, or returns the existing one.
    ///
    /// While a frame is in flight the new batch is begun immediately.
    pub fn create_batch(&mut self, program: RenderProgram) -> BatchId {
        self.create_slot(program).0
    }

    fn create_slot(&mut self, program: RenderProgram) -> (BatchId, bool) {
        if let Some(id) = self.find_batch(&program) {
            return (id, false);
        }

        let id = BatchId(self.next_batch_id);
        self.next_batch_id += 1;

        let mut batch = GeometryBatch::new(id, program, self.config.initial_batch_capacity);
        if self.hot {
            batch.begin();
        }
        self.batches.push(batch);
        self.sort_batches_by_draw_layer();

        log::debug!("created batch {id:?} for {program:?}");
        (id, true)
    }

    /// Stable ascending sort by layer; rebuilds the lookup tables.
    pub fn sort_batches_by_draw_layer(&mut self) {
        self.batches.sort_by_key(|b| b.program().layer());

        self.by_program.clear();
        self.by_id.clear();
        for (slot, batch) in self.batches.iter().enumerate() {
            self.by_program.insert(*batch.program(), slot);
            self.by_id.insert(batch.id(), slot);
        }
    }

    /// Drops batches that received no vertices since their last `begin`.
    pub fn remove_empty_batches(&mut self) -> usize {
        let before = self.batches.len();
        self.batches.retain(|b| !b.is_empty());
        let removed = before - self.batches.len();
        if removed > 0 {
            log::debug!("removed {removed} empty batches");
            self.sort_batches_by_draw_layer();
        }
        removed
    }

    // ── frame ───────────────────────────────────────────────────────────────

    /// Runs one frame: collects every visible drawable into batches, flushes
    /// them into the frame buffer in layer order, then composites the frame
    /// buffer onto the screen.
    pub fn draw_batches(&mut self, level: &mut Level, backend: &mut dyn GpuBackend) -> FrameStats {
        let mut stats = FrameStats::default();

        for batch in &mut self.batches {
            batch.begin();
        }
        self.hot = true;

        let mut order = std::mem::take(&mut self.frame_order);
        order.clear();
        order.extend_from_slice(level.drawables());
        for &id in &order {
            self.submit(level, id, &mut stats);
        }
        self.frame_order = order;

        stats.batches_removed = self.remove_empty_batches();

        backend.clear(RenderTarget::FrameBuffer, self.config.clear_color);
        let projection = level.projection();
        for batch in &mut self.batches {
            stats.vertices += batch.len();
            stats.draw_calls += batch.end(backend, RenderTarget::FrameBuffer, &projection);
        }
        stats.batches = self.batches.len();

        let composite = RenderProgram::new(
            BlendMode::None,
            Some(backend.frame_buffer_texture()),
            self.post_shader,
            DrawLayer(0),
        );
        backend.draw_quads(RenderTarget::Screen, &composite, &Matrix2D::IDENTITY, &FULLSCREEN_QUAD);
        stats.draw_calls += 1;

        self.hot = false;
        stats
    }

    fn submit(&mut self, level: &mut Level, id: NodeId, stats: &mut FrameStats) {
        let Some(drawable) = level.frame_drawable(id) else {
            return;
        };

        let program_dirty = drawable.take_program_dirty();
        let assigned = drawable
            .batch
            .filter(|_| !program_dirty)
            .and_then(|b| self.by_id.get(&b).copied());

        let slot = match assigned {
            Some(slot) => slot,
            None => {
                let (batch_id, created) = self.create_slot(*drawable.program());
                if created {
                    stats.batches_created += 1;
                }
                drawable.batch = Some(batch_id);
                match self.by_id.get(&batch_id) {
                    Some(&slot) => slot,
                    None => return,
                }
            }
        };

        let Some(drawable) = level.refresh_drawable(id) else {
            return;
        };
        if drawable.vertices().is_empty() {
            return;
        }
        if let Err(err) = self.batches[slot].add_vertices(drawable.vertices()) {
            log::error!("dropping geometry of node {id:?}: {err}");
        }
    }
}
