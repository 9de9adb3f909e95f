use crate::coords::Matrix2D;

use super::{GpuBackend, GpuError, RenderProgram, RenderTarget, Vertex, VERTICES_PER_QUAD};

/// Identity of one batch instance within a [`GraphicsDevice`](super::GraphicsDevice).
///
/// Ids are never reused, so a removed batch and its replacement compare unequal
/// even when they share a program.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub(crate) u64);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BatchState {
    /// Created or removed from the frame; no vertices accepted.
    Idle,
    /// Between `begin` and `end`.
    Open,
    /// Submitted this frame.
    Flushed,
}

/// Contract violations reported by the batching layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("batch is not open; call begin() first")]
    BatchNotOpen,
    #[error("vertex count {0} is not a whole number of quads")]
    PartialQuad(usize),
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Per-frame vertex accumulator for a single [`RenderProgram`].
#[derive(Debug)]
pub struct GeometryBatch {
    id: BatchId,
    program: RenderProgram,
    vertices: Vec<Vertex>,
    len: usize,
    state: BatchState,
}

impl GeometryBatch {
    pub(crate) fn new(id: BatchId, program: RenderProgram, initial_capacity: usize) -> Self {
        Self {
            id,
            program,
            vertices: Vec::with_capacity(initial_capacity),
            len: 0,
            state: BatchState::Idle,
        }
    }

    #[inline]
    pub fn id(&self) -> BatchId {
        self.id
    }

    #[inline]
    pub fn program(&self) -> &RenderProgram {
        &self.program
    }

    #[inline]
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Vertices written since the last `begin`.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.vertices.len()
    }

    /// Rewinds the write position; storage is kept for the next frame.
    pub fn begin(&mut self) {
        self.len = 0;
        self.state = BatchState::Open;
    }

    pub fn add_vertices(&mut self, vertices: &[Vertex]) -> Result<(), RenderError> {
        if self.state != BatchState::Open {
            return Err(RenderError::BatchNotOpen);
        }
        if vertices.len() % VERTICES_PER_QUAD != 0 {
            return Err(RenderError::PartialQuad(vertices.len()));
        }

        let needed = self.len + vertices.len();
        if needed > self.vertices.len() {
            let mut cap = self.vertices.len().max(VERTICES_PER_QUAD);
            while cap < needed {
                cap *= 2;
            }
            self.vertices.resize(cap, Vertex::default());
        }

        self.vertices[self.len..needed].copy_from_slice(vertices);
        self.len = needed;
        Ok(())
    }

    /// Submits everything written since `begin` as one draw call.
    ///
    /// Returns the number of draw calls issued (0 for an empty batch).
    pub fn end(
        &mut self,
        backend: &mut dyn GpuBackend,
        target: RenderTarget,
        projection: &Matrix2D,
    ) -> usize {
        self.state = BatchState::Flushed;
        if self.len == 0 {
            return 0;
        }
        backend.draw_quads(target, &self.program, projection, self.vertices());
        1
    }

    fn vertices(&self) -> &[Vertex] {
        &self.vertices[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{ColorRgba, Vec2};
    use crate::render::{BlendMode, DrawLayer, RecordingBackend, ShaderId};

    fn program() -> RenderProgram {
        RenderProgram::new(BlendMode::Alpha, None, ShaderId(1), DrawLayer(0))
    }

    fn quad(x: f32) -> [Vertex; 4] {
        let v = |dx: f32, dy: f32| Vertex::new(Vec2::new(x + dx, dy), ColorRgba::WHITE, Vec2::ZERO);
        [v(0.0, 0.0), v(1.0, 0.0), v(1.0, 1.0), v(0.0, 1.0)]
    }

    #[test]
    fn add_before_begin_is_rejected() {
        let mut batch = GeometryBatch::new(BatchId(0), program(), 0);
        assert_eq!(batch.add_vertices(&quad(0.0)), Err(RenderError::BatchNotOpen));
    }

    #[test]
    fn partial_quads_are_rejected() {
        let mut batch = GeometryBatch::new(BatchId(0), program(), 0);
        batch.begin();
        assert_eq!(batch.add_vertices(&quad(0.0)[..3]), Err(RenderError::PartialQuad(3)));
        assert!(batch.is_empty());
    }

    #[test]
    fn storage_grows_by_doubling_and_survives_begin() {
        let mut batch = GeometryBatch::new(BatchId(0), program(), 0);
        batch.begin();
        for i in 0..3 {
            batch.add_vertices(&quad(i as f32)).unwrap();
        }
        assert_eq!(batch.len(), 12);
        assert_eq!(batch.capacity(), 16);
        assert_eq!(batch.vertices()[8], quad(2.0)[0]);

        batch.begin();
        assert_eq!(batch.len(), 0);
        assert_eq!(batch.capacity(), 16);
    }

    #[test]
    fn end_issues_one_draw_for_all_vertices() {
        let mut backend = RecordingBackend::new();
        let mut batch = GeometryBatch::new(BatchId(0), program(), 8);
        batch.begin();
        batch.add_vertices(&quad(0.0)).unwrap();
        batch.add_vertices(&quad(5.0)).unwrap();

        let calls = batch.end(&mut backend, RenderTarget::FrameBuffer, &Matrix2D::IDENTITY);
        assert_eq!(calls, 1);
        assert_eq!(batch.state(), BatchState::Flushed);

        let draws = backend.draws_to(RenderTarget::FrameBuffer);
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].2.len(), 8);
    }

    #[test]
    fn empty_batch_draws_nothing() {
        let mut backend = RecordingBackend::new();
        let mut batch = GeometryBatch::new(BatchId(0), program(), 0);
        batch.begin();
        assert_eq!(batch.end(&mut backend, RenderTarget::FrameBuffer, &Matrix2D::IDENTITY), 0);
        assert!(backend.commands().is_empty());
    }
}
