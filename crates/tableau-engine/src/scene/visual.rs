use std::fmt;

use crate::coords::{ColorRgba, Matrix2D, Rect, Vec2};
use crate::render::Vertex;

/// Content provider for a drawable node.
///
/// `generate` appends whole quads (4 vertices each, TL/TR/BR/BL) already
/// transformed into world space.
pub trait Visual: fmt::Debug {
    /// Untransformed bounds in local pixels. The node's origin fraction is
    /// resolved against this rectangle.
    fn local_bounds(&self) -> Rect;

    fn generate(&self, world: &Matrix2D, out: &mut Vec<Vertex>);
}

fn push_quad(out: &mut Vec<Vertex>, world: &Matrix2D, bounds: Rect, uv: Rect, color: ColorRgba) {
    let corners = bounds.corners();
    let uvs = uv.corners();
    for (corner, uv) in corners.into_iter().zip(uvs) {
        out.push(Vertex::new(world.transform_point(corner), color, uv));
    }
}

/// Textured quad with a UV sub-rectangle and a tint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sprite {
    pub size: Vec2,
    /// Normalized texture coordinates sampled across the quad.
    pub uv: Rect,
    pub tint: ColorRgba,
}

impl Sprite {
    pub const FULL_UV: Rect = Rect::new(0.0, 0.0, 1.0, 1.0);

    pub fn new(size: Vec2) -> Self {
        Self { size, uv: Self::FULL_UV, tint: ColorRgba::WHITE }
    }

    pub fn with_uv(self, uv: Rect) -> Self {
        Self { uv, ..self }
    }

    pub fn with_tint(self, tint: ColorRgba) -> Self {
        Self { tint, ..self }
    }
}

impl Visual for Sprite {
    fn local_bounds(&self) -> Rect {
        Rect::from_size(self.size)
    }

    fn generate(&self, world: &Matrix2D, out: &mut Vec<Vertex>) {
        let bounds = self.local_bounds();
        if bounds.is_empty() {
            return;
        }
        push_quad(out, world, bounds, self.uv, self.tint);
    }
}

/// Solid colored rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub size: Vec2,
    pub color: ColorRgba,
}

impl Quad {
    pub fn new(size: Vec2, color: ColorRgba) -> Self {
        Self { size, color }
    }
}

impl Visual for Quad {
    fn local_bounds(&self) -> Rect {
        Rect::from_size(self.size)
    }

    fn generate(&self, world: &Matrix2D, out: &mut Vec<Vertex>) {
        let bounds = self.local_bounds();
        if bounds.is_empty() {
            return;
        }
        push_quad(out, world, bounds, Sprite::FULL_UV, self.color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprite_emits_one_transformed_quad() {
        let sprite = Sprite::new(Vec2::new(4.0, 2.0))
            .with_uv(Rect::new(0.5, 0.0, 0.5, 0.5))
            .with_tint(ColorRgba::BLACK);
        let world = Matrix2D::from_translation(Vec2::new(10.0, 20.0));

        let mut out = Vec::new();
        sprite.generate(&world, &mut out);

        assert_eq!(out.len(), 4);
        assert_eq!(out[0].position, [10.0, 20.0]);
        assert_eq!(out[2].position, [14.0, 22.0]);
        assert_eq!(out[1].uv, [1.0, 0.0]);
        assert_eq!(out[3].uv, [0.5, 0.5]);
        assert_eq!(out[0].color, ColorRgba::BLACK.to_array());
    }

    #[test]
    fn empty_quad_emits_nothing() {
        let mut out = Vec::new();
        Quad::new(Vec2::new(0.0, 5.0), ColorRgba::WHITE).generate(&Matrix2D::IDENTITY, &mut out);
        assert!(out.is_empty());
    }
}
