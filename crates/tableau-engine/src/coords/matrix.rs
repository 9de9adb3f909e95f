use core::ops::Mul;

use super::{Rect, Vec2};

/// 3×3 affine transform for 2D points, stored row-major.
///
/// Layout:
/// ```text
/// | m[0] m[1] m[2] |   | a  b  tx |
/// | m[3] m[4] m[5] | = | c  d  ty |
/// | m[6] m[7] m[8] |   | 0  0  1  |
/// ```
///
/// Points are column vectors: `p' = M * p`. `a * b` applies `b` first, then `a`.
/// Angles are degrees, positive = clockwise on screen (+Y down).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Matrix2D {
    m: [f32; 9],
}

impl Default for Matrix2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix2D {
    pub const IDENTITY: Matrix2D = Matrix2D {
        m: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
    };

    #[allow(clippy::too_many_arguments)]
    #[inline]
    pub const fn new(
        a00: f32,
        a01: f32,
        a02: f32,
        a10: f32,
        a11: f32,
        a12: f32,
        a20: f32,
        a21: f32,
        a22: f32,
    ) -> Self {
        Self {
            m: [a00, a01, a02, a10, a11, a12, a20, a21, a22],
        }
    }

    #[inline]
    pub const fn from_translation(t: Vec2) -> Self {
        Self::new(1.0, 0.0, t.x, 0.0, 1.0, t.y, 0.0, 0.0, 1.0)
    }

    #[inline]
    pub const fn from_scale(s: Vec2) -> Self {
        Self::new(s.x, 0.0, 0.0, 0.0, s.y, 0.0, 0.0, 0.0, 1.0)
    }

    #[inline]
    pub fn from_rotation(degrees: f32) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        Self::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
    }

    /// `T(position) * R(rotation) * S(scale) * T(-origin)` in closed form.
    ///
    /// `origin` is the pivot in local pixels; it lands exactly on `position`.
    pub fn from_local_transform(position: Vec2, rotation: f32, scale: Vec2, origin: Vec2) -> Self {
        let (s, c) = rotation.to_radians().sin_cos();
        let a00 = c * scale.x;
        let a01 = -s * scale.y;
        let a10 = s * scale.x;
        let a11 = c * scale.y;
        let tx = position.x - (a00 * origin.x + a01 * origin.y);
        let ty = position.y - (a10 * origin.x + a11 * origin.y);
        Self::new(a00, a01, tx, a10, a11, ty, 0.0, 0.0, 1.0)
    }

    /// Row-major elements.
    #[inline]
    pub fn to_array(&self) -> [f32; 9] {
        self.m
    }

    /// Column-major 4×4 expansion, suitable for a WGSL `mat4x4<f32>` uniform.
    pub fn to_cols_array_4x4(&self) -> [[f32; 4]; 4] {
        let m = &self.m;
        [
            [m[0], m[3], 0.0, m[6]],
            [m[1], m[4], 0.0, m[7]],
            [0.0, 0.0, 1.0, 0.0],
            [m[2], m[5], 0.0, m[8]],
        ]
    }

    #[inline]
    pub fn translation(&self) -> Vec2 {
        Vec2::new(self.m[2], self.m[5])
    }

    /// Returns `self * rhs` (apply `rhs` first).
    pub fn combine(&self, rhs: &Matrix2D) -> Matrix2D {
        let a = &self.m;
        let b = &rhs.m;
        let mut out = [0.0f32; 9];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 3 + col] = a[row * 3] * b[col]
                    + a[row * 3 + 1] * b[3 + col]
                    + a[row * 3 + 2] * b[6 + col];
            }
        }
        Matrix2D { m: out }
    }

    #[inline]
    pub fn determinant(&self) -> f32 {
        let m = &self.m;
        m[0] * (m[4] * m[8] - m[5] * m[7]) - m[1] * (m[3] * m[8] - m[5] * m[6])
            + m[2] * (m[3] * m[7] - m[4] * m[6])
    }

    /// Closed-form cofactor inverse.
    ///
    /// A singular matrix (determinant exactly zero) yields the identity.
    pub fn inverse(&self) -> Matrix2D {
        let m = &self.m;

        let c00 = m[4] * m[8] - m[5] * m[7];
        let c01 = -(m[3] * m[8] - m[5] * m[6]);
        let c02 = m[3] * m[7] - m[4] * m[6];
        let c10 = -(m[1] * m[8] - m[2] * m[7]);
        let c11 = m[0] * m[8] - m[2] * m[6];
        let c12 = -(m[0] * m[7] - m[1] * m[6]);
        let c20 = m[1] * m[5] - m[2] * m[4];
        let c21 = -(m[0] * m[5] - m[2] * m[3]);
        let c22 = m[0] * m[4] - m[1] * m[3];

        let det = m[0] * c00 + m[1] * c01 + m[2] * c02;
        if det == 0.0 {
            return Matrix2D::IDENTITY;
        }

        let inv = 1.0 / det;
        // Adjugate = transposed cofactors.
        Matrix2D::new(
            c00 * inv,
            c10 * inv,
            c20 * inv,
            c01 * inv,
            c11 * inv,
            c21 * inv,
            c02 * inv,
            c12 * inv,
            c22 * inv,
        )
    }

    #[inline]
    pub fn transform_point(&self, p: Vec2) -> Vec2 {
        let m = &self.m;
        Vec2::new(
            m[0] * p.x + m[1] * p.y + m[2],
            m[3] * p.x + m[4] * p.y + m[5],
        )
    }

    /// Transforms all four corners and returns their axis-aligned bounding box.
    pub fn transform_rect(&self, rect: Rect) -> Rect {
        let corners = rect.normalized().corners().map(|c| self.transform_point(c));

        let mut min = corners[0];
        let mut max = corners[0];
        for c in &corners[1..] {
            min.x = min.x.min(c.x);
            min.y = min.y.min(c.y);
            max.x = max.x.max(c.x);
            max.y = max.y.max(c.y);
        }

        Rect::from_min_max(min, max)
    }
}

impl Mul for Matrix2D {
    type Output = Matrix2D;
    #[inline]
    fn mul(self, rhs: Matrix2D) -> Matrix2D {
        self.combine(&rhs)
    }
}

impl Mul<Vec2> for Matrix2D {
    type Output = Vec2;
    #[inline]
    fn mul(self, rhs: Vec2) -> Vec2 {
        self.transform_point(rhs)
    }
}
