//! Coordinate, color and transform primitives.
//!
//! Canonical world space:
//! - origin top-left
//! - +X right, +Y down
//! - angles in degrees, positive = clockwise on screen
//!
//! Views convert world space to NDC through their projection matrix.

mod color;
mod matrix;
mod rect;
mod vec2;

pub use color::ColorRgba;
pub use matrix::Matrix2D;
pub use rect::Rect;
pub use vec2::Vec2;
