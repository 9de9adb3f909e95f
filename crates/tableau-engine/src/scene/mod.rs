//! Scene hierarchy.
//!
//! Responsibilities:
//! - own every node in an arena (`Level`) with parent/child links by key
//! - cache local/world transforms behind dirty flags, recomputed on read
//! - reparent without moving nodes on screen
//! - defer destruction to a single end-of-frame sweep

mod error;
mod kind;
mod level;
mod node;
mod visual;

pub use error::SceneError;
pub use kind::{Drawable, NodeKind, View};
pub use level::Level;
pub use node::{normalize_rotation, CacheState, NodeId, SceneNode};
pub use visual::{Quad, Sprite, Visual};
