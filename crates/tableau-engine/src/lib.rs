//! Tableau engine crate.
//!
//! A 2D scene framework: a transform hierarchy of actors (`scene`), batched
//! by render program into a frame buffer and composited to the window
//! (`render`), driven by a single-window `winit` runtime (`window`).

pub mod coords;
pub mod core;
pub mod device;
pub mod logging;
pub mod render;
pub mod scene;
pub mod time;
pub mod window;
