//! Application contract between the window runtime and user code.

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::FrameCtx;
