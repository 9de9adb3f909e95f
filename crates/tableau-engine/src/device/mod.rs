//! wgpu device and surface bring-up.
//!
//! - `Gpu`: Instance/Adapter/Device/Queue plus the configured window surface
//! - `GpuFrame`: one acquired surface texture with its encoder
//! - surface error triage into `SurfaceErrorAction`

mod context;
mod error;
mod frame;
mod init;
mod surface;

pub use context::Gpu;
pub use error::SurfaceErrorAction;
pub use frame::GpuFrame;
pub use init::GpuInit;
