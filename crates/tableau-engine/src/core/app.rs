use winit::event::WindowEvent;

use super::ctx::FrameCtx;

/// Returned by app callbacks to keep running or stop the runtime.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application driven by [`Runtime`](crate::window::Runtime).
pub trait App {
    /// Called once, after the window, GPU and level exist. Build the scene here.
    fn on_start(&mut self, ctx: &mut FrameCtx<'_>) {
        let _ = ctx;
    }

    /// Raw window events, before the runtime handles resize/close.
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let _ = event;
        AppControl::Continue
    }

    /// Called once per frame before batching. Nodes destroyed here are swept
    /// after the frame is rendered.
    fn on_tick(&mut self, ctx: &mut FrameCtx<'_>) -> AppControl;
}
