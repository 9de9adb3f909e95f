/// What the runtime should do after `get_current_texture` fails.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface reconfigured; the next frame can render.
    Reconfigured,
    /// Transient; drop this frame's queued draws.
    SkipFrame,
    /// Unrecoverable (out of memory); shut down.
    Fatal,
}
