/// Contract violations reported by [`Level`](super::Level) operations.
#[derive(Debug, Copy, Clone, PartialEq, thiserror::Error)]
pub enum SceneError {
    #[error("node id does not refer to a live node")]
    UnknownNode,
    #[error("a node cannot be its own parent")]
    SelfParent,
    #[error("node is immutable")]
    Immutable,
    #[error("node is pending destruction")]
    PendingDestruction,
    #[error("node has no parent")]
    Detached,
    #[error("origin ({x}, {y}) is outside [0, 1]")]
    OriginOutOfRange { x: f32, y: f32 },
    #[error("node is not a view")]
    NotAView,
}
