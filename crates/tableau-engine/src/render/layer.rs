use std::cmp::Ordering;

/// Paint-order key for render programs.
///
/// Lower layers are flushed first (further back). Batches on the same layer
/// keep their creation order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct DrawLayer(pub i32);

impl DrawLayer {
    #[inline]
    pub const fn new(v: i32) -> Self {
        Self(v)
    }
}

impl Ord for DrawLayer {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for DrawLayer {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<i32> for DrawLayer {
    #[inline]
    fn from(v: i32) -> Self {
        Self(v)
    }
}
