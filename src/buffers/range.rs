//! Dirty-Range Tracking
//!
//! [`BufferUpdateRange`] is the minimal contiguous index span requiring
//! upload to the GPU this frame. It is a superset of every index mutated
//! since the last flush and resets to the empty sentinel after a flush.

/// Contiguous dirty index span over a node-data buffer.
///
/// The empty state is `first_idx = u32::MAX, last_idx = 0`; any `widen`
/// collapses it to a one-slot span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUpdateRange {
    first_idx: u32,
    last_idx: u32,
}

impl BufferUpdateRange {
    /// The empty range.
    pub const EMPTY: Self = Self {
        first_idx: u32::MAX,
        last_idx: 0,
    };

    /// True when no index has been marked since the last reset.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first_idx > self.last_idx
    }

    /// Widens the range to cover `idx`.
    #[inline]
    pub fn widen(&mut self, idx: u32) {
        if idx < self.first_idx {
            self.first_idx = idx;
        }
        if idx > self.last_idx {
            self.last_idx = idx;
        }
    }

    /// Widens the range to cover another range.
    pub fn merge(&mut self, other: &Self) {
        if other.is_empty() {
            return;
        }
        self.widen(other.first_idx);
        self.widen(other.last_idx);
    }

    /// Resets to the empty state. Called after each flush.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::EMPTY;
    }

    /// First dirty index. Meaningless when empty.
    #[inline]
    #[must_use]
    pub const fn first_idx(&self) -> u32 {
        self.first_idx
    }

    /// Last dirty index (inclusive). Meaningless when empty.
    #[inline]
    #[must_use]
    pub const fn last_idx(&self) -> u32 {
        self.last_idx
    }

    /// Number of slots covered.
    #[inline]
    #[must_use]
    pub const fn slot_count(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.last_idx - self.first_idx + 1
        }
    }

    /// Byte offset of the span for a record stride.
    #[inline]
    #[must_use]
    pub const fn byte_offset(&self, stride: u64) -> u64 {
        self.first_idx as u64 * stride
    }

    /// Byte length of the span for a record stride.
    #[inline]
    #[must_use]
    pub const fn byte_len(&self, stride: u64) -> u64 {
        self.slot_count() as u64 * stride
    }

    /// True when `idx` lies inside the current span.
    #[inline]
    #[must_use]
    pub const fn contains(&self, idx: u32) -> bool {
        !self.is_empty() && idx >= self.first_idx && idx <= self.last_idx
    }
}

impl Default for BufferUpdateRange {
    fn default() -> Self {
        Self::EMPTY
    }
}
