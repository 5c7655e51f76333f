//! Per-Draw Indirection Record
//!
//! [`NodeIndirectionData`] maps a draw command's single per-draw integer to
//! a `{transform, material}` slot pair, letting the GPU look up arbitrary
//! combinations independent of draw order.

use bytemuck::{Pod, Zeroable};

/// Sentinel marking an unassigned slot index.
pub const INVALID_INDEX: u32 = u32::MAX;

/// GPU-resident indirection record, 16 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct NodeIndirectionData {
    /// Index into the transform buffer.
    pub transform_idx: u32,
    /// Index into the material buffer.
    pub material_idx: u32,
    reserved: [u32; 2],
}

impl NodeIndirectionData {
    /// Record with both indices unassigned.
    pub const INVALID: Self = Self {
        transform_idx: INVALID_INDEX,
        material_idx: INVALID_INDEX,
        reserved: [0; 2],
    };

    #[inline]
    #[must_use]
    pub const fn new(transform_idx: u32, material_idx: u32) -> Self {
        Self {
            transform_idx,
            material_idx,
            reserved: [0; 2],
        }
    }

    /// True when both indices refer to live slots.
    #[inline]
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.transform_idx != INVALID_INDEX && self.material_idx != INVALID_INDEX
    }
}

impl Default for NodeIndirectionData {
    fn default() -> Self {
        Self::INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_16_bytes() {
        assert_eq!(std::mem::size_of::<NodeIndirectionData>(), 16);
    }

    #[test]
    fn invalid_record_is_not_valid() {
        assert!(!NodeIndirectionData::INVALID.is_valid());
        assert!(NodeIndirectionData::new(0, 0).is_valid());
    }
}
