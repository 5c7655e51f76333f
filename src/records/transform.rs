//! Per-Node Transform Record
//!
//! One [`NodeTransformData`] per visible node, written when the node's
//! transform is dirty and read by the GPU during the matching draw. The
//! previous-frame transform rows feed motion vectors; the packed word feeds
//! animation/LoD state to the vertex stage.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::{UVec4, Vec4};

bitflags! {
    /// Per-node state bits carried in the packed word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u32 {
        /// Node was culled by the occlusion pass this frame.
        const OCCLUSION_CULLED = 1 << 0;
        /// Node is selected in the editor (drives outline rendering).
        const SELECTED = 1 << 1;
    }
}

/// Packed per-node state word.
///
/// Bit layout (shader contract):
///
/// | Bits   | Content          |
/// |--------|------------------|
/// | 0–15   | animation frame  |
/// | 16–23  | bone count       |
/// | 24–27  | LoD level        |
/// | 28–29  | [`NodeFlags`]    |
/// | 30–31  | reserved         |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackedNodeWord(u32);

impl PackedNodeWord {
    #[must_use]
    pub fn new(animation_frame: u16, bone_count: u8, lod_level: u8, flags: NodeFlags) -> Self {
        debug_assert!(lod_level < 16, "LoD level does not fit in 4 bits");
        let word = u32::from(animation_frame)
            | (u32::from(bone_count) << 16)
            | (u32::from(lod_level & 0x0F) << 24)
            | (flags.bits() << 28);
        Self(word)
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn animation_frame(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    #[inline]
    #[must_use]
    pub const fn bone_count(self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    #[inline]
    #[must_use]
    pub const fn lod_level(self) -> u8 {
        ((self.0 >> 24) & 0x0F) as u8
    }

    #[inline]
    #[must_use]
    pub fn flags(self) -> NodeFlags {
        NodeFlags::from_bits_truncate(self.0 >> 28)
    }

    /// Returns a copy with the given flags set or cleared.
    #[must_use]
    pub fn with_flag(self, flag: NodeFlags, set: bool) -> Self {
        let mut flags = self.flags();
        flags.set(flag, set);
        Self((self.0 & 0x0FFF_FFFF) | (flags.bits() << 28))
    }
}

/// GPU-resident transform record, 128 bytes, eight 16-byte rows.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct NodeTransformData {
    /// World position (xyz); w unused.
    pub position: Vec4,
    /// World rotation as a unit quaternion.
    pub rotation: Vec4,
    /// World scale (xyz); w unused.
    pub scale: Vec4,
    /// Previous-frame world position.
    pub prev_position: Vec4,
    /// Previous-frame world rotation.
    pub prev_rotation: Vec4,
    /// Previous-frame world scale.
    pub prev_scale: Vec4,
    /// Bounding sphere: centre (xyz) and radius (w), world space.
    pub bounding_sphere: Vec4,
    /// x = [`PackedNodeWord`]; yzw reserved.
    pub packed: UVec4,
}

impl Default for NodeTransformData {
    fn default() -> Self {
        Self {
            position: Vec4::ZERO,
            rotation: Vec4::W,
            scale: Vec4::ONE,
            prev_position: Vec4::ZERO,
            prev_rotation: Vec4::W,
            prev_scale: Vec4::ONE,
            bounding_sphere: Vec4::ZERO,
            packed: UVec4::ZERO,
        }
    }
}

impl NodeTransformData {
    /// Returns the packed per-node state word.
    #[inline]
    #[must_use]
    pub const fn packed_word(&self) -> PackedNodeWord {
        PackedNodeWord(self.packed.x)
    }

    /// Replaces the packed per-node state word.
    #[inline]
    pub fn set_packed_word(&mut self, word: PackedNodeWord) {
        self.packed.x = word.bits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_128_bytes() {
        assert_eq!(std::mem::size_of::<NodeTransformData>(), 128);
    }

    #[test]
    fn packed_word_round_trips() {
        let word = PackedNodeWord::new(512, 32, 3, NodeFlags::SELECTED);
        assert_eq!(word.animation_frame(), 512);
        assert_eq!(word.bone_count(), 32);
        assert_eq!(word.lod_level(), 3);
        assert_eq!(word.flags(), NodeFlags::SELECTED);
    }

    #[test]
    fn flag_toggle_preserves_payload() {
        let word = PackedNodeWord::new(100, 4, 1, NodeFlags::empty())
            .with_flag(NodeFlags::OCCLUSION_CULLED, true);
        assert_eq!(word.animation_frame(), 100);
        assert_eq!(word.bone_count(), 4);
        assert!(word.flags().contains(NodeFlags::OCCLUSION_CULLED));

        let cleared = word.with_flag(NodeFlags::OCCLUSION_CULLED, false);
        assert_eq!(cleared.flags(), NodeFlags::empty());
        assert_eq!(cleared.lod_level(), 1);
    }
}
