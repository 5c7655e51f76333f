//! Per-Material Appearance Record
//!
//! [`NodeMaterialData`] packs a material's full appearance into 80 bytes.
//! Many nodes sharing an identical configuration share one slot, identified
//! by the content hash from [`hash_material_data`].

use bytemuck::{Pod, Zeroable};
use glam::{UVec4, Vec4};
use xxhash_rust::xxh3::xxh3_64;

/// Number of texture slots carrying an operation code.
pub const TEXTURE_SLOT_COUNT: usize = 16;

/// GPU-resident material record, 80 bytes, five 16-byte rows.
///
/// The `packed` row uses four-lane uint8 packing (little-endian within each
/// u32 lane):
///
/// | Lane | Bytes 0..4                                          |
/// |------|-----------------------------------------------------|
/// | x    | occlusion, metallic, roughness, double-sided        |
/// | y    | specular r, specular g, specular b, bump method     |
/// | z    | shading mode, probe index, reserved, reserved       |
/// | w    | reserved                                            |
///
/// `texture_ops` carries one u8 operation code per texture slot, four slots
/// per lane.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct NodeMaterialData {
    /// Base colour and opacity.
    pub albedo: Vec4,
    /// Emissive colour (rgb) and parallax factor (w).
    pub emissive: Vec4,
    /// Ambient colour (rgb) and specular strength (w).
    pub ambient: Vec4,
    /// Packed uint8 groups, see struct docs.
    pub packed: UVec4,
    /// Per-texture-slot operation codes, packed four per lane.
    pub texture_ops: UVec4,
}

impl Default for NodeMaterialData {
    fn default() -> Self {
        Self {
            albedo: Vec4::ONE,
            emissive: Vec4::ZERO,
            ambient: Vec4::new(0.0, 0.0, 0.0, 1.0),
            packed: UVec4::ZERO,
            texture_ops: UVec4::ZERO,
        }
    }
}

/// Packs four bytes into one u32 lane, first byte in the low bits.
#[inline]
#[must_use]
pub const fn pack_u8x4(bytes: [u8; 4]) -> u32 {
    (bytes[0] as u32)
        | ((bytes[1] as u32) << 8)
        | ((bytes[2] as u32) << 16)
        | ((bytes[3] as u32) << 24)
}

/// Unpacks one u32 lane into four bytes, low bits first.
#[inline]
#[must_use]
pub const fn unpack_u8x4(lane: u32) -> [u8; 4] {
    [
        (lane & 0xFF) as u8,
        ((lane >> 8) & 0xFF) as u8,
        ((lane >> 16) & 0xFF) as u8,
        ((lane >> 24) & 0xFF) as u8,
    ]
}

/// Quantizes a `[0, 1]` float to unorm8.
#[inline]
#[must_use]
pub fn unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

/// Content hash identifying a material configuration.
///
/// Two records with equal bytes always hash equal; the material buffer uses
/// this to share one GPU slot between nodes with identical appearance. The
/// hash of a live slot must remain stable for the slot's lifetime.
#[inline]
#[must_use]
pub fn hash_material_data(data: &NodeMaterialData) -> u64 {
    xxh3_64(bytemuck::bytes_of(data))
}
