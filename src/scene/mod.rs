//! Collaborator Interface Types
//!
//! The scene graph, material system and asset pipeline live outside this
//! subsystem; they feed it camera snapshots and already-culled
//! visible-node lists through the types in this module, and receive
//! command lists back. Nothing here holds scene state.

pub mod camera;

use std::sync::Arc;

use glam::{Quat, UVec4, Vec3, Vec4};

use crate::records::material::{TEXTURE_SLOT_COUNT, pack_u8x4, unorm8};
use crate::records::{NodeMaterialData, NodeTransformData, PackedNodeWord};

slotmap::new_key_type! {
    /// Stable GUID of a scene node, minted by the scene manager.
    pub struct NodeKey;
}

/// World-space bounding sphere of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    #[inline]
    #[must_use]
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    #[inline]
    #[must_use]
    pub fn to_vec4(self) -> Vec4 {
        self.center.extend(self.radius)
    }
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 0.0)
    }
}

/// Current + previous rigid transform of a node, plus its packed state word.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformSnapshot {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub prev_position: Vec3,
    pub prev_rotation: Quat,
    pub prev_scale: Vec3,
    pub packed: PackedNodeWord,
}

impl Default for TransformSnapshot {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            prev_position: Vec3::ZERO,
            prev_rotation: Quat::IDENTITY,
            prev_scale: Vec3::ONE,
            packed: PackedNodeWord::default(),
        }
    }
}

impl TransformSnapshot {
    /// Lowers the snapshot into the GPU wire format.
    #[must_use]
    pub fn to_record(&self, bounds: BoundingSphere) -> NodeTransformData {
        NodeTransformData {
            position: self.position.extend(0.0),
            rotation: Vec4::from(self.rotation),
            scale: self.scale.extend(0.0),
            prev_position: self.prev_position.extend(0.0),
            prev_rotation: Vec4::from(self.prev_rotation),
            prev_scale: self.prev_scale.extend(0.0),
            bounding_sphere: bounds.to_vec4(),
            packed: UVec4::new(self.packed.bits(), 0, 0, 0),
        }
    }
}

/// How a material participates in the draw buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaMode {
    /// Fully opaque; drawn in the main pass.
    #[default]
    Opaque,
    /// Sorted alpha blending; drawn in the transparency pass.
    Blend,
    /// Weighted order-independent transparency.
    WeightedOit,
}

/// Bump-mapping technique selector, mirrored into the packed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BumpMethod {
    #[default]
    None = 0,
    NormalMap = 1,
    Parallax = 2,
}

/// Shading-model selector, mirrored into the packed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ShadingMode {
    Flat = 0,
    BlinnPhong = 1,
    #[default]
    Pbr = 2,
    Toon = 3,
}

/// Per-texture-slot combine operation, mirrored into the packed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TextureOperation {
    #[default]
    None = 0,
    Multiply = 1,
    Add = 2,
    Replace = 3,
    Decal = 4,
}

/// Unpacked material appearance handed over by the material system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialDescriptor {
    pub albedo: Vec4,
    pub emissive: Vec3,
    pub parallax_factor: f32,
    pub ambient: Vec3,
    pub specular_strength: f32,
    pub specular_color: Vec3,
    pub occlusion: f32,
    pub metallic: f32,
    pub roughness: f32,
    pub double_sided: bool,
    pub bump: BumpMethod,
    pub shading: ShadingMode,
    pub probe_index: u8,
    pub alpha: AlphaMode,
    pub texture_ops: [TextureOperation; TEXTURE_SLOT_COUNT],
}

impl Default for MaterialDescriptor {
    fn default() -> Self {
        Self {
            albedo: Vec4::ONE,
            emissive: Vec3::ZERO,
            parallax_factor: 0.0,
            ambient: Vec3::ZERO,
            specular_strength: 1.0,
            specular_color: Vec3::ONE,
            occlusion: 1.0,
            metallic: 0.0,
            roughness: 1.0,
            double_sided: false,
            bump: BumpMethod::default(),
            shading: ShadingMode::default(),
            probe_index: 0,
            alpha: AlphaMode::default(),
            texture_ops: [TextureOperation::default(); TEXTURE_SLOT_COUNT],
        }
    }
}

impl MaterialDescriptor {
    /// Lowers the descriptor into the GPU wire format.
    ///
    /// The packing is deterministic, so descriptors that compare equal
    /// always produce records with equal content hashes.
    #[must_use]
    pub fn pack(&self) -> NodeMaterialData {
        let mut ops = [0u32; 4];
        for (lane, chunk) in self.texture_ops.chunks(4).enumerate() {
            let mut bytes = [0u8; 4];
            for (byte, op) in bytes.iter_mut().zip(chunk) {
                *byte = *op as u8;
            }
            ops[lane] = pack_u8x4(bytes);
        }

        NodeMaterialData {
            albedo: self.albedo,
            emissive: self.emissive.extend(self.parallax_factor),
            ambient: self.ambient.extend(self.specular_strength),
            packed: UVec4::new(
                pack_u8x4([
                    unorm8(self.occlusion),
                    unorm8(self.metallic),
                    unorm8(self.roughness),
                    u8::from(self.double_sided),
                ]),
                pack_u8x4([
                    unorm8(self.specular_color.x),
                    unorm8(self.specular_color.y),
                    unorm8(self.specular_color.z),
                    self.bump as u8,
                ]),
                pack_u8x4([self.shading as u8, self.probe_index, 0, 0]),
                0,
            ),
            texture_ops: UVec4::from_array(ops),
        }
    }
}

/// Geometry of one draw, produced by a node's rendering component.
///
/// Opaque to this subsystem beyond its identity — the command-buffer
/// consumer resolves `geometry_id` to actual vertex/index storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawGeometry {
    /// Backend handle of the geometry's vertex/index storage.
    pub geometry_id: u64,
    pub first_index: u32,
    pub index_count: u32,
    pub base_vertex: i32,
    pub instance_count: u32,
}

impl DrawGeometry {
    #[must_use]
    pub const fn new(geometry_id: u64, index_count: u32) -> Self {
        Self {
            geometry_id,
            first_index: 0,
            index_count,
            base_vertex: 0,
            instance_count: 1,
        }
    }
}

/// The rendering side of a scene node.
///
/// Implemented by the scene layer's rendering component. Implementations
/// must call
/// [`RenderPassManager::on_rendering_component_destruction`](crate::graph::manager::RenderPassManager::on_rendering_component_destruction)
/// when the node is destroyed so its buffer slots are released.
pub trait RenderingComponent: Send + Sync {
    /// Current + previous transform of the node.
    fn transform(&self) -> TransformSnapshot;

    /// True when the transform changed since it was last mirrored to the
    /// GPU; clean nodes skip the per-frame record write.
    fn transform_dirty(&self) -> bool;

    /// Current material appearance of the node.
    fn material(&self) -> MaterialDescriptor;

    /// Geometry for the node's draw command.
    fn draw_geometry(&self) -> DrawGeometry;
}

/// One entry of the per-stage visible-node list (already culled and sorted
/// by the scene manager).
#[derive(Clone)]
pub struct VisibleNode {
    pub key: NodeKey,
    pub bounds: BoundingSphere,
    pub component: Arc<dyn RenderingComponent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::hash_material_data;

    #[test]
    fn equal_descriptors_pack_to_equal_hashes() {
        let a = MaterialDescriptor::default();
        let b = MaterialDescriptor::default();
        assert_eq!(
            hash_material_data(&a.pack()),
            hash_material_data(&b.pack())
        );
    }

    #[test]
    fn roughness_lands_in_lane_x() {
        let desc = MaterialDescriptor {
            roughness: 1.0,
            metallic: 0.0,
            occlusion: 0.0,
            double_sided: true,
            ..MaterialDescriptor::default()
        };
        let record = desc.pack();
        let bytes = crate::records::material::unpack_u8x4(record.packed.x);
        assert_eq!(bytes, [0, 0, 255, 1]);
    }

    #[test]
    fn texture_ops_pack_four_per_lane() {
        let mut ops = [TextureOperation::None; TEXTURE_SLOT_COUNT];
        ops[0] = TextureOperation::Multiply;
        ops[5] = TextureOperation::Decal;
        let desc = MaterialDescriptor {
            texture_ops: ops,
            ..MaterialDescriptor::default()
        };
        let record = desc.pack();
        assert_eq!(record.texture_ops.x & 0xFF, 1);
        assert_eq!((record.texture_ops.y >> 8) & 0xFF, 4);
    }
}
