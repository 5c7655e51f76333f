//! GPU Node-Data Records
//!
//! The three packed structs mirrored byte-for-byte into GPU-resident
//! buffers. Their layout is a compatibility contract with the shader code
//! that unpacks them and must not be altered without a coordinated shader
//! change.

pub mod indirection;
pub mod material;
pub mod transform;

pub use indirection::{INVALID_INDEX, NodeIndirectionData};
pub use material::{NodeMaterialData, TEXTURE_SLOT_COUNT, hash_material_data};
pub use transform::{NodeFlags, NodeTransformData, PackedNodeWord};
