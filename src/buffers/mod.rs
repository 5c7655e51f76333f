//! Executor Buffers
//!
//! Host-side mirrors + GPU-resident storage for the three node-data record
//! kinds, with free-list slot management, dirty-range tracking and
//! hash-based material deduplication.
//!
//! # Consistency Model
//!
//! Each buffer is mutated under an exclusive lock owned by
//! [`RenderGraphContext`](crate::graph::context::RenderGraphContext). Writes
//! widen the frame's [`BufferUpdateRange`]; `commit` uploads exactly that
//! byte range once per frame and resets it. Resizing is deferred to the next
//! frame boundary and never overlaps a commit.

pub mod arena;
pub mod material;
pub mod node_buffer;
pub mod range;
pub mod sink;

pub use arena::{SlotArena, SlotIndex};
pub use material::{MaterialBuffer, MaterialLease, MaterialLookupInfo};
pub use node_buffer::{IndirectionBuffer, NodeDataBuffer, TransformBuffer};
pub use range::BufferUpdateRange;
pub use sink::{NodeDataSink, WgpuNodeDataSink};

use crate::records::{NodeIndirectionData, NodeMaterialData, NodeTransformData};

/// Identifies one of the three node-data buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeBufferKind {
    /// Per-node transform records.
    Transform,
    /// Deduplicated material records.
    Material,
    /// Per-draw indirection records.
    Indirection,
}

impl NodeBufferKind {
    /// Byte stride of one record of this kind.
    #[must_use]
    pub const fn stride(self) -> u64 {
        match self {
            Self::Transform => std::mem::size_of::<NodeTransformData>() as u64,
            Self::Material => std::mem::size_of::<NodeMaterialData>() as u64,
            Self::Indirection => std::mem::size_of::<NodeIndirectionData>() as u64,
        }
    }

    /// Debug label used for GPU objects and log lines.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Transform => "NodeTransformBuffer",
            Self::Material => "NodeMaterialBuffer",
            Self::Indirection => "NodeIndirectionBuffer",
        }
    }
}
