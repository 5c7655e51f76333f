//! Render Pass Parameters
//!
//! `RenderPassParams` carries a stage's fixed rendering recipe — targets,
//! clears, draw masks, sub-pass selection and dependencies — from the
//! [`RenderPass`](crate::graph::pass::RenderPass) into the executor. It is
//! plain data; the executor never reaches back into the pass.

use bitflags::bitflags;
use smallvec::SmallVec;

use super::stage::RenderStage;
use crate::scene::NodeKey;

/// Opaque handle to a render target owned by the device layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub u32);

/// Well-known target handles for the built-in stage recipes.
pub mod targets {
    use super::TargetId;

    pub const BACK_BUFFER: TargetId = TargetId(0);
    pub const SHADOW_MAP: TargetId = TargetId(1);
    pub const REFLECTION_COLOR: TargetId = TargetId(2);
    pub const REFLECTION_DEPTH: TargetId = TargetId(3);
    pub const REFRACTION_COLOR: TargetId = TargetId(4);
    pub const REFRACTION_DEPTH: TargetId = TargetId(5);
    pub const SCENE_COLOR: TargetId = TargetId(6);
    pub const SCENE_DEPTH: TargetId = TargetId(7);
    pub const PREVIEW_COLOR: TargetId = TargetId(8);
    pub const PREVIEW_DEPTH: TargetId = TargetId(9);
}

bitflags! {
    /// Which geometry buckets a pass draws.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DrawMask: u32 {
        const OPAQUE = 1 << 0;
        const TRANSPARENT = 1 << 1;
        const WEIGHTED_OIT = 1 << 2;
    }
}

impl DrawMask {
    /// Every bucket.
    pub const ALL_BUCKETS: Self = Self::all();
}

bitflags! {
    /// Which optional sub-passes a stage runs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SubPassFlags: u32 {
        /// Depth/geometry-only pre-pass.
        const PRE_PASS = 1 << 0;
        /// Hierarchical-Z occlusion filtering.
        const OCCLUSION_CULL = 1 << 1;
        /// Sorted alpha-blend pass.
        const TRANSPARENCY = 1 << 2;
        /// Weighted order-independent transparency pass.
        const WEIGHTED_OIT = 1 << 3;
    }
}

/// Clear operations applied when a pass begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearOps {
    /// Clear colour for every colour target, or `None` to load.
    pub color: Option<[f64; 4]>,
    /// Depth clear value, or `None` to load. Reverse-Z: far plane is 0.
    pub depth: Option<f32>,
}

impl ClearOps {
    pub const NONE: Self = Self {
        color: None,
        depth: None,
    };

    #[must_use]
    pub const fn color_and_depth(color: [f64; 4], depth: f32) -> Self {
        Self {
            color: Some(color),
            depth: Some(depth),
        }
    }

    #[must_use]
    pub const fn depth_only(depth: f32) -> Self {
        Self {
            color: None,
            depth: Some(depth),
        }
    }
}

/// Target configuration of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDesc {
    pub color_targets: SmallVec<[TargetId; 4]>,
    pub depth_target: Option<TargetId>,
    pub clear: ClearOps,
    pub msaa_samples: u32,
}

impl RenderTargetDesc {
    #[must_use]
    pub fn color_depth(color: TargetId, depth: TargetId, clear: ClearOps) -> Self {
        Self {
            color_targets: SmallVec::from_slice(&[color]),
            depth_target: Some(depth),
            clear,
            msaa_samples: 1,
        }
    }

    #[must_use]
    pub fn depth_only(depth: TargetId, clear: ClearOps) -> Self {
        Self {
            color_targets: SmallVec::new(),
            depth_target: Some(depth),
            clear,
            msaa_samples: 1,
        }
    }
}

/// The full per-stage pass recipe handed to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassParams {
    pub stage: RenderStage,
    /// Stages that must reach completion before this stage submits.
    pub dependencies: SmallVec<[RenderStage; 4]>,
    pub target: RenderTargetDesc,
    pub draw_mask: DrawMask,
    pub sub_passes: SubPassFlags,
    /// Node excluded from this pass (e.g. a reflector excluding itself).
    pub source_node_to_ignore: Option<NodeKey>,
    /// Player/viewport index for split-screen setups.
    pub player_index: u8,
}
