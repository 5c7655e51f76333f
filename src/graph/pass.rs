//! Render Pass Recipes
//!
//! `RenderPass` is the stateless configuration + dispatch layer: one
//! instance per stage, holding the stage's fixed target/clear/draw-mask
//! recipe and its declared dependencies. `render` assembles the final
//! [`RenderPassParams`] for the frame and forwards into the executor. No
//! node-level state lives here.

use smallvec::SmallVec;

use super::commands::{CommandList, MemoryBarrier};
use super::context::RenderGraphContext;
use super::executor::{RenderPassExecutor, StageStats};
use super::params::{
    ClearOps, DrawMask, RenderPassParams, RenderTargetDesc, SubPassFlags, targets,
};
use super::stage::RenderStage;
use crate::errors::Result;
use crate::scene::NodeKey;
use crate::scene::camera::CameraSnapshot;
use crate::scene::VisibleNode;

/// Stateless per-stage pass recipe.
#[derive(Debug, Clone)]
pub struct RenderPass {
    stage: RenderStage,
    params: RenderPassParams,
}

impl RenderPass {
    /// Builds the stage's fixed recipe.
    #[must_use]
    pub fn for_stage(stage: RenderStage) -> Self {
        Self {
            stage,
            params: Self::recipe(stage),
        }
    }

    #[inline]
    #[must_use]
    pub fn stage(&self) -> RenderStage {
        self.stage
    }

    /// The stage's declared dependency list.
    #[must_use]
    pub fn dependencies(&self) -> &[RenderStage] {
        &self.params.dependencies
    }

    /// The fixed recipe, before per-frame overrides.
    #[must_use]
    pub fn params(&self) -> &RenderPassParams {
        &self.params
    }

    /// Assembles the final params for this frame and runs the executor.
    pub fn render(
        &self,
        executor: &mut RenderPassExecutor,
        ctx: &RenderGraphContext,
        camera: &CameraSnapshot,
        nodes: &[VisibleNode],
        source_node_to_ignore: Option<NodeKey>,
        player_index: u8,
        cmd: &mut CommandList,
        barrier: &mut MemoryBarrier,
    ) -> Result<StageStats> {
        let params = RenderPassParams {
            source_node_to_ignore,
            player_index,
            ..self.params.clone()
        };
        executor.do_custom_pass(ctx, camera, &params, nodes, cmd, barrier)
    }

    /// The fixed rendering recipe of each stage.
    ///
    /// Reverse-Z depth convention throughout: depth clears to 0.
    fn recipe(stage: RenderStage) -> RenderPassParams {
        let (target, draw_mask, sub_passes) = match stage {
            RenderStage::Shadow => (
                RenderTargetDesc::depth_only(targets::SHADOW_MAP, ClearOps::depth_only(0.0)),
                DrawMask::OPAQUE,
                SubPassFlags::empty(),
            ),
            RenderStage::Reflection => (
                RenderTargetDesc::color_depth(
                    targets::REFLECTION_COLOR,
                    targets::REFLECTION_DEPTH,
                    ClearOps::color_and_depth([0.0, 0.0, 0.0, 1.0], 0.0),
                ),
                DrawMask::OPAQUE | DrawMask::TRANSPARENT,
                SubPassFlags::TRANSPARENCY,
            ),
            RenderStage::Refraction => (
                RenderTargetDesc::color_depth(
                    targets::REFRACTION_COLOR,
                    targets::REFRACTION_DEPTH,
                    ClearOps::color_and_depth([0.0, 0.0, 0.0, 1.0], 0.0),
                ),
                DrawMask::OPAQUE | DrawMask::TRANSPARENT,
                SubPassFlags::TRANSPARENCY,
            ),
            RenderStage::Display => (
                RenderTargetDesc::color_depth(
                    targets::SCENE_COLOR,
                    targets::SCENE_DEPTH,
                    ClearOps::color_and_depth([0.0, 0.0, 0.0, 1.0], 0.0),
                ),
                DrawMask::ALL_BUCKETS,
                SubPassFlags::PRE_PASS
                    | SubPassFlags::OCCLUSION_CULL
                    | SubPassFlags::TRANSPARENCY
                    | SubPassFlags::WEIGHTED_OIT,
            ),
            RenderStage::NodePreview => (
                RenderTargetDesc::color_depth(
                    targets::PREVIEW_COLOR,
                    targets::PREVIEW_DEPTH,
                    ClearOps::color_and_depth([0.1, 0.1, 0.1, 1.0], 0.0),
                ),
                DrawMask::OPAQUE | DrawMask::TRANSPARENT,
                SubPassFlags::TRANSPARENCY,
            ),
        };

        RenderPassParams {
            stage,
            dependencies: SmallVec::from_slice(stage.default_dependencies()),
            target,
            draw_mask,
            sub_passes,
            source_node_to_ignore: None,
            player_index: 0,
        }
    }
}
