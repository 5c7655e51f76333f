//! Render Pass Executor
//!
//! One executor per stage. `do_custom_pass` consumes the stage's
//! visible-node list and camera state, resolves executor-buffer slots for
//! every surviving node, builds the draw-command stream and encodes the
//! sub-phase passes into the stage's command list.
//!
//! # Phase Machine
//!
//! `Idle → PrePass → Occlusion → NodeDataResolve → DrawBuild → MainDraw →
//! Transparency → Resolved → Complete`, with the optional phases skipped
//! according to [`SubPassFlags`]. Phases only ever advance within a frame;
//! `Complete` is the only state other stages' dependency waits observe.

use rustc_hash::FxHashSet;

use super::commands::{BarrierFlags, CommandList, DrawBucket, DrawCommand, EncodedCommand, MemoryBarrier};
use super::context::RenderGraphContext;
use super::params::{ClearOps, DrawMask, RenderPassParams, RenderTargetDesc, SubPassFlags, targets};
use super::stage::RenderStage;
use crate::buffers::SlotIndex;
use crate::errors::{RenderError, Result};
use crate::records::INVALID_INDEX;
use crate::scene::camera::CameraSnapshot;
use crate::scene::{AlphaMode, DrawGeometry, NodeKey, VisibleNode};

/// Executor state within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorPhase {
    Idle,
    PrePass,
    Occlusion,
    NodeDataResolve,
    DrawBuild,
    MainDraw,
    Transparency,
    Resolved,
    Complete,
}

impl ExecutorPhase {
    const fn rank(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::PrePass => 1,
            Self::Occlusion => 2,
            Self::NodeDataResolve => 3,
            Self::DrawBuild => 4,
            Self::MainDraw => 5,
            Self::Transparency => 6,
            Self::Resolved => 7,
            Self::Complete => 8,
        }
    }
}

/// Outcome of resolving one node's indirection entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseResult {
    /// True when the indirection buffer needs a GPU update from this call.
    pub indirection_dirty: bool,
}

/// Per-stage, per-frame counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageStats {
    pub stage: RenderStage,
    /// Nodes received after the source-node filter.
    pub visible: u32,
    /// Nodes removed by the occlusion pass.
    pub occluded: u32,
    /// Nodes skipped because a buffer slot could not be leased this frame.
    pub skipped: u32,
    pub drawn_opaque: u32,
    pub drawn_transparent: u32,
    pub drawn_woit: u32,
}

impl StageStats {
    #[must_use]
    pub const fn new(stage: RenderStage) -> Self {
        Self {
            stage,
            visible: 0,
            occluded: 0,
            skipped: 0,
            drawn_opaque: 0,
            drawn_transparent: 0,
            drawn_woit: 0,
        }
    }
}

struct ResolvedDraw {
    indirection_idx: u32,
    geometry: DrawGeometry,
    depth_sq: f32,
    bucket: DrawBucket,
}

/// Per-stage pass executor. Stage-local scratch only; all node-data state
/// lives in the shared [`RenderGraphContext`].
pub struct RenderPassExecutor {
    stage: RenderStage,
    phase: ExecutorPhase,
    survivors: Vec<VisibleNode>,
    resolved: Vec<ResolvedDraw>,
    /// Occlusion feedback from the previous frame's Hi-Z test.
    occluded_last_frame: FxHashSet<NodeKey>,
}

impl RenderPassExecutor {
    #[must_use]
    pub fn new(stage: RenderStage) -> Self {
        Self {
            stage,
            phase: ExecutorPhase::Idle,
            survivors: Vec::new(),
            resolved: Vec::new(),
            occluded_last_frame: FxHashSet::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn stage(&self) -> RenderStage {
        self.stage
    }

    #[inline]
    #[must_use]
    pub fn phase(&self) -> ExecutorPhase {
        self.phase
    }

    /// Feeds back the GPU occlusion-query results for use by the next
    /// frame's occlusion pass (one frame of latency).
    pub fn set_occlusion_results(&mut self, occluded: impl IntoIterator<Item = NodeKey>) {
        self.occluded_last_frame.clear();
        self.occluded_last_frame.extend(occluded);
    }

    /// Runs the stage's full sub-phase chain for one frame.
    pub fn do_custom_pass(
        &mut self,
        ctx: &RenderGraphContext,
        camera: &CameraSnapshot,
        params: &RenderPassParams,
        nodes: &[VisibleNode],
        cmd: &mut CommandList,
        barrier: &mut MemoryBarrier,
    ) -> Result<StageStats> {
        debug_assert!(
            matches!(self.phase, ExecutorPhase::Idle | ExecutorPhase::Complete),
            "{} executor re-entered mid-frame in phase {:?}",
            self.stage.name(),
            self.phase
        );
        self.phase = ExecutorPhase::Idle;
        self.resolved.clear();
        self.survivors.clear();
        self.survivors.extend(
            nodes
                .iter()
                .filter(|n| Some(n.key) != params.source_node_to_ignore)
                .cloned(),
        );

        let mut stats = StageStats::new(self.stage);
        stats.visible = self.survivors.len() as u32;

        if params.sub_passes.contains(SubPassFlags::PRE_PASS) {
            self.advance(ExecutorPhase::PrePass);
            self.pre_pass(ctx, params, cmd, barrier);
        }

        if params.sub_passes.contains(SubPassFlags::OCCLUSION_CULL) {
            self.advance(ExecutorPhase::Occlusion);
            stats.occluded = self.occlusion_pass(params, cmd);
        }

        self.advance(ExecutorPhase::NodeDataResolve);
        self.resolve_visible_nodes(ctx, camera, &mut stats)?;

        self.advance(ExecutorPhase::DrawBuild);
        self.build_draw_commands();

        self.advance(ExecutorPhase::MainDraw);
        if params.draw_mask.contains(DrawMask::OPAQUE) {
            stats.drawn_opaque = self.encode_bucket(
                cmd,
                "main",
                &params.target,
                DrawBucket::Opaque,
                false,
            );
            let mut flags = BarrierFlags::DEPTH_TARGET;
            if !params.target.color_targets.is_empty() {
                flags |= BarrierFlags::COLOR_TARGET;
            }
            barrier.insert(flags);
        }

        let wants_transparency = params.sub_passes.contains(SubPassFlags::TRANSPARENCY)
            && params.draw_mask.contains(DrawMask::TRANSPARENT);
        let wants_woit = params.sub_passes.contains(SubPassFlags::WEIGHTED_OIT)
            && params.draw_mask.contains(DrawMask::WEIGHTED_OIT);
        if wants_transparency || wants_woit {
            self.advance(ExecutorPhase::Transparency);
            let load_target = RenderTargetDesc {
                clear: ClearOps::NONE,
                ..params.target.clone()
            };
            if wants_transparency {
                stats.drawn_transparent = self.encode_bucket(
                    cmd,
                    "transparency",
                    &load_target,
                    DrawBucket::Transparent,
                    false,
                );
            }
            if wants_woit {
                stats.drawn_woit = self.encode_bucket(
                    cmd,
                    "weighted-oit",
                    &load_target,
                    DrawBucket::WeightedOit,
                    false,
                );
            }
            if stats.drawn_transparent + stats.drawn_woit > 0 {
                barrier.insert(BarrierFlags::COLOR_TARGET);
            }
        }

        self.advance(ExecutorPhase::Resolved);
        self.resolve_main_screen_target(params, cmd);

        self.advance(ExecutorPhase::Complete);
        Ok(stats)
    }

    /// Resolves (allocates or reuses) the node's transform slot.
    pub fn process_visible_node_transform(
        &self,
        ctx: &RenderGraphContext,
        node: &VisibleNode,
    ) -> Result<SlotIndex> {
        ctx.resolve_node_transform(node)
    }

    /// Resolves the node's deduplicated material slot.
    pub fn process_visible_node_material(
        &self,
        ctx: &RenderGraphContext,
        node: &VisibleNode,
    ) -> Result<SlotIndex> {
        ctx.resolve_node_material(node)
    }

    /// Resolves the node's transform and material slots and populates its
    /// indirection entry.
    ///
    /// Idempotent within a frame; repeated calls from different passes
    /// resolve to the same slots without re-widening any dirty range.
    pub fn process_visible_node(
        &self,
        ctx: &RenderGraphContext,
        node: &VisibleNode,
    ) -> Result<ParseResult> {
        let transform_slot = self.process_visible_node_transform(ctx, node)?;
        let material_slot = self.process_visible_node_material(ctx, node)?;
        let (_, indirection_dirty) =
            ctx.resolve_node_indirection(node, transform_slot, material_slot)?;
        Ok(ParseResult { indirection_dirty })
    }

    // ------------------------------------------------------------------------
    // Sub-phases
    // ------------------------------------------------------------------------

    /// Depth/geometry-only pass priming the depth buffer (and the occlusion
    /// source). Draws only nodes that already hold an indirection slot from
    /// an earlier frame; new nodes join at the main pass.
    fn pre_pass(
        &self,
        ctx: &RenderGraphContext,
        params: &RenderPassParams,
        cmd: &mut CommandList,
        barrier: &mut MemoryBarrier,
    ) {
        let Some(depth_target) = params.target.depth_target else {
            return;
        };
        cmd.push(EncodedCommand::BeginPass {
            label: "pre-pass",
            target: RenderTargetDesc::depth_only(depth_target, params.target.clear),
            depth_only: true,
        });
        for node in &self.survivors {
            let Some(indirection_idx) = ctx.indirection_index_of(node.key) else {
                continue;
            };
            cmd.push(EncodedCommand::Draw(DrawCommand {
                indirection_idx,
                geometry: node.component.draw_geometry(),
                depth_sq: 0.0,
                bucket: DrawBucket::Opaque,
            }));
        }
        cmd.push(EncodedCommand::EndPass);
        barrier.insert(BarrierFlags::DEPTH_TARGET);
    }

    /// Hierarchical-Z filtering over the visible-node list.
    ///
    /// Purely a filtering step: encodes the Hi-Z build and drops nodes the
    /// previous frame's test found occluded. Never mutates executor
    /// buffers. Returns the number of nodes removed.
    fn occlusion_pass(&mut self, params: &RenderPassParams, cmd: &mut CommandList) -> u32 {
        cmd.push(EncodedCommand::BuildHiZ {
            depth_target: params.target.depth_target.unwrap_or(targets::SCENE_DEPTH),
        });
        let before = self.survivors.len();
        let occluded = std::mem::take(&mut self.occluded_last_frame);
        self.survivors.retain(|n| !occluded.contains(&n.key));
        self.occluded_last_frame = occluded;
        (before - self.survivors.len()) as u32
    }

    /// Resolves every surviving node's slots and indirection entry.
    ///
    /// Capacity exhaustion skips the node for this frame (the buffer grows
    /// at the next frame boundary); any other error is a logic fault and
    /// propagates.
    fn resolve_visible_nodes(
        &mut self,
        ctx: &RenderGraphContext,
        camera: &CameraSnapshot,
        stats: &mut StageStats,
    ) -> Result<()> {
        let survivors = std::mem::take(&mut self.survivors);
        let mut result = Ok(());

        for node in &survivors {
            match self.resolve_node(ctx, camera, node) {
                Ok(resolved) => self.resolved.push(resolved),
                Err(RenderError::CapacityExhausted { kind, capacity }) => {
                    log::error!(
                        "{}: node skipped this frame, {kind:?} buffer full ({capacity} slots)",
                        self.stage.name()
                    );
                    stats.skipped += 1;
                }
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }

        self.survivors = survivors;
        result
    }

    fn resolve_node(
        &self,
        ctx: &RenderGraphContext,
        camera: &CameraSnapshot,
        node: &VisibleNode,
    ) -> Result<ResolvedDraw> {
        let transform_slot = self.process_visible_node_transform(ctx, node)?;
        let material_slot = self.process_visible_node_material(ctx, node)?;
        let (indirection_slot, _dirty) =
            ctx.resolve_node_indirection(node, transform_slot, material_slot)?;

        let bucket = match node.component.material().alpha {
            AlphaMode::Opaque => DrawBucket::Opaque,
            AlphaMode::Blend => DrawBucket::Transparent,
            AlphaMode::WeightedOit => DrawBucket::WeightedOit,
        };
        Ok(ResolvedDraw {
            indirection_idx: indirection_slot.index(),
            geometry: node.component.draw_geometry(),
            depth_sq: camera.distance_sq(node.bounds.center),
            bucket,
        })
    }

    /// Orders the resolved draws: opaque front-to-back for early-Z,
    /// transparent back-to-front for correct blending, weighted-OIT
    /// unordered (kept front-to-back for cache coherence).
    fn build_draw_commands(&mut self) {
        self.resolved.sort_unstable_by(|a, b| {
            let bucket = bucket_rank(a.bucket).cmp(&bucket_rank(b.bucket));
            bucket.then_with(|| match a.bucket {
                DrawBucket::Transparent => b.depth_sq.total_cmp(&a.depth_sq),
                DrawBucket::Opaque | DrawBucket::WeightedOit => a.depth_sq.total_cmp(&b.depth_sq),
            })
        });
    }

    /// Encodes one bucket as a render pass. Returns the draw count.
    fn encode_bucket(
        &self,
        cmd: &mut CommandList,
        label: &'static str,
        target: &RenderTargetDesc,
        bucket: DrawBucket,
        depth_only: bool,
    ) -> u32 {
        let draws: Vec<&ResolvedDraw> =
            self.resolved.iter().filter(|r| r.bucket == bucket).collect();
        if draws.is_empty() && bucket != DrawBucket::Opaque {
            return 0;
        }
        cmd.push(EncodedCommand::BeginPass {
            label,
            target: target.clone(),
            depth_only,
        });
        for draw in &draws {
            debug_assert_ne!(
                draw.indirection_idx, INVALID_INDEX,
                "draw submitted without a valid indirection slot"
            );
            cmd.push(EncodedCommand::Draw(DrawCommand {
                indirection_idx: draw.indirection_idx,
                geometry: draw.geometry,
                depth_sq: draw.depth_sq,
                bucket,
            }));
        }
        cmd.push(EncodedCommand::EndPass);
        draws.len() as u32
    }

    /// Stage-specific MSAA/G-buffer resolve; runs once per stage per frame
    /// regardless of how many sub-passes ran.
    fn resolve_main_screen_target(&self, params: &RenderPassParams, cmd: &mut CommandList) {
        let target = params
            .target
            .color_targets
            .first()
            .copied()
            .or(params.target.depth_target);
        if let Some(target) = target {
            cmd.push(EncodedCommand::ResolveTarget { target });
        }
    }

    fn advance(&mut self, next: ExecutorPhase) {
        debug_assert!(
            next.rank() > self.phase.rank(),
            "{}: illegal executor phase transition {:?} -> {next:?}",
            self.stage.name(),
            self.phase
        );
        self.phase = next;
    }
}

fn bucket_rank(bucket: DrawBucket) -> u8 {
    match bucket {
        DrawBucket::Opaque => 0,
        DrawBucket::Transparent => 1,
        DrawBucket::WeightedOit => 2,
    }
}
