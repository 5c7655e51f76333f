//! Render Pass Manager
//!
//! Top-level orchestrator: owns every [`RenderPass`]/[`RenderPassExecutor`]
//! pair, launches one task per scheduled stage per frame, enforces
//! cross-stage dependency ordering, merges per-stage memory-barrier state
//! and hands the single, deterministically-ordered submission to the device
//! queue at frame end.
//!
//! # Frame Protocol
//!
//! 1. `begin_frame` on the shared context (pending buffer growth applies
//!    here, between frames).
//! 2. The sky-light and post-FX command lists are built on the calling
//!    thread, outside the stage tasks.
//! 3. The stage graph's topological batches are dispatched to the worker
//!    pool; a batch only launches once every stage of the previous batch
//!    has reported completion, so a stage never observes a dependency's
//!    partial state.
//! 4. All stages complete → per-stage barriers merge in declared stage
//!    order → the three node-data buffers commit in fixed order → the
//!    submission assembles as: sky-light, per-stage lists in declared
//!    order, merged barrier, post-FX.
//!
//! Stages always run to completion or the frame aborts with an error; there
//! is no partial-frame cancellation.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::commands::{
    BarrierFlags, CommandList, EncodedCommand, FrameSubmission, MemoryBarrier,
};
use super::context::RenderGraphContext;
use super::executor::{RenderPassExecutor, StageStats};
use super::params::{RenderPassParams, targets};
use super::pass::RenderPass;
use super::schedule::StageGraph;
use super::stage::{RenderStage, STAGE_COUNT};
use crate::errors::{RenderError, Result};
use crate::scene::camera::CameraSnapshot;
use crate::scene::{NodeKey, VisibleNode};
use crate::settings::RenderSettings;
use crate::tasks::TaskPool;

/// Consumes the frame's ordered submission. Implemented by the device
/// layer; the ordering of `FrameSubmission::lists` is a hard invariant.
pub trait SubmitQueue: Send + Sync {
    fn submit(&self, frame: FrameSubmission);
}

/// Per-stage input for one frame: camera snapshot + culled node list.
#[derive(Clone)]
pub struct StageView {
    pub camera: CameraSnapshot,
    pub nodes: Arc<Vec<VisibleNode>>,
    /// Node excluded from the pass (e.g. a reflector excluding itself).
    pub source_node_to_ignore: Option<NodeKey>,
    pub player_index: u8,
}

impl StageView {
    #[must_use]
    pub fn new(camera: CameraSnapshot, nodes: Vec<VisibleNode>) -> Self {
        Self {
            camera,
            nodes: Arc::new(nodes),
            source_node_to_ignore: None,
            player_index: 0,
        }
    }
}

/// Everything the scene layer hands over for one frame.
#[derive(Clone, Default)]
pub struct FrameInput {
    views: [Option<StageView>; STAGE_COUNT],
    /// Refresh the sky-light probe this frame.
    pub update_sky_light: bool,
    /// Cube-map layers touched by the sky-light refresh.
    pub sky_light_layers: u32,
}

impl FrameInput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the view for a stage. Stages without a view are skipped (their
    /// dependents still run).
    #[must_use]
    pub fn with_stage(mut self, stage: RenderStage, view: StageView) -> Self {
        self.views[stage.index()] = Some(view);
        self
    }

    #[must_use]
    pub fn view(&self, stage: RenderStage) -> Option<&StageView> {
        self.views[stage.index()].as_ref()
    }
}

/// Timing + counters of one completed stage task.
#[derive(Debug, Clone, Copy)]
pub struct StageReport {
    pub stage: RenderStage,
    pub stats: StageStats,
    pub started: Instant,
    pub finished: Instant,
}

/// Result of one rendered frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame_index: u64,
    /// One report per scheduled stage that had a view, in declared order.
    pub stages: Vec<StageReport>,
    /// Whether any node-data byte range was uploaded this frame.
    pub buffers_uploaded: bool,
}

struct StageOutput {
    list: CommandList,
    barrier: MemoryBarrier,
    report: StageReport,
}

type StageTaskResult = (RenderStage, Result<StageOutput>);

/// Top-level frame orchestrator.
pub struct RenderPassManager {
    context: Arc<RenderGraphContext>,
    queue: Arc<dyn SubmitQueue>,
    schedule: StageGraph,
    batches: Vec<Vec<RenderStage>>,
    passes: [RenderPass; STAGE_COUNT],
    executors: [Arc<Mutex<RenderPassExecutor>>; STAGE_COUNT],
    pool: TaskPool,
}

impl RenderPassManager {
    /// Builds a manager over the default stage graph.
    pub fn new(
        settings: &RenderSettings,
        context: Arc<RenderGraphContext>,
        queue: Arc<dyn SubmitQueue>,
    ) -> Result<Self> {
        Self::with_schedule(settings, context, queue, StageGraph::with_defaults())
    }

    /// Builds a manager over a caller-defined stage graph. The graph is
    /// validated and batched once, up front.
    pub fn with_schedule(
        settings: &RenderSettings,
        context: Arc<RenderGraphContext>,
        queue: Arc<dyn SubmitQueue>,
        schedule: StageGraph,
    ) -> Result<Self> {
        let batches = schedule.topological_batches()?;
        let passes = RenderStage::ALL.map(RenderPass::for_stage);
        let executors =
            RenderStage::ALL.map(|stage| Arc::new(Mutex::new(RenderPassExecutor::new(stage))));
        let pool = TaskPool::new(settings.scheduler.worker_threads)?;
        Ok(Self {
            context,
            queue,
            schedule,
            batches,
            passes,
            executors,
            pool,
        })
    }

    /// Shared executor-buffer context.
    #[must_use]
    pub fn context(&self) -> &Arc<RenderGraphContext> {
        &self.context
    }

    /// The stage schedule this manager runs.
    #[must_use]
    pub fn schedule(&self) -> &StageGraph {
        &self.schedule
    }

    /// Renders one frame: dispatches stage tasks, waits for all of them,
    /// commits the node-data buffers and submits the ordered frame.
    pub fn render(&mut self, input: &FrameInput) -> Result<FrameReport> {
        let frame_index = self.context.begin_frame();

        // Built outside the per-stage tasks.
        let sky_light = Self::build_sky_light_list(input);
        let post_fx = Self::build_post_fx_list();

        let mut outputs: [Option<StageOutput>; STAGE_COUNT] = Default::default();
        let mut completed = [false; STAGE_COUNT];

        for batch in &self.batches {
            self.dispatch_batch(batch, input, &completed, &mut outputs)?;
            for &stage in batch {
                completed[stage.index()] = true;
            }
        }

        // Every stage has completed; merge barrier state in declared order.
        let mut merged = MemoryBarrier::default();
        for stage in self.schedule.stages() {
            if let Some(output) = &outputs[stage.index()] {
                merged.merge(&output.barrier);
            }
        }

        // Node-data ranges flush before any command list is handed over.
        let buffers_uploaded = self.context.commit_buffers();
        if buffers_uploaded {
            merged.insert(BarrierFlags::NODE_DATA);
        }

        let mut reports = Vec::new();
        let mut lists = Vec::with_capacity(STAGE_COUNT + 3);
        lists.push(sky_light);
        for stage in self.schedule.stages() {
            if let Some(output) = outputs[stage.index()].take() {
                reports.push(output.report);
                lists.push(output.list);
            }
        }
        let mut post_render = CommandList::new("post-render");
        post_render.push(EncodedCommand::Barrier(merged));
        lists.push(post_render);
        lists.push(post_fx);

        self.queue.submit(FrameSubmission { frame_index, lists });

        Ok(FrameReport {
            frame_index,
            stages: reports,
            buffers_uploaded,
        })
    }

    /// Runs an ad-hoc custom pass synchronously on the calling thread.
    ///
    /// The single entry point by which collaborators (shadow-map
    /// generators, probe refreshers) request a scheduled pass outside the
    /// per-frame stage tasks.
    pub fn do_custom_pass(
        &self,
        camera: &CameraSnapshot,
        params: &RenderPassParams,
        nodes: &[VisibleNode],
        cmd: &mut CommandList,
        barrier: &mut MemoryBarrier,
    ) -> Result<StageStats> {
        let mut executor = self.executors[params.stage.index()].lock();
        executor.do_custom_pass(&self.context, camera, params, nodes, cmd, barrier)
    }

    /// Lifecycle hook: a node's rendering component was created.
    pub fn on_rendering_component_creation(&self, key: NodeKey) {
        self.context.on_rendering_component_creation(key);
    }

    /// Lifecycle hook: a node's rendering component was destroyed. Releases
    /// the node's executor-buffer slots.
    pub fn on_rendering_component_destruction(&self, key: NodeKey) {
        self.context.on_rendering_component_destruction(key);
    }

    /// Feeds a stage's GPU occlusion-query results back for the next frame.
    pub fn set_occlusion_results(
        &self,
        stage: RenderStage,
        occluded: impl IntoIterator<Item = NodeKey>,
    ) {
        self.executors[stage.index()].lock().set_occlusion_results(occluded);
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Dispatches one topological batch and blocks until every task in it
    /// has reported. A failed stage aborts the frame after the batch
    /// drains — dependents are simply never dispatched, so a fatal stage
    /// cannot deadlock the others.
    fn dispatch_batch(
        &self,
        batch: &[RenderStage],
        input: &FrameInput,
        completed: &[bool; STAGE_COUNT],
        outputs: &mut [Option<StageOutput>; STAGE_COUNT],
    ) -> Result<()> {
        let (tx, rx) = flume::bounded::<StageTaskResult>(batch.len());
        let mut in_flight = 0usize;

        for &stage in batch {
            debug_assert!(
                self.schedule
                    .dependencies(stage)
                    .iter()
                    .all(|d| completed[d.index()]),
                "{} dispatched before its dependencies completed",
                stage.name()
            );

            let Some(view) = input.view(stage) else {
                // Stage skipped this frame; dependents must still run.
                continue;
            };

            let pass = self.passes[stage.index()].clone();
            let executor = Arc::clone(&self.executors[stage.index()]);
            let context = Arc::clone(&self.context);
            let view = view.clone();
            let tx = tx.clone();

            self.pool.execute(move || {
                let started = Instant::now();
                let mut list = CommandList::new(stage.name());
                let mut barrier = MemoryBarrier::default();
                let result = {
                    let mut executor = executor.lock();
                    pass.render(
                        &mut executor,
                        &context,
                        &view.camera,
                        view.nodes.as_slice(),
                        view.source_node_to_ignore,
                        view.player_index,
                        &mut list,
                        &mut barrier,
                    )
                };
                let finished = Instant::now();
                let output = result.map(|stats| StageOutput {
                    list,
                    barrier,
                    report: StageReport {
                        stage,
                        stats,
                        started,
                        finished,
                    },
                });
                // The receiver only disappears if the frame already aborted.
                let _ = tx.send((stage, output));
            })?;
            in_flight += 1;
        }
        drop(tx);

        let mut first_error = None;
        for _ in 0..in_flight {
            let (stage, result) = rx.recv().map_err(|_| RenderError::PoolShutdown)?;
            match result {
                Ok(output) => outputs[stage.index()] = Some(output),
                Err(err) => {
                    log::error!("stage {} failed: {err}", stage.name());
                    first_error.get_or_insert(RenderError::StageFailed {
                        stage,
                        message: err.to_string(),
                    });
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn build_sky_light_list(input: &FrameInput) -> CommandList {
        let mut list = CommandList::new("sky-light");
        if input.update_sky_light {
            list.push(EncodedCommand::UpdateSkyLight {
                layer_count: input.sky_light_layers.max(1),
            });
        }
        list
    }

    fn build_post_fx_list() -> CommandList {
        let mut list = CommandList::new("post-fx");
        list.push(EncodedCommand::Composite {
            source: targets::SCENE_COLOR,
            destination: targets::BACK_BUFFER,
        });
        list
    }
}
