//! Render-Pass Graph
//!
//! Provides:
//! - `RenderStage`: the logical stages and their default dependencies
//! - `RenderPassParams`: per-stage target/clear/draw-mask recipe
//! - `RenderPass`: stateless configuration + dispatch layer
//! - `RenderPassExecutor`: per-stage sub-pass state machine
//! - `StageGraph`: explicit dependency graph with topological batching
//! - `RenderGraphContext`: shared executor-buffer state
//! - `RenderPassManager`: frame orchestration and ordered submission

pub mod commands;
pub mod context;
pub mod executor;
pub mod manager;
pub mod params;
pub mod pass;
pub mod schedule;
pub mod stage;

pub use commands::{CommandList, EncodedCommand, FrameSubmission, MemoryBarrier};
pub use context::RenderGraphContext;
pub use executor::{ExecutorPhase, ParseResult, RenderPassExecutor, StageStats};
pub use manager::{FrameInput, FrameReport, RenderPassManager, StageView, SubmitQueue};
pub use params::{DrawMask, RenderPassParams, RenderTargetDesc, SubPassFlags, TargetId};
pub use pass::RenderPass;
pub use schedule::StageGraph;
pub use stage::RenderStage;
