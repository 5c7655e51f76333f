//! Command Lists & Barriers
//!
//! Stage tasks record their GPU work into a [`CommandList`] — an ordered,
//! backend-agnostic command stream. The device layer translates the stream
//! into its native encoding; this subsystem only guarantees ordering and
//! content. Memory-barrier state accumulates per stage and is merged by the
//! manager into one combined barrier at frame end.

use bitflags::bitflags;

use super::params::{RenderTargetDesc, TargetId};
use crate::scene::DrawGeometry;

bitflags! {
    /// Resource classes a barrier must cover.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BarrierFlags: u32 {
        /// Colour-target writes must be visible to subsequent reads.
        const COLOR_TARGET = 1 << 0;
        /// Depth-target writes must be visible to subsequent reads.
        const DEPTH_TARGET = 1 << 1;
        /// Node-data buffer uploads must be visible to draws.
        const NODE_DATA = 1 << 2;
        /// Indirect-argument writes must be visible to draw dispatch.
        const INDIRECT_ARGS = 1 << 3;
    }
}

/// Accumulated memory-barrier state of one stage (or of a merged frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryBarrier {
    flags: BarrierFlags,
}

impl MemoryBarrier {
    #[inline]
    pub fn insert(&mut self, flags: BarrierFlags) {
        self.flags |= flags;
    }

    /// Folds another stage's barrier into this one.
    #[inline]
    pub fn merge(&mut self, other: &Self) {
        self.flags |= other.flags;
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> BarrierFlags {
        self.flags
    }
}

/// Which bucket a draw belongs to, fixed by its material's alpha mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawBucket {
    Opaque,
    Transparent,
    WeightedOit,
}

/// One recorded draw: the per-draw indirection integer plus its geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCommand {
    /// Index into the indirection buffer; the GPU resolves transform and
    /// material slots from it.
    pub indirection_idx: u32,
    pub geometry: DrawGeometry,
    /// Squared camera distance; sort key within a bucket.
    pub depth_sq: f32,
    pub bucket: DrawBucket,
}

/// One backend-agnostic command.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedCommand {
    /// Opens a render pass on the given targets.
    BeginPass {
        label: &'static str,
        target: RenderTargetDesc,
        /// True for the depth/geometry-only pre-pass encoding.
        depth_only: bool,
    },
    /// One draw inside the open pass.
    Draw(DrawCommand),
    /// Closes the open pass.
    EndPass,
    /// Builds the hierarchical-Z pyramid from the stage's depth target.
    BuildHiZ { depth_target: TargetId },
    /// MSAA/G-buffer resolve of the stage's main target.
    ResolveTarget { target: TargetId },
    /// Memory barrier covering the given resource classes.
    Barrier(MemoryBarrier),
    /// Sky-light/environment probe refresh (built outside stage tasks).
    UpdateSkyLight { layer_count: u32 },
    /// Post-FX composition into the back buffer.
    Composite { source: TargetId, destination: TargetId },
}

/// Ordered command stream of one stage (or of a manager-built buffer).
#[derive(Debug, Clone, Default)]
pub struct CommandList {
    label: &'static str,
    commands: Vec<EncodedCommand>,
}

impl CommandList {
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            commands: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    #[inline]
    pub fn push(&mut self, command: EncodedCommand) {
        self.commands.push(command);
    }

    #[inline]
    #[must_use]
    pub fn commands(&self) -> &[EncodedCommand] {
        &self.commands
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of draws recorded in the list.
    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, EncodedCommand::Draw(_)))
            .count()
    }
}

/// The frame's complete, deterministically-ordered submission.
#[derive(Debug, Default)]
pub struct FrameSubmission {
    pub frame_index: u64,
    /// Fixed order: sky-light, per-stage lists in declared stage order,
    /// merged barrier + post-render, post-FX.
    pub lists: Vec<CommandList>,
}
