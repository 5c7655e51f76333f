//! Error Types
//!
//! This module defines the error types used throughout the render subsystem.
//!
//! # Overview
//!
//! The main error type [`RenderError`] covers all failure modes including:
//! - Node-data buffer capacity and slot-lifetime errors
//! - Stage-schedule construction errors (cycles, unknown dependencies)
//! - Stage-task execution failures
//! - Device errors surfaced from the graphics backend
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, RenderError>`.

use thiserror::Error;

use crate::buffers::NodeBufferKind;
use crate::graph::stage::RenderStage;

/// The main error type for the render-pass scheduling subsystem.
///
/// Each variant provides specific context about what went wrong. Capacity
/// errors are normally compensated by buffer growth between frames; they only
/// surface as hard errors when growth is disabled or a frame exhausts a
/// buffer faster than the low-water mark can react.
#[derive(Error, Debug)]
pub enum RenderError {
    // ========================================================================
    // Node-data buffer errors
    // ========================================================================
    /// A slot allocation failed because the buffer's free list is empty.
    ///
    /// A growth request has been recorded; the buffer is resized at the next
    /// frame boundary.
    #[error("{kind:?} buffer capacity exhausted ({capacity} slots)")]
    CapacityExhausted {
        /// Which of the three node-data buffers ran out of slots.
        kind: NodeBufferKind,
        /// The capacity at the time of the failed allocation.
        capacity: u32,
    },

    /// A slot handle referred to a slot that has since been released.
    #[error("stale slot {index} (generation {generation}) passed to the {kind:?} buffer")]
    StaleSlot {
        /// The buffer the stale handle was used against.
        kind: NodeBufferKind,
        /// Slot index of the stale handle.
        index: u32,
        /// Generation of the stale handle.
        generation: u32,
    },

    // ========================================================================
    // Stage-schedule errors
    // ========================================================================
    /// The declared stage dependencies contain a cycle.
    #[error("render stage dependency cycle involving {0:?}")]
    ScheduleCycle(RenderStage),

    /// A stage depends on a stage that is not part of the schedule.
    #[error("stage {stage:?} depends on unscheduled stage {dependency:?}")]
    UnknownDependency {
        /// The stage declaring the dependency.
        stage: RenderStage,
        /// The missing dependency.
        dependency: RenderStage,
    },

    // ========================================================================
    // Stage execution errors
    // ========================================================================
    /// A stage task failed while building its command buffer.
    #[error("stage {stage:?} failed: {message}")]
    StageFailed {
        /// The failing stage.
        stage: RenderStage,
        /// Human-readable failure description.
        message: String,
    },

    /// The worker pool shut down while stage tasks were outstanding.
    #[error("render worker pool disconnected while stage tasks were outstanding")]
    PoolShutdown,

    // ========================================================================
    // Device & I/O errors
    // ========================================================================
    /// Error surfaced from the graphics backend; not retried at this layer.
    #[error("graphics device error: {0}")]
    Device(String),

    /// I/O error (worker thread spawning).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Alias for `Result<T, RenderError>`.
pub type Result<T> = std::result::Result<T, RenderError>;
