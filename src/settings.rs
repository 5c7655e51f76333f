//! Render Subsystem Settings
//!
//! Configuration for the node-data buffers and the stage scheduler.
//!
//! # Quick Start
//!
//! ```rust
//! use ember_render::settings::RenderSettings;
//!
//! // Defaults: 4096 node slots, 1024 material slots, auto-sized worker pool
//! let settings = RenderSettings::default();
//!
//! // Small fixed configuration for a preview viewport
//! let settings = RenderSettings {
//!     buffers: ember_render::settings::BufferSettings {
//!         max_visible_nodes: 256,
//!         max_concurrent_materials: 64,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! # let _ = settings;
//! ```

use serde::{Deserialize, Serialize};

/// Capacity and lifetime configuration for the three node-data buffers.
///
/// # Sizing Rationale
///
/// The transform and indirection buffers hold one slot per visible node; the
/// material buffer holds one slot per *distinct* material configuration, so
/// it is typically much smaller. Both are grown (never shrunk) when the free
/// list drops below the low-water mark, so the initial capacities only have
/// to cover the common case — a growth frame costs one full re-upload of the
/// affected buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSettings {
    /// Slot capacity of the transform and indirection buffers.
    pub max_visible_nodes: u32,
    /// Slot capacity of the deduplicated material buffer.
    pub max_concurrent_materials: u32,
    /// Frames a material slot may sit unreferenced before it becomes
    /// eligible for eviction and reuse.
    pub max_frame_lifetime: u32,
    /// Multiplier applied to a buffer's capacity when it grows.
    pub growth_factor: u32,
    /// A growth request is recorded when the free list shrinks below
    /// `capacity / low_water_divisor`.
    pub low_water_divisor: u32,
    /// Disable to turn capacity exhaustion into a hard error instead of a
    /// deferred resize. Intended for tests and fixed-memory targets.
    pub allow_growth: bool,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            max_visible_nodes: 4096,
            max_concurrent_materials: 1024,
            max_frame_lifetime: 6,
            growth_factor: 2,
            low_water_divisor: 8,
            allow_growth: true,
        }
    }
}

/// Worker-pool configuration for per-stage command-buffer construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Number of worker threads in the renderer task pool.
    ///
    /// The pool is fixed-size; one task per render stage per frame is
    /// dispatched onto it. Values below the stage count simply serialize
    /// some stages within a batch.
    pub worker_threads: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        // Leave headroom for the main thread and the driver's own workers.
        let workers = std::thread::available_parallelism()
            .map_or(4, |n| n.get().saturating_sub(2).max(2));
        Self {
            worker_threads: workers,
        }
    }
}

/// Top-level settings for the render-pass scheduling subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Node-data buffer capacities and lifetimes.
    pub buffers: BufferSettings,
    /// Stage scheduler / worker pool configuration.
    pub scheduler: SchedulerSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacities_are_sane() {
        let s = BufferSettings::default();
        assert!(s.max_visible_nodes >= s.max_concurrent_materials);
        assert!(s.growth_factor >= 2);
        assert!(s.low_water_divisor > 0);
    }

    #[test]
    fn scheduler_reserves_at_least_two_workers() {
        assert!(SchedulerSettings::default().worker_threads >= 2);
    }
}
