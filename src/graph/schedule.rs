//! Stage Dependency Graph
//!
//! Each scheduled stage is a node with declared predecessor edges. The
//! scheduler resolves topological batches: every stage in a batch has all
//! its dependencies in earlier batches, so the batches can be dispatched to
//! the worker pool one after another with full parallelism inside a batch.
//! Batch membership is deterministic (declared stage order), independent of
//! task timing.

use smallvec::SmallVec;

use super::stage::{RenderStage, STAGE_COUNT};
use crate::errors::{RenderError, Result};

/// Declared stage set + dependency edges.
#[derive(Debug, Clone)]
pub struct StageGraph {
    enabled: [bool; STAGE_COUNT],
    deps: [SmallVec<[RenderStage; 4]>; STAGE_COUNT],
}

impl StageGraph {
    /// Empty graph; add stages with [`add_stage`](Self::add_stage).
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: [false; STAGE_COUNT],
            deps: Default::default(),
        }
    }

    /// All five stages with their default dependency recipe.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut graph = Self::new();
        for stage in RenderStage::ALL {
            graph.add_stage(stage, stage.default_dependencies());
        }
        graph
    }

    /// Declares (or re-declares) a stage with its dependency list.
    pub fn add_stage(&mut self, stage: RenderStage, dependencies: &[RenderStage]) -> &mut Self {
        self.enabled[stage.index()] = true;
        self.deps[stage.index()] = SmallVec::from_slice(dependencies);
        self
    }

    /// Scheduled stages in declared order.
    pub fn stages(&self) -> impl Iterator<Item = RenderStage> + '_ {
        RenderStage::ALL
            .into_iter()
            .filter(|s| self.enabled[s.index()])
    }

    #[must_use]
    pub fn is_scheduled(&self, stage: RenderStage) -> bool {
        self.enabled[stage.index()]
    }

    /// Declared dependencies of `stage`.
    #[must_use]
    pub fn dependencies(&self, stage: RenderStage) -> &[RenderStage] {
        &self.deps[stage.index()]
    }

    /// Verifies every dependency refers to a scheduled stage.
    pub fn validate(&self) -> Result<()> {
        for stage in self.stages() {
            for &dep in self.dependencies(stage) {
                if !self.is_scheduled(dep) {
                    return Err(RenderError::UnknownDependency {
                        stage,
                        dependency: dep,
                    });
                }
            }
        }
        Ok(())
    }

    /// Resolves topological batches (Kahn's algorithm over batch fronts).
    ///
    /// Errors on unknown dependencies and on cycles.
    pub fn topological_batches(&self) -> Result<Vec<Vec<RenderStage>>> {
        self.validate()?;

        let mut placed = [false; STAGE_COUNT];
        let mut remaining: usize = self.stages().count();
        let mut batches = Vec::new();

        while remaining > 0 {
            let front: Vec<RenderStage> = self
                .stages()
                .filter(|&s| {
                    !placed[s.index()]
                        && self.dependencies(s).iter().all(|d| placed[d.index()])
                })
                .collect();

            if front.is_empty() {
                // No progress: every unplaced stage waits on another
                // unplaced stage.
                let stuck = self
                    .stages()
                    .find(|&s| !placed[s.index()])
                    .expect("remaining > 0 implies an unplaced stage");
                return Err(RenderError::ScheduleCycle(stuck));
            }

            for &stage in &front {
                placed[stage.index()] = true;
            }
            remaining -= front.len();
            batches.push(front);
        }

        Ok(batches)
    }
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::with_defaults()
    }
}
