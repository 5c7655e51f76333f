//! Fixed Worker Pool
//!
//! A minimal fixed-size thread pool over an MPMC channel. Stage tasks are
//! `FnOnce` jobs; completion is reported by the jobs themselves over
//! per-frame channels, so the pool needs no join primitive beyond drop.

use std::thread::JoinHandle;

use crate::errors::{RenderError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size renderer worker pool.
pub struct TaskPool {
    sender: Option<flume::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Spawns `threads` workers (at least one).
    pub fn new(threads: usize) -> Result<Self> {
        let (sender, receiver) = flume::unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads.max(1));
        for index in 0..threads.max(1) {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("ember-render-{index}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })?;
            workers.push(handle);
        }
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Queues a job onto the pool.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or(RenderError::PoolShutdown)?
            .send(Box::new(job))
            .map_err(|_| RenderError::PoolShutdown)
    }

    /// Number of worker threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        // Closing the channel lets every worker drain and exit.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
