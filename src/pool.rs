//! Worker pool engine.
//!
//! A single coordinator owns the work queue and the running set. Each
//! iteration drains finished workers, then starts new ones until the
//! concurrency limit is reached, then waits for the next completion (bounded
//! by `max_idle_sleep`). The run ends when both queue and running set are
//! empty. A failed worker aborts the run; nothing is retried or requeued.

use crate::blob::ScheduledBlob;
use crate::manifest::Manifest;
use crate::progress::{StatusCounts, StatusLine};
use crate::worker::{Completion, CompletionSender};
use ahash::AHashMap;
use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Starts the worker for a blob. Implementations spawn processes that report
/// through `done` exactly once.
pub trait Launcher {
    /// Start the worker bound to `job` and return its lead process id.
    fn launch(&mut self, job: &ScheduledBlob, done: &CompletionSender) -> Result<u32>;

    /// Called once the worker for `job` exited successfully, before its
    /// completion is recorded.
    fn finish(&mut self, _job: &ScheduledBlob) -> Result<()> {
        Ok(())
    }
}

impl<L: Launcher + ?Sized> Launcher for &mut L {
    fn launch(&mut self, job: &ScheduledBlob, done: &CompletionSender) -> Result<u32> {
        (**self).launch(job, done)
    }

    fn finish(&mut self, job: &ScheduledBlob) -> Result<()> {
        (**self).finish(job)
    }
}

struct RunningTask {
    job: ScheduledBlob,
    pid: u32,
    started: Instant,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub completed: usize,
    pub peak_running: usize,
}

pub struct WorkerPool<L: Launcher> {
    launcher: L,
    jobs: usize,
    max_idle_sleep: Duration,
    progress: bool,
}

impl<L: Launcher> WorkerPool<L> {
    pub fn new(launcher: L, jobs: usize) -> Self {
        Self { launcher, jobs: jobs.max(1), max_idle_sleep: Duration::from_secs(1), progress: false }
    }

    pub fn max_idle_sleep(mut self, d: Duration) -> Self {
        self.max_idle_sleep = d.max(Duration::from_millis(1));
        self
    }

    pub fn progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }

    /// Run every blob in `queue` (already in work order) to completion.
    pub fn run(mut self, queue: Vec<ScheduledBlob>, manifest: &mut Manifest) -> Result<PoolReport> {
        let (tx, rx) = crossbeam_channel::unbounded::<Completion>();
        let mut queue: VecDeque<ScheduledBlob> = queue.into();
        let mut running: AHashMap<u32, RunningTask> = AHashMap::with_capacity(self.jobs);
        let mut report = PoolReport::default();

        // Per-blob logs below stay at debug so they do not tear the status line.
        tracing::info!("Dumping {} blobs with up to {} workers", queue.len(), self.jobs);
        let status = StatusLine::new(queue.len() as u64, self.progress);
        let res = (|| -> Result<()> {
            loop {
                for c in rx.try_iter() {
                    self.reap(c, &mut running, &mut *manifest, &mut report)?;
                }

                while running.len() < self.jobs {
                    let Some(job) = queue.pop_front() else { break };
                    let started = Instant::now();
                    let pid = self
                        .launcher
                        .launch(&job, &tx)
                        .with_context(|| format!("starting {job}"))?;
                    tracing::debug!("started {} as pid {}", job, pid);
                    running.insert(job.id, RunningTask { job, pid, started });
                }
                report.peak_running = report.peak_running.max(running.len());
                status.update(&counts(&running, &queue, report.completed));

                if queue.is_empty() && running.is_empty() {
                    return Ok(());
                }

                match rx.recv_timeout(self.max_idle_sleep) {
                    Ok(c) => self.reap(c, &mut running, &mut *manifest, &mut report)?,
                    Err(RecvTimeoutError::Timeout) => {}
                    // `tx` lives in this frame, so the channel cannot close.
                    Err(RecvTimeoutError::Disconnected) => anyhow::bail!("completion channel closed"),
                }
            }
        })();

        match res {
            Ok(()) => {
                status.finish(format!("{} blobs dumped", report.completed));
                Ok(report)
            }
            Err(e) => {
                status.abandon("aborted");
                if !running.is_empty() {
                    let pids: Vec<u32> = running.values().map(|t| t.pid).collect();
                    tracing::warn!("{} workers still running are left behind: {:?}", running.len(), pids);
                }
                Err(e)
            }
        }
    }

    fn reap(
        &mut self,
        c: Completion,
        running: &mut AHashMap<u32, RunningTask>,
        manifest: &mut Manifest,
        report: &mut PoolReport,
    ) -> Result<()> {
        let Some(task) = running.remove(&c.job) else {
            tracing::warn!("completion for unknown blob #{} (pid {})", c.job, c.pid);
            return Ok(());
        };
        if let Err(e) = c.outcome {
            return Err(anyhow::Error::new(e).context(format!("{} (pid {}) failed", task.job, c.pid)));
        }
        self.launcher.finish(&task.job)?;
        let elapsed = c.finished_at.saturating_duration_since(task.started);
        manifest.record_completion(&task.job, elapsed)?;
        report.completed += 1;
        tracing::debug!("{} finished in {:.3}s", task.job, elapsed.as_secs_f64());
        Ok(())
    }
}

fn counts(running: &AHashMap<u32, RunningTask>, queue: &VecDeque<ScheduledBlob>, completed: usize) -> StatusCounts {
    let running_range = running.values().filter(|t| t.job.blob.is_range()).count();
    let pending_range = queue.iter().filter(|j| j.blob.is_range()).count();
    StatusCounts {
        running_whole: running.len() - running_range,
        running_range,
        pending_whole: queue.len() - pending_range,
        pending_range,
        completed,
    }
}
