// src/jobs.rs
//
// Fire-and-forget job execution. Results travel back over channels owned by
// whoever submitted the job; the pool itself never returns anything.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, error};

use crate::config;
use crate::error::{Result, TerrainError};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait JobSubmitter: Send + Sync {
    fn submit(&self, job: Job) -> Result<()>;
}

/// Fixed set of worker threads sharing one FIFO queue.
pub struct JobSystem {
    tx: Mutex<Option<Sender<Job>>>,
    rx: Receiver<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    threads: usize,
}

impl JobSystem {
    /// `threads == 0` => max(available_parallelism, MIN_WORKER_THREADS).
    pub fn new(threads: usize) -> Self {
        let threads = if threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(config::MIN_WORKER_THREADS)
                .max(config::MIN_WORKER_THREADS)
        } else {
            threads
        };

        let (tx, rx) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let rx = rx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("terrain-job-{}", i))
                .spawn(move || worker_loop(i, rx));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => error!(worker = i, "failed to spawn job worker: {e}"),
            }
        }
        debug!(threads = workers.len(), "job system started");

        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            workers: Mutex::new(workers),
            threads,
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.rx.len()
    }

    /// Close the queue, let workers finish everything already queued, join.
    /// Idempotent.
    pub fn shutdown(&self) {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        if tx.is_none() {
            return;
        }
        drop(tx);

        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));
        for w in workers {
            let _ = w.join();
        }
        debug!("job system stopped");
    }
}

fn worker_loop(index: usize, rx: Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!(worker = index, "terrain job panicked");
        }
    }
}

impl JobSubmitter for JobSystem {
    fn submit(&self, job: Job) -> Result<()> {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            return Err(TerrainError::JobSystemStopped);
        };
        tx.send(job).map_err(|_| TerrainError::JobSystemStopped)
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs every job on the submitting thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateJobs;

impl JobSubmitter for ImmediateJobs {
    fn submit(&self, job: Job) -> Result<()> {
        job();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn shutdown_drains_queued_jobs() {
        let jobs = JobSystem::new(2);
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..200 {
            let count = count.clone();
            jobs.submit(Box::new(move || {
                std::thread::sleep(std::time::Duration::from_micros(50));
                count.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        jobs.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 200);
        assert_eq!(
            jobs.submit(Box::new(|| {})).err(),
            Some(TerrainError::JobSystemStopped)
        );
    }

    #[test]
    fn a_panicking_job_does_not_kill_its_worker() {
        let jobs = JobSystem::new(1);
        let (tx, rx) = crossbeam_channel::unbounded();
        jobs.submit(Box::new(|| panic!("boom"))).unwrap();
        jobs.submit(Box::new(move || tx.send(7).unwrap())).unwrap();
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)), Ok(7));
    }

    #[test]
    fn zero_threads_means_at_least_the_minimum() {
        let jobs = JobSystem::new(0);
        assert!(jobs.threads() >= config::MIN_WORKER_THREADS);
    }

    #[test]
    fn immediate_jobs_run_inline() {
        let hit = Arc::new(AtomicUsize::new(0));
        let h = hit.clone();
        ImmediateJobs.submit(Box::new(move || { h.fetch_add(1, Ordering::SeqCst); })).unwrap();
        assert_eq!(hit.load(Ordering::SeqCst), 1);
    }
}
