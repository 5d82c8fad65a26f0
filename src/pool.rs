//! Fixed-size worker pool with a shared work cursor
//!
//! Every worker claims the next unprocessed index from an atomic cursor
//! until the work list is exhausted. Results are stored per index, so the
//! caller gets them back in input order no matter which worker finished
//! first.

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::trace;

use crate::error::{Error, Result};

pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// Build a pool with `workers` threads
    pub fn new(name: &str, workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let prefix = name.to_string();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |i| format!("{prefix}-{i}"))
            .build()
            .map_err(|e| Error::WorkerPool(e.to_string()))?;

        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` once for every index in `0..len`
    ///
    /// After the first failure no new index is claimed; the error with the
    /// lowest index is returned.
    pub fn run<T, F>(&self, len: usize, job: F) -> Result<Vec<T>>
    where
        T: Send + Sync,
        F: Fn(usize) -> Result<T> + Sync,
    {
        let cursor = AtomicUsize::new(0);
        let failed = AtomicBool::new(false);
        let slots: Vec<OnceLock<Result<T>>> = (0..len).map(|_| OnceLock::new()).collect();
        let worker_count = self.workers.min(len);

        self.pool.scope(|scope| {
            for worker in 0..worker_count {
                let (cursor, failed, slots, job) = (&cursor, &failed, &slots, &job);
                scope.spawn(move |_| {
                    loop {
                        if failed.load(Ordering::Acquire) {
                            break;
                        }
                        let index = cursor.fetch_add(1, Ordering::AcqRel);
                        if index >= len {
                            break;
                        }
                        trace!(worker, index, "Claimed work item");
                        let outcome = job(index);
                        if outcome.is_err() {
                            failed.store(true, Ordering::Release);
                        }
                        let _ = slots[index].set(outcome);
                    }
                });
            }
        });

        let mut results = Vec::with_capacity(len);
        for slot in slots {
            match slot.into_inner() {
                Some(Ok(value)) => results.push(value),
                Some(Err(e)) => return Err(e),
                // Never claimed because another job failed
                None => continue,
            }
        }

        if results.len() != len {
            return Err(Error::WorkerPool(
                "work was abandoned without a recorded failure".to_string(),
            ));
        }
        Ok(results)
    }
}
