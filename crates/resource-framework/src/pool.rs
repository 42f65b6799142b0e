//! # Worker Pool
//!
//! Runs independent blocking jobs (one per asset, typically) on a fixed
//! number of workers. Each worker pulls jobs from a shared channel and runs
//! them on tokio's blocking thread pool, since resource computation blocks
//! on connection I/O.
//!
//! Every job gets its own result; one failing job does not stop the others.

use crate::error::{FrameworkError, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug)]
pub struct WorkerPool {
    workers: usize,
}

type Job<T> = (usize, Box<dyn FnOnce() -> Result<T> + Send>);

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `jobs` and returns their results in submission order.
    pub async fn run<T, F>(&self, jobs: Vec<F>) -> Vec<Result<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let total = jobs.len();
        let (job_tx, job_rx) = mpsc::channel::<Job<T>>(total.max(1));
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<(usize, Result<T>)>(total.max(1));

        for (index, job) in jobs.into_iter().enumerate() {
            // capacity covers every job, so this never waits
            if job_tx.send((index, Box::new(job))).await.is_err() {
                break;
            }
        }
        drop(job_tx);

        let workers = self.workers.min(total.max(1));
        debug!(jobs = total, workers, "Worker pool started");
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let next = job_rx.lock().await.recv().await;
                    let Some((index, job)) = next else {
                        break;
                    };
                    let result = match tokio::task::spawn_blocking(job).await {
                        Ok(result) => result,
                        Err(e) => {
                            warn!(worker, job = index, error = %e, "Job failed");
                            Err(FrameworkError::Pool(e.to_string()))
                        }
                    };
                    if result_tx.send((index, result)).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        let mut slots: Vec<Option<Result<T>>> = (0..total).map(|_| None).collect();
        while let Some((index, result)) = result_rx.recv().await {
            slots[index] = Some(result);
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task failed");
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(FrameworkError::Pool("job did not run".into()))))
            .collect()
    }
}
