//! Bounded worker pool.
//!
//! `T` workers pull `(position, task)` pairs from a shared work channel, run the
//! handler, and push `(position, result)` onto a results channel that closes once every
//! worker has exited. Results arrive in completion order; callers use the position tag
//! to line them back up.
//!
//! Transient handler errors drop the task and are logged. A permanent error stops the
//! whole pool and is returned from [`PoolRun::finish`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::{DxError, DxResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub completed: usize,
    pub dropped: usize,
}

pub struct WorkerPool {
    workers: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Pool of `workers` tasks that stop once `cancel` fires.
    pub fn new(workers: usize, cancel: CancellationToken) -> Self {
        Self {
            workers: workers.max(1),
            cancel,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Start running `tasks` through `handler`.
    ///
    /// `tasks` is consumed lazily by a producer task, so it may synthesize work on
    /// demand or drain a prefilled list.
    pub fn run<T, R, I, F, Fut>(&self, tasks: I, handler: F) -> PoolRun<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DxResult<R>> + Send + 'static,
    {
        // fired by a permanent failure or by the run-wide token
        let cancel = self.cancel.child_token();
        let (work_tx, work_rx) = mpsc::channel::<(usize, T)>(self.workers);
        let (result_tx, result_rx) = mpsc::channel::<(usize, R)>(self.workers * 2);
        let work_rx = Arc::new(Mutex::new(work_rx));
        let handler = Arc::new(handler);

        let producer_cancel = cancel.clone();
        let tasks = tasks.into_iter();
        let producer = tokio::spawn(async move {
            for (position, task) in tasks.enumerate() {
                if producer_cancel.is_cancelled() {
                    break;
                }
                if work_tx.send((position, task)).await.is_err() {
                    break;
                }
            }
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..self.workers {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            let handler = handler.clone();
            let cancel = cancel.clone();
            workers.spawn(async move {
                worker_loop(worker_id, work_rx, result_tx, handler, cancel).await
            });
        }

        PoolRun {
            results: result_rx,
            workers,
            producer,
            cancel: self.cancel.clone(),
        }
    }
}

async fn worker_loop<T, R, F, Fut>(
    worker_id: usize,
    work_rx: Arc<Mutex<mpsc::Receiver<(usize, T)>>>,
    result_tx: mpsc::Sender<(usize, R)>,
    handler: Arc<F>,
    cancel: CancellationToken,
) -> DxResult<PoolSummary>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = DxResult<R>>,
{
    let mut summary = PoolSummary::default();
    loop {
        let next = {
            let mut rx = work_rx.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = rx.recv() => item,
            }
        };
        let Some((position, task)) = next else {
            break;
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = handler(task) => outcome,
        };

        match outcome {
            Ok(result) => {
                if cancel.is_cancelled() {
                    break;
                }
                if result_tx.send((position, result)).await.is_err() {
                    break;
                }
                summary.completed += 1;
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(worker = worker_id, position, "task dropped: {}", e);
                summary.dropped += 1;
            }
            Err(e) => {
                tracing::error!(worker = worker_id, position, "stopping pool: {}", e);
                cancel.cancel();
                return Err(e);
            }
        }
    }
    Ok(summary)
}

/// Handle on a running pool.
pub struct PoolRun<R> {
    results: mpsc::Receiver<(usize, R)>,
    workers: JoinSet<DxResult<PoolSummary>>,
    producer: JoinHandle<()>,
    cancel: CancellationToken,
}

impl<R> PoolRun<R> {
    /// Next completed `(position, result)`; `None` once every worker has exited.
    pub async fn recv(&mut self) -> Option<(usize, R)> {
        self.results.recv().await
    }

    /// Wait for the workers and report how the run went.
    pub async fn finish(self) -> DxResult<PoolSummary> {
        let PoolRun {
            results,
            mut workers,
            producer,
            cancel,
        } = self;
        drop(results);

        let mut summary = PoolSummary::default();
        let mut failure = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(worker)) => {
                    summary.completed += worker.completed;
                    summary.dropped += worker.dropped;
                }
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    failure.get_or_insert(DxError::permanent(format!("worker panicked: {}", e)));
                }
            }
        }
        producer.abort();

        if let Some(e) = failure {
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(DxError::Cancelled);
        }
        Ok(summary)
    }
}
