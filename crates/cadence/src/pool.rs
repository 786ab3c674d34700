/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Priority-partitioned worker pool.
//!
//! Each distinct priority value owns a private FIFO queue with a dedicated
//! worker task; queues are created lazily on first submission. Workers run
//! their units inline, so units within one queue are serialized in
//! submission order, while a shared semaphore caps concurrency across all
//! queues at the configured count. Under oversubscription the semaphore's
//! FIFO permit handout lets waiting queues make progress roughly
//! round-robin.
//!
//! Shutdown is cooperative: cancelling the pool's token stops every worker
//! at its next dispatch point, and units still queued at that moment are
//! dropped — their completion handles resolve with an error and the tasks
//! behind them are recovered through store lock expiry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::PoolError;

struct QueuedUnit {
    future: BoxFuture<'static, ()>,
}

/// Resolves when the submitted unit has finished executing.
///
/// Resolving to `Err` means the unit was dropped without running because
/// the pool shut down first.
pub type CompletionHandle = oneshot::Receiver<()>;

/// Worker pool with one FIFO queue per distinct priority and a global
/// concurrency cap.
pub struct PriorityWorkerPool {
    permits: Arc<Semaphore>,
    queues: Mutex<HashMap<i32, mpsc::UnboundedSender<QueuedUnit>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    accepting: AtomicBool,
}

impl PriorityWorkerPool {
    /// Creates a pool admitting up to `concurrency` units at once. The
    /// token stops every worker when cancelled; per-unit cancellation is
    /// the submitter's concern.
    pub fn new(concurrency: usize, cancel: CancellationToken) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            queues: Mutex::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
            cancel,
            accepting: AtomicBool::new(true),
        }
    }

    /// Submits a unit to its priority's queue and returns a completion
    /// handle.
    ///
    /// # Errors
    ///
    /// [`PoolError::Shutdown`] once the pool has stopped accepting work.
    pub fn submit<F>(&self, priority: i32, unit: F) -> Result<CompletionHandle, PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.accepting.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
            return Err(PoolError::Shutdown);
        }

        let (done_tx, done_rx) = oneshot::channel();
        let future = async move {
            unit.await;
            let _ = done_tx.send(());
        }
        .boxed();

        self.queue_for(priority)
            .send(QueuedUnit { future })
            .map_err(|_| PoolError::Shutdown)?;
        Ok(done_rx)
    }

    /// Returns the sender for a priority's queue, creating the queue and
    /// its worker on first use. The map mutex makes exactly one creation
    /// win under concurrent first submissions.
    fn queue_for(&self, priority: i32) -> mpsc::UnboundedSender<QueuedUnit> {
        let mut queues = self.queues.lock();
        queues
            .entry(priority)
            .or_insert_with(|| self.spawn_worker(priority))
            .clone()
    }

    fn spawn_worker(&self, priority: i32) -> mpsc::UnboundedSender<QueuedUnit> {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedUnit>();
        let permits = self.permits.clone();
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            debug!(priority, "priority worker started");
            loop {
                let unit = tokio::select! {
                    _ = cancel.cancelled() => break,
                    unit = rx.recv() => match unit {
                        Some(unit) => unit,
                        None => break,
                    },
                };

                let permit = tokio::select! {
                    _ = cancel.cancelled() => break,
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                // Run inline: FIFO within this priority.
                unit.future.await;
                drop(permit);
            }
            debug!(priority, "priority worker stopped");
        });

        self.workers.lock().push(handle);
        tx
    }

    /// Number of priority queues created so far.
    pub fn queue_count(&self) -> usize {
        self.queues.lock().len()
    }

    /// Stops accepting work, drops the queues, and waits for every worker
    /// to unwind. With the pool's token already cancelled the workers stop
    /// at their next dispatch point; otherwise they drain what was queued.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.queues.lock().clear();

        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            let _ = worker.await;
        }
        debug!("worker pool shut down");
    }
}
