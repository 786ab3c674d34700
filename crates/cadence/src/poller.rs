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

//! The poll-dispatch loop.
//!
//! Each tick claims a batch of due tasks from the store (locking them),
//! submits every task to its priority queue, then waits for the whole
//! batch — cancelling any unit whose runtime cap lapses first. A submission
//! the pool refuses because it is shutting down lands in an overflow
//! subset, which is re-dispatched exactly like a fresh batch.
//!
//! A failed claim is logged and retried on the next tick; tasks left locked
//! when the poller stops are recovered through store lock expiry.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ExecutorError, PoolError};
use crate::executor::Executor;
use crate::models::ScheduledTask;
use crate::pool::PriorityWorkerPool;
use crate::store::Store;

/// Periodically claims due work and feeds it through the pool.
pub struct Poller {
    store: Arc<dyn Store>,
    executor: Arc<Executor>,
    pool: Arc<PriorityWorkerPool>,
    sleep_interval: Duration,
    read_ahead: usize,
    worker_id: String,
    /// Stops the tick loop; attempt tokens derive from `root`, not this.
    cancel: CancellationToken,
    /// Process-wide token; every attempt runs under a child of it.
    root: CancellationToken,
}

impl Poller {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        store: Arc<dyn Store>,
        executor: Arc<Executor>,
        pool: Arc<PriorityWorkerPool>,
        sleep_interval: Duration,
        read_ahead: usize,
        worker_id: String,
        cancel: CancellationToken,
        root: CancellationToken,
    ) -> Self {
        Self {
            store,
            executor,
            pool,
            sleep_interval,
            read_ahead,
            worker_id,
            cancel,
            root,
        }
    }

    /// Runs the tick loop until the poller's token is cancelled.
    pub async fn run(&self) {
        info!(
            worker_id = %self.worker_id,
            interval = ?self.sleep_interval,
            "poller started"
        );
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.sleep_interval) => {
                    self.tick().await;
                }
            }
        }
        info!(worker_id = %self.worker_id, "poller stopped");
    }

    /// One poll cycle: claim a batch and run it to completion.
    pub async fn tick(&self) {
        let batch = match self
            .store
            .get_and_lock_next_available(self.read_ahead, &self.worker_id)
            .await
        {
            Ok(batch) => batch,
            Err(error) => {
                error!(%error, "failed to claim due tasks");
                return;
            }
        };

        if batch.is_empty() {
            debug!("no due tasks");
            return;
        }

        debug!(count = batch.len(), "claimed batch");
        self.dispatch(batch).await;
    }

    /// Dispatches a batch, re-entering with the overflow subset until it is
    /// empty — an overflow subset is semantically a fresh batch. Stops
    /// re-entering once shutdown begins; anything still locked is recovered
    /// through lock expiry.
    async fn dispatch(&self, mut batch: Vec<ScheduledTask>) {
        loop {
            let overflow = self.dispatch_once(batch).await;
            if overflow.is_empty() {
                break;
            }
            if self.root.is_cancelled() || self.cancel.is_cancelled() {
                warn!(
                    count = overflow.len(),
                    "dropping overflow during shutdown; lock expiry will recover"
                );
                break;
            }
            warn!(count = overflow.len(), "re-dispatching overflow");
            batch = overflow;
        }
    }

    /// Submits every task in the batch and waits for all of them. Returns
    /// the subset the pool refused.
    async fn dispatch_once(&self, batch: Vec<ScheduledTask>) -> Vec<ScheduledTask> {
        let mut waits = Vec::new();
        let mut overflow = Vec::new();

        for task in batch {
            let attempt_cancel = self.root.child_token();
            let deadline = task.maximum_runtime;
            let priority = task.priority;

            let executor = self.executor.clone();
            let unit_task = task.clone();
            let unit_cancel = attempt_cancel.clone();
            let unit = async move {
                match executor.execute(unit_task, unit_cancel).await {
                    Ok(outcome) => {
                        debug!(
                            task_id = ?outcome.task.id,
                            success = outcome.success,
                            deleted = outcome.deleted,
                            "attempt finished"
                        );
                    }
                    Err(ExecutorError::Cancelled) => {
                        debug!("attempt cancelled");
                    }
                    Err(error) => {
                        error!(%error, "failed to persist attempt outcome");
                    }
                }
            };

            match self.pool.submit(priority, unit) {
                Ok(done) => waits.push((done, deadline, attempt_cancel)),
                Err(PoolError::Shutdown) => overflow.push(task),
            }
        }

        // Wait for the entire batch; a unit that outlives its runtime cap
        // gets its token cancelled and is then awaited to completion.
        // Termination stays cooperative.
        join_all(waits.into_iter().map(|(mut done, deadline, cancel)| async move {
            match deadline {
                Some(limit) => {
                    tokio::select! {
                        _ = &mut done => {}
                        _ = tokio::time::sleep(limit) => {
                            debug!("runtime cap lapsed, cancelling unit");
                            cancel.cancel();
                            let _ = done.await;
                        }
                    }
                }
                None => {
                    let _ = done.await;
                }
            }
        }))
        .await;

        overflow
    }
}
