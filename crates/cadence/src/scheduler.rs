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

//! Scheduler lifecycle and task submission.
//!
//! The [`Scheduler`] wires the components together: it lazily creates the
//! worker pool on `start`, runs the poller as a background task, and on
//! `stop` dispatches halt hooks to every handler still mid-attempt before
//! unwinding the pool. A single root cancellation token is shared by the
//! pool and the poller; per-attempt deadline tokens derive from it.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::executor::{AttemptOutcome, Executor, PendingHandlers};
use crate::models::{HandlerReference, ScheduledTask, TaskBuilder};
use crate::poller::Poller;
use crate::pool::PriorityWorkerPool;
use crate::registry::{HandlerRegistry, TypeResolver};
use crate::store::Store;

/// What became of a submitted task.
#[derive(Debug)]
pub enum Submitted {
    /// The task was persisted; the poller will pick it up when due.
    Persisted(ScheduledTask),
    /// `delay_tasks` is off: the task ran synchronously, bypassing the
    /// store.
    Completed(AttemptOutcome),
}

/// The engine's front door: lifecycle control and task submission.
pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<dyn Store>,
    registry: Arc<HandlerRegistry>,
    executor: Arc<Executor>,
    pending: Arc<PendingHandlers>,
    root: CancellationToken,
    worker_id: String,
    pool: Mutex<Option<Arc<PriorityWorkerPool>>>,
    poller_cancel: Mutex<Option<CancellationToken>>,
    poller_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    stopped: std::sync::atomic::AtomicBool,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn Store>,
        resolver: Arc<dyn TypeResolver>,
    ) -> Self {
        let registry = Arc::new(HandlerRegistry::new(resolver));
        let pending = Arc::new(PendingHandlers::default());
        let executor = Arc::new(Executor::new(
            store.clone(),
            registry.clone(),
            config.interval_fn(),
            pending.clone(),
        ));

        Self {
            config,
            store,
            registry,
            executor,
            pending,
            root: CancellationToken::new(),
            worker_id: format!("cadence-{}", Uuid::new_v4()),
            pool: Mutex::new(None),
            poller_cancel: Mutex::new(None),
            poller_handle: tokio::sync::Mutex::new(None),
            stopped: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Identity this scheduler locks rows under.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Starts a builder for a task carrying this scheduler's configured
    /// defaults.
    pub fn task(&self, handler: HandlerReference) -> TaskBuilder {
        let mut builder = ScheduledTask::builder(handler)
            .priority(self.config.default_priority())
            .delete_on_success(self.config.default_delete_on_success())
            .delete_on_failure(self.config.default_delete_on_failure())
            .delete_on_error(self.config.default_delete_on_error());
        if let Some(cap) = self.config.default_maximum_attempts() {
            builder = builder.maximum_attempts(cap);
        }
        if let Some(limit) = self.config.default_maximum_runtime() {
            builder = builder.maximum_runtime(limit);
        }
        builder
    }

    /// Submits a task: persisted for the poller when `delay_tasks` is on,
    /// executed synchronously (bypassing the store) when it is off.
    pub async fn submit(&self, task: ScheduledTask) -> Result<Submitted, SchedulerError> {
        if self.config.delay_tasks() {
            let stored = self.store.save(task).await?;
            debug!(task_id = ?stored.id, run_at = %stored.run_at, "task persisted");
            Ok(Submitted::Persisted(stored))
        } else {
            let outcome = self.executor.execute(task, self.root.child_token()).await?;
            Ok(Submitted::Completed(outcome))
        }
    }

    /// Starts the poller, lazily instantiating the worker pool.
    ///
    /// With `immediate` set, one poll cycle runs synchronously before this
    /// returns.
    pub async fn start(&self, immediate: bool) -> Result<(), SchedulerError> {
        if self.stopped.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(SchedulerError::Stopped);
        }
        let mut handle_slot = self.poller_handle.lock().await;
        if handle_slot.is_some() {
            return Err(SchedulerError::AlreadyStarted);
        }

        let pool = {
            let mut pool_slot = self.pool.lock();
            pool_slot
                .get_or_insert_with(|| {
                    Arc::new(PriorityWorkerPool::new(
                        self.config.concurrency(),
                        self.root.child_token(),
                    ))
                })
                .clone()
        };

        let poller_cancel = self.root.child_token();
        *self.poller_cancel.lock() = Some(poller_cancel.clone());

        let poller = Arc::new(Poller::new(
            self.store.clone(),
            self.executor.clone(),
            pool,
            self.config.sleep_interval(),
            self.config.read_ahead(),
            self.worker_id.clone(),
            poller_cancel,
            self.root.clone(),
        ));

        if immediate {
            poller.tick().await;
        }

        let runner = poller.clone();
        *handle_slot = Some(tokio::spawn(async move { runner.run().await }));

        info!(
            worker_id = %self.worker_id,
            concurrency = self.config.concurrency(),
            "scheduler started"
        );
        Ok(())
    }

    /// Stops the engine: halts the poller, dispatches halt hooks to every
    /// handler still mid-attempt, cancels the root token, and waits for the
    /// pool and poller to unwind.
    ///
    /// The `immediate` flag is handed to the halt hooks; cancellation is
    /// cooperative either way, so in-flight attempts persist their
    /// cancelled outcome before the pool finishes unwinding.
    pub async fn stop(&self, immediate: bool) {
        if self.stopped.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        info!(immediate, "stopping scheduler");

        // No new ticks; the current one finishes once its units unwind.
        if let Some(cancel) = self.poller_cancel.lock().take() {
            cancel.cancel();
        }

        // Halt hooks run in parallel for whatever is still mid-attempt.
        let pending = self.pending.drain();
        let halting: Vec<_> = pending.into_iter().filter(|p| p.methods.halt).collect();
        if !halting.is_empty() {
            debug!(count = halting.len(), "dispatching halt hooks");
            join_all(
                halting
                    .iter()
                    .map(|pending| pending.handler.halt(immediate)),
            )
            .await;
        }

        // Outstanding units observe cancellation through their attempt
        // tokens, all children of the root.
        self.root.cancel();

        let pool = self.pool.lock().take();
        if let Some(pool) = pool {
            pool.shutdown().await;
        }
        if let Some(handle) = self.poller_handle.lock().await.take() {
            let _ = handle.await;
        }

        info!("scheduler stopped");
    }

    /// Equivalent to `stop(true)` plus release of the handler caches.
    pub async fn dispose(&self) {
        self.stop(true).await;
        self.registry.clear();
    }
}
