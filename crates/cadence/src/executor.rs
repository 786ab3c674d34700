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

//! Single-attempt execution.
//!
//! The executor takes one locked task through a full attempt: bump the
//! attempt counter, resolve the handler, run the hook-bracketed attempt
//! body, classify the outcome, apply retry backoff, persist per the save
//! rules, and fork the next occurrence for recurring tasks. Attempts are
//! self-contained — handler errors and panics are caught, recorded on the
//! row, and never escape into the worker; only cancellation and store
//! failures propagate to the caller.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::IntervalFn;
use crate::error::{ExecutorError, HandlerError};
use crate::handler::{AttemptContext, Handler, HandlerMethods};
use crate::models::ScheduledTask;
use crate::registry::HandlerRegistry;
use crate::store::Store;

/// Error summary recorded when handler resolution fails.
const MISSING_HANDLER: &str = "Missing or invalid handler";
/// Error summary recorded when an attempt is cancelled.
const CANCELLED: &str = "Cancelled";

/// The persisted result of one attempt.
#[derive(Debug)]
pub struct AttemptOutcome {
    /// Whether `perform` reported success.
    pub success: bool,
    /// Whether the row was removed by a deletion flag.
    pub deleted: bool,
    /// The task as persisted (or as it stood at deletion).
    pub task: ScheduledTask,
}

/// Handlers currently mid-attempt, tracked so shutdown can dispatch their
/// halt hooks. Entries are removed on every exit path of the attempt body.
#[derive(Default)]
pub(crate) struct PendingHandlers {
    inner: Mutex<HashMap<Uuid, PendingHandler>>,
}

#[derive(Clone)]
pub(crate) struct PendingHandler {
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) methods: HandlerMethods,
}

impl PendingHandlers {
    fn insert(&self, key: Uuid, handler: Arc<dyn Handler>, methods: HandlerMethods) {
        self.inner.lock().insert(key, PendingHandler { handler, methods });
    }

    fn remove(&self, key: &Uuid) {
        self.inner.lock().remove(key);
    }

    /// Empties the set, returning what was in flight.
    pub(crate) fn drain(&self) -> Vec<PendingHandler> {
        self.inner.lock().drain().map(|(_, pending)| pending).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Runs attempts and persists their outcomes.
pub struct Executor {
    store: Arc<dyn Store>,
    registry: Arc<HandlerRegistry>,
    interval_fn: IntervalFn,
    pending: Arc<PendingHandlers>,
}

impl Executor {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        registry: Arc<HandlerRegistry>,
        interval_fn: IntervalFn,
        pending: Arc<PendingHandlers>,
    ) -> Self {
        Self {
            store,
            registry,
            interval_fn,
            pending,
        }
    }

    /// Runs one attempt of a claimed task and persists the outcome.
    ///
    /// # Errors
    ///
    /// [`ExecutorError::Cancelled`] when the attempt was cancelled — the
    /// outcome has been persisted by then, the error exists to unwind the
    /// caller. [`ExecutorError::Store`] when persistence itself failed.
    pub async fn execute(
        &self,
        mut task: ScheduledTask,
        cancel: CancellationToken,
    ) -> Result<AttemptOutcome, ExecutorError> {
        task.attempts += 1;
        debug!(
            task_id = ?task.id,
            handler = %task.handler,
            attempt = task.attempts,
            "starting attempt"
        );

        let mut success = false;
        let mut raised: Option<HandlerError> = None;

        match self.registry.resolve(&task.handler) {
            None => {
                warn!(handler = %task.handler, task_id = ?task.id, "handler did not resolve");
                task.last_error = Some(MISSING_HANDLER.to_string());
            }
            Some(handler) => {
                let methods = self.registry.methods_for(&task.handler);
                let attempt_key = Uuid::new_v4();
                self.pending.insert(attempt_key, handler.clone(), methods);

                let ctx = AttemptContext::new(cancel.clone());
                let body = {
                    let handler = handler.clone();
                    async move {
                        let proceed = if methods.before { handler.before().await } else { true };
                        if proceed {
                            handler.perform(&ctx).await
                        } else {
                            // An explicit veto is an unsuccessful attempt
                            // without an error.
                            Ok(false)
                        }
                    }
                };

                // Contain panics at the attempt boundary so a misbehaving
                // handler cannot take down its priority worker.
                let result = AssertUnwindSafe(body)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic))));

                if cancel.is_cancelled() || matches!(result, Err(HandlerError::Cancelled)) {
                    task.last_error = Some(CANCELLED.to_string());
                    raised = Some(HandlerError::Cancelled);
                } else {
                    match result {
                        Ok(performed) => success = performed,
                        Err(err) => {
                            task.last_error = Some(err.to_string());
                            if methods.error {
                                handler.on_error(&err).await;
                            }
                            raised = Some(err);
                        }
                    }
                }

                if raised.is_none() {
                    if success && methods.success {
                        handler.on_success().await;
                    }
                    if task.will_fail() && methods.failure {
                        handler.on_failure().await;
                    }
                }
                if methods.after {
                    handler.after().await;
                }

                self.pending.remove(&attempt_key);
            }
        }

        if !success {
            task.run_at = next_retry_at((self.interval_fn)(task.attempts));
            debug!(
                task_id = ?task.id,
                attempt = task.attempts,
                retry_at = %task.run_at,
                "attempt unsuccessful, retry scheduled"
            );
        }

        let errored = raised.is_some();
        let outcome = self.persist_outcome(task, success, errored).await?;

        if cancel.is_cancelled() || matches!(raised, Some(HandlerError::Cancelled)) {
            return Err(ExecutorError::Cancelled);
        }
        Ok(outcome)
    }

    /// Applies the save rules: delete or stamp the terminal state, release
    /// the lock, save, and fork the next occurrence when asked for.
    async fn persist_outcome(
        &self,
        mut task: ScheduledTask,
        success: bool,
        errored: bool,
    ) -> Result<AttemptOutcome, ExecutorError> {
        let now = Utc::now();
        let mut deleted = false;

        if !success && task.will_fail() {
            if task.delete_on_failure {
                self.remove(&task).await?;
                deleted = true;
                info!(task_id = ?task.id, "terminal failure, task deleted");
            } else {
                task.failed_at = Some(now);
                error!(
                    task_id = ?task.id,
                    attempts = task.attempts,
                    error = task.last_error.as_deref().unwrap_or(""),
                    "task failed terminally"
                );
            }
        }

        if success {
            if task.delete_on_success {
                self.remove(&task).await?;
                deleted = true;
                debug!(task_id = ?task.id, "task succeeded and was deleted");
            } else {
                task.succeeded_at = Some(now);
            }
        }

        if !deleted {
            task.locked_at = None;
            task.locked_by = None;
            // A task that was never persisted stays out of the store: the
            // synchronous submission path bypasses it entirely.
            if task.id.is_some() {
                task = self.store.save(task).await?;
            }
            self.schedule_next_occurrence(&task, success, errored).await?;
        }

        Ok(AttemptOutcome {
            success,
            deleted,
            task,
        })
    }

    async fn remove(&self, task: &ScheduledTask) -> Result<(), ExecutorError> {
        if task.id.is_some() {
            self.store.delete(task).await?;
        }
        Ok(())
    }

    /// Forks a recurring task forward when its continuation flags and
    /// schedule call for a next occurrence. The just-finished row is left
    /// untouched; the clone is a fresh insert anchored at the completed
    /// occurrence.
    async fn schedule_next_occurrence(
        &self,
        task: &ScheduledTask,
        success: bool,
        errored: bool,
    ) -> Result<(), ExecutorError> {
        if !task.should_repeat(success, errored) {
            return Ok(());
        }

        let mut anchor = task.clone();
        anchor.start = anchor.run_at;
        let next = match anchor.next_occurrence() {
            Ok(Some(next)) => next,
            Ok(None) => return Ok(()),
            Err(err) => {
                warn!(task_id = ?task.id, error = %err, "skipping recurrence");
                return Ok(());
            }
        };

        let clone = self.store.save(anchor.clone_for_next_occurrence(next)).await?;
        info!(
            task_id = ?clone.id,
            forked_from = ?task.id,
            run_at = %next,
            "scheduled next occurrence"
        );
        Ok(())
    }
}

fn next_retry_at(delay: std::time::Duration) -> DateTime<Utc> {
    let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
    Utc::now()
        .checked_add_signed(delay)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
