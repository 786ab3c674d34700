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

//! The persistent task record and its derived views.
//!
//! A [`ScheduledTask`] is one row in the store. The engine claims rows by
//! lock, runs one attempt, and writes the outcome back; recurring rows are
//! cloned forward to their next occurrence rather than mutated in place, so
//! the original row keeps its terminal state as history.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::models::HandlerReference;
use crate::schedule;

/// A persisted unit of scheduled work.
///
/// All timestamps are UTC. `id` is `None` until the store first saves the
/// record; saving a task without an id inserts it and assigns one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Store-assigned identifier; `None` means not yet persisted.
    pub id: Option<Uuid>,
    /// Queue selector. Each distinct value gets its own FIFO queue; the
    /// numeric order of two priorities implies nothing by itself.
    pub priority: i32,
    /// Execution attempts so far, counting the in-flight one once started.
    pub attempts: i32,
    /// Reference to the handler that runs this task.
    pub handler: HandlerReference,
    /// Earliest instant at which the task may run.
    pub run_at: DateTime<Utc>,
    /// Per-attempt runtime cap. Absent means no deadline.
    pub maximum_runtime: Option<Duration>,
    /// Attempt cap; once `attempts` reaches it the next failure is terminal.
    /// Absent or zero means failures are never terminal.
    pub maximum_attempts: Option<i32>,
    /// Remove the row after a successful attempt.
    pub delete_on_success: bool,
    /// Remove the row after a terminal failure.
    pub delete_on_failure: bool,
    /// Carried on the record but not consulted by the persistence rules;
    /// kept for forward compatibility with error-driven cleanup policies.
    pub delete_on_error: bool,
    pub created_at: DateTime<Utc>,
    /// Set when a terminal failure is persisted.
    pub failed_at: Option<DateTime<Utc>>,
    /// Set when a success is persisted.
    pub succeeded_at: Option<DateTime<Utc>>,
    /// Most recent error summary.
    pub last_error: Option<String>,
    /// Lock acquisition time; non-null exactly while a worker owns the row.
    pub locked_at: Option<DateTime<Utc>>,
    /// Identity of the worker holding the lock.
    pub locked_by: Option<String>,
    /// Opaque labels; the engine stores and copies them but never reads them.
    pub tags: HashSet<String>,
    /// Cron expression driving recurrence. `None` (or empty) means one-shot.
    pub expression: Option<String>,
    /// Anchor of the recurrence window.
    pub start: DateTime<Utc>,
    /// End of the recurrence window; absent means the series is unbounded.
    pub end: Option<DateTime<Utc>>,
    /// Schedule the next occurrence after a successful attempt.
    pub continue_on_success: bool,
    /// Schedule the next occurrence after an unsuccessful attempt.
    pub continue_on_failure: bool,
    /// Schedule the next occurrence after an attempt that raised.
    pub continue_on_error: bool,
}

impl ScheduledTask {
    /// Starts building a task for the given handler. Timestamps default to
    /// now, continuation flags to true, everything else to off/empty.
    pub fn builder(handler: HandlerReference) -> TaskBuilder {
        TaskBuilder::new(handler)
    }

    /// True when the next unsuccessful attempt is terminal: the attempt
    /// counter has reached the cap. An absent or zero cap never fails
    /// terminally.
    pub fn will_fail(&self) -> bool {
        match self.maximum_attempts {
            Some(max) if max > 0 => self.attempts >= max,
            _ => false,
        }
    }

    /// True when the row is locked, has a runtime cap, and has now been
    /// held for at least 125% of that cap. Janitorial sweeps use this to
    /// decide when a lock is stale enough to break; the engine itself only
    /// exposes the view.
    pub fn running_overtime(&self, now: DateTime<Utc>) -> bool {
        let (Some(locked_at), Some(maximum)) = (self.locked_at, self.maximum_runtime) else {
            return false;
        };
        let Ok(maximum) = chrono::Duration::from_std(maximum) else {
            return false;
        };
        now - locked_at >= maximum + maximum / 4
    }

    /// The next occurrence of this task's schedule, strictly after `run_at`.
    ///
    /// `None` when the expression is absent/empty, when a bounded series is
    /// exhausted, or when the next occurrence falls past `end`. The series
    /// is walked lazily; an unbounded expression is never materialized.
    pub fn next_occurrence(&self) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        let Some(expression) = self.expression.as_deref() else {
            return Ok(None);
        };
        match self.end {
            Some(end) => schedule::next_occurrence_in_window(expression, self.run_at, end),
            None => schedule::next_occurrence(expression, self.run_at),
        }
    }

    /// Every occurrence of the bounded series between `start` and `end`.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::UnboundedSeries`] when `end` is absent.
    pub fn occurrences(&self) -> Result<Vec<DateTime<Utc>>, ScheduleError> {
        let end = self.end.ok_or(ScheduleError::UnboundedSeries)?;
        match self.expression.as_deref() {
            Some(expression) => schedule::occurrences_between(expression, self.start, end),
            None => Ok(Vec::new()),
        }
    }

    /// The final occurrence of the bounded series, or `None` when the
    /// window contains no occurrences.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::UnboundedSeries`] when `end` is absent.
    pub fn last_occurrence(&self) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        Ok(self.occurrences()?.into_iter().last())
    }

    /// Whether this task's continuation flags ask for a next occurrence
    /// given the attempt outcome.
    pub fn should_repeat(&self, success: bool, errored: bool) -> bool {
        (success && self.continue_on_success)
            || (!success && self.continue_on_failure)
            || (errored && self.continue_on_error)
    }

    /// Forks a fresh row for the next occurrence.
    ///
    /// The clone carries the recurrence-relevant definition (priority,
    /// handler, schedule window, caps, deletion and continuation flags,
    /// tags) and resets everything attempt-scoped: attempts, lock fields,
    /// lifecycle timestamps, and the error summary.
    pub fn clone_for_next_occurrence(&self, run_at: DateTime<Utc>) -> ScheduledTask {
        ScheduledTask {
            id: None,
            priority: self.priority,
            attempts: 0,
            handler: self.handler.clone(),
            run_at,
            maximum_runtime: self.maximum_runtime,
            maximum_attempts: self.maximum_attempts,
            delete_on_success: self.delete_on_success,
            delete_on_failure: self.delete_on_failure,
            delete_on_error: self.delete_on_error,
            created_at: Utc::now(),
            failed_at: None,
            succeeded_at: None,
            last_error: None,
            locked_at: None,
            locked_by: None,
            tags: self.tags.clone(),
            expression: self.expression.clone(),
            start: self.start,
            end: self.end,
            continue_on_success: self.continue_on_success,
            continue_on_failure: self.continue_on_failure,
            continue_on_error: self.continue_on_error,
        }
    }
}

/// Fluent construction of a [`ScheduledTask`].
///
/// ```rust,ignore
/// let task = ScheduledTask::builder(HandlerReference::new("reports", "nightly"))
///     .priority(2)
///     .schedule("0 0 * * * *")
///     .maximum_attempts(5)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    task: ScheduledTask,
    start: Option<DateTime<Utc>>,
}

impl TaskBuilder {
    pub fn new(handler: HandlerReference) -> Self {
        let now = Utc::now();
        Self {
            task: ScheduledTask {
                id: None,
                priority: 0,
                attempts: 0,
                handler,
                run_at: now,
                maximum_runtime: None,
                maximum_attempts: None,
                delete_on_success: false,
                delete_on_failure: false,
                delete_on_error: false,
                created_at: now,
                failed_at: None,
                succeeded_at: None,
                last_error: None,
                locked_at: None,
                locked_by: None,
                tags: HashSet::new(),
                expression: None,
                start: now,
                end: None,
                continue_on_success: true,
                continue_on_failure: true,
                continue_on_error: true,
            },
            start: None,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn run_at(mut self, run_at: DateTime<Utc>) -> Self {
        self.task.run_at = run_at;
        self
    }

    pub fn maximum_runtime(mut self, limit: Duration) -> Self {
        self.task.maximum_runtime = Some(limit);
        self
    }

    pub fn maximum_attempts(mut self, cap: i32) -> Self {
        self.task.maximum_attempts = Some(cap);
        self
    }

    pub fn delete_on_success(mut self, value: bool) -> Self {
        self.task.delete_on_success = value;
        self
    }

    pub fn delete_on_failure(mut self, value: bool) -> Self {
        self.task.delete_on_failure = value;
        self
    }

    pub fn delete_on_error(mut self, value: bool) -> Self {
        self.task.delete_on_error = value;
        self
    }

    /// Sets the cron expression driving recurrence.
    pub fn schedule(mut self, expression: impl Into<String>) -> Self {
        self.task.expression = Some(expression.into());
        self
    }

    /// Anchors the recurrence window. Without this the window starts at
    /// `run_at`.
    pub fn window_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Bounds the recurrence window.
    pub fn window_end(mut self, end: DateTime<Utc>) -> Self {
        self.task.end = Some(end);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.task.tags.insert(tag.into());
        self
    }

    pub fn continue_on_success(mut self, value: bool) -> Self {
        self.task.continue_on_success = value;
        self
    }

    pub fn continue_on_failure(mut self, value: bool) -> Self {
        self.task.continue_on_failure = value;
        self
    }

    pub fn continue_on_error(mut self, value: bool) -> Self {
        self.task.continue_on_error = value;
        self
    }

    pub fn build(mut self) -> ScheduledTask {
        // A scheduled row must satisfy start <= run_at.
        self.task.start = match self.start {
            Some(start) => start.min(self.task.run_at),
            None => self.task.run_at,
        };
        self.task
    }
}
