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

//! Error types for the scheduling engine.
//!
//! Each concern gets its own error enum so callers can match on exactly the
//! failures their layer can produce. Conversions between layers go through
//! `#[from]` at the seams where one component calls into another.

use thiserror::Error;
use uuid::Uuid;

/// Errors produced by cron expression evaluation.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The expression could not be parsed.
    #[error("invalid cron expression '{expression}': {source}")]
    InvalidExpression {
        /// The offending expression, as supplied.
        expression: String,
        #[source]
        source: cron::error::Error,
    },

    /// A full or last occurrence listing was requested for a series with no
    /// end bound. Unbounded series can only be walked forward one occurrence
    /// at a time.
    #[error("occurrence series has no end bound")]
    UnboundedSeries,
}

/// Errors a handler can surface from an attempt.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler observed cancellation and stopped cooperatively.
    #[error("Cancelled")]
    Cancelled,

    /// The attempt body failed with an application error.
    #[error("{0}")]
    Failed(String),

    /// The handler panicked; the panic was contained at the attempt boundary.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// Errors raised by a [`Store`](crate::store::Store) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("store backend error: {0}")]
    Backend(String),

    /// No row exists for the given id.
    #[error("no task with id {0}")]
    NotFound(Uuid),

    /// The operation requires a persisted task, but the task has no id.
    #[error("task has no id; it was never persisted")]
    MissingId,
}

/// Errors from the priority worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool has stopped accepting work.
    #[error("worker pool is shut down")]
    Shutdown,
}

/// Errors surfaced by the attempt executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The attempt was cancelled; its outcome was persisted before this
    /// error was raised.
    #[error("attempt cancelled")]
    Cancelled,

    /// The store failed while persisting the attempt outcome.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from scheduler lifecycle and submission operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `start` was called while the scheduler was already running.
    #[error("scheduler is already running")]
    AlreadyStarted,

    /// `start` was called after the scheduler had been stopped.
    #[error("scheduler has been stopped")]
    Stopped,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}
