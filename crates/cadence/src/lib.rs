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

//! # Cadence
//!
//! Durable, recurring, prioritized task scheduling over a pluggable store.
//!
//! Cadence persists task records in a [`Store`], polls it for due work,
//! and dispatches execution across a pool of priority-partitioned workers
//! with cancellable per-task deadlines. Recurring tasks are cloned forward
//! to their next cron occurrence after each attempt; failed attempts retry
//! with configurable backoff until an optional attempt cap makes the next
//! failure terminal. Crash recovery leans on the store: workers own rows
//! by lock, and an interrupted task becomes re-claimable once its lock
//! ages out.
//!
//! Execution is at-least-once. There is no distributed consensus or leader
//! election; concurrency control is store-level row locking plus lock
//! expiration.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cadence::{
//!     AttemptContext, Handler, HandlerError, HandlerReference, MemoryStore,
//!     Scheduler, SchedulerConfig, StaticTypeResolver,
//! };
//! use std::sync::Arc;
//!
//! struct NightlyReport;
//!
//! #[async_trait::async_trait]
//! impl Handler for NightlyReport {
//!     async fn perform(&self, _ctx: &AttemptContext) -> Result<bool, HandlerError> {
//!         Ok(true)
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = StaticTypeResolver::new();
//! resolver.register("reports.nightly", || Box::new(NightlyReport) as _);
//!
//! let scheduler = Scheduler::new(
//!     SchedulerConfig::default(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(resolver),
//! );
//!
//! let task = scheduler
//!     .task(HandlerReference::new("reports", "nightly"))
//!     .schedule("0 0 3 * * *")
//!     .build();
//! scheduler.submit(task).await?;
//! scheduler.start(false).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod handler;
pub mod models;
pub mod poller;
pub mod pool;
pub mod registry;
pub mod schedule;
pub mod scheduler;
pub mod store;

pub use config::{IntervalFn, SchedulerConfig, SchedulerConfigBuilder};
pub use error::{
    ExecutorError, HandlerError, PoolError, ScheduleError, SchedulerError, StoreError,
};
pub use executor::{AttemptOutcome, Executor};
pub use handler::{AttemptContext, Handler, HandlerMethods};
pub use models::{HandlerReference, ScheduledTask, TaskBuilder};
pub use poller::Poller;
pub use pool::PriorityWorkerPool;
pub use registry::{HandlerConstructor, HandlerRegistry, StaticTypeResolver, TypeResolver};
pub use scheduler::{Scheduler, Submitted};
pub use store::{MemoryStore, Store};
