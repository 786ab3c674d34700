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

//! Durable task storage.
//!
//! The engine coordinates all cross-task state through the store: workers
//! acquire tasks by locking rows, and a crashed worker's tasks become
//! re-claimable once the backend ages their locks out. Any transactional
//! row store can implement [`Store`]; the crate ships [`MemoryStore`] for
//! tests and embedded use.

mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::ScheduledTask;

pub use memory::MemoryStore;

/// A transactional row store for [`ScheduledTask`] records.
#[async_trait]
pub trait Store: Send + Sync {
    /// Atomically selects up to `n` due rows, locks them to `worker_id`
    /// (`locked_at := now`, `locked_by := worker_id`), and returns them.
    ///
    /// "Due" means `run_at <= now`, not terminally finished, and either
    /// unlocked or holding a lock the backend considers expired. Under
    /// concurrent callers the same row must be returned to at most one of
    /// them.
    async fn get_and_lock_next_available(
        &self,
        n: usize,
        worker_id: &str,
    ) -> Result<Vec<ScheduledTask>, StoreError>;

    /// Upserts by id and returns the stored row. A task without an id is
    /// inserted and assigned one.
    async fn save(&self, task: ScheduledTask) -> Result<ScheduledTask, StoreError>;

    /// Removes the row by id. Deleting an already-absent row is not an
    /// error.
    ///
    /// # Errors
    ///
    /// [`StoreError::MissingId`] when the task was never persisted.
    async fn delete(&self, task: &ScheduledTask) -> Result<(), StoreError>;
}
