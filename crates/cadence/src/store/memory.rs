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

//! In-memory [`Store`] implementation.
//!
//! A mutex-guarded map with the same claim semantics a SQL backend would
//! provide through an atomic `UPDATE ... WHERE` — every claim runs under
//! one lock acquisition, so concurrent claimants never receive the same
//! row. Lock expiry is opt-in: with an expiry configured, rows whose locks
//! have aged past it become claimable again, which is the crash-recovery
//! path.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::ScheduledTask;
use crate::store::Store;

/// Map-backed task store.
#[derive(Default)]
pub struct MemoryStore {
    tasks: Mutex<Vec<ScheduledTask>>,
    lock_expiry: Option<chrono::Duration>,
}

impl MemoryStore {
    /// A store whose locks never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that lets claims steal locks older than `expiry`.
    pub fn with_lock_expiry(expiry: Duration) -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            lock_expiry: chrono::Duration::from_std(expiry).ok(),
        }
    }

    /// Fetches a row by id.
    pub fn get(&self, id: Uuid) -> Option<ScheduledTask> {
        self.tasks.lock().iter().find(|t| t.id == Some(id)).cloned()
    }

    /// Snapshot of every row.
    pub fn all(&self) -> Vec<ScheduledTask> {
        self.tasks.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    fn claimable(&self, task: &ScheduledTask, now: chrono::DateTime<chrono::Utc>) -> bool {
        if task.run_at > now || task.succeeded_at.is_some() || task.failed_at.is_some() {
            return false;
        }
        match task.locked_at {
            None => true,
            Some(locked_at) => match self.lock_expiry {
                Some(expiry) => now - locked_at >= expiry,
                None => false,
            },
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_and_lock_next_available(
        &self,
        n: usize,
        worker_id: &str,
    ) -> Result<Vec<ScheduledTask>, StoreError> {
        let now = Utc::now();
        let mut tasks = self.tasks.lock();

        let mut due: Vec<&mut ScheduledTask> = tasks
            .iter_mut()
            .filter(|task| task.run_at <= now)
            .collect();
        due.sort_by_key(|task| task.run_at);

        let mut claimed = Vec::new();
        for task in due {
            if claimed.len() == n {
                break;
            }
            if self.claimable(task, now) {
                task.locked_at = Some(now);
                task.locked_by = Some(worker_id.to_string());
                claimed.push(task.clone());
            }
        }

        if !claimed.is_empty() {
            debug!(count = claimed.len(), worker_id, "locked due tasks");
        }
        Ok(claimed)
    }

    async fn save(&self, mut task: ScheduledTask) -> Result<ScheduledTask, StoreError> {
        let mut tasks = self.tasks.lock();
        match task.id {
            Some(id) => {
                if let Some(existing) = tasks.iter_mut().find(|t| t.id == Some(id)) {
                    *existing = task.clone();
                } else {
                    tasks.push(task.clone());
                }
            }
            None => {
                task.id = Some(Uuid::new_v4());
                tasks.push(task.clone());
            }
        }
        Ok(task)
    }

    async fn delete(&self, task: &ScheduledTask) -> Result<(), StoreError> {
        let id = task.id.ok_or(StoreError::MissingId)?;
        self.tasks.lock().retain(|t| t.id != Some(id));
        Ok(())
    }
}
