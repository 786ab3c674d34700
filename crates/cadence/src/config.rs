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

//! Scheduler configuration.
//!
//! This module contains the configuration struct and builder that control
//! the engine's behavior: polling cadence, worker concurrency, retry
//! backoff, and the defaults applied to newly provisioned tasks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Maps an attempt count to the delay before the next retry.
///
/// Called only after an unsuccessful attempt; the returned duration is
/// added to the current time to produce the task's next `run_at`.
pub type IntervalFn = Arc<dyn Fn(i32) -> Duration + Send + Sync>;

/// Configuration for the scheduler.
///
/// # Construction
///
/// Use [`SchedulerConfig::builder()`] to create a configuration:
///
/// ```rust,ignore
/// let config = SchedulerConfig::builder()
///     .concurrency(8)
///     .sleep_interval(Duration::from_secs(5))
///     .read_ahead(20)
///     .build();
/// ```
///
/// Or use the default configuration:
///
/// ```rust,ignore
/// let config = SchedulerConfig::default();
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct SchedulerConfig {
    delay_tasks: bool,
    concurrency: usize,
    sleep_interval: Duration,
    read_ahead: usize,
    interval_fn: IntervalFn,
    default_priority: i32,
    default_maximum_attempts: Option<i32>,
    default_maximum_runtime: Option<Duration>,
    default_delete_on_success: bool,
    default_delete_on_failure: bool,
    default_delete_on_error: bool,
}

impl SchedulerConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }

    /// Whether submitted tasks are persisted for the poller (`true`) or
    /// executed synchronously, bypassing the store (`false`).
    pub fn delay_tasks(&self) -> bool {
        self.delay_tasks
    }

    /// Maximum number of units the pool admits concurrently.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Pause between poller ticks.
    pub fn sleep_interval(&self) -> Duration {
        self.sleep_interval
    }

    /// How many due tasks one poll claims at most.
    pub fn read_ahead(&self) -> usize {
        self.read_ahead
    }

    /// Retry backoff function.
    pub fn interval_fn(&self) -> IntervalFn {
        self.interval_fn.clone()
    }

    /// Priority applied to newly provisioned tasks.
    pub fn default_priority(&self) -> i32 {
        self.default_priority
    }

    /// Attempt cap applied to newly provisioned tasks.
    pub fn default_maximum_attempts(&self) -> Option<i32> {
        self.default_maximum_attempts
    }

    /// Runtime cap applied to newly provisioned tasks.
    pub fn default_maximum_runtime(&self) -> Option<Duration> {
        self.default_maximum_runtime
    }

    pub fn default_delete_on_success(&self) -> bool {
        self.default_delete_on_success
    }

    pub fn default_delete_on_failure(&self) -> bool {
        self.default_delete_on_failure
    }

    pub fn default_delete_on_error(&self) -> bool {
        self.default_delete_on_error
    }
}

impl fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("delay_tasks", &self.delay_tasks)
            .field("concurrency", &self.concurrency)
            .field("sleep_interval", &self.sleep_interval)
            .field("read_ahead", &self.read_ahead)
            .field("interval_fn", &"<fn>")
            .field("default_priority", &self.default_priority)
            .field("default_maximum_attempts", &self.default_maximum_attempts)
            .field("default_maximum_runtime", &self.default_maximum_runtime)
            .field("default_delete_on_success", &self.default_delete_on_success)
            .field("default_delete_on_failure", &self.default_delete_on_failure)
            .field("default_delete_on_error", &self.default_delete_on_error)
            .finish()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfigBuilder::default().build()
    }
}

/// Builder for [`SchedulerConfig`].
#[derive(Clone)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self {
            config: SchedulerConfig {
                delay_tasks: true,
                concurrency: 4,
                sleep_interval: Duration::from_secs(10),
                read_ahead: 5,
                // Linear backoff: 30s more per attempt.
                interval_fn: Arc::new(|attempts| {
                    Duration::from_secs(attempts.max(0) as u64 * 30)
                }),
                default_priority: 0,
                default_maximum_attempts: Some(5),
                default_maximum_runtime: None,
                default_delete_on_success: false,
                default_delete_on_failure: false,
                default_delete_on_error: false,
            },
        }
    }
}

impl SchedulerConfigBuilder {
    /// Sets whether tasks are persisted (`true`) or run synchronously on
    /// submission (`false`).
    pub fn delay_tasks(mut self, value: bool) -> Self {
        self.config.delay_tasks = value;
        self
    }

    /// Sets the pool's concurrency cap.
    pub fn concurrency(mut self, value: usize) -> Self {
        self.config.concurrency = value;
        self
    }

    /// Sets the poller tick period.
    pub fn sleep_interval(mut self, value: Duration) -> Self {
        self.config.sleep_interval = value;
        self
    }

    /// Sets the poll batch size.
    pub fn read_ahead(mut self, value: usize) -> Self {
        self.config.read_ahead = value;
        self
    }

    /// Sets the retry backoff function.
    pub fn interval_fn<F>(mut self, value: F) -> Self
    where
        F: Fn(i32) -> Duration + Send + Sync + 'static,
    {
        self.config.interval_fn = Arc::new(value);
        self
    }

    /// Sets the priority default for new tasks.
    pub fn default_priority(mut self, value: i32) -> Self {
        self.config.default_priority = value;
        self
    }

    /// Sets the attempt-cap default for new tasks.
    pub fn default_maximum_attempts(mut self, value: Option<i32>) -> Self {
        self.config.default_maximum_attempts = value;
        self
    }

    /// Sets the runtime-cap default for new tasks.
    pub fn default_maximum_runtime(mut self, value: Option<Duration>) -> Self {
        self.config.default_maximum_runtime = value;
        self
    }

    pub fn default_delete_on_success(mut self, value: bool) -> Self {
        self.config.default_delete_on_success = value;
        self
    }

    pub fn default_delete_on_failure(mut self, value: bool) -> Self {
        self.config.default_delete_on_failure = value;
        self
    }

    pub fn default_delete_on_error(mut self, value: bool) -> Self {
        self.config.default_delete_on_error = value;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> SchedulerConfig {
        self.config
    }
}
