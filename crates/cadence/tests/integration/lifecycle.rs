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

//! Lifecycle and crash-recovery behavior.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cadence::{
    AttemptContext, Handler, HandlerError, HandlerMethods, HandlerReference, MemoryStore,
    Scheduler, SchedulerConfig, StaticTypeResolver, Store,
};
use chrono::Utc;

use crate::fixtures::{self, Flaky, Probe};

fn quick_config() -> SchedulerConfig {
    SchedulerConfig::builder()
        .sleep_interval(Duration::from_millis(5))
        .interval_fn(|_| Duration::from_millis(1))
        .default_maximum_attempts(None)
        .build()
}

/// Blocks on its cancellation token and records how halt was invoked.
struct Lingering {
    halted_immediately: Arc<AtomicBool>,
    halt_seen: Arc<AtomicBool>,
}

#[async_trait]
impl Handler for Lingering {
    async fn perform(&self, ctx: &AttemptContext) -> Result<bool, HandlerError> {
        ctx.cancelled().await;
        Err(HandlerError::Cancelled)
    }

    fn methods(&self) -> HandlerMethods {
        HandlerMethods::NONE.with_halt()
    }

    async fn halt(&self, immediate: bool) {
        self.halt_seen.store(true, Ordering::SeqCst);
        self.halted_immediately.store(immediate, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_graceful_stop_passes_immediate_false_to_halt() {
    fixtures::init_logging();
    let halt_seen = Arc::new(AtomicBool::new(false));
    let halted_immediately = Arc::new(AtomicBool::new(true));

    let resolver = StaticTypeResolver::new();
    let seen = halt_seen.clone();
    let immediately = halted_immediately.clone();
    resolver.register("tests.lingering", move || {
        Box::new(Lingering {
            halt_seen: seen.clone(),
            halted_immediately: immediately.clone(),
        }) as _
    });

    let store = Arc::new(MemoryStore::new());
    let scheduler = Scheduler::new(quick_config(), store.clone(), Arc::new(resolver));
    let mut task = scheduler
        .task(HandlerReference::new("tests", "lingering"))
        .continue_on_failure(false)
        .continue_on_error(false)
        .build();
    task.run_at = Utc::now() - chrono::Duration::seconds(1);
    task.start = task.run_at;
    scheduler.submit(task).await.unwrap();

    scheduler.start(false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    scheduler.stop(false).await;

    assert!(halt_seen.load(Ordering::SeqCst), "halt hook fired");
    assert!(
        !halted_immediately.load(Ordering::SeqCst),
        "graceful stop hands immediate = false to halt"
    );

    // The cancelled attempt was persisted on the way down.
    let rows = store.all();
    assert_eq!(rows[0].last_error.as_deref(), Some("Cancelled"));
    assert!(rows[0].locked_at.is_none());
}

#[tokio::test]
async fn test_expired_lock_is_recovered_by_another_poll() {
    fixtures::init_logging();
    let probe = Arc::new(Probe::default());
    let resolver = StaticTypeResolver::new();
    let shared = probe.clone();
    resolver.register("tests.flaky", move || {
        Box::new(Flaky {
            probe: shared.clone(),
            failures_before_success: 0,
        }) as _
    });

    // Locks older than 50ms are considered abandoned.
    let store = Arc::new(MemoryStore::with_lock_expiry(Duration::from_millis(50)));
    let scheduler = Scheduler::new(quick_config(), store.clone(), Arc::new(resolver));

    // A row a crashed worker left behind: locked, never unlocked.
    let mut task = scheduler
        .task(HandlerReference::new("tests", "flaky"))
        .continue_on_success(false)
        .build();
    task.run_at = Utc::now() - chrono::Duration::seconds(10);
    task.start = task.run_at;
    task.locked_at = Some(Utc::now() - chrono::Duration::seconds(5));
    task.locked_by = Some("dead-worker".into());
    store.save(task).await.unwrap();

    scheduler.start(false).await.unwrap();
    let recovered = fixtures::wait_for(&store, Duration::from_secs(5), |tasks| {
        tasks.len() == 1 && tasks[0].succeeded_at.is_some()
    })
    .await;
    scheduler.stop(true).await;

    assert!(recovered, "expired lock should be stolen and the task run");
    assert_eq!(probe.perform_count(), 1);
    let task = &store.all()[0];
    assert_ne!(task.locked_by.as_deref(), Some("dead-worker"));
}

#[tokio::test]
async fn test_overtime_probe_flags_stale_locks() {
    fixtures::init_logging();
    let store = MemoryStore::new();
    let mut task = cadence::ScheduledTask::builder(HandlerReference::new("tests", "flaky"))
        .maximum_runtime(Duration::from_secs(60))
        .build();
    task.locked_at = Some(Utc::now() - chrono::Duration::seconds(80));
    let task = store.save(task).await.unwrap();

    // 80s elapsed >= 75s (125% of the 60s cap).
    assert!(task.running_overtime(Utc::now()));
    assert!(!task.running_overtime(task.locked_at.unwrap() + chrono::Duration::seconds(60)));
}

#[tokio::test]
async fn test_dispose_releases_and_scheduler_rejects_restart() {
    fixtures::init_logging();
    let scheduler = Scheduler::new(
        quick_config(),
        Arc::new(MemoryStore::new()),
        Arc::new(StaticTypeResolver::new()),
    );
    scheduler.start(false).await.unwrap();
    scheduler.dispose().await;
    assert!(scheduler.start(false).await.is_err());
}
