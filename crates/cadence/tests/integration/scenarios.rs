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

//! End-to-end scheduling scenarios driven through the public API.

use std::sync::Arc;
use std::time::Duration;

use cadence::{
    HandlerReference, MemoryStore, ScheduledTask, Scheduler, SchedulerConfig, StaticTypeResolver,
    Submitted,
};
use chrono::Utc;

use crate::fixtures::{self, AlwaysFailing, Flaky, Probe, Sleepy};

fn quick_config(delay_tasks: bool) -> SchedulerConfig {
    SchedulerConfig::builder()
        .delay_tasks(delay_tasks)
        .sleep_interval(Duration::from_millis(5))
        .read_ahead(10)
        .interval_fn(|attempts| Duration::from_millis(attempts.max(0) as u64 * 20))
        .default_maximum_attempts(None)
        .build()
}

fn due_now(task: ScheduledTask) -> ScheduledTask {
    let mut task = task;
    task.run_at = Utc::now() - chrono::Duration::milliseconds(10);
    task.start = task.run_at;
    task
}

#[tokio::test]
async fn test_immediate_one_shot_success_never_touches_store() {
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

    let store = Arc::new(MemoryStore::new());
    let scheduler = Scheduler::new(quick_config(false), store.clone(), Arc::new(resolver));

    let task = scheduler
        .task(HandlerReference::new("tests", "flaky"))
        .delete_on_success(true)
        .continue_on_success(false)
        .build();

    match scheduler.submit(task).await.unwrap() {
        Submitted::Completed(outcome) => {
            assert!(outcome.success);
            assert!(outcome.deleted);
            assert_eq!(outcome.task.attempts, 1);
        }
        Submitted::Persisted(_) => panic!("expected synchronous execution"),
    }

    assert_eq!(probe.perform_count(), 1);
    assert_eq!(probe.hook_log(), vec!["success"]);
    assert!(store.is_empty(), "one-shot immediate run leaves no rows");
}

#[tokio::test]
async fn test_delayed_task_fails_twice_then_succeeds() {
    fixtures::init_logging();
    let probe = Arc::new(Probe::default());
    let resolver = StaticTypeResolver::new();
    let shared = probe.clone();
    resolver.register("tests.flaky", move || {
        Box::new(Flaky {
            probe: shared.clone(),
            failures_before_success: 2,
        }) as _
    });

    let store = Arc::new(MemoryStore::new());
    let scheduler = Scheduler::new(quick_config(true), store.clone(), Arc::new(resolver));

    let task = due_now(
        scheduler
            .task(HandlerReference::new("tests", "flaky"))
            .maximum_attempts(3)
            .continue_on_success(false)
            .continue_on_failure(false)
            .build(),
    );
    scheduler.submit(task).await.unwrap();
    scheduler.start(false).await.unwrap();

    let succeeded = fixtures::wait_for(&store, Duration::from_secs(5), |tasks| {
        tasks.len() == 1 && tasks[0].succeeded_at.is_some()
    })
    .await;
    scheduler.stop(true).await;

    assert!(succeeded, "task should eventually succeed");
    let task = &store.all()[0];
    assert_eq!(task.attempts, 3);
    assert!(task.failed_at.is_none());
    assert!(task.locked_at.is_none());
    assert!(task.locked_by.is_none());
    assert_eq!(probe.perform_count(), 3);
    // The success hook fired exactly once, on the final attempt.
    assert_eq!(probe.hook_log(), vec!["success"]);
}

#[tokio::test]
async fn test_terminal_failure_with_deletion() {
    fixtures::init_logging();
    let probe = Arc::new(Probe::default());
    let resolver = StaticTypeResolver::new();
    let shared = probe.clone();
    resolver.register("tests.failing", move || {
        Box::new(AlwaysFailing {
            probe: shared.clone(),
        }) as _
    });

    let store = Arc::new(MemoryStore::new());
    let scheduler = Scheduler::new(quick_config(true), store.clone(), Arc::new(resolver));

    let task = due_now(
        scheduler
            .task(HandlerReference::new("tests", "failing"))
            .maximum_attempts(2)
            .delete_on_failure(true)
            .continue_on_failure(false)
            .build(),
    );
    scheduler.submit(task).await.unwrap();
    scheduler.start(false).await.unwrap();

    let deleted = fixtures::wait_for(&store, Duration::from_secs(5), |tasks| tasks.is_empty()).await;
    scheduler.stop(true).await;

    assert!(deleted, "terminal failure should remove the row");
    assert_eq!(probe.perform_count(), 2);
    // The failure hook fired only on the terminal attempt.
    assert_eq!(probe.hook_log(), vec!["failure"]);
}

#[tokio::test]
async fn test_recurring_task_clones_forward_on_success() {
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

    let store = Arc::new(MemoryStore::new());
    let scheduler = Scheduler::new(quick_config(true), store.clone(), Arc::new(resolver));

    let task = due_now(
        scheduler
            .task(HandlerReference::new("tests", "flaky"))
            .schedule("0 * * * *")
            .continue_on_success(true)
            .build(),
    );
    let original_run_at = task.run_at;
    let original_id = match scheduler.submit(task).await.unwrap() {
        Submitted::Persisted(stored) => stored.id.unwrap(),
        Submitted::Completed(_) => panic!("expected persistence"),
    };
    scheduler.start(false).await.unwrap();

    let cloned = fixtures::wait_for(&store, Duration::from_secs(5), |tasks| tasks.len() == 2).await;
    scheduler.stop(true).await;
    assert!(cloned, "a clone should be inserted after success");

    let rows = store.all();
    let original = rows.iter().find(|t| t.id == Some(original_id)).unwrap();
    let clone = rows.iter().find(|t| t.id != Some(original_id)).unwrap();

    assert!(original.succeeded_at.is_some());
    assert_eq!(original.attempts, 1);

    assert_eq!(clone.attempts, 0);
    assert!(clone.succeeded_at.is_none());
    assert!(clone.last_error.is_none());
    assert!(clone.run_at > original_run_at);
    assert_eq!(clone.run_at.timestamp() % 3600, 0, "hour boundary");
    assert_eq!(clone.start, original_run_at);
    // The clone is not due yet, so exactly one attempt ever ran.
    assert_eq!(probe.perform_count(), 1);
}

#[tokio::test]
async fn test_runtime_cap_cancels_attempt_and_schedules_retry() {
    fixtures::init_logging();
    let probe = Arc::new(Probe::default());
    let resolver = StaticTypeResolver::new();
    let shared = probe.clone();
    resolver.register("tests.sleepy", move || {
        Box::new(Sleepy {
            probe: shared.clone(),
        }) as _
    });

    let store = Arc::new(MemoryStore::new());
    let scheduler = Scheduler::new(quick_config(true), store.clone(), Arc::new(resolver));

    let task = due_now(
        scheduler
            .task(HandlerReference::new("tests", "sleepy"))
            .maximum_runtime(Duration::from_millis(50))
            .continue_on_failure(false)
            .continue_on_error(false)
            .build(),
    );
    scheduler.submit(task).await.unwrap();
    scheduler.start(false).await.unwrap();

    let cancelled = fixtures::wait_for(&store, Duration::from_secs(5), |tasks| {
        tasks.len() == 1 && tasks[0].last_error.as_deref() == Some("Cancelled")
    })
    .await;
    scheduler.stop(true).await;

    assert!(cancelled, "deadline should cancel the attempt");
    let task = &store.all()[0];
    assert!(task.attempts >= 1);
    assert!(task.succeeded_at.is_none());
    assert!(task.failed_at.is_none());
    assert!(probe.perform_count() >= 1);
}

#[tokio::test]
async fn test_instance_payload_reaches_the_handler() {
    fixtures::init_logging();

    use async_trait::async_trait;
    use cadence::{AttemptContext, Handler, HandlerError};
    use parking_lot::Mutex;

    /// Succeeds only when its payload asked it to.
    #[derive(Default)]
    struct Configured {
        should_succeed: Mutex<bool>,
    }

    #[async_trait]
    impl Handler for Configured {
        async fn perform(&self, _ctx: &AttemptContext) -> Result<bool, HandlerError> {
            Ok(*self.should_succeed.lock())
        }

        fn hydrate(&mut self, payload: &str) -> Result<(), HandlerError> {
            let value: serde_json::Value = serde_json::from_str(payload)
                .map_err(|e| HandlerError::Failed(e.to_string()))?;
            *self.should_succeed.lock() = value["succeed"].as_bool().unwrap_or(false);
            Ok(())
        }
    }

    let resolver = StaticTypeResolver::new();
    resolver.register("tests.configured", || Box::new(Configured::default()) as _);

    let store = Arc::new(MemoryStore::new());
    let scheduler = Scheduler::new(quick_config(false), store.clone(), Arc::new(resolver));

    let yes = scheduler
        .task(HandlerReference::new("tests", "configured").with_payload(r#"{"succeed":true}"#))
        .continue_on_success(false)
        .continue_on_failure(false)
        .build();
    let no = scheduler
        .task(HandlerReference::new("tests", "configured").with_payload(r#"{"succeed":false}"#))
        .continue_on_success(false)
        .continue_on_failure(false)
        .build();

    match scheduler.submit(yes).await.unwrap() {
        Submitted::Completed(outcome) => assert!(outcome.success),
        Submitted::Persisted(_) => panic!("expected synchronous execution"),
    }
    // Different payload, different cached instance.
    match scheduler.submit(no).await.unwrap() {
        Submitted::Completed(outcome) => assert!(!outcome.success),
        Submitted::Persisted(_) => panic!("expected synchronous execution"),
    }
}

#[tokio::test]
async fn test_missing_handler_retries_like_any_failure() {
    fixtures::init_logging();
    let store = Arc::new(MemoryStore::new());
    let scheduler = Scheduler::new(
        quick_config(true),
        store.clone(),
        Arc::new(StaticTypeResolver::new()),
    );

    let task = due_now(
        scheduler
            .task(HandlerReference::new("tests", "unregistered"))
            .maximum_attempts(2)
            .continue_on_failure(false)
            .build(),
    );
    scheduler.submit(task).await.unwrap();
    scheduler.start(false).await.unwrap();

    let failed = fixtures::wait_for(&store, Duration::from_secs(5), |tasks| {
        tasks.len() == 1 && tasks[0].failed_at.is_some()
    })
    .await;
    scheduler.stop(true).await;

    assert!(failed, "missing handler should fail terminally at the cap");
    let task = &store.all()[0];
    assert_eq!(task.attempts, 2);
    assert_eq!(
        task.last_error.as_deref(),
        Some("Missing or invalid handler")
    );
    assert!(task.locked_at.is_none());
}
