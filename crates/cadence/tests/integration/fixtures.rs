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

//! Shared fixture handlers for the integration suite.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use cadence::{AttemptContext, Handler, HandlerError, HandlerMethods, MemoryStore, ScheduledTask};

static INIT_LOGGING: Once = Once::new();

/// Installs a test subscriber once per process; repeat calls are no-ops.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Shared observation state for fixture handlers.
#[derive(Default)]
pub struct Probe {
    pub performs: AtomicUsize,
    pub hooks: Mutex<Vec<&'static str>>,
}

impl Probe {
    pub fn hook_log(&self) -> Vec<&'static str> {
        self.hooks.lock().clone()
    }

    pub fn perform_count(&self) -> usize {
        self.performs.load(Ordering::SeqCst)
    }
}

/// Succeeds after failing a configured number of times. Declares the
/// success hook only, so terminal-failure hooks stay silent.
pub struct Flaky {
    pub probe: Arc<Probe>,
    pub failures_before_success: usize,
}

#[async_trait]
impl Handler for Flaky {
    async fn perform(&self, _ctx: &AttemptContext) -> Result<bool, HandlerError> {
        let attempt = self.probe.performs.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(attempt > self.failures_before_success)
    }

    fn methods(&self) -> HandlerMethods {
        HandlerMethods::NONE.with_success()
    }

    async fn on_success(&self) {
        self.probe.hooks.lock().push("success");
    }
}

/// Always fails; declares the failure hook so terminal failures are
/// observable.
pub struct AlwaysFailing {
    pub probe: Arc<Probe>,
}

#[async_trait]
impl Handler for AlwaysFailing {
    async fn perform(&self, _ctx: &AttemptContext) -> Result<bool, HandlerError> {
        self.probe.performs.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }

    fn methods(&self) -> HandlerMethods {
        HandlerMethods::NONE.with_failure()
    }

    async fn on_failure(&self) {
        self.probe.hooks.lock().push("failure");
    }
}

/// Sleeps well past any test deadline while observing cancellation.
pub struct Sleepy {
    pub probe: Arc<Probe>,
}

#[async_trait]
impl Handler for Sleepy {
    async fn perform(&self, ctx: &AttemptContext) -> Result<bool, HandlerError> {
        self.probe.performs.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = ctx.cancelled() => Err(HandlerError::Cancelled),
            _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(true),
        }
    }
}

/// Polls the store until `predicate` holds or the timeout lapses.
pub async fn wait_for(
    store: &MemoryStore,
    timeout: Duration,
    predicate: impl Fn(&[ScheduledTask]) -> bool,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate(&store.all()) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
