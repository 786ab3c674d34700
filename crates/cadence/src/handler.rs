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

//! Handler trait and lifecycle hook capabilities.
//!
//! A handler is anything that can run one attempt: `perform` returns
//! `Ok(true)` for success, `Ok(false)` for an unsuccessful attempt, and
//! `Err` when the attempt raised. The lifecycle hooks are optional; a
//! handler declares which ones it implements through [`Handler::methods`],
//! and the executor only invokes declared hooks. The declaration is probed
//! once per handler type and cached for the life of the process.
//!
//! Hook ordering within one attempt:
//!
//! 1. `before`: may veto the attempt body by returning `false`.
//! 2. `perform`: unless vetoed.
//! 3. `on_success`: when `perform` returned `true`.
//! 4. `on_failure`: when the attempt counter has reached the task's cap.
//! 5. `after`: always, including after a raised error.
//!
//! `on_error` replaces the success/failure hooks when `perform` raised;
//! `after` still runs. `halt` is invoked during shutdown for handlers that
//! are mid-attempt at that moment.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;

/// Execution context passed to a running attempt.
///
/// Cancellation is strictly cooperative: the deadline timer and process
/// shutdown signal the token, and the handler is expected to observe it.
/// Nothing forcibly terminates the attempt body.
pub struct AttemptContext {
    cancel: CancellationToken,
}

impl AttemptContext {
    pub(crate) fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// A clone of the attempt's cancellation token, for `select!` arms.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// True once the deadline has lapsed or shutdown has begun.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the attempt is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

/// Which optional lifecycle hooks a handler implements.
///
/// Only declared hooks are invoked; an undeclared hook body is dead code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerMethods {
    pub before: bool,
    pub after: bool,
    pub success: bool,
    pub failure: bool,
    pub error: bool,
    pub halt: bool,
}

impl HandlerMethods {
    /// No hooks: `perform` only.
    pub const NONE: HandlerMethods = HandlerMethods {
        before: false,
        after: false,
        success: false,
        failure: false,
        error: false,
        halt: false,
    };

    /// Every hook.
    pub const ALL: HandlerMethods = HandlerMethods {
        before: true,
        after: true,
        success: true,
        failure: true,
        error: true,
        halt: true,
    };

    pub fn with_before(mut self) -> Self {
        self.before = true;
        self
    }

    pub fn with_after(mut self) -> Self {
        self.after = true;
        self
    }

    pub fn with_success(mut self) -> Self {
        self.success = true;
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.failure = true;
        self
    }

    pub fn with_error(mut self) -> Self {
        self.error = true;
        self
    }

    pub fn with_halt(mut self) -> Self {
        self.halt = true;
        self
    }
}

/// One attempt's worth of user code, plus optional lifecycle hooks.
///
/// Implementations are shared across concurrent attempts of tasks that
/// resolve to the same reference, so mutable state needs interior
/// mutability.
///
/// ```rust,ignore
/// struct InvoiceSweep;
///
/// #[async_trait]
/// impl Handler for InvoiceSweep {
///     async fn perform(&self, ctx: &AttemptContext) -> Result<bool, HandlerError> {
///         tokio::select! {
///             _ = ctx.cancelled() => Err(HandlerError::Cancelled),
///             swept = sweep_invoices() => Ok(swept?),
///         }
///     }
///
///     fn methods(&self) -> HandlerMethods {
///         HandlerMethods::NONE.with_success()
///     }
///
///     async fn on_success(&self) {
///         tracing::info!("invoice sweep finished");
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + Sync {
    /// Runs one attempt. `Ok(true)` is success, `Ok(false)` an unsuccessful
    /// attempt, `Err` a raised attempt.
    async fn perform(&self, ctx: &AttemptContext) -> Result<bool, HandlerError>;

    /// Declares which optional hooks this handler implements.
    fn methods(&self) -> HandlerMethods {
        HandlerMethods::NONE
    }

    /// Injects the reference's instance payload into a freshly constructed
    /// handler, before it is cached or executed. The payload format is the
    /// handler's own business.
    fn hydrate(&mut self, _payload: &str) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Pre-attempt veto. Returning `false` skips `perform` and records the
    /// attempt as unsuccessful.
    async fn before(&self) -> bool {
        true
    }

    /// Runs after the attempt body regardless of outcome.
    async fn after(&self) {}

    /// Runs when `perform` returned `true`.
    async fn on_success(&self) {}

    /// Runs when the attempt counter has reached the task's attempt cap.
    async fn on_failure(&self) {}

    /// Runs when `perform` raised a non-cancellation error.
    async fn on_error(&self, _error: &HandlerError) {}

    /// Runs during shutdown while this handler holds an execution slot.
    async fn halt(&self, _immediate: bool) {}
}
