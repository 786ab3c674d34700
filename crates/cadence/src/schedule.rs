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

//! Cron occurrence evaluation.
//!
//! Thin, deterministic wrapper over the `cron` crate. All produced instants
//! are UTC. Empty or whitespace-only expressions are treated as "no
//! occurrence" rather than an error, so a task without a schedule can carry
//! an empty expression without special-casing at every call site.
//!
//! Occurrence iteration is lazy throughout; an unbounded series is never
//! materialized.

use std::borrow::Cow;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::ScheduleError;

/// Parses an expression, yielding `None` for empty/whitespace input.
fn parse(expression: &str) -> Result<Option<Schedule>, ScheduleError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Schedule::from_str(&normalize(trimmed))
        .map(Some)
        .map_err(|source| ScheduleError::InvalidExpression {
            expression: expression.to_string(),
            source,
        })
}

/// Accepts classic five-field cron by prepending a zero seconds column.
fn normalize(expression: &str) -> Cow<'_, str> {
    if expression.split_whitespace().count() == 5 {
        Cow::Owned(format!("0 {expression}"))
    } else {
        Cow::Borrowed(expression)
    }
}

/// Returns the first occurrence strictly after `after`, or `None` when the
/// expression is empty or produces no further occurrences.
pub fn next_occurrence(
    expression: &str,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    Ok(parse(expression)?.and_then(|schedule| schedule.after(&after).next()))
}

/// Returns the first occurrence strictly after `after` that is at or before
/// `end`, or `None` when the series is exhausted within the window.
pub fn next_occurrence_in_window(
    expression: &str,
    after: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    Ok(parse(expression)?
        .and_then(|schedule| schedule.after(&after).next())
        .filter(|occurrence| *occurrence <= end))
}

/// Returns every occurrence strictly after `from` and at or before `to`,
/// in ascending order.
pub fn occurrences_between(
    expression: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>, ScheduleError> {
    match parse(expression)? {
        Some(schedule) => Ok(schedule
            .after(&from)
            .take_while(|occurrence| *occurrence <= to)
            .collect()),
        None => Ok(Vec::new()),
    }
}
