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

use serde::{Deserialize, Serialize};

/// Reference to the handler that executes a task.
///
/// The namespace and entrypoint jointly resolve to a registered handler
/// type; the optional payload is an opaque string injected into the handler
/// instance before execution. Two references with the same type but
/// different payloads identify different handler instances, which is why
/// the registry caches by the full reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerReference {
    namespace: String,
    entrypoint: String,
    payload: Option<String>,
}

impl HandlerReference {
    /// Creates a reference with no instance payload.
    pub fn new(namespace: impl Into<String>, entrypoint: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entrypoint: entrypoint.into(),
            payload: None,
        }
    }

    /// Attaches a serialized instance payload.
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// The name the type resolver is asked for: `"{namespace}.{entrypoint}"`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.entrypoint)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn entrypoint(&self) -> &str {
        &self.entrypoint
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }
}

impl std::fmt::Display for HandlerReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.namespace, self.entrypoint)
    }
}
