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

//! Handler resolution and caching.
//!
//! A [`TypeResolver`] maps a qualified name (`"{namespace}.{entrypoint}"`)
//! to a handler constructor. The [`HandlerRegistry`] sits on top of it with
//! two read-mostly caches: resolved handler instances keyed by the full
//! reference (payload included, so stateful handlers with different
//! payloads never alias), and hook declarations keyed by qualified name
//! (one probe per handler type).
//!
//! Resolution failure is not an error: the executor records it on the task
//! and treats the attempt as unsuccessful, so a missing handler retries and
//! terminally fails like any other failure.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::handler::{Handler, HandlerMethods};
use crate::models::HandlerReference;

/// Constructs a fresh, un-hydrated handler instance.
pub type HandlerConstructor = Arc<dyn Fn() -> Box<dyn Handler> + Send + Sync>;

/// Maps qualified handler names to constructors.
///
/// Purely functional from the engine's viewpoint; the registry handles
/// instantiation, hydration, and caching.
pub trait TypeResolver: Send + Sync {
    fn find_type_by_name(&self, qualified_name: &str) -> Option<HandlerConstructor>;
}

/// Map-backed [`TypeResolver`].
///
/// The stock resolver for processes that know their handler set up front;
/// handlers register a constructor under their qualified name at startup.
#[derive(Default)]
pub struct StaticTypeResolver {
    types: RwLock<HashMap<String, HandlerConstructor>>,
}

impl StaticTypeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor under a qualified name. Re-registering a
    /// name replaces the previous constructor.
    pub fn register<F>(&self, qualified_name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn Handler> + Send + Sync + 'static,
    {
        let qualified_name = qualified_name.into();
        debug!(handler = %qualified_name, "registered handler type");
        self.types
            .write()
            .insert(qualified_name, Arc::new(constructor));
    }

    /// Registers a `Default`-constructible handler type.
    pub fn register_default<H>(&self, qualified_name: impl Into<String>)
    where
        H: Handler + Default + 'static,
    {
        self.register(qualified_name, || Box::new(H::default()) as Box<dyn Handler>);
    }

    /// Names currently registered, for diagnostics.
    pub fn registered_names(&self) -> Vec<String> {
        self.types.read().keys().cloned().collect()
    }
}

impl TypeResolver for StaticTypeResolver {
    fn find_type_by_name(&self, qualified_name: &str) -> Option<HandlerConstructor> {
        self.types.read().get(qualified_name).cloned()
    }
}

/// Resolves handler references to executable handlers, caching the results
/// for the life of the process.
pub struct HandlerRegistry {
    resolver: Arc<dyn TypeResolver>,
    handlers: RwLock<HashMap<HandlerReference, Arc<dyn Handler>>>,
    methods: RwLock<HashMap<String, HandlerMethods>>,
}

impl HandlerRegistry {
    pub fn new(resolver: Arc<dyn TypeResolver>) -> Self {
        Self {
            resolver,
            handlers: RwLock::new(HashMap::new()),
            methods: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves a reference to a handler, consulting the cache first.
    ///
    /// On a miss the type resolver supplies a constructor, the instance is
    /// built, hydrated from the reference payload, and cached under the
    /// full reference. `None` means the type is unknown or hydration was
    /// rejected; callers record that on the task rather than raising.
    pub fn resolve(&self, reference: &HandlerReference) -> Option<Arc<dyn Handler>> {
        if let Some(handler) = self.handlers.read().get(reference) {
            return Some(handler.clone());
        }

        let qualified_name = reference.qualified_name();
        let constructor = self.resolver.find_type_by_name(&qualified_name)?;
        let mut instance = constructor();
        if let Some(payload) = reference.payload() {
            if let Err(error) = instance.hydrate(payload) {
                warn!(handler = %qualified_name, %error, "handler rejected instance payload");
                return None;
            }
        }

        let handler: Arc<dyn Handler> = Arc::from(instance);
        // Concurrent first resolutions race benignly; the values are
        // equivalent, so last writer wins.
        self.methods
            .write()
            .entry(qualified_name.clone())
            .or_insert_with(|| handler.methods());
        self.handlers
            .write()
            .insert(reference.clone(), handler.clone());
        debug!(handler = %qualified_name, "resolved and cached handler");
        Some(handler)
    }

    /// The cached hook declaration for a reference's handler type.
    /// [`HandlerMethods::NONE`] until the type has been resolved once.
    pub fn methods_for(&self, reference: &HandlerReference) -> HandlerMethods {
        self.methods
            .read()
            .get(&reference.qualified_name())
            .copied()
            .unwrap_or(HandlerMethods::NONE)
    }

    /// Drops both caches. Used on dispose; subsequent resolutions rebuild.
    pub fn clear(&self) {
        self.handlers.write().clear();
        self.methods.write().clear();
    }
}
