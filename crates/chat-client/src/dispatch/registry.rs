//! Handler registry
//!
//! Collects listeners, transformers and cache rules, and compiles them into a
//! [`DispatchRoutine`]. Compilation is pure: the same registrations always
//! produce an equivalent table.

use super::caching::{cache_steps, validate_rules};
use super::context::{DispatchContext, ReadySignal};
use super::error::RegistrationError;
use super::routine::{Callback, DispatchRoutine, EventPlan, HandlerTable, Listener, ListenerId, Step};
use super::transformer::{EventArgs, Transformer};
use chat_cache::{CachePosition, CacheOptions};
use chat_gateway::GatewayEventType;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Registrations that make up a dispatch routine
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    /// Listeners in registration order
    listeners: Vec<(String, Listener)>,
    transformers: HashMap<String, Transformer>,
    cache: CacheOptions,
    next_id: u64,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every occurrence of `event`
    pub fn on<F>(&mut self, event: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&DispatchContext, &EventArgs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push(event.into(), Arc::new(callback), None)
    }

    /// Register a listener that runs for the first occurrence of `event` only
    pub fn once<F>(&mut self, event: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&DispatchContext, &EventArgs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push(event.into(), Arc::new(callback), Some(Arc::new(AtomicBool::new(false))))
    }

    fn push(&mut self, event: String, callback: Callback, fired: Option<Arc<AtomicBool>>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((event, Listener { id, callback, fired }));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(_, listener)| listener.id != id);
        self.listeners.len() != before
    }

    /// Register the transformer of `event`. Each event has at most one.
    pub fn set_transformer(
        &mut self,
        event: impl Into<String>,
        transformer: Transformer,
    ) -> Result<(), RegistrationError> {
        let event = event.into();
        if self.transformers.contains_key(&event) {
            return Err(RegistrationError::DuplicateTransformer(event));
        }
        self.transformers.insert(event, transformer);
        Ok(())
    }

    /// Enable cache rules. A resource can only be configured once.
    pub fn append_caching_handlers(&mut self, options: CacheOptions) -> Result<(), RegistrationError> {
        let mut merged = self.cache;
        for (resource, rule) in options.rules() {
            if merged.rule(resource).is_some() {
                return Err(RegistrationError::DuplicateCacheRule(resource));
            }
            merged = merged.with(resource, rule);
        }
        validate_rules(&merged)?;
        self.cache = merged;
        Ok(())
    }

    #[must_use]
    pub fn cache_options(&self) -> &CacheOptions {
        &self.cache
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Compile the registrations into a routine signalling `ready`.
    ///
    /// Per event, steps run as: cache rules positioned first, listeners in
    /// registration order, cache rules positioned last, then the ready
    /// signal for READY and RESUMED.
    pub fn compile(&self, ready: ReadySignal) -> Result<DispatchRoutine, RegistrationError> {
        let cache = cache_steps(&self.cache, &self.transformers)?;

        // A restored session completes its first connection with RESUMED
        let ready_events = [GatewayEventType::Ready.as_str(), GatewayEventType::Resumed.as_str()];
        let mut events: Vec<&str> = ready_events.to_vec();
        for event in cache
            .iter()
            .map(|(event, _)| *event)
            .chain(self.listeners.iter().map(|(event, _)| event.as_str()))
            .chain(self.transformers.keys().map(String::as_str))
        {
            if !events.contains(&event) {
                events.push(event);
            }
        }

        let cache_at = |event: &str, position: CachePosition| -> Vec<Step> {
            cache
                .iter()
                .filter(|(name, step)| *name == event && step.position == position)
                .map(|(_, step)| Step::Cache(step.clone()))
                .collect()
        };

        let mut plans = HashMap::with_capacity(events.len());
        for event in events {
            let mut steps: Vec<Step> = cache_at(event, CachePosition::First)
                .into_iter()
                .chain(
                    self.listeners
                        .iter()
                        .filter(|(name, _)| name == event)
                        .map(|(_, listener)| Step::Listener(listener.clone())),
                )
                .chain(cache_at(event, CachePosition::Last))
                .collect();
            if ready_events.contains(&event) {
                steps.push(Step::SignalReady);
            }

            plans.insert(
                event.to_string(),
                EventPlan {
                    transformer: self.transformers.get(event).cloned(),
                    steps,
                },
            );
        }

        tracing::debug!(
            events = plans.len(),
            listeners = self.listeners.len(),
            transformers = self.transformers.len(),
            "Compiled dispatch routine"
        );

        Ok(DispatchRoutine {
            table: HandlerTable { plans },
            ready,
        })
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("listeners", &self.listeners.len())
            .field("transformers", &self.transformers.keys().collect::<Vec<_>>())
            .field("cache", &self.cache)
            .finish()
    }
}
