//! Dispatch routine
//!
//! A compiled table from event name to an ordered list of steps, run by one
//! interpreter. Events nobody registered for cost a single map lookup.

use super::caching::CacheStep;
use super::context::{DispatchContext, ReadySignal};
use super::transformer::{EventArgs, Transformer};
use chat_cache::CacheResource;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// User callback
pub type Callback = Arc<dyn Fn(&DispatchContext, &EventArgs) -> anyhow::Result<()> + Send + Sync>;

/// Identifier of a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone)]
pub(crate) struct Listener {
    pub(crate) id: ListenerId,
    pub(crate) callback: Callback,
    /// Set once a one-time listener has fired; shared across recompiles
    pub(crate) fired: Option<Arc<AtomicBool>>,
}

impl Listener {
    fn invoke(&self, ctx: &DispatchContext, args: &EventArgs) {
        if let Some(fired) = &self.fired {
            if fired.swap(true, Ordering::SeqCst) {
                return;
            }
        }

        match panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(ctx, args))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(
                event = %ctx.event,
                listener = %self.id,
                error = ?e,
                "Listener failed"
            ),
            Err(_) => tracing::error!(
                event = %ctx.event,
                listener = %self.id,
                "Listener panicked"
            ),
        }
    }
}

/// One step of an event plan
#[derive(Clone)]
pub(crate) enum Step {
    Cache(CacheStep),
    Listener(Listener),
    SignalReady,
}

/// Public description of a step, for inspecting a compiled table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Cache(CacheResource),
    Listener(ListenerId),
    SignalReady,
}

/// Work registered for one event
#[derive(Clone)]
pub struct EventPlan {
    pub(crate) transformer: Option<Transformer>,
    pub(crate) steps: Vec<Step>,
}

impl EventPlan {
    #[must_use]
    pub fn has_transformer(&self) -> bool {
        self.transformer.is_some()
    }

    /// Steps in execution order
    #[must_use]
    pub fn steps(&self) -> Vec<StepKind> {
        self.steps
            .iter()
            .map(|step| match step {
                Step::Cache(cache) => StepKind::Cache(cache.resource),
                Step::Listener(listener) => StepKind::Listener(listener.id),
                Step::SignalReady => StepKind::SignalReady,
            })
            .collect()
    }
}

/// Event name to plan
#[derive(Clone, Default)]
pub struct HandlerTable {
    pub(crate) plans: HashMap<String, EventPlan>,
}

impl HandlerTable {
    #[must_use]
    pub fn plan(&self, event: &str) -> Option<&EventPlan> {
        self.plans.get(event)
    }

    /// Registered event names, sorted
    #[must_use]
    pub fn events(&self) -> Vec<&str> {
        let mut events: Vec<&str> = self.plans.keys().map(String::as_str).collect();
        events.sort_unstable();
        events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// Compiled dispatch routine
#[derive(Clone)]
pub struct DispatchRoutine {
    pub(crate) table: HandlerTable,
    pub(crate) ready: ReadySignal,
}

impl DispatchRoutine {
    #[must_use]
    pub fn table(&self) -> &HandlerTable {
        &self.table
    }

    /// Run the plan registered for `ctx.event`
    pub fn run(&self, ctx: &DispatchContext, data: Value) {
        let Some(plan) = self.table.plan(&ctx.event) else {
            return;
        };

        let data = Arc::new(data);
        let transformed = match &plan.transformer {
            None => None,
            Some(transformer) => {
                match panic::catch_unwind(AssertUnwindSafe(|| transformer.apply(&data))) {
                    Ok(Ok(transformed)) => Some(Ok(transformed)),
                    Ok(Err(e)) => {
                        tracing::error!(event = %ctx.event, error = ?e, "Transformer failed");
                        Some(Err(()))
                    }
                    Err(_) => {
                        tracing::error!(event = %ctx.event, "Transformer panicked");
                        Some(Err(()))
                    }
                }
            }
        };

        // A failed transform skips everything but the ready signal
        let (args, transformed) = match transformed {
            None => (Some(EventArgs::Raw(Arc::clone(&data))), None),
            Some(Ok(transformed)) => (Some(EventArgs::from(transformed.clone())), Some(transformed)),
            Some(Err(())) => (None, None),
        };

        for step in &plan.steps {
            match (step, &args) {
                (Step::SignalReady, _) => {
                    if self.ready.signal() {
                        tracing::debug!("Ready signalled");
                    }
                }
                (_, None) => {}
                (Step::Cache(cache), Some(_)) => {
                    cache.apply(&ctx.cache, &data, transformed.as_ref());
                }
                (Step::Listener(listener), Some(args)) => listener.invoke(ctx, args),
            }
        }
    }
}
