//! Dispatch router
//!
//! The sink handed to the gateway connection. Holds the current routine so
//! registrations made while running take effect on the next event.

use super::context::DispatchContext;
use super::routine::DispatchRoutine;
use crate::rest::RestClient;
use chat_cache::SharedCache;
use chat_gateway::{DispatchEvent, DispatchSink, GatewayHandle};
use parking_lot::RwLock;
use std::sync::Arc;

pub struct DispatchRouter {
    routine: RwLock<Arc<DispatchRoutine>>,
    cache: SharedCache,
    rest: RestClient,
    gateway: GatewayHandle,
}

impl DispatchRouter {
    #[must_use]
    pub fn new(routine: DispatchRoutine, cache: SharedCache, rest: RestClient, gateway: GatewayHandle) -> Self {
        Self {
            routine: RwLock::new(Arc::new(routine)),
            cache,
            rest,
            gateway,
        }
    }

    /// Swap in a recompiled routine
    pub fn replace(&self, routine: DispatchRoutine) {
        *self.routine.write() = Arc::new(routine);
    }

    #[must_use]
    pub fn routine(&self) -> Arc<DispatchRoutine> {
        Arc::clone(&self.routine.read())
    }
}

impl DispatchSink for DispatchRouter {
    fn dispatch(&self, event: DispatchEvent) {
        let routine = self.routine();
        let ctx = DispatchContext {
            event: event.name,
            sequence: event.sequence,
            session: self.gateway.session(),
            cache: Arc::clone(&self.cache),
            rest: self.rest.clone(),
            gateway: self.gateway.clone(),
        };
        tracing::trace!(event = %ctx.event, sequence = ?ctx.sequence, "Dispatching");
        routine.run(&ctx, event.data);
    }
}
