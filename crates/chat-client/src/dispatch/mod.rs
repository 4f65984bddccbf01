//! Event dispatch: registrations compiled into a data-driven routine

mod caching;
mod context;
mod error;
mod registry;
mod routine;
mod router;
mod transformer;

pub use context::{DispatchContext, ReadySignal};
pub use error::RegistrationError;
pub use registry::HandlerRegistry;
pub use routine::{Callback, DispatchRoutine, EventPlan, HandlerTable, ListenerId, StepKind};
pub use router::DispatchRouter;
pub use transformer::{EventArgs, Mapped, Transformed, Transformer};
