//! Transformers and callback arguments
//!
//! A transformer maps the raw `d` of an event to application types before
//! cache steps and listeners see it. It runs at most once per event.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type-erased transformer output
pub type Mapped = Arc<dyn Any + Send + Sync>;

type TransformFn = dyn Fn(&Value) -> anyhow::Result<Transformed> + Send + Sync;

/// Output of a transformer
#[derive(Clone)]
pub enum Transformed {
    One(Mapped),
    Many(Vec<Mapped>),
}

impl Transformed {
    /// Value stored by cache rules: the single value, or the first of many
    #[must_use]
    pub fn primary(&self) -> Option<Mapped> {
        match self {
            Self::One(value) => Some(Arc::clone(value)),
            Self::Many(values) => values.first().cloned(),
        }
    }
}

/// Per-event data transformer
#[derive(Clone)]
pub struct Transformer {
    inner: Arc<TransformFn>,
}

impl Transformer {
    /// Transformer producing exactly one value
    pub fn one<T, F>(f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Value) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(move |data| Ok(Transformed::One(Arc::new(f(data)?)))),
        }
    }

    /// Transformer producing a variadic set of values, spread into the callback
    pub fn many<T, F>(f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Value) -> anyhow::Result<Vec<T>> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(move |data| {
                let values = f(data)?
                    .into_iter()
                    .map(|value| Arc::new(value) as Mapped)
                    .collect();
                Ok(Transformed::Many(values))
            }),
        }
    }

    /// Transformer deserializing `d` into `T`
    pub fn deserialize<T>() -> Self
    where
        T: DeserializeOwned + Any + Send + Sync,
    {
        Self::one(|data| Ok(T::deserialize(data)?))
    }

    pub fn apply(&self, data: &Value) -> anyhow::Result<Transformed> {
        (self.inner)(data)
    }
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer").finish_non_exhaustive()
    }
}

/// Arguments passed to a listener: the transformed value when the event has
/// a transformer, the raw payload otherwise
#[derive(Clone)]
pub enum EventArgs {
    Raw(Arc<Value>),
    One(Mapped),
    Many(Vec<Mapped>),
}

impl EventArgs {
    /// Raw payload, if the event has no transformer
    #[must_use]
    pub fn raw(&self) -> Option<&Value> {
        match self {
            Self::Raw(value) => Some(value),
            Self::One(_) | Self::Many(_) => None,
        }
    }

    /// The single transformed value as `T`
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Self::One(value) => Arc::clone(value).downcast::<T>().ok(),
            Self::Raw(_) | Self::Many(_) => None,
        }
    }

    /// Every transformed value that is a `T`
    #[must_use]
    pub fn all<T: Any + Send + Sync>(&self) -> Vec<Arc<T>> {
        match self {
            Self::Raw(_) => Vec::new(),
            Self::One(value) => Arc::clone(value).downcast::<T>().into_iter().collect(),
            Self::Many(values) => values
                .iter()
                .filter_map(|value| Arc::clone(value).downcast::<T>().ok())
                .collect(),
        }
    }

    /// Number of values passed to the callback
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Raw(_) | Self::One(_) => 1,
            Self::Many(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Transformed> for EventArgs {
    fn from(transformed: Transformed) -> Self {
        match transformed {
            Transformed::One(value) => Self::One(value),
            Transformed::Many(values) => Self::Many(values),
        }
    }
}

impl fmt::Debug for EventArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(value) => f.debug_tuple("Raw").field(value).finish(),
            Self::One(_) => f.write_str("One(..)"),
            Self::Many(values) => write!(f, "Many({} values)", values.len()),
        }
    }
}
