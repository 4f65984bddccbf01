//! Cached value wrapper

use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Value stored in the cache
///
/// Cache rules either keep the raw event data or the output of the event's
/// transformer, depending on `CacheRule::apply_transformers`.
#[derive(Clone)]
pub enum CachedValue {
    /// Raw JSON as received from the gateway
    Raw(Arc<Value>),
    /// Output of a registered transformer
    Mapped(Arc<dyn Any + Send + Sync>),
}

impl CachedValue {
    /// Wrap raw JSON
    #[must_use]
    pub fn raw(value: Value) -> Self {
        Self::Raw(Arc::new(value))
    }

    /// Get the raw JSON, if this entry holds raw data
    #[must_use]
    pub fn as_raw(&self) -> Option<&Value> {
        match self {
            Self::Raw(value) => Some(value),
            Self::Mapped(_) => None,
        }
    }

    /// Get the mapped value as `T`, if this entry holds a `T`
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Self::Mapped(value) => Arc::clone(value).downcast::<T>().ok(),
            Self::Raw(_) => None,
        }
    }

    /// Check if this entry holds transformer output
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }
}

impl fmt::Debug for CachedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(value) => f.debug_tuple("Raw").field(value).finish(),
            Self::Mapped(_) => f.debug_tuple("Mapped").field(&"<dyn Any>").finish(),
        }
    }
}

impl From<Value> for CachedValue {
    fn from(value: Value) -> Self {
        Self::raw(value)
    }
}
