//! Model bindings: which model a facade runs against.

use crate::db::{Model, ModelDirectory};
use crate::error::CallerResult;
use std::fmt;
use std::sync::Arc;

/// The model a facade is bound to, either directly or by name.
#[derive(Clone)]
pub enum ModelBinding {
    /// A live model handle.
    Handle(Arc<dyn Model>),
    /// A model name, resolved through a [`ModelDirectory`] on first use.
    Deferred(String),
}

impl ModelBinding {
    pub fn handle<M: Model + 'static>(model: Arc<M>) -> Self {
        Self::Handle(model)
    }

    pub fn deferred(name: impl Into<String>) -> Self {
        Self::Deferred(name.into())
    }

    /// Name of the bound model.
    pub fn name(&self) -> &str {
        match self {
            Self::Handle(model) => model.name(),
            Self::Deferred(name) => name,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    /// Turn the binding into a model handle.
    pub fn resolve(&self, directory: &ModelDirectory) -> CallerResult<Arc<dyn Model>> {
        match self {
            Self::Handle(model) => Ok(Arc::clone(model)),
            Self::Deferred(name) => directory.resolve(name),
        }
    }
}

impl fmt::Debug for ModelBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handle(model) => f.debug_tuple("Handle").field(&model.name()).finish(),
            Self::Deferred(name) => f.debug_tuple("Deferred").field(name).finish(),
        }
    }
}

impl From<&str> for ModelBinding {
    fn from(name: &str) -> Self {
        Self::Deferred(name.to_string())
    }
}

impl From<String> for ModelBinding {
    fn from(name: String) -> Self {
        Self::Deferred(name)
    }
}

impl From<Arc<dyn Model>> for ModelBinding {
    fn from(model: Arc<dyn Model>) -> Self {
        Self::Handle(model)
    }
}
