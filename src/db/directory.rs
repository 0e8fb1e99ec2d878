//! Name to model lookup used by deferred model bindings.

use crate::db::Model;
use crate::error::{CallerError, CallerResult, DriverError};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::debug;

static GLOBAL_DIRECTORY: OnceLock<Arc<ModelDirectory>> = OnceLock::new();

/// Registry of models by name.
#[derive(Default)]
pub struct ModelDirectory {
    models: RwLock<HashMap<String, Arc<dyn Model>>>,
}

impl ModelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide directory, consulted by facades that do not set their own.
    pub fn global() -> Arc<ModelDirectory> {
        GLOBAL_DIRECTORY
            .get_or_init(|| Arc::new(ModelDirectory::new()))
            .clone()
    }

    /// Register `model` under its own name, replacing any previous entry.
    pub fn register(&self, model: Arc<dyn Model>) -> CallerResult<()> {
        let name = model.name().to_string();
        self.register_as(name, model)
    }

    /// Register `model` under an explicit name.
    pub fn register_as(&self, name: impl Into<String>, model: Arc<dyn Model>) -> CallerResult<()> {
        let name = name.into();
        debug!(model = %name, "Registering model");
        self.models
            .write()
            .map_err(|_| DriverError::internal("model directory lock poisoned"))?
            .insert(name, model);
        Ok(())
    }

    /// Look up the model registered under `name`.
    pub fn resolve(&self, name: &str) -> CallerResult<Arc<dyn Model>> {
        self.models
            .read()
            .map_err(|_| DriverError::internal("model directory lock poisoned"))?
            .get(name)
            .cloned()
            .ok_or_else(|| {
                CallerError::invalid_input(format!("No model registered under '{name}'"))
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models
            .read()
            .map(|models| models.contains_key(name))
            .unwrap_or(false)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .models
            .read()
            .map(|models| models.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ModelDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDirectory")
            .field("models", &self.names())
            .finish()
    }
}
