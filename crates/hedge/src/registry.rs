//! Name → trigger registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::trigger::Trigger;

/// Registration failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The supplied name was empty after trimming.
    #[error("trigger name cannot be empty")]
    EmptyName,
}

/// Thread-safe name → [`Trigger`] map.
pub struct TriggerRegistry {
    entries: RwLock<HashMap<String, Arc<dyn Trigger>>>,
}

impl TriggerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Associate `name` with a trigger.
    pub fn register(
        &self,
        name: impl Into<String>,
        trigger: Arc<dyn Trigger>,
    ) -> Result<(), RegistryError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        self.entries
            .write()
            .expect("trigger registry lock poisoned")
            .insert(name, trigger);
        Ok(())
    }

    /// Register, panicking on an invalid name. For startup wiring.
    pub fn must_register(&self, name: impl Into<String>, trigger: Arc<dyn Trigger>) {
        if let Err(err) = self.register(name, trigger) {
            panic!("TriggerRegistry::must_register: {err}");
        }
    }

    /// Look up a trigger by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Trigger>> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        self.entries
            .read()
            .expect("trigger registry lock poisoned")
            .get(name)
            .cloned()
    }
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
