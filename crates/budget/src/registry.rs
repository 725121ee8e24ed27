//! Name → budget registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::types::Budget;

/// Registration failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The supplied name was empty after trimming.
    #[error("budget name cannot be empty")]
    EmptyName,
}

/// Thread-safe name → [`Budget`] map.
pub struct BudgetRegistry {
    entries: RwLock<HashMap<String, Arc<dyn Budget>>>,
}

impl BudgetRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Associate `name` with a budget.
    pub fn register(
        &self,
        name: impl Into<String>,
        budget: Arc<dyn Budget>,
    ) -> Result<(), RegistryError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        self.entries
            .write()
            .expect("budget registry lock poisoned")
            .insert(name, budget);
        Ok(())
    }

    /// Register, panicking on an invalid name. For startup wiring.
    pub fn must_register(&self, name: impl Into<String>, budget: Arc<dyn Budget>) {
        if let Err(err) = self.register(name, budget) {
            panic!("BudgetRegistry::must_register: {err}");
        }
    }

    /// Look up a budget by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Budget>> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        self.entries
            .read()
            .expect("budget registry lock poisoned")
            .get(name)
            .cloned()
    }
}

impl Default for BudgetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::TokenBucketBudget;

    #[test]
    fn register_and_get() {
        let registry = BudgetRegistry::new();
        registry
            .register("bucket", Arc::new(TokenBucketBudget::new(10, 0.0)))
            .unwrap();
        assert!(registry.get("bucket").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn register_rejects_empty_name() {
        let registry = BudgetRegistry::new();
        let err = registry
            .register("  ", Arc::new(TokenBucketBudget::new(1, 0.0)))
            .unwrap_err();
        assert_eq!(err, RegistryError::EmptyName);
    }

    #[test]
    fn lookup_trims_names() {
        let registry = BudgetRegistry::new();
        registry
            .register("bucket", Arc::new(TokenBucketBudget::new(1, 0.0)))
            .unwrap();
        assert!(registry.get(" bucket ").is_some());
        assert!(registry.get("").is_none());
    }
}
