//! Name → classifier registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::classifier::Classifier;
use crate::http::{HttpStatusClassifier, HTTP_CLASSIFIER_NAME};

/// Registration failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The supplied name was empty after trimming.
    #[error("registry name cannot be empty")]
    EmptyName,
}

/// Thread-safe name → [`Classifier`] map.
///
/// Read-mostly: registration is expected at startup, lookups on every call.
pub struct ClassifierRegistry {
    entries: RwLock<HashMap<String, Arc<dyn Classifier>>>,
}

impl ClassifierRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry pre-populated with the built-in classifiers
    /// (currently `"http"`).
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry
            .register(HTTP_CLASSIFIER_NAME, Arc::new(HttpStatusClassifier))
            .expect("builtin names are non-empty");
        registry
    }

    /// Associate `name` with a classifier.
    pub fn register(
        &self,
        name: impl Into<String>,
        classifier: Arc<dyn Classifier>,
    ) -> Result<(), RegistryError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        self.entries
            .write()
            .expect("classifier registry lock poisoned")
            .insert(name, classifier);
        Ok(())
    }

    /// Register, panicking on an invalid name. For startup wiring.
    pub fn must_register(&self, name: impl Into<String>, classifier: Arc<dyn Classifier>) {
        if let Err(err) = self.register(name, classifier) {
            panic!("ClassifierRegistry::must_register: {err}");
        }
    }

    /// Look up a classifier by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Classifier>> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        self.entries
            .read()
            .expect("classifier registry lock poisoned")
            .get(name)
            .cloned()
    }
}

impl Default for ClassifierRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{BoxError, ClassifyValue, DefaultClassifier};
    use crate::Outcome;

    struct AlwaysAbort;

    impl Classifier for AlwaysAbort {
        fn classify(&self, _: Option<ClassifyValue<'_>>, _: Option<&BoxError>) -> Outcome {
            Outcome::abort("always")
        }
    }

    #[test]
    fn register_and_get() {
        let registry = ClassifierRegistry::new();
        registry.register("abort", Arc::new(AlwaysAbort)).unwrap();
        assert!(registry.get("abort").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn register_rejects_empty_name() {
        let registry = ClassifierRegistry::new();
        let err = registry
            .register("   ", Arc::new(DefaultClassifier))
            .unwrap_err();
        assert_eq!(err, RegistryError::EmptyName);
    }

    #[test]
    fn get_trims_names() {
        let registry = ClassifierRegistry::new();
        registry.register("abort", Arc::new(AlwaysAbort)).unwrap();
        assert!(registry.get(" abort ").is_some());
        assert!(registry.get("").is_none());
    }

    #[test]
    fn builtins_include_http() {
        let registry = ClassifierRegistry::with_builtins();
        assert!(registry.get("http").is_some());
    }
}
