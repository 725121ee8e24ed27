//! The provider contract and the static provider.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use recourse_policy::{EffectivePolicy, PolicyKey, PolicySource};

/// Why policy resolution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The provider could not be reached at all.
    Unavailable,
    /// The provider answered but has no policy for the key.
    NotFound,
    /// The fetch started but did not complete or parse.
    FetchFailed,
}

impl ProviderErrorKind {
    /// Stable snake_case label, used in the `policy_error` timeline
    /// attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unavailable => "provider_unavailable",
            Self::NotFound => "policy_not_found",
            Self::FetchFailed => "policy_fetch_failed",
        }
    }
}

/// Policy resolution failure, optionally carrying a last-known-good policy.
///
/// A provider with a warm cache should attach the cached policy via
/// [`ProviderError::with_lkg`]; the engine runs under it and records
/// `policy_source=lkg` instead of failing the call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("policy resolution failed ({}): {message}", kind.as_str())]
pub struct ProviderError {
    /// Failure class.
    pub kind: ProviderErrorKind,
    /// Human-readable detail.
    pub message: String,
    /// Last-known-good policy, when the provider has one.
    pub lkg: Option<Box<EffectivePolicy>>,
}

impl ProviderError {
    /// The provider could not be reached.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Unavailable,
            message: message.into(),
            lkg: None,
        }
    }

    /// No policy exists for the key.
    pub fn not_found(key: &PolicyKey) -> Self {
        Self {
            kind: ProviderErrorKind::NotFound,
            message: format!("no policy for key {key}"),
            lkg: None,
        }
    }

    /// The fetch failed midway.
    pub fn fetch_failed(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::FetchFailed,
            message: message.into(),
            lkg: None,
        }
    }

    /// Attach a last-known-good policy. Its source is stamped
    /// [`PolicySource::Lkg`].
    pub fn with_lkg(mut self, mut policy: EffectivePolicy) -> Self {
        policy.meta.source = PolicySource::Lkg;
        self.lkg = Some(Box::new(policy));
        self
    }
}

/// Maps a policy key to an effective policy.
///
/// Resolution may block (a remote fetch); the engine calls it once per call
/// before any attempt runs.
#[async_trait]
pub trait PolicyProvider: Send + Sync {
    /// Resolve the policy for a key.
    async fn get_effective_policy(&self, key: &PolicyKey) -> Result<EffectivePolicy, ProviderError>;
}

/// In-memory provider backed by a key → policy map.
pub struct StaticProvider {
    policies: RwLock<HashMap<PolicyKey, EffectivePolicy>>,
}

impl StaticProvider {
    /// Create an empty provider; every lookup is `NotFound`.
    pub fn empty() -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
        }
    }

    /// Create a provider from an existing map.
    pub fn new(policies: HashMap<PolicyKey, EffectivePolicy>) -> Self {
        Self {
            policies: RwLock::new(policies),
        }
    }

    /// Insert or replace the policy for its key.
    pub fn set(&self, mut policy: EffectivePolicy) {
        policy.meta.source = PolicySource::Static;
        self.policies
            .write()
            .expect("static provider lock poisoned")
            .insert(policy.key.clone(), policy);
    }
}

impl Default for StaticProvider {
    fn default() -> Self {
        Self::empty()
    }
}

#[async_trait]
impl PolicyProvider for StaticProvider {
    async fn get_effective_policy(&self, key: &PolicyKey) -> Result<EffectivePolicy, ProviderError> {
        let policies = self.policies.read().expect("static provider lock poisoned");
        match policies.get(key) {
            Some(policy) => {
                let mut policy = policy.clone();
                policy.meta.source = PolicySource::Static;
                Ok(policy)
            }
            None => Err(ProviderError::not_found(key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recourse_policy::default_policy_for;

    #[tokio::test]
    async fn static_provider_resolves_registered_keys() {
        let provider = StaticProvider::empty();
        let key = PolicyKey::parse("svc.M");
        provider.set(default_policy_for(key.clone()));

        let resolved = provider.get_effective_policy(&key).await.unwrap();
        assert_eq!(resolved.key, key);
        assert_eq!(resolved.meta.source, PolicySource::Static);
    }

    #[tokio::test]
    async fn static_provider_misses_are_not_found() {
        let provider = StaticProvider::empty();
        let err = provider
            .get_effective_policy(&PolicyKey::parse("svc.Missing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::NotFound);
        assert!(err.lkg.is_none());
    }

    #[test]
    fn lkg_policies_are_stamped() {
        let policy = default_policy_for(PolicyKey::parse("svc.M"));
        let err = ProviderError::unavailable("control plane down").with_lkg(policy);
        assert_eq!(err.lkg.unwrap().meta.source, PolicySource::Lkg);
    }
}
