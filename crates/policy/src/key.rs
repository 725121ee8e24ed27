//! Policy keys identify low-cardinality call sites.

use serde::{Deserialize, Serialize};

/// Identifies a low-cardinality call site (e.g. `"billing.Charge"`).
///
/// Keys are caller-provided and must stay low-cardinality: they name a call
/// site, never a request. Breakers and latency trackers are keyed by this
/// type, so embedding request identifiers leaks state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyKey {
    /// Namespace segment, usually the dependency or service name.
    pub namespace: String,
    /// Operation name within the namespace.
    pub name: String,
}

impl PolicyKey {
    /// Create a key from explicit namespace and name segments.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `"namespace.name"` into a key.
    ///
    /// Splits on the first dot. Without a dot the whole string becomes the
    /// name. An empty name after the dot degrades to treating the whole
    /// string as the name.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return Self::default();
        }

        match s.split_once('.') {
            None => Self {
                namespace: String::new(),
                name: s.to_string(),
            },
            Some((ns, name)) => {
                let ns = ns.trim();
                let name = name.trim();
                if name.is_empty() {
                    return Self {
                        namespace: String::new(),
                        name: s.to_string(),
                    };
                }
                Self {
                    namespace: ns.to_string(),
                    name: name.to_string(),
                }
            }
        }
    }

    /// True when both segments are empty.
    pub fn is_empty(&self) -> bool {
        self.namespace.is_empty() && self.name.is_empty()
    }
}

impl std::fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            return f.write_str(&self.name);
        }
        if self.name.is_empty() {
            return f.write_str(&self.namespace);
        }
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

impl From<&str> for PolicyKey {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for PolicyKey {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dotted() {
        let key = PolicyKey::parse("billing.Charge");
        assert_eq!(key.namespace, "billing");
        assert_eq!(key.name, "Charge");
        assert_eq!(key.to_string(), "billing.Charge");
    }

    #[test]
    fn parse_without_dot() {
        let key = PolicyKey::parse("Charge");
        assert_eq!(key.namespace, "");
        assert_eq!(key.name, "Charge");
        assert_eq!(key.to_string(), "Charge");
    }

    #[test]
    fn parse_trims_whitespace() {
        let key = PolicyKey::parse("  billing . Charge ");
        assert_eq!(key.namespace, "billing");
        assert_eq!(key.name, "Charge");
    }

    #[test]
    fn parse_trailing_dot_keeps_full_name() {
        let key = PolicyKey::parse("billing.");
        assert_eq!(key.namespace, "");
        assert_eq!(key.name, "billing.");
    }

    #[test]
    fn parse_empty() {
        let key = PolicyKey::parse("   ");
        assert!(key.is_empty());
        assert_eq!(key.to_string(), "");
    }

    #[test]
    fn display_roundtrip() {
        for input in ["billing.Charge", "Charge", "a.b"] {
            let key = PolicyKey::parse(input);
            assert_eq!(PolicyKey::parse(&key.to_string()), key);
        }
    }
}
