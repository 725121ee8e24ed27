//! Policy schema and normalization.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::PolicyKey;

/// Jitter strategy applied to backoff sleeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterKind {
    /// Use the computed backoff as-is.
    #[default]
    None,
    /// Uniform random in `[0, backoff]`.
    Full,
    /// Uniform random in `[backoff/2, backoff]`.
    Equal,
}

impl JitterKind {
    /// Parse a control-plane jitter string.
    ///
    /// Empty input maps to [`JitterKind::None`]; anything else unknown is a
    /// normalization error rather than a silent default.
    pub fn parse(s: &str) -> Result<Self, NormalizeError> {
        match s.trim() {
            "" | "none" => Ok(Self::None),
            "full" => Ok(Self::Full),
            "equal" => Ok(Self::Equal),
            other => Err(NormalizeError::UnknownJitter(other.to_string())),
        }
    }
}

/// Reference to a named budget plus the units one attempt consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRef {
    /// Budget registry name; empty means no budget gating.
    #[serde(default)]
    pub name: String,
    /// Units consumed per attempt (min 1).
    #[serde(default)]
    pub cost: u32,
}

impl BudgetRef {
    /// Reference a named budget at cost 1.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cost: 1,
        }
    }
}

/// Retry envelope for a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts per call, counting the first.
    pub max_attempts: u32,
    /// Starting backoff before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for backoff delays.
    pub max_backoff: Duration,
    /// Exponential backoff multiplier.
    pub backoff_multiplier: f64,
    /// Backoff jitter strategy.
    pub jitter: JitterKind,
    /// Per-attempt timeout; zero disables.
    pub timeout_per_attempt: Duration,
    /// Total timeout across all attempts; zero disables.
    pub overall_timeout: Duration,
    /// Classifier registry name; empty uses the engine default.
    #[serde(default)]
    pub classifier_name: String,
    /// Budget gating for retry attempts.
    #[serde(default)]
    pub budget: BudgetRef,
}

/// Hedging envelope for a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgePolicy {
    /// Enable hedging for this key.
    pub enabled: bool,
    /// Maximum additional hedged attempts per retry group.
    pub max_hedges: u32,
    /// Delay before spawning a hedge.
    pub hedge_delay: Duration,
    /// Optional dynamic trigger name.
    #[serde(default)]
    pub trigger_name: String,
    /// Cancel the group on any terminal outcome.
    pub cancel_on_first_terminal: bool,
    /// Budget gating for hedged attempts.
    #[serde(default)]
    pub budget: BudgetRef,
}

/// Circuit breaker envelope for a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitPolicy {
    /// Enable circuit breaking for this key.
    pub enabled: bool,
    /// Consecutive failures to open the circuit.
    pub threshold: u32,
    /// Cooldown before a half-open probe.
    pub cooldown: Duration,
}

/// Where a policy came from during resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySource {
    /// Source could not be determined.
    #[default]
    Unknown,
    /// Statically configured.
    Static,
    /// Fetched from a control plane.
    Remote,
    /// Last-known-good cache served after a fetch failure.
    Lkg,
    /// Engine default.
    Default,
}

impl PolicySource {
    /// Stable snake_case label, used in timeline attributes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Static => "static",
            Self::Remote => "remote",
            Self::Lkg => "lkg",
            Self::Default => "default",
        }
    }
}

/// What normalization changed, if anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizationInfo {
    /// Whether normalization changed any field.
    pub changed: bool,
    /// Dot-delimited field paths that were changed.
    pub changed_fields: Vec<String>,
}

/// Resolution metadata attached to an effective policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Policy resolution source.
    pub source: PolicySource,
    /// Normalization metadata.
    pub normalization: NormalizationInfo,
}

/// The per-call immutable policy snapshot the engine executes under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivePolicy {
    /// Policy key this policy applies to.
    pub key: PolicyKey,
    /// Optional policy identifier, carried into timelines.
    #[serde(default)]
    pub id: String,
    /// Retry envelope.
    pub retry: RetryPolicy,
    /// Hedging envelope.
    pub hedge: HedgePolicy,
    /// Circuit breaker envelope.
    pub circuit: CircuitPolicy,
    /// Resolution metadata (not part of the wire form).
    #[serde(skip)]
    pub meta: Metadata,
}

/// Safe default policy for a key: three attempts, short exponential backoff,
/// hedging and circuit breaking disabled.
pub fn default_policy_for(key: PolicyKey) -> EffectivePolicy {
    EffectivePolicy {
        key,
        id: String::new(),
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(250),
            backoff_multiplier: 2.0,
            jitter: JitterKind::None,
            timeout_per_attempt: Duration::ZERO,
            overall_timeout: Duration::ZERO,
            classifier_name: String::new(),
            budget: BudgetRef {
                name: String::new(),
                cost: 1,
            },
        },
        hedge: HedgePolicy {
            enabled: false,
            max_hedges: 0,
            hedge_delay: Duration::ZERO,
            trigger_name: String::new(),
            cancel_on_first_terminal: false,
            budget: BudgetRef {
                name: String::new(),
                cost: 1,
            },
        },
        circuit: CircuitPolicy {
            enabled: false,
            threshold: 0,
            cooldown: Duration::ZERO,
        },
        meta: Metadata {
            source: PolicySource::Default,
            normalization: NormalizationInfo::default(),
        },
    }
}

/// Typed error for values normalization cannot repair by clamping.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    /// The jitter string is not one of the known kinds.
    #[error("unknown jitter kind {0:?}")]
    UnknownJitter(String),
    /// The backoff multiplier is NaN or infinite.
    #[error("retry.backoff_multiplier must be finite, got {0}")]
    NonFiniteMultiplier(f64),
}

// Hard guardrails. Values outside these bounds are clamped and the field is
// recorded in NormalizationInfo.
const MAX_RETRY_ATTEMPTS: u32 = 10;
const MAX_HEDGES: u32 = 3;
const MIN_BACKOFF_FLOOR: Duration = Duration::from_millis(1);
const MIN_HEDGE_DELAY_FLOOR: Duration = Duration::from_millis(10);
const MAX_BACKOFF_CEILING: Duration = Duration::from_secs(30);
const MIN_TIMEOUT_FLOOR: Duration = Duration::from_millis(1);
const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;
const MIN_CIRCUIT_COOLDOWN: Duration = Duration::from_millis(100);

impl EffectivePolicy {
    /// Clamp every field to the hard guardrails, filling defaults for unset
    /// values and recording each changed field path.
    ///
    /// Normalization is idempotent: normalizing an already-normalized policy
    /// changes nothing further.
    pub fn normalize(&self) -> Result<EffectivePolicy, NormalizeError> {
        let mut p = self.clone();
        p.meta.normalization = NormalizationInfo::default();

        if !p.retry.backoff_multiplier.is_finite() {
            return Err(NormalizeError::NonFiniteMultiplier(
                p.retry.backoff_multiplier,
            ));
        }

        let mut changed: Vec<String> = Vec::new();
        let mut mark = |field: &str, list: &mut Vec<String>| {
            if !list.iter().any(|f| f == field) {
                list.push(field.to_string());
            }
        };

        if p.retry.max_attempts == 0 {
            p.retry.max_attempts = 3;
            mark("retry.max_attempts", &mut changed);
        } else if p.retry.max_attempts > MAX_RETRY_ATTEMPTS {
            p.retry.max_attempts = MAX_RETRY_ATTEMPTS;
            mark("retry.max_attempts", &mut changed);
        }

        if p.retry.initial_backoff.is_zero() {
            p.retry.initial_backoff = Duration::from_millis(10);
            mark("retry.initial_backoff", &mut changed);
        } else if p.retry.initial_backoff < MIN_BACKOFF_FLOOR {
            p.retry.initial_backoff = MIN_BACKOFF_FLOOR;
            mark("retry.initial_backoff", &mut changed);
        }

        if p.retry.max_backoff.is_zero() {
            p.retry.max_backoff = Duration::from_millis(250);
            mark("retry.max_backoff", &mut changed);
        }
        if p.retry.max_backoff > MAX_BACKOFF_CEILING {
            p.retry.max_backoff = MAX_BACKOFF_CEILING;
            mark("retry.max_backoff", &mut changed);
        }
        if p.retry.max_backoff < p.retry.initial_backoff {
            p.retry.max_backoff = p.retry.initial_backoff;
            mark("retry.max_backoff", &mut changed);
        }

        if p.retry.backoff_multiplier == 0.0 {
            p.retry.backoff_multiplier = 2.0;
            mark("retry.backoff_multiplier", &mut changed);
        } else if p.retry.backoff_multiplier < 1.0 {
            p.retry.backoff_multiplier = 1.0;
            mark("retry.backoff_multiplier", &mut changed);
        } else if p.retry.backoff_multiplier > MAX_BACKOFF_MULTIPLIER {
            p.retry.backoff_multiplier = MAX_BACKOFF_MULTIPLIER;
            mark("retry.backoff_multiplier", &mut changed);
        }

        if !p.retry.timeout_per_attempt.is_zero()
            && p.retry.timeout_per_attempt < MIN_TIMEOUT_FLOOR
        {
            p.retry.timeout_per_attempt = MIN_TIMEOUT_FLOOR;
            mark("retry.timeout_per_attempt", &mut changed);
        }

        if !p.retry.overall_timeout.is_zero() && p.retry.overall_timeout < MIN_TIMEOUT_FLOOR {
            p.retry.overall_timeout = MIN_TIMEOUT_FLOOR;
            mark("retry.overall_timeout", &mut changed);
        }

        if p.retry.budget.cost == 0 {
            p.retry.budget.cost = 1;
            mark("retry.budget.cost", &mut changed);
        }
        if p.hedge.budget.cost == 0 {
            p.hedge.budget.cost = 1;
            mark("hedge.budget.cost", &mut changed);
        }

        if p.hedge.enabled {
            if p.hedge.max_hedges == 0 {
                p.hedge.max_hedges = 2;
                mark("hedge.max_hedges", &mut changed);
            } else if p.hedge.max_hedges > MAX_HEDGES {
                p.hedge.max_hedges = MAX_HEDGES;
                mark("hedge.max_hedges", &mut changed);
            }

            if p.hedge.hedge_delay.is_zero() {
                p.hedge.hedge_delay = Duration::from_millis(200);
                mark("hedge.hedge_delay", &mut changed);
            } else if p.hedge.hedge_delay < MIN_HEDGE_DELAY_FLOOR {
                p.hedge.hedge_delay = MIN_HEDGE_DELAY_FLOOR;
                mark("hedge.hedge_delay", &mut changed);
            }
        }

        if p.circuit.enabled {
            if p.circuit.threshold == 0 {
                p.circuit.threshold = 5;
                mark("circuit.threshold", &mut changed);
            }

            if p.circuit.cooldown.is_zero() {
                p.circuit.cooldown = Duration::from_secs(10);
                mark("circuit.cooldown", &mut changed);
            } else if p.circuit.cooldown < MIN_CIRCUIT_COOLDOWN {
                p.circuit.cooldown = MIN_CIRCUIT_COOLDOWN;
                mark("circuit.cooldown", &mut changed);
            }
        }

        p.meta.normalization = NormalizationInfo {
            changed: !changed.is_empty(),
            changed_fields: changed,
        };

        Ok(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_already_normalized() {
        let key = PolicyKey::parse("svc.Method");
        let pol = default_policy_for(key);
        let normalized = pol.normalize().unwrap();
        assert!(!normalized.meta.normalization.changed);
        assert_eq!(normalized.retry, pol.retry);
        assert_eq!(normalized.hedge, pol.hedge);
        assert_eq!(normalized.circuit, pol.circuit);
    }

    #[test]
    fn normalize_clamps_and_records_fields() {
        let mut pol = default_policy_for(PolicyKey::parse("svc.Clamp"));
        pol.retry.max_attempts = 50;
        pol.retry.max_backoff = Duration::from_secs(120);
        pol.retry.backoff_multiplier = 99.0;

        let normalized = pol.normalize().unwrap();
        assert_eq!(normalized.retry.max_attempts, 10);
        assert_eq!(normalized.retry.max_backoff, Duration::from_secs(30));
        assert_eq!(normalized.retry.backoff_multiplier, 10.0);

        let fields = &normalized.meta.normalization.changed_fields;
        assert!(normalized.meta.normalization.changed);
        assert!(fields.iter().any(|f| f == "retry.max_attempts"));
        assert!(fields.iter().any(|f| f == "retry.max_backoff"));
        assert!(fields.iter().any(|f| f == "retry.backoff_multiplier"));
    }

    #[test]
    fn normalize_fills_zero_values() {
        let mut pol = default_policy_for(PolicyKey::parse("svc.Zero"));
        pol.retry.max_attempts = 0;
        pol.retry.initial_backoff = Duration::ZERO;
        pol.retry.budget.cost = 0;

        let normalized = pol.normalize().unwrap();
        assert_eq!(normalized.retry.max_attempts, 3);
        assert_eq!(normalized.retry.initial_backoff, Duration::from_millis(10));
        assert_eq!(normalized.retry.budget.cost, 1);
    }

    #[test]
    fn normalize_max_backoff_never_below_initial() {
        let mut pol = default_policy_for(PolicyKey::parse("svc.Bounds"));
        pol.retry.initial_backoff = Duration::from_secs(5);
        pol.retry.max_backoff = Duration::from_millis(50);

        let normalized = pol.normalize().unwrap();
        assert_eq!(normalized.retry.max_backoff, Duration::from_secs(5));
    }

    #[test]
    fn normalize_hedge_defaults_only_when_enabled() {
        let mut pol = default_policy_for(PolicyKey::parse("svc.Hedge"));
        pol.hedge.enabled = false;
        pol.hedge.max_hedges = 0;
        let normalized = pol.normalize().unwrap();
        assert_eq!(normalized.hedge.max_hedges, 0);

        pol.hedge.enabled = true;
        let normalized = pol.normalize().unwrap();
        assert_eq!(normalized.hedge.max_hedges, 2);
        assert_eq!(normalized.hedge.hedge_delay, Duration::from_millis(200));
    }

    #[test]
    fn normalize_hedge_delay_floor() {
        let mut pol = default_policy_for(PolicyKey::parse("svc.HedgeFloor"));
        pol.hedge.enabled = true;
        pol.hedge.max_hedges = 1;
        pol.hedge.hedge_delay = Duration::from_millis(2);

        let normalized = pol.normalize().unwrap();
        assert_eq!(normalized.hedge.hedge_delay, Duration::from_millis(10));
    }

    #[test]
    fn normalize_circuit_defaults() {
        let mut pol = default_policy_for(PolicyKey::parse("svc.Circuit"));
        pol.circuit.enabled = true;
        let normalized = pol.normalize().unwrap();
        assert_eq!(normalized.circuit.threshold, 5);
        assert_eq!(normalized.circuit.cooldown, Duration::from_secs(10));

        pol.circuit.cooldown = Duration::from_millis(20);
        let normalized = pol.normalize().unwrap();
        assert_eq!(normalized.circuit.cooldown, Duration::from_millis(100));
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut pol = default_policy_for(PolicyKey::parse("svc.Idem"));
        pol.retry.max_attempts = 50;
        pol.retry.initial_backoff = Duration::from_nanos(10);
        pol.hedge.enabled = true;
        pol.circuit.enabled = true;

        let once = pol.normalize().unwrap();
        let twice = once.normalize().unwrap();
        assert!(!twice.meta.normalization.changed);
        assert_eq!(once.retry, twice.retry);
        assert_eq!(once.hedge, twice.hedge);
        assert_eq!(once.circuit, twice.circuit);
    }

    #[test]
    fn normalize_rejects_non_finite_multiplier() {
        let mut pol = default_policy_for(PolicyKey::parse("svc.Nan"));
        pol.retry.backoff_multiplier = f64::NAN;
        assert!(matches!(
            pol.normalize(),
            Err(NormalizeError::NonFiniteMultiplier(_))
        ));
    }

    #[test]
    fn jitter_parse() {
        assert_eq!(JitterKind::parse(""), Ok(JitterKind::None));
        assert_eq!(JitterKind::parse("full"), Ok(JitterKind::Full));
        assert_eq!(JitterKind::parse("equal"), Ok(JitterKind::Equal));
        assert!(matches!(
            JitterKind::parse("sawtooth"),
            Err(NormalizeError::UnknownJitter(_))
        ));
    }

    #[test]
    fn schema_serde_roundtrip() {
        let pol = default_policy_for(PolicyKey::parse("svc.Wire"));
        let json = serde_json::to_string(&pol).unwrap();
        let back: EffectivePolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back.key, pol.key);
        assert_eq!(back.retry, pol.retry);
    }
}
