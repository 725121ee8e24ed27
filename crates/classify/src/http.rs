//! HTTP status classification.
//!
//! Protocol integrations are out of scope for the core, so this classifier
//! works on a small protocol-neutral summary the call site builds from its
//! HTTP client of choice.

use std::time::Duration;

use crate::classifier::{BoxError, CancelError, Classifier, ClassifyValue};
use crate::outcome::Outcome;
use crate::reasons;

/// Summary of an HTTP response for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusResponse {
    /// HTTP status code.
    pub code: u16,
    /// Parsed `Retry-After` delay, if the server sent one.
    pub retry_after: Option<Duration>,
}

impl StatusResponse {
    /// Summarize a bare status code.
    pub fn new(code: u16) -> Self {
        Self {
            code,
            retry_after: None,
        }
    }

    /// Attach a parsed `Retry-After` delay.
    pub fn with_retry_after(mut self, d: Duration) -> Self {
        self.retry_after = Some(d);
        self
    }
}

/// Classifies [`StatusResponse`] values. Registered as `"http"` by default.
///
/// 2xx/3xx succeed; 408, 429, and 5xx are retryable (429 and 503 honor
/// `Retry-After` as a backoff override); other 4xx are non-retryable.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpStatusClassifier;

/// Registry name the engine registers this classifier under.
pub const HTTP_CLASSIFIER_NAME: &str = "http";

impl Classifier for HttpStatusClassifier {
    fn classify(&self, value: Option<ClassifyValue<'_>>, error: Option<&BoxError>) -> Outcome {
        if let Some(err) = error {
            if let Some(cancel) = err.downcast_ref::<CancelError>() {
                return match cancel {
                    CancelError::Canceled => Outcome::abort(reasons::CTX_CANCELED),
                    CancelError::DeadlineExceeded => Outcome::abort(reasons::DEADLINE_EXCEEDED),
                };
            }
            // Transport-level failures are worth another attempt.
            return Outcome::retryable(reasons::DEFAULT_RETRY);
        }

        let Some(value) = value else {
            return Outcome::success();
        };

        let Some(resp) = value.any.downcast_ref::<StatusResponse>() else {
            return Outcome::non_retryable(reasons::CLASSIFIER_TYPE_MISMATCH)
                .with_attribute("expected_type", std::any::type_name::<StatusResponse>())
                .with_attribute("got_type", value.type_name);
        };

        match resp.code {
            200..=399 => Outcome::success(),
            408 => Outcome::retryable("http_408").with_attribute("status", resp.code.to_string()),
            429 => {
                let mut outcome =
                    Outcome::retryable("http_429").with_attribute("status", resp.code.to_string());
                if let Some(after) = resp.retry_after {
                    outcome = outcome.with_backoff_override(after);
                }
                outcome
            }
            500..=599 => {
                let mut outcome =
                    Outcome::retryable("http_5xx").with_attribute("status", resp.code.to_string());
                if let Some(after) = resp.retry_after {
                    outcome = outcome.with_backoff_override(after);
                }
                outcome
            }
            _ => Outcome::non_retryable("http_4xx").with_attribute("status", resp.code.to_string()),
        }
    }
}
