//! Call and attempt contexts.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use recourse_observe::{AttemptInfo, TimelineCapture};

/// Caller-side context for one call: external cancellation and optional
/// timeline capture.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub(crate) cancel: Option<CancellationToken>,
    pub(crate) capture: Option<TimelineCapture>,
}

impl CallContext {
    /// A context with no cancellation and no capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach external cancellation. Canceling the token ends the call with
    /// [`crate::CallError::Canceled`]; in-flight attempts are canceled and
    /// recorded before the call returns.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Capture the finalized timeline into `capture` when the call returns.
    pub fn with_timeline_capture(mut self, capture: &TimelineCapture) -> Self {
        self.capture = Some(capture.clone());
        self
    }

    /// Drop any attached capture; nested calls made with the returned
    /// context will not overwrite the outer capture.
    pub fn without_timeline_capture(mut self) -> Self {
        self.capture = None;
        self
    }
}

/// Per-attempt context handed to the user operation.
///
/// Operations should watch [`AttemptContext::cancelled`] at their await
/// points: the engine cancels losing attempts when a sibling wins, when a
/// sibling fails terminally, and when the caller goes away.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    pub(crate) cancel: CancellationToken,
    pub(crate) deadline: Option<Instant>,
    pub(crate) info: AttemptInfo,
}

impl AttemptContext {
    /// Identity of this attempt (retry group, hedge index, policy id).
    pub fn info(&self) -> &AttemptInfo {
        &self.info
    }

    /// Resolves when the attempt should stop.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Whether the attempt has been canceled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The attempt's cancellation token, for use in `tokio::select!`.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// This attempt's deadline, when the policy sets a per-attempt timeout.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
