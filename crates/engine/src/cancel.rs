//! Tagged group cancellation.
//!
//! Fusion must tell apart three ways an attempt's cancellation fired: a
//! sibling won, a sibling failed terminally, or the caller went away. The
//! cause is recorded before the token is canceled, so any attempt observing
//! the canceled token also observes the cause.

use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

/// Why the engine canceled a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelCause {
    /// A sibling attempt succeeded.
    Winner,
    /// A sibling attempt failed terminally, or the group is winding down.
    Terminal,
    /// The caller's cancellation or the overall deadline fired.
    CtxCanceled,
}

impl CancelCause {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Winner => crate::reasons::WINNER,
            Self::Terminal => crate::reasons::TERMINAL,
            Self::CtxCanceled => recourse_classify::reasons::CTX_CANCELED,
        }
    }
}

/// A cancellation token paired with a write-once cause.
pub(crate) struct GroupCancel {
    token: CancellationToken,
    cause: OnceLock<CancelCause>,
}

impl GroupCancel {
    /// Derive a group token from the call token.
    pub(crate) fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            cause: OnceLock::new(),
        }
    }

    /// Record the cause (first write wins) and cancel the token.
    pub(crate) fn cancel(&self, cause: CancelCause) {
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    /// The recorded cause. `None` when the token fired through its parent
    /// (external cancellation) rather than through [`GroupCancel::cancel`].
    pub(crate) fn cause(&self) -> Option<CancelCause> {
        self.cause.get().copied()
    }

    /// The group token attempts derive from.
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_cause_wins() {
        let cancel = GroupCancel::child_of(&CancellationToken::new());
        cancel.cancel(CancelCause::Winner);
        cancel.cancel(CancelCause::Terminal);
        assert_eq!(cancel.cause(), Some(CancelCause::Winner));
        assert!(cancel.token().is_cancelled());
    }

    #[test]
    fn parent_cancellation_leaves_no_cause() {
        let parent = CancellationToken::new();
        let cancel = GroupCancel::child_of(&parent);
        parent.cancel();
        assert!(cancel.token().is_cancelled());
        assert_eq!(cancel.cause(), None);
    }
}
