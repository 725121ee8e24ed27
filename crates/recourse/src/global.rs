//! The lazy global default executor.

use std::future::Future;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use recourse_classify::BoxError;
use recourse_control::StaticProvider;
use recourse_engine::{AttemptContext, CallContext, CallError, Executor};
use recourse_policy::PolicyKey;

static DEFAULT: OnceCell<Executor> = OnceCell::new();

/// Errors from configuring the global executor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GlobalError {
    /// The default executor was already initialized (explicitly or by first
    /// use) and cannot be replaced.
    #[error("default executor already initialized")]
    AlreadyInitialized,
}

/// Install the process-wide default executor.
///
/// Must run before the first call through [`default_executor`], [`do_value`],
/// or [`do_call`]; once the default is in use it is never replaced.
pub fn set_default_executor(executor: Executor) -> Result<(), GlobalError> {
    DEFAULT
        .set(executor)
        .map_err(|_| GlobalError::AlreadyInitialized)
}

/// The process-wide default executor, lazily initialized with an empty
/// static provider (every key resolves through the default-policy path).
pub fn default_executor() -> &'static Executor {
    DEFAULT.get_or_init(|| Executor::new(Arc::new(StaticProvider::empty())))
}

/// Execute `op` under the default executor's policy for `key`.
pub async fn do_value<T, F, Fut>(
    ctx: &CallContext,
    key: impl Into<PolicyKey>,
    op: F,
) -> Result<T, CallError>
where
    T: Send + 'static,
    F: Fn(AttemptContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
{
    default_executor().do_value(ctx, key, op).await
}

/// Execute a unit-valued `op` under the default executor's policy for `key`.
pub async fn do_call<F, Fut>(
    ctx: &CallContext,
    key: impl Into<PolicyKey>,
    op: F,
) -> Result<(), CallError>
where
    F: Fn(AttemptContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    default_executor().do_call(ctx, key, op).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn global_default_runs_calls() {
        let value = do_value(&CallContext::new(), "global.Demo", |_ctx| async {
            Ok::<_, BoxError>(11u32)
        })
        .await
        .unwrap();
        assert_eq!(value, 11);

        // First use fixed the default; replacing it now fails.
        let replacement = Executor::new(Arc::new(StaticProvider::empty()));
        assert_eq!(
            set_default_executor(replacement),
            Err(GlobalError::AlreadyInitialized)
        );
    }
}
