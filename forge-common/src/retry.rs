use crate::config::RetryConfig;
use std::future::Future;
use tryhard::RetryFutureConfig;

/// Retries `f` according to `config`, logging each attempt the way the
/// teacher's `golem_common::retries::with_retries` does (operation name +
/// context), reimplemented against `tryhard` directly since the teacher's own
/// retry loop isn't in the retrieved source.
pub async fn with_retries<T, E, F, Fut>(
    component: &str,
    operation: &str,
    context: Option<String>,
    config: &RetryConfig,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let retry_config = RetryFutureConfig::new(config.max_attempts)
        .exponential_backoff(config.min_delay)
        .max_delay(config.max_delay)
        .on_retry(move |attempt, _next_delay, error: &E| {
            let context = context.clone();
            let component = component.to_string();
            let operation = operation.to_string();
            let message = error.to_string();
            async move {
                tracing::warn!(
                    component,
                    operation,
                    context,
                    attempt,
                    error = message,
                    "retrying after failure"
                );
            }
        });

    tryhard::retry_fn(|| f()).with_config(retry_config).await
}
