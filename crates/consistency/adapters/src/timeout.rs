use std::future::Future;
use std::time::Duration;

use crate::error::AdapterError;

/// Run an adapter call with a caller-supplied deadline.
pub async fn with_timeout<T, F>(
    limit: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, AdapterError>
where
    F: Future<Output = Result<T, AdapterError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::Timeout {
            operation,
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}
