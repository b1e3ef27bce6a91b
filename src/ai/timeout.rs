//! Timeout handling for provider calls.
//!
//! Every blocking point in the pipeline is a network call: chat completions,
//! embeddings. Each one is bounded by [`with_timeout`] so a stalled provider
//! surfaces as `RfpError::Timeout`, the only error class the gateway retries.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::ai::timeout::with_timeout;
//!
//! let text = with_timeout(
//!     config.llm.timeout(),
//!     provider.complete(&request),
//!     "chat completion"
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::types::{Result, RfpError};

/// Execute an async operation with a timeout
///
/// Returns a timeout error if the operation doesn't complete within the specified duration.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(RfpError::timeout(operation_name, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, RfpError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, RfpError>(42)
            },
            "slow operation",
        )
        .await;
        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("slow operation"));
    }
}
