//! Vendor-quirk retry.
//!
//! Some OpenAI-compatible servers reject optional parameters they do not
//! know. Adapters add such parameters speculatively and, when the vendor
//! answers 400 naming the parameter, retry exactly once without it. Any other
//! failure, and any failure of the retry itself, propagates unchanged.

use crate::error::LlmError;
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed future to simplify retry function signatures
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Decision about whether to retry after an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry once without the speculative parameter
    RetryWithout,
    /// Fail immediately without retrying
    FailImmediately,
}

/// Decide whether `error` is a rejection of the speculative `param`
pub fn quirk_decision(error: &LlmError, param: &str) -> RetryDecision {
    match error {
        LlmError::TransportError {
            status: Some(400),
            message,
            ..
        } if message.contains(param) => RetryDecision::RetryWithout,
        _ => RetryDecision::FailImmediately,
    }
}

/// Run `operation` with the speculative parameter included, retrying once
/// without it when the vendor rejects it.
///
/// `operation` receives `true` when the parameter should be sent.
pub async fn send_with_quirk_retry<'a, F, T>(param: &str, mut operation: F) -> Result<T, LlmError>
where
    F: FnMut(bool) -> BoxFuture<'a, Result<T, LlmError>>,
{
    match operation(true).await {
        Ok(result) => Ok(result),
        Err(error) => match quirk_decision(&error, param) {
            RetryDecision::RetryWithout => {
                tracing::warn!(
                    "🔄 Vendor rejected speculative parameter '{}', retrying once without it",
                    param
                );
                operation(false).await
            }
            RetryDecision::FailImmediately => Err(error),
        },
    }
}
