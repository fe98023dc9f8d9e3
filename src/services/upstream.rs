//! Shared upstream client plumbing
//!
//! Error taxonomy for both platform clients, the transient-failure retry
//! loop, and the credential seam the auth-bearing client refreshes
//! through. Rate limiting itself lives with each client (one token
//! bucket per platform).

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the platform clients
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Rate-limited, server error, or timeout; retried locally and only
    /// surfaced after the retry budget is exhausted. Carries the last
    /// observed status (0 when the request never got a response).
    #[error("{platform} transient failure (status {status}): {message}")]
    Transient {
        platform: &'static str,
        status: u16,
        message: String,
    },

    /// Credential rejected even after one refresh
    #[error("{0} credential expired")]
    AuthExpired(&'static str),

    /// Upstream has no such entity; propagated immediately, never retried
    #[error("{platform} has no entity {resource}")]
    NotFound {
        platform: &'static str,
        resource: String,
    },

    /// Response body did not match the expected shape
    #[error("{platform} response parse error: {message}")]
    Parse {
        platform: &'static str,
        message: String,
    },
}

/// Supplies and refreshes the opaque bearer credential for a user on the
/// list platform. The identity/session provider behind it is an external
/// collaborator; this core only calls through the seam.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self, user_id: i64) -> Result<String, UpstreamError>;

    /// Re-issue the credential after an authentication failure.
    async fn refresh_credential(&self, user_id: i64) -> Result<String, UpstreamError>;
}

/// Transient-failure retry policy: exponential backoff, fixed attempt
/// ceiling. Attempt N failing transiently sleeps `base * 2^N` before the
/// next try; after the final attempt the last response surfaces as
/// [`UpstreamError::Transient`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Backoff unit; one second in production, milliseconds in tests
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// True for responses the policy treats as transient: rate limiting and
/// server-side errors. Everything else (including 401/404) is returned to
/// the caller for interpretation.
pub fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Issue a request, retrying transient failures with exponential backoff.
///
/// Non-transient responses (success, 401, 404, other 4xx) return
/// immediately; network-level errors count as transient. The closure is
/// invoked once per attempt so each retry builds a fresh request.
pub async fn send_with_retry<F, Fut>(
    platform: &'static str,
    policy: &RetryPolicy,
    mut attempt_fn: F,
) -> Result<reqwest::Response, UpstreamError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let (status, message) = match attempt_fn().await {
            Ok(response) => {
                let status = response.status();
                if !is_transient_status(status) {
                    return Ok(response);
                }
                (status.as_u16(), format!("HTTP {}", status))
            }
            Err(e) => {
                // Timeouts and connection failures retry like a 5xx
                (0, e.to_string())
            }
        };

        if attempt >= policy.max_attempts {
            tracing::warn!(
                platform,
                attempt,
                status,
                "Retry budget exhausted, surfacing transient error"
            );
            return Err(UpstreamError::Transient {
                platform,
                status,
                message,
            });
        }

        let delay = policy.delay_after(attempt);
        tracing::debug!(platform, attempt, status, delay_ms = delay.as_millis() as u64, "Transient upstream failure, backing off");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
    }

    #[test]
    fn transient_status_classification() {
        use reqwest::StatusCode;
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient_status(StatusCode::OK));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
    }
}
