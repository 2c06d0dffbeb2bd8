//! Shared plumbing for the Google REST clients: bounded retry and status mapping.

use std::time::Duration;

use crate::error::ServiceError;

/// Retry budget for a single Google API request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_delay(
    attempt: u32,
    policy: &RetryPolicy,
    retry_after: Option<&reqwest::header::HeaderValue>,
) -> Duration {
    if let Some(secs) = retry_after
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        return Duration::from_secs(secs.min(30));
    }

    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    Duration::from_millis(base)
}

/// Send a request, retrying 429/408/5xx responses and connect/timeout failures.
pub async fn send_with_retry(
    service: &str,
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, ServiceError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request
                .send()
                .await
                .map_err(|e| ServiceError::unavailable(service, e));
        };

        match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                if is_retryable(status) && attempt < attempts {
                    let delay = retry_delay(
                        attempt,
                        policy,
                        response.headers().get(reqwest::header::RETRY_AFTER),
                    );
                    tracing::warn!(
                        service,
                        attempt,
                        attempts,
                        %status,
                        ?delay,
                        "Retrying Google API request"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                if (err.is_timeout() || err.is_connect()) && attempt < attempts {
                    let delay = retry_delay(attempt, policy, None);
                    tracing::warn!(
                        service,
                        attempt,
                        attempts,
                        error = %err,
                        ?delay,
                        "Retrying Google API request after transport error"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(ServiceError::unavailable(service, err));
            }
        }
    }
    Err(ServiceError::unavailable(service, "retry budget exhausted"))
}

/// Turn a non-success response into a `ServiceError`, passing successes through.
pub async fn check_status(
    service: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ServiceError::AuthExpired {
            service: service.to_string(),
        });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::Api {
            service: service.to_string(),
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(response)
}
