use crate::retry::{JITTER_FRACTION_MAX, RetryPolicy, backoff_delay};
use http::HeaderMap;
use rand::Rng;
use reqwest::Method;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Errors from a single outbound call, classified for retry decisions.
#[derive(Error, Debug)]
pub enum CallError {
    /// The attempt exceeded its time box. Never retried: the caller is a
    /// user-facing redirect and cannot afford stacked timeouts.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("network error calling {url}: {message}")]
    Network { url: String, message: String },

    #[error("upstream {url} returned status {status}")]
    UpstreamStatus { url: String, status: u16 },

    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },
}

impl CallError {
    pub fn status(&self) -> Option<u16> {
        match self {
            CallError::UpstreamStatus { status, .. } => Some(*status),
            // Timeout is surfaced as its HTTP equivalent.
            CallError::Timeout { .. } => Some(408),
            _ => None,
        }
    }

    /// Default classification: network errors and 5xx are transient, 4xx
    /// and malformed bodies are not, timeouts are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            CallError::Timeout { .. } => false,
            CallError::Network { .. } => true,
            CallError::UpstreamStatus { status, .. } => *status >= 500,
            CallError::InvalidResponse { .. } => false,
        }
    }
}

/// Options for one logical call (covering all of its attempts).
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
    /// Time box applied to each attempt independently.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// Outbound JSON-over-HTTP caller with per-attempt timeout and
/// backoff/jitter retry. Construct once at process start and share.
#[derive(Clone, Default)]
pub struct ResilientClient {
    client: reqwest::Client,
}

impl ResilientClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub async fn call(
        &self,
        url: &str,
        options: CallOptions,
    ) -> Result<serde_json::Value, CallError> {
        let total_attempts = options.retry.retries.saturating_add(1);
        let mut attempt: u32 = 1;

        loop {
            match self.execute_once(url, &options).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let remaining = total_attempts.saturating_sub(attempt);
                    if !options.retry.wants_retry(&error, remaining) {
                        return Err(error);
                    }

                    let jitter = rand::thread_rng().gen_range(0.0..JITTER_FRACTION_MAX);
                    let delay = backoff_delay(&options.retry, attempt, jitter);
                    tracing::debug!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying upstream call"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn execute_once(
        &self,
        url: &str,
        options: &CallOptions,
    ) -> Result<serde_json::Value, CallError> {
        let mut request = self
            .client
            .request(options.method.clone(), url)
            .timeout(options.timeout)
            .headers(options.headers.clone());

        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CallError::UpstreamStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // The per-attempt timeout also covers body collection.
        response.json().await.map_err(|e| {
            if e.is_timeout() {
                CallError::Timeout {
                    url: url.to_string(),
                }
            } else {
                CallError::InvalidResponse {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }
}

fn classify(url: &str, error: reqwest::Error) -> CallError {
    if error.is_timeout() {
        CallError::Timeout {
            url: url.to_string(),
        }
    } else {
        CallError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
