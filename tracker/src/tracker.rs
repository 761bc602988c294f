use crate::client::{CallError, CallOptions, ResilientClient};
use crate::protocol::{ClientMeta, EVENT_VISIT, MarketingProcessResponse, TrackingResponse};
use crate::retry::RetryPolicy;
use indexmap::IndexMap;
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Result type alias for tracker operations
pub type Result<T, E = TrackerError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("tracker call failed: {0}")]
    Call(#[from] CallError),

    #[error("tracker response did not match the expected shape: {0}")]
    Shape(String),
}

/// Inputs shared by both tracker operations.
#[derive(Debug, Clone, Default)]
pub struct TrackOptions {
    /// Client-collected fingerprint, forwarded verbatim.
    pub js_meta: Option<serde_json::Value>,
    pub client_meta: ClientMeta,
    pub with_flow: bool,
}

/// Adapter for the two legacy backend operations. Both are live calls,
/// never cached. Construct once at process start and share.
#[derive(Clone)]
pub struct TrackerClient {
    http: ResilientClient,
    base_url: Url,
    timeout: Duration,
}

impl TrackerClient {
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        Self {
            http: ResilientClient::new(),
            base_url,
            timeout,
        }
    }

    /// Retry budget for the hot redirect path: tighter than the default so
    /// the full chain stays well under browser/CDN timeout thresholds.
    /// Timeouts are never retried, 5xx up to twice.
    fn hot_path_retry() -> RetryPolicy {
        RetryPolicy {
            retries: 2,
            factor: 2.0,
            min_timeout: Duration::from_millis(10),
            max_timeout: Duration::from_millis(10_000),
            should_retry: Some(Arc::new(|error: &CallError, _remaining| {
                !matches!(error, CallError::Timeout { .. }) && error.is_retryable()
            })),
        }
    }

    fn endpoint(&self, path: &str, query: &IndexMap<String, String>) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    async fn post(
        &self,
        path: &str,
        query: &IndexMap<String, String>,
        body: Option<serde_json::Value>,
        meta: &ClientMeta,
    ) -> Result<serde_json::Value, TrackerError> {
        let url = self.endpoint(path, query);
        let options = CallOptions {
            method: Method::POST,
            headers: meta.request_headers(),
            body,
            timeout: self.timeout,
            retry: Self::hot_path_retry(),
        };
        Ok(self.http.call(url.as_str(), options).await?)
    }

    /// Record an event (`visit`, click milestones, …). Non-`visit` events
    /// without an established mtfi are meaningless to the backend, so they
    /// short-circuit locally instead of producing an upstream error.
    pub async fn track_event(
        &self,
        event_type: &str,
        track_type: Option<&str>,
        track_value: Option<&str>,
        opts: &TrackOptions,
    ) -> Result<TrackingResponse> {
        if event_type != EVENT_VISIT && opts.client_meta.mtfi.is_none() {
            return Ok(TrackingResponse {
                message: Some("no mtfi".to_string()),
                ..TrackingResponse::default()
            });
        }

        let mut query = IndexMap::new();
        query.insert("event_type".to_string(), event_type.to_string());
        if let Some(track_type) = track_type {
            query.insert("track_type".to_string(), track_type.to_string());
        }
        if let Some(track_value) = track_value {
            query.insert("track_value".to_string(), track_value.to_string());
        }
        if let Some(mtfi) = &opts.client_meta.mtfi {
            query.insert("mtfi".to_string(), mtfi.clone());
        }
        query.insert(
            "created_at".to_string(),
            opts.client_meta.created_at.to_string(),
        );
        query.insert("domain".to_string(), opts.client_meta.domain.clone());
        if opts.with_flow {
            query.insert("with_flow".to_string(), "true".to_string());
        }

        let body = opts.js_meta.as_ref().map(|js_meta| {
            serde_json::json!({
                "js_meta": js_meta,
                "client_meta": opts.client_meta,
            })
        });

        let value = self
            .post("/api/marketing_track", &query, body, &opts.client_meta)
            .await?;
        serde_json::from_value(value).map_err(|e| TrackerError::Shape(e.to_string()))
    }

    /// Resolve a click against a campaign. Caller query params ride along
    /// after the base set, first write wins.
    pub async fn marketing_process(
        &self,
        tag: &str,
        passthrough: &IndexMap<String, String>,
        opts: &TrackOptions,
    ) -> Result<MarketingProcessResponse> {
        let mut query = IndexMap::new();
        query.insert("as_json".to_string(), "true".to_string());
        if let Some(mtfi) = &opts.client_meta.mtfi {
            query.insert("mtfi".to_string(), mtfi.clone());
        }
        query.insert(
            "created_at".to_string(),
            opts.client_meta.created_at.to_string(),
        );
        query.insert("tag".to_string(), tag.to_string());
        query.insert("domain".to_string(), opts.client_meta.domain.clone());
        for (key, value) in passthrough {
            query
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        let body = opts
            .js_meta
            .as_ref()
            .map(|js_meta| serde_json::json!({ "js_meta": js_meta }));

        let value = self
            .post("/api/marketing_process", &query, body, &opts.client_meta)
            .await?;
        serde_json::from_value(value).map_err(|e| TrackerError::Shape(e.to_string()))
    }
}
