//! Wire types for the legacy tracking backend.
//!
//! The backend predates this service and its field names are fixed:
//! flat query strings, `js_meta`/`client_meta` JSON bodies, and responses
//! whose `message` field doubles as the failure signal.

use http::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Event type that may establish a session; all other events require an
/// existing mtfi.
pub const EVENT_VISIT: &str = "visit";

/// Per-request client descriptor forwarded to the backend for attribution
/// and audit. `headers` is the raw inbound header dump serialized as
/// `"name: value"` pairs joined with CRLF, passed through opaquely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientMeta {
    pub ip: String,
    pub user_agent: String,
    pub domain: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtfi: Option<String>,
    pub created_at: u64,
    pub headers: String,
}

impl ClientMeta {
    /// Request headers the backend expects on both operations. The ip is
    /// mirrored across the three forwarding conventions the backend has
    /// accepted historically.
    pub fn request_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        put(&mut headers, "cf-connecting-ip", &self.ip);
        put(&mut headers, "x-forwarded-for", &self.ip);
        put(&mut headers, "x-real-ip", &self.ip);
        if let Ok(value) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, value.clone());
            headers.insert(HeaderName::from_static("x-user-agent"), value);
        }
        put(&mut headers, "x-url", &self.url);
        put(&mut headers, "x-domain", &self.domain);
        put(&mut headers, "x-host", &self.domain);
        if let Some(mtfi) = &self.mtfi {
            put(&mut headers, "x-mtfi", mtfi);
        }
        put(&mut headers, "x-created-at", &self.created_at.to_string());

        headers
    }
}

fn put(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// Response of `marketing_track`.
///
/// `message` present and not `"ok"` signals failure; its absence signals
/// success. `content_is_target` is a stringly-typed `"true"`/`"false"`.
/// Unknown fields are preserved for forward compatibility.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackingResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtfi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_is_target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(flatten)]
    pub extra: HashMap<String, JsonValue>,
}

impl TrackingResponse {
    /// The business-level failure signal, if any.
    pub fn failure_message(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| *m != "ok")
    }

    /// Parsed cloak decision: `Some(true)` means show the real offer.
    pub fn is_target(&self) -> Option<bool> {
        self.content_is_target.as_deref().map(|v| v == "true")
    }
}

/// Response of `marketing_process`: the tracking fields plus an optional
/// redirect instruction. A failure `message` takes priority over
/// `type`/`url` regardless of what else is populated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketingProcessResponse {
    #[serde(flatten)]
    pub tracking: TrackingResponse,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl MarketingProcessResponse {
    /// The redirect target, only when the backend asked for one and the
    /// call did not fail.
    pub fn redirect_url(&self) -> Option<&str> {
        if self.tracking.failure_message().is_some() {
            return None;
        }
        match (self.kind.as_deref(), self.url.as_deref()) {
            (Some("redirect"), Some(url)) => Some(url),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_meta_request_headers() {
        let meta = ClientMeta {
            ip: "203.0.113.9".into(),
            user_agent: "Mozilla/5.0".into(),
            domain: "click.example.com".into(),
            url: "https://click.example.com/c/shop.com/sale".into(),
            mtfi: Some("m-123".into()),
            created_at: 1700000000,
            headers: "accept: */*\r\n".into(),
        };

        let headers = meta.request_headers();
        assert_eq!(headers.get("cf-connecting-ip").unwrap(), "203.0.113.9");
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "203.0.113.9");
        assert_eq!(headers.get("x-real-ip").unwrap(), "203.0.113.9");
        assert_eq!(headers.get("user-agent").unwrap(), "Mozilla/5.0");
        assert_eq!(headers.get("x-user-agent").unwrap(), "Mozilla/5.0");
        assert_eq!(headers.get("x-domain").unwrap(), "click.example.com");
        assert_eq!(headers.get("x-host").unwrap(), "click.example.com");
        assert_eq!(headers.get("x-mtfi").unwrap(), "m-123");
        assert_eq!(headers.get("x-created-at").unwrap(), "1700000000");
    }

    #[test]
    fn test_no_mtfi_header_when_absent() {
        let meta = ClientMeta::default();
        assert!(meta.request_headers().get("x-mtfi").is_none());
    }

    #[test]
    fn test_failure_message_ignores_ok() {
        let mut response = TrackingResponse::default();
        assert!(response.failure_message().is_none());

        response.message = Some("ok".into());
        assert!(response.failure_message().is_none());

        response.message = Some("campaign disabled".into());
        assert_eq!(response.failure_message(), Some("campaign disabled"));
    }

    #[test]
    fn test_is_target_parsing() {
        let mut response = TrackingResponse::default();
        assert_eq!(response.is_target(), None);
        response.content_is_target = Some("true".into());
        assert_eq!(response.is_target(), Some(true));
        response.content_is_target = Some("false".into());
        assert_eq!(response.is_target(), Some(false));
    }

    #[test]
    fn test_marketing_response_deserializes_flattened() {
        let response: MarketingProcessResponse = serde_json::from_value(serde_json::json!({
            "mtfi": "m-9",
            "content_is_target": "true",
            "type": "redirect",
            "url": "https://shop.com/sale",
            "flow_id": 7
        }))
        .unwrap();

        assert_eq!(response.tracking.mtfi.as_deref(), Some("m-9"));
        assert_eq!(response.redirect_url(), Some("https://shop.com/sale"));
        assert_eq!(response.tracking.extra["flow_id"], 7);
    }

    #[test]
    fn test_message_takes_priority_over_redirect() {
        let response: MarketingProcessResponse = serde_json::from_value(serde_json::json!({
            "message": "broken flow",
            "type": "redirect",
            "url": "https://shop.com/sale"
        }))
        .unwrap();

        assert_eq!(response.tracking.failure_message(), Some("broken flow"));
        assert_eq!(response.redirect_url(), None);
    }
}
