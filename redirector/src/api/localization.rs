//! Full-fingerprint ingestion endpoint.
//!
//! Article pages inject [`crate::challenge::LOCALIZATION_SCRIPT`], which
//! posts here once per page load. The fingerprint is recorded as a `visit`
//! event and the session cookies are (re)issued from the backend's answer.

use crate::client_meta::{build_client_meta, site_domain, unix_now};
use crate::session::{CookiePolicy, SessionCookieSet, TRACE_COOKIE, cookie_key, read_cookie};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::net::IpAddr;
use tracker::{TrackOptions, TrackerClient};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct LocalizationRequest {
    /// Page URL the fingerprint was collected on.
    pub url: String,
    /// The flat `js_*` signal bag, opaque to this service.
    pub localization_meta: JsonValue,
    #[serde(default)]
    pub execution_time_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalizationResponse {
    pub ok: bool,
    pub localized: bool,
}

pub struct LocalizationHandler {
    tracker: TrackerClient,
    domain: Option<String>,
    cookie_policy: CookiePolicy,
}

impl LocalizationHandler {
    pub fn new(tracker: TrackerClient, domain: Option<String>, cookie_policy: CookiePolicy) -> Self {
        Self {
            tracker,
            domain,
            cookie_policy,
        }
    }

    /// Never fails outward: a backend hiccup degrades to
    /// `{ ok: false, localized: false }` with no cookies.
    pub async fn handle(
        &self,
        headers: &HeaderMap,
        peer_ip: Option<IpAddr>,
        request: LocalizationRequest,
    ) -> (LocalizationResponse, SessionCookieSet) {
        // Localization fingerprints are not campaign-scoped; the page's
        // host stands in as the mtfi cookie key.
        let tag = Url::parse(&request.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_default();
        let mtfi_key = cookie_key(&tag, None, None);
        let mtfi = read_cookie(headers, &mtfi_key);

        let domain = site_domain(self.domain.as_deref(), headers);
        let client_meta =
            build_client_meta(headers, peer_ip, &domain, &request.url, mtfi, unix_now());

        let js_meta = decorate(
            request.localization_meta,
            &request.url,
            request.execution_time_ms,
        );
        let opts = TrackOptions {
            js_meta: Some(js_meta),
            client_meta,
            with_flow: true,
        };

        let response = match self.tracker.track_event("visit", None, None, &opts).await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(url = %request.url, error = %error, "localization track failed");
                return (failed(), SessionCookieSet::new());
            }
        };

        if let Some(message) = response.failure_message() {
            tracing::warn!(url = %request.url, reason = message, "localization rejected by backend");
            return (failed(), SessionCookieSet::new());
        }

        let mut cookies = SessionCookieSet::new();
        if let Some(new_mtfi) = &response.mtfi {
            cookies.set_mtfi(&self.cookie_policy, &mtfi_key, new_mtfi);
        }
        if let Some(target) = &response.content_is_target {
            cookies.set_target(&self.cookie_policy, target);
        }
        if read_cookie(headers, TRACE_COOKIE).is_none() {
            cookies.set_trace(&self.cookie_policy, &Uuid::new_v4().to_string());
        }

        let localized = response.is_target() == Some(true);
        (
            LocalizationResponse {
                ok: true,
                localized,
            },
            cookies,
        )
    }
}

fn failed() -> LocalizationResponse {
    LocalizationResponse {
        ok: false,
        localized: false,
    }
}

/// Folds the page URL and timing into the opaque bag under the `js_*`
/// naming the backend expects.
fn decorate(meta: JsonValue, url: &str, execution_time_ms: Option<u64>) -> JsonValue {
    match meta {
        JsonValue::Object(mut map) => {
            map.entry("js_url".to_string())
                .or_insert_with(|| JsonValue::String(url.to_string()));
            if let Some(elapsed) = execution_time_ms {
                map.entry("js_execution_time_ms".to_string())
                    .or_insert_with(|| JsonValue::from(elapsed));
            }
            JsonValue::Object(map)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn handler(server: &MockServer) -> LocalizationHandler {
        LocalizationHandler::new(
            TrackerClient::new(
                Url::parse(&server.uri()).unwrap(),
                Duration::from_millis(500),
            ),
            Some("click.example.com".to_string()),
            CookiePolicy::default(),
        )
    }

    fn request() -> LocalizationRequest {
        LocalizationRequest {
            url: "https://site.example.com/articles/best-deals".to_string(),
            localization_meta: serde_json::json!({ "js_canvas": "12345" }),
            execution_time_ms: Some(42),
        }
    }

    #[tokio::test]
    async fn test_localization_issues_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/marketing_track"))
            .and(query_param("event_type", "visit"))
            .and(query_param("with_flow", "true"))
            .and(body_partial_json(serde_json::json!({
                "js_meta": {
                    "js_canvas": "12345",
                    "js_url": "https://site.example.com/articles/best-deals",
                    "js_execution_time_ms": 42
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "mtfi": "m-5",
                "content_is_target": "true"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (response, cookies) = handler(&server)
            .handle(&HeaderMap::new(), None, request())
            .await;

        assert_eq!(
            response,
            LocalizationResponse {
                ok: true,
                localized: true
            }
        );
        let names: Vec<_> = cookies.iter().map(|c| c.name().to_string()).collect();
        assert!(names.contains(&"_mtfi__site.example.com".to_string()));
        assert!(names.contains(&"TARGET".to_string()));
        assert!(names.contains(&"TRACE".to_string()));
    }

    #[tokio::test]
    async fn test_localization_not_target() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/marketing_track"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "mtfi": "m-6",
                "content_is_target": "false"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (response, cookies) = handler(&server)
            .handle(&HeaderMap::new(), None, request())
            .await;

        assert_eq!(
            response,
            LocalizationResponse {
                ok: true,
                localized: false
            }
        );
        assert!(!cookies.is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_degrades_quietly() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/marketing_track"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (response, cookies) = handler(&server)
            .handle(&HeaderMap::new(), None, request())
            .await;

        assert_eq!(
            response,
            LocalizationResponse {
                ok: false,
                localized: false
            }
        );
        assert!(cookies.is_empty());
    }

    #[tokio::test]
    async fn test_backend_message_degrades_quietly() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/marketing_track"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "unknown domain"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (response, cookies) = handler(&server)
            .handle(&HeaderMap::new(), None, request())
            .await;

        assert!(!response.ok);
        assert!(cookies.is_empty());
    }
}
