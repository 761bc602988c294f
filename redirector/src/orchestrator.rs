//! The redirect orchestration state machine.
//!
//! One inbound click runs straight through: bot heuristics, the direct
//! branch, tag/path normalization, the fingerprint challenge gate, mtfi
//! resolution, the tracker call, and one of the terminal outcomes. Every
//! path (including every failure path) ends in a redirect, a JSON body,
//! or the challenge page; the browser never sees an error.

use crate::challenge::render_challenge;
use crate::client_meta::{build_client_meta, client_ip, referrer, site_domain, unix_now};
use crate::errors::RedirectorError;
use crate::metrics_defs::{CLICK_OUTCOMES, TRACKER_CALL_DURATION};
use crate::normalize::normalize;
use crate::notify::{Notify, broken_campaign_message};
use crate::session::{
    CookiePolicy, SessionCookieSet, TARGET_COOKIE, TRACE_COOKIE, cookie_key, read_cookie,
};
use http::HeaderMap;
use http::header::ACCEPT_LANGUAGE;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tracker::{TrackOptions, TrackerClient};
use uuid::Uuid;

/// One inbound click, decoded by the transport adapter. Lives for exactly
/// one HTTP call.
#[derive(Debug, Clone, Default)]
pub struct ClickRequest {
    /// Path segments after the redirect prefix, already split on `/`.
    pub segments: Vec<String>,
    /// Query parameters in order of appearance, first value per key.
    pub query: IndexMap<String, String>,
    pub is_post: bool,
    pub body: Option<ClickBody>,
    pub headers: HeaderMap,
    pub peer_ip: Option<IpAddr>,
    /// Absolute request URL as the visitor's browser sees it.
    pub url: String,
}

/// Optional JSON body of the fingerprint follow-up POST.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClickBody {
    pub js_meta: Option<JsonValue>,
    #[serde(default)]
    pub is_client: bool,
}

/// Terminal outcome of one click. Cookies ride along explicitly so the
/// transport adapter applies them; the state machine itself never touches
/// a response object.
#[derive(Debug)]
pub enum Outcome {
    Redirect {
        location: String,
        cookies: SessionCookieSet,
    },
    Json {
        body: JsonValue,
        cookies: SessionCookieSet,
    },
    Challenge {
        html: String,
    },
}

/// Query keys that configure this service rather than the campaign; they
/// are consumed here and never forwarded upstream.
const LOCAL_QUERY_KEYS: [&str; 3] = ["tags", "direct", "direct_link"];

pub struct Orchestrator {
    tracker: TrackerClient,
    notifier: Arc<dyn Notify>,
    domain: Option<String>,
    cookie_policy: CookiePolicy,
}

impl Orchestrator {
    pub fn new(
        tracker: TrackerClient,
        notifier: Arc<dyn Notify>,
        domain: Option<String>,
        cookie_policy: CookiePolicy,
    ) -> Self {
        Self {
            tracker,
            notifier,
            domain,
            cookie_policy,
        }
    }

    /// Handles one click. Infallible by contract: unexpected errors fold
    /// into a redirect home.
    pub async fn handle_click(&self, request: ClickRequest) -> Outcome {
        match self.resolve(request).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(error = %error, "click handling failed, redirecting home");
                count_outcome("fallback");
                Outcome::Redirect {
                    location: "/".to_string(),
                    cookies: SessionCookieSet::new(),
                }
            }
        }
    }

    async fn resolve(&self, request: ClickRequest) -> Result<Outcome, RedirectorError> {
        let query = &request.query;

        // Local bot heuristics. Note: a detected bot does NOT force a
        // direct redirect; the flags are forwarded and the backend decides.
        let is_bot = query.get("target").map(String::as_str) == Some("false")
            || read_cookie(&request.headers, TARGET_COOKIE).as_deref() == Some("false");

        if query.get("direct").map(String::as_str) == Some("true") {
            return Ok(self.resolve_direct(&request));
        }

        let tag_path = normalize(&request.segments);
        let slug = query.get("slug").cloned().filter(|s| !s.is_empty());

        // Challenge gate: with_meta is forced on for every click, so the
        // only thing that skips the challenge is a body carrying js_meta.
        let js_meta = request.body.as_ref().and_then(|body| body.js_meta.clone());
        if js_meta.is_none() {
            tracing::debug!(tag = %tag_path.tag, "serving fingerprint challenge");
            count_outcome("challenge");
            return Ok(Outcome::Challenge {
                html: render_challenge(&preferred_locale(&request.headers)),
            });
        }

        let mtfi_key = cookie_key(&tag_path.tag, Some(&tag_path.path), slug.as_deref());
        let mtfi = query
            .get("mtfi")
            .cloned()
            .filter(|value| !value.is_empty())
            .or_else(|| read_cookie(&request.headers, &mtfi_key))
            .unwrap_or_else(|| "none".to_string());

        let created_at = query
            .get("created_at")
            .and_then(|value| value.parse().ok())
            .unwrap_or_else(unix_now);
        let domain = site_domain(self.domain.as_deref(), &request.headers);
        let url = query
            .get("url")
            .cloned()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| request.url.clone());

        let client_meta = build_client_meta(
            &request.headers,
            request.peer_ip,
            &domain,
            &url,
            Some(mtfi),
            created_at,
        );

        let mut passthrough: IndexMap<String, String> = query
            .iter()
            .filter(|(key, _)| !LOCAL_QUERY_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if is_bot {
            passthrough.insert("target".to_string(), "true".to_string());
            passthrough.insert("bot".to_string(), "true".to_string());
        }

        let opts = TrackOptions {
            js_meta: Some(decorate_fingerprint(js_meta.unwrap_or(JsonValue::Null), &url)),
            client_meta,
            with_flow: false,
        };

        let is_client_post = request.is_post
            && request
                .body
                .as_ref()
                .map(|body| body.is_client)
                .unwrap_or(false);

        let started = Instant::now();
        let result = self
            .tracker
            .marketing_process(&tag_path.tag, &passthrough, &opts)
            .await;
        shared::histogram!(TRACKER_CALL_DURATION).record(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                // Transport failures stay contained: the browser gets a
                // benign JSON body, never the raw error.
                tracing::warn!(tag = %tag_path.tag, error = %error, "tracker call failed");
                count_outcome("tracker_error");
                return Ok(Outcome::Json {
                    body: serde_json::json!({ "success": false }),
                    cookies: SessionCookieSet::new(),
                });
            }
        };

        if let Some(message) = response.tracking.failure_message() {
            let fallback = format!("https://{}/{}", tag_path.tag, tag_path.path);
            let text = broken_campaign_message(
                &tag_path.tag,
                &fallback,
                &domain,
                &referrer(&request.headers),
                &query_json(query),
                &client_ip(&request.headers, request.peer_ip),
                message,
            );
            self.notifier.notify(&text).await;
            tracing::warn!(tag = %tag_path.tag, reason = message, "broken campaign, redirecting to raw offer");
            count_outcome("broken_campaign");
            return Ok(Outcome::Redirect {
                location: fallback,
                cookies: SessionCookieSet::new(),
            });
        }

        let mut cookies = SessionCookieSet::new();
        if let Some(new_mtfi) = &response.tracking.mtfi {
            cookies.set_mtfi(&self.cookie_policy, &mtfi_key, new_mtfi);
            if let Some(target) = &response.tracking.content_is_target {
                cookies.set_target(&self.cookie_policy, target);
            }
            if read_cookie(&request.headers, TRACE_COOKIE).is_none() {
                cookies.set_trace(&self.cookie_policy, &Uuid::new_v4().to_string());
            }
        }

        // The client-side follow-up expects JSON with a `url` field and
        // navigates itself; only server-initiated requests get the 301.
        if let Some(location) = response.redirect_url()
            && !is_client_post
        {
            let location = location.to_string();
            tracing::info!(tag = %tag_path.tag, location = %location, is_bot, "redirecting");
            count_outcome("redirect");
            return Ok(Outcome::Redirect { location, cookies });
        }

        tracing::info!(tag = %tag_path.tag, is_bot, "returning tracker response");
        count_outcome("json");
        let body = serde_json::to_value(&response)
            .map_err(|e| RedirectorError::ResponseSerializationError(e.to_string()))?;
        Ok(Outcome::Json { body, cookies })
    }

    /// `direct=true` skips tracking entirely: either an explicit link or a
    /// best-effort reconstruction from the path.
    fn resolve_direct(&self, request: &ClickRequest) -> Outcome {
        if let Some(direct_link) = request
            .query
            .get("direct_link")
            .filter(|value| !value.is_empty())
        {
            count_outcome("direct");
            return Outcome::Redirect {
                location: direct_link.clone(),
                cookies: SessionCookieSet::new(),
            };
        }

        let joined = request
            .segments
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("/");
        // A reconstructed link without any dot cannot be a host; go home.
        if !joined.contains('.') {
            count_outcome("direct");
            return Outcome::Redirect {
                location: "/".to_string(),
                cookies: SessionCookieSet::new(),
            };
        }
        count_outcome("direct");
        Outcome::Redirect {
            location: format!("https://{joined}"),
            cookies: SessionCookieSet::new(),
        }
    }
}

fn count_outcome(outcome: &'static str) {
    shared::counter!(CLICK_OUTCOMES, "outcome" => outcome).increment(1);
}

/// The visitor's fingerprint is opaque; the only decoration is the click
/// URL so the backend can join it with the campaign.
fn decorate_fingerprint(js_meta: JsonValue, url: &str) -> JsonValue {
    match js_meta {
        JsonValue::Object(mut map) => {
            map.entry("js_url".to_string())
                .or_insert_with(|| JsonValue::String(url.to_string()));
            JsonValue::Object(map)
        }
        other => other,
    }
}

fn preferred_locale(headers: &HeaderMap) -> String {
    headers
        .get(ACCEPT_LANGUAGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|first| first.split(';').next().unwrap_or(first).trim().to_string())
        .filter(|locale| !locale.is_empty())
        .unwrap_or_else(|| "en".to_string())
}

fn query_json(query: &IndexMap<String, String>) -> String {
    let map: serde_json::Map<String, JsonValue> = query
        .iter()
        .map(|(key, value)| (key.clone(), JsonValue::String(value.clone())))
        .collect();
    JsonValue::Object(map).to_string()
}
