//! Transport adapter: hyper `Service` → orchestrator and back.
//!
//! All response plumbing lives here: path/query/body decoding into a
//! [`ClickRequest`], converting the orchestrator's [`Outcome`] into a
//! response, and applying pending cookies. A decode failure on the click
//! path still redirects home; only unrelated paths get a 404.

use crate::api::localization::{LocalizationHandler, LocalizationRequest};
use crate::errors::RedirectorError;
use crate::orchestrator::{ClickBody, ClickRequest, Orchestrator, Outcome};
use crate::session::SessionCookieSet;
use http::header::HOST;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderValue, LOCATION};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use shared::http::{PeerAddr, full_body, make_error_response};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The public link prefix and its internal rewrite.
const CLICK_PREFIXES: [&str; 2] = ["/c", "/api/c"];

#[derive(Clone)]
pub struct RedirectorService {
    inner: Arc<Inner>,
}

struct Inner {
    orchestrator: Orchestrator,
    localization: LocalizationHandler,
}

impl RedirectorService {
    pub fn new(orchestrator: Orchestrator, localization: LocalizationHandler) -> Self {
        Self {
            inner: Arc::new(Inner {
                orchestrator,
                localization,
            }),
        }
    }
}

impl Service<Request<Incoming>> for RedirectorService {
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = RedirectorError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.route(req).await) })
    }
}

impl Inner {
    async fn route(&self, req: Request<Incoming>) -> Response<BoxBody<Bytes, Infallible>> {
        let path = req.uri().path().to_string();

        if path == "/api/localization" && req.method() == Method::POST {
            return self.localization_response(req).await;
        }

        if let Some(suffix) = click_suffix(&path) {
            return self.click_response(&suffix, req).await;
        }

        make_error_response(StatusCode::NOT_FOUND)
    }

    async fn click_response(
        &self,
        suffix: &str,
        req: Request<Incoming>,
    ) -> Response<BoxBody<Bytes, Infallible>> {
        let request = match decode_click(suffix, req).await {
            Ok(request) => request,
            Err(error) => {
                // Even an unreadable request resolves to a redirect.
                tracing::error!(error = %error, "failed to decode click request");
                return redirect_response("/", &SessionCookieSet::new());
            }
        };

        match self.orchestrator.handle_click(request).await {
            Outcome::Redirect { location, cookies } => redirect_response(&location, &cookies),
            Outcome::Json { body, cookies } => json_response(&body, &cookies),
            Outcome::Challenge { html } => html_response(html),
        }
    }

    async fn localization_response(
        &self,
        req: Request<Incoming>,
    ) -> Response<BoxBody<Bytes, Infallible>> {
        let (parts, body) = req.into_parts();
        let peer_ip = parts.extensions.get::<PeerAddr>().map(|peer| peer.0.ip());

        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(_) => Bytes::new(),
        };
        let request: LocalizationRequest = match serde_json::from_slice(&bytes) {
            Ok(request) => request,
            Err(error) => {
                tracing::debug!(error = %error, "malformed localization payload");
                return json_response(
                    &serde_json::json!({ "ok": false, "localized": false }),
                    &SessionCookieSet::new(),
                );
            }
        };

        let (response, cookies) = self
            .localization
            .handle(&parts.headers, peer_ip, request)
            .await;
        let body = serde_json::to_value(&response)
            .unwrap_or_else(|_| serde_json::json!({ "ok": false, "localized": false }));
        json_response(&body, &cookies)
    }
}

/// Path remainder after the click prefix, or `None` for unrelated paths.
fn click_suffix(path: &str) -> Option<String> {
    for prefix in CLICK_PREFIXES {
        if let Some(rest) = path.strip_prefix(prefix)
            && (rest.is_empty() || rest.starts_with('/'))
        {
            return Some(rest.trim_start_matches('/').to_string());
        }
    }
    None
}

async fn decode_click(
    suffix: &str,
    req: Request<Incoming>,
) -> Result<ClickRequest, RedirectorError> {
    let (parts, body) = req.into_parts();
    let peer_ip = parts.extensions.get::<PeerAddr>().map(|peer| peer.0.ip());
    let is_post = parts.method == Method::POST;
    let query = parse_query(parts.uri.query());
    let segments: Vec<String> = suffix
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let url = request_url(&parts);

    let bytes = body
        .collect()
        .await
        .map_err(|e| RedirectorError::RequestBodyError(e.to_string()))?
        .to_bytes();
    // A body that is not the expected JSON shape counts as no body; the
    // challenge gate handles the rest.
    let body = if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice::<ClickBody>(&bytes).ok()
    };

    Ok(ClickRequest {
        segments,
        query,
        is_post,
        body,
        headers: parts.headers,
        peer_ip,
        url,
    })
}

/// Query decoded in order of appearance; the first value per key wins so
/// repeated params cannot override each other downstream.
fn parse_query(query: Option<&str>) -> IndexMap<String, String> {
    let mut map = IndexMap::new();
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            map.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
    }
    map
}

/// The absolute URL as the visitor's browser sees it. The service always
/// sits behind TLS termination, so the scheme is fixed.
fn request_url(parts: &http::request::Parts) -> String {
    let host = parts
        .headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("https://{host}{path_and_query}")
}

fn redirect_response(
    location: &str,
    cookies: &SessionCookieSet,
) -> Response<BoxBody<Bytes, Infallible>> {
    let mut response = Response::new(full_body("Redirecting...\n"));
    *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
    let value =
        HeaderValue::from_str(location).unwrap_or_else(|_| HeaderValue::from_static("/"));
    response.headers_mut().insert(LOCATION, value);
    cookies.apply(response.headers_mut());
    response
}

fn json_response(
    body: &JsonValue,
    cookies: &SessionCookieSet,
) -> Response<BoxBody<Bytes, Infallible>> {
    let mut response = Response::new(full_body(body.to_string()));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    cookies.apply(response.headers_mut());
    response
}

fn html_response(html: String) -> Response<BoxBody<Bytes, Infallible>> {
    let mut response = Response::new(full_body(html));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}
