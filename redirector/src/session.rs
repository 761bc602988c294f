//! Session cookie correlation.
//!
//! Three cookies tie a visitor's requests together:
//!
//! - `_mtfi__<key>`: the correlation token issued by the tracking backend,
//!   keyed per campaign (tag + path or slug). One browser holds one such
//!   cookie per distinct campaign it has clicked, never a shared value.
//! - `TARGET`: cached cloak decision (`"true"`/`"false"`). Deliberately
//!   short-lived so the decision is re-evaluated instead of frozen for the
//!   whole session; absence means undecided, not `false`.
//! - `TRACE`: correlation id for joining log lines across requests.
//!
//! Cookies are never actively deleted; they lapse by TTL.

use cookie::{Cookie, SameSite};
use http::HeaderValue;
use http::header::{COOKIE, HeaderMap, SET_COOKIE};

pub const MTFI_COOKIE_PREFIX: &str = "_mtfi__";
pub const TARGET_COOKIE: &str = "TARGET";
pub const TRACE_COOKIE: &str = "TRACE";

pub const MTFI_MAX_AGE_SECS: i64 = 24 * 60 * 60;
pub const TARGET_MAX_AGE_SECS: i64 = 10 * 60;
pub const TRACE_MAX_AGE_SECS: i64 = MTFI_MAX_AGE_SECS;

/// Attributes stamped on every cookie the service issues.
#[derive(Clone, Debug, PartialEq)]
pub struct CookiePolicy {
    pub same_site: SameSite,
    pub secure: bool,
    pub http_only: bool,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            same_site: SameSite::Lax,
            secure: true,
            http_only: true,
        }
    }
}

/// Campaign-scoped cookie name for the mtfi token. The path takes priority
/// over the slug; slashes are flattened to underscores so the name stays a
/// valid cookie token.
pub fn cookie_key(tag: &str, path: Option<&str>, slug: Option<&str>) -> String {
    let path = path.filter(|p| !p.is_empty());
    let slug = slug.filter(|s| !s.is_empty());
    match (path, slug) {
        (Some(path), _) => format!("{MTFI_COOKIE_PREFIX}{tag}__{}", path.replace('/', "_")),
        (None, Some(slug)) => format!("{MTFI_COOKIE_PREFIX}{tag}__{slug}"),
        (None, None) => format!("{MTFI_COOKIE_PREFIX}{tag}"),
    }
}

/// Reads one cookie value out of the request's Cookie header(s).
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| Cookie::split_parse(raw.to_owned()).filter_map(Result::ok))
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}

/// Pending Set-Cookie writes. The orchestrator accumulates these and the
/// transport adapter applies them, keeping the state machine free of
/// response plumbing.
#[derive(Debug, Clone, Default)]
pub struct SessionCookieSet {
    cookies: Vec<Cookie<'static>>,
}

impl SessionCookieSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn set_mtfi(&mut self, policy: &CookiePolicy, key: &str, value: &str) {
        self.push(policy, key.to_string(), value.to_string(), MTFI_MAX_AGE_SECS);
    }

    pub fn set_target(&mut self, policy: &CookiePolicy, value: &str) {
        self.push(
            policy,
            TARGET_COOKIE.to_string(),
            value.to_string(),
            TARGET_MAX_AGE_SECS,
        );
    }

    pub fn set_trace(&mut self, policy: &CookiePolicy, value: &str) {
        self.push(
            policy,
            TRACE_COOKIE.to_string(),
            value.to_string(),
            TRACE_MAX_AGE_SECS,
        );
    }

    fn push(&mut self, policy: &CookiePolicy, name: String, value: String, max_age_secs: i64) {
        let cookie = Cookie::build((name, value))
            .path("/")
            .max_age(cookie::time::Duration::seconds(max_age_secs))
            .same_site(policy.same_site)
            .secure(policy.secure)
            .http_only(policy.http_only)
            .build();
        self.cookies.push(cookie);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie<'static>> {
        self.cookies.iter()
    }

    /// Appends one Set-Cookie header per pending cookie.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for cookie in &self.cookies {
            if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
                headers.append(SET_COOKIE, value);
            }
        }
    }
}
