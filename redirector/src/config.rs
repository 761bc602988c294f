use crate::session::CookiePolicy;
use cookie::SameSite;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Tracker timeout cannot be 0")]
    InvalidTimeout,

    #[error("Tracker base URL must use http or https")]
    InvalidBaseUrl,
}

/// Redirector configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for incoming clicks
    pub listener: Listener,
    /// Admin listener for health/readiness
    pub admin_listener: Listener,
    /// Upstream tracking backend
    pub tracker: TrackerConfig,
    /// Session cookie attributes
    #[serde(default)]
    pub cookies: CookieConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.tracker.validate()?;
        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Upstream tracking backend configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TrackerConfig {
    /// Base URL shared by the tracking and notification endpoints
    ///
    /// Note: Uses the `url::Url` type so invalid URLs are rejected during
    /// config deserialization.
    pub api_base_url: Url,
    /// Site domain reported upstream; the Host header is used when absent
    pub domain: Option<String>,
    /// Per-attempt time box for tracker calls
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    3000
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        if !matches!(self.api_base_url.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidBaseUrl);
        }
        Ok(())
    }
}

/// SameSite values accepted in config
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    Strict,
    Lax,
    None,
}

/// Attributes applied to every session cookie the service issues
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CookieConfig {
    #[serde(default = "default_same_site")]
    pub same_site: SameSitePolicy,
    #[serde(default = "default_flag_on")]
    pub secure: bool,
    #[serde(default = "default_flag_on")]
    pub http_only: bool,
}

fn default_same_site() -> SameSitePolicy {
    SameSitePolicy::Lax
}

fn default_flag_on() -> bool {
    true
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            same_site: default_same_site(),
            secure: true,
            http_only: true,
        }
    }
}

impl CookieConfig {
    pub fn policy(&self) -> CookiePolicy {
        CookiePolicy {
            same_site: match self.same_site {
                SameSitePolicy::Strict => SameSite::Strict,
                SameSitePolicy::Lax => SameSite::Lax,
                SameSitePolicy::None => SameSite::None,
            },
            secure: self.secure,
            http_only: self.http_only,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
listener:
    host: "0.0.0.0"
    port: 3000
admin_listener:
    host: "127.0.0.1"
    port: 3001
tracker:
    api_base_url: "https://backend.internal"
    domain: "click.example.com"
cookies:
    same_site: lax
    secure: true
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.listener.port, 3000);
        assert_eq!(config.tracker.domain.as_deref(), Some("click.example.com"));
        // Defaults fill unlisted fields.
        assert_eq!(config.tracker.timeout_ms, 3000);
        assert!(config.cookies.http_only);
    }

    #[test]
    fn test_cookie_config_defaults_when_absent() {
        let yaml = r#"
listener: {host: "0.0.0.0", port: 3000}
admin_listener: {host: "127.0.0.1", port: 3001}
tracker: {api_base_url: "https://backend.internal"}
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.cookies, CookieConfig::default());
        assert_eq!(config.cookies.policy().same_site, SameSite::Lax);
    }

    #[test]
    fn test_validation_errors() {
        let yaml = r#"
listener: {host: "0.0.0.0", port: 3000}
admin_listener: {host: "127.0.0.1", port: 3001}
tracker: {api_base_url: "https://backend.internal"}
"#;
        let base_config: Config = serde_yaml::from_str(yaml).unwrap();

        let mut config = base_config.clone();
        config.listener.port = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::InvalidPort
        ));

        let mut config = base_config.clone();
        config.tracker.timeout_ms = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::InvalidTimeout
        ));

        let mut config = base_config;
        config.tracker.api_base_url = Url::parse("ftp://backend.internal").unwrap();
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::InvalidBaseUrl
        ));
    }

    #[test]
    fn test_deserialization_errors() {
        // Invalid URL
        assert!(
            serde_yaml::from_str::<Config>(
                r#"
listener: {host: "0.0.0.0", port: 3000}
admin_listener: {host: "127.0.0.1", port: 3001}
tracker: {api_base_url: "not-a-url"}
"#
            )
            .is_err()
        );

        // Invalid SameSite value
        assert!(serde_yaml::from_str::<SameSitePolicy>("sometimes").is_err());

        // Missing required section
        assert!(
            serde_yaml::from_str::<Config>(
                r#"
listener: {host: "0.0.0.0", port: 3000}
"#
            )
            .is_err()
        );
    }
}
