//! Assembles the [`ClientMeta`] forwarded to the tracking backend.

use http::header::{HOST, REFERER, USER_AGENT};
use http::HeaderMap;
use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracker::ClientMeta;

/// Client ip in precedence order: the CDN's header wins, then the standard
/// forwarding chain, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    if let Some(ip) = header_str(headers, "cf-connecting-ip") {
        return ip.to_string();
    }
    if let Some(chain) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = chain.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(ip) = header_str(headers, "x-real-ip") {
        return ip.to_string();
    }
    peer.map(|ip| ip.to_string()).unwrap_or_default()
}

/// Full raw header dump, serialized as `"name: value"` pairs joined with
/// CRLF. Forwarded opaquely for audit; the backend parses it, not us.
pub fn header_dump(headers: &HeaderMap) -> String {
    let mut dump = String::new();
    for (name, value) in headers {
        dump.push_str(name.as_str());
        dump.push_str(": ");
        dump.push_str(value.to_str().unwrap_or(""));
        dump.push_str("\r\n");
    }
    dump
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Builds the full descriptor for one inbound request.
pub fn build_client_meta(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    domain: &str,
    url: &str,
    mtfi: Option<String>,
    created_at: u64,
) -> ClientMeta {
    ClientMeta {
        ip: client_ip(headers, peer),
        user_agent: header_str(headers, USER_AGENT.as_str())
            .unwrap_or_default()
            .to_string(),
        domain: domain.to_string(),
        url: url.to_string(),
        mtfi,
        created_at,
        headers: header_dump(headers),
    }
}

/// The site domain reported upstream: configured value first, then the
/// request's Host header (without port).
pub fn site_domain(configured: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(domain) = configured {
        return domain.to_string();
    }
    header_str(headers, HOST.as_str())
        .map(|host| host.split(':').next().unwrap_or(host).to_string())
        .unwrap_or_default()
}

pub fn referrer(headers: &HeaderMap) -> String {
    header_str(headers, REFERER.as_str())
        .unwrap_or_default()
        .to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_client_ip_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.3"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.5, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, None), "203.0.113.5");

        headers.insert("cf-connecting-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_ip(&headers, None), "198.51.100.2");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let headers = HeaderMap::new();
        let peer: IpAddr = "192.0.2.10".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "192.0.2.10");
        assert_eq!(client_ip(&headers, None), "");
    }

    #[test]
    fn test_header_dump_format() {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("*/*"));
        headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0"));

        let dump = header_dump(&headers);
        assert!(dump.contains("accept: */*\r\n"));
        assert!(dump.contains("user-agent: Mozilla/5.0\r\n"));
    }

    #[test]
    fn test_site_domain_strips_port() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("click.example.com:8443"));
        assert_eq!(site_domain(None, &headers), "click.example.com");
        assert_eq!(site_domain(Some("cfg.example.com"), &headers), "cfg.example.com");
    }
}
