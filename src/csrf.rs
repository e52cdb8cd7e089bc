//! Cross-origin / CSRF guard (spec §4.I): a same-origin policy check
//! shared by the dev and production RPC dispatchers.

use axum::http::{HeaderMap, Method};
use regex::Regex;
use std::collections::HashSet;

/// Configured exemptions from the default same-origin policy (spec §4.I
/// bullet 5).
#[derive(Clone, Debug, Default)]
pub struct CsrfBypass {
    pub path_patterns: Vec<Regex>,
    pub trusted_origins: HashSet<String>,
}

impl CsrfBypass {
    fn exempts(&self, path: &str, origin: Option<&str>) -> bool {
        if self.path_patterns.iter().any(|re| re.is_match(path)) {
            return true;
        }
        if let Some(origin) = origin {
            if self.trusted_origins.contains(origin) {
                return true;
            }
        }
        false
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
}

/// Evaluate the guard's policy (spec §4.I, steps 1-5) for one request.
pub fn check(method: &Method, path: &str, headers: &HeaderMap, bypass: &CsrfBypass) -> Verdict {
    if matches!(method, &Method::GET | &Method::HEAD | &Method::OPTIONS) {
        return Verdict::Allow;
    }

    let origin = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok());

    if bypass.exempts(path, origin) {
        return Verdict::Allow;
    }

    if let Some(sec_fetch_site) = headers.get("sec-fetch-site").and_then(|v| v.to_str().ok()) {
        if !sec_fetch_site.is_empty() {
            return if sec_fetch_site == "same-origin" || sec_fetch_site == "none" {
                Verdict::Allow
            } else {
                Verdict::Deny
            };
        }
    }

    let Some(origin) = origin else {
        return Verdict::Allow;
    };
    if origin.is_empty() {
        return Verdict::Allow;
    }

    let Some(origin_host) = extract_host(origin) else {
        return Verdict::Deny;
    };
    let host_header = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if origin_host == host_header {
        Verdict::Allow
    } else {
        Verdict::Deny
    }
}

/// Extract the `host[:port]` authority from an `Origin` header value.
fn extract_host(origin: &str) -> Option<String> {
    let url = url::Url::parse(origin).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn safe_methods_always_allow() {
        let bypass = CsrfBypass::default();
        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            assert_eq!(
                check(&method, "/api/x", &HeaderMap::new(), &bypass),
                Verdict::Allow
            );
        }
    }

    /// Scenario 5 — CSRF deny.
    #[test]
    fn scenario_5_cross_site_sec_fetch_denies() {
        let bypass = CsrfBypass::default();
        let h = headers(&[("sec-fetch-site", "cross-site")]);
        assert_eq!(
            check(&Method::POST, "/api/__rpc/m/f", &h, &bypass),
            Verdict::Deny
        );
    }

    #[test]
    fn matching_origin_and_host_allows() {
        let bypass = CsrfBypass::default();
        let h = headers(&[("origin", "https://example.com"), ("host", "example.com")]);
        assert_eq!(check(&Method::POST, "/api/x", &h, &bypass), Verdict::Allow);
    }

    #[test]
    fn mismatched_origin_and_host_denies() {
        let bypass = CsrfBypass::default();
        let h = headers(&[("origin", "https://evil.com"), ("host", "example.com")]);
        assert_eq!(check(&Method::POST, "/api/x", &h, &bypass), Verdict::Deny);
    }

    #[test]
    fn missing_origin_allows_as_non_browser() {
        let bypass = CsrfBypass::default();
        let h = headers(&[("host", "example.com")]);
        assert_eq!(check(&Method::POST, "/api/x", &h, &bypass), Verdict::Allow);
    }

    #[test]
    fn bypass_path_regex_allows_otherwise_denied_request() {
        let bypass = CsrfBypass {
            path_patterns: vec![Regex::new(r"^/api/webhooks/").unwrap()],
            trusted_origins: HashSet::new(),
        };
        let h = headers(&[("origin", "https://evil.com"), ("host", "example.com")]);
        assert_eq!(
            check(&Method::POST, "/api/webhooks/stripe", &h, &bypass),
            Verdict::Allow
        );
    }
}
