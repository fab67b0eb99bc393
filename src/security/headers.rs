//! Header manipulation for forwarded traffic.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Drop caller-supplied identity headers before the gateway sets its own
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Gateway-Version and identity headers
//!
//! # Design Decisions
//! - Headers named in `Connection` are hop-by-hop too
//! - X-Forwarded-For appends to an existing chain, it never replaces it

use std::net::IpAddr;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::security::identity::Identity;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_GATEWAY_VERSION: &str = "x-gateway-version";
pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_USER_ID: &str = "x-user-id";
pub const X_USERNAME: &str = "x-username";

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// What the gateway tells the backend about the original request.
#[derive(Debug, Clone)]
pub struct ForwardingContext<'a> {
    pub client_ip: IpAddr,
    pub scheme: &'a str,
    pub gateway_version: &'a str,
    pub request_id: &'a str,
    pub identity: Option<&'a Identity>,
}

/// Rewrite inbound headers into the set sent to the backend.
pub fn prepare_upstream_headers(headers: &mut HeaderMap, ctx: &ForwardingContext<'_>) {
    strip_hop_by_hop(headers);
    headers.remove(header::HOST);
    headers.remove(X_USER_ID);
    headers.remove(X_USERNAME);

    let forwarded_for = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(chain) if !chain.trim().is_empty() => format!("{chain}, {}", ctx.client_ip),
        _ => ctx.client_ip.to_string(),
    };
    set(headers, X_FORWARDED_FOR, &forwarded_for);
    set(headers, X_FORWARDED_PROTO, ctx.scheme);
    set(headers, X_GATEWAY_VERSION, ctx.gateway_version);
    set(headers, X_REQUEST_ID, ctx.request_id);

    if let Some(identity) = ctx.identity {
        set(headers, X_USER_ID, &identity.subject_id);
        set(headers, X_USERNAME, &identity.display_name);
    }
}

fn set(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(HeaderName::from_static(name), v);
        }
        Err(_) => tracing::debug!(header = name, "Skipping header with invalid value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ctx<'a>(identity: Option<&'a Identity>) -> ForwardingContext<'a> {
        ForwardingContext {
            client_ip: "10.1.2.3".parse().unwrap(),
            scheme: "http",
            gateway_version: "1.0.0",
            request_id: "req-1",
            identity,
        }
    }

    #[test]
    fn test_strips_standard_and_connection_listed_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-custom-hop"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-custom-hop", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::ACCEPT));
    }

    #[test]
    fn test_spoofed_identity_headers_are_replaced() {
        let identity = Identity {
            subject_id: "42".into(),
            display_name: "alice".into(),
            expires_at: Utc::now(),
        };
        let mut headers = HeaderMap::new();
        headers.insert(X_USER_ID, HeaderValue::from_static("1"));
        headers.insert(X_USERNAME, HeaderValue::from_static("admin"));
        headers.insert(header::HOST, HeaderValue::from_static("gateway.local"));

        prepare_upstream_headers(&mut headers, &ctx(Some(&identity)));

        assert_eq!(headers[X_USER_ID], "42");
        assert_eq!(headers[X_USERNAME], "alice");
        assert!(!headers.contains_key(header::HOST));
        assert_eq!(headers[X_FORWARDED_FOR], "10.1.2.3");
        assert_eq!(headers[X_FORWARDED_PROTO], "http");
        assert_eq!(headers[X_GATEWAY_VERSION], "1.0.0");
        assert_eq!(headers[X_REQUEST_ID], "req-1");
    }

    #[test]
    fn test_anonymous_request_carries_no_identity() {
        let mut headers = HeaderMap::new();
        headers.insert(X_USER_ID, HeaderValue::from_static("1"));
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.9"));

        prepare_upstream_headers(&mut headers, &ctx(None));

        assert!(!headers.contains_key(X_USER_ID));
        assert_eq!(headers[X_FORWARDED_FOR], "203.0.113.9, 10.1.2.3");
    }
}
