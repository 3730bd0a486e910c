//! Client key derivation from proxy headers and the peer address.

use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Header set by a fronting proxy to the original client address.
pub const X_REAL_IP: &str = "x-real-ip";
/// Comma-separated proxy chain, client first.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
/// Key used when no address can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Determine the rate limit key for a request.
///
/// Precedence: `X-Real-IP`, then the first entry of `X-Forwarded-For`, then
/// the IP of the connection's peer address (port stripped).
pub fn client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    if let Some(ip) = header_str(headers, X_REAL_IP) {
        return ip.to_string();
    }

    if let Some(first) =
        header_str(headers, X_FORWARDED_FOR).and_then(|chain| chain.split(',').next())
    {
        let first = first.trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }

    remote
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_real_ip_takes_precedence() {
        let h = headers(&[(X_REAL_IP, "198.51.100.4"), (X_FORWARDED_FOR, "203.0.113.9")]);
        let remote: SocketAddr = "10.0.0.1:5555".parse().unwrap();
        assert_eq!(client_ip(&h, Some(remote)), "198.51.100.4");
    }

    #[test]
    fn test_forwarded_for_uses_first_entry() {
        let h = headers(&[(X_FORWARDED_FOR, " 203.0.113.9 , 10.1.1.1, 10.2.2.2")]);
        assert_eq!(client_ip(&h, None), "203.0.113.9");
    }

    #[test]
    fn test_falls_back_to_peer_address_without_port() {
        let remote: SocketAddr = "192.0.2.10:41000".parse().unwrap();
        assert_eq!(client_ip(&HeaderMap::new(), Some(remote)), "192.0.2.10");

        let remote_v6: SocketAddr = "[2001:db8::1]:8080".parse().unwrap();
        assert_eq!(client_ip(&HeaderMap::new(), Some(remote_v6)), "2001:db8::1");
    }

    #[test]
    fn test_empty_headers_are_ignored() {
        let h = headers(&[(X_REAL_IP, "  "), (X_FORWARDED_FOR, ", 10.0.0.2")]);
        let remote: SocketAddr = "192.0.2.10:41000".parse().unwrap();
        assert_eq!(client_ip(&h, Some(remote)), "192.0.2.10");
    }

    #[test]
    fn test_unknown_client() {
        assert_eq!(client_ip(&HeaderMap::new(), None), UNKNOWN_CLIENT);
    }
}
