use chrono::{DateTime, Utc};
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::common::constants::{AMP_LINKER_PARAM, TRACKER_COOKIE_PREFIX};
use crate::common::encoding::decode_base64_text;
use crate::pipeline::ingestion::request::RequestHeaders;

/// Per-request facts that every event of a batch shares.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMeta {
    pub client_ip: Ipv4Addr,
    pub user_agent: Option<String>,
    pub has_cookie_header: bool,
    /// Device id from the first-party tracker cookie, if any.
    pub cookie_device_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl RequestMeta {
    pub fn from_headers(headers: &RequestHeaders, received_at: DateTime<Utc>) -> Self {
        let cookie = headers.cookie.as_deref().filter(|c| !c.trim().is_empty());
        Self {
            client_ip: headers.client_ip.as_deref().map(to_ipv4).unwrap_or(Ipv4Addr::UNSPECIFIED),
            user_agent: headers.user_agent.clone(),
            has_cookie_header: cookie.is_some(),
            cookie_device_id: cookie.and_then(tracker_cookie_device_id),
            received_at,
        }
    }
}

/// Picks the client address: first `X-Forwarded-For` hop, then `X-Real-IP`,
/// then the socket peer.
pub fn client_ip(forwarded_for: Option<&str>, real_ip: Option<&str>, peer: Option<IpAddr>) -> Option<String> {
    forwarded_for
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| real_ip.map(str::trim).filter(|ip| !ip.is_empty()))
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
}

/// Converts an address to IPv4. IPv4-mapped IPv6 addresses are unwrapped,
/// anything else becomes `0.0.0.0`.
pub fn to_ipv4(raw: &str) -> Ipv4Addr {
    match raw.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip,
        Ok(IpAddr::V6(ip)) => ip.to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED),
        Err(_) => {
            debug!("Unparsable client address '{}'", raw);
            Ipv4Addr::UNSPECIFIED
        }
    }
}

/// Device id from an `_sp_id.*` cookie (`duid.created.vid.now.last.sid`).
/// Truncated cookie values are ignored.
pub fn tracker_cookie_device_id(cookie_header: &str) -> Option<String> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(name, _)| name.trim().starts_with(TRACKER_COOKIE_PREFIX))
        .find_map(|(_, value)| {
            let parts: Vec<&str> = value.trim().trim_matches('"').split('.').collect();
            if parts.len() >= 6 && !parts[0].is_empty() {
                Some(parts[0].to_string())
            } else {
                debug!("Ignoring truncated tracker cookie");
                None
            }
        })
}

/// Device id forwarded by AMP pages as `sp_amp_linker=a*b*c*<base64 id>` in
/// the page URL's query string.
pub fn amp_linker_device_id(page_url: &str) -> Option<String> {
    let (_, query) = page_url.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();
    let (_, linker) = form_urlencoded::parse(query.as_bytes()).find(|(k, _)| k == AMP_LINKER_PARAM)?;

    let parts: Vec<&str> = linker.split('*').collect();
    if parts.len() != 4 {
        warn!("Malformed AMP linker '{}'", linker);
        return None;
    }
    let device_id = decode_base64_text(parts[3]);
    if device_id.is_none() {
        warn!("AMP linker device id is not valid base64");
    }
    device_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_conversion() {
        assert_eq!(to_ipv4("203.0.113.7"), Ipv4Addr::new(203, 0, 113, 7));
        assert_eq!(to_ipv4("::ffff:198.51.100.2"), Ipv4Addr::new(198, 51, 100, 2));
        assert_eq!(to_ipv4("2001:db8::1"), Ipv4Addr::UNSPECIFIED);
        assert_eq!(to_ipv4("garbage"), Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn test_client_ip_precedence() {
        let peer: Option<IpAddr> = "10.0.0.1".parse().ok();
        assert_eq!(
            client_ip(Some("203.0.113.7, 10.0.0.2"), Some("198.51.100.9"), peer).as_deref(),
            Some("203.0.113.7")
        );
        assert_eq!(client_ip(None, Some("198.51.100.9"), peer).as_deref(), Some("198.51.100.9"));
        assert_eq!(client_ip(Some(" "), None, peer).as_deref(), Some("10.0.0.1"));
        assert_eq!(client_ip(None, None, None), None);
    }

    #[test]
    fn test_tracker_cookie() {
        let header = "theme=dark; _sp_id.1fff=5c3c1c8f-22a4-4c0e-9b1d-6f4a4a3b1b8e.1700000000.3.1700000500.1699990000.d0b5b2b0-7c43-4d5a-a3a2-2b5b0b1b2c3d";
        assert_eq!(
            tracker_cookie_device_id(header).as_deref(),
            Some("5c3c1c8f-22a4-4c0e-9b1d-6f4a4a3b1b8e")
        );
        assert_eq!(tracker_cookie_device_id("_sp_id.123=abc.def"), None);
        assert_eq!(tracker_cookie_device_id("session=1"), None);
    }

    #[test]
    fn test_amp_linker() {
        // base64("amp-device-1")
        let url = "https://example.com/article?sp_amp_linker=1*1abc*cid*YW1wLWRldmljZS0x#top";
        assert_eq!(amp_linker_device_id(url).as_deref(), Some("amp-device-1"));
        assert_eq!(amp_linker_device_id("https://example.com/?sp_amp_linker=bad"), None);
        assert_eq!(amp_linker_device_id("https://example.com/"), None);
    }

    #[test]
    fn test_meta_from_headers() {
        let headers = RequestHeaders {
            client_ip: Some("::ffff:192.0.2.1".to_string()),
            cookie: Some("a=b".to_string()),
            ..RequestHeaders::default()
        };
        let meta = RequestMeta::from_headers(&headers, Utc::now());
        assert_eq!(meta.client_ip, Ipv4Addr::new(192, 0, 2, 1));
        assert!(meta.has_cookie_header);
        assert_eq!(meta.cookie_device_id, None);
    }
}
