use crate::geo::{Geolocator, Location};
use crate::utils::get_header;
use axum::http::HeaderMap;
use serde::Serialize;
use std::net::SocketAddr;

const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";
const REAL_IP_HEADER: &str = "X-Real-IP";
const USER_AGENT_HEADER: &str = "User-Agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Browser {
    Chrome,
    Firefox,
    Safari,
    Edge,
    Unknown,
}

impl Browser {
    /// Checked in order; Chromium user agents also mention Safari.
    const MARKERS: [(&'static str, Browser); 4] = [
        ("chrome", Browser::Chrome),
        ("firefox", Browser::Firefox),
        ("safari", Browser::Safari),
        ("edge", Browser::Edge),
    ];

    pub fn classify(user_agent: &str) -> Self {
        let user_agent = user_agent.to_lowercase();
        Self::MARKERS
            .iter()
            .find(|(marker, _)| user_agent.contains(marker))
            .map(|(_, browser)| *browser)
            .unwrap_or(Browser::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chrome => "Chrome",
            Browser::Firefox => "Firefox",
            Browser::Safari => "Safari",
            Browser::Edge => "Edge",
            Browser::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceType {
    pub fn classify(user_agent: &str) -> Self {
        let user_agent = user_agent.to_lowercase();
        if user_agent.contains("mobile") {
            DeviceType::Mobile
        } else if user_agent.contains("tablet") {
            DeviceType::Tablet
        } else {
            DeviceType::Desktop
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "Mobile",
            DeviceType::Tablet => "Tablet",
            DeviceType::Desktop => "Desktop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub browser: Browser,
    pub device_type: DeviceType,
    pub location: Location,
}

impl Fingerprint {
    pub async fn resolve(
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        geolocator: &Geolocator,
    ) -> Self {
        let ip_address = client_ip(headers, peer);
        let user_agent = get_header(USER_AGENT_HEADER, headers);
        let raw_agent = user_agent.as_deref().unwrap_or_default();
        let location = match &ip_address {
            Some(ip) => geolocator.locate(ip).await,
            None => Location::default(),
        };
        Self {
            browser: Browser::classify(raw_agent),
            device_type: DeviceType::classify(raw_agent),
            ip_address,
            user_agent,
            location,
        }
    }
}

/// Header values are taken as-is and can be spoofed by the client.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = get_header(FORWARDED_FOR_HEADER, headers).and_then(|value| {
        value
            .split(',')
            .next()
            .map(str::trim)
            .filter(|first| !first.is_empty())
            .map(str::to_string)
    });
    forwarded
        .or_else(|| get_header(REAL_IP_HEADER, headers))
        .or_else(|| peer.map(|address| address.ip().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeolocationConfig;
    use axum::http::HeaderValue;
    use std::time::Duration;

    const CHROME_DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1";
    const FIREFOX_LINUX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0";

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        headers
    }

    fn peer() -> Option<SocketAddr> {
        Some(SocketAddr::from(([198, 51, 100, 20], 55_123)))
    }

    #[test]
    fn chrome_wins_over_safari_marker() {
        assert_eq!(Browser::classify(CHROME_DESKTOP), Browser::Chrome);
        assert_eq!(DeviceType::classify(CHROME_DESKTOP), DeviceType::Desktop);
    }

    #[test]
    fn classifies_other_browsers_and_devices() {
        assert_eq!(Browser::classify(SAFARI_IPHONE), Browser::Safari);
        assert_eq!(DeviceType::classify(SAFARI_IPHONE), DeviceType::Mobile);
        assert_eq!(Browser::classify(FIREFOX_LINUX), Browser::Firefox);
        assert_eq!(Browser::classify("Mozilla/5.0 (Windows NT 10.0) Edge/18.19045"), Browser::Edge);
        assert_eq!(DeviceType::classify("SomeReader/1.0 (Tablet; Android 14)"), DeviceType::Tablet);
        assert_eq!(Browser::classify("curl/8.4.0"), Browser::Unknown);
        assert_eq!(Browser::classify(""), Browser::Unknown);
        assert_eq!(DeviceType::classify(""), DeviceType::Desktop);
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let headers = headers(&[
            ("x-forwarded-for", " 203.0.113.9 , 10.0.0.1"),
            ("x-real-ip", "203.0.113.50"),
        ]);
        assert_eq!(client_ip(&headers, peer()).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn blank_forwarded_for_falls_back_to_real_ip() {
        let headers = headers(&[("x-forwarded-for", " , 10.0.0.1"), ("x-real-ip", "203.0.113.50")]);
        assert_eq!(client_ip(&headers, peer()).as_deref(), Some("203.0.113.50"));
    }

    #[test]
    fn peer_address_is_used_without_port() {
        assert_eq!(client_ip(&HeaderMap::new(), peer()).as_deref(), Some("198.51.100.20"));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }

    #[tokio::test]
    async fn resolve_assembles_fields_independently() {
        let geolocator = Geolocator::new(&GeolocationConfig {
            api_key: None,
            endpoint: "http://127.0.0.1:9/ipgeo".into(),
            timeout: Duration::from_millis(50),
        })
        .unwrap();
        let headers = headers(&[("user-agent", CHROME_DESKTOP), ("x-real-ip", "8.8.8.8")]);

        let fingerprint = Fingerprint::resolve(&headers, peer(), &geolocator).await;

        assert_eq!(fingerprint.ip_address.as_deref(), Some("8.8.8.8"));
        assert_eq!(fingerprint.user_agent.as_deref(), Some(CHROME_DESKTOP));
        assert_eq!(fingerprint.browser, Browser::Chrome);
        assert_eq!(fingerprint.device_type, DeviceType::Desktop);
        assert_eq!(fingerprint.location, Location::default());
    }

    #[tokio::test]
    async fn missing_user_agent_still_classifies() {
        let geolocator = Geolocator::new(&GeolocationConfig {
            api_key: Some("secret".into()),
            endpoint: "http://127.0.0.1:9/ipgeo".into(),
            timeout: Duration::from_millis(50),
        })
        .unwrap();

        let fingerprint = Fingerprint::resolve(&HeaderMap::new(), peer(), &geolocator).await;

        assert_eq!(fingerprint.user_agent, None);
        assert_eq!(fingerprint.browser, Browser::Unknown);
        assert_eq!(fingerprint.device_type, DeviceType::Desktop);
        assert_eq!(fingerprint.location, Location::default());
    }
}
