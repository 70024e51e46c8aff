use crate::config::GeolocationConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub country: Option<String>,
    pub city: Option<String>,
}

#[derive(Deserialize)]
struct GeolocationResponse {
    #[serde(default)]
    country_name: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

pub struct Geolocator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl Geolocator {
    pub fn new(config: &GeolocationConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Never fails: errors and timeouts are logged and yield an empty location.
    pub async fn locate(&self, ip: &str) -> Location {
        let Some(api_key) = self.api_key.as_deref() else {
            return Location::default();
        };
        match ip.parse::<IpAddr>() {
            Ok(address) if !is_private_ip(&address) => {}
            _ => {
                tracing::debug!("Skipping geolocation for non-public address {}", ip);
                return Location::default();
            }
        }
        match self.fetch(api_key, ip).await {
            Ok(location) => location,
            Err(err) => {
                tracing::warn!("Geolocation lookup for {} failed: {}", ip, err);
                Location::default()
            }
        }
    }

    async fn fetch(&self, api_key: &str, ip: &str) -> Result<Location, reqwest::Error> {
        let response: GeolocationResponse = self
            .client
            .get(&self.endpoint)
            .query(&[("apiKey", api_key), ("ip", ip)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(Location {
            country: non_empty(response.country_name),
            city: non_empty(response.city),
        })
    }
}

/// 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16 and 127.0.0.0/8, including their IPv4-mapped forms.
pub fn is_private_ip(address: &IpAddr) -> bool {
    match address {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped().is_some_and(|v4| is_private_v4(&v4)),
    }
}

fn is_private_v4(address: &Ipv4Addr) -> bool {
    address.is_private() || address.is_loopback()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
