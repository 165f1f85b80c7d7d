use std::net::IpAddr;
use std::time::Duration;

use crate::models::analytics::Location;

pub const UNKNOWN: &str = "Unknown";

#[derive(Clone)]
pub struct GeolocationRepository {
    base_url: String,
    client: reqwest::Client,
}

impl GeolocationRepository {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub async fn lookup(&self, ip: IpAddr) -> Result<Location, anyhow::Error> {
        let location = self
            .client
            .get(format!("{}/{}/json", self.base_url, ip))
            .send()
            .await?
            .error_for_status()?
            .json::<Location>()
            .await?;

        Ok(location)
    }

    /// Never fails: lookup errors degrade to the `Unknown` placeholder.
    pub async fn locate(&self, ip: Option<IpAddr>) -> (String, String) {
        let Some(ip) = ip else {
            return (UNKNOWN.to_string(), UNKNOWN.to_string());
        };

        match self.lookup(ip).await {
            Ok(location) => place_names(location),
            Err(e) => {
                log::warn!("Geolocation lookup failed: {}", e);
                (UNKNOWN.to_string(), UNKNOWN.to_string())
            }
        }
    }
}

pub fn place_names(location: Location) -> (String, String) {
    let name = |value: Option<String>| {
        value
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string())
    };

    (name(location.country), name(location.city))
}
