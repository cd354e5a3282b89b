//! Nominatim search API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{GeocodeMatch, Geocoder};
use crate::config::Settings;
use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    display_name: String,
}

/// Looks names up against a Nominatim instance (`/search`)
pub struct NominatimClient {
    client: Client,
    base_url: String,
}

impl NominatimClient {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(&settings.nominatim_url, &settings.nominatim_user_agent)
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn geocode(&self, query: &str, country_codes: &str) -> Result<Option<GeocodeMatch>> {
        let url = format!("{}/search", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("format", "jsonv2"),
                ("limit", "1"),
                ("countrycodes", country_codes),
            ])
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transient(format!(
                "Nominatim returned {}: {}",
                status, body
            )));
        }

        let hits: Vec<SearchHit> = response
            .json()
            .await
            .map_err(|e| Error::Transient(format!("unreadable Nominatim response: {}", e)))?;

        let Some(hit) = hits.into_iter().next() else {
            debug!("Nominatim: no match for '{}'", query);
            return Ok(None);
        };

        let latitude = hit
            .lat
            .parse::<f64>()
            .map_err(|e| Error::Transient(format!("bad latitude '{}': {}", hit.lat, e)))?;
        let longitude = hit
            .lon
            .parse::<f64>()
            .map_err(|e| Error::Transient(format!("bad longitude '{}': {}", hit.lon, e)))?;

        Ok(Some(GeocodeMatch {
            latitude,
            longitude,
            address: hit.display_name,
        }))
    }

    fn source(&self) -> &'static str {
        "nominatim"
    }
}
