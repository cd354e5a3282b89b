//! Forward geocoding of facility names.
//!
//! A [`Geocoder`] performs one external lookup; the [`GeocodeResolver`] wraps
//! it with name normalization, rate limiting and retry/backoff.

mod nominatim;
mod normalize;
mod resolver;

use async_trait::async_trait;

use crate::error::Result;

pub use nominatim::NominatimClient;
pub use normalize::{strip_noise_token, NOISE_TOKEN};
pub use resolver::{backoff_delay, GeocodeResolver, GeocodeResult, ProgressObserver, RetryPolicy};

/// A single match returned by the external service
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeMatch {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

/// External forward-geocoding service.
///
/// `Ok(None)` is a clean "no match"; `Err` signals a transient failure
/// (network, timeout, service error) that the resolver may retry.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str, country_codes: &str) -> Result<Option<GeocodeMatch>>;

    /// Tag recorded on results produced by this geocoder
    fn source(&self) -> &'static str;
}
