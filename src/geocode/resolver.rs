//! Retrying, rate-limited name resolution.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use super::{strip_noise_token, GeocodeMatch, Geocoder};
use crate::config::Settings;
use crate::error::Result;
use crate::models::{LocationRecord, ADDRESS_NOT_FOUND};

/// Called with `(processed, total)` after each name in a batch
pub type ProgressObserver = Arc<dyn Fn(usize, usize) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.geocode_max_retries.max(1),
            base_delay: settings.geocode_min_delay(),
        }
    }
}

/// Delay before retry `n` (1-based): `2^(n-1) * base`.
pub fn backoff_delay(retry: u32, base: Duration) -> Duration {
    let exponent = retry.saturating_sub(1).min(16);
    base * (1u32 << exponent)
}

/// Outcome of resolving one name. Absent coordinates mean "not resolved".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeResult {
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub source: &'static str,
}

impl GeocodeResult {
    fn unresolved(name: &str, source: &'static str) -> Self {
        Self {
            name: name.to_string(),
            latitude: None,
            longitude: None,
            address: None,
            source,
        }
    }

    fn resolved(name: &str, source: &'static str, hit: GeocodeMatch) -> Self {
        Self {
            name: name.to_string(),
            latitude: Some(hit.latitude),
            longitude: Some(hit.longitude),
            address: Some(hit.address),
            source,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Spaces successive calls at least `min_interval` apart.
struct RateLimiter {
    min_interval: Duration,
    last_tick: AsyncMutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_tick: AsyncMutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut guard = self.last_tick.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}

/// Resolves names to coordinates through a [`Geocoder`].
///
/// All lookups issued through one resolver share a single rate limiter, so
/// keep one resolver per process.
pub struct GeocodeResolver {
    geocoder: Arc<dyn Geocoder>,
    rate_limiter: RateLimiter,
    policy: RetryPolicy,
    country_codes: String,
}

impl GeocodeResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>, settings: &Settings) -> Self {
        Self::with_policy(
            geocoder,
            settings.geocode_min_delay(),
            RetryPolicy::from_settings(settings),
            &settings.country_codes,
        )
    }

    pub fn with_policy(
        geocoder: Arc<dyn Geocoder>,
        min_delay: Duration,
        policy: RetryPolicy,
        country_codes: &str,
    ) -> Self {
        Self {
            geocoder,
            rate_limiter: RateLimiter::new(min_delay),
            policy,
            country_codes: country_codes.to_string(),
        }
    }

    /// Resolve one name.
    ///
    /// Tries the normalized name, then the original if it differs. Only
    /// lookup errors are retried; a clean "no match" returns at once.
    /// Never fails: exhausted retries yield an unresolved result.
    pub async fn resolve(&self, name: &str) -> GeocodeResult {
        let source = self.geocoder.source();
        let normalized = strip_noise_token(name);
        let max = self.policy.max_retries.max(1);

        for attempt in 1..=max {
            debug!(
                "Geocoding attempt {}/{}: original='{}' normalized='{}'",
                attempt, max, name, normalized
            );

            match self.lookup_with_fallback(name, &normalized).await {
                Ok(Some(hit)) => {
                    let result = GeocodeResult::resolved(name, source, hit);
                    info!(
                        "Geocoded '{}' -> ({:?}, {:?})",
                        name, result.latitude, result.longitude
                    );
                    return result;
                }
                Ok(None) => {
                    warn!("No geocoding result found for '{}'", name);
                    return GeocodeResult::unresolved(name, source);
                }
                Err(err) if attempt < max => {
                    let delay = backoff_delay(attempt, self.policy.base_delay);
                    warn!(
                        "Geocoding error for '{}' (attempt {}): {}; retrying in {:?}",
                        name, attempt, err, delay
                    );
                    sleep(delay).await;
                }
                Err(err) => {
                    error!(
                        "Max retries exceeded for '{}' (attempt {}): {}",
                        name, attempt, err
                    );
                }
            }
        }

        GeocodeResult::unresolved(name, source)
    }

    async fn lookup_with_fallback(
        &self,
        original: &str,
        normalized: &str,
    ) -> Result<Option<GeocodeMatch>> {
        if let Some(hit) = self.lookup(normalized).await? {
            return Ok(Some(hit));
        }
        if normalized != original {
            return self.lookup(original).await;
        }
        Ok(None)
    }

    async fn lookup(&self, query: &str) -> Result<Option<GeocodeMatch>> {
        self.rate_limiter.wait().await;
        self.geocoder.geocode(query, &self.country_codes).await
    }

    /// Resolve every record in order, filling coordinates and address.
    ///
    /// Unresolved records get the "Not found" address placeholder.
    pub async fn resolve_batch(
        &self,
        records: &mut [LocationRecord],
        observer: Option<ProgressObserver>,
    ) -> usize {
        let total = records.len();
        let mut resolved = 0;

        for (i, record) in records.iter_mut().enumerate() {
            let result = self.resolve(&record.name).await;
            if result.is_resolved() {
                resolved += 1;
            }
            record.latitude = result.latitude;
            record.longitude = result.longitude;
            record.address = Some(
                result
                    .address
                    .unwrap_or_else(|| ADDRESS_NOT_FOUND.to_string()),
            );

            if let Some(callback) = &observer {
                callback(i + 1, total);
            }
        }

        info!("Geocoded {}/{} names", resolved, total);
        resolved
    }
}
