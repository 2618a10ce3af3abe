//! Nominatim geocoding with a persistent cache.
//!
//! Lookups go to the [`KvStore`] first. Misses are cached as `null` so a
//! place Nominatim cannot resolve is only asked for once. Remote calls are
//! spaced at least `min_interval` apart.

use std::time::Duration;

use common::errors::{AppError, AppResult};
use common::kv_store::KvStore;
use common::models::location::{Coordinates, NamedLocation, NearestLocation};
use common::utils::geo::nearest_location;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{success_body, transport_error};

const SERVICE: &str = "Nominatim";
pub const DEFAULT_USER_AGENT: &str = "ops-toolbox";
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

/// Geocoder backed by any [`KvStore`].
pub struct CachedGeocoder<K: KvStore> {
    store: K,
    http: reqwest::Client,
    base_url: String,
    user_agent: String,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl<K: KvStore> CachedGeocoder<K> {
    pub fn new(store: K, http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            store,
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            min_interval: DEFAULT_MIN_INTERVAL,
            last_call: Mutex::new(None),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    /// Coordinates for `name`, or `None` when the place is unknown.
    pub async fn coordinates(&self, name: &str) -> AppResult<Option<Coordinates>> {
        if let Some(cached) = self.store.get(name).await? {
            return decode_cached(name, cached);
        }

        tracing::info!(location = name, "Location not in cache, querying Nominatim");
        let found = self.lookup(name).await?;
        if found.is_none() {
            tracing::info!(location = name, "Location not found in Nominatim");
        }

        let value = match found {
            Some(c) => serde_json::to_value(c)?,
            None => Value::Null,
        };
        self.store.put(name, value).await?;
        Ok(found)
    }

    /// Geocodes every name, keeping input order.
    pub async fn locate_all(&self, names: &[String]) -> AppResult<Vec<NamedLocation>> {
        let mut located = Vec::with_capacity(names.len());
        for name in names {
            located.push(NamedLocation::new(name.clone(), self.coordinates(name).await?));
        }
        Ok(located)
    }

    /// Geocodes `origin` and finds the closest of `candidates`.
    pub async fn nearest(
        &self,
        origin: &str,
        candidates: &[String],
    ) -> AppResult<Option<NearestLocation>> {
        let Some(point) = self.coordinates(origin).await? else {
            return Ok(None);
        };
        let located = self.locate_all(candidates).await?;
        Ok(nearest_location(point, &located))
    }

    async fn lookup(&self, name: &str) -> AppResult<Option<Coordinates>> {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }

        let sent = self
            .http
            .get(format!("{}/search", self.base_url))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[("q", name), ("format", "json"), ("limit", "1")])
            .send()
            .await;
        *last_call = Some(Instant::now());

        let response = sent.map_err(|e| transport_error(SERVICE, e))?;
        let body = success_body(SERVICE, response).await?;
        let places: Vec<Place> = serde_json::from_str(&body)?;

        match places.into_iter().next() {
            Some(place) => {
                let parse = |raw: &str| {
                    raw.parse::<f64>().map_err(|_| {
                        AppError::UnexpectedResult(format!("bad coordinate '{}' for {}", raw, name))
                    })
                };
                Ok(Some(Coordinates::new(parse(&place.lat)?, parse(&place.lon)?)))
            }
            None => Ok(None),
        }
    }
}

fn decode_cached(name: &str, cached: Value) -> AppResult<Option<Coordinates>> {
    if cached.is_null() {
        return Ok(None);
    }
    serde_json::from_value(cached)
        .map(Some)
        .map_err(|e| AppError::UnexpectedResult(format!("bad cache entry for {}: {}", name, e)))
}
