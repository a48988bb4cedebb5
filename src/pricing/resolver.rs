//! Price resolver with a memoizing cache.
//!
//! Every valuation during an import run goes through the `PriceResolver`,
//! which wraps the remote historical price source with a cache keyed by
//! `(base, target, timestamp)`. There is at most one remote lookup per
//! distinct key per run; a duplicate concurrent lookup for the same key is
//! possible and costs one wasted remote call, never correctness.
//!
//! Day-granularity caching trades minor intraday valuation drift for far
//! fewer remote calls, which is what keeps long imports inside third-party
//! rate limits.

use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Errors from price lookups.
#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    /// The source has no rate for this (base, target, timestamp) triple.
    /// The caller decides whether to skip or record a warning entry; the
    /// resolver never coerces to zero.
    #[error("no price available for {base}/{target}")]
    Unavailable { base: String, target: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Collaborator returning the historical unit rate of `base` in `target`.
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    async fn historical_rate(
        &self,
        base: &str,
        target: &str,
        at: DateTime<Utc>,
    ) -> Result<Decimal, PriceError>;
}

/// Precision of the cache key timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheGranularity {
    /// Exact timestamp; safe but one lookup per distinct instant.
    Exact,
    /// Calendar day; risks intraday drift, necessary under tight rate limits.
    Day,
}

type CacheKey = (String, String, i64);

/// Memoizing wrapper over a `PriceSource`.
///
/// The cache is an explicit object owned by the resolver and safe for
/// concurrent use; it lives for the resolver's lifetime, which by default is
/// one import run. Failures are never cached and never retried here.
pub struct PriceResolver {
    source: Box<dyn PriceSource>,
    cache: Mutex<HashMap<CacheKey, Decimal>>,
    granularity: CacheGranularity,
}

impl PriceResolver {
    pub fn new(source: Box<dyn PriceSource>, granularity: CacheGranularity) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
            granularity,
        }
    }

    fn cache_key(&self, base: &str, target: &str, at: DateTime<Utc>) -> CacheKey {
        let ts = match self.granularity {
            CacheGranularity::Exact => at.timestamp(),
            CacheGranularity::Day => at.timestamp() - at.timestamp().rem_euclid(86_400),
        };
        (base.to_string(), target.to_string(), ts)
    }

    /// Value `amount` of `base` in `target` at the given instant.
    pub async fn price(
        &self,
        amount: Decimal,
        base: &str,
        target: &str,
        at: DateTime<Utc>,
    ) -> Result<Decimal, PriceError> {
        let key = self.cache_key(base, target, at);

        if let Some(rate) = self.cache.lock().await.get(&key) {
            return Ok(amount * rate);
        }

        // Lock released during the remote call; a racing lookup for the same
        // key costs one extra request and both insert the same rate.
        let rate = self.source.historical_rate(base, target, at).await?;
        debug!("price {}->{} at {} = {}", base, target, at, rate);

        self.cache.lock().await.insert(key, rate);
        Ok(amount * rate)
    }
}

/// REST-backed price source against a cryptocompare-style endpoint.
///
/// `GET {base_url}/data/pricehistorical?fsym=BTC&tsyms=EUR&ts=...` returns
/// `{"BTC": {"EUR": 2000.0}}`.
pub struct RestPriceSource {
    http_client: Client,
    base_url: String,
}

impl RestPriceSource {
    pub fn new(base_url: String) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            base_url,
        }
    }
}

#[async_trait::async_trait]
impl PriceSource for RestPriceSource {
    async fn historical_rate(
        &self,
        base: &str,
        target: &str,
        at: DateTime<Utc>,
    ) -> Result<Decimal, PriceError> {
        let url = format!("{}/data/pricehistorical", self.base_url);
        let ts = at.timestamp().to_string();

        let response = self
            .http_client
            .get(&url)
            .query(&[("fsym", base), ("tsyms", target), ("ts", &ts)])
            .send()
            .await?;

        let body: serde_json::Value = response.json().await?;

        body.get(base)
            .and_then(|rates| rates.get(target))
            .and_then(|rate| rate.as_f64())
            .and_then(Decimal::from_f64_retain)
            .ok_or_else(|| PriceError::Unavailable {
                base: base.to_string(),
                target: target.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        rate: Decimal,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PriceSource for CountingSource {
        async fn historical_rate(
            &self,
            _base: &str,
            _target: &str,
            _at: DateTime<Utc>,
        ) -> Result<Decimal, PriceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.rate)
        }
    }

    struct EmptySource;

    #[async_trait::async_trait]
    impl PriceSource for EmptySource {
        async fn historical_rate(
            &self,
            base: &str,
            target: &str,
            _at: DateTime<Utc>,
        ) -> Result<Decimal, PriceError> {
            Err(PriceError::Unavailable {
                base: base.to_string(),
                target: target.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn repeated_lookups_hit_the_cache() {
        let at = Utc.with_ymd_and_hms(2018, 1, 16, 6, 0, 0).unwrap();
        let resolver = PriceResolver::new(
            Box::new(CountingSource {
                rate: dec!(2000),
                calls: AtomicUsize::new(0),
            }),
            CacheGranularity::Exact,
        );

        let first = resolver.price(dec!(0.5), "BTC", "EUR", at).await.unwrap();
        let second = resolver.price(dec!(2), "BTC", "EUR", at).await.unwrap();
        assert_eq!(first, dec!(1000));
        assert_eq!(second, dec!(4000));
        assert_eq!(resolver.cache.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn exact_granularity_distinguishes_instants() {
        let resolver = PriceResolver::new(
            Box::new(CountingSource {
                rate: dec!(10),
                calls: AtomicUsize::new(0),
            }),
            CacheGranularity::Exact,
        );

        let morning = Utc.with_ymd_and_hms(2018, 1, 16, 6, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2018, 1, 16, 18, 0, 0).unwrap();

        resolver.price(dec!(1), "LTC", "EUR", morning).await.unwrap();
        resolver.price(dec!(1), "LTC", "EUR", evening).await.unwrap();

        assert_eq!(resolver.cache.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn day_granularity_collapses_intraday_lookups() {
        let resolver = PriceResolver::new(
            Box::new(CountingSource {
                rate: dec!(10),
                calls: AtomicUsize::new(0),
            }),
            CacheGranularity::Day,
        );

        let morning = Utc.with_ymd_and_hms(2018, 1, 16, 6, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2018, 1, 16, 18, 0, 0).unwrap();

        resolver.price(dec!(1), "LTC", "EUR", morning).await.unwrap();
        resolver.price(dec!(1), "LTC", "EUR", evening).await.unwrap();

        assert_eq!(resolver.cache.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn unavailable_rate_propagates() {
        let resolver = PriceResolver::new(Box::new(EmptySource), CacheGranularity::Exact);
        let at = Utc.with_ymd_and_hms(2018, 1, 16, 6, 0, 0).unwrap();

        let err = resolver.price(dec!(1), "OBSCURE", "EUR", at).await;
        assert!(matches!(err, Err(PriceError::Unavailable { .. })));
        // Failures are not cached.
        assert!(resolver.cache.lock().await.is_empty());
    }
}
