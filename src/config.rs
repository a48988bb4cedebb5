use crate::pricing::CacheGranularity;
use std::path::PathBuf;
use std::time::Duration;

/// Importer configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Directory holding the ledger, watermark, and catalog files
    /// (default: `./data`).
    pub data_dir: PathBuf,
    /// Base URL of the historical price provider.
    pub price_api_url: String,
    /// Base URL of the wallet-style API.
    pub wallet_api_url: String,
    /// Safety margin in seconds added to source-declared rate limits
    /// (default: `2`).
    pub rate_limit_margin_secs: u64,
    /// Delay in milliseconds between record normalizations; `0` disables
    /// pacing (default: `0`).
    pub record_pacing_ms: u64,
    /// Cache price lookups per calendar day instead of per instant
    /// (default: `true`).
    pub day_granularity_prices: bool,
}

impl ImportConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                            |
    /// |--------------------------|------------------------------------|
    /// | `DATA_DIR`               | `./data`                           |
    /// | `PRICE_API_URL`          | `https://min-api.cryptocompare.com`|
    /// | `WALLET_API_URL`         | `https://api.coinbase.com/v2`      |
    /// | `RATE_LIMIT_MARGIN_SECS` | `2`                                |
    /// | `RECORD_PACING_MS`       | `0`                                |
    /// | `DAY_GRANULARITY_PRICES` | `true`                             |
    pub fn from_env() -> Self {
        let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()));

        let price_api_url = std::env::var("PRICE_API_URL")
            .unwrap_or_else(|_| "https://min-api.cryptocompare.com".into());

        let wallet_api_url =
            std::env::var("WALLET_API_URL").unwrap_or_else(|_| "https://api.coinbase.com/v2".into());

        let rate_limit_margin_secs: u64 = std::env::var("RATE_LIMIT_MARGIN_SECS")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .expect("RATE_LIMIT_MARGIN_SECS must be a valid u64");

        let record_pacing_ms: u64 = std::env::var("RECORD_PACING_MS")
            .unwrap_or_else(|_| "0".into())
            .parse()
            .expect("RECORD_PACING_MS must be a valid u64");

        let day_granularity_prices: bool = std::env::var("DAY_GRANULARITY_PRICES")
            .unwrap_or_else(|_| "true".into())
            .parse()
            .expect("DAY_GRANULARITY_PRICES must be true or false");

        Self {
            data_dir,
            price_api_url,
            wallet_api_url,
            rate_limit_margin_secs,
            record_pacing_ms,
            day_granularity_prices,
        }
    }

    pub fn rate_limit_margin(&self) -> Duration {
        Duration::from_secs(self.rate_limit_margin_secs)
    }

    pub fn record_pacing(&self) -> Option<Duration> {
        match self.record_pacing_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn price_granularity(&self) -> CacheGranularity {
        if self.day_granularity_prices {
            CacheGranularity::Day
        } else {
            CacheGranularity::Exact
        }
    }
}
