use crate::exchange::{ExchangeApi, ExchangeError, ManualBatch, RawRecord, WalletApi, WalletResource};
use crate::sync::progress::ImportProgressTracker;
use crate::sync::ImportError;
use std::sync::Arc;
use tracing::{info, warn};

/// Trait for the different raw record fetch strategies
#[async_trait::async_trait]
pub trait FetchStrategy: Send + Sync {
	/// Fetch all raw records for the account, in source-native order.
	///
	/// The caller must not assume chronological order; sorting and watermark
	/// filtering happen downstream.
	async fn fetch(
		&self,
		progress: &mut ImportProgressTracker,
	) -> Result<Vec<RawRecord>, ImportError>;

	/// Get the name of this strategy
	fn name(&self) -> &'static str;
}

/// Configuration for fetch strategies
#[derive(Debug, Clone)]
pub struct FetchConfig {
	/// Safety margin added on top of the source-declared rate limit. Some
	/// exchanges have varying limits and still reject calls paced exactly at
	/// their declared value.
	pub rate_limit_margin: tokio::time::Duration,
}

impl Default for FetchConfig {
	fn default() -> Self {
		Self {
			rate_limit_margin: tokio::time::Duration::from_secs(2),
		}
	}
}

/// Strategy for exchanges that return the whole trade history in one call
pub struct BatchTradeFetch {
	client: Arc<dyn ExchangeApi>,
}

impl BatchTradeFetch {
	pub fn new(client: Arc<dyn ExchangeApi>) -> Self {
		Self { client }
	}
}

#[async_trait::async_trait]
impl FetchStrategy for BatchTradeFetch {
	async fn fetch(
		&self,
		progress: &mut ImportProgressTracker,
	) -> Result<Vec<RawRecord>, ImportError> {
		let trades = self.client.fetch_trades(None).await?;
		progress.record_fetched(trades.len());
		Ok(trades.into_iter().map(RawRecord::Trade).collect())
	}

	fn name(&self) -> &'static str {
		"BatchTradeFetch"
	}
}

/// Strategy for exchanges that must be fetched one trading pair at a time
///
/// Every known market gets its own call. A timed-out market is skipped with
/// a warning rather than failing the run, and a delay of the source-declared
/// rate limit plus the configured margin is inserted between calls.
pub struct PerMarketTradeFetch {
	client: Arc<dyn ExchangeApi>,
	config: FetchConfig,
}

impl PerMarketTradeFetch {
	pub fn new(client: Arc<dyn ExchangeApi>, config: FetchConfig) -> Self {
		Self { client, config }
	}
}

#[async_trait::async_trait]
impl FetchStrategy for PerMarketTradeFetch {
	async fn fetch(
		&self,
		progress: &mut ImportProgressTracker,
	) -> Result<Vec<RawRecord>, ImportError> {
		let markets = self.client.load_markets().await?;
		info!("Fetching trades across {} markets", markets.len());

		let delay = self.client.rate_limit() + self.config.rate_limit_margin;
		let mut records = Vec::new();

		for (idx, market) in markets.iter().enumerate() {
			match self.client.fetch_trades(Some(market)).await {
				Ok(trades) => {
					progress.record_fetched(trades.len());
					records.extend(trades.into_iter().map(RawRecord::Trade));
				}
				Err(ExchangeError::FetchTimeout(msg)) => {
					warn!("Market {} timed out, skipping: {}", market, msg);
					progress.record_page_skip();
				}
				Err(err) => return Err(err.into()),
			}

			if idx + 1 < markets.len() {
				tokio::time::sleep(delay).await;
			}
		}

		Ok(records)
	}

	fn name(&self) -> &'static str {
		"PerMarketTradeFetch"
	}
}

/// Strategy for the wallet-style API with sub-accounts
///
/// Fiat sub-accounts hold no importable history and are skipped. Buys and
/// sells that are not completed (still created, or canceled) are dropped
/// before normalization.
pub struct WalletRecordFetch {
	client: Arc<dyn WalletApi>,
}

impl WalletRecordFetch {
	pub fn new(client: Arc<dyn WalletApi>) -> Self {
		Self { client }
	}
}

#[async_trait::async_trait]
impl FetchStrategy for WalletRecordFetch {
	async fn fetch(
		&self,
		progress: &mut ImportProgressTracker,
	) -> Result<Vec<RawRecord>, ImportError> {
		let sub_accounts = self.client.list_sub_accounts().await?;
		let mut records = Vec::new();

		for sub_account in &sub_accounts {
			if sub_account.kind == "fiat" {
				continue;
			}

			match self.client.list_transfers(&sub_account.id).await {
				Ok(transfers) => {
					let sends: Vec<_> = transfers
						.into_iter()
						.filter(|t| matches!(t.resource, WalletResource::Send))
						.collect();
					progress.record_fetched(sends.len());
					records.extend(sends.into_iter().map(RawRecord::Transfer));
				}
				Err(ExchangeError::FetchTimeout(msg)) => {
					warn!(
						"Transfers for sub-account {} timed out, skipping: {}",
						sub_account.id, msg
					);
					progress.record_page_skip();
				}
				Err(err) => return Err(err.into()),
			}

			match self.client.list_trades(&sub_account.id).await {
				Ok(trades) => {
					let completed: Vec<_> =
						trades.into_iter().filter(|t| t.is_completed()).collect();
					progress.record_fetched(completed.len());
					records.extend(completed.into_iter().map(RawRecord::Transfer));
				}
				Err(ExchangeError::FetchTimeout(msg)) => {
					warn!(
						"Trades for sub-account {} timed out, skipping: {}",
						sub_account.id, msg
					);
					progress.record_page_skip();
				}
				Err(err) => return Err(err.into()),
			}
		}

		Ok(records)
	}

	fn name(&self) -> &'static str {
		"WalletRecordFetch"
	}
}

/// Strategy wrapping a caller-supplied manual batch
///
/// No network calls and no rate limiting; the batch already holds the full
/// record set.
pub struct ManualBatchFetch {
	batch: ManualBatch,
}

impl ManualBatchFetch {
	pub fn new(batch: ManualBatch) -> Self {
		Self { batch }
	}
}

#[async_trait::async_trait]
impl FetchStrategy for ManualBatchFetch {
	async fn fetch(
		&self,
		progress: &mut ImportProgressTracker,
	) -> Result<Vec<RawRecord>, ImportError> {
		progress.record_fetched(self.batch.records.len());
		Ok(self
			.batch
			.records
			.iter()
			.cloned()
			.map(RawRecord::Manual)
			.collect())
	}

	fn name(&self) -> &'static str {
		"ManualBatchFetch"
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::exchange::{RawTrade, RawTransfer, SubAccount, WalletAmount, WalletResource};
	use chrono::{TimeZone, Utc};
	use rust_decimal_macros::dec;
	use std::sync::Mutex;

	struct StubExchange {
		markets: Vec<String>,
		/// One canned response per market, popped in order.
		responses: Mutex<Vec<Result<Vec<RawTrade>, ExchangeError>>>,
	}

	#[async_trait::async_trait]
	impl ExchangeApi for StubExchange {
		fn supports_batch_trades(&self) -> bool {
			false
		}

		fn rate_limit(&self) -> tokio::time::Duration {
			tokio::time::Duration::from_millis(0)
		}

		async fn load_markets(&self) -> Result<Vec<String>, ExchangeError> {
			Ok(self.markets.clone())
		}

		async fn fetch_trades(
			&self,
			_market: Option<&str>,
		) -> Result<Vec<RawTrade>, ExchangeError> {
			self.responses.lock().unwrap().remove(0)
		}
	}

	fn trade(id: &str) -> RawTrade {
		RawTrade {
			id: id.to_string(),
			symbol: "LTC/BTC".to_string(),
			side: "buy".to_string(),
			amount: dec!(1),
			cost: dec!(0.01),
			fee: None,
			datetime: Utc.with_ymd_and_hms(2018, 1, 16, 6, 0, 0).unwrap(),
		}
	}

	#[tokio::test]
	async fn per_market_fetch_skips_timed_out_markets() {
		let strategy = PerMarketTradeFetch::new(
			Arc::new(StubExchange {
				markets: vec!["LTC/BTC".to_string(), "XMR/BTC".to_string()],
				responses: Mutex::new(vec![
					Err(ExchangeError::FetchTimeout("read timeout".to_string())),
					Ok(vec![trade("1"), trade("2")]),
				]),
			}),
			FetchConfig {
				rate_limit_margin: tokio::time::Duration::from_millis(0),
			},
		);

		let mut progress = ImportProgressTracker::new();
		let records = strategy.fetch(&mut progress).await.unwrap();

		assert_eq!(records.len(), 2);
		assert_eq!(progress.stats().pages_skipped, 1);
	}

	#[tokio::test]
	async fn per_market_fetch_aborts_on_credential_rejection() {
		let strategy = PerMarketTradeFetch::new(
			Arc::new(StubExchange {
				markets: vec!["LTC/BTC".to_string()],
				responses: Mutex::new(vec![Err(ExchangeError::CredentialsRejected(
					"bad key".to_string(),
				))]),
			}),
			FetchConfig::default(),
		);

		let mut progress = ImportProgressTracker::new();
		let err = strategy.fetch(&mut progress).await.unwrap_err();
		assert!(matches!(
			err,
			ImportError::Exchange(ExchangeError::CredentialsRejected(_))
		));
	}

	struct StubWallet;

	#[async_trait::async_trait]
	impl WalletApi for StubWallet {
		async fn list_sub_accounts(&self) -> Result<Vec<SubAccount>, ExchangeError> {
			Ok(vec![
				SubAccount {
					id: "fiat-1".to_string(),
					name: "EUR Wallet".to_string(),
					kind: "fiat".to_string(),
				},
				SubAccount {
					id: "btc-1".to_string(),
					name: "BTC Wallet".to_string(),
					kind: "wallet".to_string(),
				},
			])
		}

		async fn list_transfers(
			&self,
			sub_account: &str,
		) -> Result<Vec<RawTransfer>, ExchangeError> {
			assert_eq!(sub_account, "btc-1");
			Ok(vec![transfer("send-1", WalletResource::Send, "completed")])
		}

		async fn list_trades(
			&self,
			sub_account: &str,
		) -> Result<Vec<RawTransfer>, ExchangeError> {
			assert_eq!(sub_account, "btc-1");
			Ok(vec![
				transfer("buy-1", WalletResource::Buy, "completed"),
				transfer("buy-2", WalletResource::Buy, "canceled"),
			])
		}
	}

	fn transfer(id: &str, resource: WalletResource, status: &str) -> RawTransfer {
		RawTransfer {
			id: id.to_string(),
			resource,
			status: status.to_string(),
			created_at: Utc.with_ymd_and_hms(2018, 1, 16, 6, 0, 0).unwrap(),
			amount: WalletAmount {
				amount: dec!(1),
				currency: "BTC".to_string(),
			},
			total: Some(WalletAmount {
				amount: dec!(100),
				currency: "EUR".to_string(),
			}),
			fee: None,
			network: None,
		}
	}

	#[tokio::test]
	async fn wallet_fetch_skips_fiat_sub_accounts_and_incomplete_trades() {
		let strategy = WalletRecordFetch::new(Arc::new(StubWallet));
		let mut progress = ImportProgressTracker::new();

		let records = strategy.fetch(&mut progress).await.unwrap();

		// One send plus one completed buy; the canceled buy and the fiat
		// sub-account contribute nothing.
		assert_eq!(records.len(), 2);
	}
}
