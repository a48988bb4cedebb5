//!
//! REST clients for the exchange trading API and the wallet-style API.
//!
//! Both clients are thin request/response wrappers: they authenticate with
//! the account's API key pair, translate HTTP failures into the error
//! taxonomy the pipeline understands, and deserialize raw records. They
//! never touch the database; all writes happen downstream.

use super::types::*;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Capability interface over an exchange trading API.
///
/// Implementations are either batch-capable (one call returns the whole
/// trade history) or per-market (the caller enumerates markets and issues
/// one call per pair, respecting `rate_limit`).
#[async_trait]
pub trait ExchangeApi: Send + Sync {
	/// Whether the whole trade history can be fetched in one call.
	fn supports_batch_trades(&self) -> bool;

	/// Source-declared minimum delay between successive calls.
	fn rate_limit(&self) -> Duration;

	/// Enumerate the trading pairs known to this exchange.
	async fn load_markets(&self) -> Result<Vec<String>, ExchangeError>;

	/// Fetch trades; `market` is required for per-market exchanges and
	/// ignored by batch-capable ones.
	async fn fetch_trades(&self, market: Option<&str>) -> Result<Vec<RawTrade>, ExchangeError>;
}

/// Capability interface over a wallet-style API with sub-accounts.
#[async_trait]
pub trait WalletApi: Send + Sync {
	async fn list_sub_accounts(&self) -> Result<Vec<SubAccount>, ExchangeError>;

	/// All send-type transfers of one sub-account, across every page.
	async fn list_transfers(&self, sub_account: &str) -> Result<Vec<RawTransfer>, ExchangeError>;

	/// All buys and sells of one sub-account, across every page.
	async fn list_trades(&self, sub_account: &str) -> Result<Vec<RawTransfer>, ExchangeError>;
}

/// Static description of a supported exchange service.
#[derive(Debug, Clone)]
pub struct ExchangeProfile {
	pub service_type: &'static str,
	pub base_url: String,
	pub can_batch: bool,
	/// Declared rate limit in milliseconds.
	pub rate_limit_ms: u64,
}

/// REST-backed exchange trading API client.
pub struct RestExchangeClient {
	http_client: Client,
	profile: ExchangeProfile,
	api_key: String,
	api_secret: String,
}

impl RestExchangeClient {
	pub fn new(profile: ExchangeProfile, api_key: String, api_secret: String) -> Self {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(30))
			.build()
			.expect("Failed to create HTTP client");

		Self {
			http_client,
			profile,
			api_key,
			api_secret,
		}
	}

	async fn execute_get<T: DeserializeOwned>(
		&self,
		path: &str,
		query: &[(&str, &str)],
	) -> Result<T, ExchangeError> {
		let url = format!("{}{}", self.profile.base_url, path);
		debug!("GET {} {:?}", url, query);

		let response = self
			.http_client
			.get(&url)
			.header("X-API-KEY", &self.api_key)
			.header("X-API-SECRET", &self.api_secret)
			.query(query)
			.send()
			.await
			.map_err(map_send_error)?;

		match response.status() {
			StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
				return Err(ExchangeError::CredentialsRejected(format!(
					"{} rejected API key",
					self.profile.service_type
				)));
			}
			status if !status.is_success() => {
				return Err(ExchangeError::Api(format!("HTTP error: {}", status)));
			}
			_ => {}
		}

		Ok(response.json::<T>().await?)
	}
}

#[async_trait]
impl ExchangeApi for RestExchangeClient {
	fn supports_batch_trades(&self) -> bool {
		self.profile.can_batch
	}

	fn rate_limit(&self) -> Duration {
		Duration::from_millis(self.profile.rate_limit_ms)
	}

	async fn load_markets(&self) -> Result<Vec<String>, ExchangeError> {
		self.execute_get("/markets", &[]).await
	}

	async fn fetch_trades(&self, market: Option<&str>) -> Result<Vec<RawTrade>, ExchangeError> {
		match market {
			Some(symbol) => self.execute_get("/trades", &[("symbol", symbol)]).await,
			None => self.execute_get("/trades", &[]).await,
		}
	}
}

/// REST-backed wallet API client with cursor pagination.
pub struct RestWalletClient {
	http_client: Client,
	base_url: String,
	api_key: String,
	api_secret: String,
}

/// One page of wallet records plus the cursor for the next page.
#[derive(Debug, serde::Deserialize)]
struct WalletPage<T> {
	data: Vec<T>,
	#[serde(default)]
	next_cursor: Option<String>,
}

impl RestWalletClient {
	pub fn new(base_url: String, api_key: String, api_secret: String) -> Self {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(30))
			.build()
			.expect("Failed to create HTTP client");

		Self {
			http_client,
			base_url,
			api_key,
			api_secret,
		}
	}

	async fn get_page<T: DeserializeOwned>(
		&self,
		path: &str,
		cursor: Option<&str>,
	) -> Result<WalletPage<T>, ExchangeError> {
		let url = format!("{}{}", self.base_url, path);
		debug!("GET {} cursor={:?}", url, cursor);

		let mut request = self
			.http_client
			.get(&url)
			.header("X-API-KEY", &self.api_key)
			.header("X-API-SECRET", &self.api_secret);
		if let Some(cursor) = cursor {
			request = request.query(&[("starting_after", cursor)]);
		}

		let response = request.send().await.map_err(map_send_error)?;

		match response.status() {
			StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
				return Err(ExchangeError::CredentialsRejected(
					"wallet API rejected API key".to_string(),
				));
			}
			status if !status.is_success() => {
				return Err(ExchangeError::Api(format!("HTTP error: {}", status)));
			}
			_ => {}
		}

		Ok(response.json::<WalletPage<T>>().await?)
	}

	/// Walk every page of a collection, following `starting_after` cursors
	/// in source-native order.
	async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ExchangeError> {
		let mut items = Vec::new();
		let mut cursor: Option<String> = None;

		loop {
			let page = self.get_page::<T>(path, cursor.as_deref()).await?;
			items.extend(page.data);
			match page.next_cursor {
				Some(next) => cursor = Some(next),
				None => break,
			}
		}

		Ok(items)
	}
}

#[async_trait]
impl WalletApi for RestWalletClient {
	async fn list_sub_accounts(&self) -> Result<Vec<SubAccount>, ExchangeError> {
		self.get_all("/accounts").await
	}

	async fn list_transfers(&self, sub_account: &str) -> Result<Vec<RawTransfer>, ExchangeError> {
		self.get_all(&format!("/accounts/{}/transactions", sub_account))
			.await
	}

	async fn list_trades(&self, sub_account: &str) -> Result<Vec<RawTransfer>, ExchangeError> {
		// The transfers listing omits fee data for buys and sells, so those
		// come from the dedicated endpoints.
		let mut trades: Vec<RawTransfer> = self
			.get_all(&format!("/accounts/{}/buys", sub_account))
			.await?;
		let sells: Vec<RawTransfer> = self
			.get_all(&format!("/accounts/{}/sells", sub_account))
			.await?;
		trades.extend(sells);
		Ok(trades)
	}
}

fn map_send_error(err: reqwest::Error) -> ExchangeError {
	if err.is_timeout() {
		ExchangeError::FetchTimeout(err.to_string())
	} else {
		ExchangeError::Http(err)
	}
}
