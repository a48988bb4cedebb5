//! Coin catalog refresh.
//!
//! The catalog mirrors the price provider's coin list locally so that
//! currency symbols seen during imports can be resolved to display names and
//! images. Refreshing upserts by provider identifier; entries never
//! disappear locally just because the provider dropped them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Errors from the coin catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("storage error: {0}")]
	Storage(String),
}

/// One coin as the price provider lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
	/// The provider's stable identifier, the upsert key.
	pub provider_id: String,
	pub symbol: String,
	pub name: String,
	pub full_name: String,
	pub image_url: Option<String>,
}

/// Counts reported by one catalog refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshStats {
	pub added: usize,
	pub updated: usize,
}

/// Collaborator returning the provider's full coin list.
#[async_trait::async_trait]
pub trait CoinListSource: Send + Sync {
	async fn list_coins(&self) -> Result<Vec<CatalogEntry>, CatalogError>;
}

#[derive(Debug, Deserialize)]
struct ProviderCoin {
	#[serde(rename = "Id")]
	id: String,
	#[serde(rename = "Symbol")]
	symbol: String,
	#[serde(rename = "CoinName")]
	coin_name: String,
	#[serde(rename = "FullName")]
	full_name: String,
	#[serde(rename = "ImageUrl")]
	image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CoinListResponse {
	#[serde(rename = "Data")]
	data: BTreeMap<String, ProviderCoin>,
}

/// REST-backed coin list against a cryptocompare-style endpoint.
pub struct RestCoinListSource {
	http_client: reqwest::Client,
	base_url: String,
}

impl RestCoinListSource {
	pub fn new(base_url: String) -> Self {
		let http_client = reqwest::Client::builder()
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
impl CoinListSource for RestCoinListSource {
	async fn list_coins(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
		let url = format!("{}/data/all/coinlist", self.base_url);
		debug!("GET {}", url);

		let response: CoinListResponse = self
			.http_client
			.get(&url)
			.send()
			.await?
			.error_for_status()?
			.json()
			.await?;

		Ok(response
			.data
			.into_values()
			.map(|coin| CatalogEntry {
				provider_id: coin.id,
				symbol: coin.symbol,
				name: coin.coin_name,
				full_name: coin.full_name,
				image_url: coin.image_url,
			})
			.collect())
	}
}

/// File-backed coin catalog keyed by provider identifier.
pub struct FileCoinCatalog {
	data_dir: PathBuf,
}

impl FileCoinCatalog {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	fn catalog_filename(&self) -> PathBuf {
		self.data_dir.join("coin_catalog.json")
	}

	pub async fn load(&self) -> Result<BTreeMap<String, CatalogEntry>, CatalogError> {
		let filename = self.catalog_filename();
		if !filename.exists() {
			return Ok(BTreeMap::new());
		}

		let content = tokio::fs::read_to_string(&filename)
			.await
			.map_err(|e| CatalogError::Storage(format!("Failed to read catalog file: {}", e)))?;
		Ok(serde_json::from_str(&content)?)
	}

	async fn store(&self, catalog: &BTreeMap<String, CatalogEntry>) -> Result<(), CatalogError> {
		let content = serde_json::to_string_pretty(catalog)?;
		tokio::fs::write(self.catalog_filename(), content)
			.await
			.map_err(|e| CatalogError::Storage(format!("Failed to write catalog file: {}", e)))
	}

	/// Upsert the provider's current coin list into the local catalog.
	pub async fn refresh(&self, source: &dyn CoinListSource) -> Result<RefreshStats, CatalogError> {
		let coins = source.list_coins().await?;
		let mut catalog = self.load().await?;

		let mut stats = RefreshStats {
			added: 0,
			updated: 0,
		};

		for coin in coins {
			match catalog.get(&coin.provider_id) {
				None => {
					catalog.insert(coin.provider_id.clone(), coin);
					stats.added += 1;
				}
				Some(existing) if *existing != coin => {
					catalog.insert(coin.provider_id.clone(), coin);
					stats.updated += 1;
				}
				Some(_) => {}
			}
		}

		self.store(&catalog).await?;
		info!(
			"Coin catalog refreshed: {} added, {} updated, {} total",
			stats.added,
			stats.updated,
			catalog.len()
		);
		Ok(stats)
	}
}
