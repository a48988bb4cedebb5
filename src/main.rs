mod catalog;
mod config;
mod exchange;
mod ledger;
mod pricing;
mod sync;
mod utils;

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::catalog::{FileCoinCatalog, RestCoinListSource};
use crate::config::ImportConfig;
use crate::exchange::ServiceRegistry;
use crate::ledger::{Account, Normalizer};
use crate::pricing::{PriceResolver, RestPriceSource};
use crate::sync::{
	FetchConfig, FileLedgerRepository, FileWatermarkRepository, ImportOrchestrator, LedgerWriter,
	RunDispatcher,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive("ledger_import=debug".parse().unwrap())
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting ledger import service");
	let config = ImportConfig::from_env();

	if let Err(e) = tokio::fs::create_dir_all(&config.data_dir).await {
		error!("Failed to create data directory {:?}: {}", config.data_dir, e);
		return;
	}

	let registry = Arc::new(ServiceRegistry::with_default_services(
		config.wallet_api_url.clone(),
	));
	info!(
		"Registered services: {:?}",
		registry.supported_services()
	);

	let resolver = Arc::new(PriceResolver::new(
		Box::new(RestPriceSource::new(config.price_api_url.clone())),
		config.price_granularity(),
	));
	let normalizer = Arc::new(Normalizer::new(resolver));

	let ledger = Arc::new(FileLedgerRepository::new(config.data_dir.clone()));
	let watermarks = Arc::new(FileWatermarkRepository::new(config.data_dir.clone()));
	let writer = Arc::new(LedgerWriter::new(ledger, watermarks.clone()));

	let orchestrator = ImportOrchestrator::new(
		registry,
		normalizer,
		writer,
		watermarks,
		FetchConfig {
			rate_limit_margin: config.rate_limit_margin(),
		},
		config.record_pacing(),
	);
	let dispatcher = RunDispatcher::new();

	// Keep the coin catalog current before any imports touch it.
	let coin_catalog = FileCoinCatalog::new(config.data_dir.clone());
	let coin_source = RestCoinListSource::new(config.price_api_url.clone());
	match coin_catalog.refresh(&coin_source).await {
		Ok(stats) => info!(
			"Coin catalog: {} added, {} updated",
			stats.added, stats.updated
		),
		Err(e) => warn!("Coin catalog refresh failed, continuing: {}", e),
	}

	let accounts = match load_accounts(&config).await {
		Ok(accounts) => accounts,
		Err(e) => {
			error!("Failed to load accounts: {}", e);
			return;
		}
	};
	info!("Loaded {} accounts", accounts.len());

	for account in &accounts {
		let outcome = dispatcher.run(&orchestrator, account).await;
		info!(
			"Account {} finished with status {}",
			account.name,
			outcome.status_code()
		);
	}
}

/// Accounts live in `{data_dir}/accounts.json` as a plain JSON array.
async fn load_accounts(config: &ImportConfig) -> Result<Vec<Account>, Box<dyn std::error::Error>> {
	let path = config.data_dir.join("accounts.json");
	if !path.exists() {
		warn!("No accounts file at {:?}", path);
		return Ok(Vec::new());
	}

	let content = tokio::fs::read_to_string(&path).await?;
	Ok(serde_json::from_str(&content)?)
}
