//!
//! Registry mapping an account's declared service type to a concrete API
//! client. Resolution happens once per import run; unknown keys fail with
//! `UnsupportedService` instead of being dispatched dynamically.

use super::client::{
	ExchangeApi, ExchangeProfile, RestExchangeClient, RestWalletClient, WalletApi,
};
use crate::ledger::Account;
use std::collections::HashMap;
use std::sync::Arc;

/// A resolved client, tagged by the capability set it offers.
pub enum ServiceClient {
	Exchange(Arc<dyn ExchangeApi>),
	Wallet(Arc<dyn WalletApi>),
}

type ClientFactory = Box<dyn Fn(&Account) -> ServiceClient + Send + Sync>;

/// Lookup table from service-type key to client factory.
pub struct ServiceRegistry {
	factories: HashMap<String, ClientFactory>,
}

impl ServiceRegistry {
	pub fn new() -> Self {
		Self {
			factories: HashMap::new(),
		}
	}

	pub fn register(
		&mut self,
		service_type: &str,
		factory: impl Fn(&Account) -> ServiceClient + Send + Sync + 'static,
	) {
		self.factories
			.insert(service_type.to_string(), Box::new(factory));
	}

	/// Resolve the client for an account's declared service type.
	pub fn resolve(&self, account: &Account) -> Result<ServiceClient, UnsupportedService> {
		match self.factories.get(&account.service_type) {
			Some(factory) => Ok(factory(account)),
			None => Err(UnsupportedService(account.service_type.clone())),
		}
	}

	pub fn supported_services(&self) -> Vec<&str> {
		self.factories.keys().map(String::as_str).collect()
	}

	/// Registry with the built-in service set.
	///
	/// Binance and Bitfinex cannot return the whole trade history in one
	/// call and get per-market profiles; Kraken can batch. Coinbase is the
	/// wallet-style source.
	pub fn with_default_services(wallet_base_url: String) -> Self {
		let mut registry = Self::new();

		for (service_type, base_url, can_batch, rate_limit_ms) in [
			("binance", "https://api.binance.com/api/v3", false, 500),
			("bitfinex", "https://api.bitfinex.com/v2", false, 1500),
			("kraken", "https://api.kraken.com/0", true, 1000),
		] {
			registry.register(service_type, move |account| {
				ServiceClient::Exchange(Arc::new(RestExchangeClient::new(
					ExchangeProfile {
						service_type,
						base_url: base_url.to_string(),
						can_batch,
						rate_limit_ms,
					},
					account.api_key.clone(),
					account.api_secret.clone(),
				)))
			});
		}

		registry.register("coinbase", move |account| {
			ServiceClient::Wallet(Arc::new(RestWalletClient::new(
				wallet_base_url.clone(),
				account.api_key.clone(),
				account.api_secret.clone(),
			)))
		});

		registry
	}
}

impl Default for ServiceRegistry {
	fn default() -> Self {
		Self::new()
	}
}

/// No fetcher is registered for the account's declared service type.
#[derive(Debug, thiserror::Error)]
#[error("unsupported service type: {0}")]
pub struct UnsupportedService(pub String);

#[cfg(test)]
mod tests {
	use super::*;

	fn account(service_type: &str) -> Account {
		Account {
			id: 1,
			owner: "alice".to_string(),
			name: "test".to_string(),
			service_type: service_type.to_string(),
			api_key: "key".to_string(),
			api_secret: "secret".to_string(),
		}
	}

	#[test]
	fn resolves_registered_services() {
		let registry =
			ServiceRegistry::with_default_services("https://wallet.example/api".to_string());

		assert!(matches!(
			registry.resolve(&account("kraken")),
			Ok(ServiceClient::Exchange(_))
		));
		assert!(matches!(
			registry.resolve(&account("coinbase")),
			Ok(ServiceClient::Wallet(_))
		));
	}

	#[test]
	fn unknown_service_type_is_rejected() {
		let registry =
			ServiceRegistry::with_default_services("https://wallet.example/api".to_string());
		match registry.resolve(&account("mtgox")) {
			Err(err) => assert_eq!(err.0, "mtgox"),
			Ok(_) => panic!("expected resolution to fail"),
		}
	}
}
