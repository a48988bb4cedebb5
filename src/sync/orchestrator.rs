//! Main coordinator for one import run.
//!
//! The orchestrator resolves the account's service type to a client, picks a
//! fetch strategy, filters raw records through the account's watermark,
//! normalizes what remains, and commits the batch. It owns no policy of its
//! own beyond strategy selection; the interesting behavior lives in the
//! pieces it wires together.

use crate::exchange::{ExchangeError, ManualBatch, RawRecord, ServiceClient, ServiceRegistry};
use crate::ledger::{Account, Classification, ImportSummary, LedgerEntry, Normalized, Normalizer, SkipReason, SourceContext};
use crate::sync::progress::ImportProgressTracker;
use crate::sync::strategies::{
    BatchTradeFetch, FetchConfig, FetchStrategy, ManualBatchFetch, PerMarketTradeFetch,
    WalletRecordFetch,
};
use crate::sync::writer::LedgerWriter;
use crate::sync::{ImportError, WatermarkRepository};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct ImportOrchestrator {
    registry: Arc<ServiceRegistry>,
    normalizer: Arc<Normalizer>,
    writer: Arc<LedgerWriter>,
    watermarks: Arc<dyn WatermarkRepository>,
    fetch_config: FetchConfig,
    /// Optional delay between normalizations, easing pressure on the price
    /// provider when the cache is cold.
    record_pacing: Option<Duration>,
}

impl ImportOrchestrator {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        normalizer: Arc<Normalizer>,
        writer: Arc<LedgerWriter>,
        watermarks: Arc<dyn WatermarkRepository>,
        fetch_config: FetchConfig,
        record_pacing: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            normalizer,
            writer,
            watermarks,
            fetch_config,
            record_pacing,
        }
    }

    /// Run one import for the account's configured service.
    ///
    /// Records at or before the account's watermark are skipped; the
    /// watermark only advances after a successful commit, so an aborted run
    /// leaves the next run to pick up the same records again.
    pub async fn run_import(&self, account: &Account) -> Result<ImportSummary, ImportError> {
        let started_at = Utc::now();
        let watermark = self.watermarks.latest(account.id).await?;
        info!(
            "Starting import for account {} ({}), watermark {}",
            account.name, account.service_type, watermark
        );

        let strategy = self.select_strategy(account)?;
        debug!("Selected strategy {}", strategy.name());

        let ctx = SourceContext {
            owner: &account.owner,
            source: &account.service_type,
            account_peer: account.peer_id(),
            import_mechanism: None,
        };

        self.execute(account, strategy.as_ref(), &ctx, Some(watermark), started_at)
            .await
    }

    /// Import a caller-supplied manual batch for the account.
    ///
    /// Manual rows carry arbitrary historical dates, so the watermark is not
    /// consulted; deduplication in the writer still applies.
    pub async fn run_manual_import(
        &self,
        account: &Account,
        batch: ManualBatch,
    ) -> Result<ImportSummary, ImportError> {
        let started_at = Utc::now();
        let service_type = batch.service_type.clone();
        let import_mechanism = batch.import_mechanism.clone();

        let ctx = SourceContext {
            owner: &account.owner,
            source: &service_type,
            account_peer: account.peer_id(),
            import_mechanism: Some(&import_mechanism),
        };

        let strategy = ManualBatchFetch::new(batch);
        self.execute(account, &strategy, &ctx, None, started_at).await
    }

    fn select_strategy(&self, account: &Account) -> Result<Box<dyn FetchStrategy>, ImportError> {
        Ok(match self.registry.resolve(account)? {
            ServiceClient::Exchange(client) => {
                if client.supports_batch_trades() {
                    Box::new(BatchTradeFetch::new(client))
                } else {
                    Box::new(PerMarketTradeFetch::new(client, self.fetch_config.clone()))
                }
            }
            ServiceClient::Wallet(client) => Box::new(WalletRecordFetch::new(client)),
        })
    }

    async fn execute(
        &self,
        account: &Account,
        strategy: &dyn FetchStrategy,
        ctx: &SourceContext<'_>,
        watermark: Option<DateTime<Utc>>,
        started_at: DateTime<Utc>,
    ) -> Result<ImportSummary, ImportError> {
        let mut progress = ImportProgressTracker::new();

        let records = match strategy.fetch(&mut progress).await {
            Ok(records) => records,
            Err(ImportError::Exchange(ExchangeError::CredentialsRejected(msg))) => {
                return Err(ImportError::CredentialsInvalid(msg));
            }
            Err(err) => return Err(err),
        };

        let entries = self
            .normalize_records(records, ctx, watermark, &mut progress)
            .await;

        let count = self.writer.commit(entries, account, started_at).await?;
        progress.log_summary();

        Ok(ImportSummary {
            count_imported: count,
            run_timestamp: started_at,
        })
    }

    async fn normalize_records(
        &self,
        records: Vec<RawRecord>,
        ctx: &SourceContext<'_>,
        watermark: Option<DateTime<Utc>>,
        progress: &mut ImportProgressTracker,
    ) -> Vec<LedgerEntry> {
        let mut entries = Vec::new();

        for record in &records {
            if let Some(watermark) = watermark {
                if record.timestamp() <= watermark {
                    progress.record_watermark_skip();
                    continue;
                }
            }

            match self.normalizer.normalize(record, ctx).await {
                Normalized::Entry(entry) => {
                    if entry.classification == Classification::Warning {
                        progress.record_warning();
                    }
                    progress.record_normalized();
                    entries.push(*entry);
                }
                Normalized::Skip(SkipReason::Deposit) => {
                    progress.record_deposit_skip();
                }
                Normalized::Skip(SkipReason::Malformed(msg)) => {
                    warn!("Skipping malformed record: {}", msg);
                    progress.record_malformed_skip();
                }
            }

            if let Some(pacing) = self.record_pacing {
                tokio::time::sleep(pacing).await;
            }
        }

        entries
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::pricing::{CacheGranularity, PriceError, PriceResolver, PriceSource};
    use crate::sync::watermark::FileWatermarkRepository;
    use crate::sync::writer::FileLedgerRepository;
    use rust_decimal::Decimal;

    struct NoSource;

    #[async_trait::async_trait]
    impl PriceSource for NoSource {
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

    /// Orchestrator over an empty registry; any run fails service resolution.
    pub(crate) fn unreachable_orchestrator() -> ImportOrchestrator {
        let dir = std::env::temp_dir();
        let ledger = Arc::new(FileLedgerRepository::new(dir.clone()));
        let watermarks = Arc::new(FileWatermarkRepository::new(dir));
        let resolver = Arc::new(PriceResolver::new(
            Box::new(NoSource),
            CacheGranularity::Exact,
        ));

        ImportOrchestrator::new(
            Arc::new(ServiceRegistry::new()),
            Arc::new(Normalizer::new(resolver)),
            Arc::new(LedgerWriter::new(ledger, watermarks.clone())),
            watermarks,
            FetchConfig::default(),
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{ExchangeApi, ManualRecord, RawTrade};
    use crate::pricing::{CacheGranularity, PriceError, PriceResolver, PriceSource};
    use crate::sync::watermark::FileWatermarkRepository;
    use crate::sync::writer::{FileLedgerRepository, LedgerRepository};
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct FixedRate(Decimal);

    #[async_trait::async_trait]
    impl PriceSource for FixedRate {
        async fn historical_rate(
            &self,
            _base: &str,
            _target: &str,
            _at: DateTime<Utc>,
        ) -> Result<Decimal, PriceError> {
            Ok(self.0)
        }
    }

    struct StubExchange {
        trades: Vec<RawTrade>,
    }

    #[async_trait::async_trait]
    impl ExchangeApi for StubExchange {
        fn supports_batch_trades(&self) -> bool {
            true
        }

        fn rate_limit(&self) -> Duration {
            Duration::from_millis(0)
        }

        async fn load_markets(&self) -> Result<Vec<String>, ExchangeError> {
            Ok(vec![])
        }

        async fn fetch_trades(
            &self,
            _market: Option<&str>,
        ) -> Result<Vec<RawTrade>, ExchangeError> {
            Ok(self.trades.clone())
        }
    }

    fn account() -> Account {
        Account {
            id: 7,
            owner: "alice".to_string(),
            name: "kraken main".to_string(),
            service_type: "kraken".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
        }
    }

    fn trade(id: &str, side: &str, ts: DateTime<Utc>) -> RawTrade {
        RawTrade {
            id: id.to_string(),
            symbol: "LTC/BTC".to_string(),
            side: side.to_string(),
            amount: dec!(0.20931215),
            cost: dec!(0.00357691),
            fee: None,
            datetime: ts,
        }
    }

    struct Harness {
        orchestrator: ImportOrchestrator,
        ledger: Arc<FileLedgerRepository>,
        _dir: tempfile::TempDir,
    }

    fn harness(trades: Vec<RawTrade>) -> Harness {
        let dir = tempfile::tempdir().unwrap();

        let mut registry = ServiceRegistry::new();
        registry.register("kraken", move |_account| {
            ServiceClient::Exchange(Arc::new(StubExchange {
                trades: trades.clone(),
            }))
        });

        let resolver = Arc::new(PriceResolver::new(
            Box::new(FixedRate(dec!(2000))),
            CacheGranularity::Exact,
        ));
        let ledger = Arc::new(FileLedgerRepository::new(dir.path().to_path_buf()));
        let watermarks = Arc::new(FileWatermarkRepository::new(dir.path().to_path_buf()));
        let writer = Arc::new(LedgerWriter::new(ledger.clone(), watermarks.clone()));

        Harness {
            orchestrator: ImportOrchestrator::new(
                Arc::new(registry),
                Arc::new(Normalizer::new(resolver)),
                writer,
                watermarks,
                FetchConfig::default(),
                None,
            ),
            ledger,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn imports_trades_with_valuation() {
        let ts = Utc.with_ymd_and_hms(2018, 1, 16, 6, 0, 0).unwrap();
        let h = harness(vec![trade("t1", "sell", ts)]);

        let summary = h.orchestrator.run_import(&account()).await.unwrap();
        assert_eq!(summary.count_imported, 1);

        let stored = h.ledger.list(7).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].spent.currency, "LTC");
        assert_eq!(stored[0].book_price_eur, dec!(418.62430000));
        assert_eq!(stored[0].classification, Classification::Exchange);
    }

    #[tokio::test]
    async fn second_run_imports_nothing() {
        let ts = Utc.with_ymd_and_hms(2018, 1, 16, 6, 0, 0).unwrap();
        let h = harness(vec![trade("t1", "buy", ts), trade("t2", "sell", ts)]);

        let first = h.orchestrator.run_import(&account()).await.unwrap();
        assert_eq!(first.count_imported, 2);

        let second = h.orchestrator.run_import(&account()).await.unwrap();
        assert_eq!(second.count_imported, 0);
        assert_eq!(h.ledger.list(7).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn records_at_watermark_are_excluded_and_newer_included() {
        let boundary = Utc.with_ymd_and_hms(2018, 1, 16, 6, 0, 0).unwrap();
        let h = harness(vec![
            trade("old", "buy", boundary),
            trade("new", "buy", boundary + chrono::Duration::seconds(1)),
        ]);

        // Seed the watermark at exactly the boundary.
        h.orchestrator
            .watermarks
            .record(7, boundary, 0)
            .await
            .unwrap();

        let summary = h.orchestrator.run_import(&account()).await.unwrap();
        assert_eq!(summary.count_imported, 1);

        let stored = h.ledger.list(7).await.unwrap();
        assert_eq!(stored[0].external_id, None);
        assert_eq!(stored[0].timestamp, boundary + chrono::Duration::seconds(1));
    }

    #[tokio::test]
    async fn unknown_service_type_fails() {
        let h = harness(vec![]);
        let mut unknown = account();
        unknown.service_type = "mtgox".to_string();

        let err = h.orchestrator.run_import(&unknown).await.unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedService(_)));
    }

    #[tokio::test]
    async fn manual_batch_skips_deposits_and_labels_entries() {
        let h = harness(vec![]);
        let batch = ManualBatch {
            service_type: "livecoin".to_string(),
            import_mechanism: "csv".to_string(),
            records: vec![
                ManualRecord {
                    transaction_type_raw: "Deposit".to_string(),
                    transaction_type: "transfer".to_string(),
                    date: Utc.with_ymd_and_hms(2017, 6, 1, 12, 0, 0).unwrap(),
                    spent_currency: String::new(),
                    spent_amount: Decimal::ZERO,
                    acquired_currency: "BTC".to_string(),
                    acquired_amount: dec!(0.5),
                    fee_currency: String::new(),
                    fee_amount: Decimal::ZERO,
                    source_peer: 0,
                    target_peer: 0,
                    labels: vec![],
                },
                ManualRecord {
                    transaction_type_raw: "Mining".to_string(),
                    transaction_type: "mining".to_string(),
                    date: Utc.with_ymd_and_hms(2017, 6, 2, 12, 0, 0).unwrap(),
                    spent_currency: String::new(),
                    spent_amount: Decimal::ZERO,
                    acquired_currency: "XMR".to_string(),
                    acquired_amount: dec!(1.5),
                    fee_currency: String::new(),
                    fee_amount: Decimal::ZERO,
                    source_peer: 3,
                    target_peer: 4,
                    labels: vec!["rig".to_string()],
                },
            ],
        };

        let summary = h
            .orchestrator
            .run_manual_import(&account(), batch)
            .await
            .unwrap();
        assert_eq!(summary.count_imported, 1);

        let stored = h.ledger.list(7).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].classification, Classification::Mining);
        assert!(stored[0].labels.contains("livecoin"));
        assert!(stored[0].labels.contains("csv"));
        assert!(stored[0].labels.contains("mining"));
        assert!(stored[0].labels.contains("rig"));
    }
}
