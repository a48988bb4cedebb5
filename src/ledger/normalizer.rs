//! Raw record normalization.
//!
//! The normalizer is the heart of the import pipeline: it turns a raw record
//! of any source shape into a canonical `LedgerEntry`, or signals that the
//! record must be skipped. Classification follows a fixed priority order:
//!
//! 1. A source-stated classification (manual batches) is used verbatim;
//!    unrecognized strings map to `warning`.
//! 2. Otherwise the classification is inferred from the record shape: a
//!    two-sided trade, an off-chain credit, an outbound send.
//! 3. Records whose shape is not recognized at all are still recorded as
//!    `warning` entries so the user can see they need attention.
//! 4. Pure custody deposits are skipped entirely.
//!
//! Valuation failures never abort a record: the entry is persisted with
//! zero-sentinel prices and a `warning` label instead.

use crate::exchange::{
    ManualRecord, NetworkStatus, RawRecord, RawTrade, RawTransfer, WalletResource,
};
use crate::ledger::types::{Classification, LedgerEntry, Money};
use crate::pricing::PriceResolver;
use crate::utils::split_symbol;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// Reference currencies every entry is valued in.
pub const REFERENCE_CRYPTO: &str = "BTC";
pub const REFERENCE_FIAT: &str = "EUR";

/// Why a record produced no ledger entry.
#[derive(Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Pure custody deposit; irrelevant to the ledger.
    Deposit,
    /// The record cannot be minimally parsed.
    Malformed(String),
}

/// Outcome of normalizing one raw record.
#[derive(Debug)]
pub enum Normalized {
    Entry(Box<LedgerEntry>),
    Skip(SkipReason),
}

/// Everything the normalizer needs to know about where a record came from.
pub struct SourceContext<'a> {
    pub owner: &'a str,
    /// Service identifier attached as a label, e.g. `binance`.
    pub source: &'a str,
    /// Peer representing the account both sides of a pure exchange trade.
    pub account_peer: i64,
    /// Set for manual batches, e.g. `csv`.
    pub import_mechanism: Option<&'a str>,
}

/// Transforms raw records into canonical ledger entries.
#[derive(Clone)]
pub struct Normalizer {
    resolver: Arc<PriceResolver>,
}

impl Normalizer {
    pub fn new(resolver: Arc<PriceResolver>) -> Self {
        Self { resolver }
    }

    pub async fn normalize(&self, record: &RawRecord, ctx: &SourceContext<'_>) -> Normalized {
        match record {
            RawRecord::Trade(trade) => self.normalize_trade(trade, ctx).await,
            RawRecord::Transfer(transfer) => self.normalize_transfer(transfer, ctx).await,
            RawRecord::Manual(manual) => self.normalize_manual(manual, ctx).await,
        }
    }

    /// A pure market trade: the symbol pair splits into base/quote on `/`.
    /// side=buy acquires base and spends quote; side=sell is the reverse.
    async fn normalize_trade(&self, trade: &RawTrade, ctx: &SourceContext<'_>) -> Normalized {
        let Some((base, quote)) = split_symbol(&trade.symbol) else {
            return Normalized::Skip(SkipReason::Malformed(format!(
                "unparseable symbol: {:?}",
                trade.symbol
            )));
        };

        let mut entry = self.blank_entry(trade.datetime, ctx);
        entry.source_peer = ctx.account_peer;
        entry.target_peer = ctx.account_peer;
        // Generic exchange trades have no stable external identifier; the
        // watermark filter is the only dedup guard on this path.
        entry.external_id = None;

        match trade.side.as_str() {
            "buy" => {
                entry.acquired = Money::new(base, trade.amount);
                entry.spent = Money::new(quote, trade.cost);
                entry.classification = Classification::Exchange;
            }
            "sell" => {
                entry.spent = Money::new(base, trade.amount);
                entry.acquired = Money::new(quote, trade.cost);
                entry.classification = Classification::Exchange;
            }
            other => {
                warn!("trade {} has unknown side {:?}", trade.id, other);
                entry.classification = Classification::Warning;
            }
        }

        if let Some(fee) = &trade.fee {
            entry.fee = Money::new(&fee.currency, fee.cost);
        }

        self.finish(entry, ctx).await
    }

    /// Wallet-style records: sends, buys, and sells.
    async fn normalize_transfer(
        &self,
        transfer: &RawTransfer,
        ctx: &SourceContext<'_>,
    ) -> Normalized {
        let mut entry = self.blank_entry(transfer.created_at, ctx);
        entry.source_peer = ctx.account_peer;
        entry.target_peer = ctx.account_peer;
        // The wallet path has real native identifiers.
        entry.external_id = Some(transfer.id.clone());

        match &transfer.resource {
            WalletResource::Send => match &transfer.network {
                Some(network) if network.status == NetworkStatus::OffBlockchain => {
                    // Off-chain credit, e.g. a referral bonus: both sides are
                    // the same amount and there is no fee.
                    entry.spent = Money::new(&transfer.amount.currency, transfer.amount.amount);
                    entry.acquired = entry.spent.clone();
                    entry.classification = Classification::Income;
                }
                Some(network) => {
                    // Outbound send: the destination receives the amount net
                    // of the network fee.
                    entry.spent = Money::new(&transfer.amount.currency, transfer.amount.amount);
                    entry.acquired = Money::new(
                        &network.transaction_amount.currency,
                        network.transaction_amount.amount,
                    );
                    entry.fee = Money::new(
                        &network.transaction_fee.currency,
                        network.transaction_fee.amount,
                    );
                    entry.classification = Classification::Transfer;
                }
                None => {
                    warn!("send {} carries no network metadata", transfer.id);
                    entry.classification = Classification::Warning;
                }
            },
            WalletResource::Buy => {
                let Some(total) = &transfer.total else {
                    return Normalized::Skip(SkipReason::Malformed(format!(
                        "buy {} is missing its total",
                        transfer.id
                    )));
                };
                entry.acquired = Money::new(&transfer.amount.currency, transfer.amount.amount);
                entry.spent = Money::new(&total.currency, total.amount);
                entry.classification = Classification::Buy;
                if let Some(fee) = &transfer.fee {
                    entry.fee = Money::new(&fee.currency, fee.amount);
                }
            }
            WalletResource::Sell => {
                let Some(total) = &transfer.total else {
                    return Normalized::Skip(SkipReason::Malformed(format!(
                        "sell {} is missing its total",
                        transfer.id
                    )));
                };
                entry.spent = Money::new(&transfer.amount.currency, transfer.amount.amount);
                entry.acquired = Money::new(&total.currency, total.amount);
                entry.classification = Classification::Sell;
                if let Some(fee) = &transfer.fee {
                    entry.fee = Money::new(&fee.currency, fee.amount);
                }
            }
            WalletResource::Unknown => {
                // Never dropped silently: recorded with defaulted sides so
                // the user can see it needs attention.
                warn!("transfer {} has unrecognized resource type", transfer.id);
                entry.classification = Classification::Warning;
            }
        }

        self.finish(entry, ctx).await
    }

    /// Manual batch rows carry their classification and peers explicitly.
    async fn normalize_manual(
        &self,
        manual: &ManualRecord,
        ctx: &SourceContext<'_>,
    ) -> Normalized {
        if manual.transaction_type_raw == "Deposit" {
            return Normalized::Skip(SkipReason::Deposit);
        }

        let mut entry = self.blank_entry(manual.date, ctx);
        entry.source_peer = manual.source_peer;
        entry.target_peer = manual.target_peer;
        entry.classification = Classification::parse(&manual.transaction_type);

        if manual.spent_amount > Decimal::ZERO && !manual.spent_currency.is_empty() {
            entry.spent = Money::new(&manual.spent_currency, manual.spent_amount);
        }
        if manual.acquired_amount > Decimal::ZERO && !manual.acquired_currency.is_empty() {
            entry.acquired = Money::new(&manual.acquired_currency, manual.acquired_amount);
        }
        if manual.fee_amount > Decimal::ZERO {
            entry.fee = Money::new(&manual.fee_currency, manual.fee_amount);
        }

        for label in &manual.labels {
            entry.add_label(label.clone());
        }

        self.finish(entry, ctx).await
    }

    fn blank_entry(
        &self,
        timestamp: chrono::DateTime<chrono::Utc>,
        ctx: &SourceContext<'_>,
    ) -> LedgerEntry {
        LedgerEntry {
            id: None,
            owner: ctx.owner.to_string(),
            timestamp,
            spent: Money::empty(),
            acquired: Money::empty(),
            source_peer: 0,
            target_peer: 0,
            fee: Money::none(),
            book_price_eur: Decimal::ZERO,
            book_price_btc: Decimal::ZERO,
            book_price_fee_eur: Decimal::ZERO,
            book_price_fee_btc: Decimal::ZERO,
            classification: Classification::Warning,
            labels: BTreeSet::new(),
            source: ctx.source.to_string(),
            external_id: None,
        }
    }

    /// Attach valuation and the standard labels, then seal the entry.
    async fn finish(&self, mut entry: LedgerEntry, ctx: &SourceContext<'_>) -> Normalized {
        // Outside the warning classification, at least one side must carry a
        // currency and a nonzero amount.
        if !entry.has_populated_side() && entry.classification != Classification::Warning {
            warn!(
                "entry classified {} has no populated side, demoting to warning",
                entry.classification.as_str()
            );
            entry.classification = Classification::Warning;
        }

        self.attach_valuation(&mut entry).await;

        entry.add_label(ctx.source.to_string());
        if let Some(mechanism) = ctx.import_mechanism {
            entry.add_label(mechanism.to_string());
        }
        entry.add_label(entry.classification.as_str().to_string());

        Normalized::Entry(Box::new(entry))
    }

    /// Book prices of the populated side in both reference currencies, and
    /// of the fee when one applies. A failed lookup leaves the zero sentinel
    /// in place and adds a `warning` label; it never aborts the record.
    async fn attach_valuation(&self, entry: &mut LedgerEntry) {
        let side = if !entry.spent.is_empty() {
            entry.spent.clone()
        } else {
            entry.acquired.clone()
        };

        let mut degraded = false;

        if !side.is_empty() {
            match self
                .resolver
                .price(side.amount, &side.currency, REFERENCE_CRYPTO, entry.timestamp)
                .await
            {
                Ok(price) => entry.book_price_btc = price.abs(),
                Err(err) => {
                    warn!("valuation failed for {}: {}", side.currency, err);
                    degraded = true;
                }
            }
            match self
                .resolver
                .price(side.amount, &side.currency, REFERENCE_FIAT, entry.timestamp)
                .await
            {
                Ok(price) => entry.book_price_eur = price.abs(),
                Err(err) => {
                    warn!("valuation failed for {}: {}", side.currency, err);
                    degraded = true;
                }
            }
        }

        if entry.fee.amount > Decimal::ZERO {
            match self
                .resolver
                .price(
                    entry.fee.amount,
                    &entry.fee.currency,
                    REFERENCE_CRYPTO,
                    entry.timestamp,
                )
                .await
            {
                Ok(price) => entry.book_price_fee_btc = price.abs(),
                Err(err) => {
                    warn!("fee valuation failed for {}: {}", entry.fee.currency, err);
                    degraded = true;
                }
            }
            match self
                .resolver
                .price(
                    entry.fee.amount,
                    &entry.fee.currency,
                    REFERENCE_FIAT,
                    entry.timestamp,
                )
                .await
            {
                Ok(price) => entry.book_price_fee_eur = price.abs(),
                Err(err) => {
                    warn!("fee valuation failed for {}: {}", entry.fee.currency, err);
                    degraded = true;
                }
            }
        }

        if degraded {
            entry.add_label("warning".to_string());
        }
    }
}
