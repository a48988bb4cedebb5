//! Canonical ledger entry types.
//!
//! A `LedgerEntry` is one normalized financial event: something was spent on
//! one side and something was acquired on the other, with an optional fee and
//! a valuation of the event in the two reference currencies (BTC and EUR).
//! Direction is encoded purely by which side is populated; all amounts are
//! stored as absolute magnitudes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Sentinel currency code used when no fee applies to an entry.
pub const FEE_NONE_CURRENCY: &str = "---";

/// A currency code plus a non-negative decimal magnitude.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub currency: String,
    pub amount: Decimal,
}

impl Money {
    pub fn new(currency: impl Into<String>, amount: Decimal) -> Self {
        Self {
            currency: currency.into(),
            // Direction is carried by the spent/acquired role, never by sign.
            amount: amount.abs(),
        }
    }

    /// The "no fee" sentinel: currency `---`, amount zero.
    pub fn none() -> Self {
        Self {
            currency: FEE_NONE_CURRENCY.to_string(),
            amount: Decimal::ZERO,
        }
    }

    /// An empty side: no currency, zero amount.
    pub fn empty() -> Self {
        Self {
            currency: String::new(),
            amount: Decimal::ZERO,
        }
    }

    /// True when this side carries neither a currency nor a nonzero amount.
    pub fn is_empty(&self) -> bool {
        self.currency.is_empty() || self.amount.is_zero()
    }
}

/// Closed set of classification tags for a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Exchange,
    Transfer,
    Buy,
    Sell,
    Income,
    Expense,
    Mining,
    Warning,
}

impl Classification {
    /// The stable string form used as a label on every entry.
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Exchange => "exchange",
            Classification::Transfer => "transfer",
            Classification::Buy => "buy",
            Classification::Sell => "sell",
            Classification::Income => "income",
            Classification::Expense => "expense",
            Classification::Mining => "mining",
            Classification::Warning => "warning",
        }
    }

    /// Display icon identifier, fixed 1:1 per classification.
    pub fn icon(&self) -> &'static str {
        match self {
            Classification::Exchange => "swap_horiz",
            Classification::Transfer => "send",
            Classification::Buy => "add_shopping_cart",
            Classification::Sell => "monetization_on",
            Classification::Income => "trending_up",
            Classification::Expense => "trending_down",
            Classification::Mining => "memory",
            Classification::Warning => "warning",
        }
    }

    /// Parse a source-supplied classification string.
    ///
    /// Anything outside the closed set maps to `Warning` so that the record
    /// is still imported and visible to the user.
    pub fn parse(s: &str) -> Self {
        match s {
            "exchange" => Classification::Exchange,
            "transfer" => Classification::Transfer,
            "buy" => Classification::Buy,
            "sell" => Classification::Sell,
            "income" => Classification::Income,
            "expense" => Classification::Expense,
            "mining" => Classification::Mining,
            _ => Classification::Warning,
        }
    }
}

/// A linked exchange account or wallet with API credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    /// Owning user; ownership of imported entries never changes.
    pub owner: String,
    pub name: String,
    /// Service type key resolved through the fetcher registry.
    pub service_type: String,
    pub api_key: String,
    pub api_secret: String,
}

impl Account {
    /// The peer row representing this account on either side of a flow.
    pub fn peer_id(&self) -> i64 {
        self.id
    }
}

/// One normalized financial event in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Assigned by the repository on persist.
    pub id: Option<u64>,
    pub owner: String,
    pub timestamp: DateTime<Utc>,

    pub spent: Money,
    pub acquired: Money,
    pub source_peer: i64,
    pub target_peer: i64,

    pub fee: Money,

    /// Book price of the spent side in EUR at `timestamp`.
    pub book_price_eur: Decimal,
    /// Book price of the spent side in BTC at `timestamp`.
    pub book_price_btc: Decimal,
    pub book_price_fee_eur: Decimal,
    pub book_price_fee_btc: Decimal,

    pub classification: Classification,
    /// Free-form labels; insertion order irrelevant, duplicates collapsed.
    pub labels: BTreeSet<String>,

    /// Which service produced this entry, e.g. `binance` or `coinbase`.
    pub source: String,
    /// Native identifier at the source, when the source has one. Used for
    /// defensive deduplication by the ledger writer.
    pub external_id: Option<String>,
}

impl LedgerEntry {
    /// Display icon identifier derived from the classification.
    pub fn icon(&self) -> &'static str {
        self.classification.icon()
    }

    pub fn add_label(&mut self, label: impl Into<String>) {
        self.labels.insert(label.into());
    }

    /// Entry-level shape invariant: outside the warning classification, at
    /// least one side must carry a currency and a nonzero amount.
    pub fn has_populated_side(&self) -> bool {
        !self.spent.is_empty() || !self.acquired.is_empty()
    }
}

/// Result of one import run, reported back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    pub count_imported: usize,
    pub run_timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn money_stores_absolute_magnitude() {
        let m = Money::new("BTC", dec!(-0.5));
        assert_eq!(m.amount, dec!(0.5));
    }

    #[test]
    fn fee_sentinel_is_empty() {
        let fee = Money::none();
        assert_eq!(fee.currency, FEE_NONE_CURRENCY);
        assert!(fee.amount.is_zero());
    }

    #[test]
    fn classification_icon_table_is_one_to_one() {
        let all = [
            Classification::Exchange,
            Classification::Transfer,
            Classification::Buy,
            Classification::Sell,
            Classification::Income,
            Classification::Expense,
            Classification::Mining,
            Classification::Warning,
        ];
        let mut icons: Vec<&str> = all.iter().map(|c| c.icon()).collect();
        icons.sort();
        icons.dedup();
        assert_eq!(icons.len(), all.len());
    }

    #[test]
    fn classification_roundtrip_and_unknown_to_warning() {
        for s in [
            "exchange", "transfer", "buy", "sell", "income", "expense", "mining", "warning",
        ] {
            assert_eq!(Classification::parse(s).as_str(), s);
        }
        assert_eq!(Classification::parse("staking"), Classification::Warning);
        assert_eq!(Classification::parse(""), Classification::Warning);
    }
}
