//! Wire types for raw trade and transfer records.
//!
//! These shapes are ephemeral: they exist between a fetch call and one
//! normalization pass, and are never persisted. Each source kind has its own
//! record shape; the normalizer is the only consumer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fee attached to an exchange trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeFee {
    pub cost: Decimal,
    pub currency: String,
}

/// A single trade from a generic exchange trading API.
///
/// The symbol is a `BASE/QUOTE` pair; `amount` is denominated in the base
/// currency and `cost` in the quote currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTrade {
    pub id: String,
    pub symbol: String,
    /// `buy` or `sell`; anything else is an unrecognized shape.
    pub side: String,
    pub amount: Decimal,
    pub cost: Decimal,
    pub fee: Option<TradeFee>,
    pub datetime: DateTime<Utc>,
}

/// Network status of a wallet-side transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    /// Internal movement that never touched a chain, e.g. a referral bonus.
    OffBlockchain,
    Confirmed,
    Pending,
    Unconfirmed,
}

/// On-chain metadata for an outbound send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferNetwork {
    pub status: NetworkStatus,
    /// Amount that arrived at the destination, net of the network fee.
    pub transaction_amount: WalletAmount,
    pub transaction_fee: WalletAmount,
}

/// Currency-tagged amount as the wallet API reports it. May be negative on
/// the wire; the normalizer takes the absolute magnitude.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletAmount {
    pub amount: Decimal,
    pub currency: String,
}

/// Resource kind of a wallet-style record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletResource {
    Send,
    Buy,
    Sell,
    #[serde(other)]
    Unknown,
}

/// A record from the wallet-style API: a send, a buy, or a sell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransfer {
    /// Native identifier; the wallet path has real external IDs and the
    /// ledger writer deduplicates on them.
    pub id: String,
    pub resource: WalletResource,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub amount: WalletAmount,
    /// Total charged for a buy, or total credited for a sell.
    pub total: Option<WalletAmount>,
    pub fee: Option<WalletAmount>,
    pub network: Option<TransferNetwork>,
}

impl RawTransfer {
    /// Completed records are the only ones worth importing; anything still
    /// created or canceled is skipped before normalization.
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

/// A sub-account exposed by the wallet-style API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAccount {
    pub id: String,
    pub name: String,
    /// `fiat` sub-accounts hold no importable history and are skipped.
    #[serde(rename = "type")]
    pub kind: String,
}

/// One row of a manually supplied batch, e.g. parsed from a CSV export.
///
/// Unlike API records, manual rows state their classification and peers
/// explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualRecord {
    /// The source's own type string, used only for the Deposit skip rule.
    pub transaction_type_raw: String,
    /// Explicit classification; unrecognized values map to `warning`.
    pub transaction_type: String,
    pub date: DateTime<Utc>,
    pub spent_amount: Decimal,
    pub spent_currency: String,
    pub acquired_amount: Decimal,
    pub acquired_currency: String,
    pub fee_amount: Decimal,
    pub fee_currency: String,
    pub source_peer: i64,
    pub target_peer: i64,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// A full manual batch with its provenance labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualBatch {
    /// Which service the export came from, e.g. `livecoin`.
    pub service_type: String,
    /// How the data entered the system, e.g. `csv`.
    pub import_mechanism: String,
    pub records: Vec<ManualRecord>,
}

/// A raw record of any source shape, tagged by origin.
#[derive(Debug, Clone)]
pub enum RawRecord {
    Trade(RawTrade),
    Transfer(RawTransfer),
    Manual(ManualRecord),
}

impl RawRecord {
    /// Native timestamp used for the watermark filter.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            RawRecord::Trade(t) => t.datetime,
            RawRecord::Transfer(t) => t.created_at,
            RawRecord::Manual(m) => m.date,
        }
    }
}

/// Errors from the exchange and wallet API clients.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// Per-market/page read timed out; recoverable, skip and continue.
    #[error("fetch timed out: {0}")]
    FetchTimeout(String),

    /// The remote rejected our credentials; fatal for the whole run.
    #[error("credentials rejected: {0}")]
    CredentialsRejected(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}
