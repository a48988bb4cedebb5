//! Import synchronization module.
//!
//! This module provides all the core logic and services for importing an
//! account's transaction history into the ledger. It is composed of several
//! submodules, each responsible for a specific aspect of the import process:
//!
//! - `orchestrator`: The main entry point and coordinator for one import run. It wires together fetch strategies, normalization, and persistence.
//! - `strategies`: Pluggable fetch strategies (batch, per-market, wallet, manual) and their configuration.
//! - `watermark`: The per-account sync watermark that prevents duplicate imports across runs.
//! - `writer`: The ledger writer with in-run deduplication and batch commit.
//! - `progress`: Tracks per-run import counts and provides a summary.
//! - `dispatch`: The single-flight guard ensuring at most one in-flight run per account.
//!
//! The orchestrator coordinates the run by selecting a strategy for the
//! account's service type, filtering records through the watermark,
//! normalizing the remainder, and committing the batch. Only credential and
//! storage failures abort a run; per-record failures degrade to a skip or a
//! warning-classified entry.

/// Single-flight run guard and terminal status mapping
pub mod dispatch;
/// Main coordinator for one import run
pub mod orchestrator;
/// Tracks import progress and statistics
pub mod progress;
/// Pluggable raw record fetch strategies
pub mod strategies;
/// Per-account sync watermark persistence
pub mod watermark;
/// Ledger entry persistence and deduplication
pub mod writer;

pub use dispatch::*;
pub use orchestrator::*;
pub use strategies::*;
pub use watermark::*;
pub use writer::*;

use crate::exchange::{ExchangeError, UnsupportedService};

/// Errors that can abort an import run.
///
/// Per-record problems never surface here; they are converted to skips or
/// warning-classified entries inside the pipeline. What remains is fatal:
/// rejected credentials, unknown service types, and storage failures.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("credentials rejected: {0}")]
    CredentialsInvalid(String),

    #[error(transparent)]
    UnsupportedService(#[from] UnsupportedService),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
