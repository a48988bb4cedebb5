//! Canonical ledger model and normalization.
//!
//! This module owns the canonical `LedgerEntry` shape that every raw source
//! record is transformed into, together with the `Normalizer` that performs
//! the transformation. Everything downstream of the fetchers speaks in these
//! types only.

pub mod normalizer;
pub mod types;

pub use normalizer::*;
pub use types::*;
