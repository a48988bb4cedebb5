//!
//! Raw record sources: exchange trading APIs, wallet-style APIs, and manual
//! batches, plus the registry that resolves an account's declared service
//! type to a concrete client.

pub mod client;
pub mod registry;
pub mod types;

pub use client::*;
pub use registry::*;
pub use types::*;
