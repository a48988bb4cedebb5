//!
//! Historical price lookup with memoization.

pub mod resolver;

pub use resolver::*;
