//!
//! Small shared helpers for the import pipeline.

/// Split a `BASE/QUOTE` trading pair into its two currency codes.
///
/// Returns `None` when the symbol has no `/` delimiter or an empty side.
pub fn split_symbol(symbol: &str) -> Option<(&str, &str)> {
    let (base, quote) = symbol.split_once('/')?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base, quote))
}

#[cfg(test)]
mod tests {
    use super::split_symbol;

    #[test]
    fn splits_well_formed_pairs() {
        assert_eq!(split_symbol("LTC/BTC"), Some(("LTC", "BTC")));
        assert_eq!(split_symbol("XMR/BTC"), Some(("XMR", "BTC")));
    }

    #[test]
    fn rejects_malformed_symbols() {
        assert_eq!(split_symbol("LTCBTC"), None);
        assert_eq!(split_symbol("/BTC"), None);
        assert_eq!(split_symbol("LTC/"), None);
    }
}
