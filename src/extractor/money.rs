//! Rendered money strings: numeric amount, currency symbol, conversion.

use std::sync::LazyLock;

use regex::Regex;

use super::text;

/// Run of symbol characters immediately preceding the first digit,
/// e.g. `$` in "pledged of $1,234 goal" or `US$` in "About US$ 1,300".
static SYMBOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^\s\d,.]+)\s*\d").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct Money {
    /// Canonical symbol ("$", "£", "€", ...). Empty when the page rendered
    /// a bare amount.
    pub symbol: String,
    pub amount: f64,
}

/// Parse a rendered amount like "£602,874" or "About US$ 1,300".
/// Returns `None` when the string carries no digits at all.
pub fn parse(raw: &str) -> Option<Money> {
    let amount = text::digits_f64(raw)?;
    let symbol = SYMBOL_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| normalize_symbol(m.as_str()))
        .unwrap_or_default();
    Some(Money { symbol, amount })
}

/// Collapse the renderings seen in the wild onto one symbol per currency.
/// "USD" and "US$" both mean "$"; the pound and euro symbols also show up
/// as their double-decoded byte sequences in older captures.
pub fn normalize_symbol(raw: &str) -> String {
    match raw.trim() {
        "USD" | "US$" | "U$" => "$".to_string(),
        "GBP" | "Â£" => "£".to_string(),
        "EUR" | "â‚¬" => "€".to_string(),
        other => other.to_string(),
    }
}

/// Rate that maps native-currency amounts onto the displayed currency:
/// `displayed ÷ native`. Falls back to 1.0 when the reference pair is
/// unusable, so conversion is always safe to apply.
pub fn conversion_rate(native: f64, displayed: f64) -> f64 {
    if native > 0.0 && displayed.is_finite() && displayed > 0.0 {
        displayed / native
    } else {
        1.0
    }
}
