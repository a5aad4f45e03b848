use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;

static NON_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d.,]").expect("static price pattern"));

/// Normalize locale-formatted price text such as `"₹1,999"` or `"$1,234.56"`.
///
/// Everything except digits, commas and periods is stripped. Commas are always
/// treated as thousands separators: with a period present the period is the
/// decimal point, and with commas alone every comma is dropped regardless of
/// group width. Returns `None` for empty, unparsable or non-positive input.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned = NON_NUMERIC.replace_all(raw.trim(), "");
    if cleaned.is_empty() {
        return None;
    }

    let normalized = cleaned.replace(',', "");
    // Whole-part markup such as "1,999." leaves a dangling decimal point.
    let normalized = normalized.strip_suffix('.').unwrap_or(&normalized);
    let amount = match Decimal::from_str(normalized) {
        Ok(amount) => amount,
        Err(_) => {
            tracing::debug!("Could not parse price from text: {:?}", raw);
            return None;
        }
    };

    if amount <= Decimal::ZERO {
        return None;
    }

    // Through the decimal string so the f64 is the nearest value to the text.
    f64::from_str(&amount.normalize().to_string()).ok()
}
