//! BRL money parsing (`R$ 1.234.567,89`).

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

static BRL_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"R\$\s*([\d\.\u{00A0} ]+,\d{2})").expect("BRL regex"));

static CONTEXTUAL_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)valor\s+total\s+estimado(?:\s+do\s+leil[ãa]o)?[\s:]*R\$\s*([\d\.\u{00A0} ]+,\d{2})")
        .expect("contextual BRL regex")
});

/// Parse a Brazilian-formatted amount (`1.234,56`) into a decimal.
pub fn parse_brl_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',')
        .collect();
    let normalized = cleaned.replace(',', ".");
    let value = Decimal::from_str(&normalized).ok()?;
    if value > Decimal::ZERO {
        Some(value)
    } else {
        None
    }
}

/// First amount near "valor total estimado"; falls back to the first BRL
/// amount anywhere in the text.
pub fn find_estimated_value(text: &str) -> Option<Decimal> {
    if let Some(caps) = CONTEXTUAL_AMOUNT.captures(text) {
        if let Some(value) = parse_brl_amount(&caps[1]) {
            return Some(value);
        }
    }
    BRL_AMOUNT
        .captures(text)
        .and_then(|caps| parse_brl_amount(&caps[1]))
}
