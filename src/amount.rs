// Amount Helpers
//
// Satoshi amounts are plain `i64` throughout the engine. These helpers convert
// between satoshis and the 8-decimal coin notation used on the command line.

use crate::error::SapiError;

/// Satoshis per coin
pub const COIN: i64 = 100_000_000;

/// Largest amount a single request may ask for
pub const MAX_MONEY: i64 = 5_000_000_000 * COIN;

/// Format satoshis as a coin amount with 8 decimals.
///
/// # Examples
/// ```
/// use rustyledger::amount::format_amount;
/// assert_eq!(format_amount(100_000_000), "1.00000000");
/// assert_eq!(format_amount(-50_000_000), "-0.50000000");
/// ```
pub fn format_amount(amount: i64) -> String {
    let neg = amount < 0;
    let abs = amount.unsigned_abs();
    let whole = abs / COIN as u64;
    let frac = abs % COIN as u64;
    if neg {
        format!("-{}.{:08}", whole, frac)
    } else {
        format!("{}.{:08}", whole, frac)
    }
}

/// Parse a coin amount ("6", "6.5", "0.00000001") into satoshis.
///
/// Rejects negative values, more than 8 decimals and anything outside
/// `1..=MAX_MONEY`.
pub fn parse_amount(text: &str) -> Result<i64, SapiError> {
    let text = text.trim();
    let invalid = || SapiError::InvalidParameter(format!("invalid amount: {}", text));

    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if frac.len() > 8
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !frac.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }

    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let frac: i64 = if frac.is_empty() {
        0
    } else {
        format!("{:0<8}", frac).parse().map_err(|_| invalid())?
    };

    let sats = whole
        .checked_mul(COIN)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(invalid)?;
    check_amount_range(sats)?;
    Ok(sats)
}

/// Validate a requested payment amount
pub fn check_amount_range(amount: i64) -> Result<(), SapiError> {
    if !(1..=MAX_MONEY).contains(&amount) {
        return Err(SapiError::InvalidParameter(format!(
            "amount out of range: {} (expected 1 - {})",
            amount, MAX_MONEY
        )));
    }
    Ok(())
}
