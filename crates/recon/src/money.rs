//! Cell-level parsing: amounts to cents, member codes, dates.
//!
//! Amounts never pass through `f64`.

use chrono::{NaiveDate, NaiveDateTime};

/// Parse a decimal amount string to i64 minor units (cents).
///
/// Accepts "150", "150.5", "150.50", "-3.10", "38,50" (comma decimal
/// separator) and ".5". More than two fractional digits are rounded half
/// away from zero. Returns `None` for empty or non-numeric text.
pub fn parse_money(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, s.strip_prefix('+').unwrap_or(s).trim_start()),
    };
    if body.is_empty() {
        return None;
    }

    let separators = body.chars().filter(|c| *c == '.' || *c == ',').count();
    if separators > 1 {
        return None;
    }
    let (whole, frac) = match body.find(['.', ',']) {
        Some(pos) => (&body[..pos], &body[pos + 1..]),
        None => (body, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let units: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let digits: Vec<i64> = frac.bytes().map(|b| i64::from(b - b'0')).collect();
    let tenths = digits.first().copied().unwrap_or(0);
    let hundredths = digits.get(1).copied().unwrap_or(0);
    let mut cents = tenths * 10 + hundredths;
    if digits.get(2).copied().unwrap_or(0) >= 5 {
        cents += 1;
    }

    let minor = units.checked_mul(100)?.checked_add(cents)?;
    Some(if negative { -minor } else { minor })
}

/// Parse a numeric member code. Spreadsheet exports often render integer
/// codes as "101.0", so an all-zero fraction is accepted.
pub fn parse_member_code(s: &str) -> Option<i64> {
    let s = s.trim();
    let digits = match s.split_once('.') {
        Some((whole, frac)) if !frac.is_empty() && frac.chars().all(|c| c == '0') => whole,
        Some(_) => return None,
        None => s,
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Outcome of reading one date cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateCell {
    Empty,
    Date(NaiveDate),
    Malformed,
}

/// Parse a date cell against `formats`, in order. Formats carrying a time
/// component are parsed as datetimes and truncated to the date.
pub fn parse_date(s: &str, formats: &[String]) -> DateCell {
    let s = s.trim();
    if s.is_empty() {
        return DateCell::Empty;
    }
    for fmt in formats {
        let parsed = if fmt.contains("%H") {
            NaiveDateTime::parse_from_str(s, fmt).ok().map(|dt| dt.date())
        } else {
            NaiveDate::parse_from_str(s, fmt).ok()
        };
        if let Some(date) = parsed {
            return DateCell::Date(date);
        }
    }
    DateCell::Malformed
}

/// Format cents as a plain decimal string: 15050 → "150.50".
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Sum of cent amounts, saturating at the i64 bounds.
pub fn sum_cents(amounts: impl IntoIterator<Item = i64>) -> i64 {
    amounts.into_iter().fold(0, i64::saturating_add)
}
