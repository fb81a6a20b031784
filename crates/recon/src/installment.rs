//! Installment descriptor parsing: "25 CUOTAS 38.50" → (25, 38.50).

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::InstallmentPlan;
use crate::money::parse_money;

/// ASCII digits with at most one decimal separator (dot or comma).
static NUMERIC_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+(?:[.,][0-9]+)?").expect("numeric token pattern"));

/// Parse a free-text plan descriptor.
///
/// The count is the first integer token; the amount is the first numeric
/// token after it. `None`, blank text, text with no integer token, and a
/// zero count all yield an empty plan. This is the normal "no plan on file"
/// outcome, not an error.
pub fn parse_plan(text: Option<&str>) -> InstallmentPlan {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return InstallmentPlan::default();
    };

    let mut tokens = NUMERIC_TOKEN.find_iter(text);
    let count = tokens
        .by_ref()
        .find(|m| !m.as_str().contains(['.', ',']))
        .and_then(|m| m.as_str().parse::<u32>().ok());

    match count {
        Some(n) if n > 0 => InstallmentPlan {
            installment_count: Some(n),
            installment_amount_cents: tokens.next().and_then(|m| parse_money(m.as_str())),
        },
        _ => InstallmentPlan::default(),
    }
}

/// Fill blank plan texts from other rows with the same amount.
///
/// `rows` holds `(amount_cents, plan_text)` in input order. For each amount
/// the first non-blank text seen is the reference. Returns the indices that
/// were filled.
pub fn backfill_plan_texts(rows: &mut [(Option<i64>, String)]) -> Vec<usize> {
    let mut reference: HashMap<i64, String> = HashMap::new();
    for (amount, text) in rows.iter() {
        if let Some(amount) = amount {
            if !text.trim().is_empty() {
                reference.entry(*amount).or_insert_with(|| text.clone());
            }
        }
    }

    let mut filled = Vec::new();
    for (i, (amount, text)) in rows.iter_mut().enumerate() {
        if !text.trim().is_empty() {
            continue;
        }
        if let Some(borrowed) = amount.and_then(|a| reference.get(&a)) {
            *text = borrowed.clone();
            filled.push(i);
        }
    }
    filled
}
