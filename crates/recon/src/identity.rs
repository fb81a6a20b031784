//! Identity resolution across the arrears table (keyed by member code) and
//! the payment ledger (keyed by free-text consumer name), bridged by the
//! membership roster.
//!
//! Names match only when their normalized forms are byte-equal. There is
//! no approximate matching: a payment whose name is absent from the roster,
//! or present under more than one code, stays unlinked and is reported.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;

use crate::aging::bucket_for;
use crate::config::{ArrearsColumns, KeepPolicy, PaymentColumns, PolicyConfig, ReconConfig, RosterColumns};
use crate::error::ReconError;
use crate::installment::{backfill_plan_texts, parse_plan};
use crate::model::{
    ArrearsFact, Diagnostic, InstallmentPlan, MemberRecord, PaymentEvent, ReconInput,
    UnmatchedPayment, UnmatchedReason,
};
use crate::money::{parse_date, parse_member_code, parse_money, DateCell};
use crate::table::{Column, Row, Table};

/// Trim, uppercase, collapse whitespace runs to a single space.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(|w| w.to_uppercase())
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Cell helpers
// ---------------------------------------------------------------------------

/// Blank reads as zero. Non-numeric and negative values read as zero with a
/// diagnostic; the row itself is kept.
pub(crate) fn read_amount(
    table: &Table,
    row_no: usize,
    col: Column<'_>,
    row: &Row,
    diagnostics: &mut Vec<Diagnostic>,
) -> i64 {
    let raw = col.get(row);
    if raw.trim().is_empty() {
        return 0;
    }
    match parse_money(raw) {
        Some(cents) if cents >= 0 => cents,
        Some(_) => {
            diagnostics.push(Diagnostic::NegativeAmount {
                table: table.name.clone(),
                row: row_no,
                column: col.name().to_string(),
                value: raw.to_string(),
            });
            0
        }
        None => {
            diagnostics.push(Diagnostic::InvalidAmount {
                table: table.name.clone(),
                row: row_no,
                column: col.name().to_string(),
                value: raw.to_string(),
            });
            0
        }
    }
}

pub(crate) fn read_date(
    table: &Table,
    row_no: usize,
    col: Column<'_>,
    row: &Row,
    formats: &[String],
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<NaiveDate> {
    let raw = col.get(row);
    match parse_date(raw, formats) {
        DateCell::Date(d) => Some(d),
        DateCell::Empty => None,
        DateCell::Malformed => {
            diagnostics.push(Diagnostic::MalformedDate {
                table: table.name.clone(),
                row: row_no,
                column: col.name().to_string(),
                value: raw.to_string(),
            });
            None
        }
    }
}

pub(crate) fn read_member_code(
    table: &Table,
    row_no: usize,
    col: Column<'_>,
    row: &Row,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<i64> {
    let raw = col.get(row);
    let code = parse_member_code(raw);
    if code.is_none() {
        diagnostics.push(Diagnostic::InvalidMemberCode {
            table: table.name.clone(),
            row: row_no,
            value: raw.to_string(),
        });
    }
    code
}

// ---------------------------------------------------------------------------
// Arrears index
// ---------------------------------------------------------------------------

struct ArrearsRow {
    row: usize,
    code: i64,
    amount: i64,
    text: String,
    date: Option<NaiveDate>,
}

struct ArrearsAcc {
    total: i64,
    rows: usize,
    plan: InstallmentPlan,
    last_date: Option<NaiveDate>,
}

/// Build the arrears-side index by member code.
///
/// Repeated codes are merged: amounts are summed, the plan (and so the
/// aging bucket) comes from the first or last occurrence per
/// `policy.duplicate_keep`, and the latest date is kept.
pub fn index_arrears(
    table: &Table,
    columns: &ArrearsColumns,
    policy: &PolicyConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<BTreeMap<i64, ArrearsFact>, ReconError> {
    let code_col = table.require(&columns.member_code)?;
    let amount_col = table.require(&columns.amount)?;
    let plan_col = table.require_opt(columns.plan_text.as_deref())?;
    let date_col = table.require_opt(columns.date.as_deref())?;

    let mut parsed: Vec<ArrearsRow> = Vec::with_capacity(table.len());
    for (i, row) in table.rows.iter().enumerate() {
        let row_no = i + 1;
        let Some(code) = read_member_code(table, row_no, code_col, row, diagnostics) else {
            continue;
        };
        let amount = read_amount(table, row_no, amount_col, row, diagnostics);
        let text = plan_col.map(|c| c.get(row).to_string()).unwrap_or_default();
        let date = date_col
            .and_then(|c| read_date(table, row_no, c, row, &policy.date_formats, diagnostics));
        parsed.push(ArrearsRow { row: row_no, code, amount, text, date });
    }

    if policy.backfill_plans && plan_col.is_some() {
        let mut pairs: Vec<(Option<i64>, String)> =
            parsed.iter().map(|r| (Some(r.amount), r.text.clone())).collect();
        for i in backfill_plan_texts(&mut pairs) {
            let r = &mut parsed[i];
            r.text = std::mem::take(&mut pairs[i].1);
            log::debug!("arrears row {}: plan text backfilled from amount {}", r.row, r.amount);
            diagnostics.push(Diagnostic::PlanBackfilled {
                row: r.row,
                member_code: r.code,
                text: r.text.clone(),
            });
        }
    }

    let mut acc: BTreeMap<i64, ArrearsAcc> = BTreeMap::new();
    for r in &parsed {
        let plan = parse_plan(plan_col.map(|_| r.text.as_str()));
        if plan_col.is_some() && !r.text.trim().is_empty() && plan.installment_count.is_none() {
            diagnostics.push(Diagnostic::UnparseableInstallment {
                row: r.row,
                member_code: r.code,
                text: r.text.clone(),
            });
        }

        match acc.entry(r.code) {
            Entry::Vacant(slot) => {
                slot.insert(ArrearsAcc { total: r.amount, rows: 1, plan, last_date: r.date });
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                entry.total = entry.total.saturating_add(r.amount);
                entry.rows += 1;
                if policy.duplicate_keep == KeepPolicy::Last {
                    entry.plan = plan;
                }
                entry.last_date = entry.last_date.max(r.date);
            }
        }
    }

    let mut facts = BTreeMap::new();
    for (code, a) in acc {
        if a.rows > 1 {
            diagnostics.push(Diagnostic::DuplicateCodeMerged {
                table: table.name.clone(),
                member_code: code,
                rows: a.rows,
            });
        }
        facts.insert(
            code,
            ArrearsFact {
                total_owed_cents: a.total,
                aging_bucket: bucket_for(a.plan.installment_count),
                plan: a.plan,
                last_known_date: a.last_date,
                row_count: a.rows,
            },
        );
    }

    log::info!("arrears: {} rows -> {} members", table.len(), facts.len());
    Ok(facts)
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// Result of looking up a normalized name in the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameMatch<'a> {
    NotFound,
    Unique(i64),
    Ambiguous(&'a [i64]),
}

/// Master `member_code → name` lookup plus the reverse name index.
#[derive(Debug, Clone, Default)]
pub struct RosterIndex {
    names: BTreeMap<i64, String>,
    by_name: HashMap<String, Vec<i64>>,
}

impl RosterIndex {
    pub fn display_name(&self, member_code: i64) -> Option<&str> {
        self.names.get(&member_code).map(String::as_str)
    }

    pub fn lookup(&self, normalized_name: &str) -> NameMatch<'_> {
        match self.by_name.get(normalized_name).map(Vec::as_slice) {
            None | Some([]) => NameMatch::NotFound,
            Some([code]) => NameMatch::Unique(*code),
            Some(codes) => NameMatch::Ambiguous(codes),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Index the roster. On a repeated code only one row survives
/// (`policy.duplicate_keep`), reported as `DuplicateRosterCode`.
pub fn index_roster(
    table: &Table,
    columns: &RosterColumns,
    policy: &PolicyConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<RosterIndex, ReconError> {
    let code_col = table.require(&columns.member_code)?;
    let name_col = table.require(&columns.name)?;

    let mut names: BTreeMap<i64, String> = BTreeMap::new();
    let mut seen: BTreeMap<i64, usize> = BTreeMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        let Some(code) = read_member_code(table, i + 1, code_col, row, diagnostics) else {
            continue;
        };
        let name = name_col.get(row).trim().to_string();
        let count = seen.entry(code).or_insert(0);
        *count += 1;
        if *count == 1 || policy.duplicate_keep == KeepPolicy::Last {
            names.insert(code, name);
        }
    }

    for (code, rows) in seen {
        if rows > 1 {
            diagnostics.push(Diagnostic::DuplicateRosterCode { member_code: code, rows });
        }
    }

    let mut by_name: HashMap<String, Vec<i64>> = HashMap::new();
    for (code, name) in &names {
        let norm = normalize_name(name);
        if !norm.is_empty() {
            by_name.entry(norm).or_default().push(*code);
        }
    }

    log::info!("roster: {} rows -> {} codes", table.len(), names.len());
    Ok(RosterIndex { names, by_name })
}

// ---------------------------------------------------------------------------
// Payment linking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct LinkedPayments {
    /// Every payment row, linked or not, in input order.
    pub events: Vec<PaymentEvent>,
    pub unmatched: Vec<UnmatchedPayment>,
}

/// Normalize payment names, pick each row's event date, and link rows to
/// roster codes.
///
/// The event date is the first parseable value across `columns.dates`,
/// in order.
pub fn link_payments(
    table: &Table,
    columns: &PaymentColumns,
    roster: Option<&RosterIndex>,
    policy: &PolicyConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<LinkedPayments, ReconError> {
    let name_col = table.require(&columns.consumer_name)?;
    let amount_col = table.require(&columns.amount)?;
    let status_col = table.require(&columns.status)?;
    let date_cols = columns
        .dates
        .iter()
        .map(|c| table.require(c))
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = LinkedPayments::default();
    let mut reported_ambiguous: HashSet<String> = HashSet::new();

    for (i, row) in table.rows.iter().enumerate() {
        let row_no = i + 1;
        let consumer_name = name_col.get(row).trim().to_string();
        let normalized_name = normalize_name(&consumer_name);
        let amount_cents = read_amount(table, row_no, amount_col, row, diagnostics);
        let status = status_col.get(row).trim().to_string();
        let date = date_cols.iter().find_map(|c| {
            read_date(table, row_no, *c, row, &policy.date_formats, diagnostics)
        });

        let link = if normalized_name.is_empty() {
            Err(UnmatchedReason::BlankName)
        } else {
            match roster.map(|r| r.lookup(&normalized_name)) {
                None => Err(UnmatchedReason::NoRoster),
                Some(NameMatch::NotFound) => Err(UnmatchedReason::NoRosterMatch),
                Some(NameMatch::Unique(code)) => Ok(code),
                Some(NameMatch::Ambiguous(codes)) => {
                    if reported_ambiguous.insert(normalized_name.clone()) {
                        diagnostics.push(Diagnostic::AmbiguousName {
                            normalized_name: normalized_name.clone(),
                            member_codes: codes.to_vec(),
                        });
                    }
                    Err(UnmatchedReason::AmbiguousName)
                }
            }
        };

        let member_code = match link {
            Ok(code) => Some(code),
            Err(reason) => {
                log::debug!("payment row {row_no} ({consumer_name:?}) unlinked: {reason:?}");
                diagnostics.push(Diagnostic::UnmatchedPayment {
                    row: row_no,
                    consumer_name: consumer_name.clone(),
                    reason,
                });
                out.unmatched.push(UnmatchedPayment {
                    row: row_no,
                    consumer_name: consumer_name.clone(),
                    normalized_name: normalized_name.clone(),
                    amount_cents,
                    date,
                    reason,
                });
                None
            }
        };

        out.events.push(PaymentEvent {
            row: row_no,
            consumer_name,
            normalized_name,
            member_code,
            amount_cents,
            date,
            status,
        });
    }

    if !out.unmatched.is_empty() {
        log::warn!(
            "payments: {} of {} rows have no resolvable member",
            out.unmatched.len(),
            table.len()
        );
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Canonical member set
// ---------------------------------------------------------------------------

/// Finished output of identity resolution, handed read-only to the later
/// stages.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub members: BTreeMap<i64, MemberRecord>,
    pub arrears: BTreeMap<i64, ArrearsFact>,
    pub payments: LinkedPayments,
}

/// Run all resolution steps. The canonical set is the union of arrears
/// codes and codes reached by linked payments.
pub fn resolve(
    config: &ReconConfig,
    input: &ReconInput,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Resolution, ReconError> {
    let arrears = index_arrears(&input.arrears, &config.arrears.columns, &config.policy, diagnostics)?;

    let roster = match (&config.roster, &input.roster) {
        (Some(cfg), Some(table)) => {
            Some(index_roster(table, &cfg.columns, &config.policy, diagnostics)?)
        }
        (Some(_), None) => return Err(ReconError::MissingTable("roster".into())),
        (None, _) => None,
    };

    let payments = link_payments(
        &input.payments,
        &config.payments.columns,
        roster.as_ref(),
        &config.policy,
        diagnostics,
    )?;

    let mut members = BTreeMap::new();
    let linked_codes = payments.events.iter().filter_map(|e| e.member_code);
    for code in arrears.keys().copied().chain(linked_codes) {
        members.entry(code).or_insert_with(|| {
            let display_name = roster
                .as_ref()
                .and_then(|r| r.display_name(code))
                .filter(|n| !n.is_empty())
                .map(str::to_string);
            MemberRecord {
                member_code: code,
                normalized_name: display_name.as_deref().map(normalize_name),
                display_name,
            }
        });
    }

    log::info!(
        "identity: {} canonical members ({} with arrears)",
        members.len(),
        arrears.len()
    );
    Ok(Resolution { members, arrears, payments })
}
