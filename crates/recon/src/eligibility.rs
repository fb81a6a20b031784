//! Member exclusion from the installment-status table.

use std::collections::BTreeMap;

use crate::config::{EligibilityConfig, InstallmentColumns};
use crate::error::ReconError;
use crate::identity::read_member_code;
use crate::model::{Diagnostic, ExclusionReason};
use crate::table::Table;

#[derive(Default)]
struct StatusTally {
    pending: usize,
    /// Index into `exclude_statuses` of the first-listed status seen.
    excluded: Option<usize>,
}

/// Members that should be left out of reconciliation, with the reason.
///
/// A member is excluded when any of its installments carries a status in
/// `exclude_statuses`, or when `max_pending` or more carry `pending_status`.
/// Status comparison ignores case and surrounding whitespace.
pub fn excluded_members(
    table: &Table,
    columns: &InstallmentColumns,
    rules: &EligibilityConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<BTreeMap<i64, ExclusionReason>, ReconError> {
    let code_col = table.require(&columns.member_code)?;
    let status_col = table.require(&columns.status)?;

    let mut tallies: BTreeMap<i64, StatusTally> = BTreeMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        let Some(code) = read_member_code(table, i + 1, code_col, row, diagnostics) else {
            continue;
        };
        let status = status_col.get(row).trim();
        let tally = tallies.entry(code).or_default();

        if status.eq_ignore_ascii_case(rules.pending_status.trim()) {
            tally.pending += 1;
        }
        if let Some(idx) = rules
            .exclude_statuses
            .iter()
            .position(|s| s.trim().eq_ignore_ascii_case(status))
        {
            tally.excluded = Some(tally.excluded.map_or(idx, |prev| prev.min(idx)));
        }
    }

    let mut out = BTreeMap::new();
    for (code, tally) in tallies {
        let reason = if let Some(idx) = tally.excluded {
            ExclusionReason::ExcludedStatus { status: rules.exclude_statuses[idx].trim().to_string() }
        } else if tally.pending >= rules.max_pending {
            ExclusionReason::TooManyPending { pending: tally.pending, max_pending: rules.max_pending }
        } else {
            continue;
        };
        out.insert(code, reason);
    }

    log::info!("eligibility: {} of {} members excluded", out.len(), table.len());
    Ok(out)
}
