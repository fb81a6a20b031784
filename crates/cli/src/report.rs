//! Human-readable summary (stderr) and member CSV export.

use std::path::Path;

use serde::Serialize;

use mora_recon::aggregate::known_years;
use mora_recon::model::{ReconResult, ReconciledMember};
use mora_recon::money::format_cents;

use crate::CliError;

#[derive(Serialize)]
struct MemberCsvRow<'a> {
    member_code: i64,
    name: &'a str,
    classification: String,
    aging_bucket: String,
    total_owed: String,
    total_paid: String,
    outstanding_balance: String,
    installment_count: Option<u32>,
    installment_amount: Option<String>,
    plan_total: Option<String>,
    last_known_date: Option<String>,
    last_payment_date: Option<String>,
    last_status: &'a str,
}

impl<'a> From<&'a ReconciledMember> for MemberCsvRow<'a> {
    fn from(m: &'a ReconciledMember) -> Self {
        let plan = m.arrears.as_ref().map(|a| a.plan);
        Self {
            member_code: m.member_code(),
            name: m.member.display_name.as_deref().unwrap_or(""),
            classification: m.classification.to_string(),
            aging_bucket: m.aging_bucket().map(|b| b.to_string()).unwrap_or_default(),
            total_owed: format_cents(m.total_owed_cents()),
            total_paid: format_cents(m.total_paid_cents()),
            outstanding_balance: format_cents(m.outstanding_balance_cents),
            installment_count: plan.and_then(|p| p.installment_count),
            installment_amount: plan.and_then(|p| p.installment_amount_cents).map(format_cents),
            plan_total: plan.and_then(|p| p.computed_total_cents()).map(format_cents),
            last_known_date: m.last_known_date().map(|d| d.to_string()),
            last_payment_date: m
                .payments
                .as_ref()
                .and_then(|p| p.last_payment_date)
                .map(|d| d.to_string()),
            last_status: m.payments.as_ref().map_or("", |p| p.last_status_flag.as_str()),
        }
    }
}

/// Render members as CSV, one row each, in the order given.
pub fn members_csv(members: &[ReconciledMember]) -> Result<Vec<u8>, CliError> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    for m in members {
        writer
            .serialize(MemberCsvRow::from(m))
            .map_err(|e| CliError::io(e.to_string()))?;
    }
    writer.into_inner().map_err(|e| CliError::io(e.to_string()))
}

pub fn write_members_csv(path: &Path, members: &[ReconciledMember]) -> Result<(), CliError> {
    let bytes = members_csv(members)?;
    std::fs::write(path, &bytes)
        .map_err(|e| CliError::io(format!("{}: {}", path.display(), e)))
}

pub fn print_summary(result: &ReconResult, filtered: bool) {
    let s = &result.summary;
    eprintln!(
        "recon '{}' as of {}: {} members ({} with arrears, {} with payments), {} excluded",
        result.meta.config_name,
        result.meta.as_of,
        s.members,
        s.members_with_arrears,
        s.members_with_payments,
        s.excluded_members,
    );
    eprintln!(
        "payments: {} rows, {} linked, {} unmatched",
        s.payment_rows, s.linked_payment_rows, s.unmatched_payment_rows,
    );
    eprintln!(
        "owed {}  paid {}  outstanding {}  monthly provision {}",
        format_cents(s.total_owed_cents),
        format_cents(s.total_paid_cents),
        format_cents(s.outstanding_cents),
        format_cents(s.provision_cents),
    );

    if filtered {
        eprintln!("filtered: {} members shown", result.members.len());
    }

    let years = known_years(&result.members);
    if !years.is_empty() {
        let years: Vec<String> = years.iter().map(i32::to_string).collect();
        eprintln!("arrears dated in: {}", years.join(", "));
    }

    for c in &result.classifications {
        eprintln!(
            "  {:<26} {:>6}  owed {:>14}  outstanding {:>14}",
            c.label,
            c.member_count,
            format_cents(c.total_owed_cents),
            format_cents(c.outstanding_cents),
        );
    }

    if !s.diagnostic_counts.is_empty() {
        let parts: Vec<String> = s
            .diagnostic_counts
            .iter()
            .map(|(kind, n)| format!("{kind}={n}"))
            .collect();
        eprintln!("diagnostics: {}", parts.join(" "));
    }
}
