use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::aggregate::{
    ledger_summary, reconcile_members, summarize_buckets, summarize_payments, summarize_standings,
};
use crate::config::ReconConfig;
use crate::eligibility::excluded_members;
use crate::error::ReconError;
use crate::identity::resolve;
use crate::model::{Diagnostic, ReconInput, ReconMeta, ReconResult, ReconSummary, ReconciledMember};
use crate::money::sum_cents;
use crate::table::Table;
use crate::temporal::aggregate_periods;

/// Run one reconciliation. `as_of` is the reference date for rejecting
/// future-dated payments.
///
/// Every declared table and column is checked before any row is read, so a
/// schema problem never yields partial output.
pub fn run(config: &ReconConfig, input: &ReconInput, as_of: NaiveDate) -> Result<ReconResult, ReconError> {
    check_schema(config, input)?;

    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let resolution = resolve(config, input, &mut diagnostics)?;

    let excluded = match (&config.eligibility, &config.installments, &input.installments) {
        (Some(rules), Some(cfg), Some(table)) => {
            excluded_members(table, &cfg.columns, rules, &mut diagnostics)?
        }
        _ => BTreeMap::new(),
    };

    let mut members = resolution.members;
    let mut excluded_count = 0;
    for (code, reason) in &excluded {
        if members.remove(code).is_some() {
            excluded_count += 1;
            diagnostics.push(Diagnostic::MemberExcluded { member_code: *code, reason: reason.clone() });
        }
    }

    let events = &resolution.payments.events;
    let member_payments = summarize_payments(events);
    let reconciled = reconcile_members(&members, &resolution.arrears, &member_payments, &config.policy);
    let buckets = summarize_buckets(&reconciled);
    let classifications = summarize_standings(&reconciled);
    let periods = aggregate_periods(
        events,
        as_of,
        config.policy.future_tolerance_days,
        |e| e.member_code.is_some_and(|c| excluded.contains_key(&c)),
        &mut diagnostics,
    );
    let ledger = ledger_summary(events);

    let summary = summarize_run(input, &reconciled, &resolution.payments.events, excluded_count, &diagnostics);
    log::info!(
        "recon '{}': {} members, {} unmatched payment rows, {} diagnostics",
        config.name,
        summary.members,
        summary.unmatched_payment_rows,
        diagnostics.len()
    );

    Ok(ReconResult {
        meta: ReconMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            as_of,
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        members: reconciled,
        buckets,
        classifications,
        periods,
        ledger,
        unmatched_payments: resolution.payments.unmatched,
        diagnostics,
    })
}

/// Check that every table and column the config declares is present.
pub fn check_schema(config: &ReconConfig, input: &ReconInput) -> Result<(), ReconError> {
    let a = &config.arrears.columns;
    input.arrears.require(&a.member_code)?;
    input.arrears.require(&a.amount)?;
    input.arrears.require_opt(a.plan_text.as_deref())?;
    input.arrears.require_opt(a.date.as_deref())?;

    let p = &config.payments.columns;
    for column in [&p.consumer_name, &p.amount, &p.status].into_iter().chain(&p.dates) {
        input.payments.require(column)?;
    }

    if let Some(ref roster) = config.roster {
        let table = supplied(&input.roster, "roster")?;
        table.require(&roster.columns.member_code)?;
        table.require(&roster.columns.name)?;
    }

    if let Some(ref inst) = config.installments {
        let table = supplied(&input.installments, "installments")?;
        table.require(&inst.columns.member_code)?;
        table.require(&inst.columns.status)?;
    }

    Ok(())
}

fn supplied<'t>(table: &'t Option<Table>, name: &str) -> Result<&'t Table, ReconError> {
    table.as_ref().ok_or_else(|| ReconError::MissingTable(name.to_string()))
}

fn summarize_run(
    input: &ReconInput,
    members: &[ReconciledMember],
    events: &[crate::model::PaymentEvent],
    excluded_members: usize,
    diagnostics: &[Diagnostic],
) -> ReconSummary {
    let mut diagnostic_counts: BTreeMap<String, usize> = BTreeMap::new();
    for d in diagnostics {
        *diagnostic_counts.entry(d.kind().to_string()).or_insert(0) += 1;
    }

    let linked = events.iter().filter(|e| e.member_code.is_some()).count();
    ReconSummary {
        arrears_rows: input.arrears.len(),
        payment_rows: input.payments.len(),
        members: members.len(),
        members_with_arrears: members.iter().filter(|m| m.arrears.is_some()).count(),
        members_with_payments: members.iter().filter(|m| m.payments.is_some()).count(),
        linked_payment_rows: linked,
        unmatched_payment_rows: events.len() - linked,
        excluded_members,
        total_owed_cents: sum_cents(members.iter().map(|m| m.total_owed_cents())),
        total_paid_cents: sum_cents(members.iter().map(|m| m.total_paid_cents())),
        outstanding_cents: sum_cents(members.iter().map(|m| m.outstanding_balance_cents)),
        provision_cents: sum_cents(members.iter().filter_map(|m| m.monthly_provision_cents())),
        diagnostic_counts,
    }
}
