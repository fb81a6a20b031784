//! Payment events grouped by calendar period.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Duration, NaiveDate};

use crate::model::{Diagnostic, Granularity, PaymentEvent, PeriodSummary, PeriodTables};

/// Distinct-member key. Linked events count by code; unlinked ones by their
/// normalized name, so they still show up in period counts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum MemberKey<'a> {
    Code(i64),
    Name(&'a str),
}

impl<'a> MemberKey<'a> {
    fn of(event: &'a PaymentEvent) -> Self {
        match event.member_code {
            Some(code) => Self::Code(code),
            None => Self::Name(&event.normalized_name),
        }
    }
}

pub fn period_key(date: NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Day => date.format("%Y-%m-%d").to_string(),
        Granularity::IsoWeek => {
            let week = date.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        Granularity::Month => date.format("%Y-%m").to_string(),
        Granularity::Year => date.format("%Y").to_string(),
    }
}

#[derive(Default)]
struct PeriodAcc<'a> {
    total: i64,
    count: usize,
    members: BTreeSet<MemberKey<'a>>,
}

fn group<'a>(events: &[&'a PaymentEvent], granularity: Granularity) -> Vec<PeriodSummary> {
    let mut groups: BTreeMap<String, PeriodAcc<'a>> = BTreeMap::new();
    for &event in events {
        let Some(date) = event.date else { continue };
        let acc = groups.entry(period_key(date, granularity)).or_default();
        acc.total = acc.total.saturating_add(event.amount_cents);
        acc.count += 1;
        acc.members.insert(MemberKey::of(event));
    }
    groups
        .into_iter()
        .map(|(period_key, acc)| PeriodSummary {
            period_key,
            total_amount_cents: acc.total,
            payment_count: acc.count,
            distinct_member_count: acc.members.len(),
        })
        .collect()
}

/// Build day / ISO-week / month / year tables.
///
/// An event dated after `as_of + tolerance_days` is left out of every table,
/// counted in `rejected_future` and reported as `FutureDate`. Undated events
/// are counted in `undated` only. Events for which `skip` returns true are
/// ignored entirely.
pub fn aggregate_periods(
    events: &[PaymentEvent],
    as_of: NaiveDate,
    tolerance_days: u32,
    skip: impl Fn(&PaymentEvent) -> bool,
    diagnostics: &mut Vec<Diagnostic>,
) -> PeriodTables {
    let cutoff = as_of + Duration::days(i64::from(tolerance_days));
    let mut tables = PeriodTables::default();
    let mut kept: Vec<&PaymentEvent> = Vec::with_capacity(events.len());

    for event in events.iter().filter(|e| !skip(*e)) {
        match event.date {
            None => tables.undated += 1,
            Some(date) if date > cutoff => {
                tables.rejected_future += 1;
                diagnostics.push(Diagnostic::FutureDate { row: event.row, date });
            }
            Some(_) => kept.push(event),
        }
    }

    if tables.rejected_future > 0 {
        log::warn!("{} payment rows dated after {cutoff} left out of period tables", tables.rejected_future);
    }

    tables.daily = group(&kept, Granularity::Day);
    tables.weekly = group(&kept, Granularity::IsoWeek);
    tables.monthly = group(&kept, Granularity::Month);
    tables.yearly = group(&kept, Granularity::Year);
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn event(row: usize, code: Option<i64>, name: &str, amount: i64, d: Option<&str>) -> PaymentEvent {
        PaymentEvent {
            row,
            consumer_name: name.into(),
            normalized_name: name.into(),
            member_code: code,
            amount_cents: amount,
            date: d.map(date),
            status: "active".into(),
        }
    }

    fn run(events: &[PaymentEvent], as_of: &str, tolerance: u32) -> (PeriodTables, Vec<Diagnostic>) {
        let mut diags = Vec::new();
        let t = aggregate_periods(events, date(as_of), tolerance, |_| false, &mut diags);
        (t, diags)
    }

    #[test]
    fn keys_per_granularity() {
        let d = date("2021-01-03");
        assert_eq!(period_key(d, Granularity::Day), "2021-01-03");
        // 2021-01-03 is a Sunday in ISO week 53 of 2020
        assert_eq!(period_key(d, Granularity::IsoWeek), "2020-W53");
        assert_eq!(period_key(d, Granularity::Month), "2021-01");
        assert_eq!(period_key(d, Granularity::Year), "2021");
        assert_eq!(period_key(date("2026-03-02"), Granularity::IsoWeek), "2026-W10");
    }

    #[test]
    fn groups_and_counts_distinct_members() {
        let events = vec![
            event(1, Some(1), "ANA", 100, Some("2026-01-05")),
            event(2, Some(1), "ANA", 200, Some("2026-01-05")),
            event(3, None, "BETO", 50, Some("2026-01-06")),
            event(4, Some(2), "CARLA", 25, Some("2026-02-01")),
        ];
        let (t, diags) = run(&events, "2026-03-01", 0);
        assert!(diags.is_empty());
        assert_eq!(t.daily.len(), 3);
        assert_eq!(t.daily[0].period_key, "2026-01-05");
        assert_eq!(t.daily[0].total_amount_cents, 300);
        assert_eq!(t.daily[0].payment_count, 2);
        assert_eq!(t.daily[0].distinct_member_count, 1);

        assert_eq!(t.weekly.len(), 2);
        assert_eq!(t.weekly[0].period_key, "2026-W02");
        assert_eq!(t.weekly[0].distinct_member_count, 2);

        let jan = &t.table(Granularity::Month)[0];
        assert_eq!((jan.period_key.as_str(), jan.total_amount_cents), ("2026-01", 350));
        assert_eq!(t.yearly.len(), 1);
        assert_eq!(t.yearly[0].distinct_member_count, 3);
    }

    #[test]
    fn future_dates_are_rejected_not_grouped() {
        let events = vec![
            event(1, Some(1), "ANA", 100, Some("2026-01-05")),
            event(2, Some(1), "ANA", 999, Some("2026-01-08")),
            event(3, Some(1), "ANA", 5, None),
        ];
        let (t, diags) = run(&events, "2026-01-06", 0);
        assert_eq!(t.rejected_future, 1);
        assert_eq!(t.undated, 1);
        assert_eq!(t.daily.len(), 1);
        assert_eq!(t.monthly[0].total_amount_cents, 100);
        assert_eq!(diags, vec![Diagnostic::FutureDate { row: 2, date: date("2026-01-08") }]);
    }

    #[test]
    fn tolerance_extends_cutoff() {
        let events = vec![event(1, Some(1), "ANA", 100, Some("2026-01-07"))];
        assert_eq!(run(&events, "2026-01-06", 0).0.rejected_future, 1);
        assert_eq!(run(&events, "2026-01-06", 1).0.rejected_future, 0);
        // the as_of day itself is never in the future
        assert_eq!(run(&events, "2026-01-07", 0).0.daily.len(), 1);
    }

    #[test]
    fn skipped_events_are_ignored() {
        let events = vec![
            event(1, Some(1), "ANA", 100, Some("2026-01-05")),
            event(2, Some(2), "BETO", 100, Some("2099-01-05")),
        ];
        let mut diags = Vec::new();
        let t = aggregate_periods(&events, date("2026-02-01"), 0, |e| e.member_code == Some(2), &mut diags);
        assert_eq!(t.rejected_future, 0);
        assert!(diags.is_empty());
        assert_eq!(t.daily.len(), 1);
    }
}
