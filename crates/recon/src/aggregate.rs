use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::classify::{classify_standing, outstanding_balance};
use crate::config::PolicyConfig;
use crate::identity::normalize_name;
use crate::model::{
    AgingBucket, ArrearsFact, BucketSummary, LedgerConsumer, MemberRecord, PaymentEvent,
    PaymentFact, ReconciledMember, Standing, StandingSummary,
};

// ---------------------------------------------------------------------------
// Payment facts
// ---------------------------------------------------------------------------

/// Running totals for one group of payment events.
///
/// The status flag is taken from the greatest `(date, status)` pair seen,
/// so the outcome does not depend on row order. Undated rows sort below
/// every dated row.
#[derive(Debug, Default)]
struct PaymentAccumulator {
    total: i64,
    count: usize,
    first: Option<NaiveDate>,
    last: Option<NaiveDate>,
    status_key: Option<(Option<NaiveDate>, String, String)>,
}

impl PaymentAccumulator {
    fn push(&mut self, event: &PaymentEvent) {
        self.total = self.total.saturating_add(event.amount_cents);
        self.count += 1;
        if let Some(d) = event.date {
            self.first = Some(self.first.map_or(d, |f| f.min(d)));
            self.last = Some(self.last.map_or(d, |l| l.max(d)));
        }
        let key = (event.date, event.status.to_lowercase(), event.status.clone());
        if self.status_key.as_ref().map_or(true, |k| key > *k) {
            self.status_key = Some(key);
        }
    }

    fn finish(self) -> PaymentFact {
        PaymentFact {
            total_paid_cents: self.total,
            payment_count: self.count,
            first_payment_date: self.first,
            last_payment_date: self.last,
            last_status_flag: self.status_key.map(|(_, _, s)| s).unwrap_or_default(),
        }
    }
}

/// Sum linked payment events per member code. Unlinked events are skipped.
pub fn summarize_payments(events: &[PaymentEvent]) -> BTreeMap<i64, PaymentFact> {
    let mut acc: BTreeMap<i64, PaymentAccumulator> = BTreeMap::new();
    for event in events {
        if let Some(code) = event.member_code {
            acc.entry(code).or_default().push(event);
        }
    }
    acc.into_iter().map(|(code, a)| (code, a.finish())).collect()
}

/// Ledger view grouped by normalized consumer name, linked or not.
/// Rows with a blank name are left out.
pub fn ledger_summary(events: &[PaymentEvent]) -> Vec<LedgerConsumer> {
    let mut acc: BTreeMap<&str, (Option<i64>, PaymentAccumulator)> = BTreeMap::new();
    for event in events.iter().filter(|e| !e.normalized_name.is_empty()) {
        let entry = acc.entry(event.normalized_name.as_str()).or_default();
        entry.0 = entry.0.or(event.member_code);
        entry.1.push(event);
    }
    acc.into_iter()
        .map(|(name, (member_code, a))| LedgerConsumer {
            normalized_name: name.to_string(),
            member_code,
            fact: a.finish(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Join both sides for every canonical member, classify, and order for
/// reporting.
pub fn reconcile_members(
    members: &BTreeMap<i64, MemberRecord>,
    arrears: &BTreeMap<i64, ArrearsFact>,
    payments: &BTreeMap<i64, PaymentFact>,
    policy: &PolicyConfig,
) -> Vec<ReconciledMember> {
    let mut out: Vec<ReconciledMember> = members
        .values()
        .map(|member| {
            let arrears = arrears.get(&member.member_code).cloned();
            let payments = payments.get(&member.member_code).cloned();
            let owed = arrears.as_ref().map_or(0, |a| a.total_owed_cents);
            let paid = payments.as_ref().map_or(0, |p| p.total_paid_cents);
            let status = payments.as_ref().map(|p| p.last_status_flag.as_str());
            ReconciledMember {
                member: member.clone(),
                outstanding_balance_cents: outstanding_balance(owed, paid),
                classification: classify_standing(owed, paid, status, policy),
                arrears,
                payments,
            }
        })
        .collect();
    sort_for_report(&mut out);
    out
}

/// Label priority, then `total_owed` descending, then code ascending.
pub fn sort_for_report(members: &mut [ReconciledMember]) {
    members.sort_by(|a, b| {
        a.classification
            .cmp(&b.classification)
            .then_with(|| b.total_owed_cents().cmp(&a.total_owed_cents()))
            .then_with(|| a.member_code().cmp(&b.member_code()))
    });
}

// ---------------------------------------------------------------------------
// Bucket + standing tables
// ---------------------------------------------------------------------------

fn percent(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Per-bucket table over members that have an arrears side. Only non-empty
/// buckets are listed, in bucket order. Percentages are computed over the
/// slice passed in, so a filtered slice gets its own denominators.
pub fn summarize_buckets(members: &[ReconciledMember]) -> Vec<BucketSummary> {
    let mut groups: BTreeMap<AgingBucket, BucketSummary> = BTreeMap::new();
    let mut grand_owed = 0i64;
    let mut grand_members = 0i64;

    for m in members {
        let Some(ref a) = m.arrears else { continue };
        grand_owed = grand_owed.saturating_add(a.total_owed_cents);
        grand_members += 1;
        let g = groups.entry(a.aging_bucket).or_insert_with(|| BucketSummary {
            bucket: a.aging_bucket,
            label: a.aging_bucket.to_string(),
            member_count: 0,
            row_count: 0,
            installment_count: 0,
            total_owed_cents: 0,
            total_paid_cents: 0,
            outstanding_cents: 0,
            pct_owed: 0.0,
            pct_members: 0.0,
        });
        g.member_count += 1;
        g.row_count += a.row_count;
        g.installment_count += u64::from(a.plan.installment_count.unwrap_or(0));
        g.total_owed_cents = g.total_owed_cents.saturating_add(a.total_owed_cents);
        g.total_paid_cents = g.total_paid_cents.saturating_add(m.total_paid_cents());
        g.outstanding_cents = g.outstanding_cents.saturating_add(m.outstanding_balance_cents);
    }

    groups
        .into_values()
        .map(|mut g| {
            g.pct_owed = percent(g.total_owed_cents, grand_owed);
            g.pct_members = percent(g.member_count as i64, grand_members);
            g
        })
        .collect()
}

/// One row per standing label, in priority order, including empty labels.
pub fn summarize_standings(members: &[ReconciledMember]) -> Vec<StandingSummary> {
    Standing::ALL
        .iter()
        .map(|&s| {
            let group = members.iter().filter(|m| m.classification == s);
            let mut row = StandingSummary {
                classification: s,
                label: s.to_string(),
                member_count: 0,
                total_owed_cents: 0,
                total_paid_cents: 0,
                outstanding_cents: 0,
            };
            for m in group {
                row.member_count += 1;
                row.total_owed_cents = row.total_owed_cents.saturating_add(m.total_owed_cents());
                row.total_paid_cents = row.total_paid_cents.saturating_add(m.total_paid_cents());
                row.outstanding_cents =
                    row.outstanding_cents.saturating_add(m.outstanding_balance_cents);
            }
            row
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Narrow a reconciled member set. All set criteria must hold.
///
/// Date criteria read `last_known_date` from the arrears side; a member
/// without one never passes a date criterion.
#[derive(Debug, Clone, Default)]
pub struct MemberFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub year: Option<i32>,
    pub year_month: Option<(i32, u32)>,
    pub bucket: Option<AgingBucket>,
    pub classification: Option<Standing>,
    /// Matched against the member code and the normalized display name.
    pub search: Option<String>,
}

/// A filtered member set with its aggregates recomputed.
#[derive(Debug, Clone, Serialize)]
pub struct FilteredView {
    pub members: Vec<ReconciledMember>,
    pub buckets: Vec<BucketSummary>,
    pub classifications: Vec<StandingSummary>,
}

impl MemberFilter {
    pub fn is_empty(&self) -> bool {
        self.date_from.is_none()
            && self.date_to.is_none()
            && self.year.is_none()
            && self.year_month.is_none()
            && self.bucket.is_none()
            && self.classification.is_none()
            && self.search.as_deref().map_or(true, |s| s.trim().is_empty())
    }

    fn has_date_criteria(&self) -> bool {
        self.date_from.is_some() || self.date_to.is_some() || self.year.is_some() || self.year_month.is_some()
    }

    pub fn matches(&self, m: &ReconciledMember) -> bool {
        if self.has_date_criteria() {
            let Some(d) = m.last_known_date() else {
                return false;
            };
            if self.date_from.is_some_and(|from| d < from)
                || self.date_to.is_some_and(|to| d > to)
                || self.year.is_some_and(|y| d.year() != y)
                || self.year_month.is_some_and(|(y, mo)| d.year() != y || d.month() != mo)
            {
                return false;
            }
        }

        if let Some(bucket) = self.bucket {
            if m.aging_bucket() != Some(bucket) {
                return false;
            }
        }

        if let Some(standing) = self.classification {
            if m.classification != standing {
                return false;
            }
        }

        if let Some(query) = self.search.as_deref().map(normalize_name).filter(|q| !q.is_empty()) {
            let code_hit = m.member_code().to_string().contains(&query);
            let name_hit = m
                .member
                .normalized_name
                .as_deref()
                .is_some_and(|n| n.contains(&query));
            if !code_hit && !name_hit {
                return false;
            }
        }

        true
    }

    pub fn apply(&self, members: &[ReconciledMember]) -> FilteredView {
        let members: Vec<ReconciledMember> =
            members.iter().filter(|m| self.matches(m)).cloned().collect();
        FilteredView {
            buckets: summarize_buckets(&members),
            classifications: summarize_standings(&members),
            members,
        }
    }
}

/// Distinct calendar years present in `last_known_date`, for building
/// filter choices.
pub fn known_years(members: &[ReconciledMember]) -> Vec<i32> {
    members
        .iter()
        .filter_map(|m| m.last_known_date().map(|d| d.year()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aging::bucket_for;
    use crate::model::InstallmentPlan;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn event(code: Option<i64>, name: &str, amount: i64, d: Option<&str>, status: &str) -> PaymentEvent {
        PaymentEvent {
            row: 1,
            consumer_name: name.into(),
            normalized_name: normalize_name(name),
            member_code: code,
            amount_cents: amount,
            date: d.map(date),
            status: status.into(),
        }
    }

    fn arrears(owed: i64, count: Option<u32>, d: Option<&str>) -> ArrearsFact {
        ArrearsFact {
            total_owed_cents: owed,
            aging_bucket: bucket_for(count),
            plan: InstallmentPlan { installment_count: count, installment_amount_cents: None },
            last_known_date: d.map(date),
            row_count: 1,
        }
    }

    fn member(code: i64, name: &str) -> MemberRecord {
        MemberRecord {
            member_code: code,
            display_name: Some(name.into()),
            normalized_name: Some(normalize_name(name)),
        }
    }

    fn reconciled(entries: &[(i64, &str, Option<ArrearsFact>, i64, &str)]) -> Vec<ReconciledMember> {
        let mut members = BTreeMap::new();
        let mut arrears_map = BTreeMap::new();
        let mut events = Vec::new();
        for (code, name, a, paid, status) in entries {
            members.insert(*code, member(*code, name));
            if let Some(a) = a {
                arrears_map.insert(*code, a.clone());
            }
            if *paid > 0 {
                events.push(event(Some(*code), name, *paid, Some("2026-01-05"), status));
            }
        }
        let payments = summarize_payments(&events);
        reconcile_members(&members, &arrears_map, &payments, &PolicyConfig::default())
    }

    #[test]
    fn payment_fact_tracks_range_and_latest_status() {
        let events = vec![
            event(Some(1), "ANA", 1000, Some("2026-03-01"), "expired"),
            event(Some(1), "ANA", 500, Some("2026-01-15"), "active"),
            event(Some(1), "ANA", 250, None, "zzz"),
            event(None, "BETO", 999, Some("2026-01-01"), "active"),
        ];
        let facts = summarize_payments(&events);
        assert_eq!(facts.len(), 1);
        let f = &facts[&1];
        assert_eq!(f.total_paid_cents, 1750);
        assert_eq!(f.payment_count, 3);
        assert_eq!(f.first_payment_date, Some(date("2026-01-15")));
        assert_eq!(f.last_payment_date, Some(date("2026-03-01")));
        // undated row never outranks a dated one
        assert_eq!(f.last_status_flag, "expired");
    }

    #[test]
    fn same_day_status_tie_is_order_independent() {
        let a = event(Some(1), "ANA", 100, Some("2026-02-01"), "active");
        let b = event(Some(1), "ANA", 100, Some("2026-02-01"), "confirm");
        let forward = summarize_payments(&[a.clone(), b.clone()]);
        let backward = summarize_payments(&[b, a]);
        assert_eq!(forward, backward);
        assert_eq!(forward[&1].last_status_flag, "confirm");
    }

    #[test]
    fn ledger_groups_by_normalized_name() {
        let events = vec![
            event(None, "beto  ruiz", 100, Some("2026-01-01"), "active"),
            event(None, "BETO RUIZ", 200, Some("2026-01-02"), "active"),
            event(Some(7), "ANA", 50, None, "active"),
            event(None, "  ", 10, None, "active"),
        ];
        let ledger = ledger_summary(&events);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].normalized_name, "ANA");
        assert_eq!(ledger[0].member_code, Some(7));
        assert_eq!(ledger[1].normalized_name, "BETO RUIZ");
        assert_eq!(ledger[1].fact.total_paid_cents, 300);
        assert_eq!(ledger[1].member_code, None);
    }

    #[test]
    fn report_order_is_priority_then_owed_then_code() {
        let out = reconciled(&[
            (5, "E", None, 0, ""),
            (4, "D", Some(arrears(100, Some(1), None)), 0, ""),
            (3, "C", Some(arrears(900, Some(1), None)), 0, ""),
            (2, "B", Some(arrears(900, Some(1), None)), 0, ""),
            (1, "A", Some(arrears(100, Some(1), None)), 50, "active"),
        ]);
        let codes: Vec<i64> = out.iter().map(|m| m.member_code()).collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5]);
        assert_eq!(out[0].classification, Standing::InArrearsAlsoPaying);
        assert_eq!(out[4].classification, Standing::InsufficientInformation);
    }

    #[test]
    fn overpayment_clips_to_zero() {
        let out = reconciled(&[(1, "A", Some(arrears(100, Some(1), None)), 500, "active")]);
        assert_eq!(out[0].outstanding_balance_cents, 0);
    }

    #[test]
    fn bucket_table_skips_empty_buckets_and_payment_only_members() {
        let out = reconciled(&[
            (1, "A", Some(arrears(7500, Some(1), None)), 0, ""),
            (2, "B", Some(arrears(2500, Some(3), None)), 1000, "active"),
            (3, "C", None, 400, "active"),
        ]);
        let buckets = summarize_buckets(&out);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].bucket, AgingBucket::Days0To30);
        assert_eq!(buckets[0].pct_owed, 75.0);
        assert_eq!(buckets[1].bucket, AgingBucket::Days61To90);
        assert_eq!(buckets[1].installment_count, 3);
        assert_eq!(buckets[1].total_paid_cents, 1000);
        assert_eq!(buckets[1].outstanding_cents, 1500);
        assert_eq!(buckets[1].pct_members, 50.0);
    }

    #[test]
    fn bucket_percentages_with_zero_total() {
        let out = reconciled(&[(1, "A", Some(arrears(0, None, None)), 0, "")]);
        let buckets = summarize_buckets(&out);
        assert_eq!(buckets[0].pct_owed, 0.0);
        assert_eq!(buckets[0].pct_members, 100.0);
    }

    #[test]
    fn standing_table_lists_every_label() {
        let out = reconciled(&[
            (1, "A", Some(arrears(100, Some(1), None)), 0, ""),
            (2, "B", None, 300, "active"),
        ]);
        let table = summarize_standings(&out);
        assert_eq!(table.len(), 5);
        assert_eq!(table[1].classification, Standing::StillInArrears);
        assert_eq!(table[1].member_count, 1);
        assert_eq!(table[2].total_paid_cents, 300);
        assert_eq!(table[0].member_count, 0);
    }

    #[test]
    fn filter_recomputes_percentages() {
        let out = reconciled(&[
            (1, "Ana Luz", Some(arrears(3000, Some(1), Some("2025-06-10"))), 0, ""),
            (2, "Beto", Some(arrears(1000, Some(6), Some("2026-02-01"))), 0, ""),
            (3, "Carla", Some(arrears(1000, Some(6), Some("2026-02-20"))), 0, ""),
            (4, "Dario", None, 300, "active"),
        ]);
        assert_eq!(summarize_buckets(&out)[0].pct_owed, 60.0);

        let filter = MemberFilter { year: Some(2026), ..MemberFilter::default() };
        let view = filter.apply(&out);
        assert_eq!(view.members.len(), 2);
        assert_eq!(view.buckets.len(), 1);
        assert_eq!(view.buckets[0].bucket, AgingBucket::Over121Days);
        assert_eq!(view.buckets[0].pct_owed, 100.0);

        let filter = MemberFilter { year_month: Some((2026, 2)), date_to: Some(date("2026-02-10")), ..MemberFilter::default() };
        let codes: Vec<i64> = filter.apply(&out).members.iter().map(|m| m.member_code()).collect();
        assert_eq!(codes, vec![2]);
    }

    #[test]
    fn filter_by_bucket_standing_and_search() {
        let out = reconciled(&[
            (101, "Ana Luz", Some(arrears(3000, Some(1), None)), 0, ""),
            (202, "Beto", Some(arrears(1000, Some(6), None)), 0, ""),
            (303, "Carla", None, 300, "active"),
        ]);
        let by_bucket = MemberFilter { bucket: Some(AgingBucket::Days0To30), ..MemberFilter::default() };
        assert_eq!(by_bucket.apply(&out).members.len(), 1);

        let by_standing = MemberFilter { classification: Some(Standing::CurrentAlsoPaying), ..MemberFilter::default() };
        assert_eq!(by_standing.apply(&out).members[0].member_code(), 303);

        let by_name = MemberFilter { search: Some("ana  luz".into()), ..MemberFilter::default() };
        assert_eq!(by_name.apply(&out).members[0].member_code(), 101);

        let by_code = MemberFilter { search: Some("20".into()), ..MemberFilter::default() };
        assert_eq!(by_code.apply(&out).members[0].member_code(), 202);

        assert!(MemberFilter { search: Some(" ".into()), ..MemberFilter::default() }.is_empty());
        assert_eq!(MemberFilter::default().apply(&out).members.len(), 3);
    }

    #[test]
    fn known_years_are_distinct_and_sorted() {
        let out = reconciled(&[
            (1, "A", Some(arrears(1, None, Some("2026-01-01"))), 0, ""),
            (2, "B", Some(arrears(1, None, Some("2024-01-01"))), 0, ""),
            (3, "C", Some(arrears(1, None, Some("2026-05-01"))), 0, ""),
        ]);
        assert_eq!(known_years(&out), vec![2024, 2026]);
    }
}
