use chrono::NaiveDate;
use serde::Serialize;

use crate::table::Table;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Pre-loaded tables for one run. `roster` and `installments` are only
/// read when the config declares them.
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    pub arrears: Table,
    pub payments: Table,
    pub roster: Option<Table>,
    pub installments: Option<Table>,
}

// ---------------------------------------------------------------------------
// Installment plan + aging
// ---------------------------------------------------------------------------

/// Structured form of a free-text plan descriptor such as "25 CUOTAS 38.50".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct InstallmentPlan {
    pub installment_count: Option<u32>,
    pub installment_amount_cents: Option<i64>,
}

impl InstallmentPlan {
    pub fn is_empty(&self) -> bool {
        self.installment_count.is_none() && self.installment_amount_cents.is_none()
    }

    /// `count * amount` when both are known.
    pub fn computed_total_cents(&self) -> Option<i64> {
        match (self.installment_count, self.installment_amount_cents) {
            (Some(n), Some(amount)) => amount.checked_mul(i64::from(n)),
            _ => None,
        }
    }

    /// Expected monthly installment: the plan amount when positive,
    /// otherwise `total_owed / count` rounded half up to the cent.
    pub fn monthly_installment_cents(&self, total_owed_cents: i64) -> Option<i64> {
        match (self.installment_count, self.installment_amount_cents) {
            (_, Some(amount)) if amount > 0 => Some(amount),
            (Some(n), _) if n > 0 && total_owed_cents > 0 => {
                let n = i64::from(n);
                let (q, r) = (total_owed_cents / n, total_owed_cents % n);
                Some(q + i64::from(r * 2 >= n))
            }
            _ => None,
        }
    }
}

/// Delinquency age proxy. Ordering follows elapsed time, with
/// `Unclassified` last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AgingBucket {
    #[serde(rename = "0_30_days")]
    Days0To30,
    #[serde(rename = "31_60_days")]
    Days31To60,
    #[serde(rename = "61_90_days")]
    Days61To90,
    #[serde(rename = "91_120_days")]
    Days91To120,
    #[serde(rename = "over_121_days")]
    Over121Days,
    #[serde(rename = "unclassified")]
    Unclassified,
}

impl std::fmt::Display for AgingBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Days0To30 => write!(f, "0–30 days"),
            Self::Days31To60 => write!(f, "31–60 days"),
            Self::Days61To90 => write!(f, "61–90 days"),
            Self::Days91To120 => write!(f, "91–120 days"),
            Self::Over121Days => write!(f, "over 121 days"),
            Self::Unclassified => write!(f, "unclassified"),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-member facts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRecord {
    pub member_code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Fallback join key only; never displayed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrearsFact {
    pub total_owed_cents: i64,
    pub aging_bucket: AgingBucket,
    pub plan: InstallmentPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_known_date: Option<NaiveDate>,
    /// Number of arrears rows merged into this fact.
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentFact {
    pub total_paid_cents: i64,
    pub payment_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_payment_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_payment_date: Option<NaiveDate>,
    pub last_status_flag: String,
}

/// Member standing after reconciliation. Declaration order is report
/// priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Standing {
    InArrearsAlsoPaying,
    StillInArrears,
    CurrentAlsoPaying,
    LedgerOnly,
    InsufficientInformation,
}

impl Standing {
    pub const ALL: [Standing; 5] = [
        Self::InArrearsAlsoPaying,
        Self::StillInArrears,
        Self::CurrentAlsoPaying,
        Self::LedgerOnly,
        Self::InsufficientInformation,
    ];
}

impl std::fmt::Display for Standing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InArrearsAlsoPaying => write!(f, "in arrears, also paying"),
            Self::StillInArrears => write!(f, "still in arrears"),
            Self::CurrentAlsoPaying => write!(f, "current, also paying"),
            Self::LedgerOnly => write!(f, "ledger-only"),
            Self::InsufficientInformation => write!(f, "insufficient information"),
        }
    }
}

/// One canonical member with both sides of the join. A missing side stays
/// `None`; it is only read as zero when classifying and computing the
/// balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciledMember {
    pub member: MemberRecord,
    pub arrears: Option<ArrearsFact>,
    pub payments: Option<PaymentFact>,
    pub outstanding_balance_cents: i64,
    pub classification: Standing,
}

impl ReconciledMember {
    pub fn member_code(&self) -> i64 {
        self.member.member_code
    }

    pub fn total_owed_cents(&self) -> i64 {
        self.arrears.as_ref().map_or(0, |a| a.total_owed_cents)
    }

    pub fn total_paid_cents(&self) -> i64 {
        self.payments.as_ref().map_or(0, |p| p.total_paid_cents)
    }

    pub fn aging_bucket(&self) -> Option<AgingBucket> {
        self.arrears.as_ref().map(|a| a.aging_bucket)
    }

    pub fn last_known_date(&self) -> Option<NaiveDate> {
        self.arrears.as_ref().and_then(|a| a.last_known_date)
    }

    /// Monthly installment expected from this member's arrears plan.
    pub fn monthly_provision_cents(&self) -> Option<i64> {
        self.arrears
            .as_ref()
            .and_then(|a| a.plan.monthly_installment_cents(a.total_owed_cents))
    }
}

// ---------------------------------------------------------------------------
// Payment events
// ---------------------------------------------------------------------------

/// A single payment-ledger row after name normalization and linking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentEvent {
    /// 1-based data row number in the payments table.
    pub row: usize,
    pub consumer_name: String,
    pub normalized_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_code: Option<i64>,
    pub amount_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    /// No roster table configured, so nothing can be linked.
    NoRoster,
    /// Blank consumer name.
    BlankName,
    /// Normalized name not present in the roster.
    NoRosterMatch,
    /// Normalized name maps to more than one roster code.
    AmbiguousName,
}

/// A payment row that could not be tied to a member. Kept for manual
/// review; it contributes to no member's totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedPayment {
    pub row: usize,
    pub consumer_name: String,
    pub normalized_name: String,
    pub amount_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub reason: UnmatchedReason,
}

/// Ledger view per normalized consumer name, linked or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerConsumer {
    pub normalized_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_code: Option<i64>,
    #[serde(flatten)]
    pub fact: PaymentFact,
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSummary {
    pub bucket: AgingBucket,
    pub label: String,
    pub member_count: usize,
    pub row_count: usize,
    pub installment_count: u64,
    pub total_owed_cents: i64,
    pub total_paid_cents: i64,
    pub outstanding_cents: i64,
    pub pct_owed: f64,
    pub pct_members: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandingSummary {
    pub classification: Standing,
    pub label: String,
    pub member_count: usize,
    pub total_owed_cents: i64,
    pub total_paid_cents: i64,
    pub outstanding_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    IsoWeek,
    Month,
    Year,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodSummary {
    pub period_key: String,
    pub total_amount_cents: i64,
    pub payment_count: usize,
    pub distinct_member_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeriodTables {
    pub daily: Vec<PeriodSummary>,
    pub weekly: Vec<PeriodSummary>,
    pub monthly: Vec<PeriodSummary>,
    pub yearly: Vec<PeriodSummary>,
    /// Events dated after the run's `as_of` (plus tolerance).
    pub rejected_future: usize,
    /// Events with no usable date in any configured date column.
    pub undated: usize,
}

impl PeriodTables {
    pub fn table(&self, granularity: Granularity) -> &[PeriodSummary] {
        match granularity {
            Granularity::Day => &self.daily,
            Granularity::IsoWeek => &self.weekly,
            Granularity::Month => &self.monthly,
            Granularity::Year => &self.yearly,
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    ExcludedStatus { status: String },
    TooManyPending { pending: usize, max_pending: usize },
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExcludedStatus { status } => write!(f, "has installment with status {status}"),
            Self::TooManyPending { pending, max_pending } => {
                write!(f, "{pending} pending installments (limit {max_pending})")
            }
        }
    }
}

/// Recoverable, row-level findings. A run that produces these still
/// completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    UnmatchedPayment { row: usize, consumer_name: String, reason: UnmatchedReason },
    AmbiguousName { normalized_name: String, member_codes: Vec<i64> },
    MalformedDate { table: String, row: usize, column: String, value: String },
    FutureDate { row: usize, date: NaiveDate },
    UnparseableInstallment { row: usize, member_code: i64, text: String },
    DuplicateCodeMerged { table: String, member_code: i64, rows: usize },
    DuplicateRosterCode { member_code: i64, rows: usize },
    InvalidMemberCode { table: String, row: usize, value: String },
    InvalidAmount { table: String, row: usize, column: String, value: String },
    NegativeAmount { table: String, row: usize, column: String, value: String },
    PlanBackfilled { row: usize, member_code: i64, text: String },
    MemberExcluded { member_code: i64, reason: ExclusionReason },
}

impl Diagnostic {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnmatchedPayment { .. } => "unmatched_payment",
            Self::AmbiguousName { .. } => "ambiguous_name",
            Self::MalformedDate { .. } => "malformed_date",
            Self::FutureDate { .. } => "future_date",
            Self::UnparseableInstallment { .. } => "unparseable_installment",
            Self::DuplicateCodeMerged { .. } => "duplicate_code_merged",
            Self::DuplicateRosterCode { .. } => "duplicate_roster_code",
            Self::InvalidMemberCode { .. } => "invalid_member_code",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::NegativeAmount { .. } => "negative_amount",
            Self::PlanBackfilled { .. } => "plan_backfilled",
            Self::MemberExcluded { .. } => "member_excluded",
        }
    }
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ReconSummary {
    pub arrears_rows: usize,
    pub payment_rows: usize,
    pub members: usize,
    pub members_with_arrears: usize,
    pub members_with_payments: usize,
    pub linked_payment_rows: usize,
    pub unmatched_payment_rows: usize,
    pub excluded_members: usize,
    pub total_owed_cents: i64,
    pub total_paid_cents: i64,
    pub outstanding_cents: i64,
    /// Sum of expected monthly installments across members with a plan.
    pub provision_cents: i64,
    pub diagnostic_counts: std::collections::BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub engine_version: String,
    pub as_of: NaiveDate,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    pub members: Vec<ReconciledMember>,
    pub buckets: Vec<BucketSummary>,
    pub classifications: Vec<StandingSummary>,
    pub periods: PeriodTables,
    pub ledger: Vec<LedgerConsumer>,
    pub unmatched_payments: Vec<UnmatchedPayment>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ReconResult {
    pub fn member(&self, member_code: i64) -> Option<&ReconciledMember> {
        self.members.iter().find(|m| m.member_code() == member_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(count: Option<u32>, amount: Option<i64>) -> InstallmentPlan {
        InstallmentPlan { installment_count: count, installment_amount_cents: amount }
    }

    #[test]
    fn monthly_installment_prefers_plan_amount() {
        assert_eq!(plan(Some(25), Some(3850)).monthly_installment_cents(100_000), Some(3850));
        assert_eq!(plan(None, Some(3850)).monthly_installment_cents(0), Some(3850));
    }

    #[test]
    fn monthly_installment_falls_back_to_owed_over_count() {
        assert_eq!(plan(Some(4), None).monthly_installment_cents(20_000), Some(5_000));
        assert_eq!(plan(Some(3), Some(0)).monthly_installment_cents(10_000), Some(3_333));
        assert_eq!(plan(Some(3), None).monthly_installment_cents(20_000), Some(6_667));
        assert_eq!(plan(Some(3), None).monthly_installment_cents(0), None);
        assert_eq!(plan(None, None).monthly_installment_cents(20_000), None);
    }
}
