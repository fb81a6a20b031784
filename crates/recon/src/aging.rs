//! Aging buckets from installment counts.
//!
//! Neither source carries a due date per installment, so the number of
//! outstanding installments stands in for elapsed delinquency, assuming one
//! installment per month. This is a heuristic: a member whose real elapsed
//! time disagrees with the count is still bucketed by the count.

use crate::model::AgingBucket;

/// Map an installment count to its bucket. Total over all inputs.
pub fn bucket_for(installment_count: Option<u32>) -> AgingBucket {
    match installment_count {
        None | Some(0) => AgingBucket::Unclassified,
        Some(1) => AgingBucket::Days0To30,
        Some(2) => AgingBucket::Days31To60,
        Some(3) => AgingBucket::Days61To90,
        Some(4 | 5) => AgingBucket::Days91To120,
        Some(_) => AgingBucket::Over121Days,
    }
}
