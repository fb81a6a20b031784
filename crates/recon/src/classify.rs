use crate::config::PolicyConfig;
use crate::model::Standing;

/// Classify one member from its raw totals.
///
/// `has_arrears` reads the raw owed amount, not the outstanding balance: a
/// member who has paid everything off still counts as in arrears when the
/// arrears table lists a debt. Missing sides read as zero.
pub fn classify_standing(
    total_owed_cents: i64,
    total_paid_cents: i64,
    last_status_flag: Option<&str>,
    policy: &PolicyConfig,
) -> Standing {
    let has_arrears = total_owed_cents > policy.epsilon_cents;
    let has_paid = total_paid_cents > policy.epsilon_cents;
    let pays_in_ledger = has_paid && last_status_flag.is_some_and(|s| policy.is_paying_status(s));

    match (has_arrears, pays_in_ledger) {
        (true, true) => Standing::InArrearsAlsoPaying,
        (true, false) => Standing::StillInArrears,
        (false, true) => Standing::CurrentAlsoPaying,
        (false, false) if has_paid => Standing::LedgerOnly,
        (false, false) => Standing::InsufficientInformation,
    }
}

/// Outstanding balance, floored at zero. Overpayment is not carried as
/// credit.
pub fn outstanding_balance(total_owed_cents: i64, total_paid_cents: i64) -> i64 {
    total_owed_cents.saturating_sub(total_paid_cents).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(owed: i64, paid: i64, status: Option<&str>) -> Standing {
        classify_standing(owed, paid, status, &PolicyConfig::default())
    }

    #[test]
    fn truth_table() {
        assert_eq!(classify(15000, 5000, Some("active")), Standing::InArrearsAlsoPaying);
        assert_eq!(classify(15000, 0, None), Standing::StillInArrears);
        assert_eq!(classify(15000, 5000, Some("expired")), Standing::StillInArrears);
        assert_eq!(classify(0, 5000, Some("confirm")), Standing::CurrentAlsoPaying);
        assert_eq!(classify(0, 5000, Some("cancelled")), Standing::LedgerOnly);
        assert_eq!(classify(0, 0, None), Standing::InsufficientInformation);
    }

    #[test]
    fn paid_off_debt_is_still_in_arrears_also_paying() {
        // balance is zero but the raw owed amount drives the label
        assert_eq!(outstanding_balance(15000, 15000), 0);
        assert_eq!(classify(15000, 15000, Some("active")), Standing::InArrearsAlsoPaying);
    }

    #[test]
    fn epsilon_is_strict() {
        assert_eq!(classify(1, 0, None), Standing::InsufficientInformation);
        assert_eq!(classify(2, 0, None), Standing::StillInArrears);
        assert_eq!(classify(0, 1, Some("active")), Standing::InsufficientInformation);
    }

    #[test]
    fn status_compare_ignores_case() {
        assert_eq!(classify(0, 500, Some(" ACTIVE ")), Standing::CurrentAlsoPaying);
    }

    #[test]
    fn paying_status_with_zero_paid_is_not_paying() {
        assert_eq!(classify(0, 0, Some("active")), Standing::InsufficientInformation);
    }

    #[test]
    fn custom_epsilon() {
        let policy = PolicyConfig { epsilon_cents: 100, ..PolicyConfig::default() };
        assert_eq!(classify_standing(100, 0, None, &policy), Standing::InsufficientInformation);
        assert_eq!(classify_standing(101, 0, None, &policy), Standing::StillInArrears);
    }

    #[test]
    fn balance_is_never_negative() {
        assert_eq!(outstanding_balance(100, 500), 0);
        assert_eq!(outstanding_balance(500, 100), 400);
        assert_eq!(outstanding_balance(i64::MIN, i64::MAX), 0);
        assert_eq!(outstanding_balance(-50, 0), 0);
    }
}
