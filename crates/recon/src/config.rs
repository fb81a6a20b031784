use serde::Deserialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    pub name: String,
    pub arrears: ArrearsTable,
    pub payments: PaymentsTable,
    #[serde(default)]
    pub roster: Option<RosterTable>,
    #[serde(default)]
    pub installments: Option<InstallmentsTable>,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub eligibility: Option<EligibilityConfig>,
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// `file` is only read by the CLI (resolved relative to the config file);
/// the engine receives tables already loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct ArrearsTable {
    #[serde(default)]
    pub file: Option<String>,
    pub columns: ArrearsColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArrearsColumns {
    pub member_code: String,
    pub amount: String,
    #[serde(default)]
    pub plan_text: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsTable {
    #[serde(default)]
    pub file: Option<String>,
    pub columns: PaymentColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentColumns {
    pub consumer_name: String,
    pub amount: String,
    pub status: String,
    /// Candidate event-date columns, most authoritative first.
    pub dates: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterTable {
    #[serde(default)]
    pub file: Option<String>,
    pub columns: RosterColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterColumns {
    pub member_code: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallmentsTable {
    #[serde(default)]
    pub file: Option<String>,
    pub columns: InstallmentColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallmentColumns {
    pub member_code: String,
    pub status: String,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Which occurrence wins for categorical fields when a member code repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepPolicy {
    #[default]
    First,
    Last,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_paying_statuses")]
    pub paying_statuses: Vec<String>,
    #[serde(default = "default_epsilon_cents")]
    pub epsilon_cents: i64,
    #[serde(default)]
    pub duplicate_keep: KeepPolicy,
    #[serde(default)]
    pub backfill_plans: bool,
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
    #[serde(default)]
    pub future_tolerance_days: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            paying_statuses: default_paying_statuses(),
            epsilon_cents: default_epsilon_cents(),
            duplicate_keep: KeepPolicy::First,
            backfill_plans: false,
            date_formats: default_date_formats(),
            future_tolerance_days: 0,
        }
    }
}

impl PolicyConfig {
    /// Case-insensitive membership test against `paying_statuses`.
    pub fn is_paying_status(&self, status: &str) -> bool {
        let status = status.trim();
        self.paying_statuses
            .iter()
            .any(|s| s.trim().eq_ignore_ascii_case(status))
    }
}

fn default_paying_statuses() -> Vec<String> {
    vec!["active".into(), "confirm".into()]
}

fn default_epsilon_cents() -> i64 {
    1
}

fn default_date_formats() -> Vec<String> {
    [
        "%Y-%m-%d",
        "%d/%m/%Y",
        "%d-%m-%Y",
        "%Y/%m/%d",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

/// Member exclusion rules evaluated against the `[installments]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct EligibilityConfig {
    #[serde(default = "default_exclude_statuses")]
    pub exclude_statuses: Vec<String>,
    #[serde(default = "default_pending_status")]
    pub pending_status: String,
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            exclude_statuses: default_exclude_statuses(),
            pending_status: default_pending_status(),
            max_pending: default_max_pending(),
        }
    }
}

fn default_exclude_statuses() -> Vec<String> {
    vec!["MI".into()]
}

fn default_pending_status() -> String {
    "PEN".into()
}

fn default_max_pending() -> usize {
    24
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let mut declared: Vec<(&str, &str)> = vec![
            ("arrears.columns.member_code", self.arrears.columns.member_code.as_str()),
            ("arrears.columns.amount", self.arrears.columns.amount.as_str()),
            ("payments.columns.consumer_name", self.payments.columns.consumer_name.as_str()),
            ("payments.columns.amount", self.payments.columns.amount.as_str()),
            ("payments.columns.status", self.payments.columns.status.as_str()),
        ];
        if let Some(ref c) = self.arrears.columns.plan_text {
            declared.push(("arrears.columns.plan_text", c.as_str()));
        }
        if let Some(ref c) = self.arrears.columns.date {
            declared.push(("arrears.columns.date", c.as_str()));
        }
        for c in &self.payments.columns.dates {
            declared.push(("payments.columns.dates", c.as_str()));
        }
        if let Some(ref roster) = self.roster {
            declared.push(("roster.columns.member_code", roster.columns.member_code.as_str()));
            declared.push(("roster.columns.name", roster.columns.name.as_str()));
        }
        if let Some(ref inst) = self.installments {
            declared.push(("installments.columns.member_code", inst.columns.member_code.as_str()));
            declared.push(("installments.columns.status", inst.columns.status.as_str()));
        }

        for (key, column) in declared {
            if column.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!("{key} must not be empty")));
            }
        }

        if self.payments.columns.dates.is_empty() {
            return Err(ReconError::ConfigValidation(
                "payments.columns.dates needs at least one date column".into(),
            ));
        }

        if self.policy.paying_statuses.is_empty() {
            return Err(ReconError::ConfigValidation(
                "policy.paying_statuses must list at least one status".into(),
            ));
        }

        if self.policy.epsilon_cents < 0 {
            return Err(ReconError::ConfigValidation(format!(
                "policy.epsilon_cents must be >= 0, got {}",
                self.policy.epsilon_cents
            )));
        }

        if self.policy.date_formats.is_empty() {
            return Err(ReconError::ConfigValidation(
                "policy.date_formats must list at least one format".into(),
            ));
        }

        if self.eligibility.is_some() && self.installments.is_none() {
            return Err(ReconError::ConfigValidation(
                "[eligibility] requires an [installments] table".into(),
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name = "Mora vs Odoo"

[arrears.columns]
member_code = "Codigo socio"
amount      = "Monto total"

[payments.columns]
consumer_name = "CONSUMIDOR"
amount        = "MONTO"
status        = "ESTADO SOCIO"
dates         = ["FECHA APLICACION", "FECHA COMPROB."]
"#;

    #[test]
    fn parse_minimal_uses_defaults() {
        let config = ReconConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.name, "Mora vs Odoo");
        assert!(config.roster.is_none());
        assert!(config.arrears.columns.plan_text.is_none());
        assert_eq!(config.policy.paying_statuses, vec!["active", "confirm"]);
        assert_eq!(config.policy.epsilon_cents, 1);
        assert_eq!(config.policy.duplicate_keep, KeepPolicy::First);
        assert!(!config.policy.backfill_plans);
        assert_eq!(config.policy.date_formats[0], "%Y-%m-%d");
    }

    #[test]
    fn parse_full() {
        let input = format!(
            r#"{MINIMAL}
[arrears]
file = "mora.csv"

[roster]
file = "membership.csv"
[roster.columns]
member_code = "Codigo de socio"
name        = "Nombre"

[installments]
file = "cuotas.csv"
[installments.columns]
member_code = "socio_id"
status      = "estado"

[policy]
paying_statuses = ["active"]
duplicate_keep  = "last"
backfill_plans  = true
future_tolerance_days = 1

[eligibility]
max_pending = 12
"#
        );
        // `[arrears]` appears after `[arrears.columns]`; TOML allows that.
        let config = ReconConfig::from_toml(&input).unwrap();
        assert_eq!(config.arrears.file.as_deref(), Some("mora.csv"));
        assert_eq!(config.roster.as_ref().unwrap().columns.name, "Nombre");
        assert_eq!(config.policy.duplicate_keep, KeepPolicy::Last);
        assert!(config.policy.backfill_plans);
        assert_eq!(config.policy.future_tolerance_days, 1);
        let elig = config.eligibility.unwrap();
        assert_eq!(elig.max_pending, 12);
        assert_eq!(elig.exclude_statuses, vec!["MI"]);
        assert_eq!(elig.pending_status, "PEN");
    }

    #[test]
    fn paying_status_is_case_insensitive() {
        let policy = PolicyConfig::default();
        assert!(policy.is_paying_status("Active"));
        assert!(policy.is_paying_status(" CONFIRM "));
        assert!(!policy.is_paying_status("expired"));
        assert!(!policy.is_paying_status(""));
    }

    #[test]
    fn reject_empty_date_list() {
        let input = MINIMAL.replace(r#"["FECHA APLICACION", "FECHA COMPROB."]"#, "[]");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("payments.columns.dates"));
    }

    #[test]
    fn reject_blank_column_name() {
        let input = MINIMAL.replace(r#""CONSUMIDOR""#, r#""  ""#);
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("payments.columns.consumer_name"));
    }

    #[test]
    fn reject_eligibility_without_installments() {
        let input = format!("{MINIMAL}\n[eligibility]\nmax_pending = 10\n");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("[installments]"));
    }

    #[test]
    fn reject_unknown_keep_policy() {
        let input = format!("{MINIMAL}\n[policy]\nduplicate_keep = \"newest\"\n");
        assert!(ReconConfig::from_toml(&input).is_err());
    }

    #[test]
    fn missing_required_column_key_is_parse_error() {
        let input = MINIMAL.replace("status        = \"ESTADO SOCIO\"\n", "");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }
}
