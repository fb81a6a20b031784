//! `mora recon` — config-driven arrears reconciliation.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};

use mora_recon::model::{AgingBucket, ReconInput, Standing};
use mora_recon::{MemberFilter, ReconConfig, Table};

use crate::exit_codes::EXIT_RECON_INVALID_CONFIG;
use crate::{report, CliError};

#[derive(Subcommand)]
pub enum ReconCommands {
    /// Run reconciliation from a TOML config file
    #[command(after_help = "\
Examples:
  mora recon run mora.recon.toml
  mora recon run mora.recon.toml --as-of 2026-03-31 --json
  mora recon run mora.recon.toml --output result.json --members-csv members.csv
  mora recon run mora.recon.toml --bucket over-121 --standing still-in-arrears")]
    Run {
        /// Path to the .recon.toml config file
        config: PathBuf,

        /// Reference date for rejecting future-dated payments (default: today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        as_of: Option<NaiveDate>,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write the reconciled member table as CSV
        #[arg(long, value_name = "FILE")]
        members_csv: Option<PathBuf>,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Validate a recon config without running
    #[command(after_help = "\
Examples:
  mora recon validate mora.recon.toml
  mora recon validate mora.recon.toml --inputs")]
    Validate {
        /// Path to the .recon.toml config file
        config: PathBuf,

        /// Also load the input files and check every declared column
        #[arg(long)]
        inputs: bool,
    },
}

/// Narrow the reported members. Bucket and standing tables are recomputed
/// over the members that remain; run-level summary counts are not.
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Keep members whose last known arrears date is on or after this date
    #[arg(long, value_name = "YYYY-MM-DD")]
    from: Option<NaiveDate>,

    /// Keep members whose last known arrears date is on or before this date
    #[arg(long, value_name = "YYYY-MM-DD")]
    to: Option<NaiveDate>,

    /// Keep members whose last known arrears date falls in this year
    #[arg(long)]
    year: Option<i32>,

    /// Keep members whose last known arrears date falls in this month
    #[arg(long, value_name = "YYYY-MM", value_parser = parse_year_month)]
    month: Option<(i32, u32)>,

    /// Keep members in this aging bucket
    #[arg(long, value_enum)]
    bucket: Option<BucketArg>,

    /// Keep members with this standing
    #[arg(long, value_enum)]
    standing: Option<StandingArg>,

    /// Keep members whose code or name contains this text
    #[arg(long)]
    search: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum BucketArg {
    #[value(name = "0-30")]
    Days0To30,
    #[value(name = "31-60")]
    Days31To60,
    #[value(name = "61-90")]
    Days61To90,
    #[value(name = "91-120")]
    Days91To120,
    #[value(name = "over-121")]
    Over121Days,
    Unclassified,
}

impl From<BucketArg> for AgingBucket {
    fn from(arg: BucketArg) -> Self {
        match arg {
            BucketArg::Days0To30 => AgingBucket::Days0To30,
            BucketArg::Days31To60 => AgingBucket::Days31To60,
            BucketArg::Days61To90 => AgingBucket::Days61To90,
            BucketArg::Days91To120 => AgingBucket::Days91To120,
            BucketArg::Over121Days => AgingBucket::Over121Days,
            BucketArg::Unclassified => AgingBucket::Unclassified,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StandingArg {
    InArrearsAlsoPaying,
    StillInArrears,
    CurrentAlsoPaying,
    LedgerOnly,
    InsufficientInformation,
}

impl From<StandingArg> for Standing {
    fn from(arg: StandingArg) -> Self {
        match arg {
            StandingArg::InArrearsAlsoPaying => Standing::InArrearsAlsoPaying,
            StandingArg::StillInArrears => Standing::StillInArrears,
            StandingArg::CurrentAlsoPaying => Standing::CurrentAlsoPaying,
            StandingArg::LedgerOnly => Standing::LedgerOnly,
            StandingArg::InsufficientInformation => Standing::InsufficientInformation,
        }
    }
}

fn parse_year_month(s: &str) -> Result<(i32, u32), String> {
    let bad = || format!("expected YYYY-MM, got \"{s}\"");
    let (year, month) = s.trim().split_once('-').ok_or_else(bad)?;
    let year: i32 = year.parse().map_err(|_| bad())?;
    let month: u32 = month.parse().map_err(|_| bad())?;
    if !(1..=12).contains(&month) {
        return Err(bad());
    }
    Ok((year, month))
}

impl FilterArgs {
    fn into_filter(self) -> Result<MemberFilter, CliError> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(CliError::usage(format!("--from {from} is after --to {to}")));
            }
        }
        Ok(MemberFilter {
            date_from: self.from,
            date_to: self.to,
            year: self.year,
            year_month: self.month,
            bucket: self.bucket.map(Into::into),
            classification: self.standing.map(Into::into),
            search: self.search,
        })
    }
}

pub fn cmd_recon(cmd: ReconCommands) -> Result<(), CliError> {
    match cmd {
        ReconCommands::Run { config, as_of, json, output, members_csv, filter } => {
            cmd_recon_run(config, as_of, json, output, members_csv, filter)
        }
        ReconCommands::Validate { config, inputs } => cmd_recon_validate(config, inputs),
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn load_config(config_path: &Path) -> Result<ReconConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| CliError::io(format!("cannot read config {}: {e}", config_path.display())))?;
    Ok(ReconConfig::from_toml(&config_str)?)
}

/// Read one CSV table. Paths are relative to the config file's directory.
/// Bytes that are not valid UTF-8 are replaced rather than rejected.
fn read_table(base_dir: &Path, name: &str, file: Option<&str>) -> Result<Table, CliError> {
    let file = file.ok_or_else(|| {
        CliError::new(EXIT_RECON_INVALID_CONFIG, format!("[{name}] has no `file` to load"))
            .with_hint(format!("add `file = \"{name}.csv\"` under [{name}]"))
    })?;
    let path = base_dir.join(file);
    let bytes = std::fs::read(&path)
        .map_err(|e| CliError::io(format!("cannot read {}: {e}", path.display())))?;
    let table = Table::from_csv_str(name, &String::from_utf8_lossy(&bytes))?;
    log::info!("loaded {} ({} rows) from {}", name, table.len(), path.display());
    Ok(table)
}

fn load_input(config: &ReconConfig, base_dir: &Path) -> Result<ReconInput, CliError> {
    let roster = match config.roster {
        Some(ref r) => Some(read_table(base_dir, "roster", r.file.as_deref())?),
        None => None,
    };
    let installments = match config.installments {
        Some(ref i) => Some(read_table(base_dir, "installments", i.file.as_deref())?),
        None => None,
    };
    Ok(ReconInput {
        arrears: read_table(base_dir, "arrears", config.arrears.file.as_deref())?,
        payments: read_table(base_dir, "payments", config.payments.file.as_deref())?,
        roster,
        installments,
    })
}

fn base_dir(config_path: &Path) -> &Path {
    config_path.parent().unwrap_or_else(|| Path::new("."))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_recon_run(
    config_path: PathBuf,
    as_of: Option<NaiveDate>,
    json_output: bool,
    output_file: Option<PathBuf>,
    members_csv: Option<PathBuf>,
    filter: FilterArgs,
) -> Result<(), CliError> {
    let filter = filter.into_filter()?;
    let config = load_config(&config_path)?;
    let input = load_input(&config, base_dir(&config_path))?;

    let as_of = as_of.unwrap_or_else(|| chrono::Local::now().date_naive());
    let mut result = mora_recon::run(&config, &input, as_of)?;

    let filtered = !filter.is_empty();
    if filtered {
        let view = filter.apply(&result.members);
        log::info!("filter kept {} of {} members", view.members.len(), result.members.len());
        result.members = view.members;
        result.buckets = view.buckets;
        result.classifications = view.classifications;
    }

    let json_str = serde_json::to_string_pretty(&result)
        .map_err(|e| CliError::internal(format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::io(format!("cannot write output {}: {e}", path.display())))?;
        eprintln!("wrote {}", path.display());
    }

    if let Some(ref path) = members_csv {
        report::write_members_csv(path, &result.members)?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }

    report::print_summary(&result, filtered);
    Ok(())
}

fn cmd_recon_validate(config_path: PathBuf, inputs: bool) -> Result<(), CliError> {
    let config = load_config(&config_path)?;

    let mut tables = vec!["arrears", "payments"];
    if config.roster.is_some() {
        tables.push("roster");
    }
    if config.installments.is_some() {
        tables.push("installments");
    }

    if inputs {
        let input = load_input(&config, base_dir(&config_path))?;
        mora_recon::engine::check_schema(&config, &input)?;
    }

    eprintln!(
        "valid: recon '{}' with {} table(s): {}{}",
        config.name,
        tables.len(),
        tables.join(", "),
        if inputs { " (inputs checked)" } else { "" },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_month_parsing() {
        assert_eq!(parse_year_month("2026-02"), Ok((2026, 2)));
        assert!(parse_year_month("2026-13").is_err());
        assert!(parse_year_month("2026").is_err());
        assert!(parse_year_month("feb-2026").is_err());
    }

    #[test]
    fn reversed_date_range_is_usage_error() {
        let args = FilterArgs {
            from: NaiveDate::from_ymd_opt(2026, 3, 1),
            to: NaiveDate::from_ymd_opt(2026, 1, 1),
            ..FilterArgs::default()
        };
        let err = args.into_filter().unwrap_err();
        assert_eq!(err.code, crate::exit_codes::EXIT_USAGE);
    }

    #[test]
    fn filter_args_map_onto_engine_types() {
        let args = FilterArgs {
            bucket: Some(BucketArg::Over121Days),
            standing: Some(StandingArg::LedgerOnly),
            ..FilterArgs::default()
        };
        let filter = args.into_filter().unwrap();
        assert_eq!(filter.bucket, Some(AgingBucket::Over121Days));
        assert_eq!(filter.classification, Some(Standing::LedgerOnly));
        assert!(!filter.is_empty());
        assert!(FilterArgs::default().into_filter().unwrap().is_empty());
    }
}
