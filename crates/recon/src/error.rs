use std::fmt;

/// Fatal errors. Any of these aborts the run before output is produced.
///
/// Row-level problems (bad dates, unmatched names, unparseable plans) are
/// never reported here; they land in `ReconResult::diagnostics`.
#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty column name, no date columns, etc.).
    ConfigValidation(String),
    /// A table the config declares was not supplied.
    MissingTable(String),
    /// A declared column is absent from the supplied table.
    MissingColumn { table: String, column: String },
    /// Malformed CSV text handed to `Table::from_csv_str`.
    Csv { table: String, message: String },
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingTable(table) => write!(f, "table '{table}' is configured but no data was supplied"),
            Self::MissingColumn { table, column } => {
                write!(f, "table '{table}': missing column '{column}'")
            }
            Self::Csv { table, message } => write!(f, "table '{table}': CSV error: {message}"),
        }
    }
}

impl std::error::Error for ReconError {}
