//! Already-loaded tabular input: a header list plus rows of column → value.
//!
//! Column lookup is by exact (trimmed) header name only. There is no
//! positional fallback; a declared column that is not in `headers` is a
//! fatal `ReconError::MissingColumn`.

use std::collections::{BTreeSet, HashMap};

use crate::error::ReconError;

/// One input record, keyed by header name.
pub type Row = HashMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct Table {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            headers: headers.into_iter().map(|h| h.trim().to_string()).collect(),
            rows,
        }
    }

    /// Build a table whose headers are the union of the rows' keys.
    /// An empty `rows` yields a table with no columns at all.
    pub fn from_rows(name: impl Into<String>, rows: Vec<Row>) -> Self {
        let headers: BTreeSet<String> = rows.iter().flat_map(|r| r.keys().cloned()).collect();
        Self::new(name, headers.into_iter().collect(), rows)
    }

    /// Parse CSV text (first record = headers). Header names are trimmed;
    /// cells are kept verbatim.
    pub fn from_csv_str(name: &str, data: &str) -> Result<Self, ReconError> {
        let csv_err = |e: csv::Error| ReconError::Csv {
            table: name.into(),
            message: e.to_string(),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(data.trim_start_matches('\u{feff}').as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            let mut row = Row::with_capacity(headers.len());
            for (i, h) in headers.iter().enumerate() {
                if let Some(val) = record.get(i) {
                    row.insert(h.clone(), val.to_string());
                }
            }
            rows.push(row);
        }

        Ok(Self::new(name, headers, rows))
    }

    /// Resolve a declared column, failing fast if the header is absent.
    pub fn require<'c>(&self, column: &'c str) -> Result<Column<'c>, ReconError> {
        if self.headers.iter().any(|h| h == column) {
            Ok(Column(column))
        } else {
            Err(ReconError::MissingColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
        }
    }

    /// Resolve an optional declared column. `None` in config means "not
    /// used"; a configured name that is absent is still fatal.
    pub fn require_opt<'c>(&self, column: Option<&'c str>) -> Result<Option<Column<'c>>, ReconError> {
        column.map(|c| self.require(c)).transpose()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A column name that has been checked against a table's headers.
#[derive(Debug, Clone, Copy)]
pub struct Column<'c>(&'c str);

impl<'c> Column<'c> {
    pub fn name(&self) -> &'c str {
        self.0
    }

    /// Cell value for this column; a row shorter than the header list
    /// reads as empty.
    pub fn get<'r>(&self, row: &'r Row) -> &'r str {
        row.get(self.0).map(String::as_str).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_headers_are_trimmed() {
        let t = Table::from_csv_str("arrears", " Codigo socio ,Monto total\n101,150.00\n").unwrap();
        assert_eq!(t.headers, vec!["Codigo socio", "Monto total"]);
        let code = t.require("Codigo socio").unwrap();
        assert_eq!(code.get(&t.rows[0]), "101");
    }

    #[test]
    fn csv_strips_byte_order_mark() {
        let t = Table::from_csv_str("roster", "\u{feff}code,name\n1,ANA\n").unwrap();
        assert!(t.require("code").is_ok());
    }

    #[test]
    fn short_rows_read_as_empty() {
        let t = Table::from_csv_str("payments", "a,b,c\n1,2\n").unwrap();
        let c = t.require("c").unwrap();
        assert_eq!(c.get(&t.rows[0]), "");
    }

    #[test]
    fn require_missing_column_is_fatal() {
        let t = Table::new("payments", vec!["MONTO".into()], vec![]);
        let err = t.require("CONSUMIDOR").unwrap_err();
        assert!(matches!(
            err,
            ReconError::MissingColumn { ref table, ref column } if table == "payments" && column == "CONSUMIDOR"
        ));
    }

    #[test]
    fn require_opt_none_is_not_checked() {
        let t = Table::new("arrears", vec![], vec![]);
        assert!(t.require_opt(None).unwrap().is_none());
        assert!(t.require_opt(Some("plan")).is_err());
    }

    #[test]
    fn from_rows_collects_union_of_keys() {
        let mut a = Row::new();
        a.insert("x".into(), "1".into());
        let mut b = Row::new();
        b.insert("y".into(), "2".into());
        let t = Table::from_rows("t", vec![a, b]);
        assert_eq!(t.headers, vec!["x", "y"]);
        assert_eq!(t.len(), 2);
    }
}
