use chrono::NaiveDate;
use thiserror::Error;

use super::table::BarTable;
use crate::config::StoreConfig;
use crate::domain::{Bar, Series};

/// Expected layout of bar tables.
///
/// The header must match `<index_label>,open,high,low,close,volume` exactly:
/// same names, same case, same count, same order. Nothing is coerced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarSchema {
    header: Vec<String>,
    date_format: String,
}

impl BarSchema {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            header: BarTable::canonical_header(config),
            date_format: config.date_format.clone(),
        }
    }

    /// Check the header row alone.
    pub fn validate_header(&self, header: &[String]) -> Result<(), SchemaError> {
        if header != self.header.as_slice() {
            return Err(SchemaError::ColumnMismatch {
                expected: self.header.clone(),
                found: header.to_vec(),
            });
        }
        Ok(())
    }

    /// Validate a table and convert it into a series.
    ///
    /// Reports the first violation found: header, then each row in file
    /// order (width, date, values), then date ordering and uniqueness.
    pub fn validate(&self, table: &BarTable) -> Result<Series, SchemaError> {
        self.validate_header(&table.header)?;

        let mut series = Series::new();
        for (i, row) in table.rows.iter().enumerate() {
            let bar = self.parse_row(i + 1, row)?;
            series.push(bar)?;
        }
        Ok(series)
    }

    fn parse_row(&self, row_number: usize, row: &[String]) -> Result<Bar, SchemaError> {
        let width = self.header.len();
        if row.is_empty() || row.len() > width {
            return Err(SchemaError::RowWidth {
                row: row_number,
                expected: width,
                found: row.len(),
            });
        }

        let date = NaiveDate::parse_from_str(row[0].trim(), &self.date_format).map_err(|_| {
            SchemaError::InvalidDate {
                row: row_number,
                value: row[0].clone(),
            }
        })?;

        let mut values = [0.0_f64; 5];
        for (i, slot) in values.iter_mut().enumerate() {
            *slot = parse_value(date, &self.header[i + 1], row.get(i + 1))?;
        }
        Ok(Bar::from_values(date, values))
    }
}

impl Default for BarSchema {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

fn parse_value(date: NaiveDate, field: &str, cell: Option<&String>) -> Result<f64, SchemaError> {
    let missing = || SchemaError::MissingField {
        date,
        field: field.to_string(),
    };
    let text = cell.map(|c| c.trim()).filter(|c| !c.is_empty()).ok_or_else(missing)?;
    match text.parse::<f64>() {
        Ok(v) if v.is_nan() => Err(missing()),
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(SchemaError::InvalidValue {
            date,
            field: field.to_string(),
            value: text.to_string(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("column mismatch: expected [{}], found [{}]", .expected.join(", "), .found.join(", "))]
    ColumnMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("row {row} has {found} cells, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("row {row} has an unparseable date: {value:?}")]
    InvalidDate { row: usize, value: String },

    #[error("missing field '{field}' on {date}")]
    MissingField { date: NaiveDate, field: String },

    #[error("invalid value {value:?} for field '{field}' on {date}")]
    InvalidValue {
        date: NaiveDate,
        field: String,
        value: String,
    },

    #[error("duplicate date {0}")]
    DuplicateDate(NaiveDate),

    #[error("dates out of order: {date} follows {previous}")]
    OutOfOrder { previous: NaiveDate, date: NaiveDate },
}
