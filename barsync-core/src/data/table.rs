//! BarTable — the untyped tabular shape of a store file.
//!
//! A table is exactly what sits on disk: one header row and rows of text
//! cells. Nothing about it is validated; [`BarSchema`](super::BarSchema)
//! turns a table into a [`Series`] or explains why it cannot.

use crate::config::StoreConfig;
use crate::domain::{Bar, Series, BAR_FIELDS};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarTable {
    /// Header cells, index column first.
    pub header: Vec<String>,
    /// Data rows, cells in header order.
    pub rows: Vec<Vec<String>>,
}

impl BarTable {
    pub fn new(header: Vec<String>) -> Self {
        Self {
            header,
            rows: Vec::new(),
        }
    }

    /// Canonical header: `<index_label>,open,high,low,close,volume`.
    pub fn canonical_header(config: &StoreConfig) -> Vec<String> {
        std::iter::once(config.index_label.clone())
            .chain(BAR_FIELDS.iter().map(|f| f.to_string()))
            .collect()
    }

    /// Render a series in the canonical layout.
    ///
    /// Numbers use the shortest decimal text that parses back to the same
    /// `f64`, so a write/read round trip is exact.
    pub fn from_series(series: &Series, config: &StoreConfig) -> Self {
        let mut table = Self::new(Self::canonical_header(config));
        table.rows = series
            .bars()
            .iter()
            .map(|bar| Self::format_row(bar, config))
            .collect();
        table
    }

    /// Cells for a single bar in canonical column order.
    ///
    /// `config` is expected to have passed [`StoreConfig::validate`]. A format
    /// that cannot render a date falls back to ISO `YYYY-MM-DD`.
    pub fn format_row(bar: &Bar, config: &StoreConfig) -> Vec<String> {
        let date = config
            .format_date(bar.date)
            .unwrap_or_else(|_| bar.date.to_string());
        std::iter::once(date)
            .chain(bar.values().iter().map(|v| v.to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a header cell, exact match.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }
}
