//! Series — a date-ordered, uniquely keyed run of bars.

use std::ops::RangeInclusive;

use chrono::NaiveDate;
use serde::Serialize;

use super::bar::Bar;
use crate::data::schema::SchemaError;

/// Bars sorted strictly ascending by date, with no void bars.
///
/// Every constructor enforces the invariants, so any `Series` value that
/// exists is well formed. Raw tables from disk go through
/// [`BarSchema::validate`](crate::data::BarSchema::validate) to get one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Series {
    bars: Vec<Bar>,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from bars that must already be in ascending date order.
    pub fn from_bars(bars: impl IntoIterator<Item = Bar>) -> Result<Self, SchemaError> {
        let mut series = Self::new();
        for bar in bars {
            series.push(bar)?;
        }
        Ok(series)
    }

    /// Caller guarantees strictly increasing dates and no void bars.
    pub(crate) fn from_sorted_unchecked(bars: Vec<Bar>) -> Self {
        debug_assert!(bars.windows(2).all(|w| w[0].date < w[1].date));
        Self { bars }
    }

    /// Append a bar after the current last bar.
    pub fn push(&mut self, bar: Bar) -> Result<(), SchemaError> {
        if let Some(field) = bar.missing_field() {
            return Err(SchemaError::MissingField {
                date: bar.date,
                field: field.to_string(),
            });
        }
        if let Some(last) = self.bars.last() {
            if bar.date == last.date {
                return Err(SchemaError::DuplicateDate(bar.date));
            }
            if bar.date < last.date {
                return Err(SchemaError::OutOfOrder {
                    previous: last.date,
                    date: bar.date,
                });
            }
        }
        self.bars.push(bar);
        Ok(())
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.bars.iter().map(|b| b.date)
    }

    /// Bars at the given inclusive position range; `None` when out of bounds.
    pub fn slice(&self, range: RangeInclusive<usize>) -> Option<&[Bar]> {
        self.bars.get(range)
    }
}

impl<'a> IntoIterator for &'a Series {
    type Item = &'a Bar;
    type IntoIter = std::slice::Iter<'a, Bar>;

    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
    }
}
