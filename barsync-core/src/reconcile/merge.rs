//! Merge engine — union of two bar series with conflict detection.
//!
//! Merging never picks a winner: if any shared date carries different values
//! on the two sides, the merge fails and names every such date. When it
//! succeeds, the merged content does not depend on argument order; only the
//! new-data intervals do, since they are measured against `base`.

use std::fmt;
use std::ops::RangeInclusive;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::diff::diff;
use crate::config::StoreConfig;
use crate::data::{read_table, BarSchema, BarTable, SchemaError, StoreError};
use crate::domain::Series;

/// Which input of a merge a problem came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Base,
    Incoming,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Base => f.write_str("base"),
            Side::Incoming => f.write_str("incoming"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedMergeError {
    #[error("schema mismatch in {side} series: {source}")]
    SchemaMismatch {
        side: Side,
        #[source]
        source: SchemaError,
    },

    #[error("value conflict on {}", describe_dates(.dates))]
    ValueConflict { dates: Vec<NaiveDate> },
}

fn describe_dates(dates: &[NaiveDate]) -> String {
    let listed: Vec<String> = dates.iter().map(|d| d.to_string()).collect();
    format!("{} overlapping date(s): {}", dates.len(), listed.join(", "))
}

/// Closed range `[start, end]` of merged-series positions holding bars that
/// were absent from the base series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NewDataInterval {
    pub start: usize,
    pub end: usize,
}

impl NewDataInterval {
    pub fn row_count(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn range(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    pub series: Series,
    pub intervals: Vec<NewDataInterval>,
}

impl MergeResult {
    /// Number of merged rows that were not in the base series.
    pub fn new_rows(&self) -> usize {
        self.intervals.iter().map(NewDataInterval::row_count).sum()
    }

    /// The single interval of new data, if it exists and ends at the last
    /// merged position. This is the shape that can be committed by appending.
    pub fn trailing_interval(&self) -> Option<NewDataInterval> {
        match self.intervals.as_slice() {
            [only] if only.end + 1 == self.series.len() => Some(*only),
            _ => None,
        }
    }
}

/// Coalesce runs of `true` into closed intervals.
pub fn new_data_intervals(is_new: &[bool]) -> Vec<NewDataInterval> {
    let mut intervals = Vec::new();
    let mut start = None;
    for (i, &new) in is_new.iter().enumerate() {
        match (new, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                intervals.push(NewDataInterval { start: s, end: i - 1 });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        intervals.push(NewDataInterval {
            start: s,
            end: is_new.len() - 1,
        });
    }
    intervals
}

/// Merge `incoming` into `base`.
///
/// Fails with [`FeedMergeError::ValueConflict`] if a shared date carries
/// different values. Both inputs are already valid series, so schema problems
/// cannot occur here; see [`merge_tables`] for raw input.
pub fn merge(base: &Series, incoming: &Series) -> Result<MergeResult, FeedMergeError> {
    let conflicts = diff(base, incoming);
    if !conflicts.is_empty() {
        return Err(FeedMergeError::ValueConflict {
            dates: conflicts.into_iter().collect(),
        });
    }

    let (a, b) = (base.bars(), incoming.bars());
    let mut bars = Vec::with_capacity(a.len() + b.len());
    let mut is_new = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let take_base = match (a.get(i), b.get(j)) {
            (Some(x), Some(y)) if x.date == y.date => {
                j += 1;
                true
            }
            (Some(x), Some(y)) => x.date < y.date,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if take_base {
            bars.push(a[i]);
            is_new.push(false);
            i += 1;
        } else {
            bars.push(b[j]);
            is_new.push(true);
            j += 1;
        }
    }

    let intervals = new_data_intervals(&is_new);
    debug!(
        base_rows = a.len(),
        incoming_rows = b.len(),
        overlap = a.len() + b.len() - bars.len(),
        merged_rows = bars.len(),
        intervals = ?intervals,
        "merged bar series"
    );

    Ok(MergeResult {
        series: Series::from_sorted_unchecked(bars),
        intervals,
    })
}

/// Validate two raw tables and merge them.
///
/// A violation in either table fails with
/// [`FeedMergeError::SchemaMismatch`] before the sides are compared. The
/// valid side is never adjusted to match the other.
pub fn merge_tables(
    base: &BarTable,
    incoming: &BarTable,
    schema: &BarSchema,
) -> Result<MergeResult, FeedMergeError> {
    let base = validate_side(base, schema, Side::Base)?;
    let incoming = validate_side(incoming, schema, Side::Incoming)?;
    merge(&base, &incoming)
}

pub(crate) fn validate_side(
    table: &BarTable,
    schema: &BarSchema,
    side: Side,
) -> Result<Series, FeedMergeError> {
    schema
        .validate(table)
        .map_err(|source| FeedMergeError::SchemaMismatch { side, source })
}

/// Error from the file-level convenience operations.
#[derive(Debug, Error)]
pub enum CsvMergeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Merge(#[from] FeedMergeError),
}

/// Merge two store files without writing anything.
pub fn merge_csv(
    base: &Path,
    incoming: &Path,
    config: &StoreConfig,
) -> Result<MergeResult, CsvMergeError> {
    let schema = BarSchema::new(config);
    let base = read_table(base)?;
    let incoming = read_table(incoming)?;
    Ok(merge_tables(&base, &incoming, &schema)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 11, 1).unwrap() + chrono::Duration::days(d as i64)
    }

    fn bar(d: u32) -> Bar {
        let p = 50.0 + d as f64;
        Bar::new(day(d), p, p + 2.0, p - 1.0, p + 0.5, 1_000.0 * d as f64)
    }

    fn series(days: impl IntoIterator<Item = u32>) -> Series {
        Series::from_bars(days.into_iter().map(bar)).unwrap()
    }

    #[test]
    fn intervals_from_scan() {
        let flags = [false, true, true, false, true, false, false, true];
        assert_eq!(
            new_data_intervals(&flags),
            vec![
                NewDataInterval { start: 1, end: 2 },
                NewDataInterval { start: 4, end: 4 },
                NewDataInterval { start: 7, end: 7 },
            ]
        );
        assert!(new_data_intervals(&[]).is_empty());
        assert!(new_data_intervals(&[false, false]).is_empty());
        assert_eq!(
            new_data_intervals(&[true, true]),
            vec![NewDataInterval { start: 0, end: 1 }]
        );
    }

    #[test]
    fn union_with_shared_boundary_date() {
        let base = series(0..=20);
        let incoming = series(20..=22);

        let result = merge(&base, &incoming).unwrap();

        assert_eq!(result.series, series(0..=22));
        assert_eq!(result.intervals, vec![NewDataInterval { start: 21, end: 22 }]);
        assert_eq!(result.trailing_interval(), Some(NewDataInterval { start: 21, end: 22 }));
        assert_eq!(result.new_rows(), 2);
    }

    #[test]
    fn empty_incoming_is_a_noop() {
        let base = series(0..=5);
        let result = merge(&base, &Series::new()).unwrap();
        assert_eq!(result.series, base);
        assert!(result.intervals.is_empty());
        assert_eq!(result.trailing_interval(), None);
    }

    #[test]
    fn contained_incoming_adds_nothing() {
        let base = series(0..=10);
        let result = merge(&base, &series(3..=6)).unwrap();
        assert_eq!(result.series, base);
        assert!(result.intervals.is_empty());
    }

    #[test]
    fn gaps_and_prefix_produce_separate_intervals() {
        let base = series([2, 3, 6, 7]);
        let incoming = series([0, 1, 4, 5, 7]);

        let result = merge(&base, &incoming).unwrap();

        assert_eq!(result.series, series(0..=7));
        assert_eq!(
            result.intervals,
            vec![
                NewDataInterval { start: 0, end: 1 },
                NewDataInterval { start: 4, end: 5 },
            ]
        );
        assert_eq!(result.trailing_interval(), None);
    }

    #[test]
    fn empty_base_makes_everything_new() {
        let incoming = series(0..=3);
        let result = merge(&Series::new(), &incoming).unwrap();
        assert_eq!(result.series, incoming);
        assert_eq!(result.trailing_interval(), Some(NewDataInterval { start: 0, end: 3 }));
    }

    #[test]
    fn conflict_names_every_disagreeing_date() {
        let base = series(0..=10);
        let mut bars = series(5..=12).into_bars();
        bars[0].open += 0.01; // day 5
        bars[3].volume = 0.0; // day 8
        let incoming = Series::from_bars(bars).unwrap();

        let err = merge(&base, &incoming).unwrap_err();

        assert_eq!(
            err,
            FeedMergeError::ValueConflict {
                dates: vec![day(5), day(8)]
            }
        );
        let msg = err.to_string();
        assert!(msg.contains("2 overlapping"), "{msg}");
        assert!(msg.contains(&day(8).to_string()), "{msg}");
    }

    #[test]
    fn merge_content_is_order_independent() {
        let a = series([0, 2, 4, 6]);
        let b = series([1, 2, 3, 7]);
        let ab = merge(&a, &b).unwrap();
        let ba = merge(&b, &a).unwrap();
        assert_eq!(ab.series, ba.series);
        assert_ne!(ab.intervals, ba.intervals);
    }

    #[test]
    fn merge_tables_rejects_bad_side_without_coercion() {
        let schema = BarSchema::default();
        let config = StoreConfig::default();
        let good = BarTable::from_series(&series(0..=3), &config);
        let mut bad = good.clone();
        bad.header[1] = "OPEN".into();

        let err = merge_tables(&good, &bad, &schema).unwrap_err();
        assert!(matches!(
            err,
            FeedMergeError::SchemaMismatch { side: Side::Incoming, source: SchemaError::ColumnMismatch { .. } }
        ));

        let err = merge_tables(&bad, &good, &schema).unwrap_err();
        assert!(matches!(err, FeedMergeError::SchemaMismatch { side: Side::Base, .. }));
    }

    #[test]
    fn merge_tables_rejects_duplicate_inside_one_side() {
        let schema = BarSchema::default();
        let config = StoreConfig::default();
        let base = BarTable::from_series(&series(0..=7), &config);
        let mut incoming = base.clone();
        let dup = incoming.rows[3].clone();
        incoming.rows.insert(4, dup);

        let err = merge_tables(&base, &incoming, &schema).unwrap_err();
        assert!(matches!(
            err,
            FeedMergeError::SchemaMismatch { side: Side::Incoming, source: SchemaError::DuplicateDate(d) } if d == day(3)
        ));
    }
}
