//! Persistence writer — commit a merge to the store, or quarantine the input.
//!
//! Three commit shapes:
//! - no stored series yet: write the incoming series in full (creation)
//! - one new-data interval ending at the last merged row: append those rows
//! - anything else: rewrite the whole store with the merged series
//!
//! A merge failure (schema or value conflict) never reaches the store. The
//! incoming data is written to `{store}.{quarantine_suffix}` instead and the
//! failure comes back as [`Reconciliation::Quarantined`].

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use super::merge::{merge, validate_side, FeedMergeError, MergeResult, NewDataInterval, Side};
use crate::data::{read_table, BarTable, CsvStore, StoreError};
use crate::domain::Series;

/// How a successful reconciliation was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Commit {
    /// The store did not exist; the incoming series became its content.
    Created { rows: usize },
    /// New rows were appended after the existing ones.
    Appended { rows: usize },
    /// The whole store was regenerated from the merged series.
    Rewritten { rows: usize },
}

impl Commit {
    /// Rows physically written by this commit.
    pub fn rows_written(&self) -> usize {
        match *self {
            Commit::Created { rows } | Commit::Appended { rows } | Commit::Rewritten { rows } => {
                rows
            }
        }
    }
}

/// Outcome of [`StoreWriter::reconcile_and_store`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    Committed {
        commit: Commit,
        /// The authoritative series now on disk.
        series: Series,
        /// New-data intervals relative to the previous store content.
        intervals: Vec<NewDataInterval>,
    },
    Quarantined {
        path: PathBuf,
        error: FeedMergeError,
    },
}

impl Reconciliation {
    pub fn is_committed(&self) -> bool {
        matches!(self, Reconciliation::Committed { .. })
    }

    /// The merged series, when the reconciliation committed.
    pub fn series(&self) -> Option<&Series> {
        match self {
            Reconciliation::Committed { series, .. } => Some(series),
            Reconciliation::Quarantined { .. } => None,
        }
    }

    pub fn commit(&self) -> Option<Commit> {
        match self {
            Reconciliation::Committed { commit, .. } => Some(*commit),
            Reconciliation::Quarantined { .. } => None,
        }
    }

    /// Flat, serializable view for reporting.
    pub fn summary(&self, store: &Path) -> ReconcileSummary {
        match self {
            Reconciliation::Committed { commit, series, .. } => ReconcileSummary {
                store: store.to_path_buf(),
                status: match commit {
                    Commit::Created { .. } => "created",
                    Commit::Appended { .. } => "appended",
                    Commit::Rewritten { .. } => "rewritten",
                },
                rows_written: commit.rows_written(),
                total_rows: Some(series.len()),
                first_date: series.first_date(),
                last_date: series.last_date(),
                quarantine_path: None,
                error: None,
            },
            Reconciliation::Quarantined { path, error } => ReconcileSummary {
                store: store.to_path_buf(),
                status: "quarantined",
                rows_written: 0,
                total_rows: None,
                first_date: None,
                last_date: None,
                quarantine_path: Some(path.clone()),
                error: Some(error.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileSummary {
    pub store: PathBuf,
    pub status: &'static str,
    pub rows_written: usize,
    pub total_rows: Option<usize>,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub quarantine_path: Option<PathBuf>,
    pub error: Option<String>,
}

/// Reconciles incoming series into one CSV store.
///
/// Holds no state between calls; everything durable lives in the file.
/// Callers must not run two reconciliations against the same store at once.
#[derive(Debug, Clone)]
pub struct StoreWriter {
    store: CsvStore,
}

impl StoreWriter {
    pub fn new(store: CsvStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &CsvStore {
        &self.store
    }

    /// Merge `incoming` with the stored series and commit the result.
    ///
    /// `Err` is reserved for I/O failures. Merge failures are recovered into
    /// [`Reconciliation::Quarantined`] and leave the store untouched.
    pub fn reconcile_and_store(&self, incoming: &Series) -> Result<Reconciliation, StoreError> {
        self.reconcile(Ok(incoming.clone()), || {
            BarTable::from_series(incoming, self.store.config())
        })
    }

    /// Like [`reconcile_and_store`](Self::reconcile_and_store) for an
    /// unvalidated table. A malformed table is quarantined verbatim.
    pub fn reconcile_table(&self, incoming: &BarTable) -> Result<Reconciliation, StoreError> {
        let validated = validate_side(incoming, self.store.schema(), Side::Incoming);
        self.reconcile(validated, || incoming.clone())
    }

    /// Reconcile the CSV file at `incoming` into the store.
    ///
    /// A zero-byte file is an empty series, the same rule the store itself
    /// follows. A missing file is [`StoreError::NotFound`].
    pub fn reconcile_file(&self, incoming: &Path) -> Result<Reconciliation, StoreError> {
        let table = read_table(incoming)?;
        if table.header.is_empty() && table.rows.is_empty() {
            return self.reconcile_and_store(&Series::new());
        }
        self.reconcile_table(&table)
    }

    fn reconcile(
        &self,
        incoming: Result<Series, FeedMergeError>,
        as_supplied: impl FnOnce() -> BarTable,
    ) -> Result<Reconciliation, StoreError> {
        let existing = self.store.read_table()?;

        let merged = match (existing, incoming) {
            (_, Err(error)) => return self.quarantine(as_supplied(), error),
            (None, Ok(incoming)) => return self.create(incoming),
            (Some(table), Ok(incoming)) => validate_side(&table, self.store.schema(), Side::Base)
                .and_then(|base| merge(&base, &incoming)),
        };

        match merged {
            Ok(result) => self.commit(result),
            Err(error) => self.quarantine(as_supplied(), error),
        }
    }

    fn create(&self, incoming: Series) -> Result<Reconciliation, StoreError> {
        self.store.write(&incoming)?;
        let rows = incoming.len();
        info!(store = %self.store.path().display(), rows, "created bar store");
        let intervals = if rows == 0 {
            Vec::new()
        } else {
            vec![NewDataInterval {
                start: 0,
                end: rows - 1,
            }]
        };
        Ok(Reconciliation::Committed {
            commit: Commit::Created { rows },
            series: incoming,
            intervals,
        })
    }

    fn commit(&self, result: MergeResult) -> Result<Reconciliation, StoreError> {
        let store = self.store.path().display();
        let tail = result
            .trailing_interval()
            .and_then(|interval| result.series.slice(interval.range()));

        let commit = match tail {
            Some(rows) => {
                self.store.append(rows)?;
                info!(%store, rows = rows.len(), total = result.series.len(), "appended bars");
                Commit::Appended { rows: rows.len() }
            }
            None => {
                self.store.write(&result.series)?;
                info!(
                    %store,
                    rows = result.series.len(),
                    new_rows = result.new_rows(),
                    intervals = result.intervals.len(),
                    "rewrote bar store"
                );
                Commit::Rewritten {
                    rows: result.series.len(),
                }
            }
        };

        Ok(Reconciliation::Committed {
            commit,
            series: result.series,
            intervals: result.intervals,
        })
    }

    fn quarantine(
        &self,
        incoming: BarTable,
        error: FeedMergeError,
    ) -> Result<Reconciliation, StoreError> {
        let path = self.store.quarantine(&incoming)?;
        match &error {
            FeedMergeError::ValueConflict { dates } => warn!(
                store = %self.store.path().display(),
                quarantine = %path.display(),
                conflicts = dates.len(),
                "{error}"
            ),
            FeedMergeError::SchemaMismatch { side, source } => warn!(
                store = %self.store.path().display(),
                quarantine = %path.display(),
                %side,
                "schema violation: {source}"
            ),
        }
        Ok(Reconciliation::Quarantined { path, error })
    }
}

/// Reconcile `incoming` into the store at `store_location` with the default
/// store configuration.
pub fn reconcile_and_store(
    incoming: &Series,
    store_location: impl Into<PathBuf>,
) -> Result<Reconciliation, StoreError> {
    StoreWriter::new(CsvStore::new(store_location)).reconcile_and_store(incoming)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use std::fs;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, 1).unwrap() + chrono::Duration::days(d as i64)
    }

    fn series(days: impl IntoIterator<Item = u32>) -> Series {
        Series::from_bars(days.into_iter().map(|d| {
            let p = 20.0 + d as f64 * 0.25;
            Bar::new(day(d), p, p + 1.0, p - 1.0, p + 0.5, 500.0 + d as f64)
        }))
        .unwrap()
    }

    fn writer(dir: &TempDir) -> StoreWriter {
        StoreWriter::new(CsvStore::new(dir.path().join("feed.csv")))
    }

    #[test]
    fn first_write_creates_store() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir);

        let outcome = w.reconcile_and_store(&series(0..5)).unwrap();

        assert_eq!(outcome.commit(), Some(Commit::Created { rows: 5 }));
        assert_eq!(w.store().load().unwrap(), series(0..5));
    }

    #[test]
    fn trailing_rows_are_appended() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir);
        w.reconcile_and_store(&series(0..5)).unwrap();
        let before = fs::read(w.store().path()).unwrap();

        let outcome = w.reconcile_and_store(&series(3..8)).unwrap();

        assert_eq!(outcome.commit(), Some(Commit::Appended { rows: 3 }));
        let after = fs::read(w.store().path()).unwrap();
        assert!(after.starts_with(&before));
        assert_eq!(w.store().load().unwrap(), series(0..8));
        assert_eq!(outcome.series(), Some(&series(0..8)));
    }

    #[test]
    fn inserted_rows_force_rewrite() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir);
        w.reconcile_and_store(&series([0, 1, 5, 6])).unwrap();

        let outcome = w.reconcile_and_store(&series([2, 3])).unwrap();

        assert_eq!(outcome.commit(), Some(Commit::Rewritten { rows: 6 }));
        assert_eq!(w.store().load().unwrap(), series([0, 1, 2, 3, 5, 6]));
    }

    #[test]
    fn nothing_new_still_rewrites() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir);
        w.reconcile_and_store(&series(0..4)).unwrap();

        let outcome = w.reconcile_and_store(&Series::new()).unwrap();

        assert_eq!(outcome.commit(), Some(Commit::Rewritten { rows: 4 }));
        assert_eq!(w.store().load().unwrap(), series(0..4));
    }

    #[test]
    fn conflict_quarantines_and_keeps_store() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir);
        w.reconcile_and_store(&series(0..5)).unwrap();
        let before = w.store().fingerprint().unwrap();

        let mut bars = series(4..7).into_bars();
        bars[0].high += 0.5;
        let conflicting = Series::from_bars(bars).unwrap();

        let outcome = w.reconcile_and_store(&conflicting).unwrap();

        match &outcome {
            Reconciliation::Quarantined { path, error } => {
                assert_eq!(*path, dir.path().join("feed.csv.premerged"));
                assert_eq!(*error, FeedMergeError::ValueConflict { dates: vec![day(4)] });
                assert_eq!(CsvStore::new(path).load().unwrap(), conflicting);
            }
            other => panic!("expected quarantine, got {other:?}"),
        }
        assert_eq!(w.store().fingerprint().unwrap(), before);
    }

    #[test]
    fn malformed_store_quarantines_incoming() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir);
        let original = "Date,Open,High,Low,Close,Volume\n2021-01-01,1,2,0.5,1.5,10\n";
        fs::write(w.store().path(), original).unwrap();

        let outcome = w.reconcile_and_store(&series(0..2)).unwrap();

        assert!(matches!(
            outcome,
            Reconciliation::Quarantined {
                error: FeedMergeError::SchemaMismatch { side: Side::Base, .. },
                ..
            }
        ));
        assert_eq!(fs::read_to_string(w.store().path()).unwrap(), original);
    }

    #[test]
    fn malformed_table_is_quarantined_verbatim() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir);
        w.reconcile_and_store(&series(0..3)).unwrap();
        let before = w.store().fingerprint().unwrap();

        let mut table = BarTable::from_series(&series(3..5), w.store().config());
        table.header.push("columnX".into());

        let outcome = w.reconcile_table(&table).unwrap();

        let Reconciliation::Quarantined { path, error } = outcome else {
            panic!("expected quarantine");
        };
        assert!(matches!(error, FeedMergeError::SchemaMismatch { side: Side::Incoming, .. }));
        assert_eq!(crate::data::read_table(&path).unwrap(), table);
        assert_eq!(w.store().fingerprint().unwrap(), before);
    }

    #[test]
    fn zero_byte_incoming_file_is_an_empty_series() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir);
        w.reconcile_and_store(&series(0..4)).unwrap();
        let before = w.store().fingerprint().unwrap();
        let incoming = dir.path().join("live.csv");
        fs::write(&incoming, b"").unwrap();

        let outcome = w.reconcile_file(&incoming).unwrap();

        assert_eq!(outcome.commit(), Some(Commit::Rewritten { rows: 4 }));
        assert_eq!(w.store().fingerprint().unwrap(), before);
        assert!(!w.store().quarantine_path().exists());
    }

    #[test]
    fn missing_incoming_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = writer(&dir)
            .reconcile_file(&dir.path().join("absent.csv"))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn summary_reports_commit_and_quarantine() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir);
        let outcome = w.reconcile_and_store(&series(0..3)).unwrap();

        let summary = outcome.summary(w.store().path());
        assert_eq!(summary.status, "created");
        assert_eq!(summary.rows_written, 3);
        assert_eq!(summary.first_date, Some(day(0)));
        assert_eq!(summary.last_date, Some(day(2)));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "created");
        assert!(json["quarantine_path"].is_null());
    }
}
