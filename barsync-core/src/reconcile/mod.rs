//! Reconciliation: diff, merge and the persistence writer.

pub mod diff;
pub mod merge;
pub mod writer;

pub use diff::{diff, diff_csv, diff_detailed, BarDiff};
pub use merge::{
    merge, merge_csv, merge_tables, new_data_intervals, CsvMergeError, FeedMergeError,
    MergeResult, NewDataInterval, Side,
};
pub use writer::{reconcile_and_store, Commit, ReconcileSummary, Reconciliation, StoreWriter};
