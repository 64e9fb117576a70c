//! barsync core — reconciliation and incremental persistence of daily OHLCV bars.
//!
//! This crate contains:
//! - Domain types (bars, date-keyed series)
//! - Raw bar tables and schema validation
//! - The CSV store (append, atomic rewrite, quarantine, fingerprint)
//! - Diff and merge engines with new-data interval tracking
//! - The persistence writer deciding between create, append and rewrite
//! - A lifecycle hook that reconciles a live feed exactly once when it ends

pub mod config;
pub mod data;
pub mod domain;
pub mod lifecycle;
pub mod reconcile;

pub use config::{ConfigError, StoreConfig};
pub use data::{BarSchema, BarTable, CsvStore, SchemaError, StoreError};
pub use domain::{Bar, Series};
pub use lifecycle::{BufferedFeed, FeedSession, Finalize, LiveFeed, PlainFinalize, ReconcilingFinalize};
pub use reconcile::{
    diff, merge, reconcile_and_store, Commit, FeedMergeError, MergeResult, NewDataInterval,
    Reconciliation, StoreWriter,
};
