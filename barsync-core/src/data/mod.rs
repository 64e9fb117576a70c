//! Bar tables, schema validation and the CSV store

pub mod csv_store;
pub mod schema;
pub mod table;

pub use csv_store::{
    load_series, read_table, store_fingerprint, table_to_csv, write_table, CsvStore, StoreError,
};
pub use schema::{BarSchema, SchemaError};
pub use table::BarTable;
