//! CSV store — one file per series.
//!
//! Layout: `<index_label>,open,high,low,close,volume` header, then one row per
//! bar in ascending date order.
//!
//! Features:
//! - Appends that leave every pre-existing byte in place
//! - Atomic rewrites (write to .tmp, rename into place)
//! - Raw table reads, so a malformed file is reported by schema validation
//!   instead of failing to open
//! - Quarantine files for rejected incoming data (`{store}.premerged`)
//! - blake3 fingerprint of the file bytes

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::schema::{BarSchema, SchemaError};
use super::table::BarTable;
use crate::config::{ConfigError, StoreConfig};
use crate::domain::{Bar, Series};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store not found: {path}")]
    NotFound { path: PathBuf },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed store {path}: {source}")]
    Schema {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },
}

impl StoreError {
    fn io(path: &Path) -> impl Fn(io::Error) -> Self + '_ {
        move |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn open(path: &Path) -> impl Fn(io::Error) -> Self + '_ {
        move |source| {
            if source.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                StoreError::io(path)(source)
            }
        }
    }

    fn csv(path: &Path) -> impl Fn(csv::Error) -> Self + '_ {
        move |source| StoreError::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A single series persisted as a CSV file.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
    config: StoreConfig,
    schema: BarSchema,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let config = StoreConfig::default();
        Self {
            path: path.into(),
            schema: BarSchema::new(&config),
            config,
        }
    }

    pub fn with_config(path: impl Into<PathBuf>, config: StoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            path: path.into(),
            schema: BarSchema::new(&config),
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn schema(&self) -> &BarSchema {
        &self.schema
    }

    /// Where rejected incoming data for this store goes.
    pub fn quarantine_path(&self) -> PathBuf {
        self.config.quarantine_path(&self.path)
    }

    /// Read the file as an unvalidated table.
    ///
    /// Returns `Ok(None)` when there is no stored series: the file is missing
    /// or has zero bytes.
    pub fn read_table(&self) -> Result<Option<BarTable>, StoreError> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path)(e)),
        };
        let len = file.metadata().map_err(StoreError::io(&self.path))?.len();
        if len == 0 {
            return Ok(None);
        }
        read_table_from(file, &self.path).map(Some)
    }

    /// Load and validate the stored series.
    pub fn load(&self) -> Result<Series, StoreError> {
        let table = self.read_table()?.ok_or_else(|| StoreError::NotFound {
            path: self.path.clone(),
        })?;
        self.schema
            .validate(&table)
            .map_err(|source| StoreError::Schema {
                path: self.path.clone(),
                source,
            })
    }

    /// Replace the whole file with `series`, header included.
    pub fn write(&self, series: &Series) -> Result<(), StoreError> {
        let table = BarTable::from_series(series, &self.config);
        write_table(&self.path, &table, self.config.atomic_rewrite)
    }

    /// Add rows after the last existing row. The header is not repeated.
    ///
    /// If the file does not end with a newline one is written first, so the
    /// existing content is left byte-for-byte as it was.
    pub fn append(&self, bars: &[Bar]) -> Result<(), StoreError> {
        let io_err = StoreError::io(&self.path);
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(&io_err)?;

        let len = file.metadata().map_err(&io_err)?.len();
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1)).map_err(&io_err)?;
            file.read_exact(&mut last).map_err(&io_err)?;
            if last[0] != b'\n' {
                file.write_all(b"\n").map_err(&io_err)?;
            }
        }

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut file);
        for bar in bars {
            wtr.write_record(BarTable::format_row(bar, &self.config))
                .map_err(StoreError::csv(&self.path))?;
        }
        wtr.flush().map_err(&io_err)?;
        drop(wtr);
        file.flush().map_err(io_err)?;
        Ok(())
    }

    /// Write `table` verbatim to the quarantine path. Returns that path.
    pub fn quarantine(&self, table: &BarTable) -> Result<PathBuf, StoreError> {
        let path = self.quarantine_path();
        write_table(&path, table, false)?;
        Ok(path)
    }

    /// blake3 hex digest of the file bytes.
    pub fn fingerprint(&self) -> Result<String, StoreError> {
        store_fingerprint(&self.path)
    }
}

// ── CSV I/O helpers ─────────────────────────────────────────────────

fn read_table_from(reader: impl Read, path: &Path) -> Result<BarTable, StoreError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut records = rdr.records();
    let header = match records.next() {
        Some(record) => record_cells(&record.map_err(StoreError::csv(path))?),
        None => Vec::new(),
    };
    let mut table = BarTable::new(header);
    for record in records {
        table.rows.push(record_cells(&record.map_err(StoreError::csv(path))?));
    }
    Ok(table)
}

fn record_cells(record: &csv::StringRecord) -> Vec<String> {
    record.iter().map(str::to_string).collect()
}

/// Render a table to CSV bytes, header first.
pub fn table_to_csv(table: &BarTable) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(vec![]);
    wtr.write_record(&table.header)?;
    for row in &table.rows {
        wtr.write_record(row)?;
    }
    wtr.into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Write a table to `path`, creating parent directories.
///
/// With `atomic`, the bytes go to `{path}.tmp` first and are renamed into
/// place, so a crash mid-write never leaves a truncated store.
pub fn write_table(path: &Path, table: &BarTable, atomic: bool) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(StoreError::io(parent))?;
    }
    let bytes = table_to_csv(table).map_err(StoreError::csv(path))?;

    if !atomic {
        return fs::write(path, bytes).map_err(StoreError::io(path));
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    fs::write(&tmp_path, bytes).map_err(StoreError::io(&tmp_path))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        // Clean up temp file on rename failure
        let _ = fs::remove_file(&tmp_path);
        StoreError::io(path)(e)
    })
}

/// Read any CSV file as an unvalidated table.
pub fn read_table(path: &Path) -> Result<BarTable, StoreError> {
    let file = fs::File::open(path).map_err(StoreError::open(path))?;
    read_table_from(file, path)
}

/// blake3 hex digest of a store file's bytes.
pub fn store_fingerprint(path: &Path) -> Result<String, StoreError> {
    let bytes = fs::read(path).map_err(StoreError::open(path))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Read and validate any CSV file against `schema`.
pub fn load_series(path: &Path, schema: &BarSchema) -> Result<Series, StoreError> {
    let table = read_table(path)?;
    schema.validate(&table).map_err(|source| StoreError::Schema {
        path: path.to_path_buf(),
        source,
    })
}
