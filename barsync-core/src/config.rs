//! Store configuration, loadable from TOML.
//!
//! Every field has a default, so an empty file (or no file) yields the
//! canonical layout: a `date` index column with ISO dates and a
//! `<store>.premerged` quarantine file next to the store.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::BAR_FIELDS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Header name of the date column.
    pub index_label: String,

    /// chrono format used to read and write dates.
    pub date_format: String,

    /// Quarantine path is `<store>.<suffix>`.
    pub quarantine_suffix: String,

    /// Rewrite through `<store>.tmp` and rename instead of truncating in place.
    pub atomic_rewrite: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            index_label: "date".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            quarantine_suffix: "premerged".to_string(),
            atomic_rewrite: true,
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index_label.is_empty() {
            return Err(ConfigError::Invalid("index_label must not be empty".into()));
        }
        if BAR_FIELDS.contains(&self.index_label.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "index_label '{}' collides with a value column",
                self.index_label
            )));
        }
        if self.date_format.is_empty() {
            return Err(ConfigError::Invalid("date_format must not be empty".into()));
        }
        if StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::Invalid(format!(
                "date_format '{}' is not a valid strftime pattern",
                self.date_format
            )));
        }
        self.check_date_roundtrip()?;
        if self.quarantine_suffix.is_empty() || self.quarantine_suffix.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "quarantine_suffix '{}' must be a non-empty file suffix",
                self.quarantine_suffix
            )));
        }
        Ok(())
    }

    /// Render `date` with `date_format`.
    ///
    /// Fails when the format asks for something a calendar date does not
    /// carry, such as hours or a time zone.
    pub fn format_date(&self, date: NaiveDate) -> Result<String, ConfigError> {
        let mut text = String::new();
        write!(text, "{}", date.format(&self.date_format)).map_err(|_| {
            ConfigError::Invalid(format!(
                "date_format '{}' cannot render a calendar date",
                self.date_format
            ))
        })?;
        Ok(text)
    }

    /// Every written date must parse back to itself.
    fn check_date_roundtrip(&self) -> Result<(), ConfigError> {
        let samples = [(2013, 11, 27), (1999, 2, 3)];
        for date in samples
            .iter()
            .filter_map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
        {
            let text = self.format_date(date)?;
            match NaiveDate::parse_from_str(&text, &self.date_format) {
                Ok(parsed) if parsed == date => {}
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "date_format '{}' does not read back what it writes ({date} -> {text:?})",
                        self.date_format
                    )))
                }
            }
        }
        Ok(())
    }

    /// Quarantine location for a store: `<store>.<quarantine_suffix>`.
    pub fn quarantine_path(&self, store: &Path) -> PathBuf {
        let mut name = store.as_os_str().to_os_string();
        name.push(".");
        name.push(&self.quarantine_suffix);
        PathBuf::from(name)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
