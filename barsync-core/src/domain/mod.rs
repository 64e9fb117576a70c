//! Domain types for barsync

pub mod bar;
pub mod series;

pub use bar::{Bar, BAR_FIELDS};
pub use series::Series;
