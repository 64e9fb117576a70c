//! Bar — one dated OHLCV observation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Value columns of a bar, in canonical on-disk order.
pub const BAR_FIELDS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Daily OHLCV bar keyed by a calendar date.
///
/// Equality of the value fields is exact: two bars whose `close` differs by
/// `1e-12` are different bars. Reconciliation never applies a tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Build a bar from values laid out in [`BAR_FIELDS`] order.
    pub fn from_values(date: NaiveDate, values: [f64; 5]) -> Self {
        let [open, high, low, close, volume] = values;
        Self::new(date, open, high, low, close, volume)
    }

    /// Values in [`BAR_FIELDS`] order.
    pub fn values(&self) -> [f64; 5] {
        [self.open, self.high, self.low, self.close, self.volume]
    }

    /// First field holding NaN, if any. A NaN field is a missing field.
    pub fn missing_field(&self) -> Option<&'static str> {
        BAR_FIELDS
            .iter()
            .zip(self.values())
            .find(|(_, v)| v.is_nan())
            .map(|(name, _)| *name)
    }

    /// Returns true if any value field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.missing_field().is_some()
    }

    /// Exact comparison of the five value fields. The date is not compared.
    pub fn same_values(&self, other: &Bar) -> bool {
        self.values() == other.values()
    }

    /// Names of the value fields that differ from `other`.
    pub fn differing_fields(&self, other: &Bar) -> Vec<&'static str> {
        BAR_FIELDS
            .iter()
            .zip(self.values().into_iter().zip(other.values()))
            .filter(|(_, (a, b))| a != b)
            .map(|(name, _)| *name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> Bar {
        Bar::new(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            100.0,
            105.0,
            98.0,
            103.0,
            50_000.0,
        )
    }

    #[test]
    fn values_follow_canonical_order() {
        let bar = sample_bar();
        assert_eq!(bar.values(), [100.0, 105.0, 98.0, 103.0, 50_000.0]);
        assert_eq!(Bar::from_values(bar.date, bar.values()), bar);
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        assert!(!bar.is_void());
        bar.low = f64::NAN;
        assert!(bar.is_void());
        assert_eq!(bar.missing_field(), Some("low"));
    }

    #[test]
    fn same_values_is_exact() {
        let a = sample_bar();
        let mut b = a;
        assert!(a.same_values(&b));
        b.close += 1e-9;
        assert!(!a.same_values(&b));
        assert_eq!(a.differing_fields(&b), vec!["close"]);
    }

    #[test]
    fn same_values_ignores_date() {
        let a = sample_bar();
        let mut b = a;
        b.date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        assert!(a.same_values(&b));
        assert!(a.differing_fields(&b).is_empty());
    }

    #[test]
    fn bar_serialization_roundtrip() {
        let bar = sample_bar();
        let json = serde_json::to_string(&bar).unwrap();
        let deser: Bar = serde_json::from_str(&json).unwrap();
        assert_eq!(bar, deser);
    }
}
