//! Diff engine — which shared dates carry different bars.
//!
//! Both inputs are date-sorted, so the overlap is found with a single
//! two-pointer walk in `O(a + b)`. A date present on only one side is absence,
//! not disagreement, and never shows up in a diff.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::StoreConfig;
use crate::data::{load_series, BarSchema, StoreError};
use crate::domain::{Bar, Series};

/// One disagreeing date, with both sides and the fields that differ.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarDiff {
    pub date: NaiveDate,
    pub left: Bar,
    pub right: Bar,
    pub fields: Vec<&'static str>,
}

/// Pairs of bars sharing a date, in ascending date order.
pub(crate) fn overlapping<'a>(a: &'a Series, b: &'a Series) -> Vec<(&'a Bar, &'a Bar)> {
    let (a, b) = (a.bars(), b.bars());
    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].date.cmp(&b[j].date) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                pairs.push((&a[i], &b[j]));
                i += 1;
                j += 1;
            }
        }
    }
    pairs
}

/// Dates present in both series whose bars differ in at least one field.
pub fn diff(a: &Series, b: &Series) -> BTreeSet<NaiveDate> {
    overlapping(a, b)
        .into_iter()
        .filter(|(l, r)| !l.same_values(r))
        .map(|(l, _)| l.date)
        .collect()
}

/// Like [`diff`], keeping both bars and the differing field names.
pub fn diff_detailed(a: &Series, b: &Series) -> Vec<BarDiff> {
    overlapping(a, b)
        .into_iter()
        .filter_map(|(l, r)| {
            let fields = l.differing_fields(r);
            (!fields.is_empty()).then(|| BarDiff {
                date: l.date,
                left: *l,
                right: *r,
                fields,
            })
        })
        .collect()
}

/// Compare two store files over their shared dates.
///
/// Both files must pass schema validation. An empty result means every date
/// the files have in common carries identical values.
pub fn diff_csv(a: &Path, b: &Path, config: &StoreConfig) -> Result<BTreeSet<NaiveDate>, StoreError> {
    let schema = BarSchema::new(config);
    let left = load_series(a, &schema)?;
    let right = load_series(b, &schema)?;
    Ok(diff(&left, &right))
}
