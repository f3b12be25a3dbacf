//! Aggregate statistics over tables and partitions.
//!
//! Everything here takes rows as an iterator of references, so the same functions work on whole
//! tables (`&table`), partitions (`&partition`) or anything else that yields records.
use crate::{Clinic, ClinicYear, Counts};
use itertools::{Itertools, MinMaxResult};
use serde::Serialize;
use statrs::statistics::Statistics;
use std::{collections::BTreeMap, fmt};

/// A count column.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CountField {
    Births,
    Deaths,
}

impl CountField {
    pub fn get(self, record: &impl Counts) -> u32 {
        match self {
            CountField::Births => record.births(),
            CountField::Deaths => record.deaths(),
        }
    }
}

impl fmt::Display for CountField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&Field::from(*self), f)
    }
}

/// A numeric column, including the derived proportion.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Field {
    Births,
    Deaths,
    DeathProportion,
}

impl Field {
    pub fn get(self, record: &impl Counts) -> f64 {
        match self {
            Field::Births => record.births() as f64,
            Field::Deaths => record.deaths() as f64,
            Field::DeathProportion => record.death_proportion(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::Births => "births",
            Field::Deaths => "deaths",
            Field::DeathProportion => "Proportion of Deaths",
        }
    }
}

impl From<CountField> for Field {
    fn from(field: CountField) -> Self {
        match field {
            CountField::Births => Field::Births,
            CountField::Deaths => Field::Deaths,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The total of a count over all rows.
pub fn sum<'a, R>(rows: impl IntoIterator<Item = &'a R>, field: CountField) -> u64
where
    R: Counts + 'a,
{
    rows.into_iter().map(|row| field.get(row) as u64).sum()
}

/// The total of a count for each clinic, over all years.
///
/// Both clinics are always present, with a total of 0 if they have no rows.
pub fn sum_by_clinic<'a, R>(
    rows: impl IntoIterator<Item = &'a R>,
    field: CountField,
) -> BTreeMap<Clinic, u64>
where
    R: Counts + ClinicYear + 'a,
{
    // B Tree so we get a predictable ordering.
    let mut map: BTreeMap<Clinic, u64> = Clinic::ALL.iter().map(|c| (*c, 0)).collect();
    for row in rows {
        *map.entry(row.clinic()).or_insert(0) += field.get(row) as u64;
    }
    map
}

/// The defined values of `field`. NaN proportions (no births) are dropped.
fn values<'a, R>(rows: impl IntoIterator<Item = &'a R>, field: Field) -> Vec<f64>
where
    R: Counts + 'a,
{
    rows.into_iter()
        .map(|row| field.get(row))
        .filter(|v| !v.is_nan())
        .collect()
}

/// The arithmetic mean of `field` over the rows.
///
/// For [`Field::DeathProportion`] this is the mean of each row's proportion, not total deaths over
/// total births. Rows with an undefined proportion are skipped, and the mean of no rows is NaN.
pub fn mean<'a, R>(rows: impl IntoIterator<Item = &'a R>, field: Field) -> f64
where
    R: Counts + 'a,
{
    values(rows, field).iter().mean()
}

/// `mean(after) - mean(before)`. A negative value is a decrease.
pub fn mean_difference<'a, 'b, R>(
    after: impl IntoIterator<Item = &'a R>,
    before: impl IntoIterator<Item = &'b R>,
    field: Field,
) -> f64
where
    R: Counts + 'a + 'b,
{
    mean(after, field) - mean(before, field)
}

/// Descriptive statistics for one column of some rows.
///
/// Statistics with no meaningful value (e.g. the mean of nothing) are NaN.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Summary {
    /// Number of rows.
    pub count: usize,
    /// Rows where the value was undefined and so ignored.
    pub undefined: usize,
    pub mean: f64,
    /// Sample standard deviation.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

pub fn describe<'a, R>(rows: impl IntoIterator<Item = &'a R>, field: Field) -> Summary
where
    R: Counts + 'a,
{
    let rows: Vec<&R> = rows.into_iter().collect();
    let defined = values(rows.iter().copied(), field);
    let (min, max) = match defined.iter().copied().minmax_by(f64::total_cmp) {
        MinMaxResult::NoElements => (f64::NAN, f64::NAN),
        MinMaxResult::OneElement(v) => (v, v),
        MinMaxResult::MinMax(min, max) => (min, max),
    };
    Summary {
        count: rows.len(),
        undefined: rows.len() - defined.len(),
        mean: defined.iter().mean(),
        std_dev: defined.iter().std_dev(),
        min,
        max,
    }
}
