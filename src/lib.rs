//! Recomputes Ignaz Semmelweis' mortality figures for the two maternity clinics of the Vienna
//! General Hospital, before and after handwashing became mandatory.
//!
//! Data flows one way. [`load`] reads the yearly and monthly datasets into typed tables,
//! [`transform`] derives the proportion of deaths and splits tables into [`Partition`]s, and
//! [`stats`] and [`report`] summarise the partitions as numbers, terminal tables and charts.
pub mod chart;
pub mod load;
pub mod report;
pub mod stats;
pub mod transform;
mod util;

pub use anyhow::{Context, Error};
use chrono::NaiveDate;
use qu::ick_use::*;
use serde::Serialize;
use std::{
    fmt, iter,
    ops::Deref,
    path::{Path, PathBuf},
    slice,
    str::FromStr,
    sync::Arc,
};

pub use crate::{
    load::{load_monthly, load_yearly, ErrorKind, LoadError},
    stats::{CountField, Field, Summary},
    transform::{add_death_proportion, partition_by_clinic, partition_by_date},
    util::{header, path_exists},
};

/// The day handwashing became obligatory.
pub fn handwashing_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(1847, 6, 1).unwrap()
}

pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;

/// The yearly dataset.
pub type YearlyTable = Records<YearlyRecord>;
/// The monthly dataset.
pub type MonthlyTable = Records<MonthlyRecord>;

/// One of the two maternity wards.
///
/// Doctors and medical students worked in clinic 1, midwives in clinic 2. Only these two values
/// exist in the data, any other value is rejected at load time.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub enum Clinic {
    #[serde(rename = "clinic 1")]
    One,
    #[serde(rename = "clinic 2")]
    Two,
}

impl Clinic {
    pub const ALL: [Clinic; 2] = [Clinic::One, Clinic::Two];

    /// The label used in the source data.
    pub fn label(self) -> &'static str {
        match self {
            Clinic::One => "clinic 1",
            Clinic::Two => "clinic 2",
        }
    }
}

impl FromStr for Clinic {
    type Err = Error;
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "clinic 1" => Ok(Clinic::One),
            "clinic 2" => Ok(Clinic::Two),
            _ => Err(format_err!("didn't recognise clinic \"{}\"", input)),
        }
    }
}

impl fmt::Display for Clinic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Deaths as a proportion of births.
///
/// There is no meaningful proportion when there were no births, so this is NaN rather than an
/// error or an infinity.
pub fn proportion(deaths: u32, births: u32) -> f64 {
    if births == 0 {
        f64::NAN
    } else {
        deaths as f64 / births as f64
    }
}

/// A row carrying birth and death counts.
pub trait Counts {
    fn births(&self) -> u32;
    fn deaths(&self) -> u32;

    fn death_proportion(&self) -> f64 {
        proportion(self.deaths(), self.births())
    }
}

/// A row belonging to a clinic and a year.
pub trait ClinicYear {
    fn clinic(&self) -> Clinic;
    fn year(&self) -> i32;
}

/// A row belonging to a calendar date.
pub trait Dated {
    fn date(&self) -> NaiveDate;
}

/// A row that knows how to draw itself as cells of a table.
pub trait TableRow {
    fn headers() -> Vec<&'static str>;
    fn cells(&self) -> Vec<String>;
}

/// A row in the yearly dataset.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct YearlyRecord {
    pub clinic: Clinic,
    pub year: i32,
    pub births: u32,
    pub deaths: u32,
}

impl Counts for YearlyRecord {
    fn births(&self) -> u32 {
        self.births
    }
    fn deaths(&self) -> u32 {
        self.deaths
    }
}

impl ClinicYear for YearlyRecord {
    fn clinic(&self) -> Clinic {
        self.clinic
    }
    fn year(&self) -> i32 {
        self.year
    }
}

impl TableRow for YearlyRecord {
    fn headers() -> Vec<&'static str> {
        vec!["year", "births", "deaths", "clinic"]
    }
    fn cells(&self) -> Vec<String> {
        vec![
            self.year.to_string(),
            self.births.to_string(),
            self.deaths.to_string(),
            self.clinic.to_string(),
        ]
    }
}

/// A row in the monthly dataset. Monthly figures are for clinic 1 only.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MonthlyRecord {
    pub date: NaiveDate,
    pub births: u32,
    pub deaths: u32,
}

impl Counts for MonthlyRecord {
    fn births(&self) -> u32 {
        self.births
    }
    fn deaths(&self) -> u32 {
        self.deaths
    }
}

impl Dated for MonthlyRecord {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl TableRow for MonthlyRecord {
    fn headers() -> Vec<&'static str> {
        vec!["date", "births", "deaths"]
    }
    fn cells(&self) -> Vec<String> {
        vec![
            self.date.to_string(),
            self.births.to_string(),
            self.deaths.to_string(),
        ]
    }
}

/// A record together with its derived proportion of deaths.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Proportioned<R> {
    pub record: R,
    pub death_proportion: f64,
}

impl<R> Deref for Proportioned<R> {
    type Target = R;
    fn deref(&self) -> &R {
        &self.record
    }
}

impl<R: Counts> Counts for Proportioned<R> {
    fn births(&self) -> u32 {
        self.record.births()
    }
    fn deaths(&self) -> u32 {
        self.record.deaths()
    }
    fn death_proportion(&self) -> f64 {
        self.death_proportion
    }
}

impl<R: ClinicYear> ClinicYear for Proportioned<R> {
    fn clinic(&self) -> Clinic {
        self.record.clinic()
    }
    fn year(&self) -> i32 {
        self.record.year()
    }
}

impl<R: Dated> Dated for Proportioned<R> {
    fn date(&self) -> NaiveDate {
        self.record.date()
    }
}

impl<R: TableRow> TableRow for Proportioned<R> {
    fn headers() -> Vec<&'static str> {
        let mut headers = R::headers();
        headers.push("Proportion of Deaths");
        headers
    }
    fn cells(&self) -> Vec<String> {
        let mut cells = self.record.cells();
        cells.push(format!("{:.6}", self.death_proportion));
        cells
    }
}

/// An ordered, immutable table of records.
///
/// Order is the row order of the source file. Clones share the underlying rows.
#[derive(Debug)]
pub struct Records<R> {
    els: Arc<Vec<R>>,
}

impl<R> Clone for Records<R> {
    fn clone(&self) -> Self {
        Records {
            els: self.els.clone(),
        }
    }
}

impl<R> Records<R> {
    pub fn new(els: Vec<R>) -> Self {
        Records { els: Arc::new(els) }
    }

    pub fn iter(&self) -> slice::Iter<'_, R> {
        self.els.iter()
    }

    /// A view of the rows matching the predicate, in table order.
    pub fn filter(&self, f: impl Fn(&R) -> bool) -> Partition<'_, R> {
        self.iter().filter(|row| f(*row)).collect()
    }

    /// A view of the whole table.
    pub fn all(&self) -> Partition<'_, R> {
        self.iter().collect()
    }

    /// A view of the first `count` rows.
    pub fn head(&self, count: usize) -> Partition<'_, R> {
        self.iter().take(count).collect()
    }
}

impl<R: TableRow> Records<R> {
    pub fn evcxr_display(&self) {
        self.all().evcxr_display()
    }
}

impl<R: TableRow> fmt::Display for Records<R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.all(), f)
    }
}

impl<R> Deref for Records<R> {
    type Target = [R];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

impl<'a, R> IntoIterator for &'a Records<R> {
    type IntoIter = slice::Iter<'a, R>;
    type Item = &'a R;
    fn into_iter(self) -> Self::IntoIter {
        self.els.iter()
    }
}

impl<R> FromIterator<R> for Records<R> {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = R>,
    {
        Self::new(iter.into_iter().collect())
    }
}

impl<R> From<Vec<R>> for Records<R> {
    fn from(els: Vec<R>) -> Self {
        Self::new(els)
    }
}

/// A read-only view of some of the rows of a [`Records`] table, in table order.
#[derive(Debug)]
pub struct Partition<'a, R> {
    rows: Vec<&'a R>,
}

impl<'a, R> Clone for Partition<'a, R> {
    fn clone(&self) -> Self {
        Partition {
            rows: self.rows.clone(),
        }
    }
}

impl<'a, R> Partition<'a, R> {
    pub fn iter(&self) -> iter::Copied<slice::Iter<'_, &'a R>> {
        self.rows.iter().copied()
    }
}

impl<'a, R: TableRow> Partition<'a, R> {
    /// Display the rows as an HTML table in an evcxr notebook.
    pub fn evcxr_display(&self) {
        let html = util::html_table(
            None,
            &R::headers(),
            self.iter().map(R::cells),
            util::DEFAULT_MAX_ROWS,
            true,
        );
        util::evcxr_display("text/html", &html);
    }
}

impl<'a, R: TableRow> fmt::Display for Partition<'a, R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&util::term_table(
            &R::headers(),
            self.iter().map(R::cells),
            util::DEFAULT_MAX_ROWS,
            true,
        ))
    }
}

impl<'a, R> Deref for Partition<'a, R> {
    type Target = [&'a R];
    fn deref(&self) -> &Self::Target {
        &self.rows
    }
}

impl<'a, 'p, R> IntoIterator for &'p Partition<'a, R> {
    type IntoIter = iter::Copied<slice::Iter<'p, &'a R>>;
    type Item = &'a R;
    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter().copied()
    }
}

impl<'a, R> FromIterator<&'a R> for Partition<'a, R> {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = &'a R>,
    {
        Partition {
            rows: iter.into_iter().collect(),
        }
    }
}

/// Where input data lives by default.
///
/// Note: No protection from escaping the root directory.
pub fn data_path(input: impl AsRef<Path>) -> PathBuf {
    Path::new("data").join(input)
}
