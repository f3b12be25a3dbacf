//! Reading the yearly and monthly datasets.
//!
//! The datasets are spreadsheets (`xlsx`, `xlsm`, `xlsb`, `xls`, `ods`, read with calamine) or
//! CSV exports of them. Either way the first row holds column names and each following row is a
//! record. Columns are found by name, so column order doesn't matter and extra columns (such as
//! an exported index) are ignored.
//!
//! Loading either produces a complete, validated table or an error. There are no partial tables.
use crate::{util::path_exists, Clinic, MonthlyRecord, MonthlyTable, YearlyRecord, YearlyTable};
use calamine::{DataType, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use qu::ick_use::*;
use std::{
    collections::BTreeSet,
    fmt, io,
    path::{Path, PathBuf},
};

/// Problems loading a dataset.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("input file \"{}\" not found", .path.display())]
    InputNotFound { path: PathBuf },
    #[error("could not access input file \"{}\"", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(
        "\"{}\" is not a supported file type (expected csv, xlsx, xlsm, xlsb, xls or ods)",
        .path.display()
    )]
    UnsupportedFormat { path: PathBuf },
    #[error("could not read spreadsheet \"{}\"", .path.display())]
    Spreadsheet {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },
    #[error("could not read CSV file \"{}\"", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("spreadsheet \"{}\" has no worksheets", .path.display())]
    NoWorksheet { path: PathBuf },
    #[error("\"{}\": missing column `{column}`", .path.display())]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("\"{}\" row {row}, column `{column}`: {reason}", .path.display())]
    BadValue {
        path: PathBuf,
        row: usize,
        column: &'static str,
        reason: String,
    },
    #[error("\"{}\": more than one row for {clinic} in {year}", .path.display())]
    DuplicateRecord {
        path: PathBuf,
        clinic: Clinic,
        year: i32,
    },
    #[error(
        "\"{}\" row {row}: date {date} does not come after the date in the previous row",
        .path.display()
    )]
    DatesNotIncreasing {
        path: PathBuf,
        row: usize,
        date: NaiveDate,
    },
}

/// Broad categories of [`LoadError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file isn't there.
    InputNotFound,
    /// The file is there but isn't a spreadsheet/CSV we can read.
    Malformed,
    /// The file is readable but the columns or values aren't what we expect.
    SchemaMismatch,
}

impl LoadError {
    pub fn kind(&self) -> ErrorKind {
        use LoadError::*;
        match self {
            InputNotFound { .. } => ErrorKind::InputNotFound,
            Unreadable { .. }
            | UnsupportedFormat { .. }
            | Spreadsheet { .. }
            | Csv { .. }
            | NoWorksheet { .. } => ErrorKind::Malformed,
            MissingColumn { .. }
            | BadValue { .. }
            | DuplicateRecord { .. }
            | DatesNotIncreasing { .. } => ErrorKind::SchemaMismatch,
        }
    }

    /// The file the error relates to.
    pub fn path(&self) -> &Path {
        use LoadError::*;
        match self {
            InputNotFound { path }
            | Unreadable { path, .. }
            | UnsupportedFormat { path }
            | Spreadsheet { path, .. }
            | Csv { path, .. }
            | NoWorksheet { path }
            | MissingColumn { path, .. }
            | BadValue { path, .. }
            | DuplicateRecord { path, .. }
            | DatesNotIncreasing { path, .. } => path,
        }
    }
}

/// Load the yearly deaths by clinic.
///
/// Requires the columns `clinic`, `year`, `births` and `deaths`. No two rows may have the same
/// clinic and year.
pub fn load_yearly(path: impl AsRef<Path>) -> Result<YearlyTable, LoadError> {
    let path = path.as_ref();
    let sheet = Sheet::read(path)?;
    let clinic = sheet.column("clinic")?;
    let year = sheet.column("year")?;
    let births = sheet.column("births")?;
    let deaths = sheet.column("deaths")?;

    let mut seen = BTreeSet::new();
    let mut els = Vec::with_capacity(sheet.rows.len());
    for (row, cells) in sheet.records() {
        let record = YearlyRecord {
            clinic: sheet.value(row, cells, clinic, Cell::clinic)?,
            year: sheet.value(row, cells, year, Cell::year)?,
            births: sheet.value(row, cells, births, Cell::count)?,
            deaths: sheet.value(row, cells, deaths, Cell::count)?,
        };
        if !seen.insert((record.clinic, record.year)) {
            return Err(LoadError::DuplicateRecord {
                path: path.into(),
                clinic: record.clinic,
                year: record.year,
            });
        }
        els.push(record);
    }
    event!(
        Level::INFO,
        "loaded {} yearly records from \"{}\"",
        els.len(),
        path.display()
    );
    Ok(els.into())
}

/// Load the monthly deaths.
///
/// Requires the columns `date`, `births` and `deaths`. Dates must be strictly increasing.
pub fn load_monthly(path: impl AsRef<Path>) -> Result<MonthlyTable, LoadError> {
    let path = path.as_ref();
    let sheet = Sheet::read(path)?;
    let date = sheet.column("date")?;
    let births = sheet.column("births")?;
    let deaths = sheet.column("deaths")?;

    let mut els: Vec<MonthlyRecord> = Vec::with_capacity(sheet.rows.len());
    for (row, cells) in sheet.records() {
        let record = MonthlyRecord {
            date: sheet.value(row, cells, date, Cell::date)?,
            births: sheet.value(row, cells, births, Cell::count)?,
            deaths: sheet.value(row, cells, deaths, Cell::count)?,
        };
        if let Some(prev) = els.last() {
            if record.date <= prev.date {
                return Err(LoadError::DatesNotIncreasing {
                    path: path.into(),
                    row,
                    date: record.date,
                });
            }
        }
        els.push(record);
    }
    event!(
        Level::INFO,
        "loaded {} monthly records from \"{}\"",
        els.len(),
        path.display()
    );
    Ok(els.into())
}

/// A cell, after we've forgotten which kind of file it came from.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Empty,
    Int(i64),
    Number(f64),
    /// Days since 1899-12-30.
    DateSerial(f64),
    Text(String),
}

impl Cell {
    fn from_text(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(text.to_owned())
        }
    }

    fn from_sheet(cell: &DataType) -> Self {
        match cell {
            DataType::Empty => Cell::Empty,
            DataType::Int(v) => Cell::Int(*v),
            DataType::Float(v) => Cell::Number(*v),
            DataType::DateTime(v) => Cell::DateSerial(*v),
            DataType::String(s) => Cell::from_text(s),
            // bools and error cells (`#N/A` etc.) are never valid, keep their text for messages.
            other => Cell::Text(other.to_string()),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    fn integer(&self) -> Result<i64, String> {
        match self {
            Cell::Int(v) => Ok(*v),
            Cell::Number(v) => float_to_int(*v),
            Cell::Text(s) => match s.parse::<i64>() {
                Ok(v) => Ok(v),
                Err(_) => s
                    .parse::<f64>()
                    .map_err(|_| format!("expected a whole number, found {}", self))
                    .and_then(float_to_int),
            },
            Cell::DateSerial(_) | Cell::Empty => {
                Err(format!("expected a whole number, found {}", self))
            }
        }
    }

    fn count(&self) -> Result<u32, String> {
        let v = self.integer()?;
        u32::try_from(v).map_err(|_| format!("expected a non-negative count, found {}", v))
    }

    fn year(&self) -> Result<i32, String> {
        let v = self.integer()?;
        i32::try_from(v).map_err(|_| format!("year {} out of range", v))
    }

    fn date(&self) -> Result<NaiveDate, String> {
        match self {
            Cell::DateSerial(v) | Cell::Number(v) => serial_date(*v),
            Cell::Int(v) => serial_date(*v as f64),
            Cell::Text(s) => parse_date(s),
            Cell::Empty => Err(format!("expected a date, found {}", self)),
        }
    }

    fn clinic(&self) -> Result<Clinic, String> {
        match self {
            Cell::Text(s) => s.parse().map_err(|e: Error| e.to_string()),
            _ => Err(format!("expected a clinic, found {}", self)),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cell::Empty => f.write_str("an empty cell"),
            Cell::Int(v) => write!(f, "{}", v),
            Cell::Number(v) => write!(f, "{}", v),
            Cell::DateSerial(v) => write!(f, "date serial {}", v),
            Cell::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

fn float_to_int(v: f64) -> Result<i64, String> {
    if v.is_finite() && v == v.trunc() && v.abs() < 1e15 {
        Ok(v as i64)
    } else {
        Err(format!("expected a whole number, found {}", v))
    }
}

/// Convert a spreadsheet date serial to a date.
///
/// Serials count days from 1899-12-30, which is how every spreadsheet application treats them
/// from March 1900 onwards. Any time of day is dropped.
///
/// Excel counts a 1900-02-29 that never happened as serial 60, so serials 1 to 59 are a day
/// later than the plain count and 60 itself is rejected.
fn serial_date(serial: f64) -> Result<NaiveDate, String> {
    // ~8000 years either side.
    if !serial.is_finite() || serial.abs() > 3_000_000. {
        return Err(format!("date serial {} out of range", serial));
    }
    let days = serial.floor() as i64;
    let epoch = match days {
        1..=59 => NaiveDate::from_ymd_opt(1899, 12, 31).unwrap(),
        60 => return Err("date serial 60 is 1900-02-29, which doesn't exist".into()),
        _ => NaiveDate::from_ymd_opt(1899, 12, 30).unwrap(),
    };
    epoch
        .checked_add_signed(Duration::days(days))
        .ok_or_else(|| format!("date serial {} out of range", serial))
}

/// Parse the textual date formats seen in exports of the monthly dataset.
fn parse_date(text: &str) -> Result<NaiveDate, String> {
    const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];
    const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| {
            DATETIME_FORMATS.iter().find_map(|format| {
                NaiveDateTime::parse_from_str(text, format)
                    .ok()
                    .map(|datetime| datetime.date())
            })
        })
        .ok_or_else(|| format!("expected a date, found \"{}\"", text))
}

#[derive(Debug, Copy, Clone)]
struct Column {
    name: &'static str,
    idx: usize,
}

/// The header and rows of a tabular file.
struct Sheet {
    path: PathBuf,
    /// Lower-cased and trimmed.
    headers: Vec<String>,
    /// Rows with their 1-based line number in the file.
    rows: Vec<(usize, Vec<Cell>)>,
}

impl Sheet {
    fn read(path: &Path) -> Result<Self, LoadError> {
        match path_exists(path) {
            Ok(true) => (),
            Ok(false) => return Err(LoadError::InputNotFound { path: path.into() }),
            Err(source) => {
                return Err(LoadError::Unreadable {
                    path: path.into(),
                    source,
                })
            }
        }
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") => Self::read_csv(path),
            Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => Self::read_workbook(path),
            _ => Err(LoadError::UnsupportedFormat { path: path.into() }),
        }
    }

    /// Reads the first worksheet.
    fn read_workbook(path: &Path) -> Result<Self, LoadError> {
        let spreadsheet_err = |source| LoadError::Spreadsheet {
            path: path.into(),
            source,
        };
        let mut workbook = calamine::open_workbook_auto(path).map_err(spreadsheet_err)?;
        let name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| LoadError::NoWorksheet { path: path.into() })?;
        let wksht = workbook
            .worksheet_range(&name)
            .ok_or_else(|| LoadError::NoWorksheet { path: path.into() })?
            .map_err(spreadsheet_err)?;

        // 0-based index of the header row within the worksheet
        let offset = wksht.start().map(|(row, _)| row as usize).unwrap_or(0);
        let mut rows = wksht.rows();
        let headers = match rows.next() {
            Some(cells) => cells.iter().map(normalize_header).collect(),
            None => vec![],
        };
        let rows = rows
            .enumerate()
            .map(|(idx, cells)| (offset + idx + 2, cells.iter().map(Cell::from_sheet).collect()))
            .collect();
        Ok(Sheet {
            path: path.into(),
            headers,
            rows,
        })
    }

    fn read_csv(path: &Path) -> Result<Self, LoadError> {
        let csv_err = |source| LoadError::Csv {
            path: path.into(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(csv_err)?;
        let headers = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(normalize_header)
            .collect();
        let rows = reader
            .records()
            .enumerate()
            .map(|(idx, record)| {
                let record = record?;
                let line = record
                    .position()
                    .map(|pos| pos.line() as usize)
                    .unwrap_or(idx + 2);
                Ok((line, record.iter().map(Cell::from_text).collect()))
            })
            .collect::<Result<Vec<_>, csv::Error>>()
            .map_err(csv_err)?;
        Ok(Sheet {
            path: path.into(),
            headers,
            rows,
        })
    }

    fn column(&self, name: &'static str) -> Result<Column, LoadError> {
        self.headers
            .iter()
            .position(|header| header == name)
            .map(|idx| Column { name, idx })
            .ok_or_else(|| LoadError::MissingColumn {
                path: self.path.clone(),
                column: name,
            })
    }

    /// Rows that have at least one non-empty cell.
    fn records(&self) -> impl Iterator<Item = (usize, &[Cell])> + '_ {
        self.rows
            .iter()
            .filter(|(_, cells)| !cells.iter().all(Cell::is_empty))
            .map(|(row, cells)| (*row, cells.as_slice()))
    }

    fn value<T>(
        &self,
        row: usize,
        cells: &[Cell],
        column: Column,
        parse: impl Fn(&Cell) -> Result<T, String>,
    ) -> Result<T, LoadError> {
        parse(cells.get(column.idx).unwrap_or(&Cell::Empty)).map_err(|reason| {
            LoadError::BadValue {
                path: self.path.clone(),
                row,
                column: column.name,
                reason,
            }
        })
    }
}

fn normalize_header(header: impl fmt::Display) -> String {
    header.to_string().trim().to_ascii_lowercase()
}
