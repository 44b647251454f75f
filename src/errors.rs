use crate::TimeStamp;
use std::error::Error;
use std::fmt;

/// Referential or structural defect in the input tables.
///
/// Always fatal: validation returns the first defect it finds together with
/// the table, row label and field needed to fix the spreadsheet.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub table: &'static str,
    pub row: String,
    pub field: Option<&'static str>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SchemaErrorKind {
    UnknownBusReference(String),
    UnknownColumnReference(String),
    DuplicateLabel(String),
    ArityMismatch {
        connections: usize,
        conversions: usize,
    },
    InvalidBound(String),
}

impl SchemaError {
    pub fn new(kind: SchemaErrorKind, table: &'static str, row: impl Into<String>) -> Self {
        SchemaError {
            kind,
            table,
            row: row.into(),
            field: None,
        }
    }
    pub fn in_field(
        kind: SchemaErrorKind,
        table: &'static str,
        row: impl Into<String>,
        field: &'static str,
    ) -> Self {
        SchemaError {
            kind,
            table,
            row: row.into(),
            field: Some(field),
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.table, self.row)?;
        if let Some(field) = self.field {
            write!(f, ", field '{}'", field)?;
        }
        write!(f, ": ")?;
        match self.kind {
            SchemaErrorKind::UnknownBusReference(ref bus) => {
                write!(f, "unknown bus reference '{}'", bus)
            }
            SchemaErrorKind::UnknownColumnReference(ref column) => write!(
                f,
                "'{}' is neither a number nor a time series column",
                column
            ),
            SchemaErrorKind::DuplicateLabel(ref label) => {
                write!(f, "duplicate label '{}'", label)
            }
            SchemaErrorKind::ArityMismatch {
                connections,
                conversions,
            } => write!(
                f,
                "{} connections but {} conversion factors",
                connections, conversions
            ),
            SchemaErrorKind::InvalidBound(ref detail) => write!(f, "{}", detail),
        }
    }
}

impl Error for SchemaError {}

/// Invalid timestep strategy parameters. Always fatal, raised before any
/// resampling output is produced.
#[derive(Clone, Debug, PartialEq)]
pub enum TimestepError {
    InvalidRange { start: TimeStamp, end: TimeStamp },
    EmptyRange { start: TimeStamp, end: TimeStamp },
    InvalidHours(i64),
    InvalidFactor(f64),
    UnknownStrategy(String),
    MissingParameter(&'static str),
    InvalidParameter { name: &'static str, value: String },
}

impl fmt::Display for TimestepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TimestepError::InvalidRange { start, end } => {
                write!(f, "time range end {} is before start {}", end, start)
            }
            TimestepError::EmptyRange { start, end } => write!(
                f,
                "no time steps within the range {} to {}",
                start, end
            ),
            TimestepError::InvalidHours(hours) => {
                write!(f, "averaging hours should be positive, got {}", hours)
            }
            TimestepError::InvalidFactor(n) => {
                write!(f, "sampling factor should be positive, got {}", n)
            }
            TimestepError::UnknownStrategy(ref name) => write!(
                f,
                "unknown strategy '{}'; valid values ['full', 'time_range', 'averaging', 'sampling_24n']",
                name
            ),
            TimestepError::MissingParameter(name) => {
                write!(f, "missing timestep parameter '{}'", name)
            }
            TimestepError::InvalidParameter { name, ref value } => {
                write!(f, "invalid value '{}' for timestep parameter '{}'", value, name)
            }
        }
    }
}

impl Error for TimestepError {}

/// Failure while reading the input workbook.
#[derive(Debug)]
pub enum ReadError {
    Workbook(String),
    MissingSheet(&'static str),
    MissingColumn {
        sheet: &'static str,
        column: &'static str,
    },
    Cell {
        sheet: &'static str,
        row: usize,
        column: String,
        detail: String,
    },
    Row {
        sheet: &'static str,
        row: usize,
        detail: String,
    },
    TimeSeries(String),
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ReadError::Workbook(ref detail) => write!(f, "failed to open workbook: {}", detail),
            ReadError::MissingSheet(sheet) => write!(f, "required sheet '{}' is missing", sheet),
            ReadError::MissingColumn { sheet, column } => {
                write!(f, "sheet '{}' is missing required column '{}'", sheet, column)
            }
            ReadError::Cell {
                sheet,
                row,
                ref column,
                ref detail,
            } => write!(
                f,
                "sheet '{}', row {}, column '{}': {}",
                sheet, row, column, detail
            ),
            ReadError::Row {
                sheet,
                row,
                ref detail,
            } => write!(f, "sheet '{}', row {}: {}", sheet, row, detail),
            ReadError::TimeSeries(ref detail) => write!(f, "invalid time series: {}", detail),
        }
    }
}

impl Error for ReadError {}

impl From<calamine::Error> for ReadError {
    fn from(error: calamine::Error) -> Self {
        ReadError::Workbook(error.to_string())
    }
}
