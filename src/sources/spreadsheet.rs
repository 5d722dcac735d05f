use crate::error::LoadError;
use crate::sources::{assemble, TableSource};
use crate::types::{Table, Value};
use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use chrono::{Days, NaiveDate};
use std::io::{Cursor, Read, Seek};
use std::path::PathBuf;
use tracing::debug;

/// Excel / OpenDocument workbook; the first row of the sheet is the header
pub struct SpreadsheetSource {
    path: PathBuf,
    sheet: Option<String>,
}

impl SpreadsheetSource {
    pub fn new(path: impl Into<PathBuf>, sheet: Option<String>) -> Self {
        Self {
            path: path.into(),
            sheet,
        }
    }
}

impl TableSource for SpreadsheetSource {
    fn load(&self) -> Result<Table, LoadError> {
        let mut workbook = open_workbook_auto(&self.path)?;
        let range = pick_range(&mut workbook, self.sheet.as_deref())?;
        debug!("{}: sheet range {:?}", self.path.display(), range.get_size());
        table_from_range(&range)
    }

    fn describe(&self) -> String {
        match &self.sheet {
            Some(sheet) => format!("{} [{}]", self.path.display(), sheet),
            None => self.path.display().to_string(),
        }
    }
}

/// Read the first sheet of an in-memory workbook, e.g. an export
pub fn read_spreadsheet_bytes(bytes: &[u8]) -> Result<Table, LoadError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = pick_range(&mut workbook, None)?;
    table_from_range(&range)
}

fn pick_range<RS: Read + Seek>(
    workbook: &mut Sheets<RS>,
    sheet: Option<&str>,
) -> Result<Range<Data>, LoadError> {
    match sheet {
        Some(name) => Ok(workbook.worksheet_range(name)?),
        None => Ok(workbook.worksheet_range_at(0).ok_or(LoadError::NoSheets)??),
    }
}

fn table_from_range(range: &Range<Data>) -> Result<Table, LoadError> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Table::default());
    };
    let headers = header.iter().map(|cell| cell_value(cell).to_string()).collect();
    assemble(headers, rows.map(|row| row.iter().map(cell_value).collect()))
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Missing,
        Data::String(s) if s.trim().is_empty() => Value::Missing,
        Data::String(s) => Value::Text(s.clone()),
        Data::Float(f) => Value::Number(*f),
        Data::Int(i) => Value::Number(*i as f64),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) if dt.is_duration() => Value::Number(dt.as_f64()),
        Data::DateTime(dt) => serial_to_date(dt.as_f64()).map_or(Value::Missing, Value::Date),
        Data::DateTimeIso(s) => Value::parse_cell(s),
        Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(_) => Value::Missing,
    }
}

/// Excel serial day number to a calendar date; the time of day is dropped
pub(crate) fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.floor() as u64))
}

/// Calendar date to an Excel serial day number
pub(crate) fn date_to_serial(date: NaiveDate) -> f64 {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .map(|epoch| (date - epoch).num_days() as f64)
        .unwrap_or_default()
}
