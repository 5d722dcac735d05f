use crate::error::LoadError;
use crate::sources::{assemble, TableSource};
use crate::types::{ColumnType, Table, Value};
use csv::ReaderBuilder;
use std::io::Read;
use std::path::PathBuf;

/// Delimited text register; the delimiter is sniffed from the header line
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TableSource for CsvSource {
    fn load(&self) -> Result<Table, LoadError> {
        let bytes = std::fs::read(&self.path).map_err(|source| LoadError::Io {
            path: self.path.clone(),
            source,
        })?;
        read_csv_bytes(&bytes)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Parse CSV bytes; cells go through [`Value::parse_cell`]
pub fn read_csv_bytes(bytes: &[u8]) -> Result<Table, LoadError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(sniff_delimiter(bytes))
        .from_reader(bytes);
    read_records(&mut reader)
}

fn read_records<R: Read>(reader: &mut csv::Reader<R>) -> Result<Table, LoadError> {
    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    let mut records: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        records.push(record?.iter().map(String::from).collect());
    }

    let width = records.iter().map(Vec::len).max().unwrap_or_default();
    let text_columns: Vec<bool> = (0..width)
        .map(|i| is_text_column(records.iter().filter_map(|r| r.get(i))))
        .collect();

    let rows = records.into_iter().map(|record| {
        record
            .into_iter()
            .zip(&text_columns)
            .map(|(cell, &text)| if text { text_cell(cell) } else { Value::parse_cell(&cell) })
            .collect::<Vec<_>>()
    });
    assemble(headers, rows)
}

/// A column is typed only when every filled cell parses to the same kind;
/// otherwise it keeps the raw text, so codes like `0012` survive.
fn is_text_column<'a>(cells: impl Iterator<Item = &'a String>) -> bool {
    let mut kind = None;
    for cell in cells {
        match Value::parse_cell(cell).column_type() {
            ColumnType::Empty => {}
            ColumnType::Text => return true,
            ty if kind.is_some_and(|k| k != ty) => return true,
            ty => kind = Some(ty),
        }
    }
    false
}

fn text_cell(cell: String) -> Value {
    if cell.trim().is_empty() {
        Value::Missing
    } else {
        Value::Text(cell)
    }
}

// Spreadsheet tools in comma-decimal locales export with `;`.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let header = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    [b';', b'\t']
        .into_iter()
        .find(|d| header.iter().filter(|b| *b == d).count() > header.iter().filter(|b| **b == b',').count())
        .unwrap_or(b',')
}
