pub mod columnar;
pub mod delimited;
pub mod spreadsheet;
pub mod synthetic;

use crate::config::ColumnMap;
use crate::error::LoadError;
use crate::types::{ColumnDef, ColumnType, Schema, Table, SYNTHETIC_DATE_COLUMN};
use std::path::Path;
use tracing::{error, info, warn};

pub use columnar::ParquetSource;
pub use delimited::CsvSource;
pub use spreadsheet::{read_spreadsheet_bytes, SpreadsheetSource};
pub use synthetic::SyntheticSource;

/// Something a register table can be loaded from
pub trait TableSource {
    fn load(&self) -> Result<Table, LoadError>;

    /// Human-readable origin, for logs
    fn describe(&self) -> String;
}

/// Pick a loader from the file extension
pub fn create_source(path: &Path, sheet: Option<&str>) -> Result<Box<dyn TableSource>, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(Box::new(SpreadsheetSource::new(
            path,
            sheet.map(String::from),
        ))),
        "csv" | "tsv" | "txt" => Ok(Box::new(CsvSource::new(path))),
        "parquet" => Ok(Box::new(ParquetSource::new(path))),
        _ => Err(LoadError::UnsupportedFormat(path.display().to_string())),
    }
}

/// Load a table, degrading to an empty register on failure.
///
/// The empty table carries the mapped columns so every view still runs and
/// simply reports no rows.
pub fn load_or_empty(source: &dyn TableSource, columns: &ColumnMap) -> Table {
    match source.load() {
        Ok(table) => {
            if table.is_empty() {
                warn!("{} has no data rows", source.describe());
            }
            info!(
                "Loaded {} rows x {} columns from {}",
                table.len(),
                table.schema().len(),
                source.describe()
            );
            table
        }
        Err(e) => {
            error!("Failed to load {}: {}", source.describe(), e);
            Table::empty(fallback_schema(columns))
        }
    }
}

/// Schema of an empty register with the mapped columns and one date column
pub fn fallback_schema(columns: &ColumnMap) -> Schema {
    let text = [columns.customer.as_str(), columns.nomenclature.as_str()];
    let numbers = [columns.quantity.as_str(), columns.supply.as_str(), columns.price.as_str()];

    let mut defs: Vec<ColumnDef> = Vec::new();
    let mut push = |name: &str, ty: ColumnType| {
        if !defs.iter().any(|d| d.name == name) {
            defs.push(ColumnDef::new(name, ty));
        }
    };
    for name in text {
        push(name, ColumnType::Text);
    }
    for name in numbers {
        push(name, ColumnType::Number);
    }
    push(SYNTHETIC_DATE_COLUMN, ColumnType::Date);

    // names are deduplicated above
    Schema::new(defs).unwrap_or_default()
}

/// Turn a header row and raw rows into a table.
///
/// Blank headers become `Unnamed: <i>`, short rows are padded with missing
/// values and rows with no value at all are dropped.
pub(crate) fn assemble(
    headers: Vec<String>,
    rows: impl IntoIterator<Item = Vec<crate::types::Value>>,
) -> Result<Table, LoadError> {
    let headers: Vec<String> = headers
        .into_iter()
        .enumerate()
        .map(|(i, h)| {
            let h = h.trim().to_string();
            if h.is_empty() {
                format!("Unnamed: {}", i)
            } else {
                h
            }
        })
        .collect();
    let width = headers.len();

    let mut body = Vec::new();
    for (i, mut row) in rows.into_iter().enumerate() {
        if row.iter().all(|v| v.is_missing()) {
            continue;
        }
        if row.len() > width {
            if row[width..].iter().any(|v| !v.is_missing()) {
                return Err(LoadError::Malformed(format!(
                    "data row {} has {} cells but the header has {}",
                    i + 1,
                    row.len(),
                    width
                )));
            }
            row.truncate(width);
        }
        row.resize(width, crate::types::Value::Missing);
        body.push(row);
    }

    Table::infer(headers, body).map_err(|e| LoadError::Malformed(e.to_string()))
}
