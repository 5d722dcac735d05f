use crate::error::ExportError;
use crate::sources::columnar::date_to_days;
use crate::sources::spreadsheet::date_to_serial;
use crate::types::{ColumnType, Table, Value};
use arrow::array::{ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use parquet::arrow::ArrowWriter;
use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

const XLSX_MAX_ROWS: usize = 1_048_576;
const XLSX_MAX_COLUMNS: usize = 16_384;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutFormat {
    #[default]
    Xlsx,
    Csv,
    Parquet,
}

impl OutFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutFormat::Xlsx => "xlsx",
            OutFormat::Csv => "csv",
            OutFormat::Parquet => "parquet",
        }
    }
}

impl fmt::Display for OutFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xlsx" | "excel" => Ok(OutFormat::Xlsx),
            "csv" => Ok(OutFormat::Csv),
            "parquet" => Ok(OutFormat::Parquet),
            other => Err(format!("unknown output format `{}`", other)),
        }
    }
}

/// One-sheet workbook: header row of column names, then the data rows.
///
/// Dates are stored as serial numbers with a `yyyy-mm-dd` format so they read
/// back as dates; missing and non-finite values leave the cell blank.
pub fn to_exportable_bytes(table: &Table) -> Result<Vec<u8>, ExportError> {
    if table.len() >= XLSX_MAX_ROWS || table.schema().len() > XLSX_MAX_COLUMNS {
        return Err(ExportError::TooLarge {
            rows: table.len(),
            columns: table.schema().len(),
        });
    }

    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let sheet = workbook.add_worksheet();

    for (col, name) in table.schema().names().enumerate() {
        sheet.write_string(0, col as u16, name)?;
    }
    for (r, row) in table.rows().iter().enumerate() {
        let r = (r + 1) as u32;
        for (c, value) in row.iter().enumerate() {
            let c = c as u16;
            match value {
                Value::Missing => {}
                Value::Text(s) => {
                    sheet.write_string(r, c, s)?;
                }
                Value::Number(n) if n.is_finite() => {
                    sheet.write_number(r, c, *n)?;
                }
                Value::Number(_) => {}
                Value::Integer(i) => {
                    sheet.write_number(r, c, *i as f64)?;
                }
                Value::Date(d) => {
                    sheet.write_number_with_format(r, c, date_to_serial(*d), &date_format)?;
                }
                Value::Bool(b) => {
                    sheet.write_boolean(r, c, *b)?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

pub fn to_csv_bytes(table: &Table) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.schema().names())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

/// Single-batch Parquet file; column types follow the table schema
pub fn to_parquet_bytes(table: &Table) -> Result<Vec<u8>, ExportError> {
    let mut fields = Vec::with_capacity(table.schema().len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.schema().len());

    for (idx, column) in table.schema().columns().iter().enumerate() {
        let values = table.rows().iter().map(|r| &r[idx]);
        let (data_type, array): (DataType, ArrayRef) = match column.ty {
            ColumnType::Date => (
                DataType::Date32,
                Arc::new(Date32Array::from(
                    values
                        .map(|v| v.as_date().map(date_to_days))
                        .collect::<Vec<_>>(),
                )),
            ),
            ColumnType::Integer => (
                DataType::Int64,
                Arc::new(Int64Array::from(
                    values
                        .map(|v| match v {
                            Value::Integer(i) => Some(*i),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                )),
            ),
            ColumnType::Number | ColumnType::Empty => (
                DataType::Float64,
                Arc::new(Float64Array::from(values.map(Value::as_f64).collect::<Vec<_>>())),
            ),
            ColumnType::Boolean => (
                DataType::Boolean,
                Arc::new(BooleanArray::from(
                    values
                        .map(|v| match v {
                            Value::Bool(b) => Some(*b),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                )),
            ),
            ColumnType::Text | ColumnType::Mixed => (
                DataType::Utf8,
                Arc::new(StringArray::from(
                    values
                        .map(|v| (!v.is_missing()).then(|| v.to_string()))
                        .collect::<Vec<Option<String>>>(),
                )),
            ),
        };
        fields.push(Field::new(&column.name, data_type, true));
        arrays.push(array);
    }

    let schema = Arc::new(ArrowSchema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(buffer)
}

pub fn table_to_bytes(table: &Table, format: OutFormat) -> Result<Vec<u8>, ExportError> {
    match format {
        OutFormat::Xlsx => to_exportable_bytes(table),
        OutFormat::Csv => to_csv_bytes(table),
        OutFormat::Parquet => to_parquet_bytes(table),
    }
}

/// Writes derived tables as named export files
pub struct OutputWriter {
    output_dir: PathBuf,
    format: OutFormat,
    period: Option<(NaiveDate, NaiveDate)>,
}

impl OutputWriter {
    pub fn new(output_dir: impl Into<PathBuf>, format: OutFormat) -> Self {
        Self {
            output_dir: output_dir.into(),
            format,
            period: None,
        }
    }

    /// Tag file names with the filtered date range
    pub fn with_period(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.period = Some((from, to));
        self
    }

    /// Write `table` as `<output_dir>/<name>[_<from>-<to>].<ext>`
    pub fn write_table(&self, name: &str, table: &Table) -> Result<PathBuf, ExportError> {
        std::fs::create_dir_all(&self.output_dir)?;

        let output_path = self.output_dir.join(self.generate_filename(name));
        std::fs::write(&output_path, table_to_bytes(table, self.format)?)?;

        info!("Exported {} rows to {}", table.len(), output_path.display());
        Ok(output_path)
    }

    fn generate_filename(&self, name: &str) -> String {
        match self.period {
            Some((from, to)) => format!(
                "{}_{}-{}.{}",
                name,
                from.format("%Y%m%d"),
                to.format("%Y%m%d"),
                self.format.extension()
            ),
            None => format!("{}.{}", name, self.format.extension()),
        }
    }
}
