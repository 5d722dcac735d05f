use crate::error::LoadError;
use crate::sources::TableSource;
use crate::types::{Table, Value};
use arrow::array::{
    Array, BooleanArray, Date32Array, Float32Array, Float64Array, Int32Array, Int64Array,
    LargeStringArray, StringArray,
};
use arrow::datatypes::DataType;
use bytes::Bytes;
use chrono::{Duration, NaiveDate};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::path::PathBuf;

/// Parquet file, as written by [`crate::output::OutFormat::Parquet`]
pub struct ParquetSource {
    path: PathBuf,
}

impl ParquetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TableSource for ParquetSource {
    fn load(&self) -> Result<Table, LoadError> {
        let bytes = std::fs::read(&self.path).map_err(|source| LoadError::Io {
            path: self.path.clone(),
            source,
        })?;
        read_parquet_bytes(bytes)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

pub fn read_parquet_bytes(bytes: impl Into<Bytes>) -> Result<Table, LoadError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes.into())?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| LoadError::Malformed(e.to_string()))?;
        let columns = batch
            .columns()
            .iter()
            .map(|array| column_values(array.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        for i in 0..batch.num_rows() {
            rows.push(columns.iter().map(|c| c[i].clone()).collect());
        }
    }

    Table::infer(headers, rows).map_err(|e| LoadError::Malformed(e.to_string()))
}

fn column_values(array: &dyn Array) -> Result<Vec<Value>, LoadError> {
    match array.data_type() {
        DataType::Utf8 => collect(array, |a: &StringArray, i| Value::Text(a.value(i).to_string())),
        DataType::LargeUtf8 => {
            collect(array, |a: &LargeStringArray, i| Value::Text(a.value(i).to_string()))
        }
        DataType::Float64 => collect(array, |a: &Float64Array, i| Value::Number(a.value(i))),
        DataType::Float32 => {
            collect(array, |a: &Float32Array, i| Value::Number(f64::from(a.value(i))))
        }
        DataType::Int64 => collect(array, |a: &Int64Array, i| Value::Integer(a.value(i))),
        DataType::Int32 => {
            collect(array, |a: &Int32Array, i| Value::Integer(i64::from(a.value(i))))
        }
        DataType::Boolean => collect(array, |a: &BooleanArray, i| Value::Bool(a.value(i))),
        DataType::Date32 => collect(array, |a: &Date32Array, i| {
            days_to_date(a.value(i)).map_or(Value::Missing, Value::Date)
        }),
        DataType::Null => Ok(vec![Value::Missing; array.len()]),
        other => Err(LoadError::Malformed(format!(
            "unsupported parquet column type {}",
            other
        ))),
    }
}

fn collect<A: Array + 'static>(
    array: &dyn Array,
    value: impl Fn(&A, usize) -> Value,
) -> Result<Vec<Value>, LoadError> {
    let typed = array.as_any().downcast_ref::<A>().ok_or_else(|| {
        LoadError::Malformed(format!("unexpected array for {}", array.data_type()))
    })?;
    Ok((0..typed.len())
        .map(|i| if typed.is_null(i) { Value::Missing } else { value(typed, i) })
        .collect())
}

pub(crate) fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1970, 1, 1)?.checked_add_signed(Duration::days(i64::from(days)))
}

pub(crate) fn date_to_days(date: NaiveDate) -> i32 {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .map(|epoch| (date - epoch).num_days() as i32)
        .unwrap_or_default()
}
