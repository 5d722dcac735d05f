use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by table operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("column `{0}` is not present in the table schema")]
    InvalidColumn(String),

    #[error("column `{column}` holds {found} values, expected numbers")]
    NonNumericColumn { column: String, found: String },

    #[error("column `{0}` appears more than once in the schema")]
    DuplicateColumn(String),

    #[error("row {row} has {found} values, schema has {expected} columns")]
    RaggedRow { row: usize, found: usize, expected: usize },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// The source table could not be read.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read workbook: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("workbook has no sheets")]
    NoSheets,

    #[error("failed to read csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to read parquet: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("malformed table: {0}")]
    Malformed(String),

    #[error("unsupported source format `{0}`")]
    UnsupportedFormat(String),
}

/// A table could not be serialized for export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("xlsx writer: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("csv writer: {0}")]
    Csv(#[from] csv::Error),

    #[error("parquet writer: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow batch: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("table too large for a worksheet ({rows} rows x {columns} columns)")]
    TooLarge { rows: usize, columns: usize },
}
