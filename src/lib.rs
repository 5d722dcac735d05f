pub mod aggregation;
pub mod cache;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod display;
pub mod error;
pub mod output;
pub mod sources;
pub mod types;

// Re-exports for library users
pub use aggregation::{
    customer_kpis, date_bounds, date_columns, distinct_values, filter_by_date_range,
    filter_by_key, group_and_aggregate, kpis, top_n, Aggregator, Kpis, Query, Step,
};
pub use cache::{CacheStats, QueryCache};
pub use config::{ColumnMap, FileConfig};
pub use dashboard::Dashboard;
pub use display::{display_kpis, display_table};
pub use error::{Error, ExportError, LoadError, Result};
pub use output::{table_to_bytes, to_exportable_bytes, OutFormat, OutputWriter};
pub use sources::{create_source, load_or_empty, TableSource};
pub use types::{
    AggOp, AggregationRule, AggregationRules, ColumnDef, ColumnType, Config, Row, Schema,
    Snapshot, Table, Value, DEFAULT_TOP_CUSTOMERS, DEFAULT_TOP_PRODUCTS, PREVIEW_ROWS,
    SYNTHETIC_DATE_COLUMN,
};
