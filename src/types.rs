use crate::config::ColumnMap;
use crate::error::{Error, Result};
use crate::output::OutFormat;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_TOP_CUSTOMERS: usize = 5;
pub const DEFAULT_TOP_PRODUCTS: usize = 10;
/// Rows shown at each end of a console preview
pub const PREVIEW_ROWS: usize = 10;
/// Date column emitted by the synthetic source and kept in fallback schemas
pub const SYNTHETIC_DATE_COLUMN: &str = "Дата складання ПН";

/// A single cell of a register
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Missing,
    Text(String),
    Number(f64),
    Integer(i64),
    Date(NaiveDate),
    Bool(bool),
}

// -0.0 and 0.0 are one key, and so is every NaN.
fn canonical_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

fn canonical(value: f64) -> f64 {
    f64::from_bits(canonical_bits(value))
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Missing => ColumnType::Empty,
            Value::Text(_) => ColumnType::Text,
            Value::Number(_) => ColumnType::Number,
            Value::Integer(_) => ColumnType::Integer,
            Value::Date(_) => ColumnType::Date,
            Value::Bool(_) => ColumnType::Boolean,
        }
    }

    /// Interpret a raw text cell, as found in CSV registers.
    ///
    /// Accepts ISO and dotted (`31.12.2024`) dates, ISO datetimes (time is dropped),
    /// and numbers written with a decimal comma or grouped with spaces.
    pub fn parse_cell(raw: &str) -> Value {
        let s = raw.trim();
        if s.is_empty() {
            return Value::Missing;
        }
        if s.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if s.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
        if let Some(date) = parse_date(s) {
            return Value::Date(date);
        }
        if let Some(number) = parse_number(s) {
            return Value::Number(number);
        }
        Value::Text(s.to_string())
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Missing => 0,
            Value::Bool(_) => 1,
            Value::Number(_) | Value::Integer(_) => 2,
            Value::Date(_) => 3,
            Value::Text(_) => 4,
        }
    }

    /// Total order: missing < bool < numeric < date < text
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => canonical(a).total_cmp(&canonical(b)),
                _ => self.rank().cmp(&other.rank()),
            },
        }
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%d.%m.%Y") {
        return Some(date);
    }
    // 2024-03-01T10:00:00 / 2024-03-01 10:00:00
    let (head, tail) = (s.get(..10)?, s.get(10..)?);
    if tail.starts_with('T') || tail.starts_with(' ') {
        return NaiveDate::parse_from_str(head, "%Y-%m-%d").ok();
    }
    None
}

fn parse_number(s: &str) -> Option<f64> {
    let mut cleaned: String = s.chars().filter(|c| *c != ' ' && *c != '\u{a0}').collect();
    if cleaned.contains(',') && !cleaned.contains('.') {
        cleaned = cleaned.replacen(',', ".", 1);
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Missing, Value::Missing) => true,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => canonical_bits(a) == canonical_bits(b),
                _ => false,
            },
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Missing => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => canonical_bits(*n).hash(state),
            Value::Integer(i) => canonical_bits(*i as f64).hash(state),
            Value::Date(d) => d.hash(state),
            Value::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Missing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Every value is missing
    Empty,
    Text,
    Number,
    Integer,
    Date,
    Boolean,
    Mixed,
}

impl ColumnType {
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        values
            .into_iter()
            .fold(ColumnType::Empty, |acc, v| acc.merge(v.column_type()))
    }

    fn merge(self, other: Self) -> Self {
        use ColumnType::*;
        match (self, other) {
            (Empty, t) | (t, Empty) => t,
            (a, b) if a == b => a,
            (Number, Integer) | (Integer, Number) => Number,
            _ => Mixed,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Empty | ColumnType::Number | ColumnType::Integer)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Empty => "empty",
            ColumnType::Text => "text",
            ColumnType::Number => "number",
            ColumnType::Integer => "integer",
            ColumnType::Date => "date",
            ColumnType::Boolean => "boolean",
            ColumnType::Mixed => "mixed",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self { name: name.into(), ty }
    }
}

/// Ordered, uniquely named columns of a table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnDef>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(Error::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::InvalidColumn(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<&ColumnDef> {
        self.index_of(name).map(|i| &self.columns[i])
    }
}

pub type Row = Vec<Value>;

/// Rows sharing one schema, in source order.
///
/// Tables are never mutated once built; every operation returns a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    schema: Schema,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(schema: Schema, rows: Vec<Row>) -> Result<Self> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != schema.len() {
                return Err(Error::RaggedRow {
                    row: i,
                    found: row.len(),
                    expected: schema.len(),
                });
            }
        }
        Ok(Self { schema, rows })
    }

    /// Build a table from raw header names, inferring each column's type.
    pub fn infer<S: Into<String>>(names: Vec<S>, rows: Vec<Row>) -> Result<Self> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let columns = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let ty = ColumnType::infer(rows.iter().filter_map(|r| r.get(i)));
                ColumnDef::new(name, ty)
            })
            .collect();
        Table::new(Schema::new(columns)?, rows)
    }

    pub fn empty(schema: Schema) -> Self {
        Self { schema, rows: Vec::new() }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.schema.index_of(name)
    }

    pub fn column_values(&self, name: &str) -> Result<impl Iterator<Item = &Value>> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(move |r| &r[idx]))
    }

    pub fn get(&self, row: usize, column: &str) -> Result<Option<&Value>> {
        let idx = self.column_index(column)?;
        Ok(self.rows.get(row).map(|r| &r[idx]))
    }

    /// New table with the same schema holding the rows that pass `keep`
    pub fn filter_rows(&self, mut keep: impl FnMut(&Row) -> bool) -> Table {
        Table {
            schema: self.schema.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    pub(crate) fn with_rows(&self, rows: Vec<Row>) -> Table {
        Table { schema: self.schema.clone(), rows }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggOp {
    Sum,
    Mean,
    CountDistinct,
}

impl AggOp {
    pub fn output_type(self) -> ColumnType {
        match self {
            AggOp::Sum | AggOp::Mean => ColumnType::Number,
            AggOp::CountDistinct => ColumnType::Integer,
        }
    }
}

impl fmt::Display for AggOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggOp::Sum => write!(f, "sum"),
            AggOp::Mean => write!(f, "mean"),
            AggOp::CountDistinct => write!(f, "count_distinct"),
        }
    }
}

impl FromStr for AggOp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(AggOp::Sum),
            "mean" | "avg" => Ok(AggOp::Mean),
            "count_distinct" | "nunique" => Ok(AggOp::CountDistinct),
            other => Err(format!("unknown aggregation `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationRule {
    pub column: String,
    pub op: AggOp,
}

/// Ordered aggregation rules; the order is the summary's column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationRules(Vec<AggregationRule>);

impl AggregationRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, op: AggOp) -> Self {
        self.0.push(AggregationRule { column: column.into(), op });
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &AggregationRule> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, AggOp)> for AggregationRules {
    fn from_iter<I: IntoIterator<Item = (S, AggOp)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(AggregationRules::new(), |rules, (column, op)| rules.with(column, op))
    }
}

/// An immutable loaded table and the content version it is cached under
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: String,
    table: Arc<Table>,
}

impl Snapshot {
    pub fn new(table: Table) -> Self {
        let version = crate::cache::table_version(&table);
        Self { version, table: Arc::new(table) }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub input: Option<PathBuf>,
    pub sheet: Option<String>,
    pub synthetic_rows: Option<usize>,
    pub seed: u64,
    pub columns: ColumnMap,
    pub date_column: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub buyer: Option<String>,
    pub top_customers: usize,
    pub top_products: usize,
    pub export: bool,
    pub out_format: OutFormat,
    pub output_dir: PathBuf,
}
