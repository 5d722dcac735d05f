use crate::cache::{cache_key, CacheStats, QueryCache};
use crate::config::ColumnMap;
use crate::error::{Error, Result};
use crate::types::{AggOp, AggregationRules, ColumnDef, Row, Schema, Snapshot, Table, Value};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Rows whose `date_column` holds a date within `[start, end]`.
///
/// Missing and non-date values never match; the schema is kept even when no row does.
pub fn filter_by_date_range(
    table: &Table,
    date_column: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Table> {
    let idx = table.column_index(date_column)?;
    Ok(table.filter_rows(|row| {
        row[idx]
            .as_date()
            .is_some_and(|d| start <= d && d <= end)
    }))
}

/// Rows whose `key_column` equals `value`. No match is an empty table, not an error.
pub fn filter_by_key(table: &Table, key_column: &str, value: &Value) -> Result<Table> {
    let idx = table.column_index(key_column)?;
    Ok(table.filter_rows(|row| row[idx] == *value))
}

/// Partition by each distinct non-missing key and reduce every rule column.
///
/// The result holds the key column followed by one column per rule, with rows sorted
/// by key. An aggregated column whose name is already taken (e.g. counting the key
/// column itself) is named `"<column> (<op>)"`, then `"<column> (<op>) #2"` and so on.
pub fn group_and_aggregate(
    table: &Table,
    key_column: &str,
    rules: &AggregationRules,
) -> Result<Table> {
    let key_idx = table.column_index(key_column)?;
    let mut columns = vec![table.schema().columns()[key_idx].clone()];
    let mut resolved = Vec::with_capacity(rules.len());

    for rule in rules.iter() {
        let idx = match rule.op {
            AggOp::CountDistinct => table.column_index(&rule.column)?,
            AggOp::Sum | AggOp::Mean => numeric_column(table, &rule.column)?,
        };
        let taken = |name: &str| columns.iter().any(|c: &ColumnDef| c.name == name);
        let mut name = rule.column.clone();
        if taken(&name) {
            name = format!("{} ({})", rule.column, rule.op);
        }
        let mut attempt = 2;
        while taken(&name) {
            name = format!("{} ({}) #{}", rule.column, rule.op, attempt);
            attempt += 1;
        }
        columns.push(ColumnDef::new(name, rule.op.output_type()));
        resolved.push((idx, rule.op));
    }
    let schema = Schema::new(columns)?;

    let mut slots: HashMap<&Value, usize> = HashMap::new();
    let mut partitions: Vec<(&Value, Vec<&Row>)> = Vec::new();
    for row in table.rows() {
        let key = &row[key_idx];
        if key.is_missing() {
            continue;
        }
        let slot = *slots.entry(key).or_insert_with(|| {
            partitions.push((key, Vec::new()));
            partitions.len() - 1
        });
        partitions[slot].1.push(row);
    }
    partitions.sort_by(|a, b| a.0.total_cmp(b.0));

    let rows = partitions
        .into_iter()
        .map(|(key, members)| {
            let mut out = Vec::with_capacity(resolved.len() + 1);
            out.push(key.clone());
            out.extend(
                resolved
                    .iter()
                    .map(|&(idx, op)| reduce(op, members.iter().map(|r| &r[idx]))),
            );
            out
        })
        .collect();

    Table::new(schema, rows)
}

/// The `n` rows with the largest `metric_column`, descending.
///
/// The sort is stable so ties keep their input order; missing metrics rank last.
pub fn top_n(summary: &Table, metric_column: &str, n: usize) -> Result<Table> {
    let idx = numeric_column(summary, metric_column)?;
    let mut ranked: Vec<&Row> = summary.rows().iter().collect();
    ranked.sort_by(|a, b| descending(&a[idx], &b[idx]));
    Ok(summary.with_rows(ranked.into_iter().take(n).cloned().collect()))
}

fn metric(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| !v.is_nan())
}

fn descending(a: &Value, b: &Value) -> Ordering {
    match (metric(a), metric(b)) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn numeric_column(table: &Table, name: &str) -> Result<usize> {
    let column = table.schema().column(name)?;
    if !column.ty.is_numeric() {
        return Err(Error::NonNumericColumn {
            column: name.to_string(),
            found: column.ty.to_string(),
        });
    }
    table.column_index(name)
}

fn reduce<'a>(op: AggOp, values: impl Iterator<Item = &'a Value>) -> Value {
    match op {
        AggOp::Sum => Value::Number(values.filter_map(metric).sum()),
        AggOp::Mean => {
            let (sum, count) = values
                .filter_map(metric)
                .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
            if count == 0 {
                // no data, distinct from a zero mean
                Value::Missing
            } else {
                Value::Number(sum / count as f64)
            }
        }
        AggOp::CountDistinct => {
            let distinct: HashSet<&Value> = values.filter(|v| !v.is_missing()).collect();
            Value::Integer(distinct.len() as i64)
        }
    }
}

/// Columns whose name contains `indicator`, compared case-insensitively
pub fn date_columns(schema: &Schema, indicator: &str) -> Vec<String> {
    let needle = indicator.to_lowercase();
    schema
        .names()
        .filter(|name| name.to_lowercase().contains(&needle))
        .map(String::from)
        .collect()
}

/// Earliest and latest date in a column, `None` when it holds no dates
pub fn date_bounds(table: &Table, column: &str) -> Result<Option<(NaiveDate, NaiveDate)>> {
    let bounds = table
        .column_values(column)?
        .filter_map(Value::as_date)
        .fold(None, |acc: Option<(NaiveDate, NaiveDate)>, d| match acc {
            None => Some((d, d)),
            Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
        });
    Ok(bounds)
}

/// Sorted distinct non-missing values of a column
pub fn distinct_values(table: &Table, column: &str) -> Result<Vec<Value>> {
    let mut seen = HashSet::new();
    let mut values: Vec<Value> = table
        .column_values(column)?
        .filter(|v| !v.is_missing() && seen.insert(*v))
        .cloned()
        .collect();
    values.sort_by(Value::total_cmp);
    Ok(values)
}

/// Headline figures for a set of register rows
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Kpis {
    pub supply_total: f64,
    pub quantity_total: f64,
    /// `None` when no row carries a price
    pub mean_price: Option<f64>,
    pub distinct_products: u64,
}

/// KPIs over every row of `table`
pub fn kpis(table: &Table, columns: &ColumnMap) -> Result<Kpis> {
    let supply = numeric_column(table, &columns.supply)?;
    let quantity = numeric_column(table, &columns.quantity)?;
    let price = numeric_column(table, &columns.price)?;
    let product = table.column_index(&columns.nomenclature)?;
    let rows = table.rows();

    let column = |idx: usize| rows.iter().map(move |r| &r[idx]);
    let number = |v: Value| v.as_f64();
    let count = match reduce(AggOp::CountDistinct, column(product)) {
        Value::Integer(n) => n.max(0) as u64,
        _ => 0,
    };

    Ok(Kpis {
        supply_total: number(reduce(AggOp::Sum, column(supply))).unwrap_or_default(),
        quantity_total: number(reduce(AggOp::Sum, column(quantity))).unwrap_or_default(),
        mean_price: number(reduce(AggOp::Mean, column(price))),
        distinct_products: count,
    })
}

/// KPIs for one customer's rows
pub fn customer_kpis(table: &Table, columns: &ColumnMap, customer: &Value) -> Result<Kpis> {
    kpis(&filter_by_key(table, &columns.customer, customer)?, columns)
}

/// One step of a derived-table query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    DateRange {
        column: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    Key {
        column: String,
        value: Value,
    },
    Group {
        key: String,
        rules: AggregationRules,
    },
    Top {
        metric: String,
        n: usize,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::DateRange { .. } => "date_range",
            Step::Key { .. } => "key",
            Step::Group { .. } => "group",
            Step::Top { .. } => "top",
        }
    }

    pub fn apply(&self, table: &Table) -> Result<Table> {
        match self {
            Step::DateRange { column, start, end } => {
                filter_by_date_range(table, column, *start, *end)
            }
            Step::Key { column, value } => filter_by_key(table, column, value),
            Step::Group { key, rules } => group_and_aggregate(table, key, rules),
            Step::Top { metric, n } => top_n(table, metric, *n),
        }
    }
}

/// A chain of steps applied to the snapshot table, left to right
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    steps: Vec<Step>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn date_range(self, column: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        self.then(Step::DateRange { column: column.into(), start, end })
    }

    pub fn key(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.then(Step::Key { column: column.into(), value: value.into() })
    }

    pub fn group(self, key: impl Into<String>, rules: AggregationRules) -> Self {
        self.then(Step::Group { key: key.into(), rules })
    }

    pub fn top(self, metric: impl Into<String>, n: usize) -> Self {
        self.then(Step::Top { metric: metric.into(), n })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Runs queries against one snapshot, memoizing every intermediate table.
///
/// Cached and uncached runs return identical tables; loading a snapshot with a
/// different version drops the whole cache.
#[derive(Debug)]
pub struct Aggregator {
    snapshot: Snapshot,
    cache: QueryCache,
}

impl Aggregator {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            cache: QueryCache::new(),
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn table(&self) -> &Arc<Table> {
        self.snapshot.table()
    }

    /// Swap in a newly loaded snapshot
    pub fn reload(&mut self, snapshot: Snapshot) {
        if snapshot.version() != self.snapshot.version() {
            let dropped = self.cache.invalidate();
            info!(
                "Source version changed to {}, dropped {} cached tables",
                &snapshot.version()[..12],
                dropped
            );
        }
        self.snapshot = snapshot;
    }

    pub fn run(&mut self, query: &Query) -> Result<Arc<Table>> {
        let steps = query.steps();
        if steps.is_empty() {
            return Ok(Arc::clone(self.snapshot.table()));
        }

        let keys: Vec<Option<String>> = (1..=steps.len())
            .map(|end| cache_key(self.snapshot.version(), &steps[..end]))
            .collect();

        if let Some(Some(full)) = keys.last() {
            if let Some(hit) = self.cache.get(full) {
                return Ok(hit);
            }
        }

        // resume from the longest cached prefix
        let mut current = Arc::clone(self.snapshot.table());
        let mut start = 0;
        for i in (0..steps.len() - 1).rev() {
            if let Some(hit) = keys[i].as_deref().and_then(|k| self.cache.peek(k)) {
                current = hit;
                start = i + 1;
                break;
            }
        }

        for (step, key) in steps.iter().zip(&keys).skip(start) {
            let next = Arc::new(step.apply(&current)?);
            debug!("{} -> {} rows", step.name(), next.len());
            if let Some(key) = key {
                self.cache.insert(key.clone(), Arc::clone(&next));
            }
            current = next;
        }
        Ok(current)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn register() -> Table {
        let rows = vec![
            vec!["A".into(), "bolt".into(), 2.0.into(), 100.0.into(), date(2024, 1, 5).into()],
            vec!["A".into(), "nut".into(), 3.0.into(), 50.0.into(), date(2024, 2, 5).into()],
            vec!["B".into(), "bolt".into(), 1.0.into(), 10.0.into(), Value::Missing],
            vec![Value::Missing, "nut".into(), 4.0.into(), 40.0.into(), date(2024, 3, 5).into()],
        ];
        Table::infer(vec!["customer", "product", "qty", "supply", "date"], rows).unwrap()
    }

    #[test]
    fn test_group_skips_missing_keys_and_sorts() {
        let rules = AggregationRules::new()
            .with("qty", AggOp::Sum)
            .with("supply", AggOp::Mean)
            .with("product", AggOp::CountDistinct);
        let summary = group_and_aggregate(&register(), "customer", &rules).unwrap();

        assert_eq!(summary.len(), 2);
        assert_eq!(summary.rows()[0][0], Value::from("A"));
        assert_eq!(summary.rows()[0][1], Value::Number(5.0));
        assert_eq!(summary.rows()[0][2], Value::Number(75.0));
        assert_eq!(summary.rows()[0][3], Value::Integer(2));
        assert_eq!(summary.rows()[1][0], Value::from("B"));

        let types: Vec<ColumnType> = summary.schema().columns().iter().map(|c| c.ty).collect();
        assert_eq!(
            types,
            vec![ColumnType::Text, ColumnType::Number, ColumnType::Number, ColumnType::Integer]
        );
    }

    #[test]
    fn test_rule_on_key_column_gets_suffixed_name() {
        let rules = AggregationRules::new().with("product", AggOp::CountDistinct);
        let summary = group_and_aggregate(&register(), "product", &rules).unwrap();
        let names: Vec<&str> = summary.schema().names().collect();
        assert_eq!(names, vec!["product", "product (count_distinct)"]);
        assert!(summary.rows().iter().all(|r| r[1] == Value::Integer(1)));
    }

    #[test]
    fn test_mean_of_empty_partition_is_no_data() {
        let rows = vec![vec!["A".into(), Value::Missing], vec!["A".into(), Value::Missing]];
        let table = Table::infer(vec!["k", "price"], rows).unwrap();
        let rules = AggregationRules::new()
            .with("price", AggOp::Mean)
            .with("price", AggOp::Sum);
        let summary = group_and_aggregate(&table, "k", &rules).unwrap();
        assert_eq!(summary.rows()[0][1], Value::Missing);
        assert_eq!(summary.rows()[0][2], Value::Number(0.0));
    }

    #[test]
    fn test_sum_of_text_column_is_rejected() {
        let rules = AggregationRules::new().with("product", AggOp::Sum);
        let err = group_and_aggregate(&register(), "customer", &rules).unwrap_err();
        assert!(matches!(err, Error::NonNumericColumn { column, .. } if column == "product"));
    }

    #[test]
    fn test_unknown_columns_are_invalid() {
        let rules = AggregationRules::new().with("nope", AggOp::Sum);
        assert!(matches!(
            group_and_aggregate(&register(), "customer", &rules),
            Err(Error::InvalidColumn(c)) if c == "nope"
        ));
        assert!(matches!(
            group_and_aggregate(&register(), "nope", &AggregationRules::new()),
            Err(Error::InvalidColumn(_))
        ));
        assert!(filter_by_key(&register(), "nope", &"A".into()).is_err());
        assert!(filter_by_date_range(&register(), "nope", date(2024, 1, 1), date(2024, 1, 2)).is_err());
        assert!(top_n(&register(), "nope", 1).is_err());
    }

    #[test]
    fn test_date_range_is_inclusive_and_skips_missing() {
        let filtered =
            filter_by_date_range(&register(), "date", date(2024, 1, 5), date(2024, 2, 5)).unwrap();
        assert_eq!(filtered.len(), 2);

        let reversed =
            filter_by_date_range(&register(), "date", date(2024, 2, 5), date(2024, 1, 5)).unwrap();
        assert!(reversed.is_empty());
        assert_eq!(reversed.schema(), register().schema());
    }

    #[test]
    fn test_top_n_stable_and_missing_last() {
        let rows = vec![
            vec!["a".into(), Value::Missing],
            vec!["b".into(), 5.0.into()],
            vec!["c".into(), 7.0.into()],
            vec!["d".into(), 5.0.into()],
        ];
        let table = Table::infer(vec!["k", "m"], rows).unwrap();
        let top = top_n(&table, "m", 10).unwrap();
        let keys: Vec<String> = top.rows().iter().map(|r| r[0].to_string()).collect();
        assert_eq!(keys, vec!["c", "b", "d", "a"]);
        assert_eq!(top_n(&table, "m", 2).unwrap().len(), 2);
        assert!(top_n(&table, "k", 1).is_err());
    }

    #[test]
    fn test_date_helpers() {
        let schema = Schema::new(vec![
            ColumnDef::new("Дата складання ПН", ColumnType::Date),
            ColumnDef::new("Дата реєстрації", ColumnType::Date),
            ColumnDef::new("Покупець", ColumnType::Text),
        ])
        .unwrap();
        assert_eq!(
            date_columns(&schema, "дата"),
            vec!["Дата складання ПН".to_string(), "Дата реєстрації".to_string()]
        );
        assert_eq!(
            date_bounds(&register(), "date").unwrap(),
            Some((date(2024, 1, 5), date(2024, 3, 5)))
        );
        assert_eq!(date_bounds(&register(), "customer").unwrap(), None);
    }

    #[test]
    fn test_distinct_values_sorted() {
        let values = distinct_values(&register(), "customer").unwrap();
        assert_eq!(values, vec![Value::from("A"), Value::from("B")]);
    }

    #[test]
    fn test_aggregator_caches_prefixes() {
        let mut aggregator = Aggregator::new(Snapshot::new(register()));
        let rules = AggregationRules::new().with("supply", AggOp::Sum);
        let summary = Query::new().group("customer", rules.clone());
        let top = summary.clone().top("supply", 1);

        let first = aggregator.run(&top).unwrap();
        let again = aggregator.run(&top).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(aggregator.cache_stats().hits, 1);

        // the grouping step was cached on the way
        let grouped = aggregator.run(&summary).unwrap();
        assert_eq!(*grouped, group_and_aggregate(&register(), "customer", &rules).unwrap());
        assert_eq!(aggregator.cache_stats().hits, 2);
    }

    #[test]
    fn test_non_finite_keys_are_cached_apart() {
        let rows = [f64::INFINITY, f64::NAN, f64::NEG_INFINITY]
            .into_iter()
            .map(|v| vec![Value::Number(v)])
            .collect();
        let table = Table::infer(vec!["k"], rows).unwrap();
        let mut aggregator = Aggregator::new(Snapshot::new(table.clone()));

        for value in [f64::INFINITY, f64::NAN, f64::NEG_INFINITY] {
            let cached = aggregator.run(&Query::new().key("k", value)).unwrap();
            let direct = filter_by_key(&table, "k", &Value::Number(value)).unwrap();
            assert_eq!(*cached, direct);
            assert_eq!(cached.len(), 1);
        }
        assert_eq!(aggregator.cache_stats().entries, 3);
    }

    #[test]
    fn test_repeated_collisions_get_numbered() {
        let rows = vec![
            vec![1.0.into(), 10.0.into()],
            vec![1.0.into(), 20.0.into()],
            vec![2.0.into(), 30.0.into()],
        ];
        let table = Table::infer(vec!["x", "x (sum)"], rows).unwrap();
        let rules = AggregationRules::new()
            .with("x (sum)", AggOp::Sum)
            .with("x", AggOp::Sum);
        let summary = group_and_aggregate(&table, "x", &rules).unwrap();

        let names: Vec<&str> = summary.schema().names().collect();
        assert_eq!(names, vec!["x", "x (sum)", "x (sum) #2"]);
        assert_eq!(summary.rows()[0], vec![Value::Number(1.0), 30.0.into(), 2.0.into()]);
    }

    #[test]
    fn test_nan_cells_are_skipped_like_missing() {
        let rows = vec![
            vec!["A".into(), 2.0.into()],
            vec!["A".into(), f64::NAN.into()],
            vec!["B".into(), f64::NAN.into()],
        ];
        let table = Table::infer(vec!["k", "v"], rows).unwrap();
        let rules = AggregationRules::new()
            .with("v", AggOp::Sum)
            .with("v", AggOp::Mean);
        let summary = group_and_aggregate(&table, "k", &rules).unwrap();

        assert_eq!(summary.rows()[0][1], Value::Number(2.0));
        assert_eq!(summary.rows()[0][2], Value::Number(2.0));
        assert_eq!(summary.rows()[1][1], Value::Number(0.0));
        assert_eq!(summary.rows()[1][2], Value::Missing);
    }

    #[test]
    fn test_reload_invalidates() {
        let mut aggregator = Aggregator::new(Snapshot::new(register()));
        let query = Query::new().key("customer", "A");
        assert_eq!(aggregator.run(&query).unwrap().len(), 2);

        let smaller = register().filter_rows(|r| r[0] != Value::from("A") || r[1] == Value::from("bolt"));
        aggregator.reload(Snapshot::new(smaller));
        assert_eq!(aggregator.cache_stats().entries, 0);
        assert_eq!(aggregator.run(&query).unwrap().len(), 1);
    }
}
