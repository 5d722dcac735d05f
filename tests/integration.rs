use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use supply_analytics::output::{to_csv_bytes, to_parquet_bytes};
use supply_analytics::sources::columnar::read_parquet_bytes;
use supply_analytics::sources::delimited::read_csv_bytes;
use supply_analytics::sources::{read_spreadsheet_bytes, SyntheticSource};
use supply_analytics::{
    customer_kpis, filter_by_date_range, filter_by_key, group_and_aggregate, to_exportable_bytes,
    top_n, AggOp, AggregationRules, Aggregator, ColumnDef, ColumnMap, ColumnType, Dashboard, Error,
    OutFormat, OutputWriter, Query, Schema, Snapshot, Table, TableSource, Value,
    SYNTHETIC_DATE_COLUMN,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// The three-row register used throughout
fn scenario() -> Table {
    Table::infer(
        vec!["customer", "qty", "supply"],
        vec![
            vec!["A".into(), 2.0.into(), 100.0.into()],
            vec!["A".into(), 3.0.into(), 50.0.into()],
            vec!["B".into(), 1.0.into(), 10.0.into()],
        ],
    )
    .unwrap()
}

fn sums() -> AggregationRules {
    AggregationRules::new()
        .with("qty", AggOp::Sum)
        .with("supply", AggOp::Sum)
}

fn synthetic(rows: usize, seed: u64) -> Table {
    SyntheticSource::new(ColumnMap::default(), rows, seed)
        .load()
        .unwrap()
}

fn assert_same_cells(expected: &Table, actual: &Table) {
    let expected_names: Vec<&str> = expected.schema().names().collect();
    let actual_names: Vec<&str> = actual.schema().names().collect();
    assert_eq!(expected_names, actual_names);
    assert_eq!(expected.len(), actual.len());

    for (e_row, a_row) in expected.rows().iter().zip(actual.rows()) {
        for (e, a) in e_row.iter().zip(a_row) {
            match (e.as_f64(), a.as_f64()) {
                (Some(x), Some(y)) => assert!((x - y).abs() < 1e-9, "{} != {}", x, y),
                _ => assert_eq!(e, a),
            }
        }
    }
}

#[test]
fn test_scenario_group_by_customer() {
    let summary = group_and_aggregate(&scenario(), "customer", &sums()).unwrap();

    let rows: HashSet<Vec<Value>> = summary.rows().iter().cloned().collect();
    let expected: HashSet<Vec<Value>> = [
        vec!["A".into(), 5.0.into(), 150.0.into()],
        vec!["B".into(), 1.0.into(), 10.0.into()],
    ]
    .into_iter()
    .collect();
    assert_eq!(rows, expected);
}

#[test]
fn test_scenario_top_one() {
    let summary = group_and_aggregate(&scenario(), "customer", &sums()).unwrap();
    let top = top_n(&summary, "supply", 1).unwrap();
    let expected: Vec<Value> = vec!["A".into(), 5.0.into(), 150.0.into()];
    assert_eq!(top.len(), 1);
    assert_eq!(top.rows()[0], expected);
}

#[test]
fn test_scenario_date_range_excluding_everything() {
    let register = synthetic(50, 3);
    let filtered =
        filter_by_date_range(&register, SYNTHETIC_DATE_COLUMN, date(2030, 1, 1), date(2030, 12, 31))
            .unwrap();
    assert!(filtered.is_empty());
    assert_eq!(filtered.schema(), register.schema());
}

#[test]
fn test_one_row_per_distinct_key() {
    let register = synthetic(500, 11);
    let columns = ColumnMap::default();
    let summary = group_and_aggregate(&register, &columns.customer, &columns.dashboard_rules()).unwrap();

    let keys: HashSet<&Value> = register
        .column_values(&columns.customer)
        .unwrap()
        .filter(|v| !v.is_missing())
        .collect();
    let grouped: HashSet<&Value> = summary.column_values(&columns.customer).unwrap().collect();

    assert_eq!(summary.len(), keys.len());
    assert_eq!(grouped, keys);
}

#[test]
fn test_filter_by_key_is_idempotent() {
    let register = synthetic(300, 5);
    let columns = ColumnMap::default();
    let buyer = register.rows()[0][0].clone();

    let once = filter_by_key(&register, &columns.customer, &buyer).unwrap();
    let twice = filter_by_key(&once, &columns.customer, &buyer).unwrap();
    assert_eq!(once, twice);
    assert!(!once.is_empty());
}

#[test]
fn test_top_n_ordering_and_length() {
    let register = synthetic(400, 9);
    let columns = ColumnMap::default();
    let summary = group_and_aggregate(&register, &columns.customer, &columns.dashboard_rules()).unwrap();

    for n in [0, 1, 3, summary.len(), summary.len() + 10] {
        let top = top_n(&summary, &columns.supply, n).unwrap();
        assert_eq!(top.len(), n.min(summary.len()));

        let supply: Vec<f64> = top
            .column_values(&columns.supply)
            .unwrap()
            .filter_map(Value::as_f64)
            .collect();
        assert!(supply.windows(2).all(|w| w[0] >= w[1]));
    }

    let max = summary
        .column_values(&columns.supply)
        .unwrap()
        .filter_map(Value::as_f64)
        .fold(f64::MIN, f64::max);
    let top = top_n(&summary, &columns.supply, 1).unwrap();
    assert_eq!(top.get(0, &columns.supply).unwrap(), Some(&Value::Number(max)));
}

#[test]
fn test_group_empty_table_keeps_schema() {
    let schema = Schema::new(vec![
        ColumnDef::new("customer", ColumnType::Text),
        ColumnDef::new("qty", ColumnType::Number),
        ColumnDef::new("supply", ColumnType::Number),
    ])
    .unwrap();
    let summary = group_and_aggregate(&Table::empty(schema), "customer", &sums()).unwrap();

    assert!(summary.is_empty());
    let names: Vec<&str> = summary.schema().names().collect();
    assert_eq!(names, vec!["customer", "qty", "supply"]);
}

#[test]
fn test_mean_without_data_is_marked_missing() {
    let table = Table::infer(
        vec!["customer", "price"],
        vec![
            vec!["A".into(), Value::Missing],
            vec!["B".into(), 4.0.into()],
        ],
    )
    .unwrap();
    let rules = AggregationRules::new().with("price", AggOp::Mean);
    let summary = group_and_aggregate(&table, "customer", &rules).unwrap();

    assert_eq!(summary.get(0, "price").unwrap(), Some(&Value::Missing));
    assert_eq!(summary.get(1, "price").unwrap(), Some(&Value::Number(4.0)));
}

#[test]
fn test_unknown_column_is_reported() {
    let err = group_and_aggregate(&scenario(), "buyer", &sums()).unwrap_err();
    assert!(matches!(err, Error::InvalidColumn(c) if c == "buyer"));
}

#[test]
fn test_xlsx_round_trip_of_summary() {
    let register = synthetic(300, 21);
    let columns = ColumnMap::default();
    let summary = group_and_aggregate(&register, &columns.customer, &columns.dashboard_rules()).unwrap();

    let bytes = to_exportable_bytes(&summary).unwrap();
    let back = read_spreadsheet_bytes(&bytes).unwrap();
    assert_same_cells(&summary, &back);
}

#[test]
fn test_xlsx_round_trip_keeps_dates() {
    let register = synthetic(40, 2);
    let bytes = to_exportable_bytes(&register).unwrap();
    let back = read_spreadsheet_bytes(&bytes).unwrap();

    assert_same_cells(&register, &back);
    assert_eq!(
        back.schema().column(SYNTHETIC_DATE_COLUMN).unwrap().ty,
        ColumnType::Date
    );
}

#[test]
fn test_csv_and_parquet_round_trip() {
    let register = synthetic(120, 8);
    let columns = ColumnMap::default();
    let detail = group_and_aggregate(&register, &columns.nomenclature, &columns.dashboard_rules()).unwrap();

    assert_same_cells(&register, &read_csv_bytes(&to_csv_bytes(&register).unwrap()).unwrap());
    assert_same_cells(&detail, &read_csv_bytes(&to_csv_bytes(&detail).unwrap()).unwrap());

    let back = read_parquet_bytes(to_parquet_bytes(&detail).unwrap()).unwrap();
    assert_eq!(back, detail);
}

#[test]
fn test_csv_round_trip_keeps_code_like_text() {
    let table = Table::infer(
        vec!["code", "qty"],
        vec![
            vec!["0012".into(), 1.0.into()],
            vec!["01.02.2024".into(), 2.0.into()],
        ],
    )
    .unwrap();

    let back = read_csv_bytes(&to_csv_bytes(&table).unwrap()).unwrap();
    assert_eq!(back, table);
}

#[test]
fn test_xlsx_keeps_surrounding_spaces_in_names() {
    let table = Table::infer(
        vec!["customer", "supply"],
        vec![
            vec!["ТОВ Альфа".into(), 1.0.into()],
            vec!["ТОВ Альфа ".into(), 2.0.into()],
        ],
    )
    .unwrap();

    let back = read_spreadsheet_bytes(&to_exportable_bytes(&table).unwrap()).unwrap();
    let summary = group_and_aggregate(&back, "customer", &AggregationRules::new().with("supply", AggOp::Sum)).unwrap();
    assert_eq!(summary.len(), 2);
}

#[test]
fn test_cached_queries_match_direct_calls() {
    let register = synthetic(250, 13);
    let columns = ColumnMap::default();
    let rules = columns.dashboard_rules();
    let (start, end) = (date(2024, 1, 15), date(2024, 2, 15));

    let query = Query::new()
        .date_range(SYNTHETIC_DATE_COLUMN, start, end)
        .group(&columns.customer, rules.clone())
        .top(&columns.supply, 3);

    let direct = {
        let filtered = filter_by_date_range(&register, SYNTHETIC_DATE_COLUMN, start, end).unwrap();
        let summary = group_and_aggregate(&filtered, &columns.customer, &rules).unwrap();
        top_n(&summary, &columns.supply, 3).unwrap()
    };

    let mut aggregator = Aggregator::new(Snapshot::new(register.clone()));
    assert_eq!(*aggregator.run(&query).unwrap(), direct);
    assert_eq!(*aggregator.run(&query).unwrap(), direct);
    assert_eq!(aggregator.cache_stats().hits, 1);

    // same content, same version: the cache survives
    aggregator.reload(Snapshot::new(register));
    assert_eq!(aggregator.cache_stats().entries, 3);

    let other = synthetic(250, 14);
    aggregator.reload(Snapshot::new(other.clone()));
    assert_eq!(aggregator.cache_stats().entries, 0);
    let fresh = Aggregator::new(Snapshot::new(other)).run(&query).unwrap();
    assert_eq!(aggregator.run(&query).unwrap(), fresh);
}

#[test]
fn test_kpis_agree_with_summary() {
    let register = synthetic(300, 17);
    let columns = ColumnMap::default();
    let summary = group_and_aggregate(&register, &columns.customer, &columns.dashboard_rules()).unwrap();

    for (i, row) in summary.rows().iter().enumerate() {
        let kpis = customer_kpis(&register, &columns, &row[0]).unwrap();
        let number = |name: &str| summary.get(i, name).unwrap().and_then(Value::as_f64);

        assert!((kpis.supply_total - number(&columns.supply).unwrap()).abs() < 1e-6);
        assert!((kpis.quantity_total - number(&columns.quantity).unwrap()).abs() < 1e-6);
        match (kpis.mean_price, number(&columns.price)) {
            (Some(a), Some(b)) => assert!((a - b).abs() < 1e-6),
            (a, b) => assert_eq!(a, b),
        }
        assert_eq!(
            Value::Integer(kpis.distinct_products as i64),
            *summary.get(i, &columns.nomenclature).unwrap().unwrap()
        );
    }
}

#[test]
fn test_dashboard_over_synthetic_register() {
    let columns = ColumnMap::default();
    let register = synthetic(600, 42);
    let aggregator = Aggregator::new(Snapshot::new(register));
    let mut dashboard = Dashboard::new(aggregator, columns.clone()).with_date_range(
        SYNTHETIC_DATE_COLUMN,
        date(2024, 1, 1),
        date(2024, 1, 31),
    );

    let buyers = dashboard.buyers().unwrap();
    assert!(!buyers.is_empty());

    let summary = dashboard.summary().unwrap();
    assert_eq!(summary.len(), buyers.len());

    let top = dashboard.top_customers(5).unwrap();
    assert_eq!(top.len(), buyers.len().min(5));

    let detail = dashboard.customer_detail(&buyers[0]).unwrap();
    let count_column = format!("{} (count_distinct)", columns.nomenclature);
    assert!(detail.schema().contains(&count_column));
    assert!(detail
        .column_values(&count_column)
        .unwrap()
        .all(|v| *v == Value::Integer(1)));

    let top_products = dashboard.top_products(&buyers[0], 10).unwrap();
    assert_eq!(top_products.len(), detail.len().min(10));
}

#[test]
fn test_output_writer_exports_every_format() {
    let dir = tempfile::tempdir().unwrap();
    let summary = group_and_aggregate(&scenario(), "customer", &sums()).unwrap();

    for format in [OutFormat::Xlsx, OutFormat::Csv, OutFormat::Parquet] {
        let writer = OutputWriter::new(dir.path(), format).with_period(date(2024, 1, 1), date(2024, 1, 31));
        let path = writer.write_table("summary", &summary).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("summary_20240101-20240131.{}", format.extension())
        );

        let source = supply_analytics::create_source(&path, None).unwrap();
        assert_same_cells(&summary, &source.load().unwrap());
    }
}
