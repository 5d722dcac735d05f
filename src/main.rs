use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::sync::Arc;
use supply_analytics::aggregation::{date_bounds, date_columns};
use supply_analytics::cli::Args;
use supply_analytics::sources::{create_source, load_or_empty, SyntheticSource, TableSource};
use supply_analytics::{
    display_kpis, display_table, Aggregator, Config, Dashboard, OutputWriter, Schema, Snapshot,
    Table, Value,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let file_config = args.file_config()?;
    let config = args.into_config(file_config)?;

    info!("Starting supply analytics with config: {:?}", config);

    let source: Box<dyn TableSource> = match (config.synthetic_rows, &config.input) {
        (Some(rows), _) => Box::new(SyntheticSource::new(config.columns.clone(), rows, config.seed)),
        (None, Some(path)) => create_source(path, config.sheet.as_deref())?,
        (None, None) => bail!("Either --input or --synthetic is required"),
    };

    let table = load_or_empty(source.as_ref(), &config.columns);
    if let Err(e) = config.columns.validate(table.schema()) {
        warn!("Register does not match the column mapping: {}", e);
    }

    let snapshot = Snapshot::new(table);
    info!("Register snapshot {}", &snapshot.version()[..12]);

    let date_column = pick_date_column(&config, snapshot.table().schema());
    let period = date_column
        .as_deref()
        .and_then(|column| resolve_period(&config, snapshot.table(), column));

    let mut dashboard = Dashboard::new(Aggregator::new(snapshot), config.columns.clone());
    if let (Some(column), Some((start, end))) = (&date_column, period) {
        dashboard = dashboard.with_date_range(column.as_str(), start, end);
    }

    if let Some(table) = view("customer summary", dashboard.summary()) {
        display_table("Customer summary", &table);
    }

    if let Some(table) = view("top customers", dashboard.top_customers(config.top_customers)) {
        display_table(&format!("Top {} customers by supply", config.top_customers), &table);
    }

    let buyers = view("buyers", dashboard.buyers()).unwrap_or_default();
    info!("{} buyers in the selected period", buyers.len());

    let buyer = match &config.buyer {
        Some(name) => Some(Value::from(name.as_str())),
        None => buyers.first().cloned(),
    };

    if let Some(buyer) = &buyer {
        if !buyers.contains(buyer) {
            warn!("Buyer `{}` has no invoices in the selected period", buyer);
        }

        if let Some(kpis) = view("customer KPIs", dashboard.customer_kpis(buyer)) {
            display_kpis(&buyer.to_string(), &kpis);
        }

        if let Some(table) = view("customer detail", dashboard.customer_detail(buyer)) {
            display_table(&format!("Products of {}", buyer), &table);
        }

        let top_products = view("top products", dashboard.top_products(buyer, config.top_products));
        if let Some(table) = &top_products {
            display_table(&format!("Top {} products of {}", config.top_products, buyer), table);
        }
    } else {
        warn!("No buyers to show");
    }

    if config.export {
        let mut writer = OutputWriter::new(&config.output_dir, config.out_format);
        if let Some((start, end)) = period {
            writer = writer.with_period(start, end);
        }

        info!("Output directory: {}", config.output_dir.display());
        let written = dashboard.export(&writer, config.top_customers, buyer.as_ref())?;
        info!("Exported {} files", written.len());
    }

    let stats = dashboard.cache_stats();
    info!(
        "Query cache: {} hits, {} misses, {} tables held",
        stats.hits, stats.misses, stats.entries
    );
    info!("Supply analytics completed successfully!");

    Ok(())
}

/// Log a failed view and carry on with the others
fn view<T>(name: &str, result: supply_analytics::Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!("Skipping {} view: {}", name, e);
            None
        }
    }
}

/// The explicit --date-column, else the first column named like a date
fn pick_date_column(config: &Config, schema: &Schema) -> Option<String> {
    if let Some(column) = &config.date_column {
        return Some(column.clone());
    }
    let candidates = date_columns(schema, &config.columns.date_indicator);
    match candidates.first() {
        Some(column) => {
            info!("Using date column `{}` (of {} candidates)", column, candidates.len());
            Some(column.clone())
        }
        None => {
            if config.from.is_some() || config.to.is_some() {
                warn!("No date column found, ignoring --from/--to");
            }
            None
        }
    }
}

/// Date window to filter on: the requested bounds, defaulting to the data's own span
fn resolve_period(config: &Config, table: &Arc<Table>, column: &str) -> Option<(NaiveDate, NaiveDate)> {
    match date_bounds(table, column) {
        Ok(Some((first, last))) => {
            let start = config.from.unwrap_or(first);
            let end = config.to.unwrap_or(last);
            if start > end {
                warn!("Period {} to {} is empty", start, end);
            }
            info!("Invoices from {} to {}, showing {} to {}", first, last, start, end);
            Some((start, end))
        }
        Ok(None) => {
            warn!("Column `{}` holds no dates, showing the whole register", column);
            None
        }
        Err(e) => {
            warn!("Date filter disabled: {}", e);
            None
        }
    }
}
