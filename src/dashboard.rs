//! Per-customer views over a loaded register.
//!
//! Every view is a [`Query`] rooted at the optional date filter and run
//! through the [`Aggregator`], so views sharing a prefix (summary and top
//! customers, detail and top products) reuse each other's work.

use crate::aggregation::{distinct_values, kpis, Aggregator, Kpis, Query};
use crate::cache::CacheStats;
use crate::config::ColumnMap;
use crate::error::Result;
use crate::output::OutputWriter;
use crate::types::{Table, Value};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

pub const SUMMARY_EXPORT: &str = "summary";
pub const DETAIL_EXPORT: &str = "detail";

/// File stem of the top customers export, e.g. `top5`
pub fn top_customers_export(n: usize) -> String {
    format!("top{}", n)
}

pub struct Dashboard {
    aggregator: Aggregator,
    columns: ColumnMap,
    base: Query,
}

impl Dashboard {
    pub fn new(aggregator: Aggregator, columns: ColumnMap) -> Self {
        Self {
            aggregator,
            columns,
            base: Query::new(),
        }
    }

    /// Restrict every view to invoices dated within `[start, end]`
    pub fn with_date_range(mut self, column: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        self.base = Query::new().date_range(column, start, end);
        self
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn aggregator_mut(&mut self) -> &mut Aggregator {
        &mut self.aggregator
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.aggregator.cache_stats()
    }

    /// The register after the date filter
    pub fn filtered(&mut self) -> Result<Arc<Table>> {
        self.aggregator.run(&self.base)
    }

    /// One row per customer with the dashboard aggregates
    pub fn summary(&mut self) -> Result<Arc<Table>> {
        let query = self.summary_query();
        self.aggregator.run(&query)
    }

    /// The `n` customers with the largest supply value
    pub fn top_customers(&mut self, n: usize) -> Result<Arc<Table>> {
        let query = self.summary_query().top(&self.columns.supply, n);
        self.aggregator.run(&query)
    }

    /// Distinct customers present after the date filter, sorted
    pub fn buyers(&mut self) -> Result<Vec<Value>> {
        let filtered = self.filtered()?;
        distinct_values(&filtered, &self.columns.customer)
    }

    pub fn customer_kpis(&mut self, buyer: &Value) -> Result<Kpis> {
        let query = self.buyer_query(buyer);
        let rows = self.aggregator.run(&query)?;
        kpis(&rows, &self.columns)
    }

    /// One buyer's rows grouped by product.
    ///
    /// The product count column comes out as `"<nomenclature> (count_distinct)"`
    /// since the nomenclature name is taken by the key.
    pub fn customer_detail(&mut self, buyer: &Value) -> Result<Arc<Table>> {
        let query = self.detail_query(buyer);
        self.aggregator.run(&query)
    }

    pub fn top_products(&mut self, buyer: &Value, n: usize) -> Result<Arc<Table>> {
        let query = self.detail_query(buyer).top(&self.columns.supply, n);
        self.aggregator.run(&query)
    }

    /// Write the summary, the top `top_customers` and the buyer's detail.
    ///
    /// A view that fails is logged and left out; a failed write is an error.
    pub fn export(
        &mut self,
        writer: &OutputWriter,
        top_customers: usize,
        buyer: Option<&Value>,
    ) -> Result<Vec<PathBuf>> {
        let mut views = vec![
            (SUMMARY_EXPORT.to_string(), self.summary()),
            (top_customers_export(top_customers), self.top_customers(top_customers)),
        ];
        if let Some(buyer) = buyer {
            views.push((DETAIL_EXPORT.to_string(), self.customer_detail(buyer)));
        }

        let mut written = Vec::with_capacity(views.len());
        for (name, view) in views {
            match view {
                Ok(table) => written.push(writer.write_table(&name, &table)?),
                Err(e) => warn!("Not exporting {}: {}", name, e),
            }
        }
        Ok(written)
    }

    fn summary_query(&self) -> Query {
        self.base
            .clone()
            .group(&self.columns.customer, self.columns.dashboard_rules())
    }

    fn buyer_query(&self, buyer: &Value) -> Query {
        self.base.clone().key(&self.columns.customer, buyer.clone())
    }

    fn detail_query(&self, buyer: &Value) -> Query {
        self.buyer_query(buyer)
            .group(&self.columns.nomenclature, self.columns.dashboard_rules())
    }
}
