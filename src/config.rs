//! Configuration file handling.
//!
//! Column names of the source register and report defaults can be overridden
//! from a `.supply-analytics.toml` file; CLI arguments take precedence.

use crate::error::{Error, Result as TableResult};
use crate::output::OutFormat;
use crate::types::{AggOp, AggregationRules, Schema, DEFAULT_TOP_CUSTOMERS, DEFAULT_TOP_PRODUCTS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = ".supply-analytics.toml";

/// Root of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub columns: ColumnMap,

    #[serde(default)]
    pub report: ReportConfig,
}

/// Names of the register columns the views depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    #[serde(default = "default_customer")]
    pub customer: String,

    #[serde(default = "default_nomenclature")]
    pub nomenclature: String,

    #[serde(default = "default_quantity")]
    pub quantity: String,

    /// Supply value (tax base, VAT excluded).
    #[serde(default = "default_supply")]
    pub supply: String,

    /// Unit price, VAT excluded.
    #[serde(default = "default_price")]
    pub price: String,

    /// Any column whose lowercased name contains this is a date column.
    #[serde(default = "default_date_indicator")]
    pub date_indicator: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            customer: default_customer(),
            nomenclature: default_nomenclature(),
            quantity: default_quantity(),
            supply: default_supply(),
            price: default_price(),
            date_indicator: default_date_indicator(),
        }
    }
}

fn default_customer() -> String {
    "Найменування/ПІБ (Покупець)".to_string()
}

fn default_nomenclature() -> String {
    "Номенклатура товарів/послуг".to_string()
}

fn default_quantity() -> String {
    "Кількість (об’єм , обсяг)".to_string()
}

fn default_supply() -> String {
    "Обсяги постачання (база оподаткування) без урахування податку на додану вартість".to_string()
}

fn default_price() -> String {
    "Ціна постачання одиниці товару / послуги без урахування податку на додану вартість"
        .to_string()
}

fn default_date_indicator() -> String {
    "дата".to_string()
}

impl ColumnMap {
    /// The five columns every view needs, in register order.
    pub fn required(&self) -> [&str; 5] {
        [
            self.customer.as_str(),
            self.nomenclature.as_str(),
            self.quantity.as_str(),
            self.supply.as_str(),
            self.price.as_str(),
        ]
    }

    /// Quantity and supply summed, price averaged, products counted.
    pub fn dashboard_rules(&self) -> AggregationRules {
        AggregationRules::new()
            .with(&self.quantity, AggOp::Sum)
            .with(&self.supply, AggOp::Sum)
            .with(&self.price, AggOp::Mean)
            .with(&self.nomenclature, AggOp::CountDistinct)
    }

    /// Check a freshly loaded schema; reports the first missing column.
    pub fn validate(&self, schema: &Schema) -> TableResult<()> {
        match self.required().into_iter().find(|name| !schema.contains(name)) {
            Some(missing) => Err(Error::InvalidColumn(missing.to_string())),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_top_customers")]
    pub top_customers: usize,

    #[serde(default = "default_top_products")]
    pub top_products: usize,

    #[serde(default)]
    pub out_format: OutFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_customers: default_top_customers(),
            top_products: default_top_products(),
            out_format: OutFormat::default(),
        }
    }
}

fn default_top_customers() -> usize {
    DEFAULT_TOP_CUSTOMERS
}

fn default_top_products() -> usize {
    DEFAULT_TOP_PRODUCTS
}

impl FileConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try the default location in the working directory.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }
}
