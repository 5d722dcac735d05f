use crate::config::FileConfig;
use crate::output::OutFormat;
use crate::types::Config;
use anyhow::{anyhow, Result};
use chrono::{Duration, Local, NaiveDate};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Customer supply analytics for tax-invoice registers", long_about = None)]
pub struct Args {
    /// Register to analyse (xlsx, xls, ods, csv or parquet)
    #[arg(long, required_unless_present = "synthetic")]
    pub input: Option<PathBuf>,

    /// Worksheet name; the first sheet when omitted
    #[arg(long)]
    pub sheet: Option<String>,

    /// Config file; defaults to ./.supply-analytics.toml when present
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub date_column: Option<String>,

    #[arg(long)]
    pub from: Option<String>,

    #[arg(long)]
    pub to: Option<String>,

    #[arg(long)]
    pub buyer: Option<String>,

    #[arg(long)]
    pub top_customers: Option<usize>,

    #[arg(long)]
    pub top_products: Option<usize>,

    /// Write summary, top customers and buyer detail to --output-dir
    #[arg(long)]
    pub export: bool,

    #[arg(long)]
    pub out_format: Option<String>,

    #[arg(long, default_value = "./output")]
    pub output_dir: PathBuf,

    /// Generate a register of this many rows instead of reading --input
    #[arg(long, conflicts_with = "input")]
    pub synthetic: Option<usize>,

    #[arg(long, default_value = "42")]
    pub seed: u64,
}

impl Args {
    /// The config file named on the command line, else the default one if it exists
    pub fn file_config(&self) -> Result<FileConfig> {
        match &self.config {
            Some(path) => FileConfig::load(path),
            None => Ok(FileConfig::load_default()?.unwrap_or_default()),
        }
    }

    /// Merge with the file config; command-line values win
    pub fn into_config(self, file: FileConfig) -> Result<Config> {
        let from = self.from.as_deref().map(parse_date).transpose()?;
        let to = self.to.as_deref().map(parse_date).transpose()?;

        let out_format = match self.out_format.as_deref() {
            Some(s) => s.parse::<OutFormat>().map_err(|e| anyhow!(e))?,
            None => file.report.out_format,
        };

        Ok(Config {
            input: self.input,
            sheet: self.sheet,
            synthetic_rows: self.synthetic,
            seed: self.seed,
            columns: file.columns,
            date_column: self.date_column,
            from,
            to,
            buyer: self.buyer,
            top_customers: self.top_customers.unwrap_or(file.report.top_customers),
            top_products: self.top_products.unwrap_or(file.report.top_products),
            export: self.export,
            out_format,
            output_dir: self.output_dir,
        })
    }
}

/// Parse a calendar date or one of the relative shortcuts
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    parse_date_from(s, Local::now().date_naive())
}

fn parse_date_from(s: &str, today: NaiveDate) -> Result<NaiveDate> {
    let days_ago = match s {
        "today" | "now" => 0,
        "yesterday" => 1,
        "7-days-ago" => 7,
        "30-days-ago" => 30,
        "90-days-ago" => 90,
        _ => {
            return NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(s, "%d.%m.%Y"))
                .map_err(|_| anyhow!("Invalid date `{}`, expected YYYY-MM-DD or DD.MM.YYYY", s));
        }
    };
    Ok(today - Duration::days(days_ago))
}
