use crate::config::ColumnMap;
use crate::error::LoadError;
use crate::sources::TableSource;
use crate::types::{Table, Value, SYNTHETIC_DATE_COLUMN};
use chrono::{Days, NaiveDate};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::info;

const CUSTOMERS: [&str; 8] = [
    "ТОВ \"Альфа-Трейд\"",
    "ТОВ \"Будмаркет\"",
    "ПП \"Вектор\"",
    "ФОП Коваленко І.П.",
    "ТОВ \"Дніпро Агро\"",
    "ФОП Шевчук О.В.",
    "ТОВ \"Енергосервіс\"",
    "ПрАТ \"Зоря\"",
];

// (nomenclature, base unit price)
const PRODUCTS: [(&str, f64); 12] = [
    ("Цемент М500, мішок 25 кг", 185.0),
    ("Пісок річковий, т", 420.0),
    ("Щебінь гранітний 5-20, т", 780.0),
    ("Арматура А500С 12 мм, м", 38.5),
    ("Цегла рядова М150", 9.8),
    ("Гіпсокартон 12,5 мм", 245.0),
    ("Утеплювач мінвата 100 мм, м2", 96.0),
    ("Фарба фасадна, 10 л", 1150.0),
    ("Профіль CD 60, 3 м", 72.0),
    ("Дошка обрізна 50x150, м3", 8900.0),
    ("Клей плитковий, 25 кг", 310.0),
    ("Послуги доставки", 1500.0),
];

/// Seeded generator of register rows, for demos and tests
pub struct SyntheticSource {
    columns: ColumnMap,
    rows: usize,
    seed: u64,
    start: NaiveDate,
    days: u64,
}

impl SyntheticSource {
    pub fn new(columns: ColumnMap, rows: usize, seed: u64) -> Self {
        Self {
            columns,
            rows,
            seed,
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            days: 90,
        }
    }

    /// Spread invoice dates over `days` days from `start`
    pub fn with_window(mut self, start: NaiveDate, days: u64) -> Self {
        self.start = start;
        self.days = days.max(1);
        self
    }

    fn generate(&self) -> Vec<Vec<Value>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut rows = Vec::with_capacity(self.rows);

        for _ in 0..self.rows {
            // skewed towards the first customers so the top-N is meaningful
            let pick = rng.gen_range(0..CUSTOMERS.len()).min(rng.gen_range(0..CUSTOMERS.len()));
            let customer = CUSTOMERS[pick];
            let (product, base_price) = PRODUCTS[rng.gen_range(0..PRODUCTS.len())];
            let quantity = f64::from(rng.gen_range(1u32..=50));
            let price = round2(base_price * rng.gen_range(0.9..1.1));
            let date = self.start.checked_add_days(Days::new(rng.gen_range(0..self.days)));

            // one line in fifty has no unit price filled in
            let price_cell = if rng.gen_bool(0.02) {
                Value::Missing
            } else {
                Value::Number(price)
            };

            rows.push(vec![
                Value::from(customer),
                Value::from(product),
                Value::Number(quantity),
                Value::Number(round2(quantity * price)),
                price_cell,
                date.into(),
            ]);
        }
        rows
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl TableSource for SyntheticSource {
    fn load(&self) -> Result<Table, LoadError> {
        let headers = vec![
            self.columns.customer.clone(),
            self.columns.nomenclature.clone(),
            self.columns.quantity.clone(),
            self.columns.supply.clone(),
            self.columns.price.clone(),
            SYNTHETIC_DATE_COLUMN.to_string(),
        ];
        let table = Table::infer(headers, self.generate())
            .map_err(|e| LoadError::Malformed(e.to_string()))?;
        info!("Generated {} synthetic register rows (seed {})", table.len(), self.seed);
        Ok(table)
    }

    fn describe(&self) -> String {
        format!("synthetic register ({} rows, seed {})", self.rows, self.seed)
    }
}
