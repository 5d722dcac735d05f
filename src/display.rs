use crate::aggregation::Kpis;
use crate::types::{Table, Value, PREVIEW_ROWS};

const MAX_CELL_WIDTH: usize = 36;
const RULER_WIDTH: usize = 120;

/// Print a preview of a derived table: header, first and last rows, row count
pub fn display_table(title: &str, table: &Table) {
    println!("{}", render_table(title, table));
}

/// Print one customer's headline figures
pub fn display_kpis(buyer: &str, kpis: &Kpis) {
    println!("{}", render_kpis(buyer, kpis));
}

pub fn render_table(title: &str, table: &Table) -> String {
    let mut lines = vec![
        format!("\n{}", "=".repeat(RULER_WIDTH)),
        format!("  {}", title.to_uppercase()),
        "=".repeat(RULER_WIDTH),
    ];

    if table.is_empty() {
        lines.push("No data to display".to_string());
        lines.push("=".repeat(RULER_WIDTH));
        return lines.join("\n");
    }

    let headers: Vec<String> = table.schema().names().map(clip).collect();
    let cells: Vec<Vec<String>> = table
        .rows()
        .iter()
        .map(|row| row.iter().map(format_cell).collect())
        .collect();
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c, w = *w))
            .collect::<Vec<_>>()
            .join("  ")
    };

    lines.push(line(&headers));
    lines.push("-".repeat(RULER_WIDTH));

    lines.push(format!("=== FIRST {} ROWS ===", PREVIEW_ROWS.min(cells.len())));
    lines.extend(cells.iter().take(PREVIEW_ROWS).map(|row| line(row)));

    // tail without repeating rows already shown
    let tail = cells.len().saturating_sub(PREVIEW_ROWS).min(PREVIEW_ROWS);
    if tail > 0 {
        lines.push(format!("\n=== LAST {} ROWS ===", tail));
        lines.extend(cells[cells.len() - tail..].iter().map(|row| line(row)));
    }

    lines.push("=".repeat(RULER_WIDTH));
    lines.push(format!("Total rows: {}", table.len()));
    lines.join("\n")
}

pub fn render_kpis(buyer: &str, kpis: &Kpis) -> String {
    let mean_price = kpis
        .mean_price
        .map_or_else(|| "n/a".to_string(), |p| format!("{:.2}", p));

    [
        format!("\n{}", "=".repeat(RULER_WIDTH)),
        format!("  KPIs: {}", buyer),
        "-".repeat(RULER_WIDTH),
        format!("Total supply (excl. VAT): {:.2}", kpis.supply_total),
        format!("Total quantity:           {:.2}", kpis.quantity_total),
        format!("Average unit price:       {}", mean_price),
        format!("Distinct products:        {}", kpis.distinct_products),
        "=".repeat(RULER_WIDTH),
    ]
    .join("\n")
}

fn format_cell(value: &Value) -> String {
    match value {
        Value::Number(n) => format!("{:.2}", n),
        other => clip(&other.to_string()),
    }
}

fn clip(s: &str) -> String {
    if s.chars().count() <= MAX_CELL_WIDTH {
        s.to_string()
    } else {
        let mut clipped: String = s.chars().take(MAX_CELL_WIDTH - 1).collect();
        clipped.push('…');
        clipped
    }
}
