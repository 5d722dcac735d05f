use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use supply_analytics::display::display_table;
use supply_analytics::sources::create_source;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <export_file> [sheet]", args[0]);
        std::process::exit(1);
    }

    let filepath = PathBuf::from(&args[1]);
    println!("\n{}", "=".repeat(120));
    println!("Inspecting: {}", filepath.display());
    println!("{}", "=".repeat(120));

    let source = create_source(&filepath, args.get(2).map(String::as_str))?;
    let table = source
        .load()
        .with_context(|| format!("Failed to read {}", filepath.display()))?;

    display_table("Preview", &table);

    if table.schema().is_empty() {
        println!("No columns found!");
        return Ok(());
    }

    println!("\n{} COLUMNS {}", "=".repeat(50), "=".repeat(50));
    println!("{:<60} {:>10} {:>10}", "Column", "Type", "Missing");
    println!("{}", "-".repeat(120));
    for column in table.schema().columns() {
        let missing = table
            .column_values(&column.name)?
            .filter(|v| v.is_missing())
            .count();
        println!("{:<60} {:>10} {:>10}", column.name, column.ty, missing);
    }
    println!("{}", "=".repeat(120));

    Ok(())
}
