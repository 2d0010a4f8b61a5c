use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::importer::import_file;
use crate::settings::load_settings;

pub fn run(file: &str, json: bool) -> Result<()> {
    let settings = load_settings();
    let context = import_file(Path::new(file), &settings.bank_account, settings.vat_mode)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&context)?);
        return Ok(());
    }

    println!("File:       {}", context.file_name);
    println!("Source:     {}", context.source.label());
    if let Some(encoding) = &context.encoding {
        println!("Encoding:   {encoding}");
    }
    println!("Checksum:   {}", &context.checksum[..12]);
    println!();

    let mut table = Table::new();
    table.set_header(vec!["ID", "Header row", "Columns", "Rows", "Confidence", "Reason"]);
    for (i, c) in context.candidates.iter().enumerate() {
        let id = if i == 0 {
            Cell::new(c.id.as_str().green().bold())
        } else {
            Cell::new(&c.id)
        };
        table.add_row(vec![
            id,
            Cell::new(c.header_row_index.map_or("-".to_string(), |i| i.to_string())),
            Cell::new(c.headers.len()),
            Cell::new(c.rows.len()),
            Cell::new(format!("{:.0}%", c.confidence * 100.0)),
            Cell::new(&c.reason),
        ]);
    }
    println!("Candidates\n{table}");
    Ok(())
}
