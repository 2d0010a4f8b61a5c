use std::path::Path;

use log::info;

use crate::classifier::{build_mapping, default_mapping};
use crate::error::Result;
use crate::importer::import_file;
use crate::models::BankTemplate;
use crate::settings::load_settings;

pub fn run(file: &str, candidate: Option<&str>, template: Option<BankTemplate>) -> Result<()> {
    let settings = load_settings();
    let context = import_file(Path::new(file), &settings.bank_account, settings.vat_mode)?;
    let candidate = context.candidate(candidate)?;
    let mapping = match template {
        Some(template) => build_mapping(candidate, template),
        None => default_mapping(candidate),
    };
    info!("candidate {} mapped as {}", candidate.id, mapping.template.name());
    println!("{}", serde_json::to_string_pretty(&mapping)?);
    Ok(())
}
