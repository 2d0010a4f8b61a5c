use std::collections::HashMap;
use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};
use log::{info, warn};
use serde::Serialize;

use crate::assigner::assign_accounts;
use crate::classifier::default_mapping;
use crate::cleanup::{clean_records, CleanupDiff, RowCleanupOverride};
use crate::cli::read_json;
use crate::error::Result;
use crate::fmt::money;
use crate::importer::import_file;
use crate::models::{FieldMapping, NormalizedRecord, VatMode};
use crate::normalizer::normalize_rows;
use crate::posting::{build_draft_posting, write_postings_csv};
use crate::reviewer::{apply_edits, review_records, RecordEdit, ReviewReport, Severity};
use crate::settings::load_settings;

pub struct NormalizeArgs {
    pub file: String,
    pub candidate: Option<String>,
    pub mapping: Option<String>,
    pub bank_account: Option<String>,
    pub vat: Option<VatMode>,
    pub currency: Option<String>,
    pub no_cleanup: bool,
    pub overrides: Option<String>,
    pub edits: Option<String>,
    pub json: bool,
    pub export: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NormalizeOutput<'a> {
    file_name: &'a str,
    candidate_id: &'a str,
    mapping: &'a FieldMapping,
    records: &'a [NormalizedRecord],
    cleanup: &'a [CleanupDiff],
    review: &'a ReviewReport,
}

pub fn run(args: NormalizeArgs) -> Result<()> {
    let settings = load_settings();
    let bank_account = args.bank_account.unwrap_or_else(|| settings.bank_account.clone());
    let vat_mode = args.vat.unwrap_or(settings.vat_mode);
    let currency = args
        .currency
        .unwrap_or_else(|| settings.default_currency.clone())
        .trim()
        .to_uppercase();

    let context = import_file(Path::new(&args.file), &bank_account, vat_mode)?;
    let candidate = context.candidate(args.candidate.as_deref())?;
    let mapping: FieldMapping = match &args.mapping {
        Some(path) => read_json(path)?,
        None => default_mapping(candidate),
    };
    for column in mapping.unresolved_columns(candidate) {
        warn!("mapped column {column:?} is not in candidate {}; reading it as empty", candidate.id);
    }

    let mut records = normalize_rows(&candidate.rows, &mapping, &context.bank_account, &currency);

    let mut diffs = Vec::new();
    if !args.no_cleanup {
        let overrides: HashMap<String, RowCleanupOverride> = match &args.overrides {
            Some(path) => read_json(path)?,
            None => HashMap::new(),
        };
        let (cleaned, cleanup_diffs) = clean_records(&records, &settings.cleanup, &overrides);
        records = cleaned;
        diffs = cleanup_diffs;
    }

    let assigned = assign_accounts(&mut records, &settings.posting_rules);
    info!("posting rules: {} assigned, {} unmatched", assigned.assigned, assigned.unmatched);

    if let Some(path) = &args.edits {
        let edits: Vec<RecordEdit> = read_json(path)?;
        let applied = apply_edits(&mut records, &edits, &context.bank_account);
        info!("applied {applied} of {} edits", edits.len());
    }

    let review = review_records(&records);

    if args.json {
        let output = NormalizeOutput {
            file_name: &context.file_name,
            candidate_id: &candidate.id,
            mapping: &mapping,
            records: &records,
            cleanup: &diffs,
            review: &review,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_records(&records, &mapping, &candidate.id);
        print_review(&review);
    }

    if let Some(path) = &args.export {
        let postings: Vec<_> = records.iter().map(|r| build_draft_posting(r, vat_mode)).collect();
        write_postings_csv(Path::new(path), &postings)?;
        if !args.json {
            println!("Wrote {} postings to {path}", postings.len());
        }
    }
    Ok(())
}

fn print_records(records: &[NormalizedRecord], mapping: &FieldMapping, candidate_id: &str) {
    println!("Candidate:  {candidate_id}");
    println!("Template:   {}", mapping.template.name());
    println!();

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Description", "Amount", "Currency", "Debit", "Credit"]);
    for r in records {
        let amount = if r.amount.is_sign_negative() {
            money(r.amount).red().to_string()
        } else {
            money(r.amount).green().to_string()
        };
        table.add_row(vec![
            Cell::new(&r.id),
            Cell::new(&r.date),
            Cell::new(&r.description),
            Cell::new(amount),
            Cell::new(&r.currency),
            Cell::new(&r.debit_side_account),
            Cell::new(&r.credit_side_account),
        ]);
    }
    println!("Records\n{table}");
}

fn print_review(review: &ReviewReport) {
    if review.is_clean() {
        println!("{}", "No review issues.".green());
        return;
    }
    println!(
        "{} blocking, {} warnings",
        review.blocking().to_string().red().bold(),
        review.warnings().to_string().yellow().bold()
    );
    for issue in &review.issues {
        let code = match issue.severity {
            Severity::Blocking => issue.code.red(),
            Severity::Warning => issue.code.yellow(),
        };
        let id = issue.record_id.as_deref().unwrap_or("-");
        println!("  [{code}] {id}: {}", issue.message);
    }
}
