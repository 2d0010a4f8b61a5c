pub mod candidates;
pub mod clean;
pub mod config;
pub mod mapping;
pub mod normalize;
pub mod rules;

use std::path::Path;

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;

use crate::assigner::{MatchType, RuleSide};
use crate::error::{ImportError, Result};
use crate::models::{BankTemplate, VatMode};

/// Read a JSON document supplied by the user (mapping, overrides, edits).
pub(crate) fn read_json<T: DeserializeOwned>(path: &str) -> Result<T> {
    let content = std::fs::read_to_string(Path::new(path))
        .map_err(|e| ImportError::Other(format!("Cannot read {path}: {e}")))?;
    Ok(serde_json::from_str(&content)?)
}

#[derive(Parser)]
#[command(
    name = "bankimport",
    version,
    about = "Turn bank statement exports (CSV, Excel, CAMT.053) into reviewable booking records."
)]
pub struct Cli {
    /// More log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the ranked table candidates found in a statement file.
    Candidates {
        /// Path to a .csv, .xlsx, .xls or .xml file
        file: String,
        /// Print the import context as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the default field mapping for a candidate as editable JSON.
    Mapping {
        file: String,
        /// Candidate id (default: best-scoring)
        #[arg(long)]
        candidate: Option<String>,
        /// Force a bank template instead of detecting one
        #[arg(long, value_enum)]
        template: Option<BankTemplate>,
    },
    /// Run the full pipeline and show the resulting booking records.
    Normalize {
        file: String,
        /// Candidate id (default: best-scoring)
        #[arg(long)]
        candidate: Option<String>,
        /// Field mapping JSON (default: derived from the detected bank template)
        #[arg(long)]
        mapping: Option<String>,
        /// Bank ledger account (default: from settings)
        #[arg(long = "bank-account")]
        bank_account: Option<String>,
        /// VAT mode (default: from settings)
        #[arg(long, value_enum)]
        vat: Option<VatMode>,
        /// Currency for rows without one (default: from settings)
        #[arg(long)]
        currency: Option<String>,
        /// Keep descriptions as exported
        #[arg(long = "no-cleanup")]
        no_cleanup: bool,
        /// Per-row cleanup overrides JSON, keyed by record id
        #[arg(long)]
        overrides: Option<String>,
        /// Record edits JSON (list of partial records with id)
        #[arg(long)]
        edits: Option<String>,
        /// Print records and review as JSON
        #[arg(long)]
        json: bool,
        /// Write draft postings to this CSV file
        #[arg(long)]
        export: Option<String>,
    },
    /// Run the description cleanup on a single text.
    Clean {
        text: String,
        /// Rule to switch off (stripBookingWords, stripIbanRefs, stripAddressBits, titleCase)
        #[arg(long = "disable")]
        disable: Vec<String>,
        /// Extra literal text to remove
        #[arg(long = "remove")]
        remove: Vec<String>,
    },
    /// Show or change saved settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage posting rules that fill counter-accounts.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the current settings.
    Show,
    /// Update settings.
    Set {
        #[arg(long = "bank-account")]
        bank_account: Option<String>,
        #[arg(long, value_enum)]
        vat: Option<VatMode>,
        #[arg(long)]
        currency: Option<String>,
        /// Add a literal removal to the cleanup list
        #[arg(long = "add-removal")]
        add_removal: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Add a posting rule.
    Add {
        /// Text to look for in the description
        keyword: String,
        /// Counter-account number
        account: String,
        #[arg(long, value_enum, default_value = "auto")]
        side: RuleSide,
        #[arg(long = "match-type", value_enum, default_value = "contains")]
        match_type: MatchType,
        #[arg(long, default_value = "0")]
        priority: i64,
    },
    /// List posting rules.
    List,
    /// Remove a posting rule by its list position.
    Remove { index: usize },
}
