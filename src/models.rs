use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};

/// Stand-in text for records whose description ends up empty.
pub const DESCRIPTION_PLACEHOLDER: &str = "Ohne Buchungstext";

/// Currency used when a row or entry does not name one.
pub const DEFAULT_CURRENCY: &str = "CHF";

/// One body row of a candidate table, keyed by header.
pub type RowMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Delimited,
    Spreadsheet,
    Xml,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delimited => "delimited",
            Self::Spreadsheet => "spreadsheet",
            Self::Xml => "xml",
        }
    }
}

/// One scored hypothesis about where a table starts inside an uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCandidate {
    pub id: String,
    pub source: SourceKind,
    /// `None` for headerless tables that got synthetic `Column N` headers.
    pub header_row_index: Option<usize>,
    pub headers: Vec<String>,
    pub rows: Vec<RowMap>,
    pub confidence: f64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum VatMode {
    With,
    #[default]
    Without,
}

/// Snapshot of one upload. Downstream steps read it; nothing writes back to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportContext {
    pub file_name: String,
    pub source: SourceKind,
    pub bank_account: String,
    pub vat_mode: VatMode,
    pub candidates: Vec<TableCandidate>,
    pub created_at: DateTime<Utc>,
    pub encoding: Option<String>,
    pub checksum: String,
}

impl ImportContext {
    /// Look up a candidate by id, or take the best-scoring one.
    pub fn candidate(&self, id: Option<&str>) -> Result<&TableCandidate> {
        match id {
            Some(id) => self
                .candidates
                .iter()
                .find(|c| c.id == id)
                .ok_or_else(|| ImportError::UnknownCandidate(id.to_string())),
            None => self.candidates.first().ok_or(ImportError::NoCandidatesDetected),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignPolicy {
    #[default]
    AsIs,
    Invert,
    /// Outflows are reported as positive numbers: every positive value becomes negative.
    DebitPositive,
}

impl SignPolicy {
    pub fn apply(&self, value: Decimal) -> Decimal {
        match self {
            Self::AsIs => value,
            Self::Invert => -value,
            Self::DebitPositive => {
                if value > Decimal::ZERO {
                    -value
                } else {
                    value
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BankTemplate {
    GenericSingle,
    GenericSplit,
    Sequential,
    Ubs,
    Zkb,
}

impl BankTemplate {
    pub fn key(&self) -> &'static str {
        match self {
            Self::GenericSingle => "generic_single",
            Self::GenericSplit => "generic_split",
            Self::Sequential => "sequential",
            Self::Ubs => "ubs",
            Self::Zkb => "zkb",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GenericSingle => "Generic (signed amount column)",
            Self::GenericSplit => "Generic (debit / credit columns)",
            Self::Sequential => "Headerless sequential columns",
            Self::Ubs => "UBS e-banking export",
            Self::Zkb => "ZKB e-banking export",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AmountMapping {
    Single {
        column: Option<String>,
    },
    Split {
        debit_column: Option<String>,
        credit_column: Option<String>,
        fallback_column: Option<String>,
    },
}

/// Which headers feed which canonical field. Unknown headers read as empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub template: BankTemplate,
    pub date_column: Option<String>,
    #[serde(default)]
    pub currency_column: Option<String>,
    #[serde(default)]
    pub description_columns: Vec<String>,
    pub amount: AmountMapping,
    #[serde(default)]
    pub sign_policy: SignPolicy,
    #[serde(default)]
    pub drop_summary_rows: bool,
}

impl FieldMapping {
    pub fn referenced_columns(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = Vec::new();
        cols.extend(self.date_column.as_deref());
        cols.extend(self.currency_column.as_deref());
        cols.extend(self.description_columns.iter().map(String::as_str));
        match &self.amount {
            AmountMapping::Single { column } => cols.extend(column.as_deref()),
            AmountMapping::Split {
                debit_column,
                credit_column,
                fallback_column,
            } => {
                cols.extend(debit_column.as_deref());
                cols.extend(credit_column.as_deref());
                cols.extend(fallback_column.as_deref());
            }
        }
        cols
    }

    /// Columns named by the mapping that the candidate does not have.
    pub fn unresolved_columns(&self, candidate: &TableCandidate) -> Vec<String> {
        self.referenced_columns()
            .into_iter()
            .filter(|c| !candidate.headers.iter().any(|h| h == c))
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn from_amount(amount: Decimal) -> Self {
        if amount < Decimal::ZERO {
            Self::Debit
        } else {
            Self::Credit
        }
    }
}

/// How an amount was derived. Audit trail only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountDiagnostics {
    pub used_debit: bool,
    pub used_credit: bool,
    pub used_fallback: bool,
    pub ambiguous_both_sides: bool,
    pub inherited_sign_from_summary: bool,
    /// The row had no date and took the collective booking's or the previous row's.
    #[serde(default)]
    pub inherited_date: bool,
    /// Set on the undated children of a dated collective booking: whether they
    /// add up to the parent amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_total_matches: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub id: String,
    pub date: String,
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
    pub fx_rate: Decimal,
    pub direction: Direction,
    pub debit_side_account: String,
    pub credit_side_account: String,
    #[serde(default)]
    pub vat_code: Option<String>,
    #[serde(default)]
    pub amount_diagnostics: AmountDiagnostics,
    #[serde(default)]
    pub original_row: RowMap,
}

impl NormalizedRecord {
    /// Place the bank account on the side opposite the counterparty for the
    /// record's direction: inflows debit the bank, outflows credit it.
    pub fn place_bank_account(&mut self, bank_account: &str) {
        if bank_account.is_empty() {
            return;
        }
        match self.direction {
            Direction::Credit => self.debit_side_account = bank_account.to_string(),
            Direction::Debit => self.credit_side_account = bank_account.to_string(),
        }
    }
}
