use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Direction, NormalizedRecord, DESCRIPTION_PLACEHOLDER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Blocking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewIssue {
    pub code: &'static str,
    pub severity: Severity,
    /// `None` for issues about the whole set.
    pub record_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReviewReport {
    pub issues: Vec<ReviewIssue>,
}

impl ReviewReport {
    pub fn blocking(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Blocking).count()
    }

    pub fn warnings(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Warning).count()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

fn issue(code: &'static str, severity: Severity, record: &NormalizedRecord, message: String) -> ReviewIssue {
    ReviewIssue {
        code,
        severity,
        record_id: Some(record.id.clone()),
        message,
    }
}

/// Advisory checks over a normalized set. Nothing here rejects records.
pub fn review_records(records: &[NormalizedRecord]) -> ReviewReport {
    let mut issues = Vec::new();
    if records.is_empty() {
        issues.push(ReviewIssue {
            code: "no_records",
            severity: Severity::Blocking,
            record_id: None,
            message: "No records to post".to_string(),
        });
    }

    for record in records {
        if NaiveDate::parse_from_str(&record.date, "%Y-%m-%d").is_err() {
            let message = if record.date.is_empty() {
                "Missing date".to_string()
            } else {
                format!("Unrecognized date {:?}", record.date)
            };
            issues.push(issue("invalid_date", Severity::Blocking, record, message));
        }
        let text = record.description.trim();
        if text.is_empty() || text == DESCRIPTION_PLACEHOLDER {
            issues.push(issue("missing_text", Severity::Warning, record, "No booking text".to_string()));
        }
        if record.amount.is_zero() {
            issues.push(issue("zero_amount", Severity::Warning, record, "Amount is zero".to_string()));
        }
        if record.amount_diagnostics.ambiguous_both_sides {
            issues.push(issue(
                "ambiguous_amount",
                Severity::Warning,
                record,
                "Both debit and credit columns were filled; amount is the net".to_string(),
            ));
        }
        if record.amount_diagnostics.group_total_matches == Some(false) {
            issues.push(issue(
                "group_total_mismatch",
                Severity::Warning,
                record,
                "Detail rows of this collective booking do not add up to its total".to_string(),
            ));
        }
        if record.debit_side_account.is_empty() || record.credit_side_account.is_empty() {
            issues.push(issue(
                "missing_counter_account",
                Severity::Warning,
                record,
                "Debit or credit account not assigned".to_string(),
            ));
        }
    }
    ReviewReport { issues }
}

/// One user edit. Unset fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecordEdit {
    pub id: String,
    pub date: Option<String>,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub debit_side_account: Option<String>,
    pub credit_side_account: Option<String>,
    pub vat_code: Option<String>,
}

/// Merge edits into `records` by id. Returns how many edits found their record.
///
/// An amount edit that flips the sign moves the bank account to the other leg.
pub fn apply_edits(records: &mut [NormalizedRecord], edits: &[RecordEdit], bank_account: &str) -> usize {
    let mut applied = 0usize;
    for edit in edits {
        let Some(record) = records.iter_mut().find(|r| r.id == edit.id) else {
            continue;
        };
        if let Some(date) = &edit.date {
            record.date = date.trim().to_string();
        }
        if let Some(description) = &edit.description {
            record.description = description.trim().to_string();
        }
        if let Some(currency) = &edit.currency {
            record.currency = currency.trim().to_uppercase();
        }
        if let Some(account) = &edit.debit_side_account {
            record.debit_side_account = account.trim().to_string();
        }
        if let Some(account) = &edit.credit_side_account {
            record.credit_side_account = account.trim().to_string();
        }
        if let Some(code) = &edit.vat_code {
            record.vat_code = Some(code.trim().to_string()).filter(|c| !c.is_empty());
        }
        if let Some(amount) = edit.amount {
            record.amount = amount;
            let direction = Direction::from_amount(amount);
            if direction != record.direction {
                record.direction = direction;
                move_bank_account(record, bank_account);
            }
        }
        applied += 1;
    }
    applied
}

fn move_bank_account(record: &mut NormalizedRecord, bank_account: &str) {
    if bank_account.is_empty() {
        return;
    }
    let (from, to) = match record.direction {
        Direction::Credit => (&mut record.credit_side_account, &mut record.debit_side_account),
        Direction::Debit => (&mut record.debit_side_account, &mut record.credit_side_account),
    };
    if from.as_str() == bank_account {
        // The counter-account swaps over with it.
        std::mem::swap(from, to);
    } else if to.is_empty() {
        *to = bank_account.to_string();
    }
}
