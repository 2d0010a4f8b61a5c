use log::debug;

use crate::models::{AmountMapping, BankTemplate, FieldMapping, SignPolicy, TableCandidate};
use crate::values::{looks_like_date, normalize_header, parse_amount};

const DATE_KEYS: &[&str] = &[
    "buchungsdatum", "buchungstag", "booking", "datum", "date", "abschlussdatum", "valuta",
];
const CURRENCY_KEYS: &[&str] = &["waehrung", "currency", "whg", "ccy"];
const AMOUNT_KEYS: &[&str] = &["betrag", "amount", "umsatz", "summe", "total"];
const DEBIT_KEYS: &[&str] = &[
    "belastung", "lastschrift", "soll", "debit", "ausgang", "withdrawal", "auszahlung",
];
const CREDIT_KEYS: &[&str] = &["gutschrift", "haben", "credit", "eingang", "deposit", "einzahlung"];
const DESCRIPTION_KEYS: &[&str] = &[
    "beschreibung", "buchungstext", "text", "description", "verwendungszweck", "mitteilung",
    "avis", "details", "empfaenger", "zahlungsgrund", "payee", "memo",
];

/// Share of non-empty cells that must parse as numbers for a headerless
/// column to count as an amount column.
const NUMERIC_COLUMN_RATIO: f64 = 0.8;

/// Headers of one candidate with their normalized forms, in column order.
struct HeaderIndex<'a> {
    entries: Vec<(&'a str, String)>,
}

impl<'a> HeaderIndex<'a> {
    fn new(candidate: &'a TableCandidate) -> Self {
        Self {
            entries: candidate
                .headers
                .iter()
                .map(|h| (h.as_str(), normalize_header(h)))
                .collect(),
        }
    }

    fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|(_, n)| n.contains(key))
    }

    fn has_any(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.has(k))
    }

    /// First header matching the earliest possible key, skipping `used` columns.
    fn find(&self, keys: &[&str], used: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| {
            self.entries
                .iter()
                .find(|(orig, norm)| norm.contains(key) && !used.contains(orig))
                .map(|(orig, _)| orig.to_string())
        })
    }

    /// Every header matching any key, in column order.
    fn find_all(&self, keys: &[&str], used: &[&str]) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(orig, norm)| keys.iter().any(|k| norm.contains(k)) && !used.contains(orig))
            .map(|(orig, _)| orig.to_string())
            .collect()
    }
}

/// Guess which export shape a candidate has. Deterministic; `GenericSingle` when nothing fits.
pub fn classify(candidate: &TableCandidate) -> BankTemplate {
    let idx = HeaderIndex::new(candidate);
    let template = if candidate.header_row_index.is_none()
        && !candidate.headers.is_empty()
        && candidate.headers.iter().all(|h| h.starts_with("Column "))
    {
        BankTemplate::Sequential
    } else if (idx.has("einzelbetrag") && idx.has_any(&["belastung", "gutschrift"]))
        || (idx.has("abschlussdatum") && idx.has("transaktions_nr"))
    {
        BankTemplate::Ubs
    } else if idx.has("betrag_detail") || idx.has("zkb_referenz") {
        BankTemplate::Zkb
    } else if idx.has_any(DEBIT_KEYS) && idx.has_any(CREDIT_KEYS) {
        BankTemplate::GenericSplit
    } else {
        BankTemplate::GenericSingle
    };
    debug!("candidate {} classified as {}", candidate.id, template.key());
    template
}

/// Classify, then propose the mapping for that template.
pub fn default_mapping(candidate: &TableCandidate) -> FieldMapping {
    build_mapping(candidate, classify(candidate))
}

/// Propose a concrete column mapping for `template`. Fields without a
/// matching header stay unmapped.
pub fn build_mapping(candidate: &TableCandidate, template: BankTemplate) -> FieldMapping {
    let idx = HeaderIndex::new(candidate);
    match template {
        BankTemplate::Ubs => {
            let date = idx.find(&["buchungsdatum", "abschlussdatum", "valutadatum", "datum"], &[]);
            let debit = idx.find(&["belastung"], &[]);
            let credit = idx.find(&["gutschrift"], &[]);
            let fallback = idx.find(&["einzelbetrag"], &[]);
            let mut descriptions = idx.find_all(&["beschreibung"], &[]);
            if descriptions.is_empty() {
                descriptions = idx.find_all(DESCRIPTION_KEYS, &[]);
            }
            FieldMapping {
                template,
                date_column: date,
                currency_column: idx.find(&["waehrung", "whg"], &[]),
                description_columns: descriptions,
                amount: AmountMapping::Split {
                    debit_column: debit,
                    credit_column: credit,
                    fallback_column: fallback,
                },
                sign_policy: SignPolicy::AsIs,
                drop_summary_rows: true,
            }
        }
        BankTemplate::Zkb => {
            let date = idx.find(&["datum", "date"], &["Valuta"]);
            FieldMapping {
                template,
                date_column: date,
                currency_column: idx.find(&["whg", "waehrung"], &[]),
                description_columns: idx.find_all(&["buchungstext"], &[]),
                amount: AmountMapping::Split {
                    debit_column: idx.find(&["belastung"], &[]),
                    credit_column: idx.find(&["gutschrift"], &[]),
                    fallback_column: idx.find(&["betrag_detail"], &[]),
                },
                sign_policy: SignPolicy::AsIs,
                drop_summary_rows: false,
            }
        }
        BankTemplate::GenericSplit => {
            let date = idx.find(DATE_KEYS, &[]);
            let debit = idx.find(DEBIT_KEYS, &[]);
            let credit = idx.find(CREDIT_KEYS, &as_strs(&[&debit]));
            let used = as_strs(&[&date, &debit, &credit]);
            let fallback = idx.find(AMOUNT_KEYS, &used);
            let currency = idx.find(CURRENCY_KEYS, &used);
            let descriptions = descriptions_for(candidate, &idx, &as_strs(&[&date, &debit, &credit, &fallback, &currency]));
            FieldMapping {
                template,
                date_column: date,
                currency_column: currency,
                description_columns: descriptions,
                amount: AmountMapping::Split {
                    debit_column: debit,
                    credit_column: credit,
                    fallback_column: fallback,
                },
                sign_policy: SignPolicy::AsIs,
                drop_summary_rows: false,
            }
        }
        BankTemplate::GenericSingle => {
            let date = idx.find(DATE_KEYS, &[]);
            let amount = idx.find(AMOUNT_KEYS, &as_strs(&[&date]));
            let currency = idx.find(CURRENCY_KEYS, &as_strs(&[&date, &amount]));
            let descriptions = descriptions_for(candidate, &idx, &as_strs(&[&date, &amount, &currency]));
            FieldMapping {
                template,
                date_column: date,
                currency_column: currency,
                description_columns: descriptions,
                amount: AmountMapping::Single { column: amount },
                sign_policy: SignPolicy::AsIs,
                drop_summary_rows: false,
            }
        }
        BankTemplate::Sequential => sequential_mapping(candidate),
    }
}

/// Headerless exports: column 1 is the date, the most text-heavy column is the
/// description and the first mostly-numeric column is the amount.
fn sequential_mapping(candidate: &TableCandidate) -> FieldMapping {
    let date = candidate.headers.first().cloned();
    let mut description: Option<(&String, usize)> = None;
    let mut amount: Option<String> = None;

    for header in candidate.headers.iter().skip(1) {
        let values: Vec<&str> = candidate
            .rows
            .iter()
            .filter_map(|r| r.get(header).map(String::as_str))
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            continue;
        }
        let numeric = values
            .iter()
            .filter(|v| !looks_like_date(v) && parse_amount(v).is_some() && !v.chars().any(char::is_alphabetic))
            .count();
        if numeric as f64 / values.len() as f64 >= NUMERIC_COLUMN_RATIO {
            if amount.is_none() {
                amount = Some(header.clone());
            }
            continue;
        }
        let text_len: usize = values.iter().map(|v| v.chars().count()).sum();
        if description.map_or(true, |(_, best)| text_len > best) {
            description = Some((header, text_len));
        }
    }

    FieldMapping {
        template: BankTemplate::Sequential,
        date_column: date,
        currency_column: None,
        description_columns: description.map(|(h, _)| vec![h.clone()]).unwrap_or_default(),
        amount: AmountMapping::Single { column: amount },
        sign_policy: SignPolicy::AsIs,
        drop_summary_rows: false,
    }
}

/// Description columns by keyword; failing that, the first unused column
/// whose values are mostly text.
fn descriptions_for(candidate: &TableCandidate, idx: &HeaderIndex, used: &[&str]) -> Vec<String> {
    let found = idx.find_all(DESCRIPTION_KEYS, used);
    if !found.is_empty() {
        return found;
    }
    candidate
        .headers
        .iter()
        .filter(|h| !used.contains(&h.as_str()))
        .find(|h| {
            let texty = candidate
                .rows
                .iter()
                .filter_map(|r| r.get(*h))
                .filter(|v| !v.is_empty() && parse_amount(v).is_none() && !looks_like_date(v))
                .count();
            texty * 2 > candidate.rows.len()
        })
        .map(|h| vec![h.clone()])
        .unwrap_or_default()
}

fn as_strs<'a>(cols: &[&'a Option<String>]) -> Vec<&'a str> {
    cols.iter().filter_map(|c| c.as_deref()).collect()
}
