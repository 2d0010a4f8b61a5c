use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;

use calamine::{Data, Reader};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ImportError, Result};
use crate::models::{RowMap, SourceKind, TableCandidate};
use crate::sniff::{delimiter_name, delimiter_order, read_matrix};
use crate::values::{excel_serial_to_date, looks_like_date, normalize_header};

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

pub const MAX_CANDIDATES: usize = 8;
pub const HEADER_SEARCH_ROWS: usize = 32;
pub const MAX_BODY_ROWS: usize = 160;
pub const MAX_WORKSHEETS: usize = 5;
pub const MIN_HEADER_FIELDS: usize = 2;

// ---------------------------------------------------------------------------
// Scoring weights
// ---------------------------------------------------------------------------

pub const SCORE_PER_COLUMN: f64 = 6.0;
pub const SCORE_COLUMN_CAP: f64 = 36.0;
pub const SCORE_PER_KEYWORD_GROUP: f64 = 12.0;
pub const SCORE_PER_ROW: f64 = 0.5;
pub const SCORE_ROW_CAP: f64 = 20.0;
pub const SCORE_EARLY_HEADER_BONUS: f64 = 5.0;
pub const EARLY_HEADER_ROWS: usize = 12;
/// Subtracted per header cell that looks like a date or a number.
pub const SCORE_DATA_LIKE_HEADER_PENALTY: f64 = 15.0;
pub const SCORE_MAX_CONFIDENCE: f64 = 0.99;

/// Headerless recovery only runs when no header interpretation reaches this confidence.
pub const HEADERLESS_TRIGGER: f64 = 0.45;
pub const HEADERLESS_SCORE: f64 = 55.0;
pub const HEADERLESS_MIN_COLUMNS: usize = 4;

/// Header keyword families (matched against normalized header text).
const KEYWORD_GROUPS: &[(&str, &[&str])] = &[
    ("date", &["datum", "date", "buchung", "valuta", "abschluss", "booking"]),
    (
        "amount",
        &[
            "betrag", "amount", "belastung", "gutschrift", "lastschrift", "soll", "haben", "debit",
            "credit", "umsatz",
        ],
    ),
    ("currency", &["waehrung", "currency", "whg", "ccy"]),
    (
        "description",
        &[
            "beschreibung", "text", "description", "avis", "mitteilung", "details",
            "verwendungszweck", "empfaenger", "zahlungsgrund",
        ],
    ),
    ("balance", &["saldo", "balance"]),
];

static NUMBER_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+(]?\s*[0-9][0-9'.,\s]*\)?-?$").unwrap());

// ---------------------------------------------------------------------------
// Matrix origins
// ---------------------------------------------------------------------------

/// A 2-D cell grid plus where it came from (one delimiter trial or one worksheet).
pub struct Origin {
    pub source: SourceKind,
    pub label: String,
    pub delimiter: Option<char>,
    pub sheet: Option<String>,
    pub rows: Vec<Vec<String>>,
}

/// Candidates for a delimited text upload. Every delimiter is tried, the
/// guessed one first.
pub fn extract_delimited(text: &str) -> Result<Vec<TableCandidate>> {
    let origins = delimiter_order(text)
        .into_iter()
        .map(|delim| Origin {
            source: SourceKind::Delimited,
            label: delimiter_name(delim).to_string(),
            delimiter: Some(delim),
            sheet: None,
            rows: read_matrix(text, delim),
        })
        .collect();
    extract_from_origins(origins)
}

/// Candidates for a workbook, one origin per worksheet (first few sheets only).
pub fn extract_spreadsheet(bytes: &[u8]) -> Result<Vec<TableCandidate>> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ImportError::Spreadsheet(format!("Failed to open workbook: {e}")))?;
    let names = workbook.sheet_names();
    if names.is_empty() {
        return Err(ImportError::EmptySheet);
    }

    let mut origins = Vec::new();
    for (idx, name) in names.iter().take(MAX_WORKSHEETS).enumerate() {
        let range = match workbook.worksheet_range(name) {
            Ok(range) => range,
            Err(e) => {
                warn!("skipping worksheet {name:?}: {e}");
                continue;
            }
        };
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
            .filter(|row| row.iter().any(|c| !c.is_empty()))
            .collect();
        origins.push(Origin {
            source: SourceKind::Spreadsheet,
            label: format!("sheet{}", idx + 1),
            delimiter: None,
            sheet: Some(name.clone()),
            rows,
        });
    }
    if origins.iter().all(|o| o.rows.is_empty()) {
        return Err(ImportError::EmptySheet);
    }
    extract_from_origins(origins)
}

pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                format!("{f}")
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        _ => String::new(),
    }
}

/// Shared candidate search over any number of cell grids: header-row trials,
/// deduplication, headerless fallback, ranking and truncation. Trials are
/// scored on at most [`MAX_BODY_ROWS`] body rows; the candidates that survive
/// ranking get their full body back.
pub fn extract_from_origins(origins: Vec<Origin>) -> Result<Vec<TableCandidate>> {
    let mut seen = HashSet::new();
    let mut trials: Vec<(usize, TableCandidate)> = Vec::new();

    for (idx, origin) in origins.iter().enumerate() {
        for candidate in header_candidates(origin) {
            let key = format!(
                "{}|{}|{}|{}",
                origin.label,
                signature(&candidate.headers),
                candidate.header_row_index.unwrap_or(usize::MAX),
                origin.sheet.as_deref().unwrap_or("")
            );
            if seen.insert(key) {
                trials.push((idx, candidate));
            }
        }
    }

    let best = trials.iter().map(|(_, c)| c.confidence).fold(0.0, f64::max);
    if best < HEADERLESS_TRIGGER {
        debug!("best header confidence {best:.2}, trying headerless recovery");
        for (idx, origin) in origins.iter().enumerate() {
            if let Some(candidate) = headerless_candidate(origin) {
                trials.push((idx, candidate));
                // One headerless reading per upload; later origins would only repeat it.
                break;
            }
        }
    }

    if trials.is_empty() {
        return Err(ImportError::NoCandidatesDetected);
    }

    trials.sort_by(|a, b| b.1.confidence.partial_cmp(&a.1.confidence).unwrap_or(Ordering::Equal));
    trials.truncate(MAX_CANDIDATES);
    let candidates: Vec<TableCandidate> = trials
        .into_iter()
        .map(|(idx, candidate)| with_full_body(&origins[idx], candidate))
        .collect();
    info!(
        "{} candidate(s); best {} at {:.2}",
        candidates.len(),
        candidates[0].id,
        candidates[0].confidence
    );
    Ok(candidates)
}

/// Body rows below a header row (non-blank within the header width), or for
/// a headerless reading every row of the modal width.
fn body_rows<'a>(
    origin: &'a Origin,
    header_index: Option<usize>,
    width: usize,
) -> impl Iterator<Item = &'a Vec<String>> + 'a {
    let start = header_index.map_or(0, |h| h + 1);
    origin.rows[start..].iter().filter(move |cells| match header_index {
        Some(_) => cells.iter().take(width).any(|c| !c.trim().is_empty()),
        None => cells.len() == width,
    })
}

fn with_full_body(origin: &Origin, mut candidate: TableCandidate) -> TableCandidate {
    if candidate.rows.len() < MAX_BODY_ROWS {
        return candidate;
    }
    candidate.rows = body_rows(origin, candidate.header_row_index, candidate.headers.len())
        .map(|cells| row_map(&candidate.headers, cells))
        .collect();
    if candidate.rows.len() > MAX_BODY_ROWS {
        debug!("{}: re-read {} body rows", candidate.id, candidate.rows.len());
        candidate.reason.push_str(&format!(
            "; scored on the first {MAX_BODY_ROWS} of {} rows",
            candidate.rows.len()
        ));
    }
    candidate
}

fn header_candidates(origin: &Origin) -> Vec<TableCandidate> {
    let mut out = Vec::new();
    for (h, row) in origin.rows.iter().enumerate().take(HEADER_SEARCH_ROWS) {
        let filled = row.iter().filter(|c| !c.trim().is_empty()).count();
        if filled < MIN_HEADER_FIELDS {
            continue;
        }
        // Trailing empty header cells are padding, not columns.
        let width = row.iter().rposition(|c| !c.trim().is_empty()).map_or(0, |i| i + 1);
        let headers = unique_headers(&row[..width]);

        let rows: Vec<RowMap> = body_rows(origin, Some(h), width)
            .take(MAX_BODY_ROWS)
            .map(|cells| row_map(&headers, cells))
            .collect();
        if rows.is_empty() {
            continue;
        }

        let (score, reason) = score_header(&headers, rows.len(), h);
        out.push(TableCandidate {
            id: format!("{}-h{}", origin.label, h),
            source: origin.source,
            header_row_index: Some(h),
            headers,
            rows,
            confidence: (score / 100.0).min(SCORE_MAX_CONFIDENCE),
            reason,
            delimiter: origin.delimiter,
            sheet: origin.sheet.clone(),
        });
    }
    out
}

/// Score one header-row interpretation. Returns the raw score and a readable reason.
pub fn score_header(headers: &[String], row_count: usize, header_index: usize) -> (f64, String) {
    let columns = headers.iter().filter(|h| !h.trim().is_empty()).count();
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();

    let groups: Vec<&str> = KEYWORD_GROUPS
        .iter()
        .filter(|(_, words)| normalized.iter().any(|h| words.iter().any(|w| h.contains(w))))
        .map(|(name, _)| *name)
        .collect();

    let data_like = headers
        .iter()
        .filter(|h| looks_like_date(h) || NUMBER_LIKE.is_match(h.trim()))
        .count();

    let mut score = (columns as f64 * SCORE_PER_COLUMN).min(SCORE_COLUMN_CAP)
        + groups.len() as f64 * SCORE_PER_KEYWORD_GROUP
        + (row_count as f64 * SCORE_PER_ROW).min(SCORE_ROW_CAP)
        - data_like as f64 * SCORE_DATA_LIKE_HEADER_PENALTY;
    if header_index < EARLY_HEADER_ROWS {
        score += SCORE_EARLY_HEADER_BONUS;
    }
    let score = score.max(0.0);

    let mut reason = format!(
        "{columns} columns, {row_count} rows, header at row {}",
        header_index + 1
    );
    if !groups.is_empty() {
        reason.push_str(&format!("; keywords: {}", groups.join(", ")));
    }
    if data_like > 0 {
        reason.push_str(&format!("; {data_like} header cell(s) look like data"));
    }
    (score, reason)
}

/// Recover exports without a header line: most rows share one column count
/// and start with a date.
fn headerless_candidate(origin: &Origin) -> Option<TableCandidate> {
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for row in &origin.rows {
        *counts.entry(row.len()).or_default() += 1;
    }
    let (&columns, &frequency) = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))?;
    if columns < HEADERLESS_MIN_COLUMNS || frequency * 2 <= origin.rows.len() {
        return None;
    }

    let modal: Vec<&Vec<String>> = body_rows(origin, None, columns).collect();
    let dated = modal
        .iter()
        .filter(|r| r.first().is_some_and(|c| looks_like_date(c)))
        .count();
    if dated * 5 < modal.len() * 4 {
        return None;
    }

    let headers: Vec<String> = (1..=columns).map(|i| format!("Column {i}")).collect();
    let rows: Vec<RowMap> = modal
        .iter()
        .take(MAX_BODY_ROWS)
        .map(|cells| row_map(&headers, cells))
        .collect();
    Some(TableCandidate {
        id: format!("{}-headerless", origin.label),
        source: origin.source,
        header_row_index: None,
        reason: format!(
            "no header line; {frequency} of {} rows share {columns} columns and start with a date",
            origin.rows.len()
        ),
        headers,
        rows,
        confidence: HEADERLESS_SCORE / 100.0,
        delimiter: origin.delimiter,
        sheet: origin.sheet.clone(),
    })
}

fn unique_headers(cells: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(cells.len());
    for (i, cell) in cells.iter().enumerate() {
        let trimmed = cell.trim();
        let base = if trimmed.is_empty() && seen.contains("") {
            format!("Column {}", i + 1)
        } else {
            trimmed.to_string()
        };
        let mut name = base.clone();
        let mut n = 2;
        while seen.contains(&name) {
            name = format!("{base} ({n})");
            n += 1;
        }
        seen.insert(name.clone());
        out.push(name);
    }
    out
}

fn row_map(headers: &[String], cells: &[String]) -> RowMap {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.clone(), cells.get(i).map(|c| c.trim().to_string()).unwrap_or_default()))
        .collect()
}

fn signature(headers: &[String]) -> String {
    headers.iter().map(|h| normalize_header(h)).collect::<Vec<_>>().join("|")
}
