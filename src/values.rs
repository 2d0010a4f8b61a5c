use std::str::FromStr;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

static NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9,.\-]+").unwrap());
static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static DOTTED_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}\.\d{1,2}\.(\d{4}|\d{2})$").unwrap());

/// Parse a monetary amount as exported by banks and spreadsheets.
///
/// Handles `="…"` text guards, `(…)` and trailing-minus negatives, apostrophe
/// thousands separators and either `,` or `.` as decimal separator. When both
/// occur, whichever comes last is the decimal separator.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let mut s = raw.trim();
    if let Some(inner) = s.strip_prefix("=\"").and_then(|v| v.strip_suffix('"')) {
        s = inner.trim();
    }
    let mut negative = false;
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        negative = true;
        s = inner.trim();
    }
    if let Some(inner) = s.strip_suffix('-') {
        negative = !negative;
        s = inner.trim();
    }

    let mut t = NON_NUMERIC.replace_all(s, "").to_string();
    if t.is_empty() || !t.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    match (t.rfind(','), t.rfind('.')) {
        (Some(c), Some(d)) if c > d => t = t.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => t = t.replace(',', ""),
        (Some(_), None) => {
            // `1,234,567` is a thousands-grouped integer; a single comma is a decimal mark.
            if t.matches(',').count() > 1 {
                t = t.replace(',', "");
            } else {
                t = t.replace(',', ".");
            }
        }
        _ => {
            if t.matches('.').count() > 1 {
                t = t.replace('.', "");
            }
        }
    }

    let value = Decimal::from_str(&t).ok()?;
    Some(if negative { -value } else { value })
}

/// Cheap shape check used when deciding whether a cell holds a date.
pub fn looks_like_date(raw: &str) -> bool {
    let t = raw.trim();
    let head = t.get(..10).unwrap_or(t);
    ISO_DATE.is_match(head) || DOTTED_DATE.is_match(t)
}

/// Normalize a bank date to `yyyy-mm-dd`. Returns `None` for anything unrecognized.
pub fn normalize_date(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    // ISO dates may carry a time part: 2026-02-03T00:00:00 or 2026-02-03 08:15
    if let Some(head) = t.get(..10) {
        if ISO_DATE.is_match(head) {
            return NaiveDate::parse_from_str(head, "%Y-%m-%d")
                .ok()
                .map(|d| d.format("%Y-%m-%d").to_string());
        }
    }
    let date_part = t.split_whitespace().next().unwrap_or(t);
    let year_digits = date_part
        .rsplit(|c| c == '.' || c == '/')
        .next()
        .map_or(0, str::len);
    let formats: &[&str] = match year_digits {
        4 => &["%d.%m.%Y", "%d/%m/%Y"],
        2 => &["%d.%m.%y"],
        _ => &[],
    };
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Lowercase, transliterate German umlauts and collapse everything else to `_`.
pub fn normalize_header(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let mut out = String::with_capacity(lower.len());
    for c in lower.chars() {
        match c {
            'ä' => out.push_str("ae"),
            'ö' => out.push_str("oe"),
            'ü' => out.push_str("ue"),
            'ß' => out.push_str("ss"),
            'é' | 'è' | 'ê' => out.push('e'),
            'à' | 'â' => out.push('a'),
            c if c.is_ascii_alphanumeric() => out.push(c),
            _ => out.push('_'),
        }
    }
    let mut collapsed = String::with_capacity(out.len());
    for c in out.chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed.trim_matches('_').to_string()
}

/// Serial day number to ISO date. Values outside chrono's range come back as
/// the plain number text.
pub fn excel_serial_to_date(serial: f64) -> String {
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let date = NaiveDate::from_ymd_opt(1899, 12, 30)
        .filter(|_| serial.is_finite())
        .zip(chrono::Duration::try_days(serial as i64))
        .and_then(|(base, days)| base.checked_add_signed(days));
    match date {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => format!("{serial}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1234.56"), Some(dec("1234.56")));
        assert_eq!(parse_amount("  -42.50  "), Some(dec("-42.50")));
        assert_eq!(parse_amount("0"), Some(dec("0")));
        assert_eq!(parse_amount("not_a_number"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn test_parse_amount_separators() {
        assert_eq!(parse_amount("1'234.50"), Some(dec("1234.50")));
        assert_eq!(parse_amount("1.234,50"), Some(dec("1234.50")));
        assert_eq!(parse_amount("1,234.50"), Some(dec("1234.50")));
        assert_eq!(parse_amount("12,5"), Some(dec("12.5")));
        assert_eq!(parse_amount("1,234,567"), Some(dec("1234567")));
    }

    #[test]
    fn test_parse_amount_negatives_and_guards() {
        assert_eq!(parse_amount("(500.00)"), Some(dec("-500.00")));
        assert_eq!(parse_amount("120.00-"), Some(dec("-120.00")));
        assert_eq!(parse_amount("=\"-7.20\""), Some(dec("-7.20")));
        assert_eq!(parse_amount("CHF 99.90"), Some(dec("99.90")));
    }

    #[test]
    fn test_normalize_date() {
        assert_eq!(normalize_date("2026-02-03"), Some("2026-02-03".to_string()));
        assert_eq!(normalize_date("2026-02-03T00:00:00"), Some("2026-02-03".to_string()));
        assert_eq!(normalize_date("03.02.2026"), Some("2026-02-03".to_string()));
        assert_eq!(normalize_date("03.02.26"), Some("2026-02-03".to_string()));
        assert_eq!(normalize_date("03/02/2026"), Some("2026-02-03".to_string()));
        assert_eq!(normalize_date("31.02.2026"), None);
        assert_eq!(normalize_date("gestern"), None);
        assert_eq!(normalize_date(""), None);
    }

    #[test]
    fn test_looks_like_date() {
        assert!(looks_like_date("03.02.2026"));
        assert!(looks_like_date("2026-02-03"));
        assert!(!looks_like_date("Buchungsdatum"));
        assert!(!looks_like_date("1234.50"));
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Währung"), "waehrung");
        assert_eq!(normalize_header(" Transaktions-Nr. "), "transaktions_nr");
        assert_eq!(normalize_header("Belastung CHF"), "belastung_chf");
        assert_eq!(normalize_header("Betrag Detail"), "betrag_detail");
    }

    #[test]
    fn test_excel_serial_to_date() {
        assert_eq!(excel_serial_to_date(45667.0), "2025-01-10");
    }

    #[test]
    fn test_excel_serial_out_of_range_is_text() {
        assert_eq!(excel_serial_to_date(1e18), "1000000000000000000");
        assert_eq!(excel_serial_to_date(-1e15), "-1000000000000000");
        assert_eq!(excel_serial_to_date(f64::NAN), "NaN");
    }
}
