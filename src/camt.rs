use log::{debug, info};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;
use rust_decimal::Decimal;

use crate::error::{ImportError, Result};
use crate::models::{RowMap, SourceKind, TableCandidate, DESCRIPTION_PLACEHOLDER};
use crate::values::{normalize_date, parse_amount};

pub const HEADER_DATE: &str = "Buchungsdatum";
pub const HEADER_DESCRIPTION: &str = "Beschreibung";
pub const HEADER_AMOUNT: &str = "Betrag";
pub const HEADER_CURRENCY: &str = "Währung";

/// One booked `Ntry`, already signed: debits are negative.
#[derive(Debug, Clone, PartialEq)]
pub struct CamtEntry {
    pub date: String,
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Default)]
struct EntryDraft {
    amount: Option<String>,
    currency: Option<String>,
    indicator: Option<String>,
    booking_date: Option<String>,
    value_date: Option<String>,
    remittance: Vec<String>,
    tx_info: Option<String>,
    debtor_name: Option<String>,
    creditor_name: Option<String>,
    entry_info: Option<String>,
}

impl EntryDraft {
    fn is_debit(&self) -> bool {
        self.indicator.as_deref().map(str::trim) == Some("DBIT")
    }

    /// Remittance text, then transaction info, then counterparty name, then entry info.
    fn description(&self) -> String {
        let remittance = self.remittance.join(" ");
        let counterparty = if self.is_debit() {
            self.creditor_name.as_ref().or(self.debtor_name.as_ref())
        } else {
            self.debtor_name.as_ref().or(self.creditor_name.as_ref())
        };
        let description = [Some(&remittance), self.tx_info.as_ref(), counterparty, self.entry_info.as_ref()]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or(DESCRIPTION_PLACEHOLDER)
            .to_string();
        description
    }

    fn finish(self) -> Option<CamtEntry> {
        let raw_date = self.booking_date.as_ref().or(self.value_date.as_ref())?;
        let date = normalize_date(raw_date)?;
        let currency = self.currency.as_deref().map(str::trim).filter(|c| !c.is_empty())?;
        let amount = parse_amount(self.amount.as_deref()?)?.abs();
        let amount = if self.is_debit() { -amount } else { amount };
        Some(CamtEntry {
            date,
            description: self.description(),
            amount,
            currency: currency.to_string(),
        })
    }
}

/// Parse a CAMT.053 statement. Entries without a usable date, currency or
/// amount are skipped; a document with no usable entries is an error.
pub fn parse_camt(xml: &str) -> Result<Vec<CamtEntry>> {
    let mut reader = XmlReader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut draft: Option<EntryDraft> = None;
    let mut entries = Vec::new();
    let mut skipped = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                if name == "Ntry" {
                    draft = Some(EntryDraft::default());
                }
                stack.push(name);
                if let Some(d) = draft.as_mut() {
                    if entry_path(&stack) == ["Amt"] {
                        d.currency = currency_attr(&e, &reader);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let Some(d) = draft.as_mut() else { continue };
                let text = t
                    .unescape()
                    .map_err(|e| ImportError::InvalidXml(e.to_string()))?
                    .into_owned();
                record_text(d, entry_path(&stack), text);
            }
            Ok(Event::CData(c)) => {
                let Some(d) = draft.as_mut() else { continue };
                let text = String::from_utf8_lossy(&c).trim().to_string();
                record_text(d, entry_path(&stack), text);
            }
            Ok(Event::End(_)) => {
                if stack.pop().as_deref() == Some("Ntry") {
                    if let Some(d) = draft.take() {
                        match d.finish() {
                            Some(entry) => entries.push(entry),
                            None => skipped += 1,
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ImportError::InvalidXml(format!(
                    "at position {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    if skipped > 0 {
        debug!("skipped {skipped} CAMT entries without date, currency or amount");
    }
    if entries.is_empty() {
        return Err(ImportError::NoCamtEntries);
    }
    info!("parsed {} CAMT entries", entries.len());
    Ok(entries)
}

/// The single canonical candidate for a CAMT upload, rows in entry order.
pub fn camt_candidate(entries: &[CamtEntry]) -> TableCandidate {
    let headers: Vec<String> = [HEADER_DATE, HEADER_DESCRIPTION, HEADER_AMOUNT, HEADER_CURRENCY]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let rows = entries
        .iter()
        .map(|e| {
            RowMap::from([
                (HEADER_DATE.to_string(), e.date.clone()),
                (HEADER_DESCRIPTION.to_string(), e.description.clone()),
                (HEADER_AMOUNT.to_string(), e.amount.to_string()),
                (HEADER_CURRENCY.to_string(), e.currency.clone()),
            ])
        })
        .collect();
    TableCandidate {
        id: "camt".to_string(),
        source: SourceKind::Xml,
        header_row_index: None,
        headers,
        rows,
        confidence: 0.99,
        reason: format!("CAMT.053 statement with {} entries", entries.len()),
        delimiter: None,
        sheet: None,
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn currency_attr(e: &BytesStart, reader: &XmlReader<&[u8]>) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.local_name().as_ref() == b"Ccy")
        .and_then(|a| a.decode_and_unescape_value(reader).ok().map(|v| v.into_owned()))
}

/// Path below the innermost open `Ntry`, or empty outside of one.
fn entry_path(stack: &[String]) -> &[String] {
    match stack.iter().rposition(|n| n == "Ntry") {
        Some(pos) => &stack[pos + 1..],
        None => &[],
    }
}

fn record_text(d: &mut EntryDraft, path: &[String], text: String) {
    let names: Vec<&str> = path.iter().map(String::as_str).collect();
    match names.as_slice() {
        ["Amt"] => d.amount = Some(text),
        ["CdtDbtInd"] => d.indicator = Some(text),
        ["BookgDt", "Dt" | "DtTm"] => d.booking_date = Some(text),
        ["ValDt", "Dt" | "DtTm"] => d.value_date = Some(text),
        ["AddtlNtryInf"] => d.entry_info = Some(text),
        [.., "RmtInf", "Ustrd"] => d.remittance.push(text),
        [.., "AddtlTxInf"] => {
            d.tx_info.get_or_insert(text);
        }
        [.., "Nm"] => {
            // Dbtr/Nm and Dbtr/Pty/Nm (newer schema versions) both count.
            let party = names
                .iter()
                .position(|n| *n == "RltdPties")
                .and_then(|pos| names.get(pos + 1));
            match party {
                Some(&"Dbtr") => {
                    d.debtor_name.get_or_insert(text);
                }
                Some(&"Cdtr") => {
                    d.creditor_name.get_or_insert(text);
                }
                _ => {}
            }
        }
        _ => {}
    }
}
