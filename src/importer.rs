use std::path::Path;

use chrono::Utc;
use log::info;
use sha2::{Digest, Sha256};

use crate::camt::{camt_candidate, parse_camt};
use crate::error::{ImportError, Result};
use crate::extract::{extract_delimited, extract_spreadsheet};
use crate::models::{ImportContext, SourceKind, TableCandidate, VatMode};
use crate::sniff::decode_bytes;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Importer kinds, dispatched on the file extension
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImporterKind {
    Delimited,
    Spreadsheet,
    Camt,
}

/// Candidates plus the text encoding they were decoded from, if any.
pub struct Extraction {
    pub candidates: Vec<TableCandidate>,
    pub encoding: Option<String>,
}

impl ImporterKind {
    pub fn for_file_name(file_name: &str) -> Result<Self> {
        match extension(file_name).as_str() {
            "csv" => Ok(Self::Delimited),
            "xlsx" | "xls" => Ok(Self::Spreadsheet),
            "xml" => Ok(Self::Camt),
            _ => Err(ImportError::UnsupportedFileType(file_name.to_string())),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Delimited => "csv",
            Self::Spreadsheet => "spreadsheet",
            Self::Camt => "camt053",
        }
    }

    pub fn source(&self) -> SourceKind {
        match self {
            Self::Delimited => SourceKind::Delimited,
            Self::Spreadsheet => SourceKind::Spreadsheet,
            Self::Camt => SourceKind::Xml,
        }
    }

    pub fn extract(&self, bytes: &[u8]) -> Result<Extraction> {
        match self {
            Self::Delimited => {
                let decoded = decode_bytes(bytes);
                Ok(Extraction {
                    candidates: extract_delimited(&decoded.text)?,
                    encoding: Some(decoded.encoding.to_string()),
                })
            }
            Self::Spreadsheet => Ok(Extraction {
                candidates: extract_spreadsheet(bytes)?,
                encoding: None,
            }),
            Self::Camt => {
                let decoded = decode_bytes(bytes);
                let entries = parse_camt(&decoded.text)?;
                Ok(Extraction {
                    candidates: vec![camt_candidate(&entries)],
                    encoding: Some(decoded.encoding.to_string()),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// import_bytes / import_file
// ---------------------------------------------------------------------------

/// Build the context for one upload. The file name only selects the format.
pub fn import_bytes(
    bytes: &[u8],
    file_name: &str,
    bank_account: &str,
    vat_mode: VatMode,
) -> Result<ImportContext> {
    let importer = ImporterKind::for_file_name(file_name)?;
    let extraction = importer.extract(bytes)?;
    info!(
        "{file_name}: {} candidate(s) via {} importer",
        extraction.candidates.len(),
        importer.key()
    );
    Ok(ImportContext {
        file_name: file_name.to_string(),
        source: importer.source(),
        bank_account: bank_account.trim().to_string(),
        vat_mode,
        candidates: extraction.candidates,
        created_at: Utc::now(),
        encoding: extraction.encoding,
        checksum: compute_checksum(bytes),
    })
}

/// Read `path` in one blocking call and import it.
pub fn import_file(path: &Path, bank_account: &str, vat_mode: VatMode) -> Result<ImportContext> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    // Fail on the extension before touching the file.
    ImporterKind::for_file_name(&file_name)?;
    let bytes = std::fs::read(path)?;
    import_bytes(&bytes, &file_name, bank_account, vat_mode)
}
