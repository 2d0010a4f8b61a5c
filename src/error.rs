use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Unsupported file type: {0} (expected .csv, .xlsx, .xls or .xml)")]
    UnsupportedFileType(String),

    #[error("No transaction table detected in file")]
    NoCandidatesDetected,

    #[error("Invalid XML: {0}")]
    InvalidXml(String),

    #[error("No usable CAMT entries found")]
    NoCamtEntries,

    #[error("Workbook contains no worksheet with data")]
    EmptySheet,

    #[error("Unknown candidate: {0}")]
    UnknownCandidate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;
