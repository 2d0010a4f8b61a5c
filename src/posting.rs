use std::path::Path;

use log::info;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::Result;
use crate::models::{NormalizedRecord, VatMode, DEFAULT_CURRENCY};

/// Booking proposal handed to the accounting collaborator. Amounts are unsigned;
/// the legs carry the direction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftPosting {
    pub id: String,
    pub date: String,
    pub label: String,
    pub amount: Decimal,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub debit_account: String,
    pub credit_account: String,
    pub vat_code: Option<String>,
}

pub fn build_draft_posting(record: &NormalizedRecord, vat_mode: VatMode) -> DraftPosting {
    let currency = if record.currency.trim().is_empty() {
        DEFAULT_CURRENCY.to_string()
    } else {
        record.currency.clone()
    };
    let exchange_rate = if record.fx_rate.is_zero() {
        Decimal::ONE
    } else {
        record.fx_rate
    };
    DraftPosting {
        id: record.id.clone(),
        date: record.date.clone(),
        label: record.description.clone(),
        amount: record.amount.abs(),
        currency,
        exchange_rate,
        debit_account: record.debit_side_account.clone(),
        credit_account: record.credit_side_account.clone(),
        vat_code: match vat_mode {
            VatMode::With => record.vat_code.clone(),
            VatMode::Without => None,
        },
    }
}

/// Write postings as semicolon-separated CSV with a header row.
pub fn write_postings_csv(path: &Path, postings: &[DraftPosting]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new().delimiter(b';').from_path(path)?;
    for posting in postings {
        writer.serialize(posting)?;
    }
    writer.flush()?;
    info!("wrote {} postings to {}", postings.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AmountDiagnostics, Direction, RowMap};
    use std::str::FromStr;

    fn record(amount: &str) -> NormalizedRecord {
        let amount = Decimal::from_str(amount).unwrap();
        let mut rec = NormalizedRecord {
            id: "0001".into(),
            date: "2026-02-03".into(),
            description: "Migros".into(),
            amount,
            currency: "CHF".into(),
            fx_rate: Decimal::ONE,
            direction: Direction::from_amount(amount),
            debit_side_account: String::new(),
            credit_side_account: String::new(),
            vat_code: Some("VB81".into()),
            amount_diagnostics: AmountDiagnostics::default(),
            original_row: RowMap::new(),
        };
        rec.place_bank_account("1020");
        rec
    }

    #[test]
    fn test_outflow_posting() {
        let posting = build_draft_posting(&record("-45.20"), VatMode::Without);
        assert_eq!(posting.amount, Decimal::from_str("45.20").unwrap());
        assert_eq!(posting.credit_account, "1020");
        assert!(posting.debit_account.is_empty());
        assert_eq!(posting.vat_code, None);
    }

    #[test]
    fn test_vat_code_only_with_vat() {
        let posting = build_draft_posting(&record("100"), VatMode::With);
        assert_eq!(posting.debit_account, "1020");
        assert_eq!(posting.vat_code.as_deref(), Some("VB81"));
    }

    #[test]
    fn test_write_postings_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("postings.csv");
        let postings = vec![
            build_draft_posting(&record("-45.20"), VatMode::Without),
            build_draft_posting(&record("100"), VatMode::With),
        ];
        write_postings_csv(&path, &postings).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "id;date;label;amount;currency;exchange_rate;debit_account;credit_account;vat_code"
        );
        assert_eq!(lines[1], "0001;2026-02-03;Migros;45.20;CHF;1;;1020;");
        assert_eq!(lines[2], "0001;2026-02-03;Migros;100;CHF;1;1020;;VB81");
    }
}
