use log::debug;
use rust_decimal::Decimal;

use crate::models::{
    AmountDiagnostics, AmountMapping, BankTemplate, Direction, FieldMapping, NormalizedRecord,
    RowMap,
};
use crate::values::{normalize_date, parse_amount};

/// Description fragments that mark a parent "collective booking" row.
pub const SUMMARY_MARKERS: &[&str] = &[
    "sammelauftrag",
    "sammelbuchung",
    "sammelzahlung",
    "sammel-auftrag",
    "collective order",
    "collective booking",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Positive,
    Negative,
}

impl Sign {
    pub fn of(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self::Positive)
        } else if value < Decimal::ZERO {
            Some(Self::Negative)
        } else {
            None
        }
    }

    pub fn apply(&self, value: Decimal) -> Decimal {
        match self {
            Self::Positive => value.abs(),
            Self::Negative => -value.abs(),
        }
    }
}

/// Children of a collective booking must add up to the parent within this.
pub const GROUP_TOLERANCE: Decimal = Decimal::from_parts(2, 0, 0, false, 2);

/// State carried from row to row during one scan: the sign and date of the
/// most recent collective booking, and the last date seen on any row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryCarry {
    pub sign: Option<Sign>,
    pub date: Option<String>,
    pub last_date: Option<String>,
}

/// Outcome of one fold step.
#[derive(Debug, Clone, PartialEq)]
pub struct RowStep {
    pub carry: SummaryCarry,
    pub record: Option<NormalizedRecord>,
    /// The row parsed a date of its own.
    pub dated: bool,
    /// Signed amount of a dated collective booking; its undated followers are its children.
    pub group_parent: Option<Decimal>,
}

/// Children seen so far for the open collective booking.
#[derive(Debug)]
struct GroupTally {
    parent: Decimal,
    sum: Decimal,
    members: Vec<usize>,
}

pub fn is_summary_row(description: &str) -> bool {
    let lower = description.to_lowercase();
    SUMMARY_MARKERS.iter().any(|m| lower.contains(m))
}

/// Flag every child with whether the children add up to the parent amount.
/// Child signs are not always inherited, so magnitudes are compared.
fn close_group(records: &mut [NormalizedRecord], group: Option<GroupTally>) {
    let Some(group) = group else { return };
    if group.members.is_empty() {
        return;
    }
    let matches = (group.sum.abs() - group.parent.abs()).abs() <= GROUP_TOLERANCE;
    if !matches {
        debug!(
            "collective booking {} split into {} children summing to {}",
            group.parent,
            group.members.len(),
            group.sum
        );
    }
    for idx in group.members {
        records[idx].amount_diagnostics.group_total_matches = Some(matches);
    }
}

/// Walk `rows` in file order, folding the summary carry through the scan.
/// Ids are assigned over the surviving records only.
pub fn normalize_rows(
    rows: &[RowMap],
    mapping: &FieldMapping,
    bank_account: &str,
    default_currency: &str,
) -> Vec<NormalizedRecord> {
    let (mut records, _, group) = rows.iter().fold(
        (Vec::with_capacity(rows.len()), SummaryCarry::default(), None),
        |(mut records, carry, mut group): (Vec<NormalizedRecord>, SummaryCarry, Option<GroupTally>), row| {
            let step = normalize_row(carry, row, mapping, bank_account, default_currency);
            if step.dated {
                close_group(&mut records, group.take());
            }
            if let Some(parent) = step.group_parent {
                group = Some(GroupTally {
                    parent,
                    sum: Decimal::ZERO,
                    members: Vec::new(),
                });
            }
            if let Some(mut record) = step.record {
                record.id = format!("{:04}", records.len() + 1);
                if let (false, Some(tally)) = (step.dated, group.as_mut()) {
                    tally.sum += record.amount;
                    tally.members.push(records.len());
                }
                records.push(record);
            }
            (records, step.carry, group)
        },
    );
    close_group(&mut records, group);
    debug!("normalized {} of {} rows", records.len(), rows.len());
    records
}

/// One fold step: the updated carry and the record, if the row survives.
pub fn normalize_row(
    carry: SummaryCarry,
    row: &RowMap,
    mapping: &FieldMapping,
    bank_account: &str,
    default_currency: &str,
) -> RowStep {
    let description = compose_description(row, &mapping.description_columns);
    let raw_date = cell(row, &mapping.date_column);
    let parsed_date = normalize_date(raw_date);
    let dated = parsed_date.is_some();
    let (amount, mut diagnostics) = resolve_amount(row, mapping, &carry);

    let mut carry = carry;
    if let Some(date) = &parsed_date {
        carry.last_date = Some(date.clone());
    }
    let mut group_parent = None;
    if is_summary_row(&description) {
        if let Some(sign) = Sign::of(amount) {
            carry.sign = Some(sign);
        }
        if let Some(date) = &parsed_date {
            carry.date = Some(date.clone());
            if !amount.is_zero() {
                group_parent = Some(amount);
            }
        }
        debug!("collective booking {description:?}: carry now {carry:?}");
        if mapping.drop_summary_rows {
            return RowStep {
                carry,
                record: None,
                dated,
                group_parent,
            };
        }
    }

    // Unparseable dates pass through unchanged.
    let mut date = parsed_date.unwrap_or_else(|| raw_date.to_string());
    if date.is_empty() && description.is_empty() && amount.is_zero() {
        return RowStep {
            carry,
            record: None,
            dated,
            group_parent,
        };
    }
    if date.is_empty() {
        let summary_date = carry.date.as_ref().filter(|_| mapping.drop_summary_rows);
        if let Some(inherited) = summary_date.or(carry.last_date.as_ref()) {
            date = inherited.clone();
            diagnostics.inherited_date = true;
        }
    }

    let currency = match cell(row, &mapping.currency_column) {
        "" => default_currency.to_string(),
        c => c.to_uppercase(),
    };

    let direction = Direction::from_amount(amount);
    let mut record = NormalizedRecord {
        id: String::new(),
        date,
        description,
        amount,
        currency,
        fx_rate: Decimal::ONE,
        direction,
        debit_side_account: String::new(),
        credit_side_account: String::new(),
        vat_code: None,
        amount_diagnostics: diagnostics,
        original_row: row.clone(),
    };
    record.place_bank_account(bank_account);
    RowStep {
        carry,
        record: Some(record),
        dated,
        group_parent,
    }
}

/// Resolve one row's signed amount and record how it was obtained.
pub fn resolve_amount(
    row: &RowMap,
    mapping: &FieldMapping,
    carry: &SummaryCarry,
) -> (Decimal, AmountDiagnostics) {
    let mut diag = AmountDiagnostics::default();
    match &mapping.amount {
        AmountMapping::Single { column } => {
            let amount = parse_amount(cell(row, column))
                .map(|v| mapping.sign_policy.apply(v))
                .unwrap_or(Decimal::ZERO);
            diag.source_column = column.clone();
            (amount, diag)
        }
        AmountMapping::Split {
            debit_column,
            credit_column,
            fallback_column,
        } => {
            let debit = nonzero(cell(row, debit_column)).map(|v| v.abs());
            let credit = nonzero(cell(row, credit_column)).map(|v| v.abs());
            match (debit, credit) {
                (Some(d), Some(c)) => {
                    diag.used_debit = true;
                    diag.used_credit = true;
                    diag.ambiguous_both_sides = true;
                    (c - d, diag)
                }
                (None, Some(c)) => {
                    diag.used_credit = true;
                    diag.source_column = credit_column.clone();
                    (c, diag)
                }
                (Some(d), None) => {
                    diag.used_debit = true;
                    diag.source_column = debit_column.clone();
                    (-d, diag)
                }
                (None, None) => match nonzero(cell(row, fallback_column)) {
                    Some(v) => {
                        diag.used_fallback = true;
                        diag.source_column = fallback_column.clone();
                        let inherited = match (mapping.template, carry.sign) {
                            (BankTemplate::Ubs, Some(sign)) => Some(sign),
                            _ => None,
                        };
                        let amount = match inherited {
                            Some(sign) => {
                                diag.inherited_sign_from_summary = true;
                                sign.apply(v)
                            }
                            None => mapping.sign_policy.apply(v),
                        };
                        (amount, diag)
                    }
                    None => (Decimal::ZERO, diag),
                },
            }
        }
    }
}

fn nonzero(raw: &str) -> Option<Decimal> {
    parse_amount(raw).filter(|v| !v.is_zero())
}

fn cell<'a>(row: &'a RowMap, column: &Option<String>) -> &'a str {
    column
        .as_ref()
        .and_then(|c| row.get(c))
        .map(|v| v.trim())
        .unwrap_or("")
}

fn compose_description(row: &RowMap, columns: &[String]) -> String {
    columns
        .iter()
        .filter_map(|c| row.get(c))
        .flat_map(|v| v.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignPolicy;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn row(pairs: &[(&str, &str)]) -> RowMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn split_mapping(template: BankTemplate, drop_summary_rows: bool) -> FieldMapping {
        FieldMapping {
            template,
            date_column: Some("Datum".into()),
            currency_column: Some("Währung".into()),
            description_columns: vec!["Text".into()],
            amount: AmountMapping::Split {
                debit_column: Some("Belastung".into()),
                credit_column: Some("Gutschrift".into()),
                fallback_column: Some("Einzelbetrag".into()),
            },
            sign_policy: SignPolicy::AsIs,
            drop_summary_rows,
        }
    }

    fn single_mapping(policy: SignPolicy) -> FieldMapping {
        FieldMapping {
            template: BankTemplate::GenericSingle,
            date_column: Some("Datum".into()),
            currency_column: None,
            description_columns: vec!["Text".into()],
            amount: AmountMapping::Single {
                column: Some("Betrag".into()),
            },
            sign_policy: policy,
            drop_summary_rows: false,
        }
    }

    fn split_row(debit: &str, credit: &str, fallback: &str) -> RowMap {
        row(&[
            ("Datum", "01.02.2026"),
            ("Text", "Test"),
            ("Währung", "CHF"),
            ("Belastung", debit),
            ("Gutschrift", credit),
            ("Einzelbetrag", fallback),
        ])
    }

    #[test]
    fn test_debit_only() {
        let m = split_mapping(BankTemplate::GenericSplit, false);
        let (amount, diag) = resolve_amount(&split_row("100", "0", ""), &m, &SummaryCarry::default());
        assert_eq!(amount, dec("-100"));
        assert!(diag.used_debit);
        assert!(!diag.used_credit);
        assert!(!diag.ambiguous_both_sides);
    }

    #[test]
    fn test_credit_only() {
        let m = split_mapping(BankTemplate::GenericSplit, false);
        let (amount, diag) = resolve_amount(&split_row("0", "50", ""), &m, &SummaryCarry::default());
        assert_eq!(amount, dec("50"));
        assert!(diag.used_credit);
        assert!(!diag.used_debit);
    }

    #[test]
    fn test_both_sides_nets_out() {
        let m = split_mapping(BankTemplate::GenericSplit, false);
        let (amount, diag) = resolve_amount(&split_row("30", "30", ""), &m, &SummaryCarry::default());
        assert_eq!(amount, dec("0"));
        assert!(diag.ambiguous_both_sides);
        let (amount, _) = resolve_amount(&split_row("-30", "100", ""), &m, &SummaryCarry::default());
        assert_eq!(amount, dec("70"));
    }

    #[test]
    fn test_fallback_uses_sign_policy_without_carry() {
        let mut m = split_mapping(BankTemplate::Ubs, false);
        let (amount, diag) = resolve_amount(&split_row("", "", "-12.50"), &m, &SummaryCarry::default());
        assert_eq!(amount, dec("-12.50"));
        assert!(diag.used_fallback);
        assert!(!diag.inherited_sign_from_summary);

        m.sign_policy = SignPolicy::Invert;
        let (amount, _) = resolve_amount(&split_row("", "", "-12.50"), &m, &SummaryCarry::default());
        assert_eq!(amount, dec("12.50"));
    }

    #[test]
    fn test_fallback_inherits_only_under_ubs() {
        let carry = SummaryCarry {
            sign: Some(Sign::Positive),
            ..SummaryCarry::default()
        };
        let ubs = split_mapping(BankTemplate::Ubs, true);
        let (amount, diag) = resolve_amount(&split_row("", "", "-12.50"), &ubs, &carry);
        assert_eq!(amount, dec("12.50"));
        assert!(diag.inherited_sign_from_summary);

        let generic = split_mapping(BankTemplate::GenericSplit, true);
        let (amount, diag) = resolve_amount(&split_row("", "", "-12.50"), &generic, &carry);
        assert_eq!(amount, dec("-12.50"));
        assert!(!diag.inherited_sign_from_summary);
    }

    #[test]
    fn test_all_absent_is_zero() {
        let m = split_mapping(BankTemplate::GenericSplit, false);
        let (amount, diag) = resolve_amount(&split_row("", "", ""), &m, &SummaryCarry::default());
        assert!(amount.is_zero());
        assert_eq!(diag, AmountDiagnostics::default());
    }

    #[test]
    fn test_single_column_sign_policies() {
        let r = row(&[("Datum", "01.02.2026"), ("Text", "Kauf"), ("Betrag", "25.00")]);
        let carry = SummaryCarry::default();
        assert_eq!(resolve_amount(&r, &single_mapping(SignPolicy::AsIs), &carry).0, dec("25.00"));
        assert_eq!(resolve_amount(&r, &single_mapping(SignPolicy::Invert), &carry).0, dec("-25.00"));
        assert_eq!(
            resolve_amount(&r, &single_mapping(SignPolicy::DebitPositive), &carry).0,
            dec("-25.00")
        );
    }

    #[test]
    fn test_summary_inheritance() {
        let rows = vec![
            row(&[
                ("Datum", "2026-02-03"),
                ("Text", "E-Banking Sammelauftrag"),
                ("Währung", "CHF"),
                ("Belastung", ""),
                ("Gutschrift", "300.00"),
                ("Einzelbetrag", ""),
            ]),
            row(&[
                ("Datum", ""),
                ("Text", "Kunde A"),
                ("Währung", ""),
                ("Belastung", ""),
                ("Gutschrift", ""),
                ("Einzelbetrag", "-120.00"),
            ]),
            row(&[
                ("Datum", ""),
                ("Text", "Kunde B"),
                ("Währung", ""),
                ("Belastung", ""),
                ("Gutschrift", ""),
                ("Einzelbetrag", "180.00"),
            ]),
        ];
        let records = normalize_rows(&rows, &split_mapping(BankTemplate::Ubs, true), "1020", "CHF");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "0001");
        assert_eq!(records[0].date, "2026-02-03");
        assert_eq!(records[0].amount, dec("120.00"));
        assert!(records[0].amount_diagnostics.inherited_sign_from_summary);
        assert_eq!(records[1].date, "2026-02-03");
        assert_eq!(records[1].amount, dec("180.00"));
        assert!(records[1].amount_diagnostics.inherited_date);
        assert_eq!(records[1].amount_diagnostics.group_total_matches, Some(true));
    }

    fn zkb_mapping() -> FieldMapping {
        FieldMapping {
            template: BankTemplate::Zkb,
            date_column: Some("Datum".into()),
            currency_column: Some("Whg".into()),
            description_columns: vec!["Buchungstext".into()],
            amount: AmountMapping::Split {
                debit_column: Some("Belastung CHF".into()),
                credit_column: Some("Gutschrift CHF".into()),
                fallback_column: Some("Betrag Detail".into()),
            },
            sign_policy: SignPolicy::AsIs,
            drop_summary_rows: false,
        }
    }

    fn zkb_row(date: &str, text: &str, debit: &str, detail: &str) -> RowMap {
        row(&[
            ("Datum", date),
            ("Buchungstext", text),
            ("Whg", if date.is_empty() { "" } else { "CHF" }),
            ("Belastung CHF", debit),
            ("Gutschrift CHF", ""),
            ("Betrag Detail", detail),
        ])
    }

    #[test]
    fn test_zkb_detail_rows_take_parent_date_and_are_audited() {
        let rows = vec![
            zkb_row("05.02.2026", "Sammelauftrag (2)", "300.00", ""),
            zkb_row("", "Miete Februar", "", "200.00"),
            zkb_row("", "Parkplatz", "", "100.00"),
            zkb_row("06.02.2026", "Migros", "45.20", ""),
            zkb_row("07.02.2026", "Sammelauftrag (2)", "50.00", ""),
            zkb_row("", "Verein A", "", "20.00"),
            zkb_row("", "Verein B", "", "20.00"),
        ];
        let records = normalize_rows(&rows, &zkb_mapping(), "1020", "CHF");
        assert_eq!(records.len(), 7);

        let parent = &records[0].amount_diagnostics;
        assert_eq!(records[0].amount, dec("-300.00"));
        assert!(!parent.inherited_date);
        assert_eq!(parent.group_total_matches, None);

        for child in &records[1..3] {
            assert_eq!(child.date, "2026-02-05");
            assert!(child.amount_diagnostics.inherited_date);
            assert_eq!(child.amount_diagnostics.group_total_matches, Some(true));
        }

        assert_eq!(records[3].date, "2026-02-06");
        assert_eq!(records[3].amount_diagnostics.group_total_matches, None);

        for child in &records[5..] {
            assert_eq!(child.date, "2026-02-07");
            assert_eq!(child.amount_diagnostics.group_total_matches, Some(false));
        }
    }

    #[test]
    fn test_zkb_group_total_within_tolerance() {
        let rows = vec![
            zkb_row("05.02.2026", "Sammelauftrag (2)", "100.00", ""),
            zkb_row("", "A", "", "33.34"),
            zkb_row("", "B", "", "66.67"),
        ];
        let records = normalize_rows(&rows, &zkb_mapping(), "", "CHF");
        assert_eq!(records[1].amount_diagnostics.group_total_matches, Some(true));
        assert_eq!(records[2].amount_diagnostics.group_total_matches, Some(true));
    }

    #[test]
    fn test_undated_row_takes_previous_date() {
        let rows = vec![
            zkb_row("", "Vortrag", "1.00", ""),
            zkb_row("06.02.2026", "Migros", "45.20", ""),
            zkb_row("", "Migros Zusatz", "2.00", ""),
        ];
        let records = normalize_rows(&rows, &zkb_mapping(), "", "CHF");
        assert_eq!(records.len(), 3);
        assert!(records[0].date.is_empty());
        assert!(!records[0].amount_diagnostics.inherited_date);
        assert_eq!(records[2].date, "2026-02-06");
        assert!(records[2].amount_diagnostics.inherited_date);
        assert_eq!(records[2].amount_diagnostics.group_total_matches, None);
    }

    #[test]
    fn test_summary_row_kept_without_drop() {
        let rows = vec![split_row("", "300", ""), {
            let mut r = split_row("", "300", "");
            r.insert("Text".into(), "Sammelbuchung".into());
            r
        }];
        let records = normalize_rows(&rows, &split_mapping(BankTemplate::Ubs, false), "", "CHF");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_empty_rows_dropped_and_ids_sequential() {
        let rows = vec![
            split_row("10", "", ""),
            row(&[("Datum", ""), ("Text", ""), ("Belastung", ""), ("Gutschrift", "")]),
            split_row("", "20", ""),
        ];
        let records = normalize_rows(&rows, &split_mapping(BankTemplate::GenericSplit, false), "", "CHF");
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["0001", "0002"]);
    }

    #[test]
    fn test_record_fields() {
        let rows = vec![split_row("45.20", "", ""), split_row("", "100", "")];
        let records = normalize_rows(&rows, &split_mapping(BankTemplate::GenericSplit, false), "1020", "CHF");
        assert_eq!(records[0].date, "2026-02-01");
        assert_eq!(records[0].direction, Direction::Debit);
        assert_eq!(records[0].credit_side_account, "1020");
        assert!(records[0].debit_side_account.is_empty());
        assert_eq!(records[1].direction, Direction::Credit);
        assert_eq!(records[1].debit_side_account, "1020");
        assert_eq!(records[1].fx_rate, Decimal::ONE);
        assert_eq!(records[1].original_row["Gutschrift"], "100");
    }

    #[test]
    fn test_unparseable_date_passes_through() {
        let mut r = split_row("5", "", "");
        r.insert("Datum".into(), "Ende Monat".into());
        let records = normalize_rows(&[r], &split_mapping(BankTemplate::GenericSplit, false), "", "CHF");
        assert_eq!(records[0].date, "Ende Monat");
    }

    #[test]
    fn test_unmapped_columns_yield_defaults() {
        let mapping = FieldMapping {
            template: BankTemplate::GenericSingle,
            date_column: Some("Missing".into()),
            currency_column: Some("AlsoMissing".into()),
            description_columns: vec!["Text".into()],
            amount: AmountMapping::Single { column: None },
            sign_policy: SignPolicy::AsIs,
            drop_summary_rows: false,
        };
        let r = row(&[("Text", "Nur Text")]);
        let records = normalize_rows(&[r], &mapping, "", "EUR");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].currency, "EUR");
        assert!(records[0].amount.is_zero());
        assert!(records[0].date.is_empty());
    }

    #[test]
    fn test_renormalizing_is_deterministic() {
        let rows = vec![split_row("45.20", "", ""), split_row("", "100", "")];
        let m = split_mapping(BankTemplate::GenericSplit, false);
        assert_eq!(normalize_rows(&rows, &m, "1020", "CHF"), normalize_rows(&rows, &m, "1020", "CHF"));
    }
}
