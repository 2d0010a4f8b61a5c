use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

const UBS_CSV: &str = "Kontonummer:;0235 00123456.01\n\
IBAN:;CH93 0076 2011 6238 5295 7\n\
\n\
Abschlussdatum;Abschlusszeit;Buchungsdatum;Valutadatum;Währung;Belastung;Gutschrift;Einzelbetrag;Saldo;Transaktions-Nr.;Beschreibung1;Beschreibung2;Beschreibung3;Fussnoten\n\
2026-02-03;;2026-02-03;2026-02-03;CHF;;300.00;;1300.00;T1;Sammelauftrag;;;\n\
;;;;;;;-120.00;;;Kunde A;;;\n\
2026-02-05;;2026-02-05;2026-02-05;CHF;45.20;;;1254.80;T2;Migros;Zuerich;;\n";

const CAMT_XML: &str = "<?xml version=\"1.0\"?>\
<Document xmlns=\"urn:iso:std:iso:20022:tech:xsd:camt.053.001.04\"><BkToCstmrStmt><Stmt>\
<Ntry><Amt Ccy=\"CHF\">5200.00</Amt><CdtDbtInd>CRDT</CdtDbtInd><BookgDt><Dt>2026-02-25</Dt></BookgDt><AddtlNtryInf>Lohn Februar</AddtlNtryInf></Ntry>\
<Ntry><Amt Ccy=\"CHF\">9.00</Amt><CdtDbtInd>DBIT</CdtDbtInd></Ntry>\
<Ntry><Amt Ccy=\"CHF\">80.00</Amt><CdtDbtInd>DBIT</CdtDbtInd><BookgDt><Dt>2026-02-26</Dt></BookgDt><AddtlNtryInf>Swisscom</AddtlNtryInf></Ntry>\
</Stmt></BkToCstmrStmt></Document>";

struct Env {
    home: tempfile::TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            home: tempfile::tempdir().unwrap(),
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("bankimport").unwrap();
        cmd.env("HOME", self.home.path()).env("NO_COLOR", "1").env_remove("RUST_LOG");
        cmd
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.home.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn normalize_json(env: &Env, args: &[&str]) -> serde_json::Value {
    let output = env.cmd().arg("normalize").args(args).arg("--json").output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_candidates_lists_best_table_first() {
    let env = Env::new();
    let file = env.write("ubs.csv", UBS_CSV);
    env.cmd()
        .arg("candidates")
        .arg(arg(&file))
        .assert()
        .success()
        .stdout(predicate::str::contains("Candidates"))
        .stdout(predicate::str::contains("semicolon-h2"));
}

#[test]
fn test_mapping_prints_ubs_template() {
    let env = Env::new();
    let file = env.write("ubs.csv", UBS_CSV);
    let output = env.cmd().arg("mapping").arg(arg(&file)).output().unwrap();
    assert!(output.status.success());
    let mapping: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(mapping["template"], "ubs");
    assert_eq!(mapping["amount"]["mode"], "split");
    assert_eq!(mapping["amount"]["fallback_column"], "Einzelbetrag");
    assert_eq!(mapping["drop_summary_rows"], true);
}

#[test]
fn test_normalize_ubs_inherits_summary_date_and_sign() {
    let env = Env::new();
    let file = env.write("ubs.csv", UBS_CSV);
    let out = normalize_json(&env, &[arg(&file), "--bank-account", "1020"]);
    let records = out["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["id"], "0001");
    assert_eq!(records[0]["date"], "2026-02-03");
    assert_eq!(records[0]["amount"], "120.00");
    assert_eq!(records[0]["direction"], "CREDIT");
    assert_eq!(records[0]["debitSideAccount"], "1020");
    assert_eq!(records[1]["id"], "0002");
    assert_eq!(records[1]["amount"], "-45.20");
    assert_eq!(records[1]["description"], "Migros Zuerich");
    assert_eq!(records[1]["creditSideAccount"], "1020");
}

#[test]
fn test_normalize_camt_skips_undated_entry() {
    let env = Env::new();
    let file = env.write("statement.xml", CAMT_XML);
    let out = normalize_json(&env, &[arg(&file), "--bank-account", "1020"]);
    let records = out["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["description"], "Lohn Februar");
    assert_eq!(records[1]["amount"], "-80.00");
    assert_eq!(records[1]["direction"], "DEBIT");
}

#[test]
fn test_normalize_rejects_unknown_extension() {
    let env = Env::new();
    let file = env.write("statement.pdf", "%PDF-1.4");
    env.cmd()
        .arg("normalize")
        .arg(arg(&file))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: Unsupported file type"));
}

#[test]
fn test_normalize_export_and_posting_rules() {
    let env = Env::new();
    let file = env.write("ubs.csv", UBS_CSV);
    env.cmd()
        .args(["rules", "add", "Migros", "4000"])
        .assert()
        .success();
    let export = env.home.path().join("out").join("postings.csv");
    env.cmd()
        .arg("normalize")
        .arg(arg(&file))
        .args(["--bank-account", "1020", "--export", arg(&export)])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 2 postings"));
    let content = std::fs::read_to_string(&export).unwrap();
    assert!(content.contains("0002;2026-02-05;Migros Zuerich;45.20;CHF;1;4000;1020;"));
}

#[test]
fn test_normalize_applies_edits_and_manual_text() {
    let env = Env::new();
    let file = env.write("ubs.csv", UBS_CSV);
    let overrides = env.write("overrides.json", r#"{"0001": {"manualText": "Kundenzahlung A"}}"#);
    let edits = env.write("edits.json", r#"[{"id": "0002", "amount": "45.20"}]"#);
    let out = normalize_json(
        &env,
        &[
            arg(&file),
            "--bank-account",
            "1020",
            "--overrides",
            arg(&overrides),
            "--edits",
            arg(&edits),
        ],
    );
    let records = out["records"].as_array().unwrap();
    assert_eq!(records[0]["description"], "Kundenzahlung A");
    assert_eq!(records[1]["direction"], "CREDIT");
    assert_eq!(records[1]["debitSideAccount"], "1020");
    assert_eq!(out["cleanup"][0]["manual"], true);
}

#[test]
fn test_rules_add_rejects_invalid_regex() {
    let env = Env::new();
    env.cmd()
        .args(["rules", "add", "Lohn (", "3000", "--match-type", "regex"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid regex"));
    env.cmd()
        .args(["rules", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Lohn (").not());
}

#[test]
fn test_normalize_spreadsheet_fixture() {
    let env = Env::new();
    let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/statement.xlsx");
    let out = normalize_json(&env, &[arg(&fixture), "--bank-account", "1020"]);
    let records = out["records"].as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["date"], "2026-02-05");
    assert_eq!(records[0]["amount"], "-45.2");
    assert_eq!(records[1]["direction"], "CREDIT");
}

#[test]
fn test_clean_single_text() {
    let env = Env::new();
    env.cmd()
        .args(["clean", "GUTSCHRIFT MIGROS ZUERICH CH93 0076 2011 6238 5295 7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Migros Zuerich"))
        .stdout(predicate::str::contains("stripBookingWords"));
}

#[test]
fn test_clean_unknown_rule_fails() {
    let env = Env::new();
    env.cmd()
        .args(["clean", "text", "--disable", "shout"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown cleanup rule"));
}

#[test]
fn test_config_set_then_show() {
    let env = Env::new();
    env.cmd()
        .args(["config", "set", "--bank-account", "1020", "--vat", "with", "--add-removal", "TWINT"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved settings"));
    env.cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1020"))
        .stdout(predicate::str::contains("with"))
        .stdout(predicate::str::contains("TWINT"));
}
