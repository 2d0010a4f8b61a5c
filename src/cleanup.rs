use std::collections::{BTreeMap, HashMap};

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{NormalizedRecord, DESCRIPTION_PLACEHOLDER};

/// Rounds of the full rule sequence before giving up on reaching a fixed point.
const MAX_PASSES: usize = 8;

/// Trimmed from both ends of the text after every rule.
const EDGE_SEPARATORS: &[char] = &[',', ';', ':', '/', '|', '-'];

static LEADING_BOOKING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:gutschrift|belastung|lastschrift|kontoübertrag|kontouebertrag|übertrag|uebertrag|dauerauftrag|überweisung|ueberweisung|einzahlung|vergütung|verguetung|zahlung|debit|credit|transfer)\b[\s:,.\-]*",
    )
    .unwrap()
});

static ANYWHERE_BOOKING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:auftraggeber|beg(?:ü|ue)nstigter|zahlungsempf(?:ä|ae)nger)\s*:|\b(?:e-banking(?:[- ]auftrag)?|dauerauftrag|ebill|qr-rechnung|zahlungseingang|kartenzahlung)\b",
    )
    .unwrap()
});

static IBAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z]{2}\d{2}(?: ?[A-Z0-9]{4}){2,7}(?: ?[A-Z0-9]{1,3})?\b").unwrap()
});

static REFERENCE_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:qr-referenz|zahlungsreferenz|referenznummer|referenz|transaktions-?nr|transaction (?:id|no)|ref)\b.*$",
    )
    .unwrap()
});

static SENDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\babsender\s*:\s*(.*?)\s*(?:\b(?:mitteilungen|mitteilung|zahlungsgrund|referenz|iban|konto|adresse)\b.*)?$",
    )
    .unwrap()
});

static STREET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b[\p{L}.\-]*(?:strasse|str\.|gasse|weg|platz|allee)\s*\d+[a-z]?\b(?:,?\s*(?:CH-)?\d{4}\s+\p{Lu}[\p{L}\-]*)?",
    )
    .unwrap()
});

static POSTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:,\s*(?:CH-)?|\bCH-)\d{4}\s+\p{Lu}[\p{L}\-]*").unwrap());

static COST_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:spesen|gebühren|gebuehren|kosten|fees?)\b\s*:?\s*(?:[a-z]{3}\s*)?[\d.,']*\s*$",
    )
    .unwrap()
});

static CAPS_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Lu}{4,}").unwrap());
static SPACE_BEFORE_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([,;])").unwrap());
static REPEATED_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([,;])(?:\s*[,;])+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CleanupRule {
    StripBookingWords,
    StripIbanRefs,
    StripAddressBits,
    TitleCase,
    /// The user's literal removal list.
    Custom,
}

impl CleanupRule {
    /// Boolean rules in application order.
    pub const TOGGLES: [CleanupRule; 4] = [
        Self::StripBookingWords,
        Self::StripIbanRefs,
        Self::StripAddressBits,
        Self::TitleCase,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::StripBookingWords => "stripBookingWords",
            Self::StripIbanRefs => "stripIbanRefs",
            Self::StripAddressBits => "stripAddressBits",
            Self::TitleCase => "titleCase",
            Self::Custom => "custom",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let wanted = key.replace(&['-', '_'][..], "").to_lowercase();
        [Self::StripBookingWords, Self::StripIbanRefs, Self::StripAddressBits, Self::TitleCase, Self::Custom]
            .into_iter()
            .find(|r| r.key().to_lowercase() == wanted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupOptions {
    pub strip_booking_words: bool,
    pub strip_iban_refs: bool,
    pub strip_address_bits: bool,
    pub title_case: bool,
    pub custom_removals: Vec<String>,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            strip_booking_words: true,
            strip_iban_refs: true,
            strip_address_bits: true,
            title_case: true,
            custom_removals: Vec::new(),
        }
    }
}

impl CleanupOptions {
    pub fn disabled() -> Self {
        Self {
            strip_booking_words: false,
            strip_iban_refs: false,
            strip_address_bits: false,
            title_case: false,
            custom_removals: Vec::new(),
        }
    }

    pub fn enabled(&self, rule: CleanupRule) -> bool {
        match rule {
            CleanupRule::StripBookingWords => self.strip_booking_words,
            CleanupRule::StripIbanRefs => self.strip_iban_refs,
            CleanupRule::StripAddressBits => self.strip_address_bits,
            CleanupRule::TitleCase => self.title_case,
            CleanupRule::Custom => !self.custom_removals.is_empty(),
        }
    }

    /// Toggle one rule. Turning `Custom` off drops the removal list.
    pub fn set(&mut self, rule: CleanupRule, on: bool) {
        match rule {
            CleanupRule::StripBookingWords => self.strip_booking_words = on,
            CleanupRule::StripIbanRefs => self.strip_iban_refs = on,
            CleanupRule::StripAddressBits => self.strip_address_bits = on,
            CleanupRule::TitleCase => self.title_case = on,
            CleanupRule::Custom => {
                if !on {
                    self.custom_removals.clear();
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    pub text: String,
    /// Rules that altered the text, in application order.
    pub changed_rules: Vec<CleanupRule>,
    /// True when a manual override replaced the engine output.
    pub manual: bool,
}

/// Per-row adjustments against the global options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RowCleanupOverride {
    pub disable_all: bool,
    pub rules: BTreeMap<CleanupRule, bool>,
    pub manual_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupDiff {
    pub id: String,
    pub before: String,
    pub after: String,
    pub changed_rules: Vec<CleanupRule>,
    pub manual: bool,
}

/// Run the enabled rules over `raw` until nothing changes.
pub fn clean_description(raw: &str, options: &CleanupOptions) -> CleanupResult {
    let caps_in_input = CAPS_RUN.is_match(raw);
    let mut text = tidy(raw);
    let mut changed: Vec<CleanupRule> = Vec::new();

    for _ in 0..MAX_PASSES {
        let start = text.clone();
        for rule in CleanupRule::TOGGLES {
            if !options.enabled(rule) {
                continue;
            }
            if rule == CleanupRule::TitleCase && !caps_in_input && !CAPS_RUN.is_match(&text) {
                continue;
            }
            let next = tidy(&apply_rule(rule, &text));
            if next != text {
                mark(&mut changed, rule);
                text = next;
            }
        }
        let next = remove_literals(&text, &options.custom_removals);
        if next != text {
            mark(&mut changed, CleanupRule::Custom);
            text = next;
        }
        if text == start {
            break;
        }
    }

    if text.is_empty() {
        text = DESCRIPTION_PLACEHOLDER.to_string();
    }
    changed.sort();
    CleanupResult {
        text,
        changed_rules: changed,
        manual: false,
    }
}

/// Compose a row override with the global options before running the engine.
pub fn clean_with_override(
    raw: &str,
    options: &CleanupOptions,
    row: Option<&RowCleanupOverride>,
) -> CleanupResult {
    let Some(row) = row else {
        return clean_description(raw, options);
    };
    if let Some(manual) = &row.manual_text {
        let text = tidy(manual);
        return CleanupResult {
            text: if text.is_empty() {
                DESCRIPTION_PLACEHOLDER.to_string()
            } else {
                text
            },
            changed_rules: Vec::new(),
            manual: true,
        };
    }
    if row.disable_all {
        return clean_description(raw, &CleanupOptions::disabled());
    }
    let mut effective = options.clone();
    for (rule, on) in &row.rules {
        effective.set(*rule, *on);
    }
    clean_description(raw, &effective)
}

/// Clean every record's description. Overrides are keyed by record id.
pub fn clean_records(
    records: &[NormalizedRecord],
    options: &CleanupOptions,
    overrides: &HashMap<String, RowCleanupOverride>,
) -> (Vec<NormalizedRecord>, Vec<CleanupDiff>) {
    let mut cleaned = Vec::with_capacity(records.len());
    let mut diffs = Vec::with_capacity(records.len());
    for record in records {
        let result = clean_with_override(&record.description, options, overrides.get(&record.id));
        diffs.push(CleanupDiff {
            id: record.id.clone(),
            before: record.description.clone(),
            after: result.text.clone(),
            changed_rules: result.changed_rules,
            manual: result.manual,
        });
        let mut record = record.clone();
        record.description = result.text;
        cleaned.push(record);
    }
    let touched = diffs.iter().filter(|d| d.before != d.after).count();
    debug!("cleanup changed {touched} of {} descriptions", diffs.len());
    (cleaned, diffs)
}

fn mark(changed: &mut Vec<CleanupRule>, rule: CleanupRule) {
    if !changed.contains(&rule) {
        changed.push(rule);
    }
}

fn apply_rule(rule: CleanupRule, text: &str) -> String {
    match rule {
        CleanupRule::StripBookingWords => strip_booking_words(text),
        CleanupRule::StripIbanRefs => strip_iban_refs(text),
        CleanupRule::StripAddressBits => strip_address_bits(text),
        CleanupRule::TitleCase => title_case(text),
        CleanupRule::Custom => text.to_string(),
    }
}

fn strip_booking_words(text: &str) -> String {
    let mut out = ANYWHERE_BOOKING.replace_all(text, " ").into_owned();
    loop {
        let next = LEADING_BOOKING.replace(out.trim_start(), "").into_owned();
        if next == out {
            return out;
        }
        out = next;
    }
}

fn strip_iban_refs(text: &str) -> String {
    let out = IBAN.replace_all(text, " ");
    REFERENCE_TAIL.replace(&out, "").into_owned()
}

fn strip_address_bits(text: &str) -> String {
    let mut out = match SENDER.captures(text).and_then(|c| c.get(1)) {
        Some(sender) if !sender.as_str().trim().is_empty() => sender.as_str().to_string(),
        _ => text.to_string(),
    };
    out = STREET.replace_all(&out, " ").into_owned();
    out = POSTAL.replace_all(&out, " ").into_owned();
    COST_SUFFIX.replace(&out, "").into_owned()
}

/// Upper-case letters that follow a non-letter, lower-case the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

fn remove_literals(text: &str, removals: &[String]) -> String {
    let mut out = text.to_string();
    for needle in removals.iter().filter(|r| !r.trim().is_empty()) {
        while out.contains(needle.as_str()) {
            out = out.replace(needle.as_str(), "");
        }
        out = tidy(&out);
    }
    out
}

/// Collapse whitespace and separator runs, trim separators off the ends.
fn tidy(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let collapsed = SPACE_BEFORE_SEPARATOR.replace_all(&collapsed, "$1");
    let collapsed = REPEATED_SEPARATORS.replace_all(&collapsed, "$1");
    collapsed
        .trim_matches(|c: char| c.is_whitespace() || EDGE_SEPARATORS.contains(&c))
        .to_string()
}
