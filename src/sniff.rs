use encoding_rs::{Encoding, WINDOWS_1252};
use log::debug;

/// Field delimiters tried on every delimited upload.
pub const DELIMITERS: [char; 4] = [';', ',', '\t', '|'];

/// Non-blank lines inspected when guessing the delimiter.
pub const SNIFF_LINES: usize = 12;

/// Double-encoded UTF-8 (UTF-8 bytes read as Latin-1 and saved again).
const MOJIBAKE_MARKERS: &[&str] = &["Ã¤", "Ã¶", "Ã¼", "Ã„", "Ã–", "Ãœ", "ÃŸ", "Ã©", "Ã¨", "Ã\u{a0}"];

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static str,
}

/// Decode raw upload bytes: BOM first, then strict UTF-8, then Windows-1252.
pub fn decode_bytes(raw: &[u8]) -> DecodedText {
    if let Some((encoding, bom_len)) = Encoding::for_bom(raw) {
        let (text, _) = encoding.decode_without_bom_handling(&raw[bom_len..]);
        return DecodedText {
            text: text.into_owned(),
            encoding: encoding.name(),
        };
    }
    match std::str::from_utf8(raw) {
        Ok(text) => match repair_mojibake(text) {
            Some(repaired) => {
                debug!("repaired double-encoded UTF-8 text");
                DecodedText {
                    text: repaired,
                    encoding: "UTF-8 (repaired)",
                }
            }
            None => DecodedText {
                text: text.to_string(),
                encoding: "UTF-8",
            },
        },
        Err(_) => {
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(raw);
            DecodedText {
                text: text.into_owned(),
                encoding: WINDOWS_1252.name(),
            }
        }
    }
}

/// Undo one level of UTF-8-as-Latin-1 double encoding, if that is what the text shows.
pub fn repair_mojibake(text: &str) -> Option<String> {
    if !MOJIBAKE_MARKERS.iter().any(|m| text.contains(m)) {
        return None;
    }
    let (bytes, _, unmappable) = WINDOWS_1252.encode(text);
    if unmappable {
        return None;
    }
    String::from_utf8(bytes.into_owned()).ok()
}

/// Quote-aware split of one line. Doubled quotes inside a quoted field decode
/// to a single quote; delimiters inside quotes are literal.
pub fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter as u8)
        .from_reader(line.as_bytes());
    match rdr.records().next() {
        Some(Ok(record)) => record.iter().map(str::to_string).collect(),
        _ => vec![line.to_string()],
    }
}

/// Split a whole text into rows line by line, dropping rows whose cells are
/// all blank. A quote left open on one line never swallows the next.
pub fn read_matrix(text: &str, delimiter: char) -> Vec<Vec<String>> {
    text.lines()
        .map(|line| split_fields(line, delimiter))
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .collect()
}

/// The delimiter producing the most field splits over the first non-blank lines.
/// Ties go to the earlier entry of [`DELIMITERS`].
pub fn guess_delimiter(text: &str) -> char {
    let sample: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    let mut best = DELIMITERS[0];
    let mut best_count = 0usize;
    for delim in DELIMITERS {
        let count: usize = sample
            .iter()
            .map(|line| split_fields(line, delim).len().saturating_sub(1))
            .sum();
        if count > best_count {
            best = delim;
            best_count = count;
        }
    }
    debug!("delimiter guess {best:?} ({best_count} splits over {} lines)", sample.len());
    best
}

/// All delimiters, the guessed one first.
pub fn delimiter_order(text: &str) -> Vec<char> {
    let guess = guess_delimiter(text);
    let mut order = vec![guess];
    order.extend(DELIMITERS.iter().copied().filter(|d| *d != guess));
    order
}

pub fn delimiter_name(delimiter: char) -> &'static str {
    match delimiter {
        ';' => "semicolon",
        ',' => "comma",
        '\t' => "tab",
        '|' => "pipe",
        _ => "other",
    }
}
