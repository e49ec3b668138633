//! Phone and postal-address canonicalization.
//!
//! Phones are rewritten to `+<country><digits>` so numbers typed in different
//! formats compare equal. Addresses are reduced to a street number plus street
//! name tokens so they can be looked for inside free text.

use regex::Regex;
use serde::Serialize;

/// Street-type words dropped from the end of a street line.
const STREET_SUFFIXES: &[&str] = &[
    "street", "st", "avenue", "ave", "av", "drive", "dr", "boulevard", "blvd", "road", "rd",
    "lane", "ln", "court", "ct", "place", "pl", "way", "circle", "cir", "terrace", "ter",
    "parkway", "pkwy", "highway", "hwy", "trail", "trl", "square", "sq", "loop", "crescent",
    "cres", "alley", "aly", "plaza", "plz", "row", "run", "pike", "expressway", "expy",
];

/// Canonicalize a phone number.
///
/// - Handles containing `@` (an email used as an iMessage handle) are lower-cased.
/// - 10 digits → `+1` prefix (US).
/// - 11 digits starting with `1` → `+` prefix.
/// - Any other run of 11+ digits already carries a country code → `+` prefix.
/// - Fewer than 10 digits → None.
pub fn normalize_phone(raw: &str) -> Option<String> {
    if raw.contains('@') {
        return Some(raw.to_lowercase());
    }
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        0..=9 => None,
        10 => Some(format!("+1{digits}")),
        _ => Some(format!("+{digits}")),
    }
}

/// True only when both sides normalize and the canonical strings are equal.
pub fn phones_match(a: &str, b: &str) -> bool {
    match (normalize_phone(a), normalize_phone(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// The trailing ten digits of a canonical phone, used for substring search
/// against denormalized participant strings where the country code may be
/// absent. Handles (`@`) have no digit suffix.
pub fn phone_search_suffix(canonical: &str) -> Option<String> {
    if canonical.contains('@') {
        return None;
    }
    let digits: Vec<char> = canonical.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 10 {
        return None;
    }
    Some(digits[digits.len() - 10..].iter().collect())
}

/// A street line reduced to comparable parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedAddress {
    pub street_number: String,
    /// Lower-cased street name tokens joined by single spaces, suffix removed.
    pub street_name: String,
    /// Number and name together, e.g. `123 oak`.
    pub full: String,
}

impl NormalizedAddress {
    pub fn street_words(&self) -> impl Iterator<Item = &str> {
        self.street_name.split_whitespace()
    }
}

/// Reduce a postal address to its street number and street name.
///
/// Only the text before the first comma is considered. The first token must
/// start with a digit; one trailing street-type word (`St`, `Street`, `Blvd.` …)
/// is removed; at least one name token must remain.
pub fn normalize_address(raw: &str) -> Option<NormalizedAddress> {
    let street_line = raw.split(',').next().unwrap_or("").to_lowercase();
    let mut tokens: Vec<&str> = street_line.split_whitespace().collect();

    let first = tokens.first()?;
    if !first.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    if let Some(&last) = tokens.last() {
        let bare = last.strip_suffix('.').unwrap_or(last);
        if STREET_SUFFIXES.contains(&bare) {
            tokens.pop();
        }
    }
    if tokens.len() < 2 {
        return None;
    }

    let street_number = tokens[0].to_string();
    let street_name = tokens[1..].join(" ");
    Some(NormalizedAddress {
        full: format!("{street_number} {street_name}"),
        street_number,
        street_name,
    })
}

/// Whether `text` mentions the address: the street number and every street
/// name word each appear as a standalone word, case-insensitively, in any
/// order. `123` does not match inside `1234`, nor `oak` inside `oakland`.
pub fn content_contains_address(text: &str, address: &NormalizedAddress) -> bool {
    if text.is_empty() {
        return false;
    }
    std::iter::once(address.street_number.as_str())
        .chain(address.street_words())
        .all(|word| contains_word(text, word))
}

fn contains_word(text: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    let pattern = format!(r"(?i)(?:^|[^\p{{L}}\p{{N}}_]){}(?:$|[^\p{{L}}\p{{N}}_])", regex::escape(word));
    Regex::new(&pattern)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}
