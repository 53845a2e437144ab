//! Best-effort scrubbing of personally identifying information from free text.
//!
//! Known names are replaced literally; phone numbers, email addresses and
//! national IDs are found by pattern. Digit runs that merely look like a
//! national ID are redacted too, along with every other occurrence of the
//! same digits.

use std::collections::HashSet;

use regex::Regex;

pub const REDACTED_NAME: &str = "[REDACTED NAME]";
pub const REDACTED_PHONE_NUMBER: &str = "[REDACTED PHONE NUMBER]";
pub const REDACTED_EMAIL: &str = "[REDACTED EMAIL]";
pub const REDACTED_NATIONAL_ID: &str = "[REDACTED NATIONAL ID]";

const MARKERS: [&str; 4] = [
    REDACTED_NAME,
    REDACTED_PHONE_NUMBER,
    REDACTED_EMAIL,
    REDACTED_NATIONAL_ID,
];

/// Plaintext PII known to the registry at redaction time.
#[derive(Debug, Clone, Default)]
pub struct KnownPii {
    pub first_names: HashSet<String>,
    pub last_names: HashSet<String>,
    pub candidate_names: HashSet<String>,
    /// Raw national IDs that must be removed verbatim.
    pub national_ids: HashSet<String>,
}

/// Compiled patterns for numeric and email PII.
pub struct Redactor {
    phone_number: Regex,
    email: Regex,
    national_ids: [Regex; 3],
}

impl Redactor {
    pub fn new() -> Self {
        // Patterns are constant, so compilation cannot fail.
        let compile = |pattern: &str| Regex::new(pattern).expect("Redaction pattern is valid");
        Self {
            phone_number: compile(r"\(?\d{3}\)?[-\s]?\d{3}[-\s]?\d{4}"),
            email: compile(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
            national_ids: [
                compile(r"\b\d{9}\b"),
                compile(r"\d+-+\d+-+\d+"),
                compile(r"\d+\s+\d+\s+\d+"),
            ],
        }
    }

    /// Scrub PII from `text`.
    ///
    /// Names go first, then national IDs known verbatim, then phone numbers,
    /// emails and finally national-ID-shaped digit runs. Existing markers are
    /// never rewritten, so redacting twice changes nothing.
    pub fn redact(&self, text: &str, known: &KnownPii) -> String {
        let mut redacted = text.to_string();

        let names = longest_first(
            known
                .first_names
                .iter()
                .chain(&known.last_names)
                .chain(&known.candidate_names),
        );
        for name in names {
            redacted = replace_unmarked(&redacted, |segment| {
                segment.replace(name, REDACTED_NAME)
            });
        }

        for national_id in longest_first(&known.national_ids) {
            redacted = replace_unmarked(&redacted, |segment| {
                segment.replace(national_id, REDACTED_NATIONAL_ID)
            });
        }

        for (pattern, marker) in [
            (&self.phone_number, REDACTED_PHONE_NUMBER),
            (&self.email, REDACTED_EMAIL),
        ] {
            redacted = replace_unmarked(&redacted, |segment| {
                pattern.replace_all(segment, marker).into_owned()
            });
        }

        // Each digit run found by a national-ID pattern is removed wherever it
        // appears, including where the pattern itself would not match.
        for pattern in &self.national_ids {
            let found = pattern
                .find_iter(&redacted)
                .map(|m| m.as_str().to_string())
                .collect::<HashSet<_>>();
            for national_id in longest_first(&found) {
                redacted = replace_unmarked(&redacted, |segment| {
                    segment.replace(national_id, REDACTED_NATIONAL_ID)
                });
            }
        }

        redacted
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}

/// Distinct non-empty strings, longest first so that a name containing
/// another name is replaced whole.
fn longest_first<'a>(strings: impl IntoIterator<Item = &'a String>) -> Vec<&'a str> {
    let mut strings = strings
        .into_iter()
        .map(String::as_str)
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>();
    strings.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    strings.dedup();
    strings
}

/// Apply `f` to every part of `text` that lies outside a redaction marker.
fn replace_unmarked(text: &str, f: impl Fn(&str) -> String) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    while let Some((start, marker)) = MARKERS
        .iter()
        .filter_map(|marker| rest.find(marker).map(|start| (start, *marker)))
        .min_by_key(|(start, _)| *start)
    {
        result.push_str(&f(&rest[..start]));
        result.push_str(marker);
        rest = &rest[start + marker.len()..];
    }
    result.push_str(&f(rest));
    result
}
