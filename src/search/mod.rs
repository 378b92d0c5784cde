//! Search input validation and accent-insensitive pattern building.
//!
//! The search index consumes plain regex pattern text. The helpers here
//! turn a raw user query into a pattern that matches Vietnamese text with
//! or without tone marks: metacharacters are escaped so the input is
//! embedded literally, then every base letter in the folding table is
//! expanded into a character class of itself plus its accented variants.

use thiserror::Error;

/// Minimum query length in characters, after trimming.
pub const MIN_QUERY_CHARS: usize = 2;
/// Maximum query length in characters, after trimming.
pub const MAX_QUERY_CHARS: usize = 100;

const REGEX_METACHARACTERS: &str = r".*+?^${}()|[]\";

/// Accent-folding groups covering the full Vietnamese tonal range.
///
/// The enumerated table is the contract: exactly these base letters fold,
/// every other character passes through untouched. This is a lookup, not
/// Unicode normalization.
const ACCENT_GROUPS: &[(char, &str)] = &[
    ('a', "àáạảãâầấậẩẫăằắặẳẵ"),
    ('e', "èéẹẻẽêềếệểễ"),
    ('i', "ìíịỉĩ"),
    ('o', "òóọỏõôồốộổỗơờớợởỡ"),
    ('u', "ùúụủũưừứựửữ"),
    ('y', "ỳýỵỷỹ"),
    ('d', "đ"),
    ('A', "ÀÁẠẢÃÂẦẤẬẨẪĂẰẮẶẲẴ"),
    ('E', "ÈÉẸẺẼÊỀẾỆỂỄ"),
    ('I', "ÌÍỊỈĨ"),
    ('O', "ÒÓỌỎÕÔỒỐỘỔỖƠỜỚỢỞỠ"),
    ('U', "ÙÚỤỦŨƯỪỨỰỬỮ"),
    ('Y', "ỲÝỴỶỸ"),
    ('D', "Đ"),
];

/// Errors raised while validating a raw search query.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("search query must be at least {MIN_QUERY_CHARS} characters")]
    TooShort,
    #[error("search query must be at most {MAX_QUERY_CHARS} characters")]
    TooLong,
}

/// A validated, trimmed search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchToken(String);

impl SearchToken {
    /// Trim and validate a raw query.
    ///
    /// Length bounds are counted in characters, not bytes, so multi-byte
    /// Vietnamese input is measured the way users perceive it.
    pub fn parse(raw: &str) -> Result<Self, SearchError> {
        let trimmed = raw.trim();
        let length = trimmed.chars().count();

        if length < MIN_QUERY_CHARS {
            return Err(SearchError::TooShort);
        }
        if length > MAX_QUERY_CHARS {
            return Err(SearchError::TooLong);
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SearchToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backslash-escape every regex metacharacter so arbitrary user text can be
/// embedded literally inside a generated pattern.
pub fn escape_regex_special_chars(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for ch in text.chars() {
        if REGEX_METACHARACTERS.contains(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }

    escaped
}

/// Expand every base letter in the folding table into a character class of
/// itself plus its accented variants, so a plain-ASCII query matches
/// accented and unaccented text alike.
pub fn fold_diacritics(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len());

    for ch in text.chars() {
        match ACCENT_GROUPS.iter().find(|(base, _)| *base == ch) {
            Some((base, variants)) => {
                pattern.push('[');
                pattern.push(*base);
                pattern.push_str(variants);
                pattern.push(']');
            }
            None => pattern.push(ch),
        }
    }

    pattern
}

/// The composition the search service consumes: escape, then fold.
///
/// Escaping must run first; folding inserts character-class brackets that
/// would otherwise be escaped away.
pub fn accent_insensitive_pattern(token: &SearchToken) -> String {
    fold_diacritics(&escape_regex_special_chars(token.as_str()))
}
