//! Extraction of delimited JSON blocks from free-form model output.
//!
//! Models wrap structured answers in prose. We take the span from the first
//! opening delimiter to the last closing delimiter and try to decode it; the
//! caller decides what a [`ParsedOutput::Malformed`] result means.

use serde::de::DeserializeOwned;

/// Outcome of decoding structured data out of free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedOutput<T> {
    /// A block was found and decoded.
    Parsed(T),
    /// No block was found, or it did not decode. Carries the raw text.
    Malformed(String),
}

impl<T> ParsedOutput<T> {
    pub fn is_malformed(&self) -> bool {
        matches!(self, ParsedOutput::Malformed(_))
    }
}

/// Return the span `open ..= last close`, or `None` if either is missing or
/// they are out of order.
pub fn delimited_block(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Decode the delimited block of `text` as `T`.
pub fn parse_json_block<T: DeserializeOwned>(text: &str, open: char, close: char) -> ParsedOutput<T> {
    let Some(block) = delimited_block(text, open, close) else {
        return ParsedOutput::Malformed(text.to_string());
    };
    match serde_json::from_str(block) {
        Ok(value) => ParsedOutput::Parsed(value),
        Err(_) => ParsedOutput::Malformed(text.to_string()),
    }
}
