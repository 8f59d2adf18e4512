//! Decoding of reviewer output into a [`ReviewVerdict`].

use serde::Deserialize;
use tracing::warn;

use crate::core::extract::{ParsedOutput, parse_json_block};
use crate::core::types::{ReviewResult, ReviewVerdict};

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    needs_revision: Option<bool>,
    #[serde(default)]
    comment: Option<String>,
}

/// Parse the verdict object embedded in a reviewer response.
///
/// Inside a decoded block, a missing `result` counts as FAIL, a missing
/// `needs_revision` as true and a missing `comment` as the whole response.
pub fn parse_verdict(response: &str) -> ParsedOutput<ReviewVerdict> {
    match parse_json_block::<RawVerdict>(response, '{', '}') {
        ParsedOutput::Parsed(raw) => {
            let result = match raw.result.as_deref() {
                Some(value) if value.trim().eq_ignore_ascii_case("pass") => ReviewResult::Pass,
                _ => ReviewResult::Fail,
            };
            ParsedOutput::Parsed(ReviewVerdict {
                result,
                needs_revision: raw.needs_revision.unwrap_or(true),
                comment: raw.comment.unwrap_or_else(|| response.to_string()),
            })
        }
        ParsedOutput::Malformed(raw) => ParsedOutput::Malformed(raw),
    }
}

/// Resolve reviewer output to the verdict the pipeline acts on.
///
/// Unparseable output fails open to PASS.
pub fn verdict_or_pass(parsed: ParsedOutput<ReviewVerdict>) -> ReviewVerdict {
    match parsed {
        ParsedOutput::Parsed(verdict) => verdict,
        ParsedOutput::Malformed(raw) => {
            warn!("reviewer output had no verdict block, treating as PASS");
            ReviewVerdict::fail_open(raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verdict_surrounded_by_prose() {
        let response = r#"Looks mostly fine.
{"result": "FAIL", "needs_revision": true, "comment": "missing tests"}
Thanks."#;
        let verdict = verdict_or_pass(parse_verdict(response));
        assert_eq!(verdict.result, ReviewResult::Fail);
        assert!(verdict.needs_revision);
        assert_eq!(verdict.comment, "missing tests");
    }

    #[test]
    fn result_is_case_insensitive() {
        let verdict = verdict_or_pass(parse_verdict(
            r#"{"result": "pass", "needs_revision": false, "comment": "ok"}"#,
        ));
        assert_eq!(verdict.result, ReviewResult::Pass);
    }

    #[test]
    fn missing_fields_default_to_failing_verdict() {
        let response = r#"{"comment_typo": 1}"#;
        let verdict = verdict_or_pass(parse_verdict(response));
        assert_eq!(verdict.result, ReviewResult::Fail);
        assert!(verdict.needs_revision);
        assert_eq!(verdict.comment, response);
    }

    #[test]
    fn missing_verdict_block_fails_open_to_pass() {
        let parsed = parse_verdict("I could not decide, sorry.");
        assert!(parsed.is_malformed());
        let verdict = verdict_or_pass(parsed);
        assert_eq!(verdict.result, ReviewResult::Pass);
        assert!(!verdict.needs_revision);
        assert_eq!(verdict.comment, "I could not decide, sorry.");
    }

    #[test]
    fn wrongly_typed_block_fails_open_to_pass() {
        let verdict = verdict_or_pass(parse_verdict(r#"{"result": 3, "needs_revision": "yes"}"#));
        assert_eq!(verdict.result, ReviewResult::Pass);
        assert!(!verdict.needs_revision);
    }
}
