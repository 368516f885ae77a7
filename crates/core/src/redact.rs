//! Phone-number redaction for free text.
//!
//! Matching happens in two steps. A permissive pattern finds candidate spans
//! (digits mixed with `+`, `-`, spaces and parentheses), then each candidate
//! is classified by how many digits it actually carries.

use std::borrow::Cow;
use std::ops::RangeInclusive;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

pub const PHONE_PLACEHOLDER: &str = "[redacted phone]";

/// Digit counts treated as a phone number once formatting is stripped.
pub const PHONE_DIGIT_RANGE: RangeInclusive<usize> = 10..=15;

static CANDIDATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\+?[0-9][0-9\- ()]{8,}[0-9]").expect("phone candidate pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateSpan<'a> {
    pub start: usize,
    pub end: usize,
    pub raw: &'a str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionStats {
    pub inbound: usize,
    pub outbound: usize,
}

impl RedactionStats {
    pub fn total(&self) -> usize {
        self.inbound + self.outbound
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redaction<'a> {
    pub text: Cow<'a, str>,
    pub replaced: usize,
}

/// Lazily yields non-overlapping candidate spans, left to right.
pub fn candidate_spans(text: &str) -> impl Iterator<Item = CandidateSpan<'_>> {
    CANDIDATE_PATTERN.find_iter(text).map(|found| CandidateSpan {
        start: found.start(),
        end: found.end(),
        raw: found.as_str(),
    })
}

pub fn is_phone_like(raw: &str) -> bool {
    let digits = raw.chars().filter(char::is_ascii_digit).count();
    PHONE_DIGIT_RANGE.contains(&digits)
}

pub fn redact(text: &str) -> Cow<'_, str> {
    redact_counted(text).text
}

pub fn redact_optional(text: Option<&str>) -> Option<Cow<'_, str>> {
    text.map(redact)
}

pub fn redact_counted(text: &str) -> Redaction<'_> {
    if text.is_empty() {
        return Redaction {
            text: Cow::Borrowed(text),
            replaced: 0,
        };
    }

    let mut replaced = 0_usize;
    let output = CANDIDATE_PATTERN.replace_all(text, |caps: &Captures<'_>| {
        let raw = &caps[0];
        if is_phone_like(raw) {
            replaced += 1;
            PHONE_PLACEHOLDER.to_string()
        } else {
            raw.to_string()
        }
    });

    // replace_all allocates whenever the pattern matched, even if every
    // candidate was kept verbatim.
    let text = if replaced == 0 {
        Cow::Borrowed(text)
    } else {
        output
    };

    Redaction { text, replaced }
}
