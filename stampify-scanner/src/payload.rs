//! QR payload parsing
//!
//! Member QR codes are generated outside this system, so several encodings
//! are accepted. Each encoding is a pure attempt function tried in order:
//!
//! 1. JSON object with an `id`, `memberId` or `userId` field
//! 2. `PREFIX:id`, taking the text after the last colon
//! 3. `member-<id>` / `user-<id>`, as printed on digital member cards
//! 4. A bare token used as-is
//!
//! Whatever an attempt extracts must still pass the plausibility check for the
//! configured id format. Anything else is a `ParseError`; a stamp attributed to
//! the wrong member is worse than asking the operator to re-scan.

use serde_json::{Map, Value};
use stampify_common::config::IdFormat;
use stampify_common::models::{MemberReference, ScanPayload};
use thiserror::Error;

/// JSON keys carrying the member id, in priority order
const ID_KEYS: &[&str] = &["id", "memberId", "userId"];

/// JSON keys carrying a human-readable name, in priority order
const NAME_KEYS: &[&str] = &["name", "memberName", "displayName", "fullName"];

/// Card prefixes stripped before the `-` separator, matched case-insensitively
const CARD_PREFIXES: &[&str] = &["member", "user"];

const MAX_ID_LEN: usize = 64;

/// Longest slice of raw payload echoed back in errors
const PREVIEW_LEN: usize = 48;

/// Payload rejection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Scanned code is empty")]
    Empty,

    #[error("Unrecognized member code '{preview}'; please re-scan a valid member QR code")]
    Unrecognized { preview: String },
}

type Attempt = fn(&str, IdFormat) -> Option<MemberReference>;

const ATTEMPTS: &[Attempt] = &[
    from_json,
    from_colon_delimited,
    from_card_prefix,
    from_bare_token,
];

/// Turns decoded text into a member reference
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadParser {
    id_format: IdFormat,
}

impl PayloadParser {
    pub fn new(id_format: IdFormat) -> Self {
        Self { id_format }
    }

    pub fn id_format(&self) -> IdFormat {
        self.id_format
    }

    pub fn parse(&self, payload: &ScanPayload) -> Result<MemberReference, ParseError> {
        self.parse_text(&payload.text)
    }

    pub fn parse_text(&self, text: &str) -> Result<MemberReference, ParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ParseError::Empty);
        }

        ATTEMPTS
            .iter()
            .find_map(|attempt| attempt(text, self.id_format))
            .ok_or_else(|| ParseError::Unrecognized {
                preview: preview(text),
            })
    }
}

fn from_json(text: &str, format: IdFormat) -> Option<MemberReference> {
    if !text.starts_with('{') {
        return None;
    }
    let object: Map<String, Value> = serde_json::from_str(text).ok()?;

    // an implausible value under one key does not hide the next key
    let member_id = ID_KEYS.iter().find_map(|key| {
        object
            .get(*key)
            .and_then(id_from_value)
            .filter(|id| is_plausible_id(id, format))
    })?;

    let display_name = NAME_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_display_name(&member_id));

    Some(MemberReference {
        member_id,
        display_name,
    })
}

fn from_colon_delimited(text: &str, format: IdFormat) -> Option<MemberReference> {
    let (_, tail) = text.rsplit_once(':')?;
    bare(tail.trim(), format)
}

fn from_card_prefix(text: &str, format: IdFormat) -> Option<MemberReference> {
    let (prefix, tail) = text.split_once('-')?;
    if !CARD_PREFIXES.iter().any(|p| prefix.eq_ignore_ascii_case(p)) {
        return None;
    }
    bare(tail.trim(), format)
}

fn from_bare_token(text: &str, format: IdFormat) -> Option<MemberReference> {
    bare(text, format)
}

fn bare(candidate: &str, format: IdFormat) -> Option<MemberReference> {
    if !is_plausible_id(candidate, format) {
        return None;
    }
    Some(MemberReference {
        member_id: candidate.to_string(),
        display_name: default_display_name(candidate),
    })
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => n
            .as_u64()
            .map(|v| v.to_string())
            .or_else(|| n.as_i64().map(|v| v.to_string())),
        _ => None,
    }
}

fn is_plausible_id(candidate: &str, format: IdFormat) -> bool {
    if candidate.is_empty() || candidate.len() > MAX_ID_LEN {
        return false;
    }
    match format {
        IdFormat::Numeric => candidate.bytes().all(|b| b.is_ascii_digit()),
        IdFormat::Token => candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'),
    }
}

fn default_display_name(member_id: &str) -> String {
    format!("Member {}", member_id)
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_LEN) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
