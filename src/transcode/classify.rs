use std::sync::LazyLock;

use memchr::{memchr2_iter, memmem};

pub(crate) const CONTENT_TYPE_JSON: &str = "application/json";
pub(crate) const CONTENT_TYPE_JSONLINES: &str = "application/jsonlines";
pub(crate) const CONTENT_TYPE_JSONS: &str = "application/jsons";
pub(crate) const CONTENT_TYPE_CSV: &str = "text/csv";

static INSTANCES_KEY_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(br#""instances""#));
static INPUTS_KEY_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(br#""inputs""#));
static EXAMPLES_KEY_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(br#""examples""#));

/// Inference body format, decided from the declared content type plus a
/// structural scan of the raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyFormat {
    /// A single JSON value (or pre-built array) to wrap in the envelope.
    Json,
    /// Newline-delimited JSON values.
    JsonLines,
    /// Body already carries an `instances`/`inputs`/`examples` key.
    NativeEnvelope,
    /// CSV rows.
    Csv,
    /// Unrecognized declared type; carries the type string (or `Unknown`)
    /// for the 415 error body.
    Unsupported(String),
}

/// Classify an inbound body. The JSON family is sub-classified in a fixed
/// order: line-break structure first, then a native envelope key, then
/// generic JSON.
#[must_use]
pub fn classify(content_type: Option<&str>, body: &[u8]) -> BodyFormat {
    match content_type {
        Some(CONTENT_TYPE_JSON | CONTENT_TYPE_JSONLINES | CONTENT_TYPE_JSONS) => {
            if has_json_lines_break(body) {
                BodyFormat::JsonLines
            } else if has_envelope_key(body) {
                BodyFormat::NativeEnvelope
            } else {
                BodyFormat::Json
            }
        }
        Some(CONTENT_TYPE_CSV) => BodyFormat::Csv,
        Some(declared) if !declared.is_empty() => BodyFormat::Unsupported(declared.to_string()),
        _ => BodyFormat::Unsupported("Unknown".to_string()),
    }
}

#[inline]
pub(crate) fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    let len = bytes.len();
    while i < len {
        match bytes[i] {
            b' ' | b'\n' | b'\r' | b'\t' => i += 1,
            _ => break,
        }
    }
    i
}

/// Two JSON values separated only by whitespace: a closing brace or bracket
/// followed (after optional whitespace) by an opening one, anywhere in the
/// body.
#[inline]
pub(crate) fn has_json_lines_break(bytes: &[u8]) -> bool {
    for close in memchr2_iter(b'}', b']', bytes) {
        let next = skip_ws(bytes, close + 1);
        if matches!(bytes.get(next), Some(&(b'{' | b'['))) {
            return true;
        }
    }
    false
}

/// One of the quoted envelope keys followed (after optional whitespace) by a
/// colon, anywhere in the body.
#[inline]
pub(crate) fn has_envelope_key(bytes: &[u8]) -> bool {
    for finder in [
        &INSTANCES_KEY_FINDER,
        &INPUTS_KEY_FINDER,
        &EXAMPLES_KEY_FINDER,
    ] {
        for start in finder.find_iter(bytes) {
            let after = skip_ws(bytes, start + finder.needle().len());
            if bytes.get(after) == Some(&b':') {
                return true;
            }
        }
    }
    false
}

/// Leading `[ [` after optional whitespace: the body is already a batch of
/// instance rows and must not gain another array level.
#[inline]
pub(crate) fn starts_nested_array(bytes: &[u8]) -> bool {
    let first = skip_ws(bytes, 0);
    if bytes.get(first) != Some(&b'[') {
        return false;
    }
    let second = skip_ws(bytes, first + 1);
    bytes.get(second) == Some(&b'[')
}
