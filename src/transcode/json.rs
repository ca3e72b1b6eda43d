use memchr::memchr;

use super::classify::starts_nested_array;
use super::CanonicalEnvelope;

/// Wrap a generic JSON body in the instances envelope.
///
/// The body is spliced in verbatim as one logical instance (or a pre-built
/// array of instances); bodies already opening with `[[` are taken as a
/// batch and kept as-is.
#[must_use]
pub fn transcode_generic_json(body: &[u8]) -> CanonicalEnvelope {
    let mut out = Vec::with_capacity(body.len() + 16);
    out.extend_from_slice(b"{\"instances\":");
    if starts_nested_array(body) {
        out.extend_from_slice(body);
    } else {
        out.push(b'[');
        out.extend_from_slice(body);
        out.push(b']');
    }
    out.push(b'}');
    CanonicalEnvelope::from_vec(out)
}

/// Transcode newline-delimited JSON values into the instances envelope.
///
/// Lines are trimmed and blank ones dropped; values keep their original order
/// and are never re-parsed. A body whose trimmed form holds no line break at
/// all emits its bare value with no surrounding array.
#[must_use]
pub fn transcode_json_lines(body: &[u8]) -> CanonicalEnvelope {
    let trimmed = body.trim_ascii();
    let single_line = memchr(b'\n', trimmed).is_none();

    let mut out = Vec::with_capacity(trimmed.len() + 16);
    out.extend_from_slice(b"{\"instances\":");
    if !single_line {
        out.push(b'[');
    }

    let mut first = true;
    for segment in trimmed.split(|&b| b == b'\n') {
        let line = segment.trim_ascii();
        if line.is_empty() {
            continue;
        }
        if !first {
            out.push(b',');
        }
        out.extend_from_slice(line);
        first = false;
    }

    if single_line {
        out.push(b'}');
    } else {
        out.extend_from_slice(b"]}");
    }
    CanonicalEnvelope::from_vec(out)
}
