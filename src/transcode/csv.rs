use memchr::memchr;

use super::CanonicalEnvelope;

/// Transcode CSV rows into the instances envelope.
///
/// The quoting policy is decided once for the whole body: if the first
/// non-whitespace byte opens a quote or looks numeric (digit, decimal point,
/// exponent marker, sign), fields are emitted bare; otherwise every row is
/// quoted. Rows are trimmed, blank rows dropped, and a row gains a `[...]`
/// wrapper only when it contains a comma. Comma splitting ignores quoting,
/// so a quoted field holding a comma comes out as two fields.
#[must_use]
pub fn transcode_csv(body: &[u8], full_escaping: bool) -> CanonicalEnvelope {
    let quote_fields = needs_quotes(body);
    let trimmed = body.trim_ascii();

    let mut out = Vec::with_capacity(trimmed.len() + 32);
    out.extend_from_slice(b"{\"instances\":[");

    let mut first = true;
    for segment in trimmed.split(|&b| b == b'\n') {
        let row = segment.trim_ascii();
        if row.is_empty() {
            continue;
        }
        if !first {
            out.push(b',');
        }
        first = false;
        push_row(&mut out, row, quote_fields, full_escaping);
    }

    out.extend_from_slice(b"]}");
    CanonicalEnvelope::from_vec(out)
}

#[inline]
fn needs_quotes(body: &[u8]) -> bool {
    !matches!(
        body.trim_ascii_start().first(),
        Some(&(b'"' | b'0'..=b'9' | b'.' | b'E' | b'e' | b'+' | b'-'))
    )
}

fn push_row(out: &mut Vec<u8>, row: &[u8], quote_fields: bool, full_escaping: bool) {
    let multi_column = memchr(b',', row).is_some();
    if multi_column {
        out.push(b'[');
    }
    if quote_fields {
        out.push(b'"');
        push_spliced(out, row, full_escaping);
        out.push(b'"');
    } else {
        out.extend_from_slice(row);
    }
    if multi_column {
        out.push(b']');
    }
}

/// Quote a row by whole-line splice: `"` becomes `\"` and `,` becomes `","`.
/// The historical behavior rewrites only the first occurrence of each;
/// `full_escaping` switches to every occurrence.
fn push_spliced(out: &mut Vec<u8>, row: &[u8], full_escaping: bool) {
    let mut quote_done = false;
    let mut comma_done = false;
    for &byte in row {
        match byte {
            b'"' if full_escaping || !quote_done => {
                out.extend_from_slice(b"\\\"");
                quote_done = true;
            }
            b',' if full_escaping || !comma_done => {
                out.extend_from_slice(b"\",\"");
                comma_done = true;
            }
            _ => out.push(byte),
        }
    }
}
