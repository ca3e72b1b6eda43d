mod classify;
mod csv;
mod json;

pub use classify::{classify, BodyFormat};
pub use csv::transcode_csv;
pub use json::{transcode_generic_json, transcode_json_lines};

use bytes::Bytes;

use crate::error::GatewayError;

/// Canonical backend request body: `{"instances": ...}` built by one of the
/// transcoders, or an inbound body that already carried a native envelope key
/// and is forwarded untouched.
#[derive(Debug, Clone)]
pub struct CanonicalEnvelope(Bytes);

impl CanonicalEnvelope {
    pub(crate) fn from_vec(buf: Vec<u8>) -> Self {
        Self(Bytes::from(buf))
    }

    pub(crate) fn passthrough(body: &Bytes) -> Self {
        Self(body.clone())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

/// Classify the inbound body and run the matching transcoder.
///
/// # Errors
///
/// Returns [`GatewayError::UnsupportedMediaType`] when the declared content
/// type is not one of the recognized inference types. No other path fails:
/// the transcoders splice text without parsing it, so malformed payloads ride
/// through and surface as backend errors.
pub fn to_canonical(
    content_type: Option<&str>,
    body: &Bytes,
    csv_full_escaping: bool,
) -> Result<CanonicalEnvelope, GatewayError> {
    match classify(content_type, body) {
        BodyFormat::JsonLines => Ok(transcode_json_lines(body)),
        BodyFormat::NativeEnvelope => Ok(CanonicalEnvelope::passthrough(body)),
        BodyFormat::Json => Ok(transcode_generic_json(body)),
        BodyFormat::Csv => Ok(transcode_csv(body, csv_full_escaping)),
        BodyFormat::Unsupported(declared) => Err(GatewayError::UnsupportedMediaType(declared)),
    }
}
