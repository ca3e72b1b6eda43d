pub mod dispatch;

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::error::GatewayError;

/// Header carrying the comma-separated `tfs-*=value` routing pairs.
pub const CUSTOM_ATTRIBUTES_HEADER: &str = "X-Amzn-SageMaker-Custom-Attributes";

/// Fixed prefix of every backend model path.
pub(crate) const TFS_BASE_PATH: &str = "/tfs/v1/models/";

const DEFAULT_METHOD: &str = "predict";

static ATTRIBUTE_PAIR_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"tfs-[a-z\-]+=[^,]+").ok());

/// Routing metadata resolved once per request: which model, and optionally
/// which version and signature method, the backend call targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingAttributes {
    pub model_name: String,
    pub model_version: Option<String>,
    pub method: Option<String>,
}

#[derive(Default)]
struct ParsedAttributes {
    model_name: Option<String>,
    model_version: Option<String>,
    method: Option<String>,
}

impl RoutingAttributes {
    /// Attributes for a bare model name, no version or method.
    #[must_use]
    pub fn for_model(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model_version: None,
            method: None,
        }
    }

    /// Resolve routing attributes from the custom header, the request path,
    /// and the configured default, in that order of precedence for the model
    /// name. Version and method only ever come from the header.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RoutingUnresolved`] when none of the three
    /// sources yields a model name.
    pub fn resolve(
        header: Option<&str>,
        path: &str,
        default_model: Option<&str>,
    ) -> Result<Self, GatewayError> {
        let parsed = parse_attribute_header(header.unwrap_or(""));
        let model_name = parsed
            .model_name
            .or_else(|| invoke_path_model(path).map(str::to_string))
            .or_else(|| default_model.map(str::to_string))
            .ok_or(GatewayError::RoutingUnresolved)?;
        Ok(Self {
            model_name,
            model_version: parsed.model_version,
            method: parsed.method,
        })
    }

    /// Compose the backend path: base prefix, model name, optional
    /// `/versions/<v>` segment, and a `:<method>` suffix for inference calls
    /// (`predict` when no method attribute was sent). Plain model-status
    /// probes skip the suffix.
    #[must_use]
    pub fn backend_path(&self, with_method: bool) -> String {
        let mut path = String::with_capacity(TFS_BASE_PATH.len() + self.model_name.len() + 24);
        path.push_str(TFS_BASE_PATH);
        path.push_str(&self.model_name);
        if let Some(version) = &self.model_version {
            path.push_str("/versions/");
            path.push_str(version);
        }
        if with_method {
            path.push(':');
            path.push_str(self.method.as_deref().unwrap_or(DEFAULT_METHOD));
        }
        path
    }
}

/// Scan the header for `tfs-*=value` pairs. Matches that do not split into
/// exactly two `=` parts are dropped; a repeated key keeps its last value.
/// Values are opaque, neither URL-decoded nor validated.
fn parse_attribute_header(header: &str) -> ParsedAttributes {
    let mut attributes = ParsedAttributes::default();
    let Some(pattern) = ATTRIBUTE_PAIR_PATTERN.as_ref() else {
        return attributes;
    };
    for pair in pattern.find_iter(header) {
        let mut parts = pair.as_str().split('=');
        let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        match key {
            "tfs-model-name" => attributes.model_name = Some(value.to_string()),
            "tfs-model-version" => attributes.model_version = Some(value.to_string()),
            "tfs-method" => attributes.method = Some(value.to_string()),
            _ => {}
        }
    }
    attributes
}

/// Extract the model name from a `/models/<name>/invoke` path, requiring the
/// exact prefix and suffix with a non-empty name between.
pub(crate) fn invoke_path_model(path: &str) -> Option<&str> {
    let name = path.strip_prefix("/models/")?.strip_suffix("/invoke")?;
    (!name.is_empty()).then_some(name)
}
