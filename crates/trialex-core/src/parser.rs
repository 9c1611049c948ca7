//! Turning raw model output into an [`ExtractedRecord`].
//!
//! The model is asked for a bare JSON object, but it does not always comply.
//! Parsing first tries the whole response as-is. If that fails, it takes the
//! span from the first `{` to the last `}`, flattens newlines and tries again.
//! The span is not nesting-aware: a response with several objects yields one
//! span covering all of them, which normally fails to parse.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::record::{ExtractedRecord, SCHEMA_FIELDS};

/// Number of characters of the raw response kept for diagnostics.
pub const PREVIEW_CHARS: usize = 500;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("could not extract valid JSON from response; response received: {preview}")]
    NoJson { preview: String },
    #[error("invalid JSON in response ({reason}); response received: {preview}")]
    InvalidJson { reason: String, preview: String },
    #[error(
        "response does not match the extraction schema (missing: [{}], not strings: [{}], unexpected: [{}]); response received: {preview}",
        .missing.join(", "),
        .non_string.join(", "),
        .unexpected.join(", ")
    )]
    Schema {
        missing: Vec<String>,
        non_string: Vec<String>,
        unexpected: Vec<String>,
        preview: String,
    },
}

impl ParseError {
    /// The first [`PREVIEW_CHARS`] characters of the offending response.
    pub fn preview(&self) -> &str {
        match self {
            ParseError::NoJson { preview }
            | ParseError::InvalidJson { preview, .. }
            | ParseError::Schema { preview, .. } => preview,
        }
    }
}

/// First [`PREVIEW_CHARS`] characters of `raw`, cut on a char boundary.
pub fn response_preview(raw: &str) -> String {
    raw.chars().take(PREVIEW_CHARS).collect()
}

/// Locate the first `{` and last `}` and return that span with `\n` and `\r`
/// replaced by spaces. `None` if there is no such span.
pub fn recover_json_span(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(raw[start..=end].replace(['\n', '\r'], " "))
}

/// Parse a model response into a schema-conformant record.
pub fn parse_response(raw: &str) -> Result<ExtractedRecord, ParseError> {
    let object = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        strict => {
            if let Err(e) = &strict {
                tracing::debug!(error = %e, "strict parse failed, trying brace recovery");
            }
            let cleaned = recover_json_span(raw).ok_or_else(|| ParseError::NoJson {
                preview: response_preview(raw),
            })?;
            match serde_json::from_str::<Value>(&cleaned) {
                Ok(Value::Object(map)) => map,
                Ok(other) => {
                    return Err(ParseError::InvalidJson {
                        reason: format!("expected an object, found {}", json_kind(&other)),
                        preview: response_preview(raw),
                    });
                }
                Err(e) => {
                    return Err(ParseError::InvalidJson {
                        reason: e.to_string(),
                        preview: response_preview(raw),
                    });
                }
            }
        }
    };

    conform(object, raw)
}

/// Check an object against the twelve-field schema and convert it.
fn conform(object: Map<String, Value>, raw: &str) -> Result<ExtractedRecord, ParseError> {
    let missing: Vec<String> = SCHEMA_FIELDS
        .iter()
        .filter(|f| !object.contains_key(**f))
        .map(|f| f.to_string())
        .collect();
    let unexpected: Vec<String> = object
        .keys()
        .filter(|k| !SCHEMA_FIELDS.contains(&k.as_str()))
        .cloned()
        .collect();
    let non_string: Vec<String> = object
        .iter()
        .filter(|(k, v)| SCHEMA_FIELDS.contains(&k.as_str()) && !v.is_string())
        .map(|(k, _)| k.clone())
        .collect();

    if !missing.is_empty() || !unexpected.is_empty() || !non_string.is_empty() {
        return Err(ParseError::Schema {
            missing,
            non_string,
            unexpected,
            preview: response_preview(raw),
        });
    }

    Ok(object
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            _ => None,
        })
        .collect())
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
