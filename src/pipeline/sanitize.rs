//! Request sanitisation: untrusted JSON → [`SanitizedRequest`].
//!
//! Two layers of decoding exist because evaluation harnesses sometimes send
//! the whole payload as a JSON *string* containing JSON. The layers fail
//! differently:
//!
//! * outer body not JSON → [`TaError::MalformedInput`] (client error);
//! * inner string not JSON → absorbed, the question becomes
//!   [`MALFORMED_INPUT_QUESTION`] and the image is dropped.
//!
//! Template markers (`{{`, `}}`) never survive sanitisation. A question that
//! contains one is replaced wholesale by [`INJECTION_PLACEHOLDER`]; an image
//! string that contains one is discarded.

use crate::error::TaError;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Question substituted when the inner payload cannot be decoded.
pub const MALFORMED_INPUT_QUESTION: &str = "Malformed input received.";

/// Question substituted when the raw question carries template markers.
pub const INJECTION_PLACEHOLDER: &str = "Please replace this with a valid question.";

const TEMPLATE_MARKERS: [&str; 2] = ["{{", "}}"];

/// A payload that is safe to feed into the prompt template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizedRequest {
    /// Question text; empty when the payload had none.
    pub question: String,
    /// Base64-encoded image, still undecoded.
    pub image: Option<String>,
}

/// Decode a raw request body and sanitise it.
pub fn sanitize_body(body: &[u8]) -> Result<SanitizedRequest, TaError> {
    let payload: Value = serde_json::from_slice(body).map_err(|e| TaError::MalformedInput {
        reason: e.to_string(),
    })?;
    sanitize(payload)
}

/// Sanitise an already-decoded payload.
pub fn sanitize(payload: Value) -> Result<SanitizedRequest, TaError> {
    let payload = match payload {
        Value::String(inner) => match serde_json::from_str::<Value>(&inner) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Inner payload is not JSON ({}); substituting placeholder", e);
                return Ok(SanitizedRequest {
                    question: MALFORMED_INPUT_QUESTION.to_string(),
                    image: None,
                });
            }
        },
        other => other,
    };

    let fields = match payload {
        Value::Object(fields) => fields,
        other => {
            return Err(TaError::MalformedInput {
                reason: format!("expected a JSON object, got {}", type_name(&other)),
            })
        }
    };

    let mut question = question_field(&fields)?;
    let mut image = image_field(&fields)?;

    if contains_template_marker(&question) {
        debug!("Question contains template markers; replacing");
        question = INJECTION_PLACEHOLDER.to_string();
    }

    if image.as_deref().is_some_and(contains_template_marker) {
        debug!("Image field contains template markers; dropping");
        image = None;
    }

    Ok(SanitizedRequest { question, image })
}

/// True when `s` contains `{{` or `}}`.
pub fn contains_template_marker(s: &str) -> bool {
    TEMPLATE_MARKERS.iter().any(|m| s.contains(m))
}

fn question_field(fields: &Map<String, Value>) -> Result<String, TaError> {
    match fields.get("question") {
        None => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(TaError::MalformedInput {
            reason: format!("'question' must be a string, got {}", type_name(other)),
        }),
    }
}

fn image_field(fields: &Map<String, Value>) -> Result<Option<String>, TaError> {
    match fields.get("image") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(TaError::ImageDecode {
            reason: format!("'image' must be a base64 string, got {}", type_name(other)),
        }),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
