//! Structural equality for JSON policy documents
//!
//! Providers hand documents back URL-encoded and re-serialized, so a textual
//! comparison with the desired document is useless. Both sides are brought
//! to [`serde_json::Value`] and compared recursively: objects by key set
//! regardless of order, arrays element by element, numbers by value.

use serde::Serialize;
use serde_json::{Number, Value};
use thiserror::Error;

/// Errors decoding a stored document
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Percent-decoding produced invalid UTF-8
    #[error("document is not valid URL-encoded UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    /// The decoded text is not JSON
    #[error("document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Decode a document as stored by the provider (URL-encoded JSON text)
pub fn decode_document(raw: &str) -> Result<Value, DocumentError> {
    let decoded = urlencoding::decode(raw)?;
    Ok(serde_json::from_str(&decoded)?)
}

/// Serialize a typed document into the value model used for comparison
pub fn to_document<T: Serialize>(document: &T) -> Result<Value, DocumentError> {
    Ok(serde_json::to_value(document)?)
}

/// Compare two documents structurally
pub fn documents_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .all(|(key, value)| right.get(key).is_some_and(|other| documents_equal(value, other)))
        }
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .zip(right)
                    .all(|(value, other)| documents_equal(value, other))
        }
        (Value::Number(left), Value::Number(right)) => numbers_equal(left, right),
        (Value::String(left), Value::String(right)) => left == right,
        (Value::Bool(left), Value::Bool(right)) => left == right,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

/// Check a desired document against the provider's stored text
///
/// A missing or undecodable stored document never matches, which makes the
/// caller rewrite it.
pub fn matches_stored(desired: &Value, stored: Option<&str>) -> bool {
    let Some(raw) = stored else {
        return false;
    };
    match decode_document(raw) {
        Ok(actual) => documents_equal(desired, &actual),
        Err(e) => {
            log::debug!("Stored document could not be decoded, treating as changed: {e}");
            false
        }
    }
}

#[allow(clippy::float_cmp)]
fn numbers_equal(left: &Number, right: &Number) -> bool {
    if let (Some(l), Some(r)) = (left.as_i64(), right.as_i64()) {
        return l == r;
    }
    if let (Some(l), Some(r)) = (left.as_u64(), right.as_u64()) {
        return l == r;
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => false,
    }
}
