//! Persisted form of a record set.
//!
//! Every key and value is base64url-encoded (padded) on its own, then the
//! encoded pairs are written as one JSON object. The alphabet contains no
//! character that needs escaping inside a JSON string, so arbitrary bytes,
//! including ones that are not UTF-8, survive.

use std::collections::HashMap;

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use serde_json::{Map, Value};
use thiserror::Error;

/// The complete key -> value mapping held by a store. Keys and values are raw bytes.
pub type Records = HashMap<Vec<u8>, Vec<u8>>;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("persisted data is not a JSON object of strings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid base64url in {field} {encoded:?}: {source}")]
    Base64 {
        field: &'static str,
        encoded: String,
        #[source]
        source: base64::DecodeError,
    },
}

/// Serialize a record set. Keys come out sorted so the file is stable
/// between writes of the same data.
pub fn encode(records: &Records) -> Vec<u8> {
    let object: Map<String, Value> = records
        .iter()
        .map(|(k, v)| (URL_SAFE.encode(k), Value::String(URL_SAFE.encode(v))))
        .collect();
    Value::Object(object).to_string().into_bytes()
}

pub fn decode(bytes: &[u8]) -> Result<Records, CodecError> {
    let encoded: HashMap<String, String> = serde_json::from_slice(bytes)?;
    let mut records = Records::with_capacity(encoded.len());
    for (k, v) in encoded {
        let key = decode_field("key", k)?;
        let value = decode_field("value", v)?;
        records.insert(key, value);
    }
    Ok(records)
}

fn decode_field(field: &'static str, encoded: String) -> Result<Vec<u8>, CodecError> {
    match URL_SAFE.decode(encoded.as_bytes()) {
        Ok(raw) => Ok(raw),
        Err(source) => Err(CodecError::Base64 { field, encoded, source }),
    }
}
