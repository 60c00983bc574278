//! Canonicalization of binary wire fields to lowercase hex.
//!
//! Chain-data providers hand binary values over in one of three shapes: an
//! already-hex string, an array of byte values, or an object wrapping that
//! array under `data` (the JSON form of a Node `Buffer`). All of them collapse
//! to the same hex string here.

use serde_json::Value;
use thiserror::Error;

/// Field name under which wrapped byte arrays are carried.
pub const WRAPPED_BYTES_FIELD: &str = "data";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unsupported binary encoding: {shape}")]
pub struct UnsupportedEncoding {
    pub shape: &'static str,
}

impl UnsupportedEncoding {
    fn new(shape: &'static str) -> Self {
        Self { shape }
    }
}

/// Converts a binary wire value to lowercase hex. Strings pass through
/// unchanged and `null` yields an empty string.
pub fn to_hex(value: &Value) -> Result<String, UnsupportedEncoding> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(hex) => Ok(hex.clone()),
        Value::Array(items) => bytes_to_hex(items),
        Value::Object(map) => match map.get(WRAPPED_BYTES_FIELD) {
            Some(Value::Array(items)) => bytes_to_hex(items),
            Some(_) => Err(UnsupportedEncoding::new("wrapped value is not a byte array")),
            None => Err(UnsupportedEncoding::new("object without byte array")),
        },
        Value::Bool(_) => Err(UnsupportedEncoding::new("boolean")),
        Value::Number(_) => Err(UnsupportedEncoding::new("bare number")),
    }
}

fn bytes_to_hex(items: &[Value]) -> Result<String, UnsupportedEncoding> {
    let bytes = items
        .iter()
        .map(masked_byte)
        .collect::<Result<Vec<u8>, _>>()?;
    Ok(hex::encode(bytes))
}

// Each element keeps its low 8 bits.
fn masked_byte(item: &Value) -> Result<u8, UnsupportedEncoding> {
    let Value::Number(number) = item else {
        return Err(UnsupportedEncoding::new("non-numeric byte element"));
    };
    let wide = if let Some(v) = number.as_i64() {
        v
    } else if let Some(v) = number.as_u64() {
        v as i64
    } else {
        match number.as_f64() {
            Some(v) if v.is_finite() => v.trunc() as i64,
            _ => return Err(UnsupportedEncoding::new("non-finite byte element")),
        }
    };
    Ok((wide & 0xff) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hex_strings_pass_through() {
        assert_eq!(to_hex(&json!("00ffAB")).unwrap(), "00ffAB");
        assert_eq!(to_hex(&json!("")).unwrap(), "");
    }

    #[test]
    fn null_yields_empty_string() {
        assert_eq!(to_hex(&Value::Null).unwrap(), "");
    }

    #[test]
    fn byte_arrays_encode_in_order() {
        assert_eq!(to_hex(&json!([0, 1, 171, 255])).unwrap(), "0001abff");
        assert_eq!(to_hex(&json!([])).unwrap(), "");
    }

    #[test]
    fn byte_values_are_masked() {
        assert_eq!(to_hex(&json!([256, 257, -1])).unwrap(), "0001ff");
    }

    #[test]
    fn wrapped_arrays_are_unwrapped() {
        let buffer = json!({ "type": "Buffer", "data": [222, 173, 190, 239] });
        assert_eq!(to_hex(&buffer).unwrap(), "deadbeef");
    }

    #[test]
    fn arbitrary_bytes_round_trip() {
        let bytes: Vec<u8> = (0..=255).rev().collect();
        let encoded = to_hex(&json!(bytes)).unwrap();
        assert_eq!(hex::decode(&encoded).unwrap(), bytes);
        assert_eq!(to_hex(&json!(encoded.clone())).unwrap(), encoded);
    }

    #[test]
    fn other_shapes_are_rejected() {
        assert!(to_hex(&json!(true)).is_err());
        assert!(to_hex(&json!(12)).is_err());
        assert!(to_hex(&json!({ "bytes": [1] })).is_err());
        assert!(to_hex(&json!({ "data": "ab" })).is_err());
        assert!(to_hex(&json!(["a"])).is_err());
    }
}
