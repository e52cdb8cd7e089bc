//! The wire codec: the typed JSON-compatible format server-action shims
//! and the RPC dispatcher use to exchange argument and return values
//! with richer types than plain JSON allows.
//!
//! Plain JSON cannot distinguish `undefined` from `null`, cannot carry
//! `NaN`, and has no representation for `Date`, `RegExp`, `Map`, `Set`,
//! big integers or typed byte arrays. We represent all of these as a
//! [`Wire`] tree and serialize special cases as a tagged object
//! `{"$wire": "<kind>", "value": ...}`; everything else serializes as
//! itself so ordinary payloads stay readable on the wire.

use anyhow::{anyhow, bail, Result};
use base64::Engine;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const TAG_KEY: &str = "$wire";
const VALUE_KEY: &str = "value";

/// A value in the wire format's type universe.
#[derive(Clone, Debug, PartialEq)]
pub enum Wire {
    Null,
    Undefined,
    Bool(bool),
    /// Distinguished from `Null`/`Undefined`; `NaN` is representable.
    Number(f64),
    String(String),
    Date(String),
    RegExp { source: String, flags: String },
    Map(Vec<(Wire, Wire)>),
    Set(Vec<Wire>),
    BigInt(String),
    Bytes(Vec<u8>),
    Array(Vec<Wire>),
    Object(BTreeMap<String, Wire>),
}

/// Encode a [`Wire`] tree into a `serde_json::Value` suitable for sending
/// as an HTTP body.
pub fn encode(value: &Wire) -> Value {
    match value {
        Wire::Null => Value::Null,
        Wire::Undefined => tagged("undefined", Value::Null),
        Wire::Bool(b) => Value::Bool(*b),
        Wire::Number(n) => {
            if n.is_nan() {
                tagged("nan", Value::Null)
            } else if let Some(number) = serde_json::Number::from_f64(*n) {
                Value::Number(number)
            } else {
                // Infinities: serde_json can't represent them either.
                tagged("number", Value::String(n.to_string()))
            }
        }
        Wire::String(s) => Value::String(s.clone()),
        Wire::Date(iso) => tagged("date", Value::String(iso.clone())),
        Wire::RegExp { source, flags } => tagged(
            "regexp",
            Value::Array(vec![Value::String(source.clone()), Value::String(flags.clone())]),
        ),
        Wire::Map(entries) => {
            let array = entries
                .iter()
                .map(|(k, v)| Value::Array(vec![encode(k), encode(v)]))
                .collect();
            tagged("map", Value::Array(array))
        }
        Wire::Set(items) => tagged("set", Value::Array(items.iter().map(encode).collect())),
        Wire::BigInt(digits) => tagged("bigint", Value::String(digits.clone())),
        Wire::Bytes(bytes) => tagged(
            "bytes",
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
        ),
        Wire::Array(items) => Value::Array(items.iter().map(encode).collect()),
        Wire::Object(fields) => {
            let mut map = Map::new();
            for (k, v) in fields {
                map.insert(k.clone(), encode(v));
            }
            Value::Object(map)
        }
    }
}

fn tagged(kind: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(TAG_KEY.to_string(), Value::String(kind.to_string()));
    map.insert(VALUE_KEY.to_string(), value);
    Value::Object(map)
}

/// Decode a `serde_json::Value` produced by [`encode`] back into a
/// [`Wire`] tree.
pub fn decode(value: &Value) -> Result<Wire> {
    match value {
        Value::Null => Ok(Wire::Null),
        Value::Bool(b) => Ok(Wire::Bool(*b)),
        Value::Number(n) => Ok(Wire::Number(n.as_f64().ok_or_else(|| anyhow!("non-finite wire number"))?)),
        Value::String(s) => Ok(Wire::String(s.clone())),
        Value::Array(items) => items.iter().map(decode).collect::<Result<_>>().map(Wire::Array),
        Value::Object(map) => {
            if let Some(Value::String(kind)) = map.get(TAG_KEY) {
                let inner = map.get(VALUE_KEY).ok_or_else(|| anyhow!("wire tag missing value"))?;
                return decode_tagged(kind, inner);
            }
            let mut fields = BTreeMap::new();
            for (k, v) in map {
                fields.insert(k.clone(), decode(v)?);
            }
            Ok(Wire::Object(fields))
        }
    }
}

fn decode_tagged(kind: &str, inner: &Value) -> Result<Wire> {
    match kind {
        "undefined" => Ok(Wire::Undefined),
        "nan" => Ok(Wire::Number(f64::NAN)),
        "number" => {
            let Value::String(s) = inner else {
                bail!("malformed wire number tag")
            };
            Ok(Wire::Number(s.parse().map_err(|_| anyhow!("bad wire number literal"))?))
        }
        "date" => {
            let Value::String(s) = inner else {
                bail!("malformed wire date tag")
            };
            Ok(Wire::Date(s.clone()))
        }
        "regexp" => {
            let Value::Array(pair) = inner else {
                bail!("malformed wire regexp tag")
            };
            let [Value::String(source), Value::String(flags)] = &pair[..] else {
                bail!("malformed wire regexp tag")
            };
            Ok(Wire::RegExp {
                source: source.clone(),
                flags: flags.clone(),
            })
        }
        "map" => {
            let Value::Array(entries) = inner else {
                bail!("malformed wire map tag")
            };
            let mut out = Vec::with_capacity(entries.len());
            for entry in entries {
                let Value::Array(pair) = entry else {
                    bail!("malformed wire map entry")
                };
                let [k, v] = &pair[..] else {
                    bail!("malformed wire map entry")
                };
                out.push((decode(k)?, decode(v)?));
            }
            Ok(Wire::Map(out))
        }
        "set" => {
            let Value::Array(items) = inner else {
                bail!("malformed wire set tag")
            };
            items.iter().map(decode).collect::<Result<_>>().map(Wire::Set)
        }
        "bigint" => {
            let Value::String(s) = inner else {
                bail!("malformed wire bigint tag")
            };
            Ok(Wire::BigInt(s.clone()))
        }
        "bytes" => {
            let Value::String(s) = inner else {
                bail!("malformed wire bytes tag")
            };
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(s)
                .map_err(|_| anyhow!("bad wire bytes base64"))?;
            Ok(Wire::Bytes(bytes))
        }
        other => bail!("unknown wire tag: {other}"),
    }
}

/// Round-trip a [`Wire`] value through its JSON encoding, as the RPC
/// dispatcher does for request/response bodies.
pub fn round_trip(value: &Wire) -> Result<Wire> {
    decode(&encode(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_undefined_vs_null_vs_nan() {
        assert_eq!(round_trip(&Wire::Null).unwrap(), Wire::Null);
        assert_eq!(round_trip(&Wire::Undefined).unwrap(), Wire::Undefined);
        let nan = round_trip(&Wire::Number(f64::NAN)).unwrap();
        match nan {
            Wire::Number(n) => assert!(n.is_nan()),
            other => panic!("expected number, got {other:?}"),
        }
    }

    #[test]
    fn preserves_date_regexp_map_set_bigint_bytes() {
        assert_eq!(
            round_trip(&Wire::Date("2024-01-01T00:00:00.000Z".into())).unwrap(),
            Wire::Date("2024-01-01T00:00:00.000Z".into())
        );
        assert_eq!(
            round_trip(&Wire::RegExp {
                source: "a+".into(),
                flags: "gi".into()
            })
            .unwrap(),
            Wire::RegExp {
                source: "a+".into(),
                flags: "gi".into()
            }
        );
        let map = Wire::Map(vec![(Wire::String("k".into()), Wire::Number(1.0))]);
        assert_eq!(round_trip(&map).unwrap(), map);
        let set = Wire::Set(vec![Wire::Number(1.0), Wire::Number(2.0)]);
        assert_eq!(round_trip(&set).unwrap(), set);
        assert_eq!(
            round_trip(&Wire::BigInt("123456789012345678901234567890".into())).unwrap(),
            Wire::BigInt("123456789012345678901234567890".into())
        );
        assert_eq!(
            round_trip(&Wire::Bytes(vec![0, 1, 2, 255])).unwrap(),
            Wire::Bytes(vec![0, 1, 2, 255])
        );
    }

    #[test]
    fn plain_objects_and_arrays_round_trip_without_tags() {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), Wire::String("ana".into()));
        fields.insert(
            "tags".to_string(),
            Wire::Array(vec![Wire::String("a".into()), Wire::String("b".into())]),
        );
        let object = Wire::Object(fields);
        let encoded = encode(&object);
        assert!(encoded.get(TAG_KEY).is_none());
        assert_eq!(decode(&encoded).unwrap(), object);
    }
}
