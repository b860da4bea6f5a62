//! Order- and duplicate-preserving JSON document.
//!
//! `serde_json::Value` collapses repeated object keys, which would hide
//! duplicate properties from the reader. This DOM keeps object members as an
//! ordered list of pairs instead.
//!
//! Numbers keep their source text (`serde_json`'s `arbitrary_precision`), so
//! `Edm.Decimal` literals survive without a round trip through `f64`.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::Number;

use crate::error::{ODataReaderError, Result};

/// Key under which `arbitrary_precision` hands a number's text to `visit_map`.
const NUMBER_TOKEN: &str = "$serde_json::private::Number";

#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<JsonValue>),
    Object(Vec<(String, JsonValue)>),
}

impl JsonValue {
    /// Parses a complete JSON text.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut deserializer = serde_json::Deserializer::from_slice(bytes);
        let value = JsonValue::deserialize(&mut deserializer)?;
        deserializer.end()?;
        Ok(value)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&[(String, JsonValue)]> {
        match self {
            Self::Object(members) => Some(members),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[JsonValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// First member named `key`.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.as_object()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Short literal used in error messages.
    pub fn literal(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
            Self::Array(_) => "[...]".to_string(),
            Self::Object(_) => "{...}".to_string(),
        }
    }

    pub(crate) fn into_string(self, what: &str) -> Result<String> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(ODataReaderError::protocol(format!(
                "expected a string for '{what}' but found {}",
                other.kind_name()
            ))),
        }
    }

    pub(crate) fn expect_str(&self, what: &str) -> Result<&str> {
        self.as_str().ok_or_else(|| {
            ODataReaderError::protocol(format!(
                "expected a string for '{what}' but found {}",
                self.kind_name()
            ))
        })
    }

    /// Reads an integer such as `@odata.count`. String-encoded integers are
    /// accepted only under `IEEE754Compatible=true`.
    pub(crate) fn expect_i64(&self, what: &str, ieee754_compatible: bool) -> Result<i64> {
        match self {
            Self::Number(n) => n.as_i64().ok_or_else(|| ODataReaderError::mismatch(n, "Edm.Int64")),
            Self::String(s) if ieee754_compatible => {
                s.parse().map_err(|_| ODataReaderError::mismatch(s, "Edm.Int64"))
            }
            other => Err(ODataReaderError::protocol(format!(
                "expected an integer for '{what}' but found {}",
                other.kind_name()
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for JsonValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(JsonValueVisitor)
    }
}

struct JsonValueVisitor;

impl<'de> Visitor<'de> for JsonValueVisitor {
    type Value = JsonValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<JsonValue, E> {
        Ok(JsonValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<JsonValue, E> {
        Ok(JsonValue::Number(v.into()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<JsonValue, E> {
        Ok(JsonValue::Number(v.into()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<JsonValue, E> {
        Number::from_f64(v)
            .map(JsonValue::Number)
            .ok_or_else(|| E::custom("non-finite number"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<JsonValue, E> {
        Ok(JsonValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<JsonValue, E> {
        Ok(JsonValue::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<JsonValue, E> {
        Ok(JsonValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<JsonValue, E> {
        Ok(JsonValue::Null)
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<JsonValue, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(JsonValue::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<JsonValue, A::Error>
    where
        A: MapAccess<'de>,
    {
        let Some(first) = map.next_key::<String>()? else {
            return Ok(JsonValue::Object(Vec::new()));
        };
        if first == NUMBER_TOKEN {
            let text: String = map.next_value()?;
            return text
                .parse::<Number>()
                .map(JsonValue::Number)
                .map_err(de::Error::custom);
        }
        let mut members = Vec::with_capacity(map.size_hint().unwrap_or(0) + 1);
        members.push((first, map.next_value()?));
        while let Some((key, value)) = map.next_entry::<String, JsonValue>()? {
            members.push((key, value));
        }
        Ok(JsonValue::Object(members))
    }
}
