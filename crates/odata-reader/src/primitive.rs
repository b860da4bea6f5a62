//! Conversion of JSON literals to typed primitive values.

use std::sync::OnceLock;

use base64::Engine as _;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use odata_edm::EdmPrimitiveKind;
use regex::Regex;
use serde_json::Number;

use crate::error::{ODataReaderError, Result};
use crate::json::JsonValue;
use crate::om::ODataPrimitiveValue;

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

fn guid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"^[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}$",
    )
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^-?\d{4,}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])$")
}

fn time_of_day_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^([01]\d|2[0-3]):[0-5]\d(:[0-5]\d(\.\d{1,12})?)?$")
}

fn date_time_offset_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"^-?\d{4,}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])T([01]\d|2[0-3]):[0-5]\d(:[0-5]\d(\.\d{1,12})?)?(Z|[+-]([01]\d|2[0-3]):[0-5]\d)$",
    )
}

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"^-?P(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?$",
    )
}

fn decimal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$")
}

/// Infers a primitive from the JSON literal alone.
pub(crate) fn infer_primitive(json: &JsonValue) -> Result<ODataPrimitiveValue> {
    match json {
        JsonValue::Bool(b) => Ok(ODataPrimitiveValue::Boolean(*b)),
        JsonValue::String(s) => Ok(ODataPrimitiveValue::String(s.clone())),
        JsonValue::Number(n) => Ok(infer_number(n)),
        other => Err(ODataReaderError::protocol(format!(
            "expected a primitive value but found {}",
            other.kind_name()
        ))),
    }
}

fn infer_number(n: &Number) -> ODataPrimitiveValue {
    if let Some(v) = n.as_i64() {
        return match i32::try_from(v) {
            Ok(v) => ODataPrimitiveValue::Int32(v),
            Err(_) => ODataPrimitiveValue::Int64(v),
        };
    }
    ODataPrimitiveValue::Double(n.as_f64().unwrap_or(f64::NAN))
}

/// Converts a non-null JSON literal to `kind`.
///
/// `Edm.Int64` and `Edm.Decimal` accept a JSON string only when the payload
/// is `IEEE754Compatible`. Temporal literals are checked lexically and then
/// parsed, so impossible calendar values are mismatches.
pub(crate) fn convert_primitive(
    json: &JsonValue,
    kind: EdmPrimitiveKind,
    ieee754_compatible: bool,
) -> Result<ODataPrimitiveValue> {
    let mismatch = || ODataReaderError::mismatch(json.literal(), kind.full_name());
    match (kind, json) {
        (EdmPrimitiveKind::Boolean, JsonValue::Bool(b)) => Ok(ODataPrimitiveValue::Boolean(*b)),
        (EdmPrimitiveKind::Byte, JsonValue::Number(n)) => integral(n)
            .and_then(|v| u8::try_from(v).ok())
            .map(ODataPrimitiveValue::Byte)
            .ok_or_else(mismatch),
        (EdmPrimitiveKind::SByte, JsonValue::Number(n)) => integral(n)
            .and_then(|v| i8::try_from(v).ok())
            .map(ODataPrimitiveValue::SByte)
            .ok_or_else(mismatch),
        (EdmPrimitiveKind::Int16, JsonValue::Number(n)) => integral(n)
            .and_then(|v| i16::try_from(v).ok())
            .map(ODataPrimitiveValue::Int16)
            .ok_or_else(mismatch),
        (EdmPrimitiveKind::Int32, JsonValue::Number(n)) => integral(n)
            .and_then(|v| i32::try_from(v).ok())
            .map(ODataPrimitiveValue::Int32)
            .ok_or_else(mismatch),
        (EdmPrimitiveKind::Int64, JsonValue::Number(n)) => integral(n)
            .map(ODataPrimitiveValue::Int64)
            .ok_or_else(mismatch),
        (EdmPrimitiveKind::Int64, JsonValue::String(s)) if ieee754_compatible => s
            .parse::<i64>()
            .map(ODataPrimitiveValue::Int64)
            .map_err(|_| mismatch()),
        (EdmPrimitiveKind::Single, JsonValue::Number(n)) => n
            .as_f64()
            .map(|v| ODataPrimitiveValue::Single(v as f32))
            .ok_or_else(mismatch),
        (EdmPrimitiveKind::Double, JsonValue::Number(n)) => n
            .as_f64()
            .map(ODataPrimitiveValue::Double)
            .ok_or_else(mismatch),
        (EdmPrimitiveKind::Single, JsonValue::String(s)) => special_float(s)
            .map(|v| ODataPrimitiveValue::Single(v as f32))
            .ok_or_else(mismatch),
        (EdmPrimitiveKind::Double, JsonValue::String(s)) => special_float(s)
            .map(ODataPrimitiveValue::Double)
            .ok_or_else(mismatch),
        // The number keeps its source text, so no digits are lost here.
        (EdmPrimitiveKind::Decimal, JsonValue::Number(n)) => {
            Ok(ODataPrimitiveValue::Decimal(n.to_string()))
        }
        (EdmPrimitiveKind::Decimal, JsonValue::String(s))
            if ieee754_compatible && decimal_re().is_match(s) =>
        {
            Ok(ODataPrimitiveValue::Decimal(s.clone()))
        }
        (EdmPrimitiveKind::String, JsonValue::String(s)) => Ok(ODataPrimitiveValue::String(s.clone())),
        (EdmPrimitiveKind::Binary, JsonValue::String(s)) => decode_binary(s)
            .map(ODataPrimitiveValue::Binary)
            .ok_or_else(mismatch),
        (EdmPrimitiveKind::Guid, JsonValue::String(s)) if guid_re().is_match(s) => {
            Ok(ODataPrimitiveValue::Guid(s.clone()))
        }
        (EdmPrimitiveKind::Date, JsonValue::String(s)) => parse_date(s)
            .map(|_| ODataPrimitiveValue::Date(s.clone()))
            .ok_or_else(mismatch),
        (EdmPrimitiveKind::DateTimeOffset, JsonValue::String(s)) => parse_date_time_offset(s)
            .map(|_| ODataPrimitiveValue::DateTimeOffset(s.clone()))
            .ok_or_else(mismatch),
        (EdmPrimitiveKind::TimeOfDay, JsonValue::String(s)) => parse_time_of_day(s)
            .map(|_| ODataPrimitiveValue::TimeOfDay(s.clone()))
            .ok_or_else(mismatch),
        (EdmPrimitiveKind::Duration, JsonValue::String(s))
            if duration_re().is_match(s) && s.len() > 1 && !s.ends_with('T') =>
        {
            Ok(ODataPrimitiveValue::Duration(s.clone()))
        }
        (EdmPrimitiveKind::Stream, _) => Err(ODataReaderError::protocol(
            "stream values cannot be read as property literals",
        )),
        _ => Err(mismatch()),
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if !date_re().is_match(s) {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    if !time_of_day_re().is_match(s) {
        return None;
    }
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

/// Seconds are optional in OData and `Z` stands for `+00:00`; both are
/// spelled out before handing the literal to chrono.
fn parse_date_time_offset(s: &str) -> Option<DateTime<FixedOffset>> {
    if !date_time_offset_re().is_match(s) {
        return None;
    }
    let (date, rest) = s.split_once('T')?;
    let (time, offset) = rest.split_at(rest.find(['Z', '+', '-'])?);
    let seconds = if time.len() == 5 { ":00" } else { "" };
    let offset = if offset == "Z" { "+00:00" } else { offset };
    DateTime::parse_from_str(
        &format!("{date}T{time}{seconds}{offset}"),
        "%Y-%m-%dT%H:%M:%S%.f%:z",
    )
    .ok()
}

/// Parses a raw (`text/plain`) value body.
pub(crate) fn parse_raw_value(text: &str, kind: Option<EdmPrimitiveKind>) -> Result<ODataPrimitiveValue> {
    let Some(kind) = kind else {
        return Ok(ODataPrimitiveValue::String(text.to_string()));
    };
    let json = match kind {
        EdmPrimitiveKind::Boolean => match text {
            "true" => JsonValue::Bool(true),
            "false" => JsonValue::Bool(false),
            _ => return Err(ODataReaderError::mismatch(text, kind.full_name())),
        },
        k if k.is_integral() || k.is_floating() || k == EdmPrimitiveKind::Decimal => {
            match text.parse::<Number>() {
                Ok(n) => JsonValue::Number(n),
                Err(_) => JsonValue::String(text.to_string()),
            }
        }
        _ => JsonValue::String(text.to_string()),
    };
    // Raw bodies are not JSON: string-encoded numbers are the normal form.
    convert_primitive(&json, kind, true)
}

fn integral(n: &Number) -> Option<i64> {
    n.as_i64()
}

fn special_float(s: &str) -> Option<f64> {
    match s {
        "NaN" => Some(f64::NAN),
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

fn decode_binary(s: &str) -> Option<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(s))
        .ok()
}
