use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use model::core::{type_class::TypeClass, value::Value};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// A value that does not fit its column's type class. Never leaves the
/// normalizer: the value is either nulled or passed through.
#[derive(Debug, Error, PartialEq)]
#[error("cannot read {found} as {class:?}")]
pub(crate) struct CoercionError {
    pub class: TypeClass,
    pub found: &'static str,
}

const TRUE_WORDS: &[&str] = &["true", "t", "yes", "y", "on", "1"];
const FALSE_WORDS: &[&str] = &["false", "f", "no", "n", "off", "0"];

const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
];
const OFFSET_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// Converts a non-null `value` to the representation of `class`.
pub(crate) fn coerce(value: &Value, class: TypeClass) -> Result<Value, CoercionError> {
    let fail = || CoercionError {
        class,
        found: value.kind(),
    };

    // Byte strings that hold text are read as text by every class.
    if let Value::Bytes(bytes) = value
        && class != TypeClass::Opaque
    {
        let text = std::str::from_utf8(bytes).map_err(|_| fail())?;
        return coerce(&Value::String(text.to_string()), class);
    }

    // Empty text and non-finite floats never carry a typed value.
    if class != TypeClass::Text && class != TypeClass::Opaque {
        match value {
            Value::String(s) if s.trim().is_empty() => {
                return if class == TypeClass::Json {
                    Ok(Value::Null)
                } else {
                    Err(fail())
                };
            }
            Value::Float(f) if !f.is_finite() => return Err(fail()),
            _ => {}
        }
    }

    let coerced = match class {
        TypeClass::Opaque => Some(value.clone()),
        TypeClass::Text => value.to_text().map(Value::String),
        TypeClass::Boolean => to_bool(value).map(Value::Boolean),
        TypeClass::Integer => to_i64(value).map(Value::Int),
        TypeClass::Numeric => to_decimal(value).map(Value::Decimal),
        TypeClass::Timestamp => to_timestamp(value),
        TypeClass::Date => to_date(value).map(Value::Date),
        TypeClass::Time => to_time(value).map(Value::Time),
        TypeClass::Uuid => to_uuid(value).map(Value::Uuid),
        TypeClass::Json => to_json(value).map(Value::Json),
    };
    coerced.ok_or_else(fail)
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean(b) => Some(*b),
        Value::Int(0) => Some(false),
        Value::Int(1) => Some(true),
        Value::Float(f) if *f == 0.0 => Some(false),
        Value::Float(f) if *f == 1.0 => Some(true),
        Value::Decimal(d) => match d.to_i64() {
            Some(0) if d.is_integer() => Some(false),
            Some(1) if d.is_integer() => Some(true),
            _ => None,
        },
        Value::String(s) => {
            let word = s.trim().to_ascii_lowercase();
            if TRUE_WORDS.contains(&word.as_str()) {
                Some(true)
            } else if FALSE_WORDS.contains(&word.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        Value::Json(serde_json::Value::Bool(b)) => Some(*b),
        _ => None,
    }
}

fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Boolean(b) => Some(i64::from(*b)),
        Value::Float(f) if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 => {
            Some(*f as i64)
        }
        Value::Decimal(d) if d.is_integer() => d.to_i64(),
        Value::String(s) => {
            let s = s.trim();
            let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            s.parse::<i64>().ok()
        }
        Value::Json(serde_json::Value::Number(n)) => n.as_i64(),
        _ => None,
    }
}

fn to_decimal(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Decimal(d) => Some(d.clone()),
        Value::Int(i) => Some(BigDecimal::from(*i)),
        Value::Float(f) => BigDecimal::from_str(&f.to_string()).ok(),
        Value::String(s) => parse_decimal(&s.trim().replace(',', "")),
        Value::Json(serde_json::Value::Number(n)) => parse_decimal(&n.to_string()),
        _ => None,
    }
}

/// Plain decimal notation only: `NaN`, `inf` and friends are refused.
fn parse_decimal(text: &str) -> Option<BigDecimal> {
    if text.is_empty() || !text.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    if text.bytes().any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') {
        return None;
    }
    BigDecimal::from_str(text).ok()
}

fn to_timestamp(value: &Value) -> Option<Value> {
    match value {
        Value::Timestamp(_) | Value::TimestampNaive(_) => Some(value.clone()),
        Value::Date(d) => Some(Value::TimestampNaive(d.and_time(NaiveTime::MIN))),
        Value::String(s) => parse_timestamp(s.trim()),
        _ => None,
    }
}

/// Offset-aware text becomes a UTC timestamp, anything else stays naive. A
/// bare date means midnight.
fn parse_timestamp(text: &str) -> Option<Value> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(Value::Timestamp(ts.with_timezone(&Utc)));
    }
    for format in OFFSET_TIMESTAMP_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(text, format) {
            return Some(Value::Timestamp(ts.with_timezone(&Utc)));
        }
    }
    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Value::TimestampNaive(ts));
        }
    }
    parse_date(text).map(|d| Value::TimestampNaive(d.and_time(NaiveTime::MIN)))
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}

fn to_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        Value::TimestampNaive(ts) => Some(ts.date()),
        Value::Timestamp(ts) => Some(ts.date_naive()),
        Value::String(s) => {
            let s = s.trim();
            parse_date(s).or_else(|| match parse_timestamp(s)? {
                Value::TimestampNaive(ts) => Some(ts.date()),
                Value::Timestamp(ts) => Some(ts.date_naive()),
                _ => None,
            })
        }
        _ => None,
    }
}

fn to_time(value: &Value) -> Option<NaiveTime> {
    match value {
        Value::Time(t) => Some(*t),
        Value::TimestampNaive(ts) => Some(ts.time()),
        Value::Timestamp(ts) => Some(ts.time()),
        Value::String(s) => {
            let s = s.trim();
            TIME_FORMATS
                .iter()
                .find_map(|format| NaiveTime::parse_from_str(s, format).ok())
                .or_else(|| match parse_timestamp(s)? {
                    Value::TimestampNaive(ts) => Some(ts.time()),
                    Value::Timestamp(ts) => Some(ts.time()),
                    _ => None,
                })
        }
        _ => None,
    }
}

fn to_uuid(value: &Value) -> Option<Uuid> {
    match value {
        Value::Uuid(u) => Some(*u),
        Value::String(s) => Uuid::parse_str(s.trim()).ok(),
        _ => None,
    }
}

fn to_json(value: &Value) -> Option<serde_json::Value> {
    match value {
        Value::Json(j) => Some(j.clone()),
        Value::String(s) => serde_json::from_str(s.trim()).ok(),
        Value::Int(i) => Some(serde_json::Value::from(*i)),
        Value::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number),
        Value::Boolean(b) => Some(serde_json::Value::Bool(*b)),
        Value::Decimal(d) => serde_json::from_str(&d.to_string()).ok(),
        other => other.to_text().map(serde_json::Value::String),
    }
}
