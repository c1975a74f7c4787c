use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, hash::Hash};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Decimal(BigDecimal),
    String(String),
    Boolean(bool),
    Json(serde_json::Value),
    Uuid(Uuid),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    TimestampNaive(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    Null,
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        use Value::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Int(v) => v.hash(state),
            Float(v) => v.to_bits().hash(state),
            Decimal(v) => v.normalized().to_string().hash(state),
            String(v) => v.hash(state),
            Boolean(v) => v.hash(state),
            Json(v) => v.to_string().hash(state),
            Uuid(v) => v.hash(state),
            Bytes(v) => v.hash(state),
            Date(v) => v.hash(state),
            Time(v) => v.hash(state),
            TimestampNaive(v) => v.hash(state),
            Timestamp(v) => v.hash(state),
            Null => {}
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in log fields and reject reasons.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Json(_) => "json",
            Value::Uuid(_) => "uuid",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::TimestampNaive(_) => "timestamp",
            Value::Timestamp(_) => "timestamptz",
            Value::Null => "null",
        }
    }

    /// Plain textual rendering without SQL quoting. `None` for null and for
    /// byte strings that are not valid UTF-8.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::Decimal(v) => Some(v.to_string()),
            Value::String(v) => Some(v.clone()),
            Value::Boolean(v) => Some(v.to_string()),
            Value::Json(serde_json::Value::String(s)) => Some(s.clone()),
            Value::Json(v) => Some(v.to_string()),
            Value::Uuid(v) => Some(v.hyphenated().to_string()),
            Value::Bytes(v) => std::str::from_utf8(v).ok().map(str::to_string),
            Value::Date(v) => Some(v.format("%Y-%m-%d").to_string()),
            Value::Time(v) => Some(v.format("%H:%M:%S%.f").to_string()),
            Value::TimestampNaive(v) => Some(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Value::Timestamp(v) => Some(v.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Null => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Boolean(v) => Some(i64::from(*v)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => write!(f, "{text}"),
            None if self.is_null() => write!(f, "NULL"),
            None => write!(f, "<{} bytes>", self.byte_len()),
        }
    }
}

impl Value {
    fn byte_len(&self) -> usize {
        match self {
            Value::Bytes(v) => v.len(),
            _ => 0,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldValue {
    pub name: String,
    pub value: Value,
}

impl FieldValue {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn text_rendering_is_unquoted() {
        assert_eq!(Value::from("it's").to_text().as_deref(), Some("it's"));
        assert_eq!(Value::Boolean(true).to_text().as_deref(), Some("true"));
        assert_eq!(Value::Null.to_text(), None);
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    #[test]
    fn uuid_text_is_lower_case() {
        let id = Uuid::from_str("A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11").unwrap();
        assert_eq!(
            Value::Uuid(id).to_text().as_deref(),
            Some("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11")
        );
    }

    #[test]
    fn json_string_renders_without_quotes() {
        let v = Value::Json(serde_json::json!("plain"));
        assert_eq!(v.to_text().as_deref(), Some("plain"));
        let v = Value::Json(serde_json::json!({"a": 1}));
        assert_eq!(v.to_text().as_deref(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn invalid_utf8_bytes_have_no_text() {
        assert_eq!(Value::Bytes(vec![0xff, 0xfe]).to_text(), None);
        assert_eq!(Value::Bytes(vec![0xff, 0xfe]).to_string(), "<2 bytes>");
    }
}
