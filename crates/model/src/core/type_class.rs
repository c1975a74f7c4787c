use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic class of a destination column, derived from its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeClass {
    Boolean,
    Integer,
    Numeric,
    Timestamp,
    Date,
    Time,
    Uuid,
    Json,
    Text,
    Opaque,
}

// Types whose names contain a keyword of another class but must pass through.
const OPAQUE_OVERRIDES: &[&str] = &["interval", "point", "polygon", "geometry", "geography"];

const INTEGER_KEYWORDS: &[&str] = &["int", "serial"];
const NUMERIC_KEYWORDS: &[&str] = &["numeric", "decimal", "float", "double", "real", "money", "number"];
const TEXT_KEYWORDS: &[&str] = &["char", "text", "string", "clob", "citext", "enum"];

impl TypeClass {
    /// Classifies a declared column type (`varchar(255)`, `timestamp with time zone`,
    /// `tinyint(1) unsigned`, ...) by keyword. Order matters: temporal names are
    /// checked before `int` and `char` so that `datetime2` or `time with time zone`
    /// land in the right class.
    pub fn classify(declared: &str) -> TypeClass {
        let t = declared.trim().to_ascii_lowercase();

        if t.is_empty() || OPAQUE_OVERRIDES.iter().any(|k| t.contains(k)) {
            return TypeClass::Opaque;
        }
        if t.contains("bool") || t == "bit" || t == "bit(1)" {
            return TypeClass::Boolean;
        }
        if t.contains("timestamp") || t.starts_with("datetime") || t.starts_with("smalldatetime") {
            return TypeClass::Timestamp;
        }
        if t.starts_with("date") {
            return TypeClass::Date;
        }
        if t.starts_with("time") {
            return TypeClass::Time;
        }
        if t.contains("uuid") || t == "uniqueidentifier" {
            return TypeClass::Uuid;
        }
        if t.contains("json") {
            return TypeClass::Json;
        }
        if INTEGER_KEYWORDS.iter().any(|k| t.contains(k)) {
            return TypeClass::Integer;
        }
        if NUMERIC_KEYWORDS.iter().any(|k| t.contains(k)) {
            return TypeClass::Numeric;
        }
        if TEXT_KEYWORDS.iter().any(|k| t.contains(k)) {
            return TypeClass::Text;
        }

        TypeClass::Opaque
    }
}

impl fmt::Display for TypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeClass::Boolean => "boolean",
            TypeClass::Integer => "integer",
            TypeClass::Numeric => "numeric",
            TypeClass::Timestamp => "timestamp",
            TypeClass::Date => "date",
            TypeClass::Time => "time",
            TypeClass::Uuid => "uuid",
            TypeClass::Json => "json",
            TypeClass::Text => "text",
            TypeClass::Opaque => "opaque",
        };
        f.write_str(name)
    }
}
