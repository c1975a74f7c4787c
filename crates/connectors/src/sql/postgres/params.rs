use crate::sql::{base::error::DbError, postgres::numeric::PgNumeric};
use bigdecimal::{BigDecimal, ToPrimitive};
use bytes::BytesMut;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use model::core::value::Value;
use planner::query::dialect::{Dialect, Postgres};
use std::{error::Error, str::FromStr};
use tokio_postgres::types::{IsNull, Json as PgJson, ToSql, Type, to_sql_checked};
use uuid::Uuid;

/// A parameter converted to the Rust type the prepared statement expects.
pub struct PgParam(Box<dyn ToSql + Sync + Send>);

macro_rules! param {
    ($v:expr) => {
        PgParam(Box::new($v))
    };
}

/// SQL NULL for a parameter of any type.
#[derive(Debug)]
struct AnyNull;

impl ToSql for AnyNull {
    fn to_sql(
        &self,
        _ty: &Type,
        _out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl PgParam {
    /// Converts `value` for a parameter of type `ty`.
    pub fn for_type(value: &Value, ty: &Type) -> Result<Self, DbError> {
        if value.is_null() {
            return Ok(param!(AnyNull));
        }

        let mismatch = || DbError::Encode {
            expected: ty.name().to_string(),
            found: value.kind().to_string(),
            detail: value.to_string(),
        };

        let param = match *ty {
            Type::BOOL => param!(as_bool(value).ok_or_else(mismatch)?),
            Type::INT2 => param!(
                as_i64(value)
                    .and_then(|v| i16::try_from(v).ok())
                    .ok_or_else(mismatch)?
            ),
            Type::INT4 => param!(
                as_i64(value)
                    .and_then(|v| i32::try_from(v).ok())
                    .ok_or_else(mismatch)?
            ),
            Type::INT8 => param!(as_i64(value).ok_or_else(mismatch)?),
            Type::FLOAT4 => param!(as_f64(value).ok_or_else(mismatch)? as f32),
            Type::FLOAT8 => param!(as_f64(value).ok_or_else(mismatch)?),
            Type::NUMERIC => param!(as_numeric(value).ok_or_else(mismatch)?),
            Type::UUID => param!(as_uuid(value).ok_or_else(mismatch)?),
            Type::JSON | Type::JSONB => param!(PgJson(as_json(value))),
            Type::DATE => param!(as_date(value).ok_or_else(mismatch)?),
            Type::TIME => param!(as_time(value).ok_or_else(mismatch)?),
            Type::TIMESTAMP => param!(as_naive_timestamp(value).ok_or_else(mismatch)?),
            Type::TIMESTAMPTZ => match value {
                Value::Timestamp(ts) => param!(*ts),
                _ => return Err(mismatch()),
            },
            Type::BYTEA => match value {
                Value::Bytes(b) => param!(b.clone()),
                Value::String(s) => param!(s.clone().into_bytes()),
                _ => return Err(mismatch()),
            },
            _ if <String as ToSql>::accepts(ty) => {
                param!(value.to_text().ok_or_else(mismatch)?)
            }
            _ => return Err(mismatch()),
        };
        Ok(param)
    }
}

/// Whether `value` cannot be bound natively to a `ty` parameter and has to be
/// sent as text for the server to cast. Naive timestamps headed for
/// `timestamptz` go this way so the session time zone applies.
pub fn needs_text_cast(value: &Value, ty: &Type) -> bool {
    if value.is_null() {
        return false;
    }
    match *ty {
        Type::BOOL
        | Type::INT2
        | Type::INT4
        | Type::INT8
        | Type::FLOAT4
        | Type::FLOAT8
        | Type::NUMERIC
        | Type::UUID
        | Type::JSON
        | Type::JSONB
        | Type::DATE
        | Type::TIME
        | Type::TIMESTAMP
        | Type::BYTEA => false,
        Type::TIMESTAMPTZ => !matches!(value, Value::Timestamp(_)),
        _ => !<String as ToSql>::accepts(ty),
    }
}

/// Per-slot cast targets for the values that must travel as text, `None`
/// when every value binds natively.
pub fn text_casts(values: &[Value], types: &[Type]) -> Option<Vec<Option<String>>> {
    let casts: Vec<Option<String>> = values
        .iter()
        .zip(types)
        .map(|(value, ty)| needs_text_cast(value, ty).then(|| cast_target(ty)))
        .collect();
    casts.iter().any(Option::is_some).then_some(casts)
}

/// Type name usable after `::`. User types are schema-qualified.
fn cast_target(ty: &Type) -> String {
    if ty.schema() == "pg_catalog" {
        ty.name().to_string()
    } else {
        format!(
            "{}.{}",
            Postgres.quote_identifier(ty.schema()),
            Postgres.quote_identifier(ty.name())
        )
    }
}

/// Rewrites `$n` to `$n::text::<type>` for every slot with a cast target.
/// Placeholders inside quoted identifiers and literals are left alone.
pub fn cast_placeholders(sql: &str, casts: &[Option<String>]) -> String {
    let mut out = String::with_capacity(sql.len() + 16 * casts.len());
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        out.push(c);
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '$' => {
                let mut digits = String::new();
                while let Some(d) = chars.next_if(char::is_ascii_digit) {
                    digits.push(d);
                }
                out.push_str(&digits);
                let target = digits
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|slot| casts.get(slot))
                    .and_then(Option::as_ref);
                if let Some(target) = target {
                    out.push_str("::text::");
                    out.push_str(target);
                }
            }
            None => {}
        }
    }
    out
}

impl AsRef<dyn ToSql + Sync> for PgParam {
    fn as_ref(&self) -> &(dyn ToSql + Sync + 'static) {
        &*self.0
    }
}

pub struct PgParamStore {
    pub params: Vec<PgParam>,
}

impl PgParamStore {
    /// Pairs each value with the parameter type the server inferred for the
    /// prepared statement.
    pub fn for_types(values: &[Value], types: &[Type]) -> Result<Self, DbError> {
        if values.len() != types.len() {
            return Err(DbError::Write(format!(
                "statement expects {} parameters, got {}",
                types.len(),
                values.len()
            )));
        }
        let params = values
            .iter()
            .zip(types)
            .map(|(value, ty)| PgParam::for_type(value, ty))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { params })
    }

    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|param| param.as_ref())
            .collect::<Vec<_>>()
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean(b) => Some(*b),
        Value::Int(0) => Some(false),
        Value::Int(1) => Some(true),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" => Some(true),
            "false" | "f" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int(v) => Some(*v),
        Value::Boolean(b) => Some(i64::from(*b)),
        Value::Float(f) if f.fract() == 0.0 => f.to_i64(),
        Value::Decimal(d) if d.is_integer() => d.to_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float(f) => Some(*f),
        Value::Int(v) => Some(*v as f64),
        Value::Decimal(d) => d.to_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_numeric(value: &Value) -> Option<PgNumeric> {
    match value {
        Value::Decimal(d) => Some(PgNumeric::Finite(d.clone())),
        Value::Int(v) => Some(PgNumeric::Finite(BigDecimal::from(*v))),
        Value::Float(f) if f.is_nan() => Some(PgNumeric::NaN),
        Value::Float(f) if f.is_infinite() && *f > 0.0 => Some(PgNumeric::Infinity),
        Value::Float(f) if f.is_infinite() => Some(PgNumeric::NegativeInfinity),
        Value::Float(f) => BigDecimal::from_str(&f.to_string())
            .ok()
            .map(PgNumeric::Finite),
        Value::String(s) => PgNumeric::parse_special(s).or_else(|| {
            BigDecimal::from_str(s.trim())
                .ok()
                .map(PgNumeric::Finite)
        }),
        _ => None,
    }
}

fn as_uuid(value: &Value) -> Option<Uuid> {
    match value {
        Value::Uuid(u) => Some(*u),
        Value::String(s) => Uuid::parse_str(s.trim()).ok(),
        _ => None,
    }
}

fn as_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Json(j) => j.clone(),
        Value::String(s) => {
            serde_json::from_str(s).unwrap_or_else(|_| serde_json::Value::String(s.clone()))
        }
        other => serde_json::to_value(other.to_text()).unwrap_or(serde_json::Value::Null),
    }
}

fn as_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        Value::TimestampNaive(ts) => Some(ts.date()),
        Value::Timestamp(ts) => Some(ts.date_naive()),
        Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
        _ => None,
    }
}

fn as_time(value: &Value) -> Option<NaiveTime> {
    match value {
        Value::Time(t) => Some(*t),
        Value::TimestampNaive(ts) => Some(ts.time()),
        Value::Timestamp(ts) => Some(ts.time()),
        Value::String(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f").ok(),
        _ => None,
    }
}

fn as_naive_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::TimestampNaive(ts) => Some(*ts),
        Value::Timestamp(ts) => Some(ts.naive_utc()),
        Value::Date(d) => d.and_hms_opt(0, 0, 0),
        Value::String(s) => NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f").ok(),
        _ => None,
    }
}
