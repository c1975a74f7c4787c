use crate::sql::{base::error::DbError, postgres::numeric::PgNumeric};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use model::{
    core::value::{FieldValue, Value},
    records::row::RowData,
};
use tokio_postgres::{
    Row,
    types::{FromSql, Kind, Type},
};
use uuid::Uuid;

/// Decodes every column of a result row into engine values.
pub fn decode_row(row: &Row) -> Result<RowData, DbError> {
    let mut fields = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_cell(row, idx, column.type_()).map_err(|err| DbError::Decode {
            column: column.name().to_string(),
            detail: err.to_string(),
        })?;
        fields.push(FieldValue::new(column.name(), value));
    }
    Ok(RowData::new(fields))
}

fn get<'a, T>(row: &'a Row, idx: usize) -> Result<Option<T>, tokio_postgres::Error>
where
    T: FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx)
}

fn decode_cell(row: &Row, idx: usize, ty: &Type) -> Result<Value, tokio_postgres::Error> {
    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx)?.map(Value::Boolean),
        Type::INT2 => get::<i16>(row, idx)?.map(|v| Value::Int(v.into())),
        Type::INT4 => get::<i32>(row, idx)?.map(|v| Value::Int(v.into())),
        Type::INT8 => get::<i64>(row, idx)?.map(Value::Int),
        Type::OID => get::<u32>(row, idx)?.map(|v| Value::Int(v.into())),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|v| Value::Float(v.into())),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(Value::Float),
        Type::NUMERIC => get::<PgNumeric>(row, idx)?.map(numeric_value),
        Type::UUID => get::<Uuid>(row, idx)?.map(Value::Uuid),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx)?.map(Value::Json),
        Type::DATE => get::<NaiveDate>(row, idx)?.map(Value::Date),
        Type::TIME => get::<NaiveTime>(row, idx)?.map(Value::Time),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx)?.map(Value::TimestampNaive),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx)?.map(Value::Timestamp),
        Type::BYTEA => get::<Vec<u8>>(row, idx)?.map(Value::Bytes),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            get::<String>(row, idx)?.map(Value::String)
        }
        _ => decode_fallback(row, idx, ty)?,
    };
    Ok(value.unwrap_or(Value::Null))
}

/// `NaN` and the infinities have no decimal form and travel as their text.
fn numeric_value(numeric: PgNumeric) -> Value {
    match numeric {
        PgNumeric::Finite(d) => Value::Decimal(d),
        special => Value::String(special.special_text().unwrap_or_default().to_string()),
    }
}

/// Types without a native mapping (enums, intervals, arrays, citext, ...)
/// are read as text when the driver allows it, raw bytes otherwise.
fn decode_fallback(
    row: &Row,
    idx: usize,
    ty: &Type,
) -> Result<Option<Value>, tokio_postgres::Error> {
    if let Ok(v) = get::<String>(row, idx) {
        return Ok(v.map(Value::String));
    }
    // Enum labels travel as their text even in binary format.
    let enum_label = matches!(ty.kind(), Kind::Enum(_));
    Ok(get::<RawBytes>(row, idx)?.map(|raw| match String::from_utf8(raw.0) {
        Ok(text) if enum_label => Value::String(text),
        Ok(text) => Value::Bytes(text.into_bytes()),
        Err(err) => Value::Bytes(err.into_bytes()),
    }))
}

struct RawBytes(Vec<u8>);

impl<'a> FromSql<'a> for RawBytes {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(RawBytes(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}
