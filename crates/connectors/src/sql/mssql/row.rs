use crate::sql::base::error::DbError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use model::{
    core::value::{FieldValue, Value},
    records::row::RowData,
};
use std::str::FromStr;
use tiberius::{ColumnData, FromSql, Row};

pub fn decode_row(row: &Row) -> Result<RowData, DbError> {
    let mut fields = Vec::with_capacity(row.len());
    for (column, data) in row.cells() {
        let value = decode_cell(data).map_err(|err| DbError::Decode {
            column: column.name().to_string(),
            detail: err.to_string(),
        })?;
        fields.push(FieldValue::new(column.name(), value));
    }
    Ok(RowData::new(fields))
}

fn decode_cell(data: &ColumnData<'static>) -> Result<Value, tiberius::error::Error> {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| Value::Int(v.into())),
        ColumnData::I16(v) => v.map(|v| Value::Int(v.into())),
        ColumnData::I32(v) => v.map(|v| Value::Int(v.into())),
        ColumnData::I64(v) => v.map(Value::Int),
        ColumnData::F32(v) => v.map(|v| Value::Float(v.into())),
        ColumnData::F64(v) => v.map(Value::Float),
        ColumnData::Bit(v) => v.map(Value::Boolean),
        ColumnData::String(v) => v.as_ref().map(|s| Value::String(s.to_string())),
        ColumnData::Guid(v) => v.map(Value::Uuid),
        ColumnData::Binary(v) => v.as_ref().map(|b| Value::Bytes(b.to_vec())),
        ColumnData::Numeric(v) => v.map(|n| {
            let text = n.to_string();
            BigDecimal::from_str(&text)
                .map(Value::Decimal)
                .unwrap_or(Value::String(text))
        }),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| Value::String(x.clone().into_owned().into_string())),
        ColumnData::Date(_) => NaiveDate::from_sql(data)?.map(Value::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(data)?.map(Value::Time),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)?.map(Value::TimestampNaive)
        }
        ColumnData::DateTimeOffset(_) => {
            DateTime::<FixedOffset>::from_sql(data)?.map(|ts| Value::Timestamp(ts.to_utc()))
        }
        #[allow(unreachable_patterns)]
        _ => <&str as FromSql>::from_sql(data)?.map(|s| Value::String(s.to_string())),
    };
    Ok(value.unwrap_or(Value::Null))
}
