use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use model::{
    core::value::{FieldValue, Value},
    records::row::RowData,
};
use mysql_async::{Column, Row, Value as MySqlValue, consts::ColumnType};
use std::str::FromStr;

/// `character_set` id MySQL reports for binary strings and blobs.
const BINARY_CHARSET: u16 = 63;

/// Decodes a row from either protocol. Text results arrive as bytes and are
/// parsed by column type; binary results are already typed.
pub fn decode_row(row: &Row) -> RowData {
    let columns = row.columns_ref();
    let fields = columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let value = row
                .as_ref(idx)
                .map(|raw| decode_cell(column, raw))
                .unwrap_or(Value::Null);
            FieldValue::new(column.name_str().to_string(), value)
        })
        .collect();
    RowData::new(fields)
}

fn decode_cell(column: &Column, raw: &MySqlValue) -> Value {
    match raw {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Int(i) => Value::Int(*i),
        MySqlValue::UInt(u) => unsigned(*u),
        MySqlValue::Float(f) => Value::Float(f64::from(*f)),
        MySqlValue::Double(f) => Value::Float(*f),
        MySqlValue::Date(y, m, d, h, mi, s, us) => {
            let Some(date) = NaiveDate::from_ymd_opt(i32::from(*y), u32::from(*m), u32::from(*d))
            else {
                return Value::Null;
            };
            if column.column_type() == ColumnType::MYSQL_TYPE_DATE {
                return Value::Date(date);
            }
            date.and_hms_micro_opt(u32::from(*h), u32::from(*mi), u32::from(*s), *us)
                .map(Value::TimestampNaive)
                .unwrap_or(Value::Null)
        }
        MySqlValue::Time(negative, days, h, mi, s, us) => {
            if !negative && *days == 0 {
                NaiveTime::from_hms_micro_opt(u32::from(*h), u32::from(*mi), u32::from(*s), *us)
                    .map(Value::Time)
                    .unwrap_or(Value::Null)
            } else {
                // Durations outside a day have no time-of-day equivalent.
                let sign = if *negative { "-" } else { "" };
                let hours = u64::from(*days) * 24 + u64::from(*h);
                Value::String(format!("{sign}{hours:02}:{mi:02}:{s:02}.{us:06}"))
            }
        }
        MySqlValue::Bytes(bytes) => decode_text(column, bytes),
    }
}

fn unsigned(u: u64) -> Value {
    i64::try_from(u)
        .map(Value::Int)
        .unwrap_or_else(|_| Value::Decimal(BigDecimal::from(u)))
}

fn decode_text(column: &Column, bytes: &[u8]) -> Value {
    let column_type = column.column_type();
    if column_type == ColumnType::MYSQL_TYPE_BIT {
        let n = bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        return unsigned(n);
    }

    let text = match std::str::from_utf8(bytes) {
        Ok(text) if column.character_set() != BINARY_CHARSET => text,
        _ => return Value::Bytes(bytes.to_vec()),
    };

    let parsed = match column_type {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => text
            .parse::<i64>()
            .ok()
            .map(Value::Int)
            .or_else(|| text.parse::<u64>().ok().map(unsigned)),
        ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => {
            text.parse::<f64>().ok().map(Value::Float)
        }
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            BigDecimal::from_str(text).ok().map(Value::Decimal)
        }
        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(Value::Date)
        }
        ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_DATETIME2
        | ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_TIMESTAMP2 => {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(Value::TimestampNaive)
        }
        ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => {
            NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
                .ok()
                .map(Value::Time)
        }
        ColumnType::MYSQL_TYPE_JSON => serde_json::from_str(text).ok().map(Value::Json),
        _ => None,
    };

    // Zero dates and out-of-range times stay as their text.
    parsed.unwrap_or_else(|| Value::String(text.to_string()))
}
