use chrono::{Datelike, NaiveDateTime, Timelike};
use model::core::value::Value;
use mysql_async::{Params, Value as MySqlValue};

pub struct MySqlParam(MySqlValue);

impl MySqlParam {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Int(i) => MySqlParam(MySqlValue::Int(*i)),
            Value::Float(f) => MySqlParam(MySqlValue::Double(*f)),
            Value::Decimal(d) => MySqlParam(MySqlValue::Bytes(d.to_string().into_bytes())),
            Value::String(s) => MySqlParam(MySqlValue::Bytes(s.clone().into_bytes())),
            Value::Boolean(b) => MySqlParam(MySqlValue::Int(i64::from(*b))),
            Value::Json(j) => MySqlParam(MySqlValue::Bytes(j.to_string().into_bytes())),
            Value::Uuid(u) => MySqlParam(MySqlValue::Bytes(
                u.hyphenated().to_string().into_bytes(),
            )),
            Value::Bytes(b) => MySqlParam(MySqlValue::Bytes(b.clone())),
            Value::Date(d) => MySqlParam(MySqlValue::Date(
                d.year() as u16,
                d.month() as u8,
                d.day() as u8,
                0,
                0,
                0,
                0,
            )),
            Value::Time(t) => MySqlParam(MySqlValue::Time(
                false,
                0,
                t.hour() as u8,
                t.minute() as u8,
                t.second() as u8,
                t.nanosecond() / 1_000,
            )),
            Value::TimestampNaive(ts) => MySqlParam(datetime(ts)),
            Value::Timestamp(ts) => MySqlParam(datetime(&ts.naive_utc())),
            Value::Null => MySqlParam(MySqlValue::NULL),
        }
    }
}

fn datetime(ts: &NaiveDateTime) -> MySqlValue {
    MySqlValue::Date(
        ts.year() as u16,
        ts.month() as u8,
        ts.day() as u8,
        ts.hour() as u8,
        ts.minute() as u8,
        ts.second() as u8,
        ts.nanosecond() / 1_000,
    )
}

pub struct MySqlParamStore {
    pub params: Vec<MySqlParam>,
}

impl MySqlParamStore {
    pub fn from_values(values: &[Value]) -> Self {
        let params = values.iter().map(MySqlParam::from_value).collect();
        MySqlParamStore { params }
    }

    pub fn params(&self) -> Params {
        if self.params.is_empty() {
            return Params::Empty;
        }
        let mysql_values: Vec<MySqlValue> = self.params.iter().map(|p| p.0.clone()).collect();
        Params::Positional(mysql_values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::{NaiveDate, NaiveTime};
    use std::str::FromStr;

    #[test]
    fn temporal_values_keep_microseconds() {
        let ts = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_micro_opt(13, 5, 9, 250)
            .unwrap();
        let MySqlParam(v) = MySqlParam::from_value(&Value::TimestampNaive(ts));
        assert_eq!(v, MySqlValue::Date(2024, 2, 29, 13, 5, 9, 250));

        let t = NaiveTime::from_hms_opt(23, 59, 1).unwrap();
        let MySqlParam(v) = MySqlParam::from_value(&Value::Time(t));
        assert_eq!(v, MySqlValue::Time(false, 0, 23, 59, 1, 0));
    }

    #[test]
    fn decimals_travel_as_text() {
        let d = BigDecimal::from_str("1234.50").unwrap();
        let MySqlParam(v) = MySqlParam::from_value(&Value::Decimal(d));
        assert_eq!(v, MySqlValue::Bytes(b"1234.50".to_vec()));
    }

    #[test]
    fn empty_store_binds_nothing() {
        assert!(matches!(
            MySqlParamStore::from_values(&[]).params(),
            Params::Empty
        ));
        let store = MySqlParamStore::from_values(&[Value::Null, Value::Boolean(true)]);
        let Params::Positional(values) = store.params() else {
            panic!("expected positional params");
        };
        assert_eq!(values, vec![MySqlValue::NULL, MySqlValue::Int(1)]);
    }
}
