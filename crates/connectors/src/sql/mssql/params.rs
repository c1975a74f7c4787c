use model::core::value::Value;
use tiberius::Query;

/// Binds `values` to the `@P1..@Pn` placeholders of `query`, in order.
pub fn bind_values(query: &mut Query<'_>, values: &[Value]) {
    for value in values {
        match value {
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            // The server converts nvarchar to the target decimal precision.
            Value::Decimal(d) => query.bind(d.to_string()),
            Value::String(s) => query.bind(s.clone()),
            Value::Boolean(b) => query.bind(*b),
            Value::Json(j) => query.bind(j.to_string()),
            Value::Uuid(u) => query.bind(*u),
            Value::Bytes(b) => query.bind(b.clone()),
            Value::Date(d) => query.bind(*d),
            Value::Time(t) => query.bind(*t),
            Value::TimestampNaive(ts) => query.bind(*ts),
            Value::Timestamp(ts) => query.bind(*ts),
            Value::Null => query.bind(Option::<String>::None),
        }
    }
}
