use model::{core::value::Value, execution::rejected_row::RejectedRow};
use std::{fmt::Write as _, path::Path};
use tracing::info;

/// Trailing column holding the reject reason.
pub const REASON_COLUMN: &str = "__reason";

/// Writes `rows` as CSV: the row's columns in order, then `__reason`. Nulls
/// are empty cells and binary values are `\x` hex. Nothing is written when
/// there is nothing to report.
pub fn write_rejects_csv(path: &Path, rows: &[RejectedRow]) -> Result<bool, csv::Error> {
    let Some(first) = rows.first() else {
        return Ok(false);
    };

    let mut writer = csv::Writer::from_path(path)?;
    let mut header: Vec<&str> = first.original_values().columns().collect();
    header.push(REASON_COLUMN);
    writer.write_record(&header)?;

    for row in rows {
        let mut record: Vec<String> = row
            .original_values()
            .field_values
            .iter()
            .map(|field| cell(&field.value))
            .collect();
        record.push(row.reason().to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = rows.len(), "Rejected rows written");
    Ok(true)
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bytes(bytes) => hex(bytes),
        other => other.to_text().unwrap_or_default(),
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::records::row::RowData;

    #[test]
    fn writes_values_and_reason() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rejected_rows_sales_orders.csv");
        let rows = vec![
            RejectedRow::conflict(RowData::from_pairs([
                ("id", Value::Int(7)),
                ("note", Value::from("a, b")),
            ])),
            RejectedRow::new(
                RowData::from_pairs([("id", Value::Int(8)), ("note", Value::Null)]),
                "Write error: value too long",
            ),
        ];

        assert!(write_rejects_csv(&path, &rows).unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "id,note,__reason\n7,\"a, b\",conflict\n8,,Write error: value too long\n"
        );
    }

    #[test]
    fn nothing_to_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rejects.csv");
        assert!(!write_rejects_csv(&path, &[]).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn binary_cells_are_hex() {
        assert_eq!(cell(&Value::Bytes(vec![0xde, 0xad])), "\\xdead");
        assert_eq!(cell(&Value::Bytes(vec![0xff, 0xfe])), "\\xfffe");
        assert_eq!(cell(&Value::Bytes(b"ok".to_vec())), "\\x6f6b");
        assert_eq!(cell(&Value::Bytes(Vec::new())), "\\x");
    }
}
