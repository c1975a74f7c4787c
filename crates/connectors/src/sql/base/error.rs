use crate::file::csv::error::FileError;
use std::time::Duration;
use thiserror::Error;

/// Postgres SQLSTATE for unique_violation.
const PG_UNIQUE_VIOLATION: &str = "23505";
/// ER_DUP_ENTRY, ER_DUP_UNIQUE, ER_DUP_ENTRY_WITH_KEY_NAME
const MYSQL_DUPLICATE_CODES: &[u16] = &[1062, 1169, 1586];
/// Unique index (2601) and unique/primary key constraint (2627) violations.
const MSSQL_DUPLICATE_CODES: &[u32] = &[2601, 2627];

/// All errors coming from the database/query layer.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("MySQL error: {0}")]
    MySql(#[from] mysql_async::Error),

    #[error("SQL Server error: {0}")]
    MsSql(#[from] tiberius::error::Error),

    /// Low-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading a file source failed.
    #[error("File error: {0}")]
    File(#[from] FileError),

    /// A unique or primary key constraint rejected the write.
    #[error("Unique violation: {0}")]
    UniqueViolation(String),

    /// A value could not be bound as a statement parameter.
    #[error("Encode error: column type {expected} cannot take a {found} value ({detail})")]
    Encode {
        expected: String,
        found: String,
        detail: String,
    },

    /// A result cell could not be decoded.
    #[error("Decode error: column '{column}': {detail}")]
    Decode { column: String, detail: String },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Writing rows to the database failed at the application level.
    #[error("Write error: {0}")]
    Write(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DbError {
    /// True for unique / primary key violations on any backend.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::UniqueViolation(_) => true,
            DbError::Postgres(err) => err
                .code()
                .is_some_and(|code| code.code() == PG_UNIQUE_VIOLATION),
            DbError::MySql(mysql_async::Error::Server(err)) => {
                MYSQL_DUPLICATE_CODES.contains(&err.code)
            }
            DbError::MsSql(tiberius::error::Error::Server(err)) => {
                MSSQL_DUPLICATE_CODES.contains(&err.code())
            }
            _ => false,
        }
    }

    /// Human-readable reason, used when a row is rejected.
    pub fn reason(&self) -> String {
        match self {
            DbError::Postgres(err) => match err.as_db_error() {
                Some(db) => format!(
                    "Postgres error {}: {}",
                    db.code().code(),
                    db.message()
                ),
                None => self.to_string(),
            },
            _ => self.to_string(),
        }
    }
}

/// Errors happening during adapter or connection setup.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Invalid connection string: {0}")]
    InvalidUrl(String),

    #[error("Postgres connection failed: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("MySQL connection failed: {0}")]
    MySql(#[from] mysql_async::Error),

    #[error("SQL Server connection failed: {0}")]
    MsSql(#[from] tiberius::error::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    /// Failures worth retrying: the server may simply not be reachable yet.
    pub fn is_transient(&self) -> bool {
        match self {
            ConnectorError::Io(_) => true,
            ConnectorError::Postgres(err) => err.as_db_error().is_none(),
            ConnectorError::MySql(err) => matches!(err, mysql_async::Error::Io(_)),
            ConnectorError::MsSql(err) => matches!(err, tiberius::error::Error::Io { .. }),
            ConnectorError::InvalidUrl(_) | ConnectorError::Tls(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_unique_violation_is_a_conflict() {
        assert!(DbError::UniqueViolation("users_pkey".into()).is_unique_violation());
        assert!(!DbError::Write("permission denied".into()).is_unique_violation());
        assert!(
            !DbError::Encode {
                expected: "int4".into(),
                found: "string".into(),
                detail: "abc".into()
            }
            .is_unique_violation()
        );
    }

    #[test]
    fn reason_carries_the_message() {
        let err = DbError::Write("permission denied for table users".into());
        assert_eq!(err.reason(), "Write error: permission denied for table users");
    }
}
