use crate::{
    file::csv::{error::FileError, settings::CsvSettings},
    sql::base::{
        error::DbError,
        source::{BatchReceiver, ChunkSender},
    },
};
use csv::{Reader, ReaderBuilder, StringRecord, Trim};
use model::{
    core::value::{FieldValue, Value},
    records::row::RowData,
    transform::mapping::ColumnMapping,
};
use std::{
    fs::File,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// A delimited text file with a header line, read as a row source. Every
/// cell is text; empty cells read as null.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    settings: CsvSettings,
    headers: Vec<String>,
}

impl CsvSource {
    pub fn open(path: impl Into<PathBuf>, settings: CsvSettings) -> Result<Self, FileError> {
        let path = path.into();
        if !path.is_file() {
            return Err(FileError::NotFound(path.display().to_string()));
        }
        if settings.delimiter_byte().is_none() {
            return Err(FileError::InvalidFormat(format!(
                "delimiter {:?} is not a single ASCII character",
                settings.delimiter
            )));
        }

        let mut reader = reader_for(&path, &settings)?;
        let headers = reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        if headers.is_empty() || headers.iter().all(String::is_empty) {
            return Err(FileError::InvalidFormat(format!(
                "{} has no header line",
                path.display()
            )));
        }

        debug!(path = %path.display(), columns = headers.len(), "Opened CSV source");
        Ok(Self {
            path,
            settings,
            headers,
        })
    }

    /// Column names from the header line, in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// First `limit` records.
    pub fn preview(&self, limit: usize) -> Result<Vec<RowData>, FileError> {
        let mut reader = reader_for(&self.path, &self.settings)?;
        let mut rows = Vec::with_capacity(limit);
        for (idx, record) in reader.records().take(limit).enumerate() {
            let record = record.map_err(|e| FileError::ReadError {
                record: idx as u64 + 1,
                detail: e.to_string(),
            })?;
            rows.push(to_row(&self.headers, &record));
        }
        Ok(rows)
    }

    /// Reads the file on a blocking thread and streams mapped rows in chunks
    /// of at most `chunk_size`.
    pub fn stream(&self, mapping: &ColumnMapping, chunk_size: usize) -> BatchReceiver {
        let (mut sender, rx) = ChunkSender::channel(chunk_size);
        let source = self.clone();
        let mapping = mapping.clone();

        tokio::task::spawn_blocking(move || {
            let outcome = source.read_into(&mapping, &mut sender);
            if let Err(err) = &outcome {
                warn!(%err, path = %source.path.display(), "CSV read failed");
            }
            sender.finish_blocking(outcome.map_err(DbError::from));
        });

        rx
    }

    fn read_into(&self, mapping: &ColumnMapping, sender: &mut ChunkSender) -> Result<(), FileError> {
        let mut reader = reader_for(&self.path, &self.settings)?;
        let mut record = StringRecord::new();
        let mut count: u64 = 0;

        loop {
            let more = reader.read_record(&mut record).map_err(|e| FileError::ReadError {
                record: count + 1,
                detail: e.to_string(),
            })?;
            if !more {
                break;
            }
            count += 1;
            let row = mapping.project(&to_row(&self.headers, &record));
            if !sender.push_blocking(row) {
                debug!(records = count, "Row receiver dropped, stopping CSV read");
                return Ok(());
            }
        }

        debug!(records = count, "Finished reading CSV source");
        Ok(())
    }
}

fn reader_for(path: &Path, settings: &CsvSettings) -> Result<Reader<File>, FileError> {
    let delimiter = settings.delimiter_byte().unwrap_or(b',');
    let reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .trim(if settings.trim { Trim::All } else { Trim::None })
        .from_path(path)?;
    Ok(reader)
}

fn to_row(headers: &[String], record: &StringRecord) -> RowData {
    let fields = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let value = match record.get(idx) {
                Some(cell) if !cell.is_empty() => Value::String(cell.to_string()),
                _ => Value::Null,
            };
            FieldValue::new(name.clone(), value)
        })
        .collect();
    RowData::new(fields)
}
