use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvSettings {
    /// Single-byte field delimiter.
    pub delimiter: char,
    /// Trim surrounding whitespace from headers and fields.
    pub trim: bool,
}

impl Default for CsvSettings {
    fn default() -> Self {
        Self {
            delimiter: ',',
            trim: true,
        }
    }
}

impl CsvSettings {
    pub fn delimiter_byte(&self) -> Option<u8> {
        u8::try_from(self.delimiter).ok().filter(u8::is_ascii)
    }
}
