//! CSV rendering of a single [`BufferItem`].
//!
//! Columns, in order: the capture timestamp (optional, local time, strftime
//! format), the source, and the payload as lowercase hex pairs separated by
//! single spaces. With quoting on, every column is wrapped in double quotes and
//! embedded quotes are doubled; without it values are written verbatim.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};

use super::Structs::BufferItem;
use crate::error::WriterError;

#[derive(Clone, Debug)]
pub struct RecordFormat {
    pub delimiter: char,
    pub quote_strings: bool,
    pub include_timestamp: bool,
    pub timestamp_format: String,
}

impl Default for RecordFormat {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote_strings: true,
            include_timestamp: true,
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

impl RecordFormat {
    /// Reject timestamp formats chrono cannot render.
    pub fn validate(&self) -> Result<(), WriterError> {
        if StrftimeItems::new(&self.timestamp_format).any(|item| matches!(item, Item::Error)) {
            return Err(WriterError::InvalidTimestampFormat(
                self.timestamp_format.clone(),
            ));
        }
        Ok(())
    }

    /// Render `item` as one line, without the trailing newline.
    pub fn format(&self, item: &BufferItem) -> String {
        let mut line = String::with_capacity(item.source.len() + item.payload.len() * 3 + 32);
        let mut first = true;

        if self.include_timestamp {
            let local: DateTime<Local> = item.timestamp.into();
            let mut stamp = String::new();
            // Formats are validated up front; a failure here leaves the column empty.
            let _ = write!(stamp, "{}", local.format(&self.timestamp_format));
            self.push_column(&mut line, &mut first, &stamp);
        }

        self.push_column(&mut line, &mut first, &item.source);
        self.push_column(&mut line, &mut first, &hex_payload(&item.payload));
        line
    }

    fn push_column(&self, line: &mut String, first: &mut bool, value: &str) {
        if !*first {
            line.push(self.delimiter);
        }
        *first = false;

        if self.quote_strings {
            line.push('"');
            line.push_str(&escape(value));
            line.push('"');
        } else {
            line.push_str(value);
        }
    }
}

/// Double every embedded `"`.
pub fn escape(value: &str) -> String {
    value.replace('"', "\"\"")
}

/// `[0x41, 0x0a]` -> `"41 0a"`.
pub fn hex_payload(payload: &[u8]) -> String {
    let mut out = String::with_capacity(payload.len() * 3);
    for (i, byte) in payload.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02x}");
    }
    out
}
