//! Line-oriented text layout: `[SECTION]` headers followed by `key=value`
//! records.

use std::fmt::Write as _;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    mark::SectionValue,
    types::{Section, StockKey},
};

use super::store::RecordStore;

/// Malformed persisted data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {reason}")]
pub struct FormatError {
    /// 1-based line number.
    pub line: usize,
    /// What was wrong with it.
    pub reason: String,
}

impl FormatError {
    fn at(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

enum Cursor {
    Start,
    In(Section),
    Unknown,
}

pub fn parse(text: &str) -> Result<RecordStore, FormatError> {
    let mut store = RecordStore::new();
    let mut cursor = Cursor::Start;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            cursor = match Section::from_name(name) {
                Some(section) => {
                    debug!(section = %section, line = line_no, "section header");
                    Cursor::In(section)
                }
                None => {
                    warn!(name, line = line_no, "skipping unknown section");
                    Cursor::Unknown
                }
            };
            continue;
        }

        let section = match cursor {
            Cursor::In(section) => section,
            Cursor::Unknown => continue,
            Cursor::Start => return Err(FormatError::at(line_no, "record before any section header")),
        };

        let (raw_key, raw_value) = line
            .split_once('=')
            .ok_or_else(|| FormatError::at(line_no, "expected key=value"))?;
        let key = StockKey::parse(raw_key).map_err(|err| FormatError::at(line_no, err.to_string()))?;
        let raw_value = raw_value.trim();

        if section == Section::Mark && !is_mark_digit(raw_value) && !raw_value.is_empty() {
            return Err(FormatError::at(
                line_no,
                format!("MARK value {raw_value:?} is not a digit 1-9"),
            ));
        }

        let value = SectionValue::for_section(section, raw_value);
        if value.is_empty() {
            debug!(section = %section, key = %key, line = line_no, "dropping empty value");
            continue;
        }

        let table = store.table_mut(section);
        match (table.get(&key).cloned(), value) {
            (Some(SectionValue::Tokens(mut existing)), SectionValue::Tokens(incoming)) => {
                existing.extend(incoming.tokens().iter().map(String::as_str));
                table.upsert(key, SectionValue::Tokens(existing));
            }
            (_, value) => {
                table.upsert(key, value);
            }
        }
    }

    Ok(store)
}

pub fn render(store: &RecordStore) -> String {
    let mut out = String::new();
    for section in Section::ALL {
        let table = store.table(section);
        if table.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = writeln!(out, "[{}]", section.name());
        for (key, value) in table.iter() {
            let _ = writeln!(out, "{key}={}", value.render());
        }
    }
    out
}

pub(crate) fn is_mark_digit(value: &str) -> bool {
    matches!(value.as_bytes(), [b'1'..=b'9'])
}
