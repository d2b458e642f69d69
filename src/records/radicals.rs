//! Radical series records
//!
//! Keyed by a stable string id: `"057"` for a base radical, `"130-2"` for
//! a positional variant. Every variant shares its radical number with the
//! base record whose id is the number alone.

use serde::{Deserialize, Serialize};

use crate::core::series::DataSeries;
use crate::error::DownloadError;
use crate::records::SeriesRecord;
use crate::storage::schema::cf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadicalEntryLine {
    pub id: String,
    /// Radical number.
    pub r: u16,
    /// Stroke count.
    pub s: u8,
    /// Radical-block glyph (e.g. ⼸).
    #[serde(default)]
    pub b: Option<String>,
    /// Equivalent kanji glyph (e.g. 弓).
    #[serde(default)]
    pub k: Option<String>,
    /// Private-use-area code point for glyphs with no Unicode form.
    #[serde(default)]
    pub pua: Option<u32>,
    pub na: Vec<String>,
    /// Position tag for variants (hen, tsukuri, kanmuri, ...).
    #[serde(default)]
    pub posn: Option<String>,
    pub m: Vec<String>,
    #[serde(default)]
    pub m_lang: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RadicalDeletionLine {
    pub id: String,
    #[allow(dead_code)]
    pub deleted: bool,
}

/// Stored form; identical to the wire shape.
pub type RadicalRecord = RadicalEntryLine;

impl RadicalEntryLine {
    /// Is this a positional/typographical variant of a base radical?
    pub fn is_variant(&self) -> bool {
        self.id.contains('-')
    }

    /// Id of the base radical this record belongs to (its own id for base
    /// records).
    pub fn base_id(&self) -> &str {
        match self.id.split_once('-') {
            Some((base, _)) => base,
            None => &self.id,
        }
    }
}

/// Base-radical id for a radical number: zero-padded to three digits.
pub fn base_radical_id(number: u16) -> String {
    format!("{:03}", number)
}

/// Radical number embedded in a radical id, if well-formed.
pub fn radical_id_number(id: &str) -> Option<u16> {
    let base = match id.split_once('-') {
        Some((base, _)) => base,
        None => id,
    };
    base.parse().ok()
}

/// Marker implementing the series capability for radicals.
pub struct RadicalSeries;

impl SeriesRecord for RadicalSeries {
    const SERIES: DataSeries = DataSeries::Radicals;

    type EntryLine = RadicalEntryLine;
    type DeletionLine = RadicalDeletionLine;
    type Key = String;
    type Record = RadicalRecord;

    fn from_entry(line: RadicalEntryLine) -> Result<RadicalRecord, DownloadError> {
        if radical_id_number(&line.id) != Some(line.r) {
            return Err(DownloadError::FileInvalidRecord {
                reason: format!(
                    "radical id {:?} does not match radical number {}",
                    line.id, line.r
                ),
            });
        }
        // Component expansion promises non-empty names and meanings for
        // every radical it emits.
        if line.na.is_empty() || line.m.is_empty() {
            return Err(DownloadError::FileInvalidRecord {
                reason: format!("radical {} has no readings or meanings", line.id),
            });
        }
        Ok(line)
    }

    fn deletion_key(line: RadicalDeletionLine) -> Result<String, DownloadError> {
        Ok(line.id)
    }

    fn record_key(record: &RadicalRecord) -> String {
        record.id.clone()
    }

    fn index_values(record: &RadicalRecord) -> Vec<(&'static str, Vec<String>)> {
        vec![
            (cf::RADICALS_R, vec![base_radical_id(record.r)]),
            (cf::RADICALS_B, record.b.clone().into_iter().collect()),
            (cf::RADICALS_K, record.k.clone().into_iter().collect()),
        ]
    }
}
