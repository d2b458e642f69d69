//! Name series records
//!
//! Proper-name entries keyed by an integer id. Stored records carry a
//! derived `h` field: the kana readings normalized to hiragana, so a
//! katakana spelling and its hiragana equivalent resolve to the same
//! entries.

use serde::{Deserialize, Serialize};

use crate::core::series::DataSeries;
use crate::error::DownloadError;
use crate::kana::hiragana_index_keys;
use crate::records::SeriesRecord;
use crate::storage::schema::cf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameTranslation {
    /// Entry type tags (surname, given, place, ...).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<Vec<String>>,
    /// Translated details.
    pub det: Vec<String>,
    /// Cross-references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cf: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NameEntryLine {
    pub id: u32,
    /// Kanji spellings.
    #[serde(default)]
    pub k: Option<Vec<String>>,
    /// Kana readings.
    pub r: Vec<String>,
    pub tr: Vec<NameTranslation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NameDeletionLine {
    pub id: u32,
    #[allow(dead_code)]
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameRecord {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<Vec<String>>,
    pub r: Vec<String>,
    pub tr: Vec<NameTranslation>,
    /// Derived: readings normalized to hiragana (only those with a
    /// hiragana form), deduplicated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub h: Vec<String>,
}

/// Marker implementing the series capability for names.
pub struct NameSeries;

impl SeriesRecord for NameSeries {
    const SERIES: DataSeries = DataSeries::Names;

    type EntryLine = NameEntryLine;
    type DeletionLine = NameDeletionLine;
    type Key = u32;
    type Record = NameRecord;

    fn from_entry(line: NameEntryLine) -> Result<NameRecord, DownloadError> {
        if line.r.is_empty() {
            return Err(DownloadError::FileInvalidRecord {
                reason: format!("name record {} has no readings", line.id),
            });
        }
        let h = hiragana_index_keys(&line.r);
        Ok(NameRecord {
            id: line.id,
            k: line.k,
            r: line.r,
            tr: line.tr,
            h,
        })
    }

    fn deletion_key(line: NameDeletionLine) -> Result<u32, DownloadError> {
        Ok(line.id)
    }

    fn record_key(record: &NameRecord) -> u32 {
        record.id
    }

    fn index_values(record: &NameRecord) -> Vec<(&'static str, Vec<String>)> {
        vec![
            (cf::NAMES_K, record.k.clone().unwrap_or_default()),
            (cf::NAMES_R, record.r.clone()),
            (cf::NAMES_H, record.h.clone()),
        ]
    }
}
