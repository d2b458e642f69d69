//! Kanji series records
//!
//! One record per character, keyed by Unicode scalar value. The radical
//! reference (`rad`) and the component string (`comp`) are resolved
//! against the radicals table at query time.

use serde::{Deserialize, Serialize};

use crate::core::series::DataSeries;
use crate::error::DownloadError;
use crate::records::{single_char, SeriesRecord};
use crate::storage::schema::cf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KanjiReadings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kun: Option<Vec<String>>,
    /// Readings used in names (nanori).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub na: Option<Vec<String>>,
    /// Pinyin readings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub py: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KanjiRadicalRef {
    /// Classic radical number.
    pub x: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nelson: Option<u16>,
    /// Radical-variant ids (`"130-2"` etc.) that apply to this character.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KanjiMisc {
    /// Stroke count.
    pub sc: u8,
    /// School grade.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gr: Option<u8>,
    /// Frequency rank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freq: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jlpt: Option<u8>,
    /// Kanji Kentei level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kk: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KanjiEntryLine {
    /// The character itself.
    pub c: String,
    #[serde(default)]
    pub r: KanjiReadings,
    pub m: Vec<String>,
    #[serde(default)]
    pub m_lang: Option<String>,
    pub rad: KanjiRadicalRef,
    #[serde(default)]
    pub refs: serde_json::Map<String, serde_json::Value>,
    pub misc: KanjiMisc,
    /// Component characters making up the character.
    #[serde(default)]
    pub comp: Option<String>,
    /// Variant-of information.
    #[serde(default)]
    pub var: Option<Vec<String>>,
    /// Related characters.
    #[serde(default)]
    pub cf: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KanjiDeletionLine {
    pub c: String,
    #[allow(dead_code)]
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KanjiRecord {
    /// Unicode scalar value of the character.
    pub c: u32,
    #[serde(default)]
    pub r: KanjiReadings,
    pub m: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m_lang: Option<String>,
    pub rad: KanjiRadicalRef,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub refs: serde_json::Map<String, serde_json::Value>,
    pub misc: KanjiMisc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cf: Option<String>,
}

impl KanjiRecord {
    pub fn character(&self) -> Option<char> {
        char::from_u32(self.c)
    }
}

/// Marker implementing the series capability for kanji.
pub struct KanjiSeries;

impl SeriesRecord for KanjiSeries {
    const SERIES: DataSeries = DataSeries::Kanji;

    type EntryLine = KanjiEntryLine;
    type DeletionLine = KanjiDeletionLine;
    type Key = u32;
    type Record = KanjiRecord;

    fn from_entry(line: KanjiEntryLine) -> Result<KanjiRecord, DownloadError> {
        let c = single_char("c", &line.c)? as u32;
        Ok(KanjiRecord {
            c,
            r: line.r,
            m: line.m,
            m_lang: line.m_lang,
            rad: line.rad,
            refs: line.refs,
            misc: line.misc,
            comp: line.comp,
            var: line.var,
            cf: line.cf,
        })
    }

    fn deletion_key(line: KanjiDeletionLine) -> Result<u32, DownloadError> {
        Ok(single_char("c", &line.c)? as u32)
    }

    fn record_key(record: &KanjiRecord) -> u32 {
        record.c
    }

    fn index_values(record: &KanjiRecord) -> Vec<(&'static str, Vec<String>)> {
        vec![
            (cf::KANJI_R_ON, record.r.on.clone().unwrap_or_default()),
            (cf::KANJI_R_KUN, record.r.kun.clone().unwrap_or_default()),
            (cf::KANJI_R_NA, record.r.na.clone().unwrap_or_default()),
        ]
    }
}
