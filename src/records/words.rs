//! Word series records (optional, schema v2)
//!
//! Word entries follow the same pipeline mechanics as names but carry
//! richer derived indexes: hiragana-normalized readings (`h`), the unique
//! kanji characters of their spellings (`kc`), and lowercased gloss tokens
//! (`gt`). Gloss scoring and priority ordering stay behind a pluggable
//! ranker; the store only promises exact index scans.

use serde::{Deserialize, Serialize};

use crate::core::series::DataSeries;
use crate::error::DownloadError;
use crate::kana::{hiragana_index_keys, is_kanji};
use crate::records::SeriesRecord;
use crate::storage::schema::cf;

/// Cap on derived gloss tokens per record.
const MAX_GLOSS_TOKENS: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordSense {
    /// Glosses.
    pub g: Vec<String>,
    /// Gloss language when not the database language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Part-of-speech tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<Vec<String>>,
    /// Field/domain tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<Vec<String>>,
    /// Usage tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misc: Option<Vec<String>>,
    /// Extra sense information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inf: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WordEntryLine {
    pub id: u32,
    #[serde(default)]
    pub k: Option<Vec<String>>,
    pub r: Vec<String>,
    pub s: Vec<WordSense>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WordDeletionLine {
    pub id: u32,
    #[allow(dead_code)]
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordRecord {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<Vec<String>>,
    pub r: Vec<String>,
    pub s: Vec<WordSense>,
    /// Derived: hiragana-normalized readings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub h: Vec<String>,
    /// Derived: unique kanji characters across the spellings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kc: Vec<String>,
    /// Derived: lowercased gloss tokens.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gt: Vec<String>,
}

/// Unique kanji characters across the given spellings, first-seen order.
pub fn kanji_characters(spellings: &[String]) -> Vec<String> {
    let mut chars: Vec<String> = Vec::new();
    for spelling in spellings {
        for c in spelling.chars().filter(|c| is_kanji(*c)) {
            let s = c.to_string();
            if !chars.contains(&s) {
                chars.push(s);
            }
        }
    }
    chars
}

/// Lowercased gloss tokens, split on non-alphanumeric boundaries,
/// deduplicated, capped at [`MAX_GLOSS_TOKENS`].
pub fn gloss_tokens(senses: &[WordSense]) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for sense in senses {
        for gloss in &sense.g {
            for token in gloss
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
            {
                let token = token.to_lowercase();
                if !tokens.contains(&token) {
                    tokens.push(token);
                    if tokens.len() >= MAX_GLOSS_TOKENS {
                        return tokens;
                    }
                }
            }
        }
    }
    tokens
}

/// Marker implementing the series capability for words.
pub struct WordSeries;

impl SeriesRecord for WordSeries {
    const SERIES: DataSeries = DataSeries::Words;

    type EntryLine = WordEntryLine;
    type DeletionLine = WordDeletionLine;
    type Key = u32;
    type Record = WordRecord;

    fn from_entry(line: WordEntryLine) -> Result<WordRecord, DownloadError> {
        if line.r.is_empty() {
            return Err(DownloadError::FileInvalidRecord {
                reason: format!("word record {} has no readings", line.id),
            });
        }
        let h = hiragana_index_keys(&line.r);
        let kc = kanji_characters(line.k.as_deref().unwrap_or_default());
        let gt = gloss_tokens(&line.s);
        Ok(WordRecord {
            id: line.id,
            k: line.k,
            r: line.r,
            s: line.s,
            h,
            kc,
            gt,
        })
    }

    fn deletion_key(line: WordDeletionLine) -> Result<u32, DownloadError> {
        Ok(line.id)
    }

    fn record_key(record: &WordRecord) -> u32 {
        record.id
    }

    fn index_values(record: &WordRecord) -> Vec<(&'static str, Vec<String>)> {
        vec![
            (cf::WORDS_K, record.k.clone().unwrap_or_default()),
            (cf::WORDS_R, record.r.clone()),
            (cf::WORDS_H, record.h.clone()),
            (cf::WORDS_KC, record.kc.clone()),
            (cf::WORDS_GT, record.gt.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> WordEntryLine {
        WordEntryLine {
            id: 1587040,
            k: Some(vec!["引く".to_string(), "曳く".to_string()]),
            r: vec!["ひく".to_string()],
            s: vec![WordSense {
                g: vec!["to pull".to_string(), "to tug; to jerk".to_string()],
                lang: None,
                pos: Some(vec!["v5k".to_string()]),
                field: None,
                misc: None,
                inf: None,
            }],
        }
    }

    #[test]
    fn derives_kanji_characters() {
        let record = WordSeries::from_entry(entry()).unwrap();
        assert_eq!(record.kc, vec!["引".to_string(), "曳".to_string()]);
    }

    #[test]
    fn derives_gloss_tokens_lowercased_and_deduplicated() {
        let record = WordSeries::from_entry(entry()).unwrap();
        assert_eq!(
            record.gt,
            vec![
                "to".to_string(),
                "pull".to_string(),
                "tug".to_string(),
                "jerk".to_string()
            ]
        );
    }

    #[test]
    fn gloss_tokens_are_capped() {
        let glosses: Vec<String> = (0..100).map(|i| format!("gloss{}", i)).collect();
        let senses = vec![WordSense {
            g: glosses,
            lang: None,
            pos: None,
            field: None,
            misc: None,
            inf: None,
        }];
        assert_eq!(gloss_tokens(&senses).len(), MAX_GLOSS_TOKENS);
    }

    #[test]
    fn derives_hiragana_readings() {
        let record = WordSeries::from_entry(entry()).unwrap();
        assert_eq!(record.h, vec!["ひく".to_string()]);
    }
}
