//! Record shapes for each data series
//!
//! Each series defines an entry line and a deletion line (the wire shapes
//! inside `.ljson` files) plus the stored record. The [`SeriesRecord`]
//! trait ties them together so the downloader, applier, and store can be
//! generic over the series.

pub mod kanji;
pub mod names;
pub mod radicals;
pub mod words;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::series::DataSeries;
use crate::error::DownloadError;
use crate::storage::keys::StoreKey;

pub use kanji::{KanjiDeletionLine, KanjiEntryLine, KanjiRecord, KanjiSeries};
pub use names::{NameDeletionLine, NameEntryLine, NameRecord, NameSeries, NameTranslation};
pub use radicals::{RadicalDeletionLine, RadicalEntryLine, RadicalRecord, RadicalSeries};
pub use words::{WordDeletionLine, WordEntryLine, WordRecord, WordSense, WordSeries};

/// Capability bundle for one data series: wire line shapes, the stored
/// record, and the transforms between them.
pub trait SeriesRecord: Send + Sync + 'static {
    const SERIES: DataSeries;

    type EntryLine: DeserializeOwned + Send + 'static;
    type DeletionLine: DeserializeOwned + Send + 'static;
    type Key: StoreKey;
    type Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Transform a validated entry line into its stored record, computing
    /// any derived index fields.
    fn from_entry(line: Self::EntryLine) -> Result<Self::Record, DownloadError>;

    /// The key a deletion line refers to.
    fn deletion_key(line: Self::DeletionLine) -> Result<Self::Key, DownloadError>;

    /// The primary key of a stored record.
    fn record_key(record: &Self::Record) -> Self::Key;

    /// Secondary-index contributions of a record: (index family, values).
    fn index_values(record: &Self::Record) -> Vec<(&'static str, Vec<String>)>;
}

/// Parse the single character of a kanji key field.
pub(crate) fn single_char(field: &str, value: &str) -> Result<char, DownloadError> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(DownloadError::FileInvalidRecord {
            reason: format!("field '{}' is not a single character: {:?}", field, value),
        }),
    }
}
