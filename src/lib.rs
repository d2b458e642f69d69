// jpdict - Client-side sync and query engine for Japanese dictionary data
// Global clippy configuration

#![warn(clippy::all)]
#![warn(clippy::correctness)]
#![warn(clippy::suspicious)]
#![warn(clippy::perf)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::type_complexity)]
#![allow(clippy::new_without_default)]
#![allow(clippy::redundant_field_names)]

pub mod core;
pub mod database;
pub mod download;
pub mod error;
pub mod kana;
pub mod query;
pub mod records;
pub mod storage;
pub mod update;

pub use crate::core::{
    reduce, DataSeries, DataVersion, DatabaseConfig, MajorSeries, SeriesSet, UpdateAction,
    UpdateState, VersionNumber,
};
pub use crate::database::{
    Database, DataSeriesState, DatabaseEvent, SeriesStatus, UpdateOptions,
};
pub use crate::error::{DownloadError, StoreError, UpdateError};
pub use crate::query::{ComponentInfo, KanjiResult, RadicalInfo, RelatedKanji};
pub use crate::records::{KanjiRecord, NameRecord, RadicalRecord, WordRecord};
pub use crate::storage::{Store, StoreState};
pub use crate::update::{RetryEvent, UpdateWithRetry};
