//! Durable, transactional persistence of series records
//!
//! The store is a single RocksDB database holding one record column
//! family per series, one family per secondary index, a version table,
//! and a schema-version cell. All writes for one update land in a single
//! `WriteBatch`, so a series table and its version row can never disagree.

pub mod keys;
pub mod schema;

use std::path::PathBuf;
use std::sync::Arc;

use rocksdb::{DBWithThreadMode, IteratorMode, MultiThreaded, Options, WriteBatch};
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::core::config::StoreConfig;
use crate::core::series::DataSeries;
use crate::core::version::DataVersion;
use crate::error::StoreError;
use crate::records::{KanjiRecord, NameRecord, RadicalRecord, SeriesRecord, WordRecord};
use self::keys::{index_key, index_prefix, primary_key_of, StoreKey};
use self::schema::{cf, families_added_at, families_at, META_SCHEMA_KEY, SCHEMA_VERSION};

type Db = DBWithThreadMode<MultiThreaded>;

/// Engine lifecycle. `Opening` and `Deleting` are only observable while
/// the corresponding operation holds the write lock.
enum EngineState {
    Idle,
    Opening,
    Open(Arc<Db>),
    Error(String),
    Deleting,
}

/// Observable store state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Idle,
    Opening,
    Open,
    Error,
    Deleting,
}

/// What to remove in a bulk update.
pub enum DropTarget<K> {
    /// Delete the listed keys.
    Keys(Vec<K>),
    /// Clear the whole table.
    All,
}

impl<K> DropTarget<K> {
    fn drop_count(&self) -> usize {
        match self {
            DropTarget::Keys(keys) => keys.len(),
            DropTarget::All => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkProgress {
    pub processed: usize,
    pub total: usize,
}

/// One atomic update of a series table and its version row.
pub struct BulkUpdate<'a, S: SeriesRecord> {
    pub put: Vec<S::Record>,
    pub drop: DropTarget<S::Key>,
    /// Version row to write; `None` deletes the row.
    pub version: Option<DataVersion>,
    pub on_progress: Option<&'a mut (dyn FnMut(BulkProgress) + Send)>,
}

/// RocksDB-backed store for all series tables.
pub struct Store {
    path: PathBuf,
    batch_size: usize,
    engine: RwLock<EngineState>,
}

impl Store {
    pub fn new(config: &StoreConfig) -> Self {
        Store {
            path: config.path.clone(),
            batch_size: config.batch_size.max(1),
            engine: RwLock::new(EngineState::Idle),
        }
    }

    /// Ensure the schema exists at the current version. Idempotent; a
    /// single open is shared between concurrent callers.
    pub async fn open(&self) -> Result<(), StoreError> {
        self.engine().await.map(|_| ())
    }

    pub async fn state(&self) -> StoreState {
        match &*self.engine.read().await {
            EngineState::Idle => StoreState::Idle,
            EngineState::Opening => StoreState::Opening,
            EngineState::Open(_) => StoreState::Open,
            EngineState::Error(_) => StoreState::Error,
            EngineState::Deleting => StoreState::Deleting,
        }
    }

    /// Release the engine handle. Subsequent reads reopen lazily.
    pub async fn close(&self) {
        let mut guard = self.engine.write().await;
        *guard = EngineState::Idle;
    }

    /// Close, then remove the store directory entirely. Waits for
    /// in-flight transactions (they hold the engine read lock).
    pub async fn destroy(&self) -> Result<(), StoreError> {
        let mut guard = self.engine.write().await;
        *guard = EngineState::Deleting;
        let result = Db::destroy(&Options::default(), &self.path);
        *guard = EngineState::Idle;
        match result {
            Ok(()) => {
                info!(path = %self.path.display(), "store destroyed");
                Ok(())
            }
            Err(e) if !self.path.exists() => {
                debug!("destroy of missing store: {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Acquire the engine for one transaction. The returned guard keeps
    /// `close`/`destroy` waiting until the transaction finishes.
    async fn engine(
        &self,
    ) -> Result<(RwLockReadGuard<'_, EngineState>, Arc<Db>), StoreError> {
        loop {
            {
                let guard = self.engine.read().await;
                if let EngineState::Open(db) = &*guard {
                    let db = Arc::clone(db);
                    return Ok((guard, db));
                }
            }

            let mut guard = self.engine.write().await;
            match &*guard {
                EngineState::Open(_) => continue,
                EngineState::Deleting | EngineState::Opening => continue,
                EngineState::Idle | EngineState::Error(_) => {}
            }
            *guard = EngineState::Opening;
            match self.open_engine() {
                Ok(db) => {
                    *guard = EngineState::Open(Arc::new(db));
                }
                Err(e) => {
                    *guard = match &e {
                        StoreError::Unavailable(msg) => EngineState::Error(msg.clone()),
                        _ => EngineState::Idle,
                    };
                    return Err(e);
                }
            }
        }
    }

    /// Open or create the database, applying any pending additive schema
    /// migrations.
    fn open_engine(&self) -> Result<Db, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let existing = Db::list_cf(&Options::default(), &self.path).unwrap_or_default();
        if existing.is_empty() {
            // Fresh store: create every family of the current schema.
            let db = Db::open_cf(&opts, &self.path, families_at(SCHEMA_VERSION))?;
            Self::write_schema_version(&db, SCHEMA_VERSION)?;
            info!(path = %self.path.display(), schema = SCHEMA_VERSION, "created store");
            return Ok(db);
        }

        let db = Db::open_cf(&opts, &self.path, &existing)?;
        let stored = Self::read_schema_version(&db)?;
        if stored > SCHEMA_VERSION {
            return Err(StoreError::SchemaTooNew {
                stored,
                supported: SCHEMA_VERSION,
            });
        }
        if stored < SCHEMA_VERSION {
            // Scripted per step so partial version jumps compose.
            for version in (stored + 1)..=SCHEMA_VERSION {
                for family in families_added_at(version) {
                    if !existing.iter().any(|f| f == family) {
                        db.create_cf(family, &Options::default())?;
                    }
                }
                Self::write_schema_version(&db, version)?;
                info!(from = stored, to = version, "migrated store schema");
            }
        }
        Ok(db)
    }

    fn read_schema_version(db: &Db) -> Result<u32, StoreError> {
        let meta = cf_handle(db, cf::META)?;
        match db.get_cf(&meta, META_SCHEMA_KEY)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            // Pre-versioning stores hold the v1 layout.
            None => Ok(1),
        }
    }

    fn write_schema_version(db: &Db, version: u32) -> Result<(), StoreError> {
        let meta = cf_handle(db, cf::META)?;
        db.put_cf(&meta, META_SCHEMA_KEY, serde_json::to_vec(&version)?)?;
        Ok(())
    }

    /// The version row for a series, if a snapshot has ever been applied.
    pub async fn get_data_version(
        &self,
        series: DataSeries,
    ) -> Result<Option<DataVersion>, StoreError> {
        let (_guard, db) = self.engine().await?;
        let versions = cf_handle(&db, cf::VERSIONS)?;
        match db.get_cf(&versions, [series.version_key()])? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Clear a series table, its indexes, and its version row.
    pub async fn clear_table(&self, series: DataSeries) -> Result<(), StoreError> {
        let (_guard, db) = self.engine().await?;
        let mut batch = WriteBatch::default();
        clear_series_into(&db, series, &mut batch)?;
        let versions = cf_handle(&db, cf::VERSIONS)?;
        batch.delete_cf(&versions, [series.version_key()]);
        db.write(batch)?;
        debug!(%series, "cleared table");
        Ok(())
    }

    /// Apply one atomic bulk update to a series table and the version
    /// table. Either every change lands or none do; in particular a
    /// failed update leaves the pre-existing version row unchanged.
    pub async fn bulk_update<S: SeriesRecord>(
        &self,
        update: BulkUpdate<'_, S>,
    ) -> Result<(), StoreError> {
        let BulkUpdate {
            put,
            drop,
            version,
            mut on_progress,
        } = update;

        let (_guard, db) = self.engine().await?;

        let total = drop.drop_count() + put.len();
        let mut processed = 0usize;
        let mut since_tick = 0usize;
        let mut batch = WriteBatch::default();

        match drop {
            DropTarget::All => {
                clear_series_into(&db, S::SERIES, &mut batch)?;
            }
            DropTarget::Keys(keys) => {
                for key in keys {
                    let encoded = key.encode();
                    {
                        let record_cf = cf_handle(&db, schema::record_family(S::SERIES))?;
                        if let Some(bytes) = db.get_cf(&record_cf, &encoded)? {
                            let record: S::Record = serde_json::from_slice(&bytes)?;
                            remove_index_entries::<S>(&db, &record, &encoded, &mut batch)?;
                        }
                        batch.delete_cf(&record_cf, &encoded);
                    }
                    processed += 1;
                    since_tick += 1;
                    if since_tick >= self.batch_size {
                        since_tick = 0;
                        if let Some(cb) = on_progress.as_deref_mut() {
                            cb(BulkProgress { processed, total });
                        }
                        tokio::task::yield_now().await;
                    }
                }
            }
        }

        for record in put {
            let encoded = S::record_key(&record).encode();
            {
                let record_cf = cf_handle(&db, schema::record_family(S::SERIES))?;
                // Replacing a record retracts its old index entries first.
                if let Some(bytes) = db.get_cf(&record_cf, &encoded)? {
                    let old: S::Record = serde_json::from_slice(&bytes)?;
                    remove_index_entries::<S>(&db, &old, &encoded, &mut batch)?;
                }
                batch.put_cf(&record_cf, &encoded, serde_json::to_vec(&record)?);
                for (family, values) in S::index_values(&record) {
                    let index_cf = cf_handle(&db, family)?;
                    for value in values {
                        batch.put_cf(&index_cf, index_key(&value, &encoded), b"");
                    }
                }
            }
            processed += 1;
            since_tick += 1;
            if since_tick >= self.batch_size {
                since_tick = 0;
                if let Some(cb) = on_progress.as_deref_mut() {
                    cb(BulkProgress { processed, total });
                }
                tokio::task::yield_now().await;
            }
        }

        let versions = cf_handle(&db, cf::VERSIONS)?;
        match &version {
            Some(version) => {
                batch.put_cf(
                    &versions,
                    [S::SERIES.version_key()],
                    serde_json::to_vec(version)?,
                );
            }
            None => batch.delete_cf(&versions, [S::SERIES.version_key()]),
        }

        db.write(batch)?;
        if let Some(cb) = on_progress.as_deref_mut() {
            cb(BulkProgress {
                processed: total,
                total,
            });
        }
        debug!(
            series = %S::SERIES,
            records = total,
            version = ?version,
            "bulk update committed"
        );
        Ok(())
    }

    /// Point lookups in input order; missing code points are skipped.
    pub async fn get_kanji_records(
        &self,
        code_points: &[u32],
    ) -> Result<Vec<KanjiRecord>, StoreError> {
        let (_guard, db) = self.engine().await?;
        let kanji = cf_handle(&db, cf::KANJI)?;
        let mut records = Vec::with_capacity(code_points.len());
        for cp in code_points {
            if let Some(bytes) = db.get_cf(&kanji, cp.encode())? {
                records.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(records)
    }

    /// Kanji whose given reading index contains the exact value.
    pub async fn get_kanji_with_reading(
        &self,
        index_family: &'static str,
        value: &str,
    ) -> Result<Vec<KanjiRecord>, StoreError> {
        let (_guard, db) = self.engine().await?;
        let pks = scan_index(&db, index_family, value)?;
        let kanji = cf_handle(&db, cf::KANJI)?;
        let mut records = Vec::with_capacity(pks.len());
        for pk in pks {
            if let Some(bytes) = db.get_cf(&kanji, &pk)? {
                records.push(serde_json::from_slice(&bytes)?);
            } else {
                warn!("dangling kanji index entry for {:?}", value);
            }
        }
        Ok(records)
    }

    /// Every radical record in id order.
    pub async fn get_radicals(&self) -> Result<Vec<RadicalRecord>, StoreError> {
        let (_guard, db) = self.engine().await?;
        let radicals = cf_handle(&db, cf::RADICALS)?;
        let mut records = Vec::new();
        for item in db.iterator_cf(&radicals, IteratorMode::Start) {
            let (_key, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    /// Name lookup over the spelling and reading indexes, §4.5 ranking:
    /// exact matches (spelling hits first) ahead of kana-equivalent
    /// matches, insertion order stable within a rank.
    pub async fn get_names(
        &self,
        query: &str,
        kana_equivalent: Option<&str>,
    ) -> Result<Vec<NameRecord>, StoreError> {
        let (_guard, db) = self.engine().await?;
        let pks = ranked_index_scan(
            &db,
            &[cf::NAMES_K, cf::NAMES_R],
            cf::NAMES_H,
            query,
            kana_equivalent,
        )?;
        fetch_records(&db, cf::NAMES, &pks)
    }

    /// Word lookup with the same shape and ranking as [`get_names`].
    pub async fn get_words(
        &self,
        query: &str,
        kana_equivalent: Option<&str>,
    ) -> Result<Vec<WordRecord>, StoreError> {
        let (_guard, db) = self.engine().await?;
        let pks = ranked_index_scan(
            &db,
            &[cf::WORDS_K, cf::WORDS_R],
            cf::WORDS_H,
            query,
            kana_equivalent,
        )?;
        fetch_records(&db, cf::WORDS, &pks)
    }
}

fn cf_handle<'a>(
    db: &'a Db,
    name: &str,
) -> Result<Arc<rocksdb::BoundColumnFamily<'a>>, StoreError> {
    db.cf_handle(name)
        .ok_or_else(|| StoreError::Engine(format!("missing column family {}", name)))
}

/// Queue deletion of every key of a series' record and index families.
fn clear_series_into(
    db: &Db,
    series: DataSeries,
    batch: &mut WriteBatch,
) -> Result<(), StoreError> {
    let mut families = vec![schema::record_family(series)];
    families.extend_from_slice(schema::index_families(series));
    for family in families {
        // A store created before the words migration may not have the
        // family yet; nothing to clear then.
        let Some(handle) = db.cf_handle(family) else {
            continue;
        };
        for item in db.iterator_cf(&handle, IteratorMode::Start) {
            let (key, _value) = item?;
            batch.delete_cf(&handle, key);
        }
    }
    Ok(())
}

fn remove_index_entries<S: SeriesRecord>(
    db: &Db,
    record: &S::Record,
    encoded_key: &[u8],
    batch: &mut WriteBatch,
) -> Result<(), StoreError> {
    for (family, values) in S::index_values(record) {
        let index_cf = cf_handle(db, family)?;
        for value in values {
            batch.delete_cf(&index_cf, index_key(&value, encoded_key));
        }
    }
    Ok(())
}

/// Primary keys whose index entry matches the value exactly, in key order.
fn scan_index(db: &Db, family: &str, value: &str) -> Result<Vec<Vec<u8>>, StoreError> {
    let Some(handle) = db.cf_handle(family) else {
        // Index family absent (pre-migration store): no matches.
        return Ok(Vec::new());
    };
    let prefix = index_prefix(value);
    let mut pks = Vec::new();
    let mode = IteratorMode::From(&prefix, rocksdb::Direction::Forward);
    for item in db.iterator_cf(&handle, mode) {
        let (key, _value) = item?;
        match primary_key_of(&key, &prefix) {
            Some(pk) => pks.push(pk.to_vec()),
            None => break,
        }
    }
    Ok(pks)
}

/// Scan the exact-match families with `query`, then the kana-equivalence
/// family with the normalized query, deduplicating while preserving rank
/// order.
fn ranked_index_scan(
    db: &Db,
    exact_families: &[&'static str],
    kana_family: &'static str,
    query: &str,
    kana_equivalent: Option<&str>,
) -> Result<Vec<Vec<u8>>, StoreError> {
    let mut pks: Vec<Vec<u8>> = Vec::new();
    for family in exact_families {
        for pk in scan_index(db, family, query)? {
            if !pks.contains(&pk) {
                pks.push(pk);
            }
        }
    }
    if let Some(normalized) = kana_equivalent {
        for pk in scan_index(db, kana_family, normalized)? {
            if !pks.contains(&pk) {
                pks.push(pk);
            }
        }
    }
    Ok(pks)
}

fn fetch_records<R: serde::de::DeserializeOwned>(
    db: &Db,
    family: &'static str,
    pks: &[Vec<u8>],
) -> Result<Vec<R>, StoreError> {
    let handle = cf_handle(db, family)?;
    let mut records = Vec::with_capacity(pks.len());
    for pk in pks {
        if let Some(bytes) = db.get_cf(&handle, pk)? {
            records.push(serde_json::from_slice(&bytes)?);
        } else {
            warn!("dangling index entry in {}", family);
        }
    }
    Ok(records)
}
