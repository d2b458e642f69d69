//! Database facade: the single public entry point
//!
//! Owns the store, the HTTP client, and the in-memory caches; serializes
//! update runs behind a queue; folds pipeline actions into per-series
//! observable state; and answers lookups with radical, component, and
//! related-kanji expansion.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::config::DatabaseConfig;
use crate::core::reducer::{reduce, UpdateAction, UpdateState};
use crate::core::series::{DataSeries, MajorSeries, SeriesSet};
use crate::core::version::DataVersion;
use crate::download::manifest::ManifestCache;
use crate::download::{start_download, DownloadOptions};
use crate::error::{StoreError, UpdateError};
use crate::query::kanji::{build_radical_caches, expand_kanji_records, KanjiResult, RadicalCaches};
use crate::query::names::{self, InsertionOrderRanker, WordRanker};
use crate::records::{
    KanjiRecord, KanjiSeries, NameRecord, NameSeries, RadicalSeries, SeriesRecord, WordRecord,
    WordSeries,
};
use crate::storage::Store;
use crate::update::applier::{apply_update, UpdateRegistry};

/// Observable condition of one series' local data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSeriesState {
    /// Not yet determined (store not consulted).
    Initializing,
    /// No snapshot applied yet.
    Empty,
    /// Usable local data.
    Ok,
    /// The backing engine cannot be used.
    Unavailable,
}

/// Per-series status surfaced to consumers.
#[derive(Debug, Clone)]
pub struct SeriesStatus {
    pub state: DataSeriesState,
    pub version: Option<DataVersion>,
    pub update_state: UpdateState,
}

impl Default for SeriesStatus {
    fn default() -> Self {
        SeriesStatus {
            state: DataSeriesState::Initializing,
            version: None,
            update_state: UpdateState::default(),
        }
    }
}

/// Change notifications for subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseEvent {
    StateUpdated { series: DataSeries },
    Deleted,
}

/// Parameters of an update request.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Series to update; defaults to the kanji group.
    pub series: Option<SeriesSet>,
    /// Language to mirror; defaults to the configured language.
    pub lang: Option<String>,
    /// Bypass the cached version file.
    pub force_fetch: bool,
}

type DoneReceiver = watch::Receiver<Option<Result<(), UpdateError>>>;

struct InFlightUpdate {
    lang: String,
    queue: Arc<Mutex<VecDeque<DataSeries>>>,
    cancel: CancellationToken,
    done: DoneReceiver,
}

struct DatabaseInner {
    config: DatabaseConfig,
    store: Store,
    client: Client,
    manifest_cache: Arc<ManifestCache>,
    registry: UpdateRegistry,
    statuses: RwLock<HashMap<DataSeries, SeriesStatus>>,
    radical_caches: RwLock<Option<Arc<RadicalCaches>>>,
    word_ranker: Box<dyn WordRanker>,
    events: broadcast::Sender<DatabaseEvent>,
    in_flight: tokio::sync::Mutex<Option<InFlightUpdate>>,
}

/// Handle to the dictionary engine. Cheap to clone; all clones share the
/// same store and update machinery.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Self {
        Database::with_word_ranker(config, Box::new(InsertionOrderRanker))
    }

    pub fn with_word_ranker(config: DatabaseConfig, word_ranker: Box<dyn WordRanker>) -> Self {
        let (events, _) = broadcast::channel(64);
        let store = Store::new(&config.store);
        Database {
            inner: Arc::new(DatabaseInner {
                config,
                store,
                client: Client::new(),
                manifest_cache: Arc::new(ManifestCache::new()),
                registry: UpdateRegistry::new(),
                statuses: RwLock::new(HashMap::new()),
                radical_caches: RwLock::new(None),
                word_ranker,
                events,
                in_flight: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Open the store eagerly. Updates and queries open it lazily, so
    /// calling this is optional.
    pub async fn open(&self) -> Result<(), StoreError> {
        self.inner.store.open().await
    }

    pub async fn close(&self) {
        self.inner.store.close().await;
    }

    /// Subscribe to state-change and deletion events.
    pub fn subscribe(&self) -> broadcast::Receiver<DatabaseEvent> {
        self.inner.events.subscribe()
    }

    /// The persisted version of a series, if any snapshot was applied.
    pub async fn get_data_version(
        &self,
        series: DataSeries,
    ) -> Result<Option<DataVersion>, StoreError> {
        self.inner.store.get_data_version(series).await
    }

    /// Current status of a series, resolving it from the store on first
    /// access.
    pub async fn series_status(&self, series: DataSeries) -> SeriesStatus {
        {
            let statuses = self.inner.statuses.read();
            if let Some(status) = statuses.get(&series) {
                if status.state != DataSeriesState::Initializing {
                    return status.clone();
                }
            }
        }
        self.refresh_series_status(series).await;
        self.inner
            .statuses
            .read()
            .get(&series)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop cached version files (all languages, or one).
    pub fn clear_cached_version_info(&self, lang: Option<&str>) {
        match lang {
            Some(lang) => self.inner.manifest_cache.invalidate(lang),
            None => self.inner.manifest_cache.clear(),
        }
    }

    /// Run (or join) an update. Overlapping calls for the same language
    /// share one outcome; requesting different series appends them to the
    /// in-flight queue; a different language cancels the current run and
    /// starts over.
    pub async fn update(&self, options: UpdateOptions) -> Result<(), UpdateError> {
        let series = options
            .series
            .unwrap_or_else(SeriesSet::kanji_group)
            .with_implied_series();
        let lang = options
            .lang
            .clone()
            .unwrap_or_else(|| self.inner.config.remote.lang.clone());

        loop {
            let mut in_flight = self.inner.in_flight.lock().await;
            if let Some(current) = in_flight.as_ref() {
                if current.lang == lang {
                    {
                        let mut queue = current.queue.lock();
                        for s in series.iter() {
                            if !queue.contains(&s) {
                                queue.push_back(s);
                            }
                        }
                    }
                    let done = current.done.clone();
                    drop(in_flight);
                    return wait_done(done).await;
                }
                // Language switched mid-run: abandon the current run.
                info!(from = %current.lang, to = %lang, "language changed, restarting update");
                current.queue.lock().clear();
                current.cancel.cancel();
                let done = current.done.clone();
                drop(in_flight);
                let _ = wait_done(done).await;
                continue;
            }

            let queue: Arc<Mutex<VecDeque<DataSeries>>> =
                Arc::new(Mutex::new(series.iter().collect()));
            let cancel = CancellationToken::new();
            let (done_tx, done_rx) = watch::channel(None);
            *in_flight = Some(InFlightUpdate {
                lang: lang.clone(),
                queue: Arc::clone(&queue),
                cancel: cancel.clone(),
                done: done_rx.clone(),
            });
            drop(in_flight);

            let db = self.clone();
            let force_fetch = options.force_fetch;
            let run_lang = lang.clone();
            tokio::spawn(async move {
                let result = db.run_update(run_lang, queue, cancel, force_fetch).await;
                *db.inner.in_flight.lock().await = None;
                let _ = done_tx.send(Some(result));
            });
            return wait_done(done_rx).await;
        }
    }

    /// Abort the in-flight applier for one series (and drop it from the
    /// queue), or the whole update run.
    pub async fn cancel_update(&self, series: Option<DataSeries>) {
        match series {
            Some(series) => {
                if let Some(current) = self.inner.in_flight.lock().await.as_ref() {
                    current.queue.lock().retain(|s| *s != series);
                }
                self.inner.registry.cancel(series);
            }
            None => {
                if let Some(current) = self.inner.in_flight.lock().await.as_ref() {
                    current.queue.lock().clear();
                    current.cancel.cancel();
                }
                self.inner.registry.cancel_all();
            }
        }
    }

    /// Cancel all updates, wait for them to unwind, then remove the store.
    pub async fn destroy(&self) -> Result<(), StoreError> {
        let done = {
            let in_flight = self.inner.in_flight.lock().await;
            in_flight.as_ref().map(|current| {
                current.queue.lock().clear();
                current.cancel.cancel();
                current.done.clone()
            })
        };
        if let Some(done) = done {
            let _ = wait_done(done).await;
        }
        self.inner.registry.cancel_all();

        self.inner.store.destroy().await?;
        {
            let mut statuses = self.inner.statuses.write();
            for series in DataSeries::ALL {
                statuses.insert(
                    series,
                    SeriesStatus {
                        state: DataSeriesState::Empty,
                        version: None,
                        update_state: UpdateState::default(),
                    },
                );
            }
        }
        self.invalidate_radical_caches();
        let _ = self.inner.events.send(DatabaseEvent::Deleted);
        Ok(())
    }

    /// Clear one series (table, indexes, version row) without touching
    /// the others.
    pub async fn delete_series(&self, series: DataSeries) -> Result<(), StoreError> {
        self.inner.store.clear_table(series).await?;
        {
            let mut statuses = self.inner.statuses.write();
            let status = statuses.entry(series).or_default();
            status.state = DataSeriesState::Empty;
            status.version = None;
        }
        if series == DataSeries::Radicals {
            self.invalidate_radical_caches();
        }
        let _ = self
            .inner
            .events
            .send(DatabaseEvent::StateUpdated { series });
        Ok(())
    }

    /// Look up kanji, expanding radicals, components, and related
    /// characters.
    pub async fn get_kanji(&self, chars: &[char]) -> Result<Vec<KanjiResult>, StoreError> {
        let store = &self.inner.store;
        let code_points: Vec<u32> = chars.iter().map(|c| *c as u32).collect();
        let records = store.get_kanji_records(&code_points).await?;
        let caches = self.radical_caches().await?;

        // Components and related characters resolve against the kanji
        // table too; fetch them in one round.
        let mut aux: Vec<u32> = Vec::new();
        for record in &records {
            for c in record.comp.as_deref().unwrap_or_default().chars() {
                aux.push(c as u32);
            }
            for c in record.cf.as_deref().unwrap_or_default().chars() {
                aux.push(c as u32);
            }
        }
        aux.sort_unstable();
        aux.dedup();
        let extra: HashMap<u32, KanjiRecord> = store
            .get_kanji_records(&aux)
            .await?
            .into_iter()
            .map(|record| (record.c, record))
            .collect();

        let lang = match store.get_data_version(DataSeries::Kanji).await? {
            Some(version) => version.lang,
            None => self.inner.config.remote.lang.clone(),
        };

        Ok(expand_kanji_records(records, &caches, &extra, &lang))
    }

    /// Look up proper names by kanji spelling or reading, including
    /// kana-equivalent matches.
    pub async fn get_names(&self, query: &str) -> Result<Vec<NameRecord>, StoreError> {
        names::get_names(&self.inner.store, query).await
    }

    /// Look up words by spelling or reading; results pass through the
    /// configured ranker.
    pub async fn get_words(&self, query: &str) -> Result<Vec<WordRecord>, StoreError> {
        names::get_words(&self.inner.store, query, self.inner.word_ranker.as_ref()).await
    }

    async fn radical_caches(&self) -> Result<Arc<RadicalCaches>, StoreError> {
        if let Some(caches) = self.inner.radical_caches.read().clone() {
            return Ok(caches);
        }
        let radicals = self.inner.store.get_radicals().await?;
        let built = Arc::new(build_radical_caches(radicals));
        *self.inner.radical_caches.write() = Some(Arc::clone(&built));
        Ok(built)
    }

    fn invalidate_radical_caches(&self) {
        *self.inner.radical_caches.write() = None;
    }

    fn apply_action(&self, series: DataSeries, action: &UpdateAction) {
        {
            let mut statuses = self.inner.statuses.write();
            let status = statuses.entry(series).or_default();
            status.update_state = reduce(&status.update_state, action);
            if let UpdateAction::FinishPatch { version } = action {
                status.state = DataSeriesState::Ok;
                status.version = Some(version.clone());
            }
        }
        let _ = self
            .inner
            .events
            .send(DatabaseEvent::StateUpdated { series });
    }

    async fn refresh_series_status(&self, series: DataSeries) {
        let resolved = self.inner.store.get_data_version(series).await;
        {
            let mut statuses = self.inner.statuses.write();
            let status = statuses.entry(series).or_default();
            match resolved {
                Ok(Some(version)) => {
                    status.state = DataSeriesState::Ok;
                    status.version = Some(version);
                }
                Ok(None) => {
                    status.state = DataSeriesState::Empty;
                    status.version = None;
                }
                Err(StoreError::Unavailable(_)) => {
                    status.state = DataSeriesState::Unavailable;
                }
                Err(error) => {
                    warn!(%series, %error, "could not resolve series status");
                }
            }
        }
        let _ = self
            .inner
            .events
            .send(DatabaseEvent::StateUpdated { series });
    }

    async fn run_update(
        &self,
        lang: String,
        queue: Arc<Mutex<VecDeque<DataSeries>>>,
        cancel: CancellationToken,
        force_fetch: bool,
    ) -> Result<(), UpdateError> {
        let mut first_error: Option<UpdateError> = None;

        loop {
            let batch: Vec<DataSeries> = {
                let mut queue = queue.lock();
                queue.drain(..).collect()
            };
            if batch.is_empty() {
                break;
            }

            // Major-series groups run in parallel; series within a group
            // run sequentially.
            let mut handles = Vec::new();
            for group in [MajorSeries::Kanji, MajorSeries::Names, MajorSeries::Words] {
                let members: Vec<DataSeries> = group
                    .members()
                    .iter()
                    .copied()
                    .filter(|series| batch.contains(series))
                    .collect();
                if members.is_empty() {
                    continue;
                }
                let db = self.clone();
                let lang = lang.clone();
                let cancel = cancel.clone();
                handles.push(tokio::spawn(async move {
                    for series in members {
                        db.run_series(series, &lang, &cancel, force_fetch).await?;
                    }
                    Ok::<(), UpdateError>(())
                }));
            }

            for handle in handles {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => {
                        if first_error.is_none() {
                            first_error = Some(error);
                        }
                    }
                    Err(_join_error) => {
                        if first_error.is_none() {
                            first_error = Some(UpdateError::Aborted);
                        }
                    }
                }
            }
            if first_error.is_some() {
                break;
            }
        }

        match first_error {
            Some(error) => {
                queue.lock().clear();
                Err(error)
            }
            None => Ok(()),
        }
    }

    async fn run_series(
        &self,
        series: DataSeries,
        lang: &str,
        cancel: &CancellationToken,
        force_fetch: bool,
    ) -> Result<(), UpdateError> {
        match series {
            DataSeries::Kanji => {
                self.run_series_typed::<KanjiSeries>(lang, cancel, force_fetch)
                    .await
            }
            DataSeries::Radicals => {
                self.run_series_typed::<RadicalSeries>(lang, cancel, force_fetch)
                    .await
            }
            DataSeries::Names => {
                self.run_series_typed::<NameSeries>(lang, cancel, force_fetch)
                    .await
            }
            DataSeries::Words => {
                self.run_series_typed::<WordSeries>(lang, cancel, force_fetch)
                    .await
            }
        }
    }

    async fn run_series_typed<S: SeriesRecord>(
        &self,
        lang: &str,
        cancel: &CancellationToken,
        force_fetch: bool,
    ) -> Result<(), UpdateError> {
        let series = S::SERIES;
        let start = Utc::now();
        self.apply_action(series, &UpdateAction::Start);

        let current = match self.inner.store.get_data_version(series).await {
            Ok(current) => current,
            Err(error) => {
                if matches!(error, StoreError::Unavailable(_)) {
                    let mut statuses = self.inner.statuses.write();
                    statuses.entry(series).or_default().state = DataSeriesState::Unavailable;
                }
                self.apply_action(series, &UpdateAction::Error { check_date: None });
                return Err(error.into());
            }
        };
        // Data in another language can't be patched; resync from scratch.
        let current_version = current
            .as_ref()
            .filter(|version| version.lang == lang)
            .map(|version| version.version_number());

        let options = DownloadOptions {
            base_url: self.inner.config.remote.base_url.clone(),
            lang: lang.to_string(),
            major_version: series.supported_major_version(),
            current_version,
            force_fetch,
            max_progress_resolution: self.inner.config.download.max_progress_resolution,
            stall_timeout: self.inner.config.download.stall_timeout(),
            channel_capacity: self.inner.config.download.channel_capacity,
        };
        let mut stream = start_download::<S>(
            self.inner.client.clone(),
            Arc::clone(&self.inner.manifest_cache),
            options,
        );

        // Facade-level cancellation reaches into the stream's token.
        let stream_token = stream.cancel_token();
        let facade_cancel = cancel.clone();
        let link = tokio::spawn(async move {
            facade_cancel.cancelled().await;
            stream_token.cancel();
        });

        let committed = AtomicBool::new(false);
        let result = apply_update::<S>(
            &self.inner.store,
            &self.inner.registry,
            &mut stream,
            |action| {
                if matches!(action, UpdateAction::FinishPatch { .. }) {
                    committed.store(true, Ordering::Relaxed);
                }
                self.apply_action(series, &action);
            },
        )
        .await;
        link.abort();

        let committed = committed.load(Ordering::Relaxed);
        if committed && series == DataSeries::Radicals {
            self.invalidate_radical_caches();
        }

        match result {
            Ok(()) => {
                self.apply_action(series, &UpdateAction::Finish { check_date: start });
                self.refresh_series_status(series).await;
                info!(%series, %lang, "series up to date");
                Ok(())
            }
            Err(error) => {
                self.apply_action(
                    series,
                    &UpdateAction::Error {
                        check_date: if committed { Some(start) } else { None },
                    },
                );
                if !error.is_abort() {
                    // The cached version file may be what misled us.
                    self.inner.manifest_cache.invalidate(lang);
                }
                Err(error)
            }
        }
    }
}

async fn wait_done(mut done: DoneReceiver) -> Result<(), UpdateError> {
    loop {
        if let Some(result) = done.borrow().clone() {
            return result;
        }
        if done.changed().await.is_err() {
            return Err(UpdateError::Aborted);
        }
    }
}
