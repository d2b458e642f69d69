//! Downloader: typed event streams over remote data files
//!
//! Given (series, major version, language, current version?) the
//! downloader resolves the remote version file, plans which snapshot and
//! patch files to fetch, and streams their contents as typed events over
//! a bounded channel. The producer task and the consumer share a
//! cancellation token; canceling aborts the in-flight request at the next
//! suspension point.

pub mod ljson;
pub mod manifest;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::series::DataSeries;
use crate::core::version::{DataVersion, VersionNumber, VersionSpec};
use crate::error::DownloadError;
use crate::records::SeriesRecord;
use self::ljson::{parse_line, LineSplitter};
use self::manifest::{parse_header_version, ManifestCache};

/// One event of a download attempt, in emission order per file:
/// `Version`, then entries/deletions/progress, then `VersionEnd`.
pub enum DownloadEvent<S: SeriesRecord> {
    Version { version: DataVersion, partial: bool },
    Entry(S::EntryLine),
    Deletion(S::DeletionLine),
    Progress { loaded: u64, total: u64 },
    VersionEnd,
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub base_url: String,
    pub lang: String,
    pub major_version: u32,
    pub current_version: Option<VersionNumber>,
    /// Bypass the in-memory version-file cache.
    pub force_fetch: bool,
    pub max_progress_resolution: f64,
    pub stall_timeout: Duration,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Full,
    Patch,
}

impl FileType {
    fn as_str(self) -> &'static str {
        match self {
            FileType::Full => "full",
            FileType::Patch => "patch",
        }
    }
}

/// One file the download plan will fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedFile {
    pub version: VersionNumber,
    pub file_type: FileType,
}

/// Consumer handle of a download: receives events and owns cancellation.
pub struct DownloadStream<S: SeriesRecord> {
    rx: mpsc::Receiver<Result<DownloadEvent<S>, DownloadError>>,
    cancel: CancellationToken,
}

impl<S: SeriesRecord> DownloadStream<S> {
    /// Next event, or `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<Result<DownloadEvent<S>, DownloadError>> {
        self.rx.recv().await
    }

    /// Token shared with the producer; canceling it aborts the download.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Start a download for one series. Events arrive lazily as the producer
/// task reads the network.
pub fn start_download<S: SeriesRecord>(
    client: Client,
    cache: Arc<ManifestCache>,
    options: DownloadOptions,
) -> DownloadStream<S> {
    let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
    let cancel = CancellationToken::new();
    let producer_cancel = cancel.clone();

    tokio::spawn(async move {
        let result = produce::<S>(&client, &cache, &options, &tx, &producer_cancel).await;
        if let Err(error) = result {
            if error != DownloadError::Canceled {
                warn!(series = %S::SERIES, %error, "download failed");
            }
            let _ = tx.send(Err(error)).await;
        }
    });

    DownloadStream { rx, cancel }
}

/// Decide which files to fetch to get from `current` to the state the
/// version file advertises.
pub fn compute_plan(
    current: Option<VersionNumber>,
    spec: &VersionSpec,
) -> Result<Vec<PlannedFile>, DownloadError> {
    if spec.snapshot > spec.patch {
        return Err(DownloadError::VersionFileInvalid {
            reason: format!(
                "snapshot {} is beyond the latest patch {}",
                spec.snapshot, spec.patch
            ),
        });
    }

    let upstream = spec.version_number();
    if let Some(current) = current {
        // A cached or out-of-sync version file can lag what we already
        // applied; bail out rather than downgrade.
        if current > upstream {
            return Err(DownloadError::DatabaseTooOld {
                local: current.to_string(),
                remote: upstream.to_string(),
            });
        }
    }

    let mut plan = Vec::new();
    let first_patch = match current {
        Some(current) if current.major == spec.major && current.minor == spec.minor => {
            current.patch + 1
        }
        // No usable base: start over from the snapshot.
        _ => {
            plan.push(PlannedFile {
                version: VersionNumber::new(spec.major, spec.minor, spec.snapshot),
                file_type: FileType::Full,
            });
            spec.snapshot + 1
        }
    };
    for patch in first_patch..=spec.patch {
        plan.push(PlannedFile {
            version: VersionNumber::new(spec.major, spec.minor, patch),
            file_type: FileType::Patch,
        });
    }
    Ok(plan)
}

pub fn data_file_url(
    base_url: &str,
    series: DataSeries,
    lang: &str,
    version: VersionNumber,
    file_type: FileType,
) -> String {
    format!(
        "{}{}-rc-{}-{}.{}.{}-{}.ljson",
        base_url,
        series.name(),
        lang,
        version.major,
        version.minor,
        version.patch,
        file_type.as_str()
    )
}

async fn produce<S: SeriesRecord>(
    client: &Client,
    cache: &ManifestCache,
    options: &DownloadOptions,
    tx: &mpsc::Sender<Result<DownloadEvent<S>, DownloadError>>,
    cancel: &CancellationToken,
) -> Result<(), DownloadError> {
    let manifest = cache
        .get(client, &options.base_url, &options.lang, options.force_fetch)
        .await?;
    let spec = manifest.version_for(S::SERIES, options.major_version)?;
    let plan = compute_plan(options.current_version, &spec)?;
    debug!(series = %S::SERIES, files = plan.len(), "download plan ready");

    for file in plan {
        if cancel.is_cancelled() {
            return Err(DownloadError::Canceled);
        }
        stream_file::<S>(client, options, file, tx, cancel).await?;
    }
    Ok(())
}

struct FileState<'a, S: SeriesRecord> {
    url: &'a str,
    file: PlannedFile,
    lang: &'a str,
    max_progress_resolution: f64,
    tx: &'a mpsc::Sender<Result<DownloadEvent<S>, DownloadError>>,
    /// Total records declared by the header, once seen.
    records_total: Option<u64>,
    records_read: u64,
    last_progress: f64,
}

impl<'a, S: SeriesRecord> FileState<'a, S> {
    async fn emit(&self, event: DownloadEvent<S>) -> Result<(), DownloadError> {
        // The consumer dropping its handle is equivalent to cancellation.
        self.tx
            .send(Ok(event))
            .await
            .map_err(|_| DownloadError::Canceled)
    }

    async fn process_line(&mut self, line: &str) -> Result<(), DownloadError> {
        let object = parse_line(line)?;

        if object.get("type").and_then(|t| t.as_str()) == Some("header") {
            return self.process_header(&object).await;
        }

        if self.records_total.is_none() {
            return Err(DownloadError::FileHeaderMissing {
                url: self.url.to_string(),
            });
        }

        let deleted = object.get("deleted").cloned();
        match deleted {
            Some(serde_json::Value::Bool(true)) => {
                if self.file.file_type == FileType::Full {
                    return Err(DownloadError::DeletionInSnapshot);
                }
                let line: S::DeletionLine =
                    serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| {
                        DownloadError::FileInvalidRecord {
                            reason: e.to_string(),
                        }
                    })?;
                self.emit(DownloadEvent::Deletion(line)).await?;
            }
            Some(_) => {
                return Err(DownloadError::FileInvalidRecord {
                    reason: "record carries a non-true 'deleted' field".to_string(),
                });
            }
            None => {
                let line: S::EntryLine =
                    serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| {
                        DownloadError::FileInvalidRecord {
                            reason: e.to_string(),
                        }
                    })?;
                self.emit(DownloadEvent::Entry(line)).await?;
            }
        }

        self.records_read += 1;
        let total = self.records_total.unwrap_or(0);
        if total > 0 {
            let ratio = self.records_read as f64 / total as f64;
            if ratio - self.last_progress >= self.max_progress_resolution {
                self.last_progress = ratio;
                self.emit(DownloadEvent::Progress {
                    loaded: self.records_read,
                    total,
                })
                .await?;
            }
        }
        Ok(())
    }

    async fn process_header(
        &mut self,
        object: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), DownloadError> {
        if self.records_total.is_some() {
            return Err(DownloadError::FileHeaderDuplicate {
                url: self.url.to_string(),
            });
        }

        let version_value = object
            .get("version")
            .ok_or_else(|| DownloadError::FileInvalidRecord {
                reason: "header has no version".to_string(),
            })?;
        let (major, minor, patch, database_version, date_of_creation) =
            parse_header_version(version_value)?;

        // The header must describe exactly the file we asked for.
        let header_version = VersionNumber::new(major, minor, patch);
        if header_version != self.file.version {
            return Err(DownloadError::FileVersionMismatch {
                url: self.url.to_string(),
                header: header_version.to_string(),
                expected: self.file.version.to_string(),
            });
        }

        let records = object
            .get("records")
            .and_then(|r| r.as_u64())
            .ok_or_else(|| DownloadError::FileInvalidRecord {
                reason: "header has no records count".to_string(),
            })?;

        self.records_total = Some(records);
        self.emit(DownloadEvent::Version {
            version: DataVersion {
                major,
                minor,
                patch,
                database_version,
                date_of_creation,
                lang: self.lang.to_string(),
            },
            partial: self.file.file_type == FileType::Patch,
        })
        .await
    }
}

async fn stream_file<S: SeriesRecord>(
    client: &Client,
    options: &DownloadOptions,
    file: PlannedFile,
    tx: &mpsc::Sender<Result<DownloadEvent<S>, DownloadError>>,
    cancel: &CancellationToken,
) -> Result<(), DownloadError> {
    let url = data_file_url(
        &options.base_url,
        S::SERIES,
        &options.lang,
        file.version,
        file.file_type,
    );
    debug!(%url, "fetching data file");

    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(DownloadError::Canceled),
        response = client.get(&url).send() => {
            response.map_err(|e| DownloadError::DatabaseFileNotAccessible {
                url: url.clone(),
                reason: e.to_string(),
            })?
        }
    };

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(DownloadError::DatabaseFileNotFound { url });
    }
    if !response.status().is_success() {
        return Err(DownloadError::DatabaseFileNotAccessible {
            reason: format!("status {}", response.status()),
            url,
        });
    }

    let mut state = FileState::<S> {
        url: &url,
        file,
        lang: &options.lang,
        max_progress_resolution: options.max_progress_resolution,
        tx,
        records_total: None,
        records_read: 0,
        last_progress: 0.0,
    };

    let mut stream = response.bytes_stream();
    let mut splitter = LineSplitter::new();
    let mut received_bytes = false;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(DownloadError::Canceled),
            next = tokio::time::timeout(options.stall_timeout, stream.next()) => next,
        };
        let chunk = match next {
            Err(_) => {
                return Err(DownloadError::Stalled {
                    url: url.clone(),
                    seconds: options.stall_timeout.as_secs(),
                })
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                return Err(DownloadError::DatabaseFileNotAccessible {
                    url: url.clone(),
                    reason: e.to_string(),
                })
            }
            Ok(Some(Ok(bytes))) => bytes,
        };
        if !chunk.is_empty() {
            received_bytes = true;
        }
        for line in splitter.push(&chunk)? {
            state.process_line(&line).await?;
        }
    }
    if let Some(line) = splitter.finish()? {
        state.process_line(&line).await?;
    }

    if state.records_total.is_none() {
        if !received_bytes {
            return Err(DownloadError::DatabaseFileNotAccessible {
                url: url.clone(),
                reason: "empty body".to_string(),
            });
        }
        return Err(DownloadError::FileHeaderMissing { url });
    }

    state.emit(DownloadEvent::VersionEnd).await
}
