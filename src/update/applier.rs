//! Update applier: drives one download stream into the store
//!
//! The applier buffers entries and deletions per file and commits them in
//! one atomic bulk update when the file ends, emitting lifecycle actions
//! for the state reducer along the way. At most one applier may run per
//! (store, series); the registry holds the stream's cancellation token so
//! an external `cancel_update` can abort it.

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::reducer::UpdateAction;
use crate::core::series::DataSeries;
use crate::core::version::DataVersion;
use crate::download::{DownloadEvent, DownloadStream};
use crate::error::{DownloadError, UpdateError};
use crate::records::SeriesRecord;
use crate::storage::{BulkUpdate, DropTarget, Store};

/// Registry of in-flight appliers, one slot per series.
#[derive(Default)]
pub struct UpdateRegistry {
    active: DashMap<DataSeries, CancellationToken>,
}

impl UpdateRegistry {
    pub fn new() -> Self {
        UpdateRegistry::default()
    }

    fn begin(
        &self,
        series: DataSeries,
        cancel: CancellationToken,
    ) -> Result<RegistryGuard<'_>, UpdateError> {
        match self.active.entry(series) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(UpdateError::OverlappingUpdate { series })
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(cancel);
                Ok(RegistryGuard {
                    registry: self,
                    series,
                })
            }
        }
    }

    /// Abort the in-flight applier for a series, if any.
    pub fn cancel(&self, series: DataSeries) -> bool {
        match self.active.get(&series) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for entry in self.active.iter() {
            entry.value().cancel();
        }
    }

    pub fn is_active(&self, series: DataSeries) -> bool {
        self.active.contains_key(&series)
    }
}

struct RegistryGuard<'a> {
    registry: &'a UpdateRegistry,
    series: DataSeries,
}

impl Drop for RegistryGuard<'_> {
    fn drop(&mut self) {
        self.registry.active.remove(&self.series);
    }
}

/// Consume one download stream end-to-end, committing each completed file
/// to the store.
///
/// Event-order invariants the downloader upholds are re-checked here: a
/// second `Version` before `VersionEnd`, a deletion inside a snapshot, or
/// a stream ending with an open version are all protocol violations.
pub async fn apply_update<S: SeriesRecord>(
    store: &Store,
    registry: &UpdateRegistry,
    stream: &mut DownloadStream<S>,
    mut on_action: impl FnMut(UpdateAction) + Send,
) -> Result<(), UpdateError> {
    let _guard = registry.begin(S::SERIES, stream.cancel_token())?;

    let mut put: Vec<S::Record> = Vec::new();
    let mut drop_keys: Vec<S::Key> = Vec::new();
    let mut current: Option<(DataVersion, bool)> = None;

    while let Some(event) = stream.next_event().await {
        match event {
            Err(DownloadError::Canceled) => return Err(UpdateError::Aborted),
            Err(error) => return Err(error.into()),
            Ok(DownloadEvent::Version { version, partial }) => {
                if current.is_some() {
                    return Err(DownloadError::UnexpectedVersion.into());
                }
                debug!(series = %S::SERIES, %version, partial, "start of file");
                on_action(UpdateAction::StartDownload {
                    version: version.clone(),
                });
                current = Some((version, partial));
            }
            Ok(DownloadEvent::Entry(line)) => {
                put.push(S::from_entry(line)?);
            }
            Ok(DownloadEvent::Deletion(line)) => {
                match &current {
                    Some((_, partial)) if *partial => {}
                    _ => return Err(DownloadError::DeletionInSnapshot.into()),
                }
                drop_keys.push(S::deletion_key(line)?);
            }
            Ok(DownloadEvent::Progress { loaded, total }) => {
                on_action(UpdateAction::Progress { loaded, total });
            }
            Ok(DownloadEvent::VersionEnd) => {
                let (version, partial) = match current.take() {
                    Some(open) => open,
                    None => return Err(DownloadError::UnexpectedVersion.into()),
                };
                on_action(UpdateAction::FinishDownload {
                    version: version.clone(),
                });

                let drop = if partial {
                    DropTarget::Keys(std::mem::take(&mut drop_keys))
                } else {
                    DropTarget::All
                };
                store
                    .bulk_update::<S>(BulkUpdate {
                        put: std::mem::take(&mut put),
                        drop,
                        version: Some(version.clone()),
                        on_progress: None,
                    })
                    .await?;

                on_action(UpdateAction::FinishPatch { version });
            }
        }
    }

    if current.is_some() {
        return Err(DownloadError::UnclosedVersion.into());
    }
    Ok(())
}
