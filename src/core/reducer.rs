//! Observable update state per series
//!
//! The update pipeline reports its lifecycle through actions; folding them
//! with [`reduce`] yields the state a consumer can subscribe to. The
//! function is pure so transitions can be tested exhaustively and replayed.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::version::DataVersion;

/// Where a series' sync lifecycle currently stands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum UpdateState {
    /// No update in progress.
    Idle { last_check: Option<DateTime<Utc>> },
    /// Fetching the remote version file.
    Checking { last_check: Option<DateTime<Utc>> },
    /// Streaming entries of one data file.
    Downloading {
        download_version: DataVersion,
        /// Fraction of the current file's records read, 0.0..=1.0.
        progress: f64,
        last_check: Option<DateTime<Utc>>,
    },
    /// Writing a completed file into the store.
    UpdatingDb {
        download_version: DataVersion,
        last_check: Option<DateTime<Utc>>,
    },
}

impl UpdateState {
    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        match self {
            UpdateState::Idle { last_check }
            | UpdateState::Checking { last_check }
            | UpdateState::Downloading { last_check, .. }
            | UpdateState::UpdatingDb { last_check, .. } => *last_check,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, UpdateState::Idle { .. })
    }
}

impl Default for UpdateState {
    fn default() -> Self {
        UpdateState::Idle { last_check: None }
    }
}

/// Lifecycle events emitted by the update pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// An update run began; the version file is being consulted.
    Start,
    /// A data file's header was accepted and its records are streaming.
    StartDownload { version: DataVersion },
    /// Download progress within the current file.
    Progress { loaded: u64, total: u64 },
    /// All records of the current file were received.
    FinishDownload { version: DataVersion },
    /// The current file was durably committed.
    FinishPatch { version: DataVersion },
    /// The whole run completed.
    Finish { check_date: DateTime<Utc> },
    /// The run failed or was canceled. `check_date` is set iff at least
    /// one file was durably committed before the failure.
    Error { check_date: Option<DateTime<Utc>> },
}

/// Fold one action into the current state.
pub fn reduce(state: &UpdateState, action: &UpdateAction) -> UpdateState {
    match action {
        UpdateAction::Start => UpdateState::Checking {
            last_check: state.last_check(),
        },
        UpdateAction::StartDownload { version } => UpdateState::Downloading {
            download_version: version.clone(),
            progress: 0.0,
            last_check: state.last_check(),
        },
        UpdateAction::Progress { loaded, total } => match state {
            UpdateState::Downloading {
                download_version,
                last_check,
                ..
            } => UpdateState::Downloading {
                download_version: download_version.clone(),
                progress: if *total == 0 {
                    0.0
                } else {
                    *loaded as f64 / *total as f64
                },
                last_check: *last_check,
            },
            // Progress for a file we are not downloading is stale; ignore.
            other => other.clone(),
        },
        UpdateAction::FinishDownload { version } => UpdateState::UpdatingDb {
            download_version: version.clone(),
            last_check: state.last_check(),
        },
        UpdateAction::FinishPatch { version } => UpdateState::UpdatingDb {
            download_version: version.clone(),
            last_check: state.last_check(),
        },
        UpdateAction::Finish { check_date } => UpdateState::Idle {
            last_check: Some(*check_date),
        },
        UpdateAction::Error { check_date } => UpdateState::Idle {
            last_check: *check_date,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(patch: u32) -> DataVersion {
        DataVersion {
            major: 4,
            minor: 0,
            patch,
            database_version: None,
            date_of_creation: "2024-05-01".to_string(),
            lang: "en".to_string(),
        }
    }

    #[test]
    fn start_preserves_last_check() {
        let checked = Utc::now();
        let state = UpdateState::Idle {
            last_check: Some(checked),
        };
        let state = reduce(&state, &UpdateAction::Start);
        assert_eq!(
            state,
            UpdateState::Checking {
                last_check: Some(checked)
            }
        );
    }

    #[test]
    fn full_lifecycle() {
        let begun = Utc::now();
        let mut state = UpdateState::default();
        for action in [
            UpdateAction::Start,
            UpdateAction::StartDownload {
                version: version(0),
            },
            UpdateAction::Progress {
                loaded: 500,
                total: 1000,
            },
            UpdateAction::FinishDownload {
                version: version(0),
            },
            UpdateAction::FinishPatch {
                version: version(0),
            },
        ] {
            state = reduce(&state, &action);
        }
        assert_eq!(
            state,
            UpdateState::UpdatingDb {
                download_version: version(0),
                last_check: None
            }
        );

        state = reduce(&state, &UpdateAction::Finish { check_date: begun });
        assert_eq!(
            state,
            UpdateState::Idle {
                last_check: Some(begun)
            }
        );
    }

    #[test]
    fn progress_updates_ratio() {
        let state = reduce(
            &UpdateState::Downloading {
                download_version: version(1),
                progress: 0.0,
                last_check: None,
            },
            &UpdateAction::Progress {
                loaded: 250,
                total: 1000,
            },
        );
        match state {
            UpdateState::Downloading { progress, .. } => assert!((progress - 0.25).abs() < 1e-9),
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[test]
    fn progress_outside_download_is_ignored() {
        let state = UpdateState::Checking { last_check: None };
        let next = reduce(
            &state,
            &UpdateAction::Progress {
                loaded: 1,
                total: 2,
            },
        );
        assert_eq!(next, state);
    }

    #[test]
    fn error_without_commit_clears_last_check() {
        let state = UpdateState::Downloading {
            download_version: version(0),
            progress: 0.5,
            last_check: Some(Utc::now()),
        };
        let next = reduce(&state, &UpdateAction::Error { check_date: None });
        assert_eq!(next, UpdateState::Idle { last_check: None });
    }

    #[test]
    fn error_after_commit_keeps_check_date() {
        let begun = Utc::now();
        let state = UpdateState::Downloading {
            download_version: version(1),
            progress: 0.1,
            last_check: None,
        };
        let next = reduce(
            &state,
            &UpdateAction::Error {
                check_date: Some(begun),
            },
        );
        assert_eq!(
            next,
            UpdateState::Idle {
                last_check: Some(begun)
            }
        );
    }
}
