//! Retry controller around facade updates
//!
//! Coalesces overlapping update requests, parks while offline, retries
//! network-class failures with randomized exponential backoff, and gives
//! write-conflict failures a bounded number of immediate retries.
//! Outcomes are surfaced through an event callback so consumers can show
//! retry counts and the next scheduled attempt.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::config::RetryConfig;
use crate::core::series::SeriesSet;
use crate::core::version::VersionNumber;
use crate::database::{Database, UpdateOptions};
use crate::error::UpdateError;

/// Can the network plausibly be reached right now? The default says yes;
/// embedders with real connectivity signals plug their own probe in and
/// call [`UpdateWithRetry::notify_online`] when connectivity returns.
pub trait ReachabilityProbe: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Probe that never reports offline.
pub struct AlwaysOnline;

impl ReachabilityProbe for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Events surfaced to the embedder.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    UpdateComplete,
    UpdateError {
        error: UpdateError,
        /// Retries already performed when this error was raised.
        retry_count: Option<u32>,
        /// When the next attempt is scheduled, if one is.
        next_retry: Option<DateTime<Utc>>,
    },
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryState {
    Idle,
    Running,
    WaitingForOnline,
    WaitingForRetry { backoff: bool },
}

/// Backoff delay for attempt `n` (1-based): uniform in the initial window
/// scaled by 2^(n-1), capped.
pub fn retry_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    let min = config
        .initial_backoff_min_ms
        .saturating_mul(factor)
        .min(config.max_backoff_ms);
    let max = config
        .initial_backoff_max_ms
        .saturating_mul(factor)
        .min(config.max_backoff_ms);
    let millis = rand::thread_rng().gen_range(min..=max.max(min));
    Duration::from_millis(millis)
}

pub struct UpdateWithRetry {
    db: Database,
    config: RetryConfig,
    probe: Arc<dyn ReachabilityProbe>,
    on_event: Box<dyn Fn(RetryEvent) + Send + Sync>,
    state: Mutex<RetryState>,
    cancel: Mutex<CancellationToken>,
    online: Notify,
    force: Notify,
}

impl UpdateWithRetry {
    pub fn new(
        db: Database,
        config: RetryConfig,
        on_event: impl Fn(RetryEvent) + Send + Sync + 'static,
    ) -> Self {
        UpdateWithRetry {
            db,
            config,
            probe: Arc::new(AlwaysOnline),
            on_event: Box::new(on_event),
            state: Mutex::new(RetryState::Idle),
            cancel: Mutex::new(CancellationToken::new()),
            online: Notify::new(),
            force: Notify::new(),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn ReachabilityProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Signal that network connectivity returned; wakes an offline wait.
    pub fn notify_online(&self) {
        self.online.notify_waiters();
    }

    /// Request an update. Calls made while a run is active coalesce into
    /// it and return immediately; `force` additionally pulls a scheduled
    /// backoff retry forward to now (it never interrupts a running
    /// attempt, an offline wait, or an immediate conflict retry).
    pub async fn update(&self, options: UpdateOptions, force: bool) -> Result<(), UpdateError> {
        {
            let mut state = self.state.lock();
            match *state {
                RetryState::Idle => *state = RetryState::Running,
                RetryState::WaitingForRetry { backoff: true } if force => {
                    self.force.notify_waiters();
                    return Ok(());
                }
                _ => return Ok(()),
            }
        }
        self.run(options).await
    }

    /// Cancel the run, including any in-flight applier.
    pub async fn cancel(&self) {
        let token = {
            let mut cancel = self.cancel.lock();
            let token = cancel.clone();
            *cancel = CancellationToken::new();
            token
        };
        token.cancel();
        self.db.cancel_update(None).await;
        *self.state.lock() = RetryState::Idle;
    }

    fn set_state(&self, state: RetryState) {
        *self.state.lock() = state;
    }

    async fn run(&self, options: UpdateOptions) -> Result<(), UpdateError> {
        let cancel = self.cancel.lock().clone();
        let mut attempt: u32 = 0;
        let mut constraint_retries: u32 = 0;
        let series = options
            .series
            .unwrap_or_else(SeriesSet::kanji_group)
            .with_implied_series();

        loop {
            if !self.probe.is_online() {
                self.wait_for_online(&cancel).await?;
            }

            self.set_state(RetryState::Running);
            let before = self.applied_versions(series).await;
            let result = self.db.update(options.clone()).await;
            // Any durably committed file resets the backoff ladder, even
            // when the run as a whole failed.
            if attempt > 0 && self.applied_versions(series).await != before {
                attempt = 0;
            }

            match result {
                Ok(()) => {
                    self.set_state(RetryState::Idle);
                    (self.on_event)(RetryEvent::UpdateComplete);
                    return Ok(());
                }
                Err(error) if error.is_abort() => {
                    self.set_state(RetryState::Idle);
                    return Err(error);
                }
                Err(UpdateError::Offline) => {
                    (self.on_event)(RetryEvent::UpdateError {
                        error: UpdateError::Offline,
                        retry_count: None,
                        next_retry: None,
                    });
                    self.wait_for_online(&cancel).await?;
                }
                Err(error)
                    if error.is_constraint()
                        && constraint_retries < self.config.max_constraint_retries =>
                {
                    // A conflicting write raced us; try again as soon as
                    // the scheduler lets go of the current tick.
                    constraint_retries += 1;
                    debug!(retry = constraint_retries, "write conflict, retrying");
                    self.set_state(RetryState::WaitingForRetry { backoff: false });
                    tokio::task::yield_now().await;
                }
                // A constraint failure that survived its bounded retries is
                // terminal; only network-class errors reach the backoff arm.
                Err(error) if error.is_retriable() && !error.is_constraint() => {
                    attempt += 1;
                    let delay = retry_delay(&self.config, attempt);
                    let next_retry =
                        Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
                    info!(
                        %error,
                        retry_count = attempt - 1,
                        delay_ms = delay.as_millis() as u64,
                        "update failed, backing off"
                    );
                    (self.on_event)(RetryEvent::UpdateError {
                        error,
                        retry_count: Some(attempt - 1),
                        next_retry: Some(next_retry),
                    });
                    self.set_state(RetryState::WaitingForRetry { backoff: true });
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            self.set_state(RetryState::Idle);
                            return Err(UpdateError::Aborted);
                        }
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.force.notified() => {
                            debug!("scheduled retry pulled forward");
                        }
                    }
                }
                Err(error) => {
                    self.set_state(RetryState::Idle);
                    (self.on_event)(RetryEvent::UpdateError {
                        error: error.clone(),
                        retry_count: None,
                        next_retry: None,
                    });
                    return Err(error);
                }
            }
        }
    }

    async fn applied_versions(&self, series: SeriesSet) -> Vec<Option<VersionNumber>> {
        let mut versions = Vec::new();
        for series in series.iter() {
            versions.push(
                self.db
                    .get_data_version(series)
                    .await
                    .ok()
                    .flatten()
                    .map(|version| version.version_number()),
            );
        }
        versions
    }

    async fn wait_for_online(&self, cancel: &CancellationToken) -> Result<(), UpdateError> {
        self.set_state(RetryState::WaitingForOnline);
        (self.on_event)(RetryEvent::Offline);
        tokio::select! {
            _ = cancel.cancelled() => {
                self.set_state(RetryState::Idle);
                Err(UpdateError::Aborted)
            }
            _ = self.online.notified() => Ok(()),
        }
    }
}
