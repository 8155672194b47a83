//! Periodic and on-demand sync triggering
//!
//! [`SyncTrigger`] owns the interval loop the server runs in the background
//! and the on-demand entry point used by `POST /api/sync` and the CLI. Both
//! paths call [`SyncJob::run`], so overlapping runs resolve through the
//! store lease.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{info, warn};

use crate::error::Result;

use super::job::{SyncJob, SyncOutcome};

// ============================================================================
// Trigger Events
// ============================================================================

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Interval,
    Manual,
}

/// Events emitted after each run
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Finished {
        source: TriggerSource,
        outcome: SyncOutcome,
        at: DateTime<Utc>,
    },
    Failed {
        source: TriggerSource,
        error: String,
        at: DateTime<Utc>,
    },
}

/// Trigger status for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct TriggerStatus {
    pub is_running: bool,
    pub interval_secs: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct LastRun {
    at: Option<DateTime<Utc>>,
    error: Option<String>,
}

// ============================================================================
// Sync Trigger
// ============================================================================

pub struct SyncTrigger {
    job: Arc<SyncJob>,
    interval: Duration,
    event_sender: broadcast::Sender<SyncEvent>,
    stop_sender: watch::Sender<bool>,
    is_running: Arc<RwLock<bool>>,
    last_run: RwLock<LastRun>,
}

impl SyncTrigger {
    pub fn new(job: Arc<SyncJob>, interval: Duration) -> Self {
        let (event_sender, _) = broadcast::channel(16);
        let (stop_sender, _) = watch::channel(false);

        Self {
            job,
            interval,
            event_sender,
            stop_sender,
            is_running: Arc::new(RwLock::new(false)),
            last_run: RwLock::new(LastRun::default()),
        }
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_sender.subscribe()
    }

    /// Run the sync now
    pub async fn trigger_now(&self) -> Result<SyncOutcome> {
        self.run_once(TriggerSource::Manual).await
    }

    /// Run on the configured interval until [`stop`](Self::stop) is called.
    ///
    /// The first run happens immediately. Failed runs are logged and the
    /// loop keeps going.
    pub async fn start(&self) {
        self.stop_sender.send_replace(false);
        let mut stop = self.stop_sender.subscribe();
        *self.is_running.write().await = true;
        info!(interval_secs = self.interval.as_secs(), "CRM sync trigger started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Errors are already recorded in last_run
                    let _ = self.run_once(TriggerSource::Interval).await;
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        *self.is_running.write().await = false;
        info!("CRM sync trigger stopped");
    }

    /// Stop the interval loop
    pub fn stop(&self) {
        self.stop_sender.send_replace(true);
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub async fn status(&self) -> TriggerStatus {
        let last = self.last_run.read().await;
        TriggerStatus {
            is_running: *self.is_running.read().await,
            interval_secs: self.interval.as_secs(),
            last_run_at: last.at,
            last_error: last.error.clone(),
        }
    }

    async fn run_once(&self, source: TriggerSource) -> Result<SyncOutcome> {
        let result = self.job.run().await;
        let at = Utc::now();

        let mut last = self.last_run.write().await;
        last.at = Some(at);
        let event = match &result {
            Ok(outcome) => {
                last.error = None;
                SyncEvent::Finished {
                    source,
                    outcome: outcome.clone(),
                    at,
                }
            }
            Err(e) => {
                warn!(?source, error = %e, "CRM sync run failed");
                last.error = Some(e.to_string());
                SyncEvent::Failed {
                    source,
                    error: e.to_string(),
                    at,
                }
            }
        };
        drop(last);

        let _ = self.event_sender.send(event);
        result
    }
}

impl std::fmt::Debug for SyncTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncTrigger")
            .field("job", &self.job)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
