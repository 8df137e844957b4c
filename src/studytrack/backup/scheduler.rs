//! # Daily Backup Scheduling
//!
//! Two drivers produce the once-a-day snapshot:
//!
//! 1. An external time-triggered job (cron `30 18 * * *` UTC, midnight in
//!    the reference timezone) calling [`run_daily_backup_once`].
//! 2. [`DailyBackupScheduler`], a self-rescheduling tokio task for
//!    long-running processes: sleep until the next 18:30 UTC, fire, sleep
//!    until the next day. A failed attempt is retried after an hour instead
//!    of ending the chain.
//!
//! Both funnel into [`BackupService::create_daily_backup_if_needed`], which
//! owns the actual dedup, so the two drivers coexisting is harmless.
//!
//! The scheduler is an explicit handle with a [`stop`](DailyBackupScheduler::stop)
//! contract; whoever starts it owns it. Dropping the handle also ends the
//! task at its next wakeup.

use chrono::{DateTime, Duration as CalendarDuration, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::BackupService;
use crate::error::Result;
use crate::store::DocumentStore;

/// 18:30 UTC == 00:00 in the reference timezone (UTC+05:30).
pub const DAILY_RUN_HOUR_UTC: u32 = 18;
pub const DAILY_RUN_MINUTE_UTC: u32 = 30;

/// Backoff before re-attempting a failed scheduled backup.
pub const RETRY_DELAY: Duration = Duration::from_secs(60 * 60);

/// The next 18:30 UTC instant strictly after `now`.
pub fn next_daily_run(now: DateTime<Utc>) -> DateTime<Utc> {
    let candidate = now
        .date_naive()
        .and_hms_opt(DAILY_RUN_HOUR_UTC, DAILY_RUN_MINUTE_UTC, 0)
        .expect("18:30:00 is a valid time of day")
        .and_utc();
    if candidate > now {
        candidate
    } else {
        candidate + CalendarDuration::days(1)
    }
}

pub fn duration_until_next_run(now: DateTime<Utc>) -> Duration {
    (next_daily_run(now) - now).to_std().unwrap_or(Duration::ZERO)
}

/// One scheduled-job invocation: load the live dataset, take the daily
/// backup if it is still missing. This is what a server-side cron trigger
/// should call.
pub async fn run_daily_backup_once<S: DocumentStore + 'static>(
    service: &BackupService<S>,
) -> Result<Option<String>> {
    let data = service.current_user_data().await?;
    service.create_daily_backup_if_needed(&data).await
}

/// Handle to the in-process daily backup loop.
pub struct DailyBackupScheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl DailyBackupScheduler {
    /// Spawn the loop on the current tokio runtime.
    pub fn start<S: DocumentStore + 'static>(service: BackupService<S>) -> Self {
        let (shutdown, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            loop {
                let wait = duration_until_next_run(Utc::now());
                info!(minutes = wait.as_secs() / 60, "next daily backup scheduled");
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = rx.changed() => break,
                }

                // Keep retrying the day's attempt until it resolves; the
                // name dedup makes repeat attempts idempotent.
                loop {
                    match run_daily_backup_once(&service).await {
                        Ok(Some(id)) => {
                            info!(id = %id, "scheduled daily backup created");
                            break;
                        }
                        Ok(None) => {
                            info!("daily backup not needed");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "scheduled daily backup failed, retrying in an hour");
                            tokio::select! {
                                _ = tokio::time::sleep(RETRY_DELAY) => {}
                                _ = rx.changed() => return,
                            }
                        }
                    }
                }
            }
        });
        Self { shutdown, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// End the schedule. Signals the task, then aborts whatever sleep it is
    /// parked in.
    pub fn stop(self) {
        let _ = self.shutdown.send(true);
        self.handle.abort();
    }
}
