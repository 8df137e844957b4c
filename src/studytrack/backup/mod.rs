//! # Backup Layer
//!
//! Durable snapshot lifecycle for the tracked dataset. A [`Backup`] is an
//! immutable full copy of the dataset (subjects plus dismissed-revision
//! keys) with a descriptive name, written as its own document under the
//! user's `backups` collection. Backups are never mutated after creation;
//! they only go away through [`BackupService::delete_backup`] or retention
//! cleanup.
//!
//! ## Snapshot kinds
//!
//! - **daily**: at most one per calendar day in the reference timezone
//!   (UTC+05:30), deduplicated by scanning recent history for the rendered
//!   `"Daily snapshot <day>"` name.
//! - **safety**: taken automatically right before a restore or import, so a
//!   destructive operation never discards data that was not first persisted
//!   somewhere recoverable. If the safety snapshot cannot be written, the
//!   restore/import is abandoned.
//! - **change**: taken best-effort before ordinary mutations; failures are
//!   logged and swallowed so the primary operation is unaffected.
//! - **manual** / **auto**: user-invoked checkpoints.
//!
//! ## Daily dedup under concurrency
//!
//! Two callers racing to create the same day's backup within one process are
//! collapsed through a per-day registry of shared in-flight futures owned by
//! the service instance: the second caller awaits the first caller's future
//! and receives the same result. Across processes there is no lock; the
//! name-scan dedup is best effort there.
//!
//! Backup ids are `backup_<epoch-millis>` and assumed unique at millisecond
//! granularity. Concurrent creations inside the same millisecond would
//! collide; the single-logical-writer model makes this a known weakness
//! rather than a handled case.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{Result, TrackerError};
use crate::model::{Subject, UserData};
use crate::store::{backup_doc_path, backups_collection_path, user_doc_path, DocumentStore, OrderDirection};

pub mod name;
pub mod scheduler;

pub use name::{backup_name, sanitize, BackupContext, BackupType, PaperRef};

/// How many history entries list and dedup scans look at by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// The fixed reference offset (UTC+05:30) used to decide which calendar day
/// a daily backup belongs to, regardless of where the process runs.
const REFERENCE_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Serialize timestamps the way the dataset stores them: RFC 3339 with fixed
/// millisecond precision, so the strings sort lexicographically in timestamp
/// order.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

mod iso_millis_opt {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        dt: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => serializer.serialize_some(&dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
        }
    }
}

/// The snapshotted dataset inside a backup record. Both fields are optional
/// on the wire so imported payloads can carry only one of them; backups
/// created by this crate always carry both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subjects: Option<Vec<Subject>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dismissed_revisions: Option<Vec<String>>,
}

impl BackupData {
    fn snapshot(data: &UserData) -> Self {
        let mut dismissed: Vec<String> = data.dismissed_revisions.iter().cloned().collect();
        dismissed.sort();
        Self {
            subjects: Some(data.subjects.clone()),
            dismissed_revisions: Some(dismissed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub subject_count: usize,
    pub total_chapters: usize,
    pub total_study_sessions: usize,
}

/// One stored snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub id: String,
    pub name: String,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub backup_type: BackupType,
    pub action: String,
    #[serde(default)]
    pub target: Option<String>,
    pub description: String,
    pub data: BackupData,
    pub metadata: BackupMetadata,
    #[serde(default, with = "iso_millis_opt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Which calendar day `now` falls on in the reference timezone.
pub fn reference_day(now: DateTime<Utc>) -> NaiveDate {
    let offset = FixedOffset::east_opt(REFERENCE_OFFSET_SECS).expect("fixed offset is in range");
    now.with_timezone(&offset).date_naive()
}

pub fn today_in_reference_tz() -> NaiveDate {
    reference_day(Utc::now())
}

type DailyOutcome = std::result::Result<Option<String>, String>;
type SharedDaily = Shared<BoxFuture<'static, DailyOutcome>>;

/// Snapshot lifecycle over a [`DocumentStore`].
///
/// Cheap to clone; clones share the store handle and the daily in-flight
/// registry.
pub struct BackupService<S> {
    store: Arc<S>,
    user_id: String,
    in_flight: Arc<Mutex<HashMap<String, SharedDaily>>>,
}

impl<S> Clone for BackupService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            user_id: self.user_id.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<S: DocumentStore + 'static> BackupService<S> {
    pub fn new(store: Arc<S>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Write a new snapshot of `data` and return its id.
    ///
    /// The dataset is copied into the record, so later mutation of the live
    /// dataset cannot reach into an already-written backup.
    pub async fn create_backup(&self, data: &UserData, context: BackupContext) -> Result<String> {
        let timestamp = Utc::now();
        let backup_id = format!("backup_{}", timestamp.timestamp_millis());
        let backup_name = name::backup_name(&context, timestamp);

        let record = Backup {
            id: backup_id.clone(),
            name: backup_name.clone(),
            timestamp,
            backup_type: context.backup_type,
            action: context.action.clone(),
            target: context.target.clone(),
            description: context.description.clone().unwrap_or_else(|| backup_name.clone()),
            data: BackupData::snapshot(data),
            metadata: BackupMetadata {
                subject_count: data.subject_count(),
                total_chapters: data.total_chapters(),
                total_study_sessions: data.total_study_sessions(),
            },
            created_at: Some(timestamp),
        };

        let path = backup_doc_path(&self.user_id, &backup_id);
        self.store.set(&path, serde_json::to_value(&record)?, false).await?;
        info!(id = %backup_id, name = %backup_name, "backup created");
        Ok(backup_id)
    }

    /// Most recent backups first, up to `limit`. Documents that no longer
    /// deserialize are skipped rather than failing the whole listing.
    pub async fn backup_history(&self, limit: usize) -> Result<Vec<Backup>> {
        let docs = self
            .store
            .list_ordered(
                &backups_collection_path(&self.user_id),
                "timestamp",
                OrderDirection::Descending,
                limit,
            )
            .await?;

        let mut backups = Vec::with_capacity(docs.len());
        for doc in docs {
            match serde_json::from_value::<Backup>(doc) {
                Ok(backup) => backups.push(backup),
                Err(e) => warn!(error = %e, "skipping malformed backup document"),
            }
        }
        Ok(backups)
    }

    pub async fn backup(&self, backup_id: &str) -> Result<Backup> {
        let doc = self
            .store
            .get(&backup_doc_path(&self.user_id, backup_id))
            .await?
            .ok_or_else(|| TrackerError::BackupNotFound(backup_id.to_string()))?;
        Ok(serde_json::from_value(doc)?)
    }

    /// Permanently remove one backup. There is no undo.
    pub async fn delete_backup(&self, backup_id: &str) -> Result<()> {
        self.store
            .delete(&backup_doc_path(&self.user_id, backup_id))
            .await?;
        info!(id = %backup_id, "backup deleted");
        Ok(())
    }

    /// Keep the `keep_count` most recent backups, delete the rest. Fetches
    /// the whole history up front so the retention decision is made against
    /// a single consistent ordering.
    pub async fn cleanup_old_backups(&self, keep_count: usize) -> Result<usize> {
        let all = self.backup_history(usize::MAX).await?;
        if all.len() <= keep_count {
            return Ok(0);
        }

        let mut deleted = 0;
        for backup in &all[keep_count..] {
            self.delete_backup(&backup.id).await?;
            deleted += 1;
        }
        info!(deleted, kept = keep_count, "old backups pruned");
        Ok(deleted)
    }

    /// The live dataset as currently persisted; a missing document is an
    /// empty dataset.
    pub async fn current_user_data(&self) -> Result<UserData> {
        match self.store.get(&user_doc_path(&self.user_id)).await? {
            Some(doc) => Ok(serde_json::from_value(doc)?),
            None => Ok(UserData::default()),
        }
    }

    /// Restore the dataset from a stored backup.
    ///
    /// The current live dataset is snapshotted (`safety` / `pre-restore`)
    /// before anything is overwritten; if that snapshot cannot be written
    /// the restore does not happen. The restored payload is returned so the
    /// caller can refresh any in-memory copy.
    pub async fn restore_from_backup<FS, FutS, FD, FutD>(
        &self,
        backup_id: &str,
        save_subjects: FS,
        save_dismissed: FD,
    ) -> Result<BackupData>
    where
        FS: FnOnce(Vec<Subject>) -> FutS,
        FutS: Future<Output = Result<()>>,
        FD: FnOnce(HashSet<String>) -> FutD,
        FutD: Future<Output = Result<()>>,
    {
        let backup = self.backup(backup_id).await?;

        let current = self.current_user_data().await?;
        self.create_backup(&current, BackupContext::safety_pre_restore(&backup.name))
            .await?;

        if let Some(subjects) = backup.data.subjects.clone() {
            save_subjects(subjects).await?;
        }
        if let Some(dismissed) = backup.data.dismissed_revisions.clone() {
            save_dismissed(dismissed.into_iter().collect()).await?;
        }

        info!(id = %backup_id, name = %backup.name, "dataset restored from backup");
        Ok(backup.data)
    }

    /// Parse and apply an exported backup. The payload must carry a `data`
    /// object with `subjects` and/or `dismissedRevisions`; anything else is
    /// rejected before any write happens. A `safety` / `pre-import` snapshot
    /// of the current dataset is taken first, same contract as restore.
    pub async fn import_from_json<FS, FutS, FD, FutD>(
        &self,
        json: &str,
        save_subjects: FS,
        save_dismissed: FD,
    ) -> Result<BackupData>
    where
        FS: FnOnce(Vec<Subject>) -> FutS,
        FutS: Future<Output = Result<()>>,
        FD: FnOnce(HashSet<String>) -> FutD,
        FutD: Future<Output = Result<()>>,
    {
        let payload: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| TrackerError::InvalidFormat(format!("not valid JSON: {}", e)))?;
        let data_value = payload
            .get("data")
            .cloned()
            .ok_or_else(|| TrackerError::InvalidFormat("missing data object".to_string()))?;
        let data: BackupData = serde_json::from_value(data_value)
            .map_err(|e| TrackerError::InvalidFormat(e.to_string()))?;
        if data.subjects.is_none() && data.dismissed_revisions.is_none() {
            return Err(TrackerError::InvalidFormat(
                "data must contain subjects or dismissedRevisions".to_string(),
            ));
        }

        let current = self.current_user_data().await?;
        self.create_backup(&current, BackupContext::safety_pre_import())
            .await?;

        if let Some(subjects) = data.subjects.clone() {
            save_subjects(subjects).await?;
        }
        if let Some(dismissed) = data.dismissed_revisions.clone() {
            save_dismissed(dismissed.into_iter().collect()).await?;
        }

        info!("dataset imported from JSON");
        Ok(data)
    }

    /// Serialize the full backup record (not just its `data`) for download.
    pub async fn export_backup_as_json(&self, backup_id: &str) -> Result<String> {
        let backup = self.backup(backup_id).await?;
        Ok(serde_json::to_string_pretty(&backup)?)
    }

    /// Create today's daily backup unless one already exists.
    ///
    /// "Today" is the reference-timezone day. Returns the new backup id, or
    /// `None` when a backup for the day is already in history or the dataset
    /// has no subjects yet.
    pub async fn create_daily_backup_if_needed(&self, data: &UserData) -> Result<Option<String>> {
        self.create_daily_backup_for_day(today_in_reference_tz(), data).await
    }

    /// Same as [`Self::create_daily_backup_if_needed`] with the business day
    /// pinned by the caller.
    ///
    /// Concurrent calls for the same day within this service (and its
    /// clones) share one in-flight creation: the second caller awaits the
    /// first caller's future and gets the same outcome.
    pub async fn create_daily_backup_for_day(
        &self,
        day: NaiveDate,
        data: &UserData,
    ) -> Result<Option<String>> {
        let key = day.to_string();

        let shared = {
            let mut in_flight = self.in_flight.lock().expect("in-flight registry poisoned");
            match in_flight.get(&key) {
                Some(existing) => {
                    debug!(day = %key, "daily backup already in flight, awaiting it");
                    existing.clone()
                }
                None => {
                    let service = self.clone();
                    let snapshot = data.clone();
                    let registry_key = key.clone();
                    let fut: SharedDaily = async move {
                        let outcome = service
                            .daily_backup_once(day, &snapshot)
                            .await
                            .map_err(|e| e.to_string());
                        service
                            .in_flight
                            .lock()
                            .expect("in-flight registry poisoned")
                            .remove(&registry_key);
                        outcome
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key, fut.clone());
                    fut
                }
            }
        };

        shared.await.map_err(TrackerError::Store)
    }

    async fn daily_backup_once(&self, day: NaiveDate, data: &UserData) -> Result<Option<String>> {
        // Dedup on the rendered name, not the creation timestamp: a job
        // firing near the day boundary must match the intended business day.
        let needle = format!("Daily snapshot {}", day);
        let recent = self.backup_history(DEFAULT_HISTORY_LIMIT).await?;
        if recent
            .iter()
            .any(|b| b.backup_type == BackupType::Daily && b.name.contains(&needle))
        {
            debug!(day = %day, "daily backup already exists");
            return Ok(None);
        }

        if data.subjects.is_empty() {
            debug!("no subjects, skipping daily backup");
            return Ok(None);
        }

        let id = self.create_backup(data, BackupContext::daily(day)).await?;
        Ok(Some(id))
    }
}
