//! # Tracker Facade
//!
//! [`StudyTracker`] is the entry point collaborators (CLI, web, scheduled
//! jobs) use to work with the dataset. It owns the in-memory [`UserData`],
//! persists through the [`DocumentStore`] collaborator, and wires the backup
//! layer into every mutation:
//!
//! 1. a best-effort `change` snapshot of the pre-mutation state,
//! 2. the mutation itself,
//! 3. persist,
//! 4. a best-effort daily-backup check.
//!
//! Steps 1 and 4 log and continue on failure; a backup problem never turns
//! into a failed save. Restore and import are different: there the safety
//! snapshot is the whole point, so those propagate errors (see
//! [`crate::backup`]).
//!
//! ## Revision bookkeeping
//!
//! Creating a study session derives the initial four revisions from its
//! study date. Toggling the *last* revision in the list from open to
//! complete appends one maintenance revision 30 days after it, which keeps
//! the chain alive for as long as the user keeps finishing it.
//! `last_revision_completed` records the index most recently toggled in
//! either direction, which is what downstream sorting keys off.

use chrono::{NaiveDate, SecondsFormat, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::backup::{BackupContext, BackupService, PaperRef};
use crate::error::{Result, TrackerError};
use crate::model::{
    dismissal_key, Chapter, ExamSession, PaperNumber, PastPaper, RevisionCycle, StudySession,
    Subject, UserData,
};
use crate::revision;
use crate::store::{user_doc_path, DocumentStore};

/// Persist the subjects list onto the live document, leaving other keys
/// untouched. Also the shape expected by the restore/import callbacks.
pub async fn persist_subjects<S: DocumentStore>(
    store: &S,
    user_id: &str,
    subjects: &[Subject],
) -> Result<()> {
    let value = serde_json::json!({
        "subjects": subjects,
        "lastUpdated": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    });
    store.set(&user_doc_path(user_id), value, true).await
}

/// Persist the dismissed-revision set as an array of keys.
pub async fn persist_dismissed_revisions<S: DocumentStore>(
    store: &S,
    user_id: &str,
    dismissed: &HashSet<String>,
) -> Result<()> {
    let mut keys: Vec<&String> = dismissed.iter().collect();
    keys.sort();
    let value = serde_json::json!({
        "dismissedRevisions": keys,
        "lastUpdated": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    });
    store.set(&user_doc_path(user_id), value, true).await
}

/// One revision that currently wants attention.
#[derive(Debug, Clone, PartialEq)]
pub struct DueRevision {
    pub subject_id: i64,
    pub subject_name: String,
    pub session_id: i64,
    pub chapter_name: String,
    pub revision_index: usize,
    pub date: NaiveDate,
    pub cycle: RevisionCycle,
}

pub struct StudyTracker<S: DocumentStore + 'static> {
    store: Arc<S>,
    backups: BackupService<S>,
    user_id: String,
    data: UserData,
    last_id: i64,
}

impl<S: DocumentStore + 'static> StudyTracker<S> {
    /// Load the tracker for a user; a missing document means a fresh,
    /// empty dataset.
    pub async fn load(store: Arc<S>, user_id: impl Into<String>) -> Result<Self> {
        let user_id = user_id.into();
        let backups = BackupService::new(Arc::clone(&store), user_id.clone());
        let data = backups.current_user_data().await?;
        Ok(Self {
            store,
            backups,
            user_id,
            data,
            last_id: 0,
        })
    }

    pub fn data(&self) -> &UserData {
        &self.data
    }

    pub fn backups(&self) -> &BackupService<S> {
        &self.backups
    }

    pub fn subject(&self, subject_id: i64) -> Option<&Subject> {
        self.data.subjects.iter().find(|s| s.id == subject_id)
    }

    /// Entity ids are creation timestamps in epoch millis, bumped when two
    /// creations land inside the same millisecond so ids stay monotonic.
    fn next_id(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.last_id = if now > self.last_id { now } else { self.last_id + 1 };
        self.last_id
    }

    fn subject_name(&self, subject_id: i64) -> Result<String> {
        self.subject(subject_id)
            .map(|s| s.name.clone())
            .ok_or(TrackerError::SubjectNotFound(subject_id))
    }

    fn subject_mut(&mut self, subject_id: i64) -> Result<&mut Subject> {
        self.data
            .subjects
            .iter_mut()
            .find(|s| s.id == subject_id)
            .ok_or(TrackerError::SubjectNotFound(subject_id))
    }

    fn session_mut(&mut self, subject_id: i64, session_id: i64) -> Result<&mut StudySession> {
        self.subject_mut(subject_id)?
            .study_sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or(TrackerError::SessionNotFound(session_id))
    }

    fn session_ref(&self, subject_id: i64, session_id: i64) -> Result<&StudySession> {
        self.subject(subject_id)
            .ok_or(TrackerError::SubjectNotFound(subject_id))?
            .study_sessions
            .iter()
            .find(|s| s.id == session_id)
            .ok_or(TrackerError::SessionNotFound(session_id))
    }

    /// Pre-mutation snapshot. Never blocks the mutation: failures are
    /// logged and swallowed.
    async fn change_backup(&self, context: BackupContext) {
        if let Err(e) = self.backups.create_backup(&self.data, context).await {
            warn!(error = %e, "change backup failed, continuing");
        }
    }

    async fn maybe_daily_backup(&self) {
        if let Err(e) = self.backups.create_daily_backup_if_needed(&self.data).await {
            warn!(error = %e, "daily backup check failed");
        }
    }

    async fn persist_subjects(&self) -> Result<()> {
        persist_subjects(self.store.as_ref(), &self.user_id, &self.data.subjects).await?;
        self.maybe_daily_backup().await;
        Ok(())
    }

    async fn persist_dismissed(&self) -> Result<()> {
        persist_dismissed_revisions(self.store.as_ref(), &self.user_id, &self.data.dismissed_revisions)
            .await?;
        self.maybe_daily_backup().await;
        Ok(())
    }

    // --- Subjects ---

    pub async fn add_subject(&mut self, name: &str) -> Result<i64> {
        self.change_backup(BackupContext::change("add-subject").with_target(name))
            .await;
        let id = self.next_id();
        self.data.subjects.push(Subject::new(id, name));
        self.persist_subjects().await?;
        Ok(id)
    }

    pub async fn delete_subject(&mut self, subject_id: i64) -> Result<()> {
        let name = self.subject_name(subject_id)?;
        self.change_backup(BackupContext::change("delete-subject").with_target(&name))
            .await;
        self.data.subjects.retain(|s| s.id != subject_id);
        self.persist_subjects().await
    }

    pub async fn rename_subject(&mut self, subject_id: i64, new_name: &str) -> Result<()> {
        let old_name = self.subject_name(subject_id)?;
        self.change_backup(
            BackupContext::change("rename-subject")
                .with_target(&old_name)
                .with_new_target(new_name),
        )
        .await;
        self.subject_mut(subject_id)?.name = new_name.to_string();
        self.persist_subjects().await
    }

    // --- Chapters ---

    pub async fn add_chapter(&mut self, subject_id: i64, name: &str) -> Result<i64> {
        let subject_name = self.subject_name(subject_id)?;
        self.change_backup(
            BackupContext::change("add-chapter")
                .with_target(name)
                .with_subject(&subject_name),
        )
        .await;
        let id = self.next_id();
        self.subject_mut(subject_id)?.chapters.push(Chapter {
            id,
            name: name.to_string(),
            topicals_completed: false,
        });
        self.persist_subjects().await?;
        Ok(id)
    }

    pub async fn delete_chapter(&mut self, subject_id: i64, chapter_id: i64) -> Result<()> {
        let subject_name = self.subject_name(subject_id)?;
        let chapter_name = self
            .subject(subject_id)
            .and_then(|s| s.chapters.iter().find(|c| c.id == chapter_id))
            .map(|c| c.name.clone())
            .ok_or(TrackerError::ChapterNotFound(chapter_id))?;
        self.change_backup(
            BackupContext::change("delete-chapter")
                .with_target(&chapter_name)
                .with_subject(&subject_name),
        )
        .await;
        // Study sessions referencing the chapter stay; they only carry the
        // name, not the id.
        self.subject_mut(subject_id)?
            .chapters
            .retain(|c| c.id != chapter_id);
        self.persist_subjects().await
    }

    pub async fn rename_chapter(
        &mut self,
        subject_id: i64,
        chapter_id: i64,
        new_name: &str,
    ) -> Result<()> {
        let subject_name = self.subject_name(subject_id)?;
        let old_name = self
            .subject(subject_id)
            .and_then(|s| s.chapters.iter().find(|c| c.id == chapter_id))
            .map(|c| c.name.clone())
            .ok_or(TrackerError::ChapterNotFound(chapter_id))?;
        self.change_backup(
            BackupContext::change("rename-chapter")
                .with_target(&old_name)
                .with_new_target(new_name)
                .with_subject(&subject_name),
        )
        .await;
        let subject = self.subject_mut(subject_id)?;
        if let Some(chapter) = subject.chapters.iter_mut().find(|c| c.id == chapter_id) {
            chapter.name = new_name.to_string();
        }
        self.persist_subjects().await
    }

    /// Apply a user-chosen chapter order. Ids not present in the subject are
    /// ignored; chapters missing from `ordered_ids` keep their relative
    /// order at the end.
    pub async fn reorder_chapters(&mut self, subject_id: i64, ordered_ids: &[i64]) -> Result<()> {
        let subject_name = self.subject_name(subject_id)?;
        self.change_backup(
            BackupContext::change("reorder-chapters").with_subject(&subject_name),
        )
        .await;
        let subject = self.subject_mut(subject_id)?;
        let mut reordered = Vec::with_capacity(subject.chapters.len());
        for id in ordered_ids {
            if let Some(pos) = subject.chapters.iter().position(|c| c.id == *id) {
                reordered.push(subject.chapters.remove(pos));
            }
        }
        reordered.append(&mut subject.chapters);
        subject.chapters = reordered;
        self.persist_subjects().await
    }

    pub async fn set_chapter_completion(
        &mut self,
        subject_id: i64,
        chapter_id: i64,
        completed: bool,
    ) -> Result<()> {
        let subject_name = self.subject_name(subject_id)?;
        let chapter_name = self
            .subject(subject_id)
            .and_then(|s| s.chapters.iter().find(|c| c.id == chapter_id))
            .map(|c| c.name.clone())
            .ok_or(TrackerError::ChapterNotFound(chapter_id))?;
        let action = if completed {
            "complete-chapter"
        } else {
            "incomplete-chapter"
        };
        self.change_backup(
            BackupContext::change(action)
                .with_target(&chapter_name)
                .with_subject(&subject_name),
        )
        .await;
        let subject = self.subject_mut(subject_id)?;
        if let Some(chapter) = subject.chapters.iter_mut().find(|c| c.id == chapter_id) {
            chapter.topicals_completed = completed;
        }
        self.persist_subjects().await
    }

    // --- Past papers ---

    pub async fn add_past_paper(
        &mut self,
        subject_id: i64,
        session: ExamSession,
        year: i32,
        paper_number: PaperNumber,
        score: f64,
        hard_chapters: &str,
    ) -> Result<i64> {
        let subject_name = self.subject_name(subject_id)?;
        self.change_backup(
            BackupContext::change("add-paper")
                .with_paper(PaperRef {
                    session: Some(session),
                    year: Some(year),
                    paper_number: Some(paper_number.clone()),
                })
                .with_subject(&subject_name),
        )
        .await;
        let id = self.next_id();
        self.subject_mut(subject_id)?.past_papers.push(PastPaper {
            id,
            session,
            year,
            paper_number,
            score,
            hard_chapters: hard_chapters.to_string(),
        });
        self.persist_subjects().await?;
        Ok(id)
    }

    pub async fn edit_past_paper(&mut self, subject_id: i64, paper: PastPaper) -> Result<()> {
        let subject_name = self.subject_name(subject_id)?;
        let exists = self
            .subject(subject_id)
            .is_some_and(|s| s.past_papers.iter().any(|p| p.id == paper.id));
        if !exists {
            return Err(TrackerError::PaperNotFound(paper.id));
        }
        self.change_backup(
            BackupContext::change("edit-paper")
                .with_paper(PaperRef {
                    session: Some(paper.session),
                    year: Some(paper.year),
                    paper_number: Some(paper.paper_number.clone()),
                })
                .with_subject(&subject_name),
        )
        .await;
        let subject = self.subject_mut(subject_id)?;
        if let Some(slot) = subject.past_papers.iter_mut().find(|p| p.id == paper.id) {
            *slot = paper;
        }
        self.persist_subjects().await
    }

    pub async fn delete_past_paper(&mut self, subject_id: i64, paper_id: i64) -> Result<()> {
        let subject_name = self.subject_name(subject_id)?;
        let paper = self
            .subject(subject_id)
            .and_then(|s| s.past_papers.iter().find(|p| p.id == paper_id))
            .cloned()
            .ok_or(TrackerError::PaperNotFound(paper_id))?;
        self.change_backup(
            BackupContext::change("delete-paper")
                .with_paper(PaperRef {
                    session: Some(paper.session),
                    year: Some(paper.year),
                    paper_number: Some(paper.paper_number.clone()),
                })
                .with_subject(&subject_name),
        )
        .await;
        self.subject_mut(subject_id)?
            .past_papers
            .retain(|p| p.id != paper_id);
        self.persist_subjects().await
    }

    // --- Study sessions & revisions ---

    /// Record a study session; the initial revision schedule is derived
    /// from the study date.
    pub async fn add_study_session(
        &mut self,
        subject_id: i64,
        chapter_name: &str,
        study_date: NaiveDate,
    ) -> Result<i64> {
        let subject_name = self.subject_name(subject_id)?;
        self.change_backup(
            BackupContext::change("add-study-session")
                .with_target(chapter_name)
                .with_date(study_date)
                .with_subject(&subject_name),
        )
        .await;
        let id = self.next_id();
        self.subject_mut(subject_id)?.study_sessions.push(StudySession {
            id,
            chapter_name: chapter_name.to_string(),
            study_date,
            revisions: revision::schedule_initial_revisions(study_date),
            last_revision_completed: -1,
        });
        self.persist_subjects().await?;
        Ok(id)
    }

    pub async fn delete_study_session(&mut self, subject_id: i64, session_id: i64) -> Result<()> {
        let subject_name = self.subject_name(subject_id)?;
        let session = self.session_ref(subject_id, session_id)?;
        let context = BackupContext::change("delete-study-session")
            .with_target(&session.chapter_name)
            .with_date(session.study_date)
            .with_subject(&subject_name);
        self.change_backup(context).await;
        self.subject_mut(subject_id)?
            .study_sessions
            .retain(|s| s.id != session_id);
        self.persist_subjects().await
    }

    /// Change a session's chapter label and/or study date. Moving the study
    /// date resets the schedule to a fresh set of initial revisions.
    pub async fn edit_study_session(
        &mut self,
        subject_id: i64,
        session_id: i64,
        chapter_name: Option<&str>,
        study_date: Option<NaiveDate>,
    ) -> Result<()> {
        let subject_name = self.subject_name(subject_id)?;
        let current = self.session_ref(subject_id, session_id)?;
        let context = BackupContext::change("edit-study-session")
            .with_target(&current.chapter_name)
            .with_subject(&subject_name);
        self.change_backup(context).await;

        let session = self.session_mut(subject_id, session_id)?;
        if let Some(name) = chapter_name {
            session.chapter_name = name.to_string();
        }
        if let Some(date) = study_date {
            if date != session.study_date {
                session.study_date = date;
                session.revisions = revision::schedule_initial_revisions(date);
                session.last_revision_completed = -1;
            }
        }
        self.persist_subjects().await
    }

    /// Flip one revision's completion state and return the new state.
    ///
    /// Completing the last revision in the list appends the next maintenance
    /// revision, dated 30 days after it. Un-completing never removes
    /// anything.
    pub async fn toggle_revision(
        &mut self,
        subject_id: i64,
        session_id: i64,
        index: usize,
    ) -> Result<bool> {
        let subject_name = self.subject_name(subject_id)?;
        let session = self.session_ref(subject_id, session_id)?;
        if index >= session.revisions.len() {
            return Err(TrackerError::RevisionOutOfRange {
                session: session_id,
                index,
            });
        }
        let was_completed = session.revisions[index].completed;
        let context = BackupContext::change(if was_completed {
            "reset-revision"
        } else {
            "complete-revision"
        })
        .with_target(&session.chapter_name)
        .with_cycle(session.revisions[index].cycle.label())
        .with_subject(&subject_name);
        self.change_backup(context).await;

        let session = self.session_mut(subject_id, session_id)?;
        session.revisions[index].completed = !was_completed;
        session.last_revision_completed = index as i32;

        let completed_tail = !was_completed && index + 1 == session.revisions.len();
        if completed_tail {
            let anchor = session.revisions[index].date;
            let next = revision::extend_with_maintenance(&session.revisions, anchor);
            session.revisions.push(next);
        }

        self.persist_subjects().await?;
        Ok(!was_completed)
    }

    // --- Dismissals ---

    pub fn is_dismissed(&self, session_id: i64, revision_index: usize) -> bool {
        self.data
            .dismissed_revisions
            .contains(&dismissal_key(session_id, revision_index))
    }

    /// Acknowledge one overdue notice without marking the work done.
    pub async fn dismiss_revision(
        &mut self,
        subject_id: i64,
        session_id: i64,
        revision_index: usize,
    ) -> Result<()> {
        let subject_name = self.subject_name(subject_id)?;
        self.session_ref(subject_id, session_id)?;
        self.change_backup(
            BackupContext::change("dismiss-overdue").with_subject(&subject_name),
        )
        .await;
        self.data
            .dismissed_revisions
            .insert(dismissal_key(session_id, revision_index));
        self.persist_dismissed().await
    }

    /// Acknowledge every currently-overdue notice. Returns how many new keys
    /// were added.
    pub async fn dismiss_all_overdue(&mut self, as_of: NaiveDate) -> Result<usize> {
        self.change_backup(BackupContext::change("dismiss-overdue")).await;
        let keys: Vec<String> = self
            .data
            .subjects
            .iter()
            .flat_map(|subject| subject.study_sessions.iter())
            .flat_map(|session| {
                session
                    .revisions
                    .iter()
                    .enumerate()
                    .filter(|(_, rev)| revision::is_overdue(rev, as_of))
                    .map(|(index, _)| dismissal_key(session.id, index))
            })
            .collect();

        let mut added = 0;
        for key in keys {
            if self.data.dismissed_revisions.insert(key) {
                added += 1;
            }
        }
        if added > 0 {
            self.persist_dismissed().await?;
        }
        Ok(added)
    }

    // --- Queries ---

    /// Overdue revisions whose notices have not been dismissed.
    pub fn overdue_revisions(&self, as_of: NaiveDate) -> Vec<DueRevision> {
        self.collect_revisions(|session, index, rev| {
            revision::is_overdue(rev, as_of)
                && !self
                    .data
                    .dismissed_revisions
                    .contains(&dismissal_key(session.id, index))
        })
    }

    /// Revisions landing exactly on `as_of`, dismissed or not.
    pub fn revisions_due_on(&self, as_of: NaiveDate) -> Vec<DueRevision> {
        self.collect_revisions(|_, _, rev| revision::is_due_today(rev, as_of))
    }

    fn collect_revisions<F>(&self, keep: F) -> Vec<DueRevision>
    where
        F: Fn(&StudySession, usize, &crate::model::Revision) -> bool,
    {
        let mut due = Vec::new();
        for subject in &self.data.subjects {
            for session in &subject.study_sessions {
                for (index, rev) in session.revisions.iter().enumerate() {
                    if keep(session, index, rev) {
                        due.push(DueRevision {
                            subject_id: subject.id,
                            subject_name: subject.name.clone(),
                            session_id: session.id,
                            chapter_name: session.chapter_name.clone(),
                            revision_index: index,
                            date: rev.date,
                            cycle: rev.cycle,
                        });
                    }
                }
            }
        }
        due.sort_by_key(|d| d.date);
        due
    }

    // --- Restore & import ---

    /// Restore the dataset from a backup and refresh the in-memory copy.
    pub async fn restore_from_backup(&mut self, backup_id: &str) -> Result<()> {
        let (store_s, uid_s) = (Arc::clone(&self.store), self.user_id.clone());
        let (store_d, uid_d) = (Arc::clone(&self.store), self.user_id.clone());
        let data = self
            .backups
            .restore_from_backup(
                backup_id,
                move |subjects| async move {
                    persist_subjects(store_s.as_ref(), &uid_s, &subjects).await
                },
                move |dismissed| async move {
                    persist_dismissed_revisions(store_d.as_ref(), &uid_d, &dismissed).await
                },
            )
            .await?;
        if let Some(subjects) = data.subjects {
            self.data.subjects = subjects;
        }
        if let Some(dismissed) = data.dismissed_revisions {
            self.data.dismissed_revisions = dismissed.into_iter().collect();
        }
        Ok(())
    }

    /// Import an exported backup file and refresh the in-memory copy.
    pub async fn import_from_json(&mut self, json: &str) -> Result<()> {
        let (store_s, uid_s) = (Arc::clone(&self.store), self.user_id.clone());
        let (store_d, uid_d) = (Arc::clone(&self.store), self.user_id.clone());
        let data = self
            .backups
            .import_from_json(
                json,
                move |subjects| async move {
                    persist_subjects(store_s.as_ref(), &uid_s, &subjects).await
                },
                move |dismissed| async move {
                    persist_dismissed_revisions(store_d.as_ref(), &uid_d, &dismissed).await
                },
            )
            .await?;
        if let Some(subjects) = data.subjects {
            self.data.subjects = subjects;
        }
        if let Some(dismissed) = data.dismissed_revisions {
            self.data.dismissed_revisions = dismissed.into_iter().collect();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupType;
    use crate::store::memory::InMemoryStore;
    use std::time::Duration;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    // A couple of milliseconds of store latency keeps successive backup ids
    // (millisecond-resolution) from colliding in fast tests.
    async fn tracker() -> StudyTracker<InMemoryStore> {
        let store = Arc::new(InMemoryStore::with_latency(Duration::from_millis(2)));
        StudyTracker::load(store, "default-user").await.unwrap()
    }

    #[tokio::test]
    async fn add_subject_persists_and_reloads() {
        let store = Arc::new(InMemoryStore::with_latency(Duration::from_millis(2)));
        let mut tracker = StudyTracker::load(Arc::clone(&store), "default-user")
            .await
            .unwrap();

        let id = tracker.add_subject("Chemistry").await.unwrap();
        tracker.add_chapter(id, "Moles").await.unwrap();

        let reloaded = StudyTracker::load(store, "default-user").await.unwrap();
        assert_eq!(reloaded.data(), tracker.data());
        assert_eq!(reloaded.data().subjects[0].chapters[0].name, "Moles");
    }

    #[tokio::test]
    async fn ids_are_monotonic() {
        let mut tracker = tracker().await;
        let a = tracker.add_subject("A").await.unwrap();
        let b = tracker.add_subject("B").await.unwrap();
        let c = tracker.add_subject("C").await.unwrap();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn study_session_gets_initial_schedule() {
        let mut tracker = tracker().await;
        let subject = tracker.add_subject("Math").await.unwrap();
        let session = tracker
            .add_study_session(subject, "Quadratics", date("2025-01-01"))
            .await
            .unwrap();

        let stored = tracker.session_ref(subject, session).unwrap();
        assert_eq!(stored.revisions.len(), 4);
        assert_eq!(stored.revisions[0].date, date("2025-01-04"));
        assert_eq!(stored.revisions[3].date, date("2025-01-31"));
        assert_eq!(stored.last_revision_completed, -1);
    }

    #[tokio::test]
    async fn completing_tail_appends_maintenance() {
        let mut tracker = tracker().await;
        let subject = tracker.add_subject("Math").await.unwrap();
        let session = tracker
            .add_study_session(subject, "Quadratics", date("2025-01-01"))
            .await
            .unwrap();

        let state = tracker.toggle_revision(subject, session, 3).await.unwrap();
        assert!(state);

        let stored = tracker.session_ref(subject, session).unwrap();
        assert_eq!(stored.revisions.len(), 5);
        assert_eq!(stored.revisions[4].id, "rev-4");
        assert_eq!(stored.revisions[4].date, date("2025-03-02"));
        assert_eq!(stored.revisions[4].cycle, RevisionCycle::Maintenance);
        assert_eq!(stored.last_revision_completed, 3);

        // Completing the new tail extends again.
        tracker.toggle_revision(subject, session, 4).await.unwrap();
        let stored = tracker.session_ref(subject, session).unwrap();
        assert_eq!(stored.revisions.len(), 6);
        assert_eq!(stored.revisions[5].date, date("2025-04-01"));
    }

    #[tokio::test]
    async fn non_tail_completion_does_not_extend() {
        let mut tracker = tracker().await;
        let subject = tracker.add_subject("Math").await.unwrap();
        let session = tracker
            .add_study_session(subject, "Quadratics", date("2025-01-01"))
            .await
            .unwrap();

        tracker.toggle_revision(subject, session, 1).await.unwrap();
        let stored = tracker.session_ref(subject, session).unwrap();
        assert_eq!(stored.revisions.len(), 4);
        assert_eq!(stored.last_revision_completed, 1);
    }

    #[tokio::test]
    async fn toggling_off_records_last_toggled_index() {
        let mut tracker = tracker().await;
        let subject = tracker.add_subject("Math").await.unwrap();
        let session = tracker
            .add_study_session(subject, "Quadratics", date("2025-01-01"))
            .await
            .unwrap();

        tracker.toggle_revision(subject, session, 2).await.unwrap();
        tracker.toggle_revision(subject, session, 1).await.unwrap();
        // Un-complete index 1; the field still tracks it as last toggled.
        let state = tracker.toggle_revision(subject, session, 1).await.unwrap();
        assert!(!state);

        let stored = tracker.session_ref(subject, session).unwrap();
        assert_eq!(stored.last_revision_completed, 1);
        assert!(stored.revisions[2].completed);
        assert!(!stored.revisions[1].completed);
        // No extension happened: index 1 was never the tail.
        assert_eq!(stored.revisions.len(), 4);
    }

    #[tokio::test]
    async fn former_tail_retoggle_does_not_extend_again() {
        let mut tracker = tracker().await;
        let subject = tracker.add_subject("Math").await.unwrap();
        let session = tracker
            .add_study_session(subject, "Quadratics", date("2025-01-01"))
            .await
            .unwrap();

        tracker.toggle_revision(subject, session, 3).await.unwrap(); // extends to 5
        tracker.toggle_revision(subject, session, 3).await.unwrap(); // un-complete
        tracker.toggle_revision(subject, session, 3).await.unwrap(); // complete again, not tail now

        let stored = tracker.session_ref(subject, session).unwrap();
        assert_eq!(stored.revisions.len(), 5);
    }

    #[tokio::test]
    async fn overdue_and_dismissal() {
        let mut tracker = tracker().await;
        let subject = tracker.add_subject("Physics").await.unwrap();
        let session = tracker
            .add_study_session(subject, "Waves", date("2025-01-01"))
            .await
            .unwrap();

        // Day 3 and Day 7 are both past by Jan 10.
        let overdue = tracker.overdue_revisions(date("2025-01-10"));
        assert_eq!(overdue.len(), 2);
        assert_eq!(overdue[0].date, date("2025-01-04"));

        tracker.dismiss_revision(subject, session, 0).await.unwrap();
        let overdue = tracker.overdue_revisions(date("2025-01-10"));
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].revision_index, 1);
        assert!(tracker.is_dismissed(session, 0));

        // Completing the remaining one clears it without dismissal.
        tracker.toggle_revision(subject, session, 1).await.unwrap();
        assert!(tracker.overdue_revisions(date("2025-01-10")).is_empty());
    }

    #[tokio::test]
    async fn dismiss_all_overdue_adds_keys_once() {
        let mut tracker = tracker().await;
        let subject = tracker.add_subject("Physics").await.unwrap();
        tracker
            .add_study_session(subject, "Waves", date("2025-01-01"))
            .await
            .unwrap();

        let added = tracker.dismiss_all_overdue(date("2025-01-20")).await.unwrap();
        assert_eq!(added, 3); // Day 3, 7 and 14 are past; Day 30 is still ahead

        let again = tracker.dismiss_all_overdue(date("2025-01-20")).await.unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn dangling_dismissals_are_harmless() {
        let mut tracker = tracker().await;
        let subject = tracker.add_subject("Physics").await.unwrap();
        let session = tracker
            .add_study_session(subject, "Waves", date("2025-01-01"))
            .await
            .unwrap();
        tracker.dismiss_revision(subject, session, 0).await.unwrap();

        // Deleting the session leaves the key dangling; nothing cares.
        tracker.delete_study_session(subject, session).await.unwrap();
        assert!(tracker.data().dismissed_revisions.contains(&dismissal_key(session, 0)));
        assert!(tracker.overdue_revisions(date("2025-03-01")).is_empty());
    }

    #[tokio::test]
    async fn sessions_survive_chapter_rename_and_delete() {
        let mut tracker = tracker().await;
        let subject = tracker.add_subject("Chemistry").await.unwrap();
        let chapter = tracker.add_chapter(subject, "Moles").await.unwrap();
        let session = tracker
            .add_study_session(subject, "Moles", date("2025-01-01"))
            .await
            .unwrap();

        tracker.rename_chapter(subject, chapter, "Amount of Substance").await.unwrap();
        tracker.delete_chapter(subject, chapter).await.unwrap();

        let stored = tracker.session_ref(subject, session).unwrap();
        assert_eq!(stored.chapter_name, "Moles");
    }

    #[tokio::test]
    async fn reorder_chapters_applies_given_order() {
        let mut tracker = tracker().await;
        let subject = tracker.add_subject("Chemistry").await.unwrap();
        let a = tracker.add_chapter(subject, "A").await.unwrap();
        let _b = tracker.add_chapter(subject, "B").await.unwrap();
        let c = tracker.add_chapter(subject, "C").await.unwrap();

        tracker.reorder_chapters(subject, &[c, a]).await.unwrap();
        let names: Vec<&str> = tracker
            .subject(subject)
            .unwrap()
            .chapters
            .iter()
            .map(|ch| ch.name.as_str())
            .collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[tokio::test]
    async fn past_paper_crud_and_chapter_completion() {
        let mut tracker = tracker().await;
        let subject = tracker.add_subject("Chemistry").await.unwrap();
        let chapter = tracker.add_chapter(subject, "Kinetics").await.unwrap();

        tracker.set_chapter_completion(subject, chapter, true).await.unwrap();
        assert!(tracker.subject(subject).unwrap().chapters[0].topicals_completed);
        tracker.set_chapter_completion(subject, chapter, false).await.unwrap();
        assert!(!tracker.subject(subject).unwrap().chapters[0].topicals_completed);

        let paper = tracker
            .add_past_paper(
                subject,
                ExamSession::MJ,
                2024,
                PaperNumber::Number(2),
                68.0,
                "Kinetics",
            )
            .await
            .unwrap();
        assert_eq!(tracker.subject(subject).unwrap().past_papers.len(), 1);

        let mut edited = tracker.subject(subject).unwrap().past_papers[0].clone();
        edited.score = 74.0;
        edited.hard_chapters = String::new();
        tracker.edit_past_paper(subject, edited).await.unwrap();
        let stored = &tracker.subject(subject).unwrap().past_papers[0];
        assert_eq!(stored.score, 74.0);
        assert!(stored.hard_chapters.is_empty());

        tracker.delete_past_paper(subject, paper).await.unwrap();
        assert!(tracker.subject(subject).unwrap().past_papers.is_empty());

        let missing = tracker.delete_past_paper(subject, paper).await.unwrap_err();
        assert!(matches!(missing, TrackerError::PaperNotFound(_)));
    }

    #[tokio::test]
    async fn mutations_record_change_backups() {
        let mut tracker = tracker().await;
        let subject = tracker.add_subject("Chemistry").await.unwrap();
        tracker.rename_subject(subject, "Organic Chemistry").await.unwrap();

        let history = tracker.backups().backup_history(50).await.unwrap();
        let change_names: Vec<&str> = history
            .iter()
            .filter(|b| b.backup_type == BackupType::Change)
            .map(|b| b.name.as_str())
            .collect();
        assert!(change_names.contains(&"Before adding subject Chemistry"));
        assert!(change_names
            .contains(&"Before renaming subject Chemistry to Organic_Chemistry"));

        // The change snapshot holds the PRE-mutation dataset.
        let rename_backup = history
            .iter()
            .find(|b| b.name.starts_with("Before renaming subject"))
            .unwrap();
        let snapshot = rename_backup.data.subjects.as_ref().unwrap();
        assert_eq!(snapshot[0].name, "Chemistry");
    }

    #[tokio::test]
    async fn saves_trigger_at_most_one_daily_backup() {
        let mut tracker = tracker().await;
        let subject = tracker.add_subject("Chemistry").await.unwrap();
        tracker.add_chapter(subject, "Moles").await.unwrap();
        tracker.add_chapter(subject, "Bonding").await.unwrap();

        let history = tracker.backups().backup_history(50).await.unwrap();
        let daily: Vec<_> = history
            .iter()
            .filter(|b| b.backup_type == BackupType::Daily)
            .collect();
        assert_eq!(daily.len(), 1);
    }

    #[tokio::test]
    async fn backup_failures_do_not_block_saves() {
        let store = Arc::new(InMemoryStore::with_latency(Duration::from_millis(2)));
        let mut tracker = StudyTracker::load(Arc::clone(&store), "default-user")
            .await
            .unwrap();
        let subject = tracker.add_subject("Chemistry").await.unwrap();

        // Backup writes fail, the user document still persists: the
        // mutation must go through regardless.
        store.fail_writes_containing("/backups/");
        tracker.add_chapter(subject, "Moles").await.unwrap();
        assert_eq!(tracker.subject(subject).unwrap().chapters.len(), 1);

        // A store outage on the primary document does fail the save.
        store.fail_writes_containing("");
        assert!(tracker.add_chapter(subject, "Bonding").await.is_err());
    }

    #[tokio::test]
    async fn unknown_subject_is_rejected_before_any_backup() {
        let mut tracker = tracker().await;
        let err = tracker.add_chapter(42, "Ghost").await.unwrap_err();
        assert!(matches!(err, TrackerError::SubjectNotFound(42)));
        assert!(tracker.backups().backup_history(50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn edit_session_date_resets_schedule() {
        let mut tracker = tracker().await;
        let subject = tracker.add_subject("Math").await.unwrap();
        let session = tracker
            .add_study_session(subject, "Quadratics", date("2025-01-01"))
            .await
            .unwrap();
        tracker.toggle_revision(subject, session, 0).await.unwrap();

        tracker
            .edit_study_session(subject, session, None, Some(date("2025-02-01")))
            .await
            .unwrap();

        let stored = tracker.session_ref(subject, session).unwrap();
        assert_eq!(stored.revisions.len(), 4);
        assert_eq!(stored.revisions[0].date, date("2025-02-04"));
        assert!(!stored.revisions[0].completed);
        assert_eq!(stored.last_revision_completed, -1);
    }
}
