//! # Domain Model
//!
//! Core data types for the tracker: [`Subject`] owns its [`Chapter`]s,
//! [`PastPaper`]s and [`StudySession`]s; a [`StudySession`] owns the ordered
//! list of [`Revision`]s derived from its study date.
//!
//! ## Wire Format
//!
//! All types serialize with the camelCase field names used by the persisted
//! documents (`pastPapers`, `studyDate`, `lastRevisionCompleted`, ...), so a
//! dataset written by an earlier deployment round-trips unchanged. Collection
//! fields are tolerant of being absent and default to empty.
//!
//! ## Identity
//!
//! Entity ids are creation timestamps in epoch milliseconds. They are
//! monotonic within a single process but not globally unique across
//! concurrent writers; the dataset has a single logical writer.
//!
//! ## Dismissed revisions
//!
//! Overdue-revision notices the user has acknowledged are tracked as a set of
//! `"<sessionId>-<revisionIndex>"` keys, independent of the `completed` flag.
//! Keys may outlive the revision they point at; stale keys are harmless and
//! are never treated as an error.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Exam sitting for a past paper: May/June, Oct/Nov, or Jan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExamSession {
    MJ,
    ON,
    JN,
}

impl fmt::Display for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExamSession::MJ => "MJ",
            ExamSession::ON => "ON",
            ExamSession::JN => "JN",
        };
        f.write_str(s)
    }
}

/// Paper numbers appear in stored data both as numbers (`2`) and as strings
/// (`"21"`, `"2 Variant 2"`), so deserialization accepts either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaperNumber {
    Number(i64),
    Text(String),
}

impl fmt::Display for PaperNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaperNumber::Number(n) => write!(f, "{}", n),
            PaperNumber::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PaperNumber {
    fn from(n: i64) -> Self {
        PaperNumber::Number(n)
    }
}

impl From<&str> for PaperNumber {
    fn from(s: &str) -> Self {
        PaperNumber::Text(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub topicals_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PastPaper {
    pub id: i64,
    pub session: ExamSession,
    pub year: i32,
    pub paper_number: PaperNumber,
    /// Percentage score, 0-100.
    pub score: f64,
    #[serde(default)]
    pub hard_chapters: String,
}

/// Which stage of the spaced-repetition schedule a revision belongs to.
///
/// Serializes to the human-readable labels stored in the dataset
/// (`"Day 3"`, ..., `"Maintenance (30 days)"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevisionCycle {
    #[serde(rename = "Day 3")]
    Day3,
    #[serde(rename = "Day 7")]
    Day7,
    #[serde(rename = "Day 14")]
    Day14,
    #[serde(rename = "Day 30")]
    Day30,
    #[serde(rename = "Maintenance (30 days)")]
    Maintenance,
}

impl RevisionCycle {
    pub fn label(&self) -> &'static str {
        match self {
            RevisionCycle::Day3 => "Day 3",
            RevisionCycle::Day7 => "Day 7",
            RevisionCycle::Day14 => "Day 14",
            RevisionCycle::Day30 => "Day 30",
            RevisionCycle::Maintenance => "Maintenance (30 days)",
        }
    }
}

impl fmt::Display for RevisionCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single scheduled review of a study session.
///
/// The id encodes the position in the revision list at creation time
/// (`rev-0`, `rev-1`, ...) and is never renumbered afterwards, so appends
/// keep the id sequence aligned with array position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub id: String,
    pub date: NaiveDate,
    pub cycle: RevisionCycle,
    pub completed: bool,
}

impl Revision {
    pub fn new(index: usize, date: NaiveDate, cycle: RevisionCycle) -> Self {
        Self {
            id: format!("rev-{}", index),
            date,
            cycle,
            completed: false,
        }
    }
}

fn default_last_revision() -> i32 {
    -1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: i64,
    /// Chapter name captured at creation time. Deliberately a plain string
    /// rather than a chapter id: the session survives chapter renames and
    /// deletions.
    pub chapter_name: String,
    pub study_date: NaiveDate,
    #[serde(default)]
    pub revisions: Vec<Revision>,
    /// Index of the revision most recently toggled (in either direction),
    /// or -1 when none has been touched yet.
    #[serde(default = "default_last_revision")]
    pub last_revision_completed: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub past_papers: Vec<PastPaper>,
    #[serde(default)]
    pub study_sessions: Vec<StudySession>,
}

impl Subject {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            chapters: Vec::new(),
            past_papers: Vec::new(),
            study_sessions: Vec::new(),
        }
    }
}

/// The full tracked dataset: what gets persisted, snapshotted and restored.
///
/// The dismissed set serializes as a JSON array; its order carries no
/// meaning. Unknown document fields (`lastUpdated`) are ignored on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserData {
    pub subjects: Vec<Subject>,
    pub dismissed_revisions: HashSet<String>,
}

impl UserData {
    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn total_chapters(&self) -> usize {
        self.subjects.iter().map(|s| s.chapters.len()).sum()
    }

    pub fn total_study_sessions(&self) -> usize {
        self.subjects.iter().map(|s| s.study_sessions.len()).sum()
    }
}

/// Key marking one revision of one session as acknowledged-overdue.
pub fn dismissal_key(session_id: i64, revision_index: usize) -> String {
    format!("{}-{}", session_id, revision_index)
}
