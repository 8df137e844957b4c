//! # Snapshot Naming
//!
//! Every backup gets a deterministic, human-readable name derived from the
//! context it was taken in. Names double as the dedup key for daily
//! snapshots (`"Daily snapshot <day>"` is searched for verbatim), so the
//! formats here are load-bearing and must stay stable.
//!
//! Free-text fragments (subject names, chapter names, descriptions) are
//! sanitized before interpolation: everything outside `[A-Za-z0-9\s]` is
//! dropped, whitespace runs become single underscores, and the result is
//! truncated, keeping names filesystem- and URL-safe with bounded length.

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::{ExamSession, PaperNumber};

/// Kind of snapshot being taken. Serialized in lowercase on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Daily,
    Safety,
    Change,
    Manual,
    Auto,
}

/// Identifying bits of a past paper, for change-backup names.
#[derive(Debug, Clone, Default)]
pub struct PaperRef {
    pub session: Option<ExamSession>,
    pub year: Option<i32>,
    pub paper_number: Option<PaperNumber>,
}

impl PaperRef {
    fn render(&self) -> String {
        format!(
            "{} {} Paper {}",
            self.session.map_or("XX".to_string(), |s| s.to_string()),
            self.year.map_or("XXXX".to_string(), |y| y.to_string()),
            self.paper_number
                .as_ref()
                .map_or("X".to_string(), |p| p.to_string()),
        )
    }
}

/// Why a snapshot is being taken. The namer turns this into the record's
/// display name; the rest is stored verbatim on the backup record.
#[derive(Debug, Clone)]
pub struct BackupContext {
    pub backup_type: BackupType,
    pub action: String,
    pub target: Option<String>,
    pub subject: Option<String>,
    pub new_target: Option<String>,
    pub cycle: Option<String>,
    pub date: Option<NaiveDate>,
    pub source: Option<String>,
    pub paper: Option<PaperRef>,
    pub description: Option<String>,
    /// The calendar day a daily snapshot is *for*, which near a day boundary
    /// is not necessarily the day it is created on.
    pub business_day: Option<NaiveDate>,
}

impl BackupContext {
    fn new(backup_type: BackupType, action: &str) -> Self {
        Self {
            backup_type,
            action: action.to_string(),
            target: None,
            subject: None,
            new_target: None,
            cycle: None,
            date: None,
            source: None,
            paper: None,
            description: None,
            business_day: None,
        }
    }

    pub fn manual() -> Self {
        Self::new(BackupType::Manual, "manual-backup")
    }

    pub fn auto() -> Self {
        Self::new(BackupType::Auto, "auto-backup")
    }

    pub fn daily(business_day: NaiveDate) -> Self {
        let mut ctx = Self::new(BackupType::Daily, "daily-snapshot");
        ctx.description = Some(format!("Daily backup for {}", business_day));
        ctx.business_day = Some(business_day);
        ctx
    }

    pub fn safety_pre_restore(restoring: &str) -> Self {
        Self::new(BackupType::Safety, "pre-restore")
            .with_target(restoring)
            .with_description(format!("Safety backup before restoring from {}", restoring))
    }

    pub fn safety_pre_import() -> Self {
        Self::new(BackupType::Safety, "pre-import")
            .with_description("Safety backup before importing JSON data")
    }

    pub fn change(action: &str) -> Self {
        Self::new(BackupType::Change, action)
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_new_target(mut self, new_target: impl Into<String>) -> Self {
        self.new_target = Some(new_target.into());
        self
    }

    pub fn with_cycle(mut self, cycle: impl Into<String>) -> Self {
        self.cycle = Some(cycle.into());
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_paper(mut self, paper: PaperRef) -> Self {
        self.paper = Some(paper);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Strip everything outside `[A-Za-z0-9\s]`, collapse whitespace runs to a
/// single underscore, truncate to `max_len` characters.
pub fn sanitize(input: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_len));
    let mut pending_separator = false;
    for c in input.chars() {
        if c.is_whitespace() {
            pending_separator = true;
        } else if c.is_ascii_alphanumeric() {
            if pending_separator {
                out.push('_');
                pending_separator = false;
            }
            out.push(c);
        }
        // Anything else is dropped without becoming a separator.
    }
    // A trailing whitespace run still counts as one underscore.
    if pending_separator {
        out.push('_');
    }
    out.chars().take(max_len).collect()
}

fn opt(value: &Option<String>, max_len: usize) -> String {
    value.as_deref().map_or(String::new(), |v| sanitize(v, max_len))
}

/// Render the display name for a snapshot taken at `timestamp`.
pub fn backup_name(context: &BackupContext, timestamp: DateTime<Utc>) -> String {
    let date_str = timestamp.format("%Y-%m-%d").to_string();
    let time_str = timestamp.format("%H%M").to_string();

    match context.backup_type {
        BackupType::Daily => {
            let day = context
                .business_day
                .map_or(date_str, |d| d.to_string());
            format!("Daily snapshot {}", day)
        }
        BackupType::Safety => match context.action.as_str() {
            "pre-restore" => {
                let target = context
                    .target
                    .as_deref()
                    .map(|t| format!(" from {}", sanitize(t, 20)))
                    .unwrap_or_default();
                format!("Safety backup before restore{}", target)
            }
            "pre-import" => format!("Safety backup before import on {} at {}", date_str, time_str),
            _ => format!("Safety backup {} at {}", date_str, time_str),
        },
        BackupType::Change => change_name(context, &date_str),
        BackupType::Manual => match &context.description {
            Some(description) => format!(
                "Manual backup: {} on {} at {}",
                sanitize(description, 30),
                date_str,
                time_str
            ),
            None => format!("Manual checkpoint {} at {}", date_str, time_str),
        },
        BackupType::Auto => format!("Auto backup on significant changes {} at {}", date_str, time_str),
    }
}

fn change_name(context: &BackupContext, date_str: &str) -> String {
    let target = opt(&context.target, 15);
    let subject = opt(&context.subject, 12);
    let in_subject = |prep: &str| {
        if subject.is_empty() {
            String::new()
        } else {
            format!(" {} {}", prep, subject)
        }
    };

    match context.action.as_str() {
        // Subjects
        "add-subject" => format!("Before adding subject {}", target),
        "delete-subject" => format!("Before deleting subject {}", target),
        "rename-subject" => {
            let new_target = opt(&context.new_target, 20);
            format!("Before renaming subject {} to {}", target, new_target)
        }

        // Chapters
        "add-chapter" => format!("Before adding chapter {}{}", target, in_subject("to")),
        "delete-chapter" => format!("Before deleting chapter {}{}", target, in_subject("from")),
        "rename-chapter" => {
            let new_target = opt(&context.new_target, 20);
            format!(
                "Before renaming chapter {} to {}{}",
                target,
                new_target,
                in_subject("in")
            )
        }
        "reorder-chapters" => format!("Before reordering chapters{}", in_subject("in")),
        "complete-chapter" => format!("Before completing chapter {}{}", target, in_subject("in")),
        "incomplete-chapter" => format!("Before marking incomplete {}{}", target, in_subject("in")),

        // Study sessions
        "add-study-session" => {
            let session_date = context.date.map_or(date_str.to_string(), |d| d.to_string());
            format!(
                "Before adding study session {} on {}{}",
                target,
                session_date,
                in_subject("for")
            )
        }
        "delete-study-session" => {
            let session_date = context.date.map_or(date_str.to_string(), |d| d.to_string());
            format!(
                "Before deleting study session {} from {}{}",
                target,
                session_date,
                in_subject("in")
            )
        }
        "edit-study-session" => {
            format!("Before editing study session {}{}", target, in_subject("in"))
        }

        // Past papers
        "add-paper" => {
            let paper = context.paper.clone().unwrap_or_default().render();
            format!("Before adding paper {}{}", paper, in_subject("for"))
        }
        "delete-paper" => {
            let paper = context.paper.clone().unwrap_or_default().render();
            format!("Before deleting paper {}{}", paper, in_subject("from"))
        }
        "edit-paper" => {
            let paper = context.paper.clone().unwrap_or_default().render();
            format!("Before editing paper {}{}", paper, in_subject("in"))
        }

        // Revisions
        "complete-revision" => {
            let cycle = context
                .cycle
                .as_deref()
                .map_or("revision".to_string(), |c| sanitize(c, 15));
            format!(
                "Before completing revision {} {}{}",
                target,
                cycle,
                in_subject("for")
            )
        }
        "reset-revision" => {
            let cycle = context
                .cycle
                .as_deref()
                .map_or("revision".to_string(), |c| sanitize(c, 15));
            format!(
                "Before resetting revision {} {}{}",
                target,
                cycle,
                in_subject("in")
            )
        }
        "dismiss-overdue" => format!("Before dismissing overdue revisions{}", in_subject("for")),

        // Bulk
        "bulk-delete-chapters" => format!("Before bulk deleting chapters{}", in_subject("in")),
        "bulk-complete-chapters" => format!("Before bulk completing chapters{}", in_subject("in")),
        "clear-all-revisions" => format!("Before clearing all revisions{}", in_subject("in")),
        "reset-subject-progress" => format!("Before resetting progress{}", in_subject("for")),

        // Import/export
        "merge-data" => {
            let source = context
                .source
                .as_deref()
                .map_or("external".to_string(), |s| sanitize(s, 15));
            format!("Before merging data from {}", source)
        }

        // Maintenance
        "cleanup-old-sessions" => format!("Before cleaning up old sessions{}", in_subject("in")),
        "archive-completed" => format!("Before archiving completed chapters{}", in_subject("in")),
        "reset-all-data" => "Before resetting all data".to_string(),

        action => {
            let target_part = if target.is_empty() {
                String::new()
            } else {
                format!(" {}", target)
            };
            format!("Before {}{}{}", action, target_part, in_subject("in"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 23, 14, 5, 0).unwrap()
    }

    #[test]
    fn sanitize_strips_collapses_and_truncates() {
        assert_eq!(sanitize("Pure Maths (P3)!", 25), "Pure_Maths_P3");
        assert_eq!(sanitize("a   b\t\nc", 25), "a_b_c");
        assert_eq!(sanitize("Maintenance (30 days)", 15), "Maintenance_30_");
        assert_eq!(sanitize("", 25), "");
        assert_eq!(sanitize("!!!", 25), "");
    }

    #[test]
    fn daily_name_uses_business_day_not_creation_time() {
        // A job firing just past the UTC day boundary still labels the
        // snapshot with the reference day it was scheduled for.
        let ctx = BackupContext::daily("2025-09-24".parse().unwrap());
        assert_eq!(backup_name(&ctx, ts()), "Daily snapshot 2025-09-24");
    }

    #[test]
    fn safety_names_distinguish_restore_and_import() {
        let restore = BackupContext::safety_pre_restore("Daily snapshot 2025-09-01");
        assert_eq!(
            backup_name(&restore, ts()),
            "Safety backup before restore from Daily_snapshot_20250"
        );

        let import = BackupContext::safety_pre_import();
        assert_eq!(
            backup_name(&import, ts()),
            "Safety backup before import on 2025-09-23 at 1405"
        );
    }

    #[test]
    fn change_names_cover_known_actions() {
        let add = BackupContext::change("add-chapter")
            .with_target("Organic Chemistry Basics")
            .with_subject("Chemistry");
        assert_eq!(
            backup_name(&add, ts()),
            "Before adding chapter Organic_Chemist to Chemistry"
        );

        let rename = BackupContext::change("rename-subject")
            .with_target("Maths")
            .with_new_target("Further Maths");
        assert_eq!(
            backup_name(&rename, ts()),
            "Before renaming subject Maths to Further_Maths"
        );

        let revision = BackupContext::change("complete-revision")
            .with_target("Quadratics")
            .with_cycle("Maintenance (30 days)")
            .with_subject("Math");
        assert_eq!(
            backup_name(&revision, ts()),
            "Before completing revision Quadratics Maintenance_30_ for Math"
        );
    }

    #[test]
    fn change_name_for_paper_uses_placeholders_when_missing() {
        let ctx = BackupContext::change("add-paper").with_subject("Physics");
        assert_eq!(
            backup_name(&ctx, ts()),
            "Before adding paper XX XXXX Paper X for Physics"
        );

        let full = BackupContext::change("delete-paper").with_paper(PaperRef {
            session: Some(ExamSession::MJ),
            year: Some(2024),
            paper_number: Some(PaperNumber::Number(2)),
        });
        assert_eq!(backup_name(&full, ts()), "Before deleting paper MJ 2024 Paper 2");
    }

    #[test]
    fn unknown_change_action_falls_back_to_generic_template() {
        let ctx = BackupContext::change("recalculate-averages")
            .with_target("Statistics")
            .with_subject("Math");
        assert_eq!(
            backup_name(&ctx, ts()),
            "Before recalculate-averages Statistics in Math"
        );
    }

    #[test]
    fn manual_and_auto_names_carry_timestamp() {
        let manual = BackupContext::manual();
        assert_eq!(backup_name(&manual, ts()), "Manual checkpoint 2025-09-23 at 1405");

        let described = BackupContext::manual().with_description("before exam week");
        assert_eq!(
            backup_name(&described, ts()),
            "Manual backup: before_exam_week on 2025-09-23 at 1405"
        );

        let auto = BackupContext::auto();
        assert_eq!(
            backup_name(&auto, ts()),
            "Auto backup on significant changes 2025-09-23 at 1405"
        );
    }

    #[test]
    fn study_session_names_use_session_date_when_given() {
        let ctx = BackupContext::change("add-study-session")
            .with_target("Kinematics")
            .with_date("2025-03-01".parse().unwrap())
            .with_subject("Physics");
        assert_eq!(
            backup_name(&ctx, ts()),
            "Before adding study session Kinematics on 2025-03-01 for Physics"
        );
    }
}
