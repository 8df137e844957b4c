//! # Revision Scheduling
//!
//! Pure calendar arithmetic for the spaced-repetition schedule. A new study
//! session gets four reviews at +3, +7, +14 and +30 days; once the user
//! completes the last review in the list, one more is appended 30 days after
//! it. Repeating that keeps the chain going indefinitely.
//!
//! Everything here is deterministic and side-effect free. Dates are plain
//! calendar days; no clock or timezone is consulted. Two revisions landing on
//! the same calendar day are both kept; nothing merges or deduplicates by
//! date.

use chrono::{Duration, NaiveDate};

use crate::model::{Revision, RevisionCycle};

const INITIAL_CYCLES: [(i64, RevisionCycle); 4] = [
    (3, RevisionCycle::Day3),
    (7, RevisionCycle::Day7),
    (14, RevisionCycle::Day14),
    (30, RevisionCycle::Day30),
];

/// Days between a completed tail revision and the maintenance revision
/// appended after it.
pub const MAINTENANCE_INTERVAL_DAYS: i64 = 30;

/// Build the initial four-revision schedule for a study date.
pub fn schedule_initial_revisions(study_date: NaiveDate) -> Vec<Revision> {
    INITIAL_CYCLES
        .iter()
        .enumerate()
        .map(|(index, (days, cycle))| {
            Revision::new(index, study_date + Duration::days(*days), *cycle)
        })
        .collect()
}

/// Build the maintenance revision that follows `anchor_date` (the date of the
/// revision whose completion triggered the extension). The caller appends it;
/// the id is derived from the current list length so ids keep matching
/// positions.
pub fn extend_with_maintenance(revisions: &[Revision], anchor_date: NaiveDate) -> Revision {
    Revision::new(
        revisions.len(),
        anchor_date + Duration::days(MAINTENANCE_INTERVAL_DAYS),
        RevisionCycle::Maintenance,
    )
}

/// A revision is overdue when its date has passed and it is still open.
pub fn is_overdue(revision: &Revision, as_of: NaiveDate) -> bool {
    revision.date < as_of && !revision.completed
}

pub fn is_due_today(revision: &Revision, as_of: NaiveDate) -> bool {
    revision.date == as_of
}
