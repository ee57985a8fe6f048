//! Recurrence expansion: one parent session becomes a fixed run of follow-ups.

use crate::db::{RecurrenceInterval, StudySession};
use crate::error::{CoreError, CoreResult};

/// Build the follow-up sessions for `parent`.
///
/// Child `n` (1-based) is dated `parent.date + n * interval`. Children copy the
/// parent's descriptive fields and creator, point back at the parent, and are
/// never recurring themselves.
pub fn expand(
    parent: &StudySession,
    interval: RecurrenceInterval,
    count: u32,
) -> CoreResult<Vec<StudySession>> {
    (1..=count)
        .map(|n| {
            let offset = interval.delta() * n as i32;
            let date = parent.date.checked_add_signed(offset).ok_or_else(|| {
                CoreError::InvalidDateFormat(format!(
                    "occurrence {} of a {} session falls outside the supported calendar",
                    n, interval
                ))
            })?;

            Ok(StudySession {
                id: uuid::Uuid::new_v4().to_string(),
                title: parent.title.clone(),
                date,
                time: parent.time.clone(),
                location: parent.location.clone(),
                topic: parent.topic.clone(),
                creator_id: parent.creator_id.clone(),
                created_at: parent.created_at,
                is_recurring: false,
                recurrence_interval: None,
                parent_id: Some(parent.id.clone()),
            })
        })
        .collect()
}
