//! Study session models and recurrence intervals.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{CommentWithAuthor, UserResponse};

/// How often a recurring session repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceInterval {
    Weekly,
    Biweekly,
    /// Fixed 30 days, not calendar-month aware
    Monthly,
}

impl RecurrenceInterval {
    /// Distance between two consecutive occurrences
    pub fn delta(&self) -> Duration {
        match self {
            RecurrenceInterval::Weekly => Duration::days(7),
            RecurrenceInterval::Biweekly => Duration::days(14),
            RecurrenceInterval::Monthly => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceInterval::Weekly => "weekly",
            RecurrenceInterval::Biweekly => "biweekly",
            RecurrenceInterval::Monthly => "monthly",
        }
    }
}

impl std::fmt::Display for RecurrenceInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecurrenceInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" => Ok(RecurrenceInterval::Weekly),
            "biweekly" => Ok(RecurrenceInterval::Biweekly),
            "monthly" => Ok(RecurrenceInterval::Monthly),
            _ => Err(format!(
                "Unknown recurrence interval: {}. Must be one of: weekly, biweekly, monthly",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct StudySession {
    pub id: String,
    pub title: String,
    pub date: NaiveDate,
    /// Free-form display time, e.g. "3:00 PM - 5:00 PM"
    pub time: String,
    pub location: String,
    pub topic: Option<String>,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    pub is_recurring: bool,
    pub recurrence_interval: Option<String>,
    /// Set on sessions generated by recurrence expansion
    pub parent_id: Option<String>,
}

impl StudySession {
    /// True if the session's date is strictly before `today`
    pub fn is_past(&self, today: NaiveDate) -> bool {
        self.date < today
    }

    pub fn is_creator(&self, user_id: &str) -> bool {
        self.creator_id == user_id
    }

    pub fn interval(&self) -> Option<RecurrenceInterval> {
        self.recurrence_interval
            .as_deref()
            .and_then(|s| s.parse().ok())
    }
}

/// Request to create a study session
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    pub title: String,
    /// `YYYY-MM-DD` or `YYYY-MM-DD HH:MM`
    pub date: String,
    pub time: String,
    pub location: String,
    pub topic: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurrence_interval: Option<String>,
}

/// Request to edit a study session. Every mutable field is overwritten.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSessionRequest {
    pub title: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub topic: Option<String>,
}

/// A newly created session together with its recurrence children
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSession {
    pub session: StudySession,
    pub children: Vec<StudySession>,
}

/// Session detail response with members and comments
#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub session: StudySession,
    pub creator: UserResponse,
    pub members: Vec<UserResponse>,
    pub participant_count: i64,
    pub is_past: bool,
    pub suggested_location: String,
    pub comments: Vec<CommentWithAuthor>,
}
