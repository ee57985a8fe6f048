//! Room suggestion based on how many people joined a session.

use serde::Serialize;

use super::SessionService;
use crate::db::StudySession;
use crate::error::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LocationLabel {
    #[serde(rename = "Library Group Study Room")]
    LibraryGroupStudyRoom,
    #[serde(rename = "Student Union Tables")]
    StudentUnionTables,
    #[serde(rename = "Book Private Library Room")]
    BookPrivateLibraryRoom,
}

impl LocationLabel {
    /// Up to 3 people fit a group study room, up to 6 a union table.
    pub fn for_participants(count: i64) -> Self {
        match count {
            n if n <= 3 => LocationLabel::LibraryGroupStudyRoom,
            n if n <= 6 => LocationLabel::StudentUnionTables,
            _ => LocationLabel::BookPrivateLibraryRoom,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LocationLabel::LibraryGroupStudyRoom => "Library Group Study Room",
            LocationLabel::StudentUnionTables => "Student Union Tables",
            LocationLabel::BookPrivateLibraryRoom => "Book Private Library Room",
        }
    }
}

impl std::fmt::Display for LocationLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl SessionService {
    /// Suggest a room from the session's current participant count.
    /// The count is read on every call.
    pub async fn suggest_location(&self, session: &StudySession) -> CoreResult<LocationLabel> {
        let count = self.participant_count(&session.id).await?;
        Ok(LocationLabel::for_participants(count))
    }
}
