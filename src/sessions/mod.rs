//! Study session lifecycle and membership rules.
//!
//! Every operation takes the acting user explicitly and runs its reads and
//! writes inside one transaction. Recurring sessions are expanded inline
//! with the create call.

mod comments;
mod location;
pub mod recurrence;

pub use location::LocationLabel;

use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::SessionsConfig;
use crate::db::{
    begin_write, CreateSessionRequest, CreatedSession, DbPool, RecurrenceInterval, SessionDetail,
    StudySession, UpdateSessionRequest, User, UserResponse,
};
use crate::error::{is_unique_violation, CoreError, CoreResult};
use crate::validation::{
    normalize_topic, parse_session_date, validate_location, validate_time, validate_title,
    validate_topic,
};

#[derive(Clone)]
pub struct SessionService {
    db: DbPool,
    clock: Arc<dyn Clock>,
    config: SessionsConfig,
}

/// Fields shared by create and edit, after validation
struct SessionFields {
    title: String,
    date: chrono::NaiveDate,
    time: String,
    location: String,
    topic: Option<String>,
}

fn check_fields(
    title: &str,
    date: &str,
    time: &str,
    location: &str,
    topic: &Option<String>,
) -> CoreResult<SessionFields> {
    validate_title(title).map_err(|e| CoreError::validation("title", e))?;
    validate_time(time).map_err(|e| CoreError::validation("time", e))?;
    validate_location(location).map_err(|e| CoreError::validation("location", e))?;
    validate_topic(topic).map_err(|e| CoreError::validation("topic", e))?;
    let date = parse_session_date(date).map_err(CoreError::InvalidDateFormat)?;

    Ok(SessionFields {
        title: title.trim().to_string(),
        date,
        time: time.trim().to_string(),
        location: location.trim().to_string(),
        topic: normalize_topic(topic.clone()),
    })
}

async fn fetch_session(conn: &mut SqliteConnection, id: &str) -> CoreResult<StudySession> {
    sqlx::query_as::<_, StudySession>("SELECT * FROM study_sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(CoreError::NotFound("Session"))
}

async fn insert_session(conn: &mut SqliteConnection, s: &StudySession) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO study_sessions
            (id, title, date, time, location, topic, creator_id, created_at,
             is_recurring, recurrence_interval, parent_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&s.id)
    .bind(&s.title)
    .bind(s.date)
    .bind(&s.time)
    .bind(&s.location)
    .bind(&s.topic)
    .bind(&s.creator_id)
    .bind(s.created_at)
    .bind(s.is_recurring)
    .bind(&s.recurrence_interval)
    .bind(&s.parent_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_member(
    conn: &mut SqliteConnection,
    session_id: &str,
    user_id: &str,
    joined_at: chrono::DateTime<chrono::Utc>,
) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO session_members (session_id, user_id, joined_at) VALUES (?, ?, ?)")
        .bind(session_id)
        .bind(user_id)
        .bind(joined_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn is_member_in(
    conn: &mut SqliteConnection,
    session_id: &str,
    user_id: &str,
) -> sqlx::Result<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM session_members WHERE session_id = ? AND user_id = ?")
            .bind(session_id)
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(row.is_some())
}

impl SessionService {
    pub fn new(db: DbPool, clock: Arc<dyn Clock>, config: SessionsConfig) -> Self {
        Self { db, clock, config }
    }

    pub fn today(&self) -> chrono::NaiveDate {
        self.clock.today()
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn get_session(&self, id: &str) -> CoreResult<StudySession> {
        let mut conn = self.db.acquire().await?;
        fetch_session(&mut conn, id).await
    }

    /// Members of a session, in join order
    pub async fn members(&self, session_id: &str) -> CoreResult<Vec<UserResponse>> {
        let members = sqlx::query_as::<_, UserResponse>(
            r#"
            SELECT u.id, u.username, u.email FROM users u
            INNER JOIN session_members m ON m.user_id = u.id
            WHERE m.session_id = ?
            ORDER BY m.joined_at, u.username
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.db)
        .await?;
        Ok(members)
    }

    pub async fn participant_count(&self, session_id: &str) -> CoreResult<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM session_members WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&self.db)
                .await?;
        Ok(count.0)
    }

    pub async fn is_member(&self, session_id: &str, user_id: &str) -> CoreResult<bool> {
        let mut conn = self.db.acquire().await?;
        Ok(is_member_in(&mut conn, session_id, user_id).await?)
    }

    /// Sessions the user belongs to, soonest first
    pub async fn list_joined(&self, user: &User) -> CoreResult<Vec<StudySession>> {
        let sessions = sqlx::query_as::<_, StudySession>(
            r#"
            SELECT s.* FROM study_sessions s
            INNER JOIN session_members m ON m.session_id = s.id
            WHERE m.user_id = ?
            ORDER BY s.date, s.created_at
            "#,
        )
        .bind(&user.id)
        .fetch_all(&self.db)
        .await?;
        Ok(sessions)
    }

    /// Sessions the user does not belong to, soonest first
    pub async fn list_available(&self, user: &User) -> CoreResult<Vec<StudySession>> {
        let sessions = sqlx::query_as::<_, StudySession>(
            r#"
            SELECT s.* FROM study_sessions s
            WHERE NOT EXISTS (
                SELECT 1 FROM session_members m
                WHERE m.session_id = s.id AND m.user_id = ?
            )
            ORDER BY s.date, s.created_at
            "#,
        )
        .bind(&user.id)
        .fetch_all(&self.db)
        .await?;
        Ok(sessions)
    }

    /// Sessions generated from `parent_id` by recurrence expansion
    pub async fn children_of(&self, parent_id: &str) -> CoreResult<Vec<StudySession>> {
        let sessions = sqlx::query_as::<_, StudySession>(
            "SELECT * FROM study_sessions WHERE parent_id = ? ORDER BY date",
        )
        .bind(parent_id)
        .fetch_all(&self.db)
        .await?;
        Ok(sessions)
    }

    pub async fn session_detail(&self, id: &str) -> CoreResult<SessionDetail> {
        let session = self.get_session(id).await?;

        let creator = sqlx::query_as::<_, UserResponse>(
            "SELECT id, username, email FROM users WHERE id = ?",
        )
        .bind(&session.creator_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(CoreError::NotFound("Creator"))?;

        let members = self.members(id).await?;
        let participant_count = members.len() as i64;
        let comments = self.list_comments(id).await?;

        Ok(SessionDetail {
            is_past: session.is_past(self.today()),
            suggested_location: LocationLabel::for_participants(participant_count).to_string(),
            session,
            creator,
            members,
            participant_count,
            comments,
        })
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Create a session with `creator` as its first member. Recurring
    /// sessions also get their follow-ups, all in the same transaction.
    pub async fn create_session(
        &self,
        req: &CreateSessionRequest,
        creator: &User,
    ) -> CoreResult<CreatedSession> {
        let fields = check_fields(&req.title, &req.date, &req.time, &req.location, &req.topic)?;

        if fields.date < self.today() {
            return Err(CoreError::InvalidDateFormat(
                "Session date cannot be in the past".to_string(),
            ));
        }

        let interval = if req.is_recurring {
            let raw = req
                .recurrence_interval
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| {
                    CoreError::validation(
                        "recurrence_interval",
                        "Recurring sessions need a recurrence interval",
                    )
                })?;
            Some(
                raw.parse::<RecurrenceInterval>()
                    .map_err(|e| CoreError::validation("recurrence_interval", e))?,
            )
        } else {
            None
        };

        let now = self.clock.now();
        let session = StudySession {
            id: uuid::Uuid::new_v4().to_string(),
            title: fields.title,
            date: fields.date,
            time: fields.time,
            location: fields.location,
            topic: fields.topic,
            creator_id: creator.id.clone(),
            created_at: now,
            is_recurring: interval.is_some(),
            recurrence_interval: interval.map(|i| i.to_string()),
            parent_id: None,
        };

        let children = match interval {
            Some(interval) => {
                recurrence::expand(&session, interval, self.config.recurrence_count)?
            }
            None => Vec::new(),
        };

        let mut tx = begin_write(&self.db).await?;

        insert_session(&mut tx, &session).await?;
        insert_member(&mut tx, &session.id, &creator.id, now).await?;

        // Children are owned by the same creator, so the creator is enrolled
        // in each of them as well.
        for child in &children {
            insert_session(&mut tx, child).await?;
            insert_member(&mut tx, &child.id, &creator.id, now).await?;
        }

        tx.commit().await?;

        info!(
            session_id = %session.id,
            creator_id = %creator.id,
            date = %session.date,
            recurrence = ?session.interval(),
            children = children.len(),
            "Created study session"
        );

        Ok(CreatedSession { session, children })
    }

    /// Overwrite the descriptive fields of a session. Creator only.
    pub async fn edit_session(
        &self,
        id: &str,
        req: &UpdateSessionRequest,
        actor: &User,
    ) -> CoreResult<StudySession> {
        let mut tx = begin_write(&self.db).await?;

        let session = fetch_session(&mut tx, id).await?;
        if !session.is_creator(&actor.id) {
            return Err(CoreError::Forbidden("Only the creator can edit this session"));
        }

        let fields = check_fields(&req.title, &req.date, &req.time, &req.location, &req.topic)?;

        sqlx::query(
            "UPDATE study_sessions SET title = ?, date = ?, time = ?, location = ?, topic = ? WHERE id = ?",
        )
        .bind(&fields.title)
        .bind(fields.date)
        .bind(&fields.time)
        .bind(&fields.location)
        .bind(&fields.topic)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let updated = fetch_session(&mut tx, id).await?;
        tx.commit().await?;

        info!(session_id = %id, actor_id = %actor.id, "Updated study session");
        Ok(updated)
    }

    /// Delete a session and its comments. Creator only.
    ///
    /// Recurrence children are kept; their `parent_id` is cleared by the
    /// foreign key.
    pub async fn delete_session(&self, id: &str, actor: &User) -> CoreResult<()> {
        let mut tx = begin_write(&self.db).await?;

        let session = fetch_session(&mut tx, id).await?;
        if !session.is_creator(&actor.id) {
            return Err(CoreError::Forbidden("Only the creator can delete this session"));
        }

        let result = sqlx::query("DELETE FROM study_sessions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound("Session"));
        }

        tx.commit().await?;

        info!(session_id = %id, actor_id = %actor.id, "Deleted study session");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Membership
    // -------------------------------------------------------------------------

    pub async fn join_session(&self, id: &str, actor: &User) -> CoreResult<StudySession> {
        let mut tx = begin_write(&self.db).await?;

        let session = fetch_session(&mut tx, id).await?;
        if session.is_past(self.today()) {
            return Err(CoreError::SessionInPast);
        }

        if is_member_in(&mut tx, id, &actor.id).await? {
            return Err(CoreError::AlreadyMember);
        }

        // A concurrent join that slipped past the check hits the primary key
        insert_member(&mut tx, id, &actor.id, self.clock.now())
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    CoreError::AlreadyMember
                } else {
                    CoreError::Database(e)
                }
            })?;

        tx.commit().await?;

        debug!(session_id = %id, user_id = %actor.id, "User joined session");
        Ok(session)
    }

    /// Creators cannot leave their own session; they delete it instead.
    pub async fn leave_session(&self, id: &str, actor: &User) -> CoreResult<StudySession> {
        let mut tx = begin_write(&self.db).await?;

        let session = fetch_session(&mut tx, id).await?;
        if session.is_creator(&actor.id) {
            return Err(CoreError::Forbidden(
                "The creator cannot leave their own session; delete it instead",
            ));
        }

        let result = sqlx::query("DELETE FROM session_members WHERE session_id = ? AND user_id = ?")
            .bind(id)
            .bind(&actor.id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotAMember);
        }

        tx.commit().await?;

        debug!(session_id = %id, user_id = %actor.id, "User left session");
        Ok(session)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::db::init_memory;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    pub(crate) struct Fixture {
        pub service: SessionService,
        pub clock: Arc<FixedClock>,
        pub pool: DbPool,
    }

    impl Fixture {
        /// Insert a user directly; password hashing is not under test here
        pub async fn user(&self, username: &str) -> User {
            let user = User {
                id: uuid::Uuid::new_v4().to_string(),
                username: username.to_string(),
                email: format!("{}@example.com", username),
                password_hash: "unused".to_string(),
                created_at: self.clock.now(),
            };
            sqlx::query(
                "INSERT INTO users (id, username, email, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .unwrap();
            user
        }

        pub fn today(&self) -> NaiveDate {
            self.clock.today()
        }

        pub fn tomorrow(&self) -> String {
            (self.today() + Duration::days(1)).format("%Y-%m-%d").to_string()
        }

        pub async fn session_count(&self) -> i64 {
            let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM study_sessions")
                .fetch_one(&self.pool)
                .await
                .unwrap();
            count.0
        }

        pub async fn member_ids(&self, session_id: &str) -> Vec<String> {
            let mut ids: Vec<String> = self
                .service
                .members(session_id)
                .await
                .unwrap()
                .into_iter()
                .map(|m| m.id)
                .collect();
            ids.sort();
            ids
        }
    }

    pub(crate) async fn fixture_with(config: SessionsConfig) -> Fixture {
        let pool = init_memory().await.unwrap();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 9, 1, 10, 0, 0).unwrap(),
        ));
        Fixture {
            service: SessionService::new(pool.clone(), clock.clone(), config),
            clock,
            pool,
        }
    }

    pub(crate) async fn fixture() -> Fixture {
        fixture_with(SessionsConfig::default()).await
    }

    /// Fixture backed by a WAL database file with a multi-connection pool
    async fn fixture_on_disk() -> (Fixture, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::init(dir.path()).await.unwrap();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 9, 1, 10, 0, 0).unwrap(),
        ));
        let fx = Fixture {
            service: SessionService::new(pool.clone(), clock.clone(), SessionsConfig::default()),
            clock,
            pool,
        };
        (fx, dir)
    }

    pub(crate) fn new_session(date: String) -> CreateSessionRequest {
        CreateSessionRequest {
            title: "Future Study Session".to_string(),
            date,
            time: "3:00 PM - 5:00 PM".to_string(),
            location: "Library 101".to_string(),
            topic: Some("Chapters 1-3".to_string()),
            is_recurring: false,
            recurrence_interval: None,
        }
    }

    fn recurring(date: String, interval: &str) -> CreateSessionRequest {
        CreateSessionRequest {
            is_recurring: true,
            recurrence_interval: Some(interval.to_string()),
            ..new_session(date)
        }
    }

    fn update(date: &str) -> UpdateSessionRequest {
        UpdateSessionRequest {
            title: "Renamed".to_string(),
            date: date.to_string(),
            time: "9:00 AM".to_string(),
            location: "Room 4".to_string(),
            topic: None,
        }
    }

    #[tokio::test]
    async fn test_join_leave_scenario() {
        let fx = fixture().await;
        let a = fx.user("alice").await;
        let b = fx.user("bob").await;

        let s = fx
            .service
            .create_session(&new_session(fx.tomorrow()), &a)
            .await
            .unwrap()
            .session;
        assert_eq!(fx.member_ids(&s.id).await, vec![a.id.clone()]);

        fx.service.join_session(&s.id, &b).await.unwrap();
        assert_eq!(fx.service.participant_count(&s.id).await.unwrap(), 2);
        assert!(fx.service.is_member(&s.id, &b.id).await.unwrap());

        assert!(matches!(
            fx.service.leave_session(&s.id, &a).await,
            Err(CoreError::Forbidden(_))
        ));

        fx.service.leave_session(&s.id, &b).await.unwrap();
        assert_eq!(fx.service.participant_count(&s.id).await.unwrap(), 1);
        assert!(!fx.service.is_member(&s.id, &b.id).await.unwrap());
        assert!(fx.service.is_member(&s.id, &a.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_join_then_leave_restores_membership() {
        let fx = fixture().await;
        let a = fx.user("alice").await;
        let b = fx.user("bob").await;
        let c = fx.user("carol").await;

        let s = fx
            .service
            .create_session(&new_session(fx.tomorrow()), &a)
            .await
            .unwrap()
            .session;
        fx.service.join_session(&s.id, &b).await.unwrap();

        let before = fx.member_ids(&s.id).await;
        fx.service.join_session(&s.id, &c).await.unwrap();
        fx.service.leave_session(&s.id, &c).await.unwrap();
        assert_eq!(fx.member_ids(&s.id).await, before);
    }

    #[tokio::test]
    async fn test_create_weekly_recurrence() {
        let fx = fixture().await;
        let a = fx.user("alice").await;

        let created = fx
            .service
            .create_session(&recurring("2026-09-10".to_string(), "weekly"), &a)
            .await
            .unwrap();
        let parent = &created.session;

        assert!(parent.is_recurring);
        assert_eq!(parent.interval(), Some(RecurrenceInterval::Weekly));
        assert_eq!(fx.session_count().await, 5);

        let stored = fx.service.children_of(&parent.id).await.unwrap();
        assert_eq!(stored, created.children);

        let base = NaiveDate::from_ymd_opt(2026, 9, 10).unwrap();
        for (n, child) in stored.iter().enumerate() {
            assert_eq!(child.date, base + Duration::days(7 * (n as i64 + 1)));
            assert!(!child.is_recurring);
            assert_eq!(child.recurrence_interval, None);
            assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
            assert_ne!(child.parent_id.as_deref(), Some(child.id.as_str()));
        }
    }

    #[tokio::test]
    async fn test_creator_is_member_of_every_created_session() {
        let fx = fixture().await;
        let a = fx.user("alice").await;

        let created = fx
            .service
            .create_session(&recurring(fx.tomorrow(), "biweekly"), &a)
            .await
            .unwrap();

        let mut all = vec![created.session.clone()];
        all.extend(created.children.clone());
        for s in all {
            assert_eq!(fx.member_ids(&s.id).await, vec![a.id.clone()]);
        }
    }

    #[tokio::test]
    async fn test_recurrence_input_rules() {
        let fx = fixture().await;
        let a = fx.user("alice").await;

        let mut req = recurring(fx.tomorrow(), "weekly");
        req.recurrence_interval = None;
        assert!(matches!(
            fx.service.create_session(&req, &a).await,
            Err(CoreError::Validation { field: "recurrence_interval", .. })
        ));

        let req = recurring(fx.tomorrow(), "daily");
        assert!(matches!(
            fx.service.create_session(&req, &a).await,
            Err(CoreError::Validation { field: "recurrence_interval", .. })
        ));
        assert_eq!(fx.session_count().await, 0);

        // Not recurring: a stray interval is dropped
        let mut req = new_session(fx.tomorrow());
        req.recurrence_interval = Some("weekly".to_string());
        let created = fx.service.create_session(&req, &a).await.unwrap();
        assert!(!created.session.is_recurring);
        assert_eq!(created.session.recurrence_interval, None);
        assert!(created.children.is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_dates() {
        let fx = fixture().await;
        let a = fx.user("alice").await;

        for bad in ["tomorrow", "09/02/2026", "2026-13-01"] {
            let err = fx
                .service
                .create_session(&new_session(bad.to_string()), &a)
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidDateFormat(_)), "{}", bad);
        }

        let yesterday = (fx.today() - Duration::days(1)).to_string();
        assert!(matches!(
            fx.service.create_session(&new_session(yesterday), &a).await,
            Err(CoreError::InvalidDateFormat(_))
        ));

        // Today is still allowed, with or without a time part
        let today = fx.today().to_string();
        fx.service.create_session(&new_session(today.clone()), &a).await.unwrap();
        fx.service
            .create_session(&new_session(format!("{} 14:00", today)), &a)
            .await
            .unwrap();
        assert_eq!(fx.session_count().await, 2);
    }

    #[tokio::test]
    async fn test_create_requires_fields() {
        let fx = fixture().await;
        let a = fx.user("alice").await;

        let mut req = new_session(fx.tomorrow());
        req.title = "  ".to_string();
        assert!(matches!(
            fx.service.create_session(&req, &a).await,
            Err(CoreError::Validation { field: "title", .. })
        ));

        let mut req = new_session(fx.tomorrow());
        req.location = String::new();
        assert!(matches!(
            fx.service.create_session(&req, &a).await,
            Err(CoreError::Validation { field: "location", .. })
        ));
        assert_eq!(fx.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_create_persists_nothing() {
        let fx = fixture().await;
        let ghost = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: "ghost".to_string(),
            email: "ghost@example.com".to_string(),
            password_hash: String::new(),
            created_at: fx.clock.now(),
        };

        let result = fx
            .service
            .create_session(&recurring(fx.tomorrow(), "weekly"), &ghost)
            .await;
        assert!(matches!(result, Err(CoreError::Database(_))));
        assert_eq!(fx.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_join_rules() {
        let fx = fixture().await;
        let a = fx.user("alice").await;
        let b = fx.user("bob").await;

        let s = fx
            .service
            .create_session(&new_session(fx.tomorrow()), &a)
            .await
            .unwrap()
            .session;

        assert!(matches!(
            fx.service.join_session(&s.id, &a).await,
            Err(CoreError::AlreadyMember)
        ));

        fx.service.join_session(&s.id, &b).await.unwrap();
        assert!(matches!(
            fx.service.join_session(&s.id, &b).await,
            Err(CoreError::AlreadyMember)
        ));
        assert_eq!(fx.service.participant_count(&s.id).await.unwrap(), 2);

        assert!(matches!(
            fx.service.join_session("missing", &b).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_join_past_session() {
        let fx = fixture().await;
        let a = fx.user("alice").await;
        let b = fx.user("bob").await;

        let s = fx
            .service
            .create_session(&new_session(fx.tomorrow()), &a)
            .await
            .unwrap()
            .session;

        // Still joinable on the day itself, late in the evening
        fx.clock.advance(Duration::days(1) + Duration::hours(13));
        assert_eq!(fx.today(), s.date);
        fx.service.join_session(&s.id, &b).await.unwrap();
        fx.service.leave_session(&s.id, &b).await.unwrap();

        // The session is now yesterday
        fx.clock.advance(Duration::hours(2));
        assert!(matches!(
            fx.service.join_session(&s.id, &b).await,
            Err(CoreError::SessionInPast)
        ));
        assert!(!fx.service.is_member(&s.id, &b.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_leave_rules() {
        let fx = fixture().await;
        let a = fx.user("alice").await;
        let b = fx.user("bob").await;

        let s = fx
            .service
            .create_session(&new_session(fx.tomorrow()), &a)
            .await
            .unwrap()
            .session;

        assert!(matches!(
            fx.service.leave_session(&s.id, &b).await,
            Err(CoreError::NotAMember)
        ));

        // Creator is refused even if the membership row is gone
        sqlx::query("DELETE FROM session_members WHERE session_id = ? AND user_id = ?")
            .bind(&s.id)
            .bind(&a.id)
            .execute(&fx.pool)
            .await
            .unwrap();
        assert!(matches!(
            fx.service.leave_session(&s.id, &a).await,
            Err(CoreError::Forbidden(_))
        ));

        assert!(matches!(
            fx.service.leave_session("missing", &b).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_edit_session() {
        let fx = fixture().await;
        let a = fx.user("alice").await;
        let b = fx.user("bob").await;

        let s = fx
            .service
            .create_session(&recurring(fx.tomorrow(), "monthly"), &a)
            .await
            .unwrap()
            .session;

        assert!(matches!(
            fx.service.edit_session(&s.id, &update("2026-10-01"), &b).await,
            Err(CoreError::Forbidden(_))
        ));
        assert_eq!(fx.service.get_session(&s.id).await.unwrap(), s);

        assert!(matches!(
            fx.service.edit_session(&s.id, &update("10/01/2026"), &a).await,
            Err(CoreError::InvalidDateFormat(_))
        ));
        assert_eq!(fx.service.get_session(&s.id).await.unwrap(), s);

        let edited = fx
            .service
            .edit_session(&s.id, &update("2026-10-01"), &a)
            .await
            .unwrap();
        assert_eq!(edited.title, "Renamed");
        assert_eq!(edited.date, NaiveDate::from_ymd_opt(2026, 10, 1).unwrap());
        assert_eq!(edited.time, "9:00 AM");
        assert_eq!(edited.location, "Room 4");
        assert_eq!(edited.topic, None);

        // Untouched by edits
        assert_eq!(edited.id, s.id);
        assert_eq!(edited.creator_id, s.creator_id);
        assert_eq!(edited.created_at, s.created_at);
        assert!(edited.is_recurring);
        assert_eq!(edited.recurrence_interval, s.recurrence_interval);
        assert_eq!(edited.parent_id, None);
        assert_eq!(fx.member_ids(&s.id).await, vec![a.id.clone()]);

        assert!(matches!(
            fx.service.edit_session("missing", &update("2026-10-01"), &a).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_session() {
        let fx = fixture().await;
        let a = fx.user("alice").await;
        let b = fx.user("bob").await;

        let created = fx
            .service
            .create_session(&recurring(fx.tomorrow(), "weekly"), &a)
            .await
            .unwrap();
        let s = created.session;
        fx.service.join_session(&s.id, &b).await.unwrap();
        fx.service.add_comment(&s.id, &b, "Bring snacks").await.unwrap();

        assert!(matches!(
            fx.service.delete_session(&s.id, &b).await,
            Err(CoreError::Forbidden(_))
        ));
        assert_eq!(fx.service.get_session(&s.id).await.unwrap(), s);
        assert_eq!(fx.service.list_comments(&s.id).await.unwrap().len(), 1);

        fx.service.delete_session(&s.id, &a).await.unwrap();

        assert!(matches!(
            fx.service.get_session(&s.id).await,
            Err(CoreError::NotFound(_))
        ));
        let comments: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM session_comments WHERE session_id = ?")
                .bind(&s.id)
                .fetch_one(&fx.pool)
                .await
                .unwrap();
        assert_eq!(comments.0, 0);
        assert_eq!(fx.service.participant_count(&s.id).await.unwrap(), 0);

        // Children survive as standalone sessions
        for child in &created.children {
            let stored = fx.service.get_session(&child.id).await.unwrap();
            assert_eq!(stored.parent_id, None);
            assert!(fx.service.is_member(&child.id, &a.id).await.unwrap());
        }

        assert!(matches!(
            fx.service.delete_session(&s.id, &a).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_joined_and_available() {
        let fx = fixture().await;
        let a = fx.user("alice").await;
        let b = fx.user("bob").await;

        let later = fx
            .service
            .create_session(&new_session("2026-09-20".to_string()), &a)
            .await
            .unwrap()
            .session;
        let sooner = fx
            .service
            .create_session(&new_session("2026-09-05".to_string()), &a)
            .await
            .unwrap()
            .session;
        let own = fx
            .service
            .create_session(&new_session("2026-09-10".to_string()), &b)
            .await
            .unwrap()
            .session;

        let ids = |v: Vec<StudySession>| v.into_iter().map(|s| s.id).collect::<Vec<_>>();

        assert_eq!(ids(fx.service.list_joined(&b).await.unwrap()), vec![own.id.clone()]);
        assert_eq!(
            ids(fx.service.list_available(&b).await.unwrap()),
            vec![sooner.id.clone(), later.id.clone()]
        );

        fx.service.join_session(&later.id, &b).await.unwrap();
        assert_eq!(
            ids(fx.service.list_joined(&b).await.unwrap()),
            vec![own.id.clone(), later.id.clone()]
        );
        assert_eq!(
            ids(fx.service.list_available(&b).await.unwrap()),
            vec![sooner.id.clone()]
        );
        assert_eq!(
            ids(fx.service.list_available(&a).await.unwrap()),
            vec![own.id.clone()]
        );
    }

    #[tokio::test]
    async fn test_session_detail() {
        let fx = fixture().await;
        let a = fx.user("alice").await;
        let b = fx.user("bob").await;

        let s = fx
            .service
            .create_session(&new_session(fx.tomorrow()), &a)
            .await
            .unwrap()
            .session;
        fx.service.join_session(&s.id, &b).await.unwrap();
        fx.service.add_comment(&s.id, &a, "Room booked").await.unwrap();

        let detail = fx.service.session_detail(&s.id).await.unwrap();
        assert_eq!(detail.session, s);
        assert_eq!(detail.creator.username, "alice");
        assert_eq!(detail.participant_count, 2);
        assert_eq!(detail.members.len(), 2);
        assert!(!detail.is_past);
        assert_eq!(detail.suggested_location, "Library Group Study Room");
        assert_eq!(detail.comments.len(), 1);
        assert_eq!(detail.comments[0].author_username, "alice");

        fx.clock.advance(Duration::days(3));
        assert!(fx.service.session_detail(&s.id).await.unwrap().is_past);

        assert!(matches!(
            fx.service.session_detail("missing").await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_edit_rejects_blank_fields() {
        let fx = fixture().await;
        let a = fx.user("alice").await;
        let s = fx
            .service
            .create_session(&new_session(fx.tomorrow()), &a)
            .await
            .unwrap()
            .session;

        let mut req = update("2026-10-01");
        req.title = "   ".to_string();
        assert!(matches!(
            fx.service.edit_session(&s.id, &req, &a).await,
            Err(CoreError::Validation { field: "title", .. })
        ));
        assert_eq!(fx.service.get_session(&s.id).await.unwrap(), s);

        let mut req = update("2026-10-01");
        req.location = String::new();
        assert!(matches!(
            fx.service.edit_session(&s.id, &req, &a).await,
            Err(CoreError::Validation { field: "location", .. })
        ));
        assert_eq!(fx.service.get_session(&s.id).await.unwrap(), s);
    }

    #[tokio::test]
    async fn test_join_waits_for_concurrent_writer() {
        let (fx, _dir) = fixture_on_disk().await;
        let a = fx.user("alice").await;
        let b = fx.user("bob").await;
        let s = fx
            .service
            .create_session(&new_session(fx.tomorrow()), &a)
            .await
            .unwrap()
            .session;

        // Another writer enrolls bob and is still open while bob's own join
        // request arrives
        let mut other = begin_write(&fx.pool).await.unwrap();
        insert_member(&mut other, &s.id, &b.id, fx.clock.now())
            .await
            .unwrap();

        let service = fx.service.clone();
        let (session_id, bob) = (s.id.clone(), b.clone());
        let join = tokio::spawn(async move { service.join_session(&session_id, &bob).await });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        other.commit().await.unwrap();

        let result = join.await.unwrap();
        assert!(matches!(result, Err(CoreError::AlreadyMember)), "{:?}", result);
        assert_eq!(fx.service.participant_count(&s.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_joins() {
        let (fx, _dir) = fixture_on_disk().await;
        let a = fx.user("alice").await;
        let b = fx.user("bob").await;
        let s = fx
            .service
            .create_session(&new_session(fx.tomorrow()), &a)
            .await
            .unwrap()
            .session;

        let (first, second) = tokio::join!(
            fx.service.join_session(&s.id, &b),
            fx.service.join_session(&s.id, &b)
        );
        let results = [first, second];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(CoreError::AlreadyMember))));
        assert_eq!(fx.member_ids(&s.id).await.len(), 2);
    }
}
