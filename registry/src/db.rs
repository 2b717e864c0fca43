//! SQLite persistence for the session table.
//!
//! WAL mode gives concurrent readers plus a single writer; write
//! conflicts wait out the 2-second busy timeout instead of failing.
//! The schema is additive only: at startup missing columns are detected
//! via `PRAGMA table_info` and added, so older databases keep working
//! across upgrades.

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use tracing::info;

use slackline_protocol::DmSubscription;
use slackline_protocol::InteractionMode;
use slackline_protocol::SessionRecord;
use slackline_protocol::SessionStatus;

use crate::error::RegistryError;
use crate::error::Result;

/// Columns a caller may change after insertion. `None` leaves the
/// column untouched.
#[derive(Debug, Default, Clone)]
pub struct SessionUpdate {
    pub thread_ts: Option<String>,
    pub channel: Option<String>,
    pub permissions_channel: Option<String>,
    pub slack_user_id: Option<String>,
    pub status: Option<SessionStatus>,
    pub last_activity: Option<DateTime<Utc>>,
    pub project_dir: Option<String>,
    pub reply_to_ts: Option<String>,
    pub todo_message_ts: Option<String>,
    pub permission_message_ts: Option<String>,
    pub buffer_file_path: Option<String>,
}

impl SessionUpdate {
    pub fn status(status: SessionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn thread(thread_ts: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            thread_ts: Some(thread_ts.into()),
            channel: Some(channel.into()),
            ..Default::default()
        }
    }
}

/// Handle on the registry database. Clone-cheap; all access serializes
/// through one connection guarded by a mutex, which matches the
/// single-writer model and keeps rusqlite off the async executor
/// threads (callers wrap calls in `spawn_blocking` when on a runtime).
#[derive(Clone)]
pub struct RegistryDb {
    conn: Arc<Mutex<Connection>>,
}

impl RegistryDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // WAL returns the new mode from the pragma, so use query_row.
        let _mode: String =
            conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.execute_batch(
            "PRAGMA busy_timeout=2000;\n\
             PRAGMA synchronous=NORMAL;",
        )?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_tables()?;
        db.migrate()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id            VARCHAR(50) PRIMARY KEY,
                project               VARCHAR(255) NOT NULL,
                project_dir           VARCHAR(512),
                terminal              VARCHAR(100) NOT NULL,
                socket_path           VARCHAR(512) NOT NULL,
                thread_ts             VARCHAR(50),
                channel               VARCHAR(50),
                permissions_channel   VARCHAR(50),
                slack_user_id         VARCHAR(50),
                reply_to_ts           VARCHAR(50),
                todo_message_ts       VARCHAR(50),
                permission_message_ts VARCHAR(50),
                buffer_file_path      VARCHAR(512),
                status                VARCHAR(20) NOT NULL DEFAULT 'active',
                created_at            TEXT NOT NULL,
                last_activity         TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_status ON sessions(status);
            CREATE INDEX IF NOT EXISTS idx_last_activity ON sessions(last_activity);
            CREATE INDEX IF NOT EXISTS idx_thread ON sessions(thread_ts);
            CREATE INDEX IF NOT EXISTS idx_project_dir ON sessions(project_dir);

            CREATE TABLE IF NOT EXISTS dm_subscriptions (
                id            VARCHAR(50) PRIMARY KEY,
                user_id       VARCHAR(50) NOT NULL UNIQUE,
                session_id    VARCHAR(50) NOT NULL,
                dm_channel_id VARCHAR(50) NOT NULL,
                created_at    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_dm_user_id ON dm_subscriptions(user_id);
            CREATE INDEX IF NOT EXISTS idx_dm_session_id ON dm_subscriptions(session_id);

            CREATE TABLE IF NOT EXISTS user_preferences (
                user_id    VARCHAR(50) PRIMARY KEY,
                mode       VARCHAR(20) NOT NULL DEFAULT 'execute',
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Add columns that predate this binary's schema. Idempotent.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        let mut stmt = conn.prepare("PRAGMA table_info(sessions)")?;
        let existing: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<_, _>>()?;

        let wanted: [(&str, &str); 6] = [
            ("project_dir", "VARCHAR(512)"),
            ("permissions_channel", "VARCHAR(50)"),
            ("reply_to_ts", "VARCHAR(50)"),
            ("todo_message_ts", "VARCHAR(50)"),
            ("permission_message_ts", "VARCHAR(50)"),
            ("buffer_file_path", "VARCHAR(512)"),
        ];
        for (column, sql_type) in wanted {
            if !existing.iter().any(|c| c == column) {
                info!("migrating sessions table: adding column {column}");
                conn.execute_batch(&format!(
                    "ALTER TABLE sessions ADD COLUMN {column} {sql_type}"
                ))?;
            }
        }
        Ok(())
    }

    #[allow(clippy::unwrap_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    pub fn create_session(&self, record: &SessionRecord) -> Result<SessionRecord> {
        let conn = self.lock();
        conn.execute(
            r#"INSERT INTO sessions (
                session_id, project, project_dir, terminal, socket_path,
                thread_ts, channel, permissions_channel, slack_user_id,
                reply_to_ts, todo_message_ts, permission_message_ts,
                buffer_file_path, status, created_at, last_activity
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"#,
            params![
                record.session_id,
                record.project,
                record.project_dir,
                record.terminal,
                record.socket_path,
                record.thread_ts,
                record.channel,
                record.permissions_channel,
                record.slack_user_id,
                record.reply_to_ts,
                record.todo_message_ts,
                record.permission_message_ts,
                record.buffer_file_path,
                record.status.as_str(),
                record.created_at.to_rfc3339(),
                record.last_activity.to_rfc3339(),
            ],
        )?;
        Ok(record.clone())
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                &format!("{SELECT_SESSION} WHERE session_id = ?1"),
                params![session_id],
                row_to_session,
            )
            .optional()?;
        Ok(record)
    }

    pub fn update_session(&self, session_id: &str, update: &SessionUpdate) -> Result<bool> {
        let conn = self.lock();
        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        let mut push = |column: &str, value: Box<dyn rusqlite::ToSql>| {
            sets.push(format!("{column} = ?{}", values.len() + 1));
            values.push(value);
        };

        if let Some(v) = &update.thread_ts {
            push("thread_ts", Box::new(v.clone()));
        }
        if let Some(v) = &update.channel {
            push("channel", Box::new(v.clone()));
        }
        if let Some(v) = &update.permissions_channel {
            push("permissions_channel", Box::new(v.clone()));
        }
        if let Some(v) = &update.slack_user_id {
            push("slack_user_id", Box::new(v.clone()));
        }
        if let Some(v) = &update.status {
            push("status", Box::new(v.as_str().to_string()));
        }
        if let Some(v) = &update.project_dir {
            push("project_dir", Box::new(v.clone()));
        }
        if let Some(v) = &update.reply_to_ts {
            push("reply_to_ts", Box::new(v.clone()));
        }
        if let Some(v) = &update.todo_message_ts {
            push("todo_message_ts", Box::new(v.clone()));
        }
        if let Some(v) = &update.permission_message_ts {
            push("permission_message_ts", Box::new(v.clone()));
        }
        if let Some(v) = &update.buffer_file_path {
            push("buffer_file_path", Box::new(v.clone()));
        }
        // Activity is bumped on every update unless the caller pins it.
        let last_activity = update.last_activity.unwrap_or_else(Utc::now);
        push("last_activity", Box::new(last_activity.to_rfc3339()));

        let sql = format!(
            "UPDATE sessions SET {} WHERE session_id = ?{}",
            sets.join(", "),
            values.len() + 1
        );
        values.push(Box::new(session_id.to_string()));
        let changed = conn.execute(
            &sql,
            rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
        )?;
        Ok(changed > 0)
    }

    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "DELETE FROM sessions WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(changed > 0)
    }

    pub fn list_sessions(&self, status: Option<SessionStatus>) -> Result<Vec<SessionRecord>> {
        let conn = self.lock();
        let mut rows = Vec::new();
        match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_SESSION} WHERE status = ?1 ORDER BY created_at DESC"
                ))?;
                let iter = stmt.query_map(params![status.as_str()], row_to_session)?;
                for row in iter {
                    rows.push(row?);
                }
            }
            None => {
                let mut stmt =
                    conn.prepare(&format!("{SELECT_SESSION} ORDER BY created_at DESC"))?;
                let iter = stmt.query_map([], row_to_session)?;
                for row in iter {
                    rows.push(row?);
                }
            }
        }
        Ok(rows)
    }

    /// All active rows sharing a thread id. Multiple rows are expected
    /// (wrapper + agent uuid); the caller tie-breaks with
    /// [`slackline_protocol::session::prefer_socket_owner`].
    pub fn get_by_thread(&self, thread_ts: &str) -> Result<Vec<SessionRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_SESSION} WHERE thread_ts = ?1 AND status = 'active'"
        ))?;
        let iter = stmt.query_map(params![thread_ts], row_to_session)?;
        let mut rows = Vec::new();
        for row in iter {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// The most recently created row for a project directory. Fallback
    /// for hooks whose session id does not resolve.
    pub fn get_by_project_dir(
        &self,
        project_dir: &str,
        status: SessionStatus,
    ) -> Result<Option<SessionRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                &format!(
                    "{SELECT_SESSION} WHERE project_dir = ?1 AND status = ?2 \
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![project_dir, status.as_str()],
                row_to_session,
            )
            .optional()?;
        Ok(record)
    }

    /// Active sessions registered with a custom channel (channel mode).
    pub fn get_by_channel(&self, channel: &str) -> Result<Vec<SessionRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_SESSION} WHERE channel = ?1 AND thread_ts IS NULL AND status = 'active' \
             ORDER BY created_at DESC"
        ))?;
        let iter = stmt.query_map(params![channel], row_to_session)?;
        let mut rows = Vec::new();
        for row in iter {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Delete ended/crashed rows whose last activity is older than
    /// `older_than_hours`, returning them so the caller can archive
    /// their chat threads.
    pub fn cleanup_old_sessions(&self, older_than_hours: i64) -> Result<Vec<SessionRecord>> {
        let cutoff = Utc::now() - Duration::hours(older_than_hours);
        let stale: Vec<SessionRecord> = self
            .list_sessions(None)?
            .into_iter()
            .filter(|s| s.status.is_terminal() && s.last_activity < cutoff)
            .collect();
        for session in &stale {
            self.delete_session(&session.session_id)?;
            self.cleanup_dm_subscriptions_for_session(&session.session_id)?;
        }
        Ok(stale)
    }

    // ── DM subscriptions ────────────────────────────────────────────

    /// Create or replace a user's subscription; a user follows at most
    /// one session.
    pub fn create_dm_subscription(
        &self,
        user_id: &str,
        session_id: &str,
        dm_channel_id: &str,
    ) -> Result<DmSubscription> {
        let now = Utc::now();
        let conn = self.lock();
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM dm_subscriptions WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        let id = match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE dm_subscriptions SET session_id = ?1, dm_channel_id = ?2, \
                     created_at = ?3 WHERE user_id = ?4",
                    params![session_id, dm_channel_id, now.to_rfc3339(), user_id],
                )?;
                id
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO dm_subscriptions (id, user_id, session_id, dm_channel_id, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, user_id, session_id, dm_channel_id, now.to_rfc3339()],
                )?;
                id
            }
        };
        Ok(DmSubscription {
            id,
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            dm_channel_id: dm_channel_id.to_string(),
            created_at: now,
        })
    }

    pub fn get_dm_subscription_for_user(&self, user_id: &str) -> Result<Option<DmSubscription>> {
        let conn = self.lock();
        let sub = conn
            .query_row(
                "SELECT id, user_id, session_id, dm_channel_id, created_at \
                 FROM dm_subscriptions WHERE user_id = ?1",
                params![user_id],
                row_to_subscription,
            )
            .optional()?;
        Ok(sub)
    }

    pub fn get_dm_subscriptions_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<DmSubscription>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, session_id, dm_channel_id, created_at \
             FROM dm_subscriptions WHERE session_id = ?1",
        )?;
        let iter = stmt.query_map(params![session_id], row_to_subscription)?;
        let mut subs = Vec::new();
        for sub in iter {
            subs.push(sub?);
        }
        Ok(subs)
    }

    pub fn delete_dm_subscription(&self, user_id: &str) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "DELETE FROM dm_subscriptions WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(changed > 0)
    }

    pub fn cleanup_dm_subscriptions_for_session(&self, session_id: &str) -> Result<usize> {
        let conn = self.lock();
        let changed = conn.execute(
            "DELETE FROM dm_subscriptions WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(changed)
    }

    // ── User preferences ────────────────────────────────────────────

    pub fn get_user_mode(&self, user_id: &str) -> Result<InteractionMode> {
        let conn = self.lock();
        let mode: Option<String> = conn
            .query_row(
                "SELECT mode FROM user_preferences WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(mode
            .as_deref()
            .and_then(InteractionMode::parse)
            .unwrap_or_default())
    }

    pub fn set_user_mode(&self, user_id: &str, mode: &str) -> Result<InteractionMode> {
        let mode = InteractionMode::parse(mode)
            .ok_or_else(|| RegistryError::InvalidMode(mode.to_string()))?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO user_preferences (user_id, mode, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(user_id) DO UPDATE SET mode = ?2, updated_at = ?3",
            params![user_id, mode.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(mode)
    }
}

const SELECT_SESSION: &str = "SELECT session_id, project, project_dir, terminal, socket_path, \
     thread_ts, channel, permissions_channel, slack_user_id, reply_to_ts, \
     todo_message_ts, permission_message_ts, buffer_file_path, status, \
     created_at, last_activity FROM sessions";

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let status: String = row.get(13)?;
    let created_at: String = row.get(14)?;
    let last_activity: String = row.get(15)?;
    Ok(SessionRecord {
        session_id: row.get(0)?,
        project: row.get(1)?,
        project_dir: row.get(2)?,
        terminal: row.get(3)?,
        socket_path: row.get(4)?,
        thread_ts: row.get(5)?,
        channel: row.get(6)?,
        permissions_channel: row.get(7)?,
        slack_user_id: row.get(8)?,
        reply_to_ts: row.get(9)?,
        todo_message_ts: row.get(10)?,
        permission_message_ts: row.get(11)?,
        buffer_file_path: row.get(12)?,
        status: SessionStatus::parse(&status).unwrap_or(SessionStatus::Inactive),
        created_at: parse_ts(&created_at),
        last_activity: parse_ts(&last_activity),
    })
}

fn row_to_subscription(row: &Row<'_>) -> rusqlite::Result<DmSubscription> {
    let created_at: String = row.get(4)?;
    Ok(DmSubscription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_id: row.get(2)?,
        dm_channel_id: row.get(3)?,
        created_at: parse_ts(&created_at),
    })
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Fresh row for insertion, timestamps set to now.
pub fn new_session_record(
    session_id: &str,
    project: &str,
    terminal: &str,
    socket_path: &str,
) -> SessionRecord {
    let now = Utc::now();
    SessionRecord {
        session_id: session_id.to_string(),
        project: project.to_string(),
        project_dir: None,
        terminal: terminal.to_string(),
        socket_path: socket_path.to_string(),
        thread_ts: None,
        channel: None,
        permissions_channel: None,
        slack_user_id: None,
        reply_to_ts: None,
        todo_message_ts: None,
        permission_message_ts: None,
        buffer_file_path: None,
        status: SessionStatus::Active,
        created_at: now,
        last_activity: now,
    }
}
