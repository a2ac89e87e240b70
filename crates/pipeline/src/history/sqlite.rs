//! SQLite history store.
//!
//! One `messages` table keyed by session id. Rows are read back in insert
//! order, so the bounded suffix is the newest `limit` rows by id.

use super::{ChatHistory, HistoryStore};
use relay_core::{AppError, AppResult};
use relay_llm::{LlmMessage, Role};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// History persisted in a single SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
    limit: usize,
}

impl SqliteHistoryStore {
    /// Open (or create) the history file.
    pub fn open(path: &Path, limit: usize) -> AppResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::History(format!("Failed to create history directory: {}", e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::History(format!("Failed to open history {:?}: {}", path, e)))?;
        tracing::debug!("Opened history store at {:?}", path);
        Self::with_connection(conn, limit)
    }

    pub fn open_in_memory(limit: usize) -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::History(format!("Failed to open in-memory history: {}", e)))?;
        Self::with_connection(conn, limit)
    }

    fn with_connection(conn: Connection, limit: usize) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, id);
            "#,
        )
        .map_err(|e| AppError::History(format!("Failed to create tables: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            limit,
        })
    }

    /// Distinct session ids with their message counts, most recent first.
    pub async fn sessions(&self) -> AppResult<Vec<(String, usize)>> {
        blocking(&self.conn, |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, COUNT(*) FROM messages \
                     GROUP BY session_id ORDER BY MAX(id) DESC",
                )
                .map_err(|e| AppError::History(format!("Failed to list sessions: {}", e)))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
                })
                .map_err(|e| AppError::History(format!("Failed to list sessions: {}", e)))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| AppError::History(format!("Failed to read session row: {}", e)))
        })
        .await
    }
}

#[async_trait::async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn history(&self, session_id: &str) -> AppResult<Arc<dyn ChatHistory>> {
        Ok(Arc::new(SqliteHistory {
            conn: Arc::clone(&self.conn),
            session_id: session_id.to_string(),
            limit: self.limit,
        }))
    }
}

struct SqliteHistory {
    conn: Arc<Mutex<Connection>>,
    session_id: String,
    limit: usize,
}

impl SqliteHistory {
    async fn append(&self, role: Role, text: &str) -> AppResult<()> {
        let session_id = self.session_id.clone();
        let text = text.to_string();
        blocking(&self.conn, move |conn| {
            conn.execute(
                "INSERT INTO messages (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![session_id, role.as_str(), text, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(|e| AppError::History(format!("Failed to append message: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn load(&self, limit: Option<usize>) -> AppResult<Vec<LlmMessage>> {
        let session_id = self.session_id.clone();
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        blocking(&self.conn, move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT role, content FROM ( \
                         SELECT id, role, content FROM messages \
                         WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2 \
                     ) ORDER BY id ASC",
                )
                .map_err(|e| AppError::History(format!("Failed to query history: {}", e)))?;
            let rows = stmt
                .query_map(params![session_id, limit], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|e| AppError::History(format!("Failed to query history: {}", e)))?;

            let mut messages = Vec::new();
            for row in rows {
                let (role, content) = row
                    .map_err(|e| AppError::History(format!("Failed to read message row: {}", e)))?;
                messages.push(message_from_row(&role, content)?);
            }
            Ok(messages)
        })
        .await
    }
}

#[async_trait::async_trait]
impl ChatHistory for SqliteHistory {
    async fn add_user_message(&self, text: &str) -> AppResult<()> {
        self.append(Role::User, text).await
    }

    async fn add_ai_message(&self, text: &str) -> AppResult<()> {
        self.append(Role::Assistant, text).await
    }

    async fn get_messages(&self) -> AppResult<Vec<LlmMessage>> {
        self.load(Some(self.limit)).await
    }

    async fn all_messages(&self) -> AppResult<Vec<LlmMessage>> {
        self.load(None).await
    }

    async fn clear(&self) -> AppResult<()> {
        let session_id = self.session_id.clone();
        let removed = blocking(&self.conn, move |conn| {
            conn.execute("DELETE FROM messages WHERE session_id = ?1", params![session_id])
                .map_err(|e| AppError::History(format!("Failed to clear history: {}", e)))
        })
        .await?;
        tracing::info!(session = %self.session_id, removed, "Cleared session history");
        Ok(())
    }
}

fn message_from_row(role: &str, content: String) -> AppResult<LlmMessage> {
    match role {
        "user" => Ok(LlmMessage::user(content)),
        "assistant" => Ok(LlmMessage::assistant(content)),
        "system" => Ok(LlmMessage::system(content)),
        other => Err(AppError::History(format!("Unknown message role '{}'", other))),
    }
}

async fn blocking<T, F>(conn: &Arc<Mutex<Connection>>, f: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let conn = conn
            .lock()
            .map_err(|_| AppError::History("History connection lock poisoned".to_string()))?;
        f(&conn)
    })
    .await
    .map_err(|e| AppError::History(format!("History task failed: {}", e)))?
}
