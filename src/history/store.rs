use async_trait::async_trait;
use chrono::Utc;
use duckdb::{params, Connection};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::DbPool;
use crate::history::{ChatMessage, HistoryError, HistoryStore};

/// Transcripts kept as a JSON array per session key in the `chat_history` table.
pub struct DuckDbHistoryStore {
    pool: DbPool,
    ttl: Duration,
}

impl DuckDbHistoryStore {
    pub fn new(pool: DbPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn key(session_id: &str) -> String {
        format!("chat:{}", session_id)
    }

    fn read(conn: &Connection, key: &str) -> Result<Vec<ChatMessage>, HistoryError> {
        let mut stmt = conn.prepare("SELECT payload, expires_at FROM chat_history WHERE session_key = ?")?;
        let mut rows = stmt.query_map(params![key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let (payload, expires_at) = match rows.next() {
            Some(row) => row?,
            None => return Ok(Vec::new()),
        };

        if expires_at <= Utc::now().timestamp_millis() {
            debug!("History {} expired, dropping it", key);
            conn.execute("DELETE FROM chat_history WHERE session_key = ?", params![key])?;
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Vec<ChatMessage>>(&payload) {
            Ok(history) => Ok(history),
            Err(e) => {
                warn!("Discarding undecodable history {}: {}", key, e);
                Ok(Vec::new())
            }
        }
    }

    fn write(&self, conn: &Connection, key: &str, history: &[ChatMessage]) -> Result<(), HistoryError> {
        let payload = serde_json::to_string(history)?;
        let expires_at = Utc::now().timestamp_millis() + self.ttl.as_millis() as i64;

        let updated = conn.execute(
            "UPDATE chat_history SET payload = ?, expires_at = ? WHERE session_key = ?",
            params![payload, expires_at, key],
        )?;
        if updated == 0 {
            conn.execute(
                "INSERT INTO chat_history (session_key, payload, expires_at) VALUES (?, ?, ?)",
                params![key, payload, expires_at],
            )?;
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for DuckDbHistoryStore {
    async fn load(&self, session_id: &str) -> Result<Vec<ChatMessage>, HistoryError> {
        let conn = self.pool.lock().map_err(|_| HistoryError::LockPoisoned)?;
        let history = Self::read(&conn, &Self::key(session_id))?;
        debug!("[Session {}] Loaded {} messages from history", session_id, history.len());
        Ok(history)
    }

    async fn append(&self, session_id: &str, message: ChatMessage) -> Result<(), HistoryError> {
        self.append_all(session_id, vec![message]).await
    }

    async fn append_all(&self, session_id: &str, messages: Vec<ChatMessage>) -> Result<(), HistoryError> {
        let key = Self::key(session_id);
        let conn = self.pool.lock().map_err(|_| HistoryError::LockPoisoned)?;

        let mut history = Self::read(&conn, &key)?;
        history.extend(messages);
        self.write(&conn, &key, &history)?;

        debug!("[Session {}] Saved {} messages to history", session_id, history.len());
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<(), HistoryError> {
        let conn = self.pool.lock().map_err(|_| HistoryError::LockPoisoned)?;
        conn.execute(
            "DELETE FROM chat_history WHERE session_key = ?",
            params![Self::key(session_id)],
        )?;
        info!("[Session {}] Cleared conversation history", session_id);
        Ok(())
    }
}
