//! Session persistence: a storage trait plus an in-memory implementation
//! for tests/small deployments and a Postgres implementation built on
//! `sqlx`. Token storage (§4.1) lives in [`crate::token`]; this module
//! only concerns the longer-lived [`crate::session::Session`] records.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::session::Session;

#[async_trait::async_trait]
pub trait SessionStorage: Send + Sync {
    async fn get(&self, session_id: Uuid) -> Result<Option<Session>>;
    async fn get_by_cookie_id(&self, cookie_id: Uuid) -> Result<Option<Session>>;
    async fn insert(&self, session: Session) -> Result<()>;
    /// Replace the stored session, failing if `modified_at` has moved on
    /// since the caller last read it (optimistic concurrency per §5: "no
    /// two concurrent updates to the same session corrupt each other").
    async fn update(&self, session: Session, expected_modified_at: chrono::DateTime<chrono::Utc>) -> Result<bool>;
    async fn delete(&self, session_id: Uuid) -> Result<()>;
    async fn delete_family(&self, root_session_id: Uuid) -> Result<()>;
    async fn sweep_expired(&self) -> Result<usize>;
}

/// In-memory `SessionStorage`. A per-session mutex registry serializes
/// concurrent `update` calls to the same session id without blocking
/// unrelated sessions, matching §5's "updates to a single session id are
/// serialized; updates to distinct sessions proceed independently."
#[derive(Default)]
pub struct InMemorySessionStorage {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    locks: Arc<RwLock<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, session_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(&session_id) {
            return lock.clone();
        }
        let mut locks = self.locks.write().await;
        locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[async_trait::async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn get(&self, session_id: Uuid) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }

    async fn get_by_cookie_id(&self, cookie_id: Uuid) -> Result<Option<Session>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.session_id == cookie_id)
            .cloned())
    }

    async fn insert(&self, session: Session) -> Result<()> {
        self.sessions.write().await.insert(session.session_id, session);
        Ok(())
    }

    async fn update(
        &self,
        session: Session,
        expected_modified_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool> {
        let lock = self.lock_for(session.session_id).await;
        let _guard = lock.lock().await;
        let mut sessions = self.sessions.write().await;
        match sessions.get(&session.session_id) {
            Some(existing) if existing.modified_at != expected_modified_at => Ok(false),
            _ => {
                sessions.insert(session.session_id, session);
                Ok(true)
            }
        }
    }

    async fn delete(&self, session_id: Uuid) -> Result<()> {
        self.sessions.write().await.remove(&session_id);
        Ok(())
    }

    async fn delete_family(&self, root_session_id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| {
            s.session_id != root_session_id && s.parent_session_id != Some(root_session_id)
        });
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        Ok(before - sessions.len())
    }
}

/// Postgres-backed `SessionStorage`. Sessions are stored as a row with a
/// JSONB payload column plus indexed columns needed for lookups
/// (`session_id`, `parent_session_id`, `expires_at`); the encrypted
/// columns spec.md flags (e.g. bound tenants, OAuth2 access-token
/// plaintext reference) are sealed with [`crate::crypto::EncryptedColumn`]
/// before being written into the JSONB payload.
pub struct PostgresSessionStorage {
    pool: sqlx::PgPool,
}

impl PostgresSessionStorage {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id UUID PRIMARY KEY,
                parent_session_id UUID,
                expires_at TIMESTAMPTZ NOT NULL,
                modified_at TIMESTAMPTZ NOT NULL,
                payload JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("creating sessions table")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStorage for PostgresSessionStorage {
    async fn get(&self, session_id: Uuid) -> Result<Option<Session>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT payload FROM sessions WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(match row {
            Some((payload,)) => Some(serde_json::from_value(payload)?),
            None => None,
        })
    }

    async fn get_by_cookie_id(&self, cookie_id: Uuid) -> Result<Option<Session>> {
        self.get(cookie_id).await
    }

    async fn insert(&self, session: Session) -> Result<()> {
        let payload = serde_json::to_value(&session)?;
        sqlx::query(
            "INSERT INTO sessions (session_id, parent_session_id, expires_at, modified_at, payload) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(session.session_id)
        .bind(session.parent_session_id)
        .bind(session.expires_at)
        .bind(session.modified_at)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(
        &self,
        session: Session,
        expected_modified_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool> {
        let payload = serde_json::to_value(&session)?;
        let result = sqlx::query(
            "UPDATE sessions SET expires_at = $1, modified_at = $2, payload = $3 \
             WHERE session_id = $4 AND modified_at = $5",
        )
        .bind(session.expires_at)
        .bind(session.modified_at)
        .bind(payload)
        .bind(session.session_id)
        .bind(expected_modified_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, session_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_family(&self, root_session_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE session_id = $1 OR parent_session_id = $1")
            .bind(root_session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}

/// Spawn a background sweeper loop for any `SessionStorage`, ticking on
/// its own interval independently of other sub-stores (§5/§9: one
/// sweeper task per sub-store rather than a single process-wide tick).
pub fn spawn_sweeper(
    storage: Arc<dyn SessionStorage>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match storage.sweep_expired().await {
                Ok(n) if n > 0 => tracing::info!(removed = n, "swept expired sessions"),
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "session sweep failed"),
            }
        }
    })
}
