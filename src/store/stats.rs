use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::debug;

use super::Store;
use crate::dispatcher::MessageObserver;
use crate::platform::InboundMessage;

/// Post statistics of one chat member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStats {
    pub user_id: i64,
    pub username: String,
    pub posts: i64,
    pub last_post: String,
}

/// Words written by one chat member over all recorded messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordCount {
    pub username: String,
    pub words: i64,
}

#[derive(Clone)]
pub struct StatsRepo {
    conn: Arc<Mutex<Connection>>,
}

impl StatsRepo {
    pub fn new(store: &Store) -> Self {
        Self {
            conn: store.connection(),
        }
    }

    /// Count one more post for the user, refreshing the username
    pub async fn record_post(&self, user_id: i64, username: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO user_stats (user_id, username, posts, last_post) VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                posts = user_stats.posts + 1,
                last_post = excluded.last_post",
            rusqlite::params![user_id, username, at.to_rfc3339()],
        )
        .context("Failed to update user stats")?;
        Ok(())
    }

    pub async fn insert_message_stats(
        &self,
        user_id: i64,
        words: usize,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO message_stats (user_id, time, words) VALUES (?1, ?2, ?3)",
            rusqlite::params![user_id, at.to_rfc3339(), words as i64],
        )
        .context("Failed to insert message stats")?;
        Ok(())
    }

    /// Known users, most active first
    pub async fn top_users(&self) -> Result<Vec<UserStats>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT user_id, username, posts, last_post FROM user_stats
                 WHERE user_id != 0
                 ORDER BY posts DESC, username ASC",
            )
            .context("Failed to prepare top users query")?;
        let users = stmt
            .query_map([], |row| {
                Ok(UserStats {
                    user_id: row.get(0)?,
                    username: row.get(1)?,
                    posts: row.get(2)?,
                    last_post: row.get(3)?,
                })
            })
            .context("Failed to map rows")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to collect rows")?;
        Ok(users)
    }

    /// Total words written per user, most words first
    pub async fn word_counts(&self) -> Result<Vec<WordCount>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT COALESCE(u.username, CAST(m.user_id AS TEXT)), SUM(m.words) AS total
                 FROM message_stats m
                 LEFT JOIN user_stats u ON u.user_id = m.user_id
                 WHERE m.user_id != 0
                 GROUP BY m.user_id
                 ORDER BY total DESC, m.user_id ASC",
            )
            .context("Failed to prepare word count query")?;
        let counts = stmt
            .query_map([], |row| {
                Ok(WordCount {
                    username: row.get(0)?,
                    words: row.get(1)?,
                })
            })
            .context("Failed to map rows")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to collect rows")?;
        Ok(counts)
    }
}

/// Records per-message statistics once a dispatch cycle has finished.
pub struct StatsRecorder {
    repo: StatsRepo,
}

impl StatsRecorder {
    pub fn new(repo: StatsRepo) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl MessageObserver for StatsRecorder {
    async fn observe(&self, message: &InboundMessage) -> Result<()> {
        // Anonymous senders (channel posts) are not tracked
        if message.user_id == 0 {
            return Ok(());
        }

        self.repo
            .record_post(message.user_id, &message.username, message.timestamp)
            .await?;
        self.repo
            .insert_message_stats(message.user_id, message.word_count(), message.timestamp)
            .await?;

        debug!("Recorded stats for user {}", message.user_id);
        Ok(())
    }
}
