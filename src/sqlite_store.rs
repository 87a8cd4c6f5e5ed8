//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Maps each [`DocumentStore`] operation onto the `documents` table created
//! by [`crate::migrate`].

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use ragdesk_core::models::Document;
use ragdesk_core::store::DocumentStore;

/// SQLite implementation of the [`DocumentStore`] trait.
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn append(&self, topic: &str, title: &str, text: &str) -> Result<Document> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO documents (topic, title, text, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(topic)
        .bind(title)
        .bind(text)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Document {
            id: result.last_insert_rowid(),
            topic: topic.to_string(),
            title: title.to_string(),
            text: text.to_string(),
            created_at,
        })
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT id, topic, title, text, created_at FROM documents ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            docs.push(Document {
                id: row.try_get("id")?,
                topic: row.try_get("topic")?,
                title: row.try_get("title")?,
                text: row.try_get("text")?,
                created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            });
        }
        Ok(docs)
    }

    async fn list_topics(&self) -> Result<Vec<String>> {
        let topics: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT topic FROM documents ORDER BY topic")
                .fetch_all(&self.pool)
                .await?;
        Ok(topics)
    }

    async fn delete_by_topic(&self, topic: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM documents WHERE topic = ?")
            .bind(topic)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
