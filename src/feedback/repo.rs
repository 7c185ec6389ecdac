use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{Feedback, FeedbackRow, Status};
use crate::json_file::JsonFile;

/// Append-only feedback collection. Only `status` may change after insert.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Every record, in storage order. Always re-reads the backing store.
    async fn list(&self) -> anyhow::Result<Vec<Feedback>>;
    async fn insert(&self, feedback: &Feedback) -> anyhow::Result<()>;
    async fn set_status(&self, id: Uuid, status: Status) -> anyhow::Result<Option<Feedback>>;
}

/// Feedback kept as a pretty-printed array in `feedback.json`.
pub struct JsonFeedbackStore {
    file: JsonFile<Feedback>,
}

impl JsonFeedbackStore {
    pub fn new(file: JsonFile<Feedback>) -> Self {
        Self { file }
    }
}

#[async_trait]
impl FeedbackStore for JsonFeedbackStore {
    async fn list(&self) -> anyhow::Result<Vec<Feedback>> {
        self.file.read_all().await
    }

    async fn insert(&self, feedback: &Feedback) -> anyhow::Result<()> {
        self.file
            .update(|items| {
                anyhow::ensure!(
                    items.iter().all(|f| f.id != feedback.id),
                    "feedback {} already stored",
                    feedback.id
                );
                items.push(feedback.clone());
                Ok(Some(()))
            })
            .await?;
        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: Status) -> anyhow::Result<Option<Feedback>> {
        self.file
            .update(|items| {
                let Some(item) = items.iter_mut().find(|f| f.id == id) else {
                    return Ok(None);
                };
                item.status = status;
                Ok(Some(item.clone()))
            })
            .await
    }
}

pub struct PgFeedbackStore {
    db: PgPool,
}

impl PgFeedbackStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FeedbackStore for PgFeedbackStore {
    async fn list(&self) -> anyhow::Result<Vec<Feedback>> {
        let rows = sqlx::query_as::<_, FeedbackRow>(
            r#"
            SELECT id, category, description, location, image, status, created_at
            FROM feedback
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("select feedback")?;
        rows.into_iter().map(Feedback::try_from).collect()
    }

    async fn insert(&self, feedback: &Feedback) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feedback (id, category, description, location, image, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(feedback.id)
        .bind(feedback.category.as_str())
        .bind(&feedback.description)
        .bind(&feedback.location)
        .bind(feedback.image.as_deref())
        .bind(feedback.status.as_str())
        .bind(feedback.date)
        .execute(&self.db)
        .await
        .context("insert feedback")?;
        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: Status) -> anyhow::Result<Option<Feedback>> {
        let row = sqlx::query_as::<_, FeedbackRow>(
            r#"
            UPDATE feedback SET status = $2
            WHERE id = $1
            RETURNING id, category, description, location, image, status, created_at
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.db)
        .await
        .context("update feedback status")?;
        row.map(Feedback::try_from).transpose()
    }
}
