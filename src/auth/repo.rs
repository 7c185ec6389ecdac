use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{auth::repo_types::{User, UserRow}, json_file::JsonFile};

/// Credential store used by the auth service.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    /// Inserts `user`; returns `false` when the email is already taken.
    async fn insert(&self, user: &User) -> anyhow::Result<bool>;
}

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, role, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("select user by email")?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, role, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("select user by id")?;
        row.map(User::try_from).transpose()
    }

    async fn insert(&self, user: &User) -> anyhow::Result<bool> {
        // The unique index on email settles races between concurrent registrations.
        let res = sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, role, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.db)
        .await
        .context("insert user")?;
        Ok(res.rows_affected() == 1)
    }
}

/// Users kept in `users.json` next to the feedback file.
pub struct JsonUserStore {
    file: JsonFile<User>,
}

impl JsonUserStore {
    pub fn new(file: JsonFile<User>) -> Self {
        Self { file }
    }
}

#[async_trait]
impl UserStore for JsonUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.file.read_all().await?;
        Ok(users.into_iter().find(|u| u.email == email))
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let users = self.file.read_all().await?;
        Ok(users.into_iter().find(|u| u.id == id))
    }

    async fn insert(&self, user: &User) -> anyhow::Result<bool> {
        let inserted = self
            .file
            .update(|users| {
                if users.iter().any(|u| u.email == user.email) {
                    return Ok(None);
                }
                users.push(user.clone());
                Ok(Some(()))
            })
            .await?;
        Ok(inserted.is_some())
    }
}
