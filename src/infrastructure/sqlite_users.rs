use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};
use uuid::Uuid;

use super::db::{decode_time, encode_time};
use crate::domain::{
    repository::UserRepository,
    user::{User, UserId, UserProfile},
};

const COLUMNS: &str = "id, provider_subject, email, name, avatar_url, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: Arc<Pool<Sqlite>>,
}

impl SqliteUserRepository {
    pub fn new(pool: Arc<Pool<Sqlite>>) -> Self { Self { pool } }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                provider_subject TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL,
                name TEXT,
                avatar_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn upsert(&self, subject: &str, profile: UserProfile) -> Result<User> {
        let now = encode_time(&Utc::now());
        sqlx::query(
            "INSERT INTO users (id, provider_subject, email, name, avatar_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(provider_subject) DO UPDATE SET
                email = excluded.email,
                name = excluded.name,
                avatar_url = excluded.avatar_url,
                updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(subject)
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(&profile.avatar_url)
        .bind(now)
        .execute(&*self.pool)
        .await?;

        self.find_by_subject(subject)
            .await?
            .ok_or_else(|| anyhow!("user {subject:?} missing after upsert"))
    }

    async fn find_by_subject(&self, subject: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM users WHERE provider_subject = ?1"))
            .bind(subject)
            .fetch_optional(&*self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM users WHERE id = ?1"))
            .bind(id.0.to_string())
            .fetch_optional(&*self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    let id_str: String = row.try_get("id")?;
    let created_at_str: String = row.try_get("created_at")?;
    let updated_at_str: String = row.try_get("updated_at")?;

    Ok(User {
        id: UserId(Uuid::parse_str(&id_str).with_context(|| format!("invalid user id {id_str:?}"))?),
        provider_subject: row.try_get("provider_subject")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        avatar_url: row.try_get("avatar_url")?,
        created_at: decode_time(&created_at_str)?,
        updated_at: decode_time(&updated_at_str)?,
    })
}
