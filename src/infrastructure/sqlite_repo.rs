use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};
use uuid::Uuid;

use super::db::{decode_time, encode_time};
use crate::domain::{
    repository::TodoRepository,
    todo::{CreateTodo, Todo, TodoId, UpdateTodo},
    user::UserId,
};

const COLUMNS: &str = "id, user_id, title, description, completed, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteTodoRepository {
    pool: Arc<Pool<Sqlite>>,
}

impl SqliteTodoRepository {
    pub fn new(pool: Arc<Pool<Sqlite>>) -> Self { Self { pool } }
}

#[async_trait]
impl TodoRepository for SqliteTodoRepository {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS todos (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                title TEXT NOT NULL,
                description TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&*self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS todos_user_created ON todos (user_id, created_at)")
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn create(&self, owner: &UserId, input: CreateTodo) -> Result<Todo> {
        let now = Utc::now();
        let id = TodoId(Uuid::new_v4());
        sqlx::query(
            "INSERT INTO todos (id, user_id, title, description, completed, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
        )
        .bind(id.0.to_string())
        .bind(owner.0.to_string())
        .bind(&input.title)
        .bind(&input.description)
        .bind(encode_time(&now))
        .execute(&*self.pool)
        .await?;
        Ok(Todo {
            id,
            user_id: *owner,
            title: input.title,
            description: input.description,
            completed: false,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get(&self, owner: &UserId, id: TodoId) -> Result<Option<Todo>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM todos WHERE id = ?1 AND user_id = ?2"))
            .bind(id.0.to_string())
            .bind(owner.0.to_string())
            .fetch_optional(&*self.pool)
            .await?;
        row.as_ref().map(row_to_todo).transpose()
    }

    async fn list(&self, owner: &UserId) -> Result<Vec<Todo>> {
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM todos WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"))
            .bind(owner.0.to_string())
            .fetch_all(&*self.pool)
            .await?;
        rows.iter().map(row_to_todo).collect()
    }

    async fn update(&self, owner: &UserId, id: TodoId, input: UpdateTodo) -> Result<Option<Todo>> {
        let Some(mut todo) = self.get(owner, id).await? else { return Ok(None) };

        if let Some(t) = input.title { todo.title = t; }
        if let Some(d) = input.description { todo.description = d; }
        if let Some(c) = input.completed { todo.completed = c; }
        // updated_at must move forward even if the clock has not ticked since the last write
        todo.updated_at = Utc::now().max(todo.updated_at + Duration::nanoseconds(1));

        let result = sqlx::query(
            "UPDATE todos SET title = ?3, description = ?4, completed = ?5, updated_at = ?6
             WHERE id = ?1 AND user_id = ?2",
        )
        .bind(todo.id.0.to_string())
        .bind(owner.0.to_string())
        .bind(&todo.title)
        .bind(&todo.description)
        .bind(todo.completed)
        .bind(encode_time(&todo.updated_at))
        .execute(&*self.pool)
        .await?;

        // Deleted between the read and the write.
        if result.rows_affected() == 0 { return Ok(None); }
        Ok(Some(todo))
    }

    async fn delete(&self, owner: &UserId, id: TodoId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM todos WHERE id = ?1 AND user_id = ?2")
            .bind(id.0.to_string())
            .bind(owner.0.to_string())
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_todo(row: &SqliteRow) -> Result<Todo> {
    let id_str: String = row.try_get("id")?;
    let user_id_str: String = row.try_get("user_id")?;
    let created_at_str: String = row.try_get("created_at")?;
    let updated_at_str: String = row.try_get("updated_at")?;

    Ok(Todo {
        id: TodoId(Uuid::parse_str(&id_str).with_context(|| format!("invalid todo id {id_str:?}"))?),
        user_id: UserId(Uuid::parse_str(&user_id_str).with_context(|| format!("invalid user id {user_id_str:?}"))?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        completed: row.try_get("completed")?,
        created_at: decode_time(&created_at_str)?,
        updated_at: decode_time(&updated_at_str)?,
    })
}
