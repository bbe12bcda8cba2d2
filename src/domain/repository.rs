use async_trait::async_trait;

use super::todo::{CreateTodo, Todo, TodoId, UpdateTodo};
use super::user::{User, UserId, UserProfile};

/// Owner-scoped todo storage. Every query filters on `owner`, so a row owned by
/// someone else looks exactly like a missing row.
#[async_trait]
pub trait TodoRepository: Send + Sync + 'static {
    async fn init(&self) -> anyhow::Result<()>;
    async fn create(&self, owner: &UserId, input: CreateTodo) -> anyhow::Result<Todo>;
    async fn get(&self, owner: &UserId, id: TodoId) -> anyhow::Result<Option<Todo>>;
    /// Newest first.
    async fn list(&self, owner: &UserId) -> anyhow::Result<Vec<Todo>>;
    async fn update(&self, owner: &UserId, id: TodoId, input: UpdateTodo) -> anyhow::Result<Option<Todo>>;
    async fn delete(&self, owner: &UserId, id: TodoId) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    async fn init(&self) -> anyhow::Result<()>;
    /// Inserts on first sight of `subject`, otherwise refreshes the profile fields.
    async fn upsert(&self, subject: &str, profile: UserProfile) -> anyhow::Result<User>;
    async fn find_by_subject(&self, subject: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: &UserId) -> anyhow::Result<Option<User>>;
}
