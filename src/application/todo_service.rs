use async_trait::async_trait;
use validator::Validate;

use crate::domain::error::{TodoError, TodoResult};
use crate::domain::repository::TodoRepository;
use crate::domain::todo::{CreateTodo, Todo, TodoId, UpdateTodo};
use crate::domain::user::UserId;

/// Owner-scoped todo operations. `user` is the caller's resolved identity;
/// `None` fails every operation with [`TodoError::Unauthorized`].
#[async_trait]
pub trait TodoService: Send + Sync + 'static {
    async fn list(&self, user: Option<&UserId>) -> TodoResult<Vec<Todo>>;
    async fn get(&self, user: Option<&UserId>, id: TodoId) -> TodoResult<Todo>;
    async fn create(&self, user: Option<&UserId>, input: CreateTodo) -> TodoResult<Todo>;
    async fn update(&self, user: Option<&UserId>, id: TodoId, input: UpdateTodo) -> TodoResult<Todo>;
    async fn delete(&self, user: Option<&UserId>, id: TodoId) -> TodoResult<()>;
}

#[derive(Clone)]
pub struct TodoServiceImpl<R: TodoRepository> {
    repo: R,
}

impl<R: TodoRepository> TodoServiceImpl<R> {
    pub fn new(repo: R) -> Self { Self { repo } }
}

fn require(user: Option<&UserId>) -> TodoResult<&UserId> {
    user.ok_or(TodoError::Unauthorized)
}

#[async_trait]
impl<R: TodoRepository> TodoService for TodoServiceImpl<R> {
    async fn list(&self, user: Option<&UserId>) -> TodoResult<Vec<Todo>> {
        let owner = require(user)?;
        Ok(self.repo.list(owner).await?)
    }

    async fn get(&self, user: Option<&UserId>, id: TodoId) -> TodoResult<Todo> {
        let owner = require(user)?;
        self.repo.get(owner, id).await?.ok_or(TodoError::NotFound)
    }

    async fn create(&self, user: Option<&UserId>, input: CreateTodo) -> TodoResult<Todo> {
        let owner = require(user)?;
        input.validate()?;
        let todo = self.repo.create(owner, input).await?;
        tracing::debug!(todo_id = %todo.id, user_id = %owner, "todo created");
        Ok(todo)
    }

    async fn update(&self, user: Option<&UserId>, id: TodoId, input: UpdateTodo) -> TodoResult<Todo> {
        let owner = require(user)?;
        input.validate()?;
        self.repo.update(owner, id, input).await?.ok_or(TodoError::NotFound)
    }

    async fn delete(&self, user: Option<&UserId>, id: TodoId) -> TodoResult<()> {
        let owner = require(user)?;
        if self.repo.delete(owner, id).await? { Ok(()) } else { Err(TodoError::NotFound) }
    }
}
