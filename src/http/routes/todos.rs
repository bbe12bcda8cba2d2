use axum::extract::{rejection::JsonRejection, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{routing::get, Json, Router};
use serde_json::json;

use crate::application::{identity::IdentityResolver, todo_service::TodoService};
use crate::domain::todo::{CreateTodo, Todo, TodoId, UpdateTodo};
use crate::domain::user::UserId;
use crate::http::routing::AppState;
use crate::http::types::{current_user, rejection_details, ApiError};

pub fn router<S, I>() -> Router<AppState<S, I>>
where
    S: TodoService + Clone,
    I: IdentityResolver + Clone,
{
    Router::new()
        .route("/api/todos", get(list_todos::<S, I>).post(create_todo::<S, I>))
        .route("/api/todos/:id", get(get_todo::<S, I>).patch(update_todo::<S, I>).delete(delete_todo::<S, I>))
}

async fn list_todos<S: TodoService + Clone, I: IdentityResolver + Clone>(
    State(state): State<AppState<S, I>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Todo>>, ApiError> {
    let user = current_user(&state.identity, &headers).await?;
    let todos = state.service.list(user.as_ref()).await.map_err(|e| ApiError::from_todo(e, "fetch todos"))?;
    Ok(Json(todos))
}

async fn create_todo<S: TodoService + Clone, I: IdentityResolver + Clone>(
    State(state): State<AppState<S, I>>,
    headers: HeaderMap,
    payload: Result<Json<CreateTodo>, JsonRejection>,
) -> Result<(StatusCode, Json<Todo>), ApiError> {
    let user = current_user(&state.identity, &headers).await?;
    let input = parse_body(user.as_ref(), payload)?;
    let todo = state.service.create(user.as_ref(), input).await.map_err(|e| ApiError::from_todo(e, "create todo"))?;
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn get_todo<S: TodoService + Clone, I: IdentityResolver + Clone>(
    State(state): State<AppState<S, I>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Todo>, ApiError> {
    let user = current_user(&state.identity, &headers).await?;
    let id = parse_id(user.as_ref(), &id)?;
    let todo = state.service.get(user.as_ref(), id).await.map_err(|e| ApiError::from_todo(e, "fetch todo"))?;
    Ok(Json(todo))
}

async fn update_todo<S: TodoService + Clone, I: IdentityResolver + Clone>(
    State(state): State<AppState<S, I>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTodo>, JsonRejection>,
) -> Result<Json<Todo>, ApiError> {
    let user = current_user(&state.identity, &headers).await?;
    let id = parse_id(user.as_ref(), &id)?;
    let input = parse_body(user.as_ref(), payload)?;
    let todo = state.service.update(user.as_ref(), id, input).await.map_err(|e| ApiError::from_todo(e, "update todo"))?;
    Ok(Json(todo))
}

async fn delete_todo<S: TodoService + Clone, I: IdentityResolver + Clone>(
    State(state): State<AppState<S, I>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = current_user(&state.identity, &headers).await?;
    let id = parse_id(user.as_ref(), &id)?;
    state.service.delete(user.as_ref(), id).await.map_err(|e| ApiError::from_todo(e, "delete todo"))?;
    Ok(Json(json!({ "message": "Todo deleted successfully" })))
}

// Unauthenticated callers get 401 before anything about the request itself is judged.

fn parse_id(user: Option<&UserId>, raw: &str) -> Result<TodoId, ApiError> {
    if user.is_none() { return Err(ApiError::unauthorized()); }
    // Ids are opaque to clients; something that cannot be an id simply does not exist.
    raw.parse().map_err(|_| ApiError::not_found())
}

fn parse_body<T>(user: Option<&UserId>, payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    if user.is_none() { return Err(ApiError::unauthorized()); }
    match payload {
        Ok(Json(input)) => Ok(input),
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "rejected request body");
            Err(ApiError::invalid_input(rejection_details(&rejection)))
        }
    }
}
