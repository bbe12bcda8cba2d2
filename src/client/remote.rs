use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::todo::{CreateTodo, Todo, TodoId, UpdateTodo};
use crate::domain::user::UserId;
use crate::http::types::ErrorBody;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not signed in")]
    Unauthorized,
    #[error("invalid input")]
    Validation(Option<BTreeMap<String, Vec<String>>>),
    #[error("todo not found")]
    NotFound,
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("request interrupted: {0}")]
    Interrupted(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// The remote side of the todo list, as seen by the client cache.
#[async_trait]
pub trait TodoApi: Send + Sync + 'static {
    async fn list(&self) -> Result<Vec<Todo>, ClientError>;
    async fn create(&self, input: CreateTodo) -> Result<Todo, ClientError>;
    async fn update(&self, id: TodoId, input: UpdateTodo) -> Result<Todo, ClientError>;
    async fn delete(&self, id: TodoId) -> Result<(), ClientError>;
}

/// [`TodoApi`] over the JSON endpoints under `/api/todos`.
#[derive(Clone)]
pub struct HttpTodoApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpTodoApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String { format!("{}{}", self.base_url, path) }

    /// Who the session token belongs to.
    pub async fn session(&self) -> Result<SessionProfile, ClientError> {
        let response = self.client.get(self.url("/api/auth/session")).bearer_auth(&self.token).send().await?;
        Ok(check(response).await?.json().await?)
    }
}

/// The signed-in user as `GET /api/auth/session` reports it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionProfile {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl SessionProfile {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or(&self.email)
    }
}

#[async_trait]
impl TodoApi for HttpTodoApi {
    async fn list(&self) -> Result<Vec<Todo>, ClientError> {
        let response = self.client.get(self.url("/api/todos")).bearer_auth(&self.token).send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn create(&self, input: CreateTodo) -> Result<Todo, ClientError> {
        let response = self.client.post(self.url("/api/todos")).bearer_auth(&self.token).json(&input).send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn update(&self, id: TodoId, input: UpdateTodo) -> Result<Todo, ClientError> {
        let response = self
            .client
            .patch(self.url(&format!("/api/todos/{id}")))
            .bearer_auth(&self.token)
            .json(&input)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn delete(&self, id: TodoId) -> Result<(), ClientError> {
        let response = self.client.delete(self.url(&format!("/api/todos/{id}"))).bearer_auth(&self.token).send().await?;
        check(response).await?;
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: Option<ErrorBody> = response.json().await.ok();
    Err(error_for(status, body))
}

fn error_for(status: StatusCode, body: Option<ErrorBody>) -> ClientError {
    match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
        StatusCode::NOT_FOUND => ClientError::NotFound,
        StatusCode::BAD_REQUEST => ClientError::Validation(body.and_then(|b| b.details)),
        _ => ClientError::Server {
            status: status.as_u16(),
            message: body.map(|b| b.error).unwrap_or_else(|| status.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_onto_the_error_taxonomy() {
        assert!(matches!(error_for(StatusCode::UNAUTHORIZED, None), ClientError::Unauthorized));
        assert!(matches!(error_for(StatusCode::NOT_FOUND, None), ClientError::NotFound));

        let details = BTreeMap::from([("title".to_string(), vec!["too short".to_string()])]);
        let body = ErrorBody { error: "Invalid input".into(), details: Some(details.clone()) };
        assert!(matches!(error_for(StatusCode::BAD_REQUEST, Some(body)), ClientError::Validation(Some(d)) if d == details));

        let body = ErrorBody { error: "Failed to fetch todos".into(), details: None };
        let ClientError::Server { status, message } = error_for(StatusCode::INTERNAL_SERVER_ERROR, Some(body)) else {
            panic!("expected a server error");
        };
        assert_eq!(status, 500);
        assert_eq!(message, "Failed to fetch todos");
    }

    #[test]
    fn profile_falls_back_to_email_without_a_name() {
        let body = r#"{"id":"6f1c1d0e-5b0a-4a7e-9d55-0c4e4a6f2b11","email":"ada@example.com","name":null,"avatarUrl":null,"createdAt":"2026-01-10T10:00:00Z"}"#;
        let mut profile: SessionProfile = serde_json::from_str(body).unwrap();
        assert_eq!(profile.display_name(), "ada@example.com");
        profile.name = Some("Ada".into());
        assert_eq!(profile.display_name(), "Ada");
    }

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let api = HttpTodoApi::new("http://localhost:3000/", "token");
        assert_eq!(api.url("/api/todos"), "http://localhost:3000/api/todos");
    }
}
