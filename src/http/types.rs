use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use validator::ValidationErrors;

use crate::application::identity::IdentityResolver;
use crate::domain::{error::TodoError, user::UserId};

/// JSON error body shared by every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, error: &str) -> Self {
        Self { status, body: ErrorBody { error: error.to_string(), details: None } }
    }

    pub fn unauthorized() -> Self { Self::new(StatusCode::UNAUTHORIZED, "Unauthorized") }

    pub fn forbidden(error: &str) -> Self { Self::new(StatusCode::FORBIDDEN, error) }

    pub fn not_found() -> Self { Self::new(StatusCode::NOT_FOUND, "Todo not found") }

    pub fn invalid_input(details: Option<BTreeMap<String, Vec<String>>>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, body: ErrorBody { error: "Invalid input".to_string(), details } }
    }

    /// Logs `err` and answers with a generic message; the detail never reaches the client.
    pub fn internal(action: &str, err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "failed to {action}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, &format!("Failed to {action}"))
    }

    pub fn from_todo(err: TodoError, action: &str) -> Self {
        match err {
            TodoError::Unauthorized => Self::unauthorized(),
            TodoError::Validation(errors) => Self::invalid_input(Some(field_messages(&errors))),
            TodoError::NotFound => Self::not_found(),
            TodoError::Internal(e) => Self::internal(action, format!("{e:#}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response { (self.status, axum::Json(self.body)).into_response() }
}

fn field_messages(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string()))
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

/// Field-level detail for a body that is valid JSON but does not fit the expected
/// shape, e.g. `{"title": 12345}`. Syntax errors and shape errors at the top
/// level carry no field and yield `None`.
pub fn rejection_details(rejection: &JsonRejection) -> Option<BTreeMap<String, Vec<String>>> {
    let JsonRejection::JsonDataError(err) = rejection else { return None };
    data_error_details(&err.body_text())
}

// axum renders data errors as "<summary>: <path>: <serde message> at line L column C".
fn data_error_details(text: &str) -> Option<BTreeMap<String, Vec<String>>> {
    let (_, detail) = text.split_once("target type: ")?;
    let (field, message) = detail.split_once(": ")?;
    if field.is_empty() || field.contains(char::is_whitespace) {
        return None;
    }
    let message = message.rsplit_once(" at line ").map_or(message, |(m, _)| m);
    Some(BTreeMap::from([(field.to_string(), vec![message.to_string()])]))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves the request's session token to an internal user. A missing or
/// unusable token is `Ok(None)`; only storage failures are errors.
pub async fn current_user<I: IdentityResolver>(identity: &I, headers: &HeaderMap) -> Result<Option<UserId>, ApiError> {
    let Some(token) = bearer_token(headers) else { return Ok(None) };
    identity.resolve(token).await.map_err(|e| ApiError::internal("resolve session", format!("{e:#}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use validator::Validate;

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn validation_errors_keep_field_messages() {
        let input = crate::domain::todo::CreateTodo { title: "ab".into(), description: None };
        let err = ApiError::from_todo(TodoError::Validation(input.validate().unwrap_err()), "create todo");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let details = err.body.details.unwrap();
        assert_eq!(details["title"], vec!["Title must be between 3 and 200 characters".to_string()]);
    }

    #[test]
    fn data_errors_name_the_offending_field() {
        let details = data_error_details(
            "Failed to deserialize the JSON body into the target type: title: invalid type: integer `12345`, expected a string at line 1 column 15",
        )
        .unwrap();
        assert_eq!(details["title"], vec!["invalid type: integer `12345`, expected a string".to_string()]);

        assert!(data_error_details("Failed to deserialize the JSON body into the target type: invalid type: sequence, expected struct CreateTodo at line 1 column 1").is_none());
        assert!(data_error_details("Failed to parse the request body as JSON: EOF while parsing").is_none());
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = ApiError::from_todo(TodoError::Internal(anyhow::anyhow!("disk I/O error at /var/db")), "fetch todos");
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body.error, "Failed to fetch todos");
        assert!(err.body.details.is_none());
    }
}
