use axum::extract::{rejection::JsonRejection, State};
use axum::http::HeaderMap;
use axum::{routing::{get, post}, Json, Router};
use serde_json::json;

use crate::application::{identity::IdentityResolver, todo_service::TodoService};
use crate::domain::user::{SignInAssertion, User};
use crate::http::routing::AppState;
use crate::http::types::{current_user, ApiError};

pub const CALLBACK_SECRET_HEADER: &str = "x-auth-callback-secret";

pub fn router<S, I>(with_callback: bool) -> Router<AppState<S, I>>
where
    S: TodoService + Clone,
    I: IdentityResolver + Clone,
{
    let router = Router::new().route("/api/auth/session", get(session::<S, I>));
    if with_callback {
        router.route("/api/auth/callback", post(callback::<S, I>))
    } else {
        router
    }
}

/// The signed-in user's profile.
async fn session<S: TodoService + Clone, I: IdentityResolver + Clone>(
    State(state): State<AppState<S, I>>,
    headers: HeaderMap,
) -> Result<Json<User>, ApiError> {
    let Some(user_id) = current_user(&state.identity, &headers).await? else {
        return Err(ApiError::unauthorized());
    };
    match state.identity.profile(&user_id).await {
        Ok(Some(user)) => Ok(Json(user)),
        Ok(None) => Err(ApiError::unauthorized()),
        Err(e) => Err(ApiError::internal("load session", format!("{e:#}"))),
    }
}

/// Receives a sign-in the OAuth integration has already verified and answers with a session token.
async fn callback<S: TodoService + Clone, I: IdentityResolver + Clone>(
    State(state): State<AppState<S, I>>,
    headers: HeaderMap,
    payload: Result<Json<SignInAssertion>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let presented = headers.get(CALLBACK_SECRET_HEADER).map(|v| v.as_bytes());
    let accepted = match (presented, state.callback_secret.as_deref()) {
        (Some(presented), Some(expected)) => constant_time_eq(presented, expected.as_bytes()),
        _ => false,
    };
    if !accepted {
        return Err(ApiError::unauthorized());
    }
    let Json(assertion) = payload.map_err(|_| ApiError::invalid_input(None))?;
    match state.identity.issue_session(&assertion).await {
        Ok(Some(token)) => Ok(Json(json!({ "token": token }))),
        Ok(None) => Err(ApiError::forbidden("AccessDenied")),
        Err(e) => Err(ApiError::internal("sign in", format!("{e:#}"))),
    }
}

/// Compares SHA-256 digests in constant time, so neither the content nor the
/// length of the expected secret shows up in response timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use sha2::{Digest, Sha256};
    use subtle::ConstantTimeEq;

    Sha256::digest(a).ct_eq(&Sha256::digest(b)).into()
}
