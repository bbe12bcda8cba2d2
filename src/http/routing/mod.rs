use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::application::{identity::IdentityResolver, todo_service::TodoService};
use crate::http::routes::{auth, todos};

#[derive(Clone)]
pub struct AppState<S: TodoService, I: IdentityResolver> {
    pub service: S,
    pub identity: I,
    /// Shared secret for `POST /api/auth/callback`; the route is not mounted without it.
    pub callback_secret: Option<Arc<str>>,
}

pub fn app<S, I>(state: AppState<S, I>) -> Router
where
    S: TodoService + Clone,
    I: IdentityResolver + Clone,
{
    let with_callback = state.callback_secret.is_some();
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(todos::router::<S, I>())
        .merge(auth::router::<S, I>(with_callback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
