use std::sync::Arc;

use chrono::Duration;
use todo_app::application::{identity::{IdentityResolver, IdentityResolverImpl}, session::SessionTokens, todo_service::TodoServiceImpl};
use todo_app::client::{cache::{ListKey, QueryCache}, reconciler::Reconciler, remote::{ClientError, HttpTodoApi}};
use todo_app::domain::repository::{TodoRepository, UserRepository};
use todo_app::domain::todo::{CreateTodo, UpdateTodo};
use todo_app::domain::user::SignInAssertion;
use todo_app::http::routing::{self, AppState};
use todo_app::infrastructure::{db, sqlite_repo::SqliteTodoRepository, sqlite_users::SqliteUserRepository};

/// Serves the API on an ephemeral port and returns its base URL with a session token for `subject`.
async fn serve(subject: &str) -> (String, String) {
    let pool = Arc::new(db::connect("sqlite::memory:").await.unwrap());
    let users = SqliteUserRepository::new(pool.clone());
    users.init().await.unwrap();
    let todos = SqliteTodoRepository::new(pool);
    todos.init().await.unwrap();

    let identity = IdentityResolverImpl::new(users, SessionTokens::new(b"test-secret", Duration::hours(1)), "google");
    let assertion = SignInAssertion {
        provider: "google".into(),
        subject: subject.into(),
        email: format!("{subject}@example.com"),
        name: None,
        image: None,
    };
    let token = identity.issue_session(&assertion).await.unwrap().unwrap();

    let app = routing::app(AppState { service: TodoServiceImpl::new(todos), identity, callback_secret: None });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (format!("http://{addr}"), token)
}

#[tokio::test]
async fn mutations_settle_to_server_state() {
    let (base_url, token) = serve("alice").await;
    let api = HttpTodoApi::new(base_url, token);
    let profile = api.session().await.unwrap();
    assert_eq!(profile.email, "alice@example.com");
    assert_eq!(profile.display_name(), "alice@example.com");

    let reconciler = Reconciler::new(api, Arc::new(QueryCache::new()));
    assert!(!reconciler.cache().is_loaded(ListKey::TODOS));
    reconciler.refetch().await.unwrap();
    assert!(reconciler.cache().is_loaded(ListKey::TODOS));
    assert!(reconciler.todos().is_empty());

    let pending = reconciler.create(CreateTodo { title: "Buy milk".into(), description: None });
    let shown = reconciler.todos();
    assert_eq!(shown.len(), 1);
    assert!(shown[0].is_pending());

    let saved = pending.await.unwrap();
    let shown = reconciler.todos();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].saved_id(), Some(saved.id));

    let toggled = reconciler.toggle(saved.id).await.unwrap();
    assert!(toggled.completed);
    assert!(reconciler.todos()[0].completed);

    let err = reconciler.update(saved.id, UpdateTodo { title: Some("x".into()), ..UpdateTodo::default() }).await.unwrap_err();
    let ClientError::Validation(Some(details)) = err else { panic!("expected field errors, got {err:?}") };
    assert!(details.contains_key("title"));
    assert_eq!(reconciler.todos()[0].title, "Buy milk");
    assert!(!reconciler.cache().has_pending_rollback(ListKey::TODOS));

    reconciler.delete(saved.id).await.unwrap();
    assert!(reconciler.todos().is_empty());

    // deleting again: the server no longer knows the id and the list stays empty
    assert!(matches!(reconciler.delete(saved.id).await, Err(ClientError::NotFound)));
    assert!(reconciler.todos().is_empty());
}

#[tokio::test]
async fn a_bad_token_is_reported_as_unauthorized() {
    let (base_url, _) = serve("bob").await;
    let api = HttpTodoApi::new(base_url, "not-a-token");
    assert!(matches!(api.session().await, Err(ClientError::Unauthorized)));
    let reconciler = Reconciler::new(api, Arc::new(QueryCache::new()));
    assert!(matches!(reconciler.refetch().await, Err(ClientError::Unauthorized)));

    let err = reconciler.create(CreateTodo { title: "Nope".into(), description: None }).await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized));
    assert!(reconciler.todos().is_empty());
}
