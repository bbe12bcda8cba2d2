use std::sync::Arc;

use todo_app::application::{identity::IdentityResolverImpl, session::SessionTokens, todo_service::TodoServiceImpl};
use todo_app::config::Config;
use todo_app::domain::repository::{TodoRepository, UserRepository};
use todo_app::http::routing::{self, AppState};
use todo_app::infrastructure::{db, sqlite_repo::SqliteTodoRepository, sqlite_users::SqliteUserRepository};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    let pool = Arc::new(db::connect(&config.database_url).await?);

    // users first: todos reference them
    let users = SqliteUserRepository::new(pool.clone());
    users.init().await?;
    let todos = SqliteTodoRepository::new(pool);
    todos.init().await?;

    let tokens = SessionTokens::new(config.session_secret.as_bytes(), config.session_ttl);
    let state = AppState {
        service: TodoServiceImpl::new(todos),
        identity: IdentityResolverImpl::new(users, tokens, config.oauth_provider.clone()),
        callback_secret: config.auth_callback_secret.as_deref().map(Arc::from),
    };
    if state.callback_secret.is_none() {
        tracing::info!("AUTH_CALLBACK_SECRET not set, sign-in callback disabled");
    }
    let router = routing::app(state);

    let addr = config.bind_addr;
    tracing::info!(%addr, provider = %config.oauth_provider, "listening");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::ctrl_c;
    let _ = ctrl_c().await;
    tracing::info!("shutdown");
}
