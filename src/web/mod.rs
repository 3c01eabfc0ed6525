use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::auth::{
    AuthState, FilteredMakeSpan, auth_user_middleware, create_auth_router,
    login_required_middleware,
};
use crate::config;
use crate::task::web::{TaskState, create_task_router};

/// Composes the application router: the public sign-in/registration
/// routes, the session-gated task routes, and the trace layer.
pub fn create_router(db: DatabaseConnection, jwt_secret: String) -> Router {
    let db = Arc::new(db);
    let auth_state = Arc::new(AuthState::new(db.clone(), jwt_secret));
    let task_state = Arc::new(TaskState { db });

    let protected_routes = create_task_router(task_state).layer(
        ServiceBuilder::new()
            .layer(from_fn_with_state(auth_state.clone(), auth_user_middleware))
            .layer(from_fn(login_required_middleware)),
    );

    let public_routes = create_auth_router(auth_state.clone()).layer(
        ServiceBuilder::new().layer(from_fn_with_state(auth_state.clone(), auth_user_middleware)),
    );

    Router::new()
        .route("/health", axum::routing::get(health_check_handler))
        .merge(protected_routes)
        .merge(public_routes)
        .layer(TraceLayer::new_for_http().make_span_with(FilteredMakeSpan))
}

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: config::Config) -> anyhow::Result<()> {
    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let db = Database::connect(&config.db_url).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    let app = create_router(db, config.jwt_secret.clone());

    axum::serve(listener, app).await?;
    Ok(())
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}
