use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "test_secret";

pub struct TestContext {
    pub db: DatabaseConnection,
}

pub async fn setup() -> anyhow::Result<TestContext> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().try_init();
    let db = setup_db().await?;
    Ok(TestContext { db })
}

/// Connects to a fresh in-memory SQLite database and applies the
/// migrations. The pool is pinned to a single connection so every
/// request sees the same in-memory database.
pub async fn setup_db() -> anyhow::Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);
    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

pub fn build_app(db: DatabaseConnection) -> Router {
    tasklist_server::web::create_router(db, TEST_JWT_SECRET.to_string())
}

pub fn form_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_text(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn get_with_cookie(app: &Router, uri: &str, cookie: &str) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header("cookie", cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn register(
    app: &Router,
    name: &str,
    email: &str,
    password: &str,
    confirm: &str,
) -> Response {
    let body = format!(
        "name={}&email={}&password={}&confirm={}",
        name, email, password, confirm
    );
    app.clone()
        .oneshot(form_request("/register/", &body))
        .await
        .unwrap()
}

pub async fn login(app: &Router, name: &str, password: &str) -> Response {
    let body = format!("name={}&password={}", name, password);
    app.clone().oneshot(form_request("/", &body)).await.unwrap()
}

/// Extracts the session cookie pair from a login response, ready to be
/// sent back in a `cookie` header.
pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("auth_token="))
        .map(|value| value.split(';').next().unwrap_or(value).to_string())
}

/// Registers and logs in a user, returning the session cookie.
pub async fn register_and_login(app: &Router, name: &str, email: &str, password: &str) -> String {
    register(app, name, email, password, password).await;
    let response = login(app, name, password).await;
    session_cookie(&response).expect("login should set a session cookie")
}
