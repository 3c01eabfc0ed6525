use askama::Template;
use axum::Router;
use axum::extract::{Extension, Form, MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use axum_extra::extract::CookieJar;
use jsonwebtoken::encode;
use std::sync::Arc;
use tower_http::trace::MakeSpan;
use tracing::Span;

use crate::entities::*;
use sea_orm::*;

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i32,
    pub name: String,
}

impl CurrentUser {
    /// Creates a new CurrentUser instance.
    pub fn new(id: i32, name: String) -> Self {
        Self { id, name }
    }
}

/// Authentication state holding the database handle and the secret
/// used to sign session cookies.
#[derive(Clone)]
pub struct AuthState {
    pub db: Arc<DatabaseConnection>,
    pub jwt_secret: String,
}

impl AuthState {
    pub fn new(db: Arc<DatabaseConnection>, jwt_secret: String) -> Self {
        Self { db, jwt_secret }
    }
}

/// A registered account, as exposed to handlers and templates.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct User {
    id: i32,
    name: String,
    email: String,
}

impl User {
    pub fn new(id: i32, name: String, email: String) -> Self {
        Self { id, name, email }
    }

    /// Returns the ID of the user.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the user's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the user's email address.
    pub fn email(&self) -> &str {
        &self.email
    }
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        User::new(model.id, model.name, model.email)
    }
}

/// Error type for UserService operations.
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// The requested name or email is already taken by another account.
    #[error("A user with that name or email already exists")]
    DuplicateUser,
    /// The name/password pair did not match a stored account.
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct UserService<'a> {
    db: &'a DatabaseConnection,
}

impl UserService<'_> {
    pub fn new(db: &DatabaseConnection) -> UserService {
        UserService { db }
    }

    /// Creates a new account.
    ///
    /// Fails with [`UserServiceError::DuplicateUser`] if the name or
    /// the email collides with an existing account.
    #[tracing::instrument(skip(self, password))]
    pub async fn register_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, UserServiceError> {
        let existing = users::Entity::find()
            .filter(
                Condition::any()
                    .add(users::Column::Name.eq(name))
                    .add(users::Column::Email.eq(email)),
            )
            .one(self.db)
            .await?;
        if existing.is_some() {
            return Err(UserServiceError::DuplicateUser);
        }

        let active_model = users::ActiveModel {
            name: ActiveValue::Set(name.to_owned()),
            email: ActiveValue::Set(email.to_owned()),
            password: ActiveValue::Set(password.to_owned()),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;
        Ok(User::from(created_model))
    }

    /// Checks a name/password pair against the stored accounts.
    ///
    /// Any mismatch, an unknown name as much as a wrong password,
    /// yields [`UserServiceError::InvalidCredentials`] so callers
    /// cannot tell which field failed.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        name: &str,
        password: &str,
    ) -> Result<User, UserServiceError> {
        let Some(user) = users::Entity::find()
            .filter(users::Column::Name.eq(name))
            .one(self.db)
            .await?
        else {
            return Err(UserServiceError::InvalidCredentials);
        };

        if user.password != password {
            return Err(UserServiceError::InvalidCredentials);
        }

        Ok(User::from(user))
    }
}

/// Creates the router for the public pages: sign-in, registration and
/// logout.
pub fn create_auth_router(state: Arc<AuthState>) -> Router<()> {
    Router::new()
        .route(
            "/",
            axum::routing::get(sign_in_page_handler).post(login_handler),
        )
        .route(
            "/register/",
            axum::routing::get(register_page_handler).post(register_handler),
        )
        .route("/logout/", axum::routing::get(logout_handler))
        .with_state(state)
}

/// Authentication middleware that checks for a valid session cookie and
/// sets the CurrentUser extension. This middleware only populates the
/// extension and never rejects a request.
pub async fn auth_user_middleware(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token_cookie) = jar.get("auth_token") {
        if let Ok(claims) = decode_session_token(token_cookie.value(), &state.jwt_secret).await {
            let current_user = CurrentUser::new(claims.sub, claims.name);
            request.extensions_mut().insert(current_user);
        }
    }

    next.run(request).await
}

/// Session gate for the task routes. Requests without a CurrentUser
/// extension get the sign-in page back with a login-required notice and
/// the wrapped handler never runs. Apply after auth_user_middleware.
pub async fn login_required_middleware(request: Request, next: Next) -> Response {
    let is_authenticated = request.extensions().get::<CurrentUser>().is_some();

    if !is_authenticated {
        let template = SignInTemplate {
            message: Some("You need to login first.".to_string()),
        };
        return match template.render() {
            Ok(html) => Html(html).into_response(),
            Err(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        };
    }

    next.run(request).await
}

/// Represents the login form payload.
#[derive(serde::Deserialize, Debug)]
pub struct LoginForm {
    pub name: String,
    pub password: String,
}

/// Represents the registration form payload.
#[derive(serde::Deserialize, Debug)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm: String,
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct Claims {
    pub exp: usize,   // Expiry time of the token
    pub iat: usize,   // Issued at time of the token
    pub sub: i32,     // ID of the authenticated user
    pub name: String, // Name of the authenticated user
}

/// Custom error type for authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Represents an error during template rendering.
    /// The specific `askama::Error` is captured as the source of this error.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents an error during session token operations.
    #[error("Session token operation failed")]
    SessionToken,
    /// Represents an unexpected user service failure.
    /// Expected outcomes (duplicates, bad credentials) are rendered as
    /// form messages before this variant can be reached.
    #[error("User service error")]
    Service(#[from] UserServiceError),
}

impl axum::response::IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        let user_facing_error_message =
            "An unexpected error occurred while processing your request. Please try again later.";
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!(
                "<h1>Internal Server Error</h1><p>{}</p>",
                user_facing_error_message
            )),
        )
            .into_response()
    }
}

/// Handles the login request.
/// Checks the submitted name and password against the stored accounts.
/// If a user is already logged in, returns the welcome page directly.
pub async fn login_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    current_user: Option<Extension<CurrentUser>>,
    Form(payload): Form<LoginForm>,
) -> Result<(CookieJar, Response), AuthError> {
    // Check if user is already logged in
    if let Some(Extension(user)) = current_user {
        let html = WelcomeTemplate { name: &user.name }
            .render()
            .map_err(AuthError::from)?;
        return Ok((jar, Html(html).into_response()));
    }

    handle_login_attempt(state, jar, payload).await
}

/// Handles a login attempt when the user is not logged in.
/// Validates credentials and either establishes a session or re-renders
/// the sign-in form with an error message.
#[tracing::instrument(skip(state, jar, payload))]
async fn handle_login_attempt(
    state: Arc<AuthState>,
    jar: CookieJar,
    payload: LoginForm,
) -> Result<(CookieJar, Response), AuthError> {
    let user_service = UserService::new(&state.db);

    match user_service
        .authenticate(&payload.name, &payload.password)
        .await
    {
        Ok(user) => {
            let session_token = encode_session_token(user.id(), user.name(), &state.jwt_secret)
                .await
                .map_err(|_| AuthError::SessionToken)?;

            // Create cookie with the session token
            let cookie = axum_extra::extract::cookie::Cookie::build(("auth_token", session_token))
                .http_only(true)
                .secure(false) // Set to true in production with HTTPS
                .same_site(axum_extra::extract::cookie::SameSite::Lax)
                .max_age(time::Duration::hours(24))
                .path("/")
                .build();

            let updated_jar = jar.add(cookie);

            let html = WelcomeTemplate { name: user.name() }
                .render()
                .map_err(AuthError::from)?;

            Ok((updated_jar, Html(html).into_response()))
        }
        Err(UserServiceError::InvalidCredentials) => {
            let html = SignInTemplate {
                message: Some("Invalid username or password.".to_string()),
            }
            .render()
            .map_err(AuthError::from)?;

            Ok((jar, Html(html).into_response()))
        }
        Err(err) => Err(AuthError::Service(err)),
    }
}

/// Handles the registration request.
/// Validates the form and creates the account, or re-renders the
/// registration form with the validation message.
#[tracing::instrument(skip(state, payload))]
pub async fn register_handler(
    State(state): State<Arc<AuthState>>,
    Form(payload): Form<RegisterForm>,
) -> Result<Html<String>, AuthError> {
    if payload.password != payload.confirm {
        let html = RegisterTemplate {
            message: Some("Passwords must match.".to_string()),
        }
        .render()
        .map_err(AuthError::from)?;
        return Ok(Html(html));
    }

    let user_service = UserService::new(&state.db);

    match user_service
        .register_user(&payload.name, &payload.email, &payload.password)
        .await
    {
        Ok(_) => {
            let html = SignInTemplate {
                message: Some("Thanks for registering. Please login.".to_string()),
            }
            .render()
            .map_err(AuthError::from)?;
            Ok(Html(html))
        }
        Err(UserServiceError::DuplicateUser) => {
            let html = RegisterTemplate {
                message: Some("The username and/or email already exist.".to_string()),
            }
            .render()
            .map_err(AuthError::from)?;
            Ok(Html(html))
        }
        Err(err) => Err(AuthError::Service(err)),
    }
}

/// Handles logout. Clears the session cookie and confirms with
/// "Goodbye!"; without a session this is a no-op and no confirmation is
/// shown.
#[tracing::instrument(skip(jar))]
pub async fn logout_handler(
    jar: CookieJar,
    current_user: Option<Extension<CurrentUser>>,
) -> Result<(CookieJar, Html<String>), AuthError> {
    match current_user {
        Some(Extension(_)) => {
            let removal_cookie = axum_extra::extract::cookie::Cookie::build(("auth_token", ""))
                .path("/")
                .build();
            let updated_jar = jar.remove(removal_cookie);

            let html = SignInTemplate {
                message: Some("Goodbye!".to_string()),
            }
            .render()
            .map_err(AuthError::from)?;
            Ok((updated_jar, Html(html)))
        }
        None => {
            let html = SignInTemplate { message: None }
                .render()
                .map_err(AuthError::from)?;
            Ok((jar, Html(html)))
        }
    }
}

pub async fn encode_session_token(
    user_id: i32,
    name: &str,
    jwt_secret: &str,
) -> anyhow::Result<String> {
    let now = chrono::Utc::now();
    let expire = chrono::Duration::hours(24);
    let exp = (now + expire).timestamp() as usize;
    let iat = now.timestamp() as usize;
    let claims = Claims {
        exp,
        iat,
        sub: user_id,
        name: name.to_owned(),
    };
    let jwt = encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(jwt_secret.as_bytes()),
    )?;
    Ok(jwt)
}

pub async fn decode_session_token(token: &str, jwt_secret: &str) -> anyhow::Result<Claims> {
    let token_data = jsonwebtoken::decode(
        token,
        &jsonwebtoken::DecodingKey::from_secret(jwt_secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )?;
    Ok(token_data.claims)
}

#[derive(Template)]
#[template(path = "sign_in.html")]
pub struct SignInTemplate {
    pub message: Option<String>,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub message: Option<String>,
}

#[derive(Template)]
#[template(path = "welcome.html")]
pub struct WelcomeTemplate<'a> {
    pub name: &'a str,
}

/// Handles GET requests to display the sign-in page.
#[tracing::instrument]
pub async fn sign_in_page_handler() -> Result<Html<String>, AuthError> {
    let template = SignInTemplate { message: None };
    template.render().map(Html).map_err(AuthError::from)
}

/// Handles GET requests to display the registration page.
#[tracing::instrument]
pub async fn register_page_handler() -> Result<Html<String>, AuthError> {
    let template = RegisterTemplate { message: None };
    template.render().map(Html).map_err(AuthError::from)
}

/// Custom span maker that filters sensitive data from credential-bearing
/// requests. This implementation avoids logging request bodies and
/// cookies for the sign-in and registration routes.
#[derive(Clone, Debug)]
pub struct FilteredMakeSpan;

impl<B> MakeSpan<B> for FilteredMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        let uri = request.uri();
        let method = request.method();
        let matched_path = request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str);

        // Credentials travel in the bodies of these routes
        if uri.path() == "/" || uri.path() == "/register/" {
            tracing::info_span!(
                "request",
                method = %method,
                uri = %uri,
                matched_path,
                sensitive_route = true,
                // Explicitly omit headers, cookies, and body
            )
        } else {
            tracing::info_span!(
                "request",
                method = %method,
                uri = %uri,
                matched_path,
            )
        }
    }
}
