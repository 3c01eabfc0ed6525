use axum::http::StatusCode;

mod common;

use common::{body_text, build_app, get, get_with_cookie, login, register, session_cookie, setup};

#[tokio::test]
async fn can_display_sign_in_form() -> anyhow::Result<()> {
    let context = setup().await?;
    let app = build_app(context.db);

    let response = get(&app, "/").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Please sign in to access your task list"));
    Ok(())
}

#[tokio::test]
async fn can_display_registration_form() -> anyhow::Result<()> {
    let context = setup().await?;
    let app = build_app(context.db);

    let response = get(&app, "/register/").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Please register to access the task list."));
    Ok(())
}

#[tokio::test]
async fn unregistered_users_cannot_login() -> anyhow::Result<()> {
    let context = setup().await?;
    let app = build_app(context.db);

    let response = login(&app, "foo", "bar").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Invalid username or password."));
    assert!(!body.contains("Welcome!"));
    Ok(())
}

#[tokio::test]
async fn registered_users_can_login() -> anyhow::Result<()> {
    let context = setup().await?;
    let app = build_app(context.db);

    register(&app, "John", "johnsmith@js.com", "johnsmith", "johnsmith").await;
    let response = login(&app, "John", "johnsmith").await;

    assert_eq!(response.status(), StatusCode::OK);

    // Check that the auth_token cookie was set
    let cookie = session_cookie(&response).expect("expected auth_token cookie to be set");
    assert!(cookie.starts_with("auth_token="));
    let set_cookie_headers: Vec<_> = response.headers().get_all("set-cookie").iter().collect();
    let cookie_header = set_cookie_headers[0].to_str()?;
    assert!(
        cookie_header.contains("HttpOnly"),
        "Expected HttpOnly flag to be set"
    );
    assert!(
        cookie_header.contains("Path=/"),
        "Expected Path to be set to /"
    );

    let body = body_text(response).await;
    assert!(body.contains("Welcome!"));
    Ok(())
}

#[tokio::test]
async fn rejects_login_with_wrong_password() -> anyhow::Result<()> {
    let context = setup().await?;
    let app = build_app(context.db);

    register(&app, "John", "johnsmith@js.com", "johnsmith", "johnsmith").await;
    let response = login(&app, "John", "wrong").await;

    let body = body_text(response).await;
    assert!(body.contains("Invalid username or password."));
    assert!(!body.contains("Welcome!"));
    Ok(())
}

#[tokio::test]
async fn rejects_malformed_login_input() -> anyhow::Result<()> {
    let context = setup().await?;
    let app = build_app(context.db);

    register(&app, "John", "johnsmith@js.com", "johnsmith", "johnsmith").await;
    // `alert("alert box!");` submitted as the user name
    let response = login(&app, "alert%28%22alert+box%21%22%29%3B", "foo").await;

    let body = body_text(response).await;
    assert!(body.contains("Invalid username or password."));
    Ok(())
}

#[tokio::test]
async fn duplicate_registration_shows_error() -> anyhow::Result<()> {
    let context = setup().await?;
    let app = build_app(context.db);

    register(&app, "John", "johnsmith@js.com", "johnsmith", "johnsmith").await;
    let response = register(&app, "John", "johnsmith@js.com", "johnsmith", "johnsmith").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("The username and/or email already exist."));
    Ok(())
}

#[tokio::test]
async fn duplicate_email_alone_is_rejected() -> anyhow::Result<()> {
    let context = setup().await?;
    let app = build_app(context.db);

    register(&app, "John", "johnsmith@js.com", "johnsmith", "johnsmith").await;
    let response = register(&app, "Jane", "johnsmith@js.com", "janesmith", "janesmith").await;

    let body = body_text(response).await;
    assert!(body.contains("The username and/or email already exist."));
    Ok(())
}

#[tokio::test]
async fn registration_requires_matching_passwords() -> anyhow::Result<()> {
    let context = setup().await?;
    let app = build_app(context.db);

    let response = register(&app, "John", "johnsmith@js.com", "johnsmith", "different").await;

    let body = body_text(response).await;
    assert!(body.contains("Passwords must match."));
    Ok(())
}

#[tokio::test]
async fn successful_registration_leads_to_sign_in() -> anyhow::Result<()> {
    let context = setup().await?;
    let app = build_app(context.db);

    let response = register(&app, "John", "johnsmith@js.com", "johnsmith", "johnsmith").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Thanks for registering. Please login."));
    assert!(body.contains("Please sign in to access your task list"));
    Ok(())
}

#[tokio::test]
async fn logged_in_users_can_logout() -> anyhow::Result<()> {
    let context = setup().await?;
    let app = build_app(context.db);

    register(&app, "John", "johnsmith@js.com", "johnsmith", "johnsmith").await;
    let login_response = login(&app, "John", "johnsmith").await;
    let cookie = session_cookie(&login_response).expect("login should set a session cookie");

    let response = get_with_cookie(&app, "/logout/", &cookie).await;

    assert_eq!(response.status(), StatusCode::OK);
    // The session cookie is cleared on the way out
    let set_cookie_headers: Vec<_> = response.headers().get_all("set-cookie").iter().collect();
    assert!(
        set_cookie_headers
            .iter()
            .any(|value| value.to_str().is_ok_and(|v| v.starts_with("auth_token="))),
        "Expected a removal cookie for auth_token"
    );

    let body = body_text(response).await;
    assert!(body.contains("Goodbye!"));
    Ok(())
}

#[tokio::test]
async fn not_logged_in_users_cannot_logout() -> anyhow::Result<()> {
    let context = setup().await?;
    let app = build_app(context.db);

    let response = get(&app, "/logout/").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(!body.contains("Goodbye!"));
    Ok(())
}
