//! Login sequence against a mock portal.

use schools_portal::{AuthOutcome, FormFieldError, PortalConfig, PortalError, SchoolsClient};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ─────────────────────── helpers ───────────────────────

const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Вход</title></head><body>
<form action="/login" method="post">
    <input type="hidden" name="csrfmiddlewaretoken" value="tok-123">
    <input type="text" name="username" required>
    <input type="password" name="password" required>
    <button type="submit">Войти</button>
</form>
</body></html>"#;

fn html(status: u16, body: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_raw(body.to_string(), "text/html; charset=utf-8")
}

/// Mount the root page and a login page with the given markup.
async fn portal_with_login_page(page: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(200, "<html><body>main</body></html>").insert_header(
            "set-cookie",
            "csrftoken=prime; Path=/",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(html(200, page))
        .mount(&server)
        .await;
    server
}

async fn login(server: &MockServer, username: &str, password: &str) -> Result<AuthOutcome, PortalError> {
    let config = PortalConfig::new(&server.uri()).unwrap();
    let username = username.to_string();
    let password = password.to_string();
    SchoolsClient::scoped(config, |client| {
        Box::pin(async move { client.authenticate(&username, &password).await })
    })
    .await
}

// ─────────────────────── outcomes ───────────────────────

#[tokio::test]
async fn test_redirect_away_from_login_succeeds() {
    let server = portal_with_login_page(LOGIN_PAGE).await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains("username=ivan"))
        .and(body_string_contains("password=secret"))
        .and(body_string_contains("csrfmiddlewaretoken=tok-123"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", "/dashboard")
                .insert_header("set-cookie", "sessionid=s3cr3t; Path=/; HttpOnly"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let outcome = login(&server, "ivan", "secret").await.unwrap();
    match outcome {
        AuthOutcome::Success {
            message,
            status,
            cookies,
            redirect,
        } => {
            assert_eq!(message, "Authentication successful (redirected)");
            assert_eq!(status, 302);
            assert_eq!(redirect.as_deref(), Some("/dashboard"));
            assert_eq!(cookies.get("sessionid").map(String::as_str), Some("s3cr3t"));
            assert_eq!(cookies.get("csrftoken").map(String::as_str), Some("prime"));
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_redirect_back_to_login_fails() {
    let server = portal_with_login_page(LOGIN_PAGE).await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/login?error=1"))
        .mount(&server)
        .await;

    let outcome = login(&server, "ivan", "wrong").await.unwrap();
    assert!(!outcome.is_success());
    assert_eq!(
        outcome.message(),
        "Authentication failed (redirected back to login)"
    );
}

#[tokio::test]
async fn test_error_banner_on_200_fails() {
    let server = portal_with_login_page(LOGIN_PAGE).await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(html(
            200,
            r#"<html><body><ul class="errorlist"><li>Неверный логин или пароль</li></ul></body></html>"#,
        ))
        .mount(&server)
        .await;

    let outcome = login(&server, "ivan", "wrong").await.unwrap();
    match outcome {
        AuthOutcome::Failure { reason, status, .. } => {
            assert_eq!(status, 200);
            assert_eq!(reason, "Authentication failed: Неверный логин или пароль");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unexpected_status_fails_with_excerpt() {
    let server = portal_with_login_page(LOGIN_PAGE).await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(html(403, "forbidden by upstream"))
        .mount(&server)
        .await;

    match login(&server, "ivan", "secret").await.unwrap() {
        AuthOutcome::Failure {
            reason, excerpt, ..
        } => {
            assert_eq!(reason, "Authentication failed: HTTP 403");
            assert_eq!(excerpt.as_deref(), Some("forbidden by upstream"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

// ─────────────────────── form handling ───────────────────────

#[tokio::test]
async fn test_hidden_token_wins_over_meta_and_is_posted() {
    let page = r#"<html><head><meta name="csrf-token" content="from-meta"></head><body>
        <form action="/auth/submit" method="post">
            <input type="hidden" name="_token" value="from-input">
            <input type="hidden" name="next" value="/pupil">
            <input type="email" name="mail">
            <input type="password" name="pwd">
        </form></body></html>"#;
    let server = portal_with_login_page(page).await;
    let login_url = format!("{}/login", server.uri());
    Mock::given(method("POST"))
        .and(path("/auth/submit"))
        .and(body_string_contains("_token=from-input"))
        .and(body_string_contains("next=%2Fpupil"))
        .and(body_string_contains("mail=ivan"))
        .and(header("referer", login_url.as_str()))
        .and(header("origin", server.uri().as_str()))
        .respond_with(ResponseTemplate::new(303).insert_header("location", "/pupil"))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = login(&server, "ivan", "secret").await.unwrap();
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_missing_password_field_is_form_error() {
    let page = r#"<html><body><form action="/login">
        <input type="text" name="username"><input type="text" name="code">
        </form></body></html>"#;
    let server = portal_with_login_page(page).await;

    let err = login(&server, "ivan", "secret").await.unwrap_err();
    assert!(matches!(err, PortalError::Authentication(_)));
    match err.cause() {
        PortalError::FormField(form_err @ FormFieldError::MissingFields { .. }) => {
            assert!(form_err.missing_password());
            assert!(!form_err.missing_username());
        }
        other => panic!("expected missing fields, got {other:?}"),
    }
}

#[tokio::test]
async fn test_page_without_form_is_form_error() {
    let server = portal_with_login_page("<html><body>maintenance</body></html>").await;

    let err = login(&server, "ivan", "secret").await.unwrap_err();
    assert!(matches!(
        err.cause(),
        PortalError::FormField(FormFieldError::FormNotFound)
    ));
}

#[tokio::test]
async fn test_unreachable_login_page_is_request_error() {
    let server = MockServer::start().await;

    let err = login(&server, "ivan", "secret").await.unwrap_err();
    assert!(matches!(err, PortalError::Authentication(_)));
    match err.cause() {
        PortalError::Request { status, message } => {
            assert_eq!(*status, Some(404));
            assert_eq!(message, "Cannot access login page: HTTP 404");
        }
        other => panic!("expected request error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_analyze_login_form_describes_first_form() {
    let server = portal_with_login_page(LOGIN_PAGE).await;
    let config = PortalConfig::new(&server.uri()).unwrap();

    let snapshot = SchoolsClient::scoped(config, |client| {
        Box::pin(async move { client.analyze_login_form().await })
    })
    .await
    .unwrap();

    assert_eq!(snapshot.action, "/login");
    assert_eq!(snapshot.method, "POST");
    let names: Vec<&str> = snapshot.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["csrfmiddlewaretoken", "username", "password"]);
    assert!(snapshot.fields[0].is_hidden());
}
