//! Login sequence against an ordinary HTML form.
//!
//! One attempt, no retries: prime cookies from the site root, fetch the login
//! page, infer the form, post credentials, and classify what comes back.
//! Classification is best-effort: an absent error banner or a redirect away
//! from the login page counts as success; nothing further is verified.

use crate::config::PortalConfig;
use crate::form_inspector;
use crate::session::HttpSession;
use crate::types::{excerpt, AuthOutcome, PortalError, PortalResult, AUTH_EXCERPT_CHARS};
use reqwest::header::{LOCATION, ORIGIN, REFERER};
use scraper::{Html, Selector};
use std::collections::BTreeMap;

/// Run the login sequence. Any failure is wrapped in
/// [`PortalError::Authentication`].
pub async fn authenticate(
    session: &HttpSession,
    config: &PortalConfig,
    username: &str,
    password: &str,
) -> PortalResult<AuthOutcome> {
    match login_sequence(session, config, username, password).await {
        Ok(outcome) => {
            tracing::info!(
                success = outcome.is_success(),
                "authentication finished: {}",
                outcome.message()
            );
            Ok(outcome)
        }
        Err(e) => {
            tracing::warn!("authentication aborted: {e}");
            Err(PortalError::Authentication(Box::new(e)))
        }
    }
}

async fn login_sequence(
    session: &HttpSession,
    config: &PortalConfig,
    username: &str,
    password: &str,
) -> PortalResult<AuthOutcome> {
    let client = session.client()?;

    // Only primes the cookie jar.
    let root = config.resolve_endpoint("/")?;
    client.get(root).send().await?;

    let login_url = config.resolve_endpoint(&config.login_path)?;
    let login_page = client.get(login_url.clone()).send().await?;
    let status = login_page.status().as_u16();
    if status != 200 {
        return Err(PortalError::Request {
            status: Some(status),
            message: format!("Cannot access login page: HTTP {status}"),
        });
    }
    let login_html = login_page.text().await?;

    let form = form_inspector::find_login_form(&login_html)?;
    let action_url = config.resolve_endpoint(&form.action)?;
    let body = form.submission(username, password);

    let field_names: Vec<&str> = body.iter().map(|(name, _)| name.as_str()).collect();
    tracing::debug!(fields = ?field_names, action = %action_url, "submitting login form");

    let response = session
        .no_redirect_client()?
        .post(action_url)
        .header(REFERER, login_url.as_str())
        .header(ORIGIN, config.origin())
        .form(&body)
        .send()
        .await?;

    let status = response.status().as_u16();
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let text = response.text().await?;

    Ok(classify(status, location.as_deref(), &text, session.cookie_snapshot()))
}

/// Decide the outcome of a login POST.
pub fn classify(
    status: u16,
    location: Option<&str>,
    body: &str,
    cookies: BTreeMap<String, String>,
) -> AuthOutcome {
    match status {
        200 => match error_banner_text(body) {
            Some(text) => AuthOutcome::Failure {
                reason: format!("Authentication failed: {text}"),
                status,
                excerpt: None,
            },
            None => AuthOutcome::Success {
                message: "Authentication successful".to_string(),
                status,
                cookies,
                redirect: None,
            },
        },
        302 | 303 | 307 => {
            let location = location.unwrap_or("");
            if location.to_lowercase().contains("/login") {
                AuthOutcome::Failure {
                    reason: "Authentication failed (redirected back to login)".to_string(),
                    status,
                    excerpt: None,
                }
            } else {
                AuthOutcome::Success {
                    message: "Authentication successful (redirected)".to_string(),
                    status,
                    cookies,
                    redirect: Some(location.to_string()),
                }
            }
        }
        _ => AuthOutcome::Failure {
            reason: format!("Authentication failed: HTTP {status}"),
            status,
            excerpt: Some(excerpt(body, AUTH_EXCERPT_CHARS).to_string()),
        },
    }
}

/// Text of every element whose class mentions `error` or `alert`, joined by
/// spaces. `None` when the page has no such element.
fn error_banner_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let sel = Selector::parse("[class]").expect("class selector is valid");

    let texts: Vec<String> = document
        .select(&sel)
        .filter(|el| {
            el.value().attr("class").is_some_and(|class| {
                let class = class.to_lowercase();
                class.contains("error") || class.contains("alert")
            })
        })
        .map(|el| {
            el.text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();

    if texts.is_empty() {
        None
    } else {
        Some(texts.join(" ").trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jar() -> BTreeMap<String, String> {
        BTreeMap::from([("sessionid".to_string(), "s3cr3t".to_string())])
    }

    #[test]
    fn test_redirect_to_dashboard_is_success() {
        let outcome = classify(302, Some("/dashboard"), "", jar());
        match outcome {
            AuthOutcome::Success {
                redirect, cookies, ..
            } => {
                assert_eq!(redirect.as_deref(), Some("/dashboard"));
                assert_eq!(cookies.get("sessionid").map(String::as_str), Some("s3cr3t"));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_redirect_to_login_is_failure() {
        let outcome = classify(302, Some("/login?error=1"), "", jar());
        assert!(!outcome.is_success());
        assert!(outcome.message().contains("redirected back to login"));
    }

    #[test]
    fn test_redirect_check_is_case_insensitive() {
        assert!(!classify(303, Some("https://schools.by/LOGIN"), "", jar()).is_success());
        assert!(classify(307, Some("https://gymn1.schools.by/pupil/1"), "", jar()).is_success());
    }

    #[test]
    fn test_200_with_error_banner_is_failure() {
        let body = r#"<html><body>
            <div class="alert alert-danger">Неверный логин
                или пароль</div>
            <form></form></body></html>"#;
        match classify(200, None, body, jar()) {
            AuthOutcome::Failure { reason, status, .. } => {
                assert_eq!(status, 200);
                assert_eq!(reason, "Authentication failed: Неверный логин или пароль");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_200_without_banner_is_success() {
        let body = r#"<html><body><div class="profile">Welcome</div></body></html>"#;
        let outcome = classify(200, None, body, jar());
        assert!(outcome.is_success());
        assert_eq!(outcome.message(), "Authentication successful");
    }

    #[test]
    fn test_other_status_keeps_excerpt() {
        let body = "x".repeat(2000);
        match classify(403, None, &body, jar()) {
            AuthOutcome::Failure {
                reason, excerpt, ..
            } => {
                assert_eq!(reason, "Authentication failed: HTTP 403");
                assert_eq!(excerpt.map(|e| e.len()), Some(500));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_301_is_not_a_login_redirect() {
        assert!(!classify(301, Some("/dashboard"), "", jar()).is_success());
    }
}
