//! Login form discovery.
//!
//! Locates the first `<form>` on a page, infers which inputs take the
//! username and password, and finds a CSRF token wherever the page keeps it.
//! The heuristics here are tied to the markup of one site; the authenticator
//! only sees the resulting [`LoginFormDescriptor`].

use crate::types::{CsrfSource, CsrfToken, FormField, FormFieldError, FormSnapshot, LoginFormDescriptor};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

/// Lowercased names that identify a username input.
const USERNAME_NAMES: &[&str] = &["username", "login", "email", "user", "login_name"];

/// Lowercased names that identify a password input.
const PASSWORD_NAMES: &[&str] = &["password", "pass", "pwd"];

/// Canonical hidden-field names for CSRF tokens, in priority order.
pub const CSRF_FIELD_NAMES: &[&str] = &["csrfmiddlewaretoken", "_token", "csrf_token"];

/// Action used when the form has none.
const DEFAULT_ACTION: &str = "/login";

fn script_token_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r#"(?i)csrf[_\-]?token["']?\s*[:=]\s*["']([a-zA-Z0-9\-_]+)["']"#,
            r#"(?i)_token["']?\s*[:=]\s*["']([a-zA-Z0-9\-_]+)["']"#,
        ]
        .iter()
        .map(|p| Regex::new(p).expect("token regex is valid"))
        .collect()
    })
}

/// Describe the first form on the page without interpreting it.
pub fn first_form(html: &str) -> Option<FormSnapshot> {
    let document = Html::parse_document(html);
    let form_sel = Selector::parse("form").expect("form selector is valid");
    let form = document.select(&form_sel).next()?;

    Some(FormSnapshot {
        action: form.value().attr("action").unwrap_or("").to_string(),
        method: form.value().attr("method").unwrap_or("POST").to_uppercase(),
        fields: collect_fields(&form),
    })
}

/// Locate the login form and infer its credential fields and CSRF token.
pub fn find_login_form(html: &str) -> Result<LoginFormDescriptor, FormFieldError> {
    let snapshot = first_form(html).ok_or(FormFieldError::FormNotFound)?;
    let (username, password) = infer_credential_fields(&snapshot.fields);

    let (username_field, password_field) = match (username, password) {
        (Some(u), Some(p)) => (u, p),
        (username, password) => {
            return Err(FormFieldError::MissingFields { username, password });
        }
    };

    let token = find_csrf_token(html);
    let csrf_field = token.as_ref().and_then(|_| {
        CSRF_FIELD_NAMES
            .iter()
            .find(|canonical| {
                snapshot
                    .fields
                    .iter()
                    .any(|f| f.is_hidden() && f.name == **canonical)
            })
            .map(|name| name.to_string())
    });

    let action = if snapshot.action.trim().is_empty() {
        DEFAULT_ACTION.to_string()
    } else {
        snapshot.action.trim().to_string()
    };

    Ok(LoginFormDescriptor {
        action,
        method: snapshot.method,
        fields: snapshot.fields,
        username_field,
        password_field,
        csrf_token: token.map(|t| t.value),
        csrf_field,
    })
}

/// Find a CSRF token: canonical inputs first, then the meta tag, then
/// inline scripts.
pub fn find_csrf_token(html: &str) -> Option<CsrfToken> {
    let document = Html::parse_document(html);

    for name in CSRF_FIELD_NAMES {
        let sel = Selector::parse(&format!("input[name=\"{name}\"]")).ok()?;
        let value = document
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr("value"))
            .filter(|v| !v.is_empty());
        if let Some(value) = value {
            return Some(CsrfToken {
                value: value.to_string(),
                source: CsrfSource::HiddenInput,
            });
        }
    }

    let meta_sel = Selector::parse("meta[name=\"csrf-token\"]").expect("meta selector is valid");
    if let Some(content) = document
        .select(&meta_sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .filter(|v| !v.is_empty())
    {
        return Some(CsrfToken {
            value: content.to_string(),
            source: CsrfSource::MetaTag,
        });
    }

    let script_sel = Selector::parse("script").expect("script selector is valid");
    for script in document.select(&script_sel) {
        let content: String = script.text().collect();
        let lower = content.to_lowercase();
        if !(lower.contains("csrf") || lower.contains("token")) {
            continue;
        }
        for pattern in script_token_patterns() {
            if let Some(value) = pattern.captures(&content).and_then(|c| c.get(1)) {
                return Some(CsrfToken {
                    value: value.as_str().to_string(),
                    source: CsrfSource::InlineScript,
                });
            }
        }
    }

    None
}

/// Pick the username and password inputs.
///
/// Named matches and `email`/`password` types win, first hit per side; a
/// single input never fills both. When no input qualifies as the username by
/// those rules, the first text input is used instead.
fn infer_credential_fields(fields: &[FormField]) -> (Option<String>, Option<String>) {
    let mut username: Option<String> = None;
    let mut password: Option<String> = None;

    for field in fields.iter().filter(|f| is_input(f) && !f.name.is_empty()) {
        let name = field.name.to_lowercase();
        let kind = field.field_type.to_lowercase();

        if username.is_none() && (USERNAME_NAMES.contains(&name.as_str()) || kind == "email") {
            username = Some(field.name.clone());
        } else if password.is_none()
            && (PASSWORD_NAMES.contains(&name.as_str()) || kind == "password")
        {
            password = Some(field.name.clone());
        }
    }

    if username.is_none() {
        username = fields
            .iter()
            .filter(|f| is_input(f) && !f.name.is_empty())
            .find(|f| {
                f.field_type.eq_ignore_ascii_case("text")
                    && password.as_deref() != Some(f.name.as_str())
            })
            .map(|f| f.name.clone());
    }

    (username, password)
}

fn is_input(field: &FormField) -> bool {
    !matches!(field.field_type.as_str(), "select" | "textarea")
}

fn collect_fields(form: &ElementRef<'_>) -> Vec<FormField> {
    let field_sel = Selector::parse("input, textarea, select").expect("field selector is valid");

    form.select(&field_sel)
        .map(|el| {
            let tag = el.value().name();
            let field_type = match tag {
                "input" => el.value().attr("type").unwrap_or("text").to_lowercase(),
                other => other.to_string(),
            };
            FormField {
                name: el.value().attr("name").unwrap_or("").to_string(),
                field_type,
                value: el.value().attr("value").unwrap_or("").to_string(),
                required: el.value().attr("required").is_some(),
            }
        })
        .collect()
}
