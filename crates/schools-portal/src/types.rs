//! Shared data types: response envelopes, form descriptors, authentication
//! outcomes, harvesting results, and the error type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Maximum characters of a response body carried in a request error.
pub const REQUEST_EXCERPT_CHARS: usize = 200;

/// Maximum characters of a response body carried in an authentication failure.
pub const AUTH_EXCERPT_CHARS: usize = 500;

// ── Response envelopes ──────────────────────────────────────────────────────

/// The normalized result of one HTTP call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseEnvelope {
    /// A JSON body, or a JSON object recovered from an inline script.
    Structured {
        /// Parsed payload.
        data: Value,
    },
    /// Markup (or any non-JSON body) that yielded no structured data.
    Markup(RawMarkup),
    /// Transport-level failure downgraded to a value (`allow_error_responses`).
    Error {
        /// Underlying transport error message.
        message: String,
        /// Whether retrying later might succeed.
        recoverable: bool,
    },
}

impl ResponseEnvelope {
    /// The structured payload, if any.
    pub fn data(&self) -> Option<&Value> {
        match self {
            ResponseEnvelope::Structured { data } => Some(data),
            _ => None,
        }
    }

    /// The raw markup, if any.
    pub fn markup(&self) -> Option<&RawMarkup> {
        match self {
            ResponseEnvelope::Markup(raw) => Some(raw),
            _ => None,
        }
    }

    /// Whether this envelope represents a failed request.
    pub fn is_error(&self) -> bool {
        match self {
            ResponseEnvelope::Structured { .. } => false,
            ResponseEnvelope::Markup(raw) => raw.error,
            ResponseEnvelope::Error { .. } => true,
        }
    }
}

/// Raw response text with its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawMarkup {
    /// Full response body.
    pub html: String,
    /// HTTP status code.
    pub status: u16,
    /// Set when the response was a non-200 passed through to the caller.
    pub error: bool,
    /// Effective URL after redirects; only recorded for passed-through errors.
    pub url: Option<String>,
}

// ── Login forms ─────────────────────────────────────────────────────────────

/// A single field inside an HTML form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    /// The `name` attribute (empty when absent).
    pub name: String,
    /// The `type` attribute, or the tag name for `select`/`textarea`.
    pub field_type: String,
    /// Pre-filled `value` attribute (empty when absent).
    pub value: String,
    /// Whether the field has the `required` attribute.
    pub required: bool,
}

impl FormField {
    /// Whether the field is an `<input type="hidden">`.
    pub fn is_hidden(&self) -> bool {
        self.field_type.eq_ignore_ascii_case("hidden")
    }
}

/// The first form on a page as it appears in the markup, before any
/// credential inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormSnapshot {
    /// Raw `action` attribute (empty when absent).
    pub action: String,
    /// Raw `method` attribute (defaults to `POST`).
    pub method: String,
    /// Every `input`, `textarea` and `select` in document order.
    pub fields: Vec<FormField>,
}

/// Where a CSRF token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CsrfSource {
    /// An `<input>` with a canonical token name.
    HiddenInput,
    /// `<meta name="csrf-token">`.
    MetaTag,
    /// A token assignment inside an inline script.
    InlineScript,
}

/// A discovered CSRF token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsrfToken {
    pub value: String,
    pub source: CsrfSource,
}

/// The inferred shape of a login form, sufficient to submit credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginFormDescriptor {
    /// Action URL as written in the form (defaults to the login path).
    pub action: String,
    /// HTTP method, upper-cased.
    pub method: String,
    /// All fields in document order.
    pub fields: Vec<FormField>,
    /// Name of the field that receives the username.
    pub username_field: String,
    /// Name of the field that receives the password.
    pub password_field: String,
    /// Token value, when one was found anywhere on the page.
    pub csrf_token: Option<String>,
    /// Canonical hidden field the token is re-submitted under.
    pub csrf_field: Option<String>,
}

impl LoginFormDescriptor {
    /// Build the url-encoded submission body.
    ///
    /// Hidden fields first, then credentials, then the token; later entries
    /// overwrite earlier ones with the same name while keeping first-seen order.
    pub fn submission(&self, username: &str, password: &str) -> Vec<(String, String)> {
        let mut body: Vec<(String, String)> = Vec::new();
        let mut put = |name: &str, value: &str| {
            match body.iter_mut().find(|(n, _)| n == name) {
                Some(entry) => entry.1 = value.to_string(),
                None => body.push((name.to_string(), value.to_string())),
            }
        };

        for field in self.fields.iter().filter(|f| f.is_hidden()) {
            if !field.name.is_empty() {
                put(&field.name, &field.value);
            }
        }
        put(&self.username_field, username);
        put(&self.password_field, password);
        if let (Some(name), Some(token)) = (&self.csrf_field, &self.csrf_token) {
            put(name, token);
        }

        body
    }
}

// ── Authentication ──────────────────────────────────────────────────────────

/// Result of one login attempt.
///
/// Success is a best-effort classification (no error banner, or a redirect
/// away from the login page); it is not verified against an authenticated
/// page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuthOutcome {
    Success {
        message: String,
        status: u16,
        /// Cookie jar contents for the base origin after the POST.
        cookies: BTreeMap<String, String>,
        /// `Location` of a redirect-based success.
        redirect: Option<String>,
    },
    Failure {
        reason: String,
        status: u16,
        /// Truncated body for unexpected statuses.
        excerpt: Option<String>,
    },
}

impl AuthOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success { .. })
    }

    /// Success message or failure reason.
    pub fn message(&self) -> &str {
        match self {
            AuthOutcome::Success { message, .. } => message,
            AuthOutcome::Failure { reason, .. } => reason,
        }
    }
}

// ── Endpoint probing ────────────────────────────────────────────────────────

/// One probed endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointProbe {
    pub endpoint: String,
    /// Absent when the request never produced a response.
    pub status: Option<u16>,
    pub content_type: Option<String>,
    /// Redirect target for 30x responses.
    pub location: Option<String>,
    /// Transport error message.
    pub error: Option<String>,
}

/// Probe results partitioned by outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EndpointReport {
    pub working: Vec<EndpointProbe>,
    pub redirects: Vec<EndpointProbe>,
    pub failing: Vec<EndpointProbe>,
}

impl EndpointReport {
    /// Total number of classified endpoints.
    pub fn len(&self) -> usize {
        self.working.len() + self.redirects.len() + self.failing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Link harvesting ─────────────────────────────────────────────────────────

/// Where a harvested link was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "page", rename_all = "snake_case")]
pub enum LinkSource {
    MainPage,
    Subdomains,
    Page(String),
}

/// A link to a related sub-site (usually a school's own subdomain).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchoolLink {
    /// Visible anchor text, trimmed.
    pub name: String,
    /// The `href` as written.
    pub url: String,
    pub source: LinkSource,
}

// ── Query parameters ────────────────────────────────────────────────────────

/// Grading period accepted by the grades page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradePeriod {
    Quarter,
    Semester,
    Year,
}

impl GradePeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            GradePeriod::Quarter => "quarter",
            GradePeriod::Semester => "semester",
            GradePeriod::Year => "year",
        }
    }
}

impl std::str::FromStr for GradePeriod {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quarter" => Ok(GradePeriod::Quarter),
            "semester" => Ok(GradePeriod::Semester),
            "year" => Ok(GradePeriod::Year),
            other => Err(PortalError::Config(format!("unknown grading period: {other}"))),
        }
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

/// Login form could not be used.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FormFieldError {
    #[error("Login form not found on the page")]
    FormNotFound,

    #[error("Cannot find login fields. Found: username={}, password={}",
        .username.as_deref().unwrap_or("None"),
        .password.as_deref().unwrap_or("None"))]
    MissingFields {
        username: Option<String>,
        password: Option<String>,
    },
}

impl FormFieldError {
    pub fn missing_username(&self) -> bool {
        matches!(self, FormFieldError::MissingFields { username: None, .. })
    }

    pub fn missing_password(&self) -> bool {
        matches!(self, FormFieldError::MissingFields { password: None, .. })
    }
}

/// All errors raised by the portal client.
#[derive(thiserror::Error, Debug)]
pub enum PortalError {
    /// Non-2xx response or transport failure that was not allowed through.
    #[error("Request failed: {message}")]
    Request {
        status: Option<u16>,
        message: String,
    },

    #[error("Login form error: {0}")]
    FormField(#[from] FormFieldError),

    /// Any failure during the login sequence, wrapping its cause.
    #[error("Authentication failed: {0}")]
    Authentication(#[source] Box<PortalError>),

    /// Session used before open, after close, or opened twice.
    #[error("Session state error: {0}")]
    State(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PortalError {
    /// Build a request error from a status and response body.
    pub fn status(status: u16, body: &str) -> Self {
        PortalError::Request {
            status: Some(status),
            message: format!("HTTP {status}: {}...", excerpt(body, REQUEST_EXCERPT_CHARS)),
        }
    }

    /// Build a request error from a transport failure.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        PortalError::Request {
            status: None,
            message: err.to_string(),
        }
    }

    /// Strip one level of authentication wrapping.
    pub fn cause(&self) -> &PortalError {
        match self {
            PortalError::Authentication(inner) => inner,
            other => other,
        }
    }
}

impl From<reqwest::Error> for PortalError {
    fn from(e: reqwest::Error) -> Self {
        PortalError::transport(e)
    }
}

/// Convenience result type.
pub type PortalResult<T> = Result<T, PortalError>;

/// First `max` characters of `text`, cut on a character boundary.
pub fn excerpt(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> LoginFormDescriptor {
        LoginFormDescriptor {
            action: "/login".to_string(),
            method: "POST".to_string(),
            fields: vec![
                FormField {
                    name: "csrf_token".to_string(),
                    field_type: "hidden".to_string(),
                    value: "stale".to_string(),
                    required: false,
                },
                FormField {
                    name: "next".to_string(),
                    field_type: "hidden".to_string(),
                    value: "/home".to_string(),
                    required: false,
                },
                FormField {
                    name: "login".to_string(),
                    field_type: "text".to_string(),
                    value: String::new(),
                    required: true,
                },
                FormField {
                    name: "password".to_string(),
                    field_type: "password".to_string(),
                    value: String::new(),
                    required: true,
                },
            ],
            username_field: "login".to_string(),
            password_field: "password".to_string(),
            csrf_token: Some("fresh".to_string()),
            csrf_field: Some("csrf_token".to_string()),
        }
    }

    #[test]
    fn test_submission_overwrites_hidden_token() {
        let body = descriptor().submission("ivan", "secret");
        assert_eq!(
            body,
            vec![
                ("csrf_token".to_string(), "fresh".to_string()),
                ("next".to_string(), "/home".to_string()),
                ("login".to_string(), "ivan".to_string()),
                ("password".to_string(), "secret".to_string()),
            ]
        );
    }

    #[test]
    fn test_submission_without_csrf_field_omits_token() {
        let mut d = descriptor();
        d.csrf_field = None;
        let body = d.submission("ivan", "secret");
        assert!(body.iter().any(|(n, v)| n == "csrf_token" && v == "stale"));
        assert!(!body.iter().any(|(_, v)| v == "fresh"));
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("привет", 3), "при");
        assert_eq!(excerpt("abc", 10), "abc");
        assert_eq!(excerpt("", 5), "");
    }

    #[test]
    fn test_status_error_is_truncated() {
        let body = "x".repeat(1000);
        let err = PortalError::status(404, &body);
        let msg = err.to_string();
        assert!(msg.starts_with("Request failed: HTTP 404: "));
        assert!(msg.len() < 260);
    }

    #[test]
    fn test_form_field_error_names_missing_side() {
        let err = FormFieldError::MissingFields {
            username: Some("login".to_string()),
            password: None,
        };
        assert!(err.missing_password());
        assert!(!err.missing_username());
        assert_eq!(
            err.to_string(),
            "Cannot find login fields. Found: username=login, password=None"
        );
    }

    #[test]
    fn test_grade_period_parse() {
        assert_eq!("Quarter".parse::<GradePeriod>().unwrap(), GradePeriod::Quarter);
        assert_eq!(GradePeriod::Year.as_str(), "year");
        assert!("decade".parse::<GradePeriod>().is_err());
    }

    #[test]
    fn test_envelope_error_flag() {
        let ok = ResponseEnvelope::Structured {
            data: serde_json::json!({"a": 1}),
        };
        assert!(!ok.is_error());
        let raw = ResponseEnvelope::Markup(RawMarkup {
            html: "<p>oops</p>".to_string(),
            status: 500,
            error: true,
            url: None,
        });
        assert!(raw.is_error());
        assert_eq!(raw.markup().map(|m| m.status), Some(500));
    }
}
