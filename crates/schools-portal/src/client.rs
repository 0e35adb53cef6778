//! The client the front end talks to.
//!
//! A [`SchoolsClient`] owns at most one [`HttpSession`] over its lifetime:
//! `open` once, use, `close` once. Front ends normally go through
//! [`SchoolsClient::scoped`], which opens a fresh client for a single
//! operation and closes it on every path.

use crate::authenticator;
use crate::config::PortalConfig;
use crate::form_inspector;
use crate::harvester;
use crate::normalizer;
use crate::prober;
use crate::session::HttpSession;
use crate::types::{
    AuthOutcome, EndpointReport, FormFieldError, FormSnapshot, GradePeriod, PortalError, PortalResult,
    ResponseEnvelope, SchoolLink,
};
use chrono::NaiveDate;
use futures::future::BoxFuture;
use reqwest::Method;

/// Fixed data endpoints.
pub mod endpoints {
    pub const PROFILE: &str = "/profile";
    pub const SCHEDULE: &str = "/schedule";
    pub const GRADES: &str = "/grades";
    pub const HOMEWORK: &str = "/homework";
    pub const ANNOUNCEMENTS: &str = "/announcements";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Open,
    Closed,
}

/// Scraping client for the portal.
pub struct SchoolsClient {
    config: PortalConfig,
    session: Option<HttpSession>,
    lifecycle: Lifecycle,
}

impl SchoolsClient {
    /// Create an unopened client.
    pub fn new(config: PortalConfig) -> Self {
        Self {
            config,
            session: None,
            lifecycle: Lifecycle::Idle,
        }
    }

    /// Open and run `op` against a fresh client, then close it whether or not
    /// `op` succeeded.
    ///
    /// ```no_run
    /// # use schools_portal::{PortalConfig, SchoolsClient};
    /// # async fn demo() -> schools_portal::PortalResult<()> {
    /// let outcome = SchoolsClient::scoped(PortalConfig::default(), |client| {
    ///     Box::pin(async move { client.authenticate("ivan", "secret").await })
    /// })
    /// .await?;
    /// # Ok(()) }
    /// ```
    pub async fn scoped<T, F>(config: PortalConfig, op: F) -> PortalResult<T>
    where
        F: for<'c> FnOnce(&'c SchoolsClient) -> BoxFuture<'c, PortalResult<T>>,
    {
        let mut client = SchoolsClient::new(config);
        client.open()?;
        client.run_then_close(op).await
    }

    async fn run_then_close<T, F>(&mut self, op: F) -> PortalResult<T>
    where
        F: for<'c> FnOnce(&'c SchoolsClient) -> BoxFuture<'c, PortalResult<T>>,
    {
        let result = op(&*self).await;
        let closed = self.close();
        let value = result?;
        closed?;
        Ok(value)
    }

    /// Open the session. A client opens at most once.
    pub fn open(&mut self) -> PortalResult<()> {
        match self.lifecycle {
            Lifecycle::Idle => {
                self.session = Some(HttpSession::open(&self.config)?);
                self.lifecycle = Lifecycle::Open;
                Ok(())
            }
            Lifecycle::Open => Err(PortalError::State("session is already open".to_string())),
            Lifecycle::Closed => Err(PortalError::State(
                "session was closed and cannot be reopened".to_string(),
            )),
        }
    }

    /// Close the session and release its transport.
    pub fn close(&mut self) -> PortalResult<()> {
        match self.lifecycle {
            Lifecycle::Open => {
                self.lifecycle = Lifecycle::Closed;
                match self.session.take() {
                    Some(mut session) => session.close(),
                    None => Ok(()),
                }
            }
            Lifecycle::Idle => Err(PortalError::State("session was never opened".to_string())),
            Lifecycle::Closed => Err(PortalError::State("session is already closed".to_string())),
        }
    }

    pub fn is_open(&self) -> bool {
        self.lifecycle == Lifecycle::Open
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    fn session(&self) -> PortalResult<&HttpSession> {
        match (self.lifecycle, &self.session) {
            (Lifecycle::Open, Some(session)) => Ok(session),
            (Lifecycle::Closed, _) => Err(PortalError::State("session is closed".to_string())),
            _ => Err(PortalError::State("session is not open".to_string())),
        }
    }

    // ── Generic requests ────────────────────────────────────────────────────

    /// Request `endpoint` and normalize the response.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        allow_error_responses: bool,
        params: &[(&str, &str)],
    ) -> PortalResult<ResponseEnvelope> {
        normalizer::request(self.session()?, method, endpoint, allow_error_responses, params).await
    }

    async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> PortalResult<ResponseEnvelope> {
        self.request(Method::GET, endpoint, false, params).await
    }

    // ── Authentication ──────────────────────────────────────────────────────

    /// Log in with the site's login form.
    pub async fn authenticate(&self, username: &str, password: &str) -> PortalResult<AuthOutcome> {
        let session = self
            .session()
            .map_err(|e| PortalError::Authentication(Box::new(e)))?;
        authenticator::authenticate(session, &self.config, username, password).await
    }

    // ── Data retrieval ──────────────────────────────────────────────────────

    pub async fn get_user_info(&self) -> PortalResult<ResponseEnvelope> {
        self.get(endpoints::PROFILE, &[]).await
    }

    pub async fn get_schedule(&self, date: Option<NaiveDate>) -> PortalResult<ResponseEnvelope> {
        let date = date.map(format_date);
        self.get(endpoints::SCHEDULE, &date_param(date.as_deref())).await
    }

    pub async fn get_grades(&self, period: Option<GradePeriod>) -> PortalResult<ResponseEnvelope> {
        let params: Vec<(&str, &str)> = period.map(|p| ("period", p.as_str())).into_iter().collect();
        self.get(endpoints::GRADES, &params).await
    }

    pub async fn get_homework(&self, date: Option<NaiveDate>) -> PortalResult<ResponseEnvelope> {
        let date = date.map(format_date);
        self.get(endpoints::HOMEWORK, &date_param(date.as_deref())).await
    }

    pub async fn get_announcements(&self) -> PortalResult<ResponseEnvelope> {
        self.get(endpoints::ANNOUNCEMENTS, &[]).await
    }

    // ── Diagnostics and search ──────────────────────────────────────────────

    pub async fn discover_endpoints(&self) -> PortalResult<EndpointReport> {
        prober::discover_endpoints(self.session()?, &self.config).await
    }

    /// Never fails; a closed client simply finds nothing.
    pub async fn search_schools(&self, query: &str) -> Vec<SchoolLink> {
        match self.session() {
            Ok(session) => harvester::search_schools(session, &self.config, query).await,
            Err(e) => {
                tracing::warn!("school search skipped: {e}");
                Vec::new()
            }
        }
    }

    /// Never fails; a closed client simply finds nothing.
    pub async fn get_subdomains_page(&self) -> Vec<SchoolLink> {
        match self.session() {
            Ok(session) => harvester::get_subdomains_page(session, &self.config).await,
            Err(e) => {
                tracing::warn!("subdomain listing skipped: {e}");
                Vec::new()
            }
        }
    }

    /// Describe the login page's first form.
    pub async fn analyze_login_form(&self) -> PortalResult<FormSnapshot> {
        let login_path = self.config.login_path.clone();
        match self.get(&login_path, &[]).await? {
            ResponseEnvelope::Markup(raw) => {
                form_inspector::first_form(&raw.html).ok_or_else(form_not_found)
            }
            _ => Err(form_not_found()),
        }
    }
}

fn form_not_found() -> PortalError {
    PortalError::FormField(FormFieldError::FormNotFound)
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn date_param(date: Option<&str>) -> Vec<(&str, &str)> {
    date.map(|d| ("date", d)).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_twice_is_state_error() {
        let mut client = SchoolsClient::new(PortalConfig::default());
        client.open().unwrap();
        assert!(matches!(client.open(), Err(PortalError::State(_))));
    }

    #[test]
    fn test_reopen_after_close_is_state_error() {
        let mut client = SchoolsClient::new(PortalConfig::default());
        client.open().unwrap();
        client.close().unwrap();
        assert!(matches!(client.open(), Err(PortalError::State(_))));
        assert!(matches!(client.close(), Err(PortalError::State(_))));
    }

    #[test]
    fn test_close_before_open_is_state_error() {
        let mut client = SchoolsClient::new(PortalConfig::default());
        assert!(matches!(client.close(), Err(PortalError::State(_))));
    }

    #[tokio::test]
    async fn test_request_on_closed_client_is_state_error() {
        let mut client = SchoolsClient::new(PortalConfig::default());
        client.open().unwrap();
        client.close().unwrap();
        let err = client.get_announcements().await.unwrap_err();
        assert!(matches!(err, PortalError::State(_)));
        assert!(matches!(client.discover_endpoints().await, Err(PortalError::State(_))));
        assert!(client.search_schools("minsk").await.is_empty());
    }

    #[tokio::test]
    async fn test_authenticate_before_open_wraps_state_error() {
        let client = SchoolsClient::new(PortalConfig::default());
        let err = client.authenticate("u", "p").await.unwrap_err();
        assert!(matches!(err, PortalError::Authentication(_)));
        assert!(matches!(err.cause(), PortalError::State(_)));
    }

    #[tokio::test]
    async fn test_scoped_propagates_operation_error() {
        let result: PortalResult<()> = SchoolsClient::scoped(PortalConfig::default(), |client| {
            Box::pin(async move {
                assert!(client.is_open());
                Err(PortalError::Config("boom".to_string()))
            })
        })
        .await;
        assert!(matches!(result, Err(PortalError::Config(_))));
    }

    #[tokio::test]
    async fn test_client_is_closed_after_failed_operation() {
        let mut client = SchoolsClient::new(PortalConfig::default());
        client.open().unwrap();
        let result: PortalResult<()> = client
            .run_then_close(|c| {
                Box::pin(async move {
                    assert!(c.is_open());
                    Err(PortalError::Config("boom".to_string()))
                })
            })
            .await;

        assert!(matches!(result, Err(PortalError::Config(_))));
        assert!(!client.is_open());
        assert!(matches!(client.close(), Err(PortalError::State(_))));
        assert!(matches!(client.get_user_info().await, Err(PortalError::State(_))));
    }

    #[tokio::test]
    async fn test_client_is_closed_after_successful_operation() {
        let mut client = SchoolsClient::new(PortalConfig::default());
        client.open().unwrap();
        let value = client
            .run_then_close(|c| Box::pin(async move { Ok(c.is_open()) }))
            .await
            .unwrap();

        assert!(value);
        assert!(!client.is_open());
    }

    #[test]
    fn test_date_param_format() {
        let date = NaiveDate::from_ymd_opt(2024, 9, 2).map(format_date);
        assert_eq!(date.as_deref(), Some("2024-09-02"));
        assert_eq!(date_param(date.as_deref()), vec![("date", "2024-09-02")]);
        assert!(date_param(None).is_empty());
    }
}
