//! HTTP session: one cookie-bearing transport bound to the portal origin.
//!
//! A session owns two reqwest clients that share a single cookie jar. The
//! default client follows redirects; the non-redirecting one is used where a
//! 30x response must be observed rather than followed (login submission and
//! endpoint probing). Closing, or dropping, the session releases both.

use crate::config::PortalConfig;
use crate::types::{PortalError, PortalResult};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

/// Maximum redirects followed by the default client.
const MAX_REDIRECTS: usize = 10;

struct Transport {
    client: reqwest::Client,
    no_redirect: reqwest::Client,
}

/// A live HTTP conversation with the portal.
pub struct HttpSession {
    base_url: Url,
    jar: Arc<Jar>,
    transport: Option<Transport>,
}

impl HttpSession {
    /// Open a session with the fixed browser header profile.
    pub fn open(config: &PortalConfig) -> PortalResult<Self> {
        let headers = header_profile(config)?;
        let jar = Arc::new(Jar::default());

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .default_headers(headers.clone())
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| PortalError::Config(format!("cannot build HTTP client: {e}")))?;

        let no_redirect = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .default_headers(headers)
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| PortalError::Config(format!("cannot build HTTP client: {e}")))?;

        tracing::debug!(base = %config.base_url, "opened portal session");

        Ok(Self {
            base_url: config.base_url.clone(),
            jar,
            transport: Some(Transport {
                client,
                no_redirect,
            }),
        })
    }

    /// Release the transport. Closing twice is a state error.
    pub fn close(&mut self) -> PortalResult<()> {
        match self.transport.take() {
            Some(_) => {
                tracing::debug!(base = %self.base_url, "closed portal session");
                Ok(())
            }
            None => Err(PortalError::State("session is already closed".to_string())),
        }
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Redirect-following client.
    pub fn client(&self) -> PortalResult<&reqwest::Client> {
        self.transport
            .as_ref()
            .map(|t| &t.client)
            .ok_or_else(closed)
    }

    /// Client that returns 30x responses as-is.
    pub fn no_redirect_client(&self) -> PortalResult<&reqwest::Client> {
        self.transport
            .as_ref()
            .map(|t| &t.no_redirect)
            .ok_or_else(closed)
    }

    /// Cookies the jar would send to the base origin.
    pub fn cookie_snapshot(&self) -> BTreeMap<String, String> {
        self.jar
            .cookies(&self.base_url)
            .and_then(|v| v.to_str().ok().map(parse_cookie_header))
            .unwrap_or_default()
    }
}

fn closed() -> PortalError {
    PortalError::State("session is not open".to_string())
}

/// Desktop-browser header profile sent with every request.
fn header_profile(config: &PortalConfig) -> PortalResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    let pairs: [(HeaderName, &str); 10] = [
        (header::USER_AGENT, config.user_agent.as_str()),
        (header::ACCEPT, config.accept.as_str()),
        (header::ACCEPT_LANGUAGE, config.accept_language.as_str()),
        (header::DNT, "1"),
        (header::UPGRADE_INSECURE_REQUESTS, "1"),
        (HeaderName::from_static("sec-fetch-dest"), "document"),
        (HeaderName::from_static("sec-fetch-mode"), "navigate"),
        (HeaderName::from_static("sec-fetch-site"), "none"),
        (HeaderName::from_static("sec-fetch-user"), "?1"),
        (header::CACHE_CONTROL, "max-age=0"),
    ];
    for (name, value) in pairs {
        let value = HeaderValue::from_str(value)
            .map_err(|e| PortalError::Config(format!("invalid {name} header: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Split a `Cookie` header (`a=1; b=2`) into name/value pairs.
fn parse_cookie_header(raw: &str) -> BTreeMap<String, String> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}
