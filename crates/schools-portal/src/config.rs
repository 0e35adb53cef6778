//! Client configuration: target origin, timeout, header profile, and
//! harvesting rules.

use crate::types::{PortalError, PortalResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default portal origin.
pub const DEFAULT_BASE_URL: &str = "https://schools.by";

/// Fixed per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment override for the base URL.
pub const BASE_URL_ENV: &str = "SCHOOLS_PORTAL_URL";

/// Environment override for the timeout, in whole seconds.
pub const TIMEOUT_ENV: &str = "SCHOOLS_PORTAL_TIMEOUT_SECS";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/120.0.0.0 Safari/537.36";

const ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8";

const ACCEPT_LANGUAGE: &str = "ru-RU,ru;q=0.9,en;q=0.8";

/// Paths checked by endpoint discovery.
pub const DEFAULT_PROBE_PATHS: &[&str] = &[
    "/",
    "/login",
    "/registration",
    "/help",
    "/about",
    "/capabilities",
    "/cost",
    "/contact",
    "/news",
    "/subdomains",
    "/api",
    "/mobile",
    "/app",
];

/// Rules deciding which anchors count as links to related sub-sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestRules {
    /// Substrings that mark an absolute sub-site href.
    pub subsite_markers: Vec<String>,
    /// Relative href prefixes that point at sub-site listings.
    pub relative_prefixes: Vec<String>,
    /// Page listing every sub-site.
    pub subdomains_path: String,
    /// Extra pages scanned by search after the main and listing pages.
    pub extra_search_pages: Vec<String>,
    /// Anchor text must be strictly longer than this (in characters).
    pub min_text_chars: usize,
    /// Maximum number of search results.
    pub max_results: usize,
}

impl Default for HarvestRules {
    fn default() -> Self {
        Self {
            subsite_markers: vec![".schools.by".to_string(), "schools.by/".to_string()],
            relative_prefixes: vec!["/subdomains".to_string()],
            subdomains_path: "/subdomains".to_string(),
            extra_search_pages: vec![
                "/capabilities".to_string(),
                "/help".to_string(),
                "/about".to_string(),
            ],
            min_text_chars: 3,
            max_results: 15,
        }
    }
}

/// Portal client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Origin every endpoint is resolved against.
    pub base_url: Url,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Path of the login page.
    pub login_path: String,
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    /// Paths checked by endpoint discovery.
    pub probe_paths: Vec<String>,
    pub harvest: HarvestRules,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            timeout: DEFAULT_TIMEOUT,
            login_path: "/login".to_string(),
            user_agent: USER_AGENT.to_string(),
            accept: ACCEPT.to_string(),
            accept_language: ACCEPT_LANGUAGE.to_string(),
            probe_paths: DEFAULT_PROBE_PATHS.iter().map(|p| p.to_string()).collect(),
            harvest: HarvestRules::default(),
        }
    }
}

impl PortalConfig {
    /// Configuration targeting `base_url` with everything else at defaults.
    pub fn new(base_url: &str) -> PortalResult<Self> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            ..Self::default()
        })
    }

    /// Resolve configuration: explicit values win over the environment,
    /// which wins over defaults.
    pub fn resolve(base_url: Option<&str>, timeout_secs: Option<u64>) -> PortalResult<Self> {
        Self::resolve_with(base_url, timeout_secs, |key| std::env::var(key).ok())
    }

    /// [`PortalConfig::resolve`] with an explicit variable lookup. A variable
    /// is only read and validated when no explicit value covers it.
    pub fn resolve_with(
        base_url: Option<&str>,
        timeout_secs: Option<u64>,
        env: impl Fn(&str) -> Option<String>,
    ) -> PortalResult<Self> {
        let mut config = Self::default();

        if let Some(url) = base_url.map(str::to_string).or_else(|| env(BASE_URL_ENV)) {
            config.base_url = parse_base_url(&url)?;
        }

        let timeout_secs = match timeout_secs {
            Some(secs) => Some(secs),
            None => env(TIMEOUT_ENV)
                .map(|raw| {
                    raw.trim().parse::<u64>().map_err(|_| {
                        PortalError::Config(format!(
                            "{TIMEOUT_ENV} is not a number of seconds: {raw}"
                        ))
                    })
                })
                .transpose()?,
        };
        if let Some(secs) = timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_probe_paths<S: Into<String>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        self.probe_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_harvest(mut self, harvest: HarvestRules) -> Self {
        self.harvest = harvest;
        self
    }

    /// Resolve an endpoint (relative or absolute) against the base URL.
    pub fn resolve_endpoint(&self, endpoint: &str) -> PortalResult<Url> {
        self.base_url
            .join(endpoint)
            .map_err(|e| PortalError::Config(format!("cannot resolve endpoint '{endpoint}': {e}")))
    }

    /// `scheme://host[:port]` of the base URL, as sent in `Origin`.
    pub fn origin(&self) -> String {
        self.base_url.origin().ascii_serialization()
    }
}

fn parse_base_url(raw: &str) -> PortalResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| PortalError::Config(format!("invalid base URL '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(PortalError::Config(format!(
            "base URL must be an http(s) origin: {raw}"
        )));
    }
    Ok(url)
}
