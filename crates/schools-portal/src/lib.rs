//! schools-portal: scraping client for the schools.by school portal.
//!
//! The site has no API; everything here works against ordinary HTML pages.
//! [`SchoolsClient`] is the entry point: it logs in through the site's login
//! form, fetches pupil data pages, probes well-known paths, and harvests
//! links to individual school sub-sites.

pub mod authenticator;
pub mod client;
pub mod config;
pub mod form_inspector;
pub mod harvester;
pub mod normalizer;
pub mod prober;
pub mod session;
pub mod types;

pub use client::SchoolsClient;
pub use config::{HarvestRules, PortalConfig};
pub use session::HttpSession;
pub use types::{
    AuthOutcome, EndpointProbe, EndpointReport, FormField, FormFieldError, FormSnapshot,
    GradePeriod, LinkSource, PortalError, PortalResult, RawMarkup, ResponseEnvelope, SchoolLink,
};
