//! Endpoint discovery: which well-known paths answer, redirect, or fail.

use crate::config::PortalConfig;
use crate::session::HttpSession;
use crate::types::{EndpointProbe, EndpointReport, PortalResult};
use reqwest::header::{HeaderName, CONTENT_TYPE, LOCATION};

/// Statuses treated as redirects.
const REDIRECT_STATUSES: &[u16] = &[301, 302, 303, 307, 308];

/// Probe every configured path without following redirects.
///
/// Each path lands in exactly one partition. Per-path failures are recorded,
/// never raised; only a closed session fails the call.
pub async fn discover_endpoints(
    session: &HttpSession,
    config: &PortalConfig,
) -> PortalResult<EndpointReport> {
    let client = session.no_redirect_client()?;
    let mut report = EndpointReport::default();

    for endpoint in &config.probe_paths {
        let url = match config.resolve_endpoint(endpoint) {
            Ok(url) => url,
            Err(e) => {
                report.failing.push(failed(endpoint, e.to_string()));
                continue;
            }
        };

        match client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let header = |name: HeaderName| {
                    resp.headers()
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                };
                let mut probe = EndpointProbe {
                    endpoint: endpoint.clone(),
                    status: Some(status),
                    content_type: None,
                    location: None,
                    error: None,
                };
                if status == 200 {
                    probe.content_type = Some(header(CONTENT_TYPE).unwrap_or_default());
                    report.working.push(probe);
                } else if REDIRECT_STATUSES.contains(&status) {
                    probe.location = Some(header(LOCATION).unwrap_or_default());
                    report.redirects.push(probe);
                } else {
                    report.failing.push(probe);
                }
            }
            Err(e) => {
                tracing::debug!(endpoint = %endpoint, "probe failed: {e}");
                report.failing.push(failed(endpoint, e.to_string()));
            }
        }
    }

    tracing::info!(
        working = report.working.len(),
        redirects = report.redirects.len(),
        failing = report.failing.len(),
        "endpoint discovery finished"
    );

    Ok(report)
}

fn failed(endpoint: &str, error: String) -> EndpointProbe {
    EndpointProbe {
        endpoint: endpoint.to_string(),
        status: None,
        content_type: None,
        location: None,
        error: Some(error),
    }
}
