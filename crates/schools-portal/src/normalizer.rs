//! Response normalization: turn one HTTP exchange into a [`ResponseEnvelope`].
//!
//! JSON bodies are parsed directly. Anything else with a 200 status goes
//! through a best-effort scan of inline scripts for an assigned object literal
//! (`var config = {...};`); when nothing parses the body is returned as raw
//! markup. Non-200 statuses and transport failures either fail the call or,
//! when the caller allows error responses, come back as error envelopes.

use crate::session::HttpSession;
use crate::types::{PortalError, PortalResult, RawMarkup, ResponseEnvelope};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use scraper::{Html, Selector};
use serde_json::{Map, Value};

/// Perform one request through the session and normalize the response.
pub async fn request(
    session: &HttpSession,
    method: Method,
    endpoint: &str,
    allow_error_responses: bool,
    params: &[(&str, &str)],
) -> PortalResult<ResponseEnvelope> {
    let client = session.client()?;
    let url = session
        .base_url()
        .join(endpoint)
        .map_err(|e| PortalError::Config(format!("cannot resolve endpoint '{endpoint}': {e}")))?;

    let mut builder = client.request(method.clone(), url.clone());
    if !params.is_empty() {
        builder = builder.query(params);
    }

    let response = match builder.send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(%method, %url, "transport failure: {e}");
            if allow_error_responses {
                return Ok(ResponseEnvelope::Error {
                    message: e.to_string(),
                    recoverable: true,
                });
            }
            return Err(PortalError::transport(e));
        }
    };

    let status = response.status().as_u16();
    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) if allow_error_responses => {
            return Ok(ResponseEnvelope::Error {
                message: e.to_string(),
                recoverable: true,
            });
        }
        Err(e) => return Err(PortalError::transport(e)),
    };

    tracing::debug!(%method, url = %final_url, status, "portal response");

    normalize(status, &content_type, body, &final_url, allow_error_responses)
}

/// Classify a completed response.
pub fn normalize(
    status: u16,
    content_type: &str,
    body: String,
    final_url: &str,
    allow_error_responses: bool,
) -> PortalResult<ResponseEnvelope> {
    let content_type = content_type.to_ascii_lowercase();

    if status == 200 {
        if content_type.contains("application/json") {
            match serde_json::from_str::<Value>(&body) {
                Ok(data) => return Ok(ResponseEnvelope::Structured { data }),
                Err(e) => tracing::debug!("JSON content type with unparsable body: {e}"),
            }
        } else if let Some(data) = extract_embedded_json(&body) {
            return Ok(ResponseEnvelope::Structured {
                data: Value::Object(data),
            });
        }
        return Ok(ResponseEnvelope::Markup(RawMarkup {
            html: body,
            status,
            error: false,
            url: None,
        }));
    }

    if allow_error_responses {
        return Ok(ResponseEnvelope::Markup(RawMarkup {
            html: body,
            status,
            error: true,
            url: Some(final_url.to_string()),
        }));
    }

    // Diagnostic pages from server errors are handed back for inspection.
    if status == 500 && content_type.contains("html") {
        return Ok(ResponseEnvelope::Markup(RawMarkup {
            html: body,
            status,
            error: true,
            url: None,
        }));
    }

    Err(PortalError::status(status, &body))
}

/// Look for a JSON object assigned in an inline script.
///
/// Only scripts that look like assignments (`window.` or `var `) are scanned.
/// Within them, a line qualifies when it mentions `data` or `config` and has a
/// `{` before its last `}`; the text between those braces is parsed as a
/// JSON object. The first line that parses wins, and an empty object there
/// means the page has no data. `None` means the page should be treated as
/// plain markup.
pub fn extract_embedded_json(html: &str) -> Option<Map<String, Value>> {
    let document = Html::parse_document(html);
    let script_sel = Selector::parse("script").expect("script selector is valid");

    for script in document.select(&script_sel) {
        let content: String = script.text().collect();
        let content = content.trim();
        if content.is_empty() || !(content.contains("window.") || content.contains("var ")) {
            continue;
        }

        for line in content.lines() {
            let lower = line.to_lowercase();
            if !(lower.contains("data") || lower.contains("config")) {
                continue;
            }
            let (Some(start), Some(end)) = (line.find('{'), line.rfind('}')) else {
                continue;
            };
            if start >= end {
                continue;
            }
            if let Ok(map) = serde_json::from_str::<Map<String, Value>>(&line[start..=end]) {
                return (!map.is_empty()).then_some(map);
            }
        }
    }

    None
}
