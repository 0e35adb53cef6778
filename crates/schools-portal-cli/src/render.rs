//! Plain-text rendering of portal results for chat replies and the terminal.

use schools_portal::{
    AuthOutcome, EndpointProbe, EndpointReport, FormSnapshot, LinkSource, RawMarkup,
    ResponseEnvelope, SchoolLink,
};
use scraper::{Html, Selector};

/// Render an envelope under a heading.
///
/// Structured data is pretty-printed; markup is summarized by status, page
/// title and size, since raw pages are too large for a chat message.
pub fn envelope(heading: &str, envelope: &ResponseEnvelope) -> String {
    match envelope {
        ResponseEnvelope::Structured { data } => {
            let body = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
            format!("{heading}\n\n{body}")
        }
        ResponseEnvelope::Markup(raw) => format!("{heading}\n\n{}", markup_summary(raw)),
        ResponseEnvelope::Error { message, .. } => {
            format!("{heading}\n\n❌ Ошибка запроса: {message}")
        }
    }
}

/// Status, title and size of a raw page.
pub fn markup_summary(raw: &RawMarkup) -> String {
    let mut lines = vec![
        format!(
            "Статус: {}{}",
            raw.status,
            if raw.error { " (ошибка)" } else { "" }
        ),
        format!(
            "Заголовок: {}",
            page_title(&raw.html).unwrap_or_else(|| "без заголовка".to_string())
        ),
        format!("Размер: {} байт", raw.html.len()),
    ];
    if let Some(url) = &raw.url {
        lines.push(format!("Адрес: {url}"));
    }
    lines.join("\n")
}

/// Text of the page's `<title>`, whitespace-collapsed.
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let sel = Selector::parse("title").expect("title selector is valid");
    let title = document
        .select(&sel)
        .next()?
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}

pub fn auth_outcome(username: &str, outcome: &AuthOutcome) -> String {
    match outcome {
        AuthOutcome::Success {
            message, redirect, ..
        } => {
            let mut text = format!("✅ {message}\nПользователь: {username}");
            if let Some(target) = redirect {
                text.push_str(&format!("\nПереадресация: {target}"));
            }
            text
        }
        AuthOutcome::Failure { reason, .. } => format!(
            "❌ Ошибка входа: {reason}\n\nПроверьте правильность логина и пароля.\nПопробуйте снова: /login"
        ),
    }
}

fn source_label(source: &LinkSource) -> String {
    match source {
        LinkSource::MainPage => "main_page".to_string(),
        LinkSource::Subdomains => "subdomains".to_string(),
        LinkSource::Page(page) => format!("from:{page}"),
    }
}

pub fn links(heading: &str, links: &[SchoolLink]) -> String {
    if links.is_empty() {
        return format!("{heading}\n\nНичего не найдено.");
    }
    let body: Vec<String> = links
        .iter()
        .enumerate()
        .map(|(i, link)| {
            format!(
                "{}. {}\n   {} [{}]",
                i + 1,
                link.name,
                link.url,
                source_label(&link.source)
            )
        })
        .collect();
    format!("{heading}\n\n{}", body.join("\n"))
}

fn probe_line(probe: &EndpointProbe) -> String {
    let status = probe
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "---".to_string());
    let detail = probe
        .location
        .as_deref()
        .map(|l| format!("-> {l}"))
        .or_else(|| probe.content_type.clone())
        .or_else(|| probe.error.clone())
        .unwrap_or_default();
    format!("  {status} {:<16} {detail}", probe.endpoint)
}

pub fn endpoint_report(report: &EndpointReport) -> String {
    let mut out = Vec::new();
    for (title, probes) in [
        ("Working", &report.working),
        ("Redirects", &report.redirects),
        ("Failing", &report.failing),
    ] {
        out.push(format!("{title} ({}):", probes.len()));
        out.extend(probes.iter().map(probe_line));
    }
    out.join("\n")
}

pub fn form_snapshot(form: &FormSnapshot) -> String {
    let action = if form.action.is_empty() {
        "(none)"
    } else {
        form.action.as_str()
    };
    let mut out = vec![format!("{} {action}", form.method)];
    for field in &form.fields {
        out.push(format!(
            "  {:<24} {:<10}{}{}",
            if field.name.is_empty() { "(unnamed)" } else { field.name.as_str() },
            field.field_type,
            if field.required { " required" } else { "" },
            if field.is_hidden() && !field.value.is_empty() {
                format!(" = {}", field.value)
            } else {
                String::new()
            }
        ));
    }
    out.join("\n")
}
