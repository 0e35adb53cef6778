//! Best-effort harvesting of links to related sub-sites.
//!
//! Pages are fetched with error responses allowed, and any page that fails
//! or yields no markup is skipped. Harvesting never fails the caller; it
//! returns whatever it collected.

use crate::config::{HarvestRules, PortalConfig};
use crate::normalizer;
use crate::session::HttpSession;
use crate::types::{LinkSource, ResponseEnvelope, SchoolLink};
use reqwest::Method;
use scraper::{Html, Selector};
use std::collections::HashSet;

/// Links listed on the sub-site index page, deduplicated by href and capped.
pub async fn get_subdomains_page(session: &HttpSession, config: &PortalConfig) -> Vec<SchoolLink> {
    let rules = &config.harvest;
    match fetch_markup(session, &rules.subdomains_path).await {
        Some(html) => dedupe(
            harvest_links(&html, rules, None, LinkSource::Subdomains),
            rules.max_results,
        ),
        None => Vec::new(),
    }
}

/// Sub-site links whose text contains `query` (case-insensitive), gathered
/// from the main page, the sub-site index, and a few auxiliary pages.
/// Deduplicated by href in first-seen order and capped.
pub async fn search_schools(
    session: &HttpSession,
    config: &PortalConfig,
    query: &str,
) -> Vec<SchoolLink> {
    let rules = &config.harvest;
    let mut sources: Vec<(String, LinkSource)> = vec![
        ("/".to_string(), LinkSource::MainPage),
        (rules.subdomains_path.clone(), LinkSource::Subdomains),
    ];
    sources.extend(
        rules
            .extra_search_pages
            .iter()
            .map(|page| (page.clone(), LinkSource::Page(page.clone()))),
    );

    let mut links = Vec::new();
    for (path, source) in sources {
        if let Some(html) = fetch_markup(session, &path).await {
            links.extend(harvest_links(&html, rules, Some(query), source));
        }
        if unique_count(&links) >= rules.max_results {
            break;
        }
    }

    let results = dedupe(links, rules.max_results);
    tracing::info!(query, found = results.len(), "school search finished");
    results
}

/// Anchors in `html` that point at a sub-site, have enough visible text, and
/// (when a query is given) mention the query.
pub fn harvest_links(
    html: &str,
    rules: &HarvestRules,
    query: Option<&str>,
    source: LinkSource,
) -> Vec<SchoolLink> {
    let document = Html::parse_document(html);
    let anchor_sel = Selector::parse("a[href]").expect("anchor selector is valid");
    let query = query.map(|q| q.trim().to_lowercase());

    document
        .select(&anchor_sel)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim();
            let text = a
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");

            if text.chars().count() <= rules.min_text_chars || !is_subsite_link(href, rules) {
                return None;
            }
            if let Some(q) = &query {
                if !text.to_lowercase().contains(q.as_str()) {
                    return None;
                }
            }

            Some(SchoolLink {
                name: text,
                url: href.to_string(),
                source: source.clone(),
            })
        })
        .collect()
}

/// Whether an href points at a related sub-site.
pub fn is_subsite_link(href: &str, rules: &HarvestRules) -> bool {
    rules.subsite_markers.iter().any(|m| href.contains(m.as_str()))
        || rules
            .relative_prefixes
            .iter()
            .any(|p| href.starts_with(p.as_str()))
}

/// Drop repeated hrefs, keeping the first occurrence, and cap the list.
pub fn dedupe(links: Vec<SchoolLink>, max: usize) -> Vec<SchoolLink> {
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|link| seen.insert(link.url.clone()))
        .take(max)
        .collect()
}

fn unique_count(links: &[SchoolLink]) -> usize {
    links
        .iter()
        .map(|l| l.url.as_str())
        .collect::<HashSet<_>>()
        .len()
}

async fn fetch_markup(session: &HttpSession, path: &str) -> Option<String> {
    match normalizer::request(session, Method::GET, path, true, &[]).await {
        Ok(ResponseEnvelope::Markup(raw)) => Some(raw.html),
        Ok(ResponseEnvelope::Structured { .. }) => {
            tracing::debug!(path, "page returned structured data, no links to harvest");
            None
        }
        Ok(ResponseEnvelope::Error { message, .. }) => {
            tracing::warn!(path, "skipping page: {message}");
            None
        }
        Err(e) => {
            tracing::warn!(path, "skipping page: {e}");
            None
        }
    }
}
