use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;

static SEL_LINKS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Collect detail-page links from a list page: anchors whose href contains
/// the configured marker, absolutized against the site base URL and
/// deduplicated in document order.
pub fn extract_detail_links(html: &str, base_url: &str, marker: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for a in doc.select(&SEL_LINKS) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        if !href.contains(marker) {
            continue;
        }
        let url = if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else if href.starts_with('/') {
            format!("{}{}", base_url.trim_end_matches('/'), href)
        } else {
            continue;
        };
        if seen.insert(url.clone()) {
            links.push(url);
        }
    }

    links
}
