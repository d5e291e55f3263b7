use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::extract::text::{
    clean_price, format_price_display, normalize_number_string, normalize_ws, RE_EUR_ANY,
    RE_EUR_CURRENCY, RE_PRICE_LINE,
};
use crate::models::PriceValue;

static RE_OBJECT_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)objekt[-\s]?nr").unwrap());

static SEL_ANY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("*").unwrap());
static SEL_TAB_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r##"a[href^="#"], a[aria-controls]"##).unwrap());
static SEL_TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static SEL_TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static SEL_CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());
static SEL_DT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("dt").unwrap());
static SEL_LI: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li").unwrap());
static SEL_JSON_LD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// Best-effort price extraction over a parsed document and its flattened
/// text. Strategies run in a fixed order from most to least precisely scoped;
/// the first hit wins. No hit anywhere means the listing has no price, which
/// is reported as `None`, never as zero.
pub struct PriceParser {
    keywords: Vec<String>,
    panel_aliases: Vec<String>,
    stop_phrases: Vec<String>,
    min_plausible: f64,
}

impl PriceParser {
    pub fn new(cfg: &ExtractionConfig) -> Self {
        Self {
            keywords: cfg.price_keywords.clone(),
            panel_aliases: cfg.object_panel_aliases.clone(),
            stop_phrases: cfg.stop_phrases.clone(),
            min_plausible: cfg.min_plausible_price,
        }
    }

    pub fn extract(&self, doc: &Html, page_text: &str) -> Option<PriceValue> {
        let strategies: [(&str, &dyn Fn() -> Option<PriceValue>); 7] = [
            ("object-number proximity", &|| self.near_object_number(doc)),
            ("labeled panel", &|| self.labeled_panel(doc)),
            ("embedded offer metadata", &|| self.json_ld(doc)),
            ("line scan", &|| self.line_scan(page_text)),
            ("document scan", &|| self.scan_container(doc.root_element())),
            ("top of page", &|| self.top_of_page(page_text)),
            ("global maximum", &|| self.global_max(page_text)),
        ];

        for (name, strategy) in strategies {
            if let Some(price) = strategy() {
                debug!("price {} found via {}", price.display, name);
                return Some(price);
            }
        }
        None
    }

    /// Strategy 1: a currency-shaped number near the object-number label,
    /// checking the enclosing block and then its preceding sibling.
    fn near_object_number(&self, doc: &Html) -> Option<PriceValue> {
        for element in doc.select(&SEL_ANY) {
            if !RE_OBJECT_LABEL.is_match(&direct_text(element)) {
                continue;
            }

            let mut container = element;
            for _ in 0..3 {
                match container.parent().and_then(ElementRef::wrap) {
                    Some(parent) => container = parent,
                    None => break,
                }
            }

            // Bare numbers near the label are usually not prices, so a
            // currency marker is required here.
            let context = element_text(container);
            if let Some(m) = RE_EUR_CURRENCY.find(&context) {
                if let Some(price) = clean_price(m.as_str()) {
                    return Some(price);
                }
            }
            if let Some(prev) = container.prev_siblings().find_map(ElementRef::wrap) {
                let text = element_text(prev);
                if let Some(m) = RE_EUR_CURRENCY.find(&text) {
                    if let Some(price) = clean_price(m.as_str()) {
                        return Some(price);
                    }
                }
            }
        }
        None
    }

    /// Strategy 2: the tab panel labeled "Objektangaben" (or an alias),
    /// scanned row by row for a price-keyword label cell.
    fn labeled_panel(&self, doc: &Html) -> Option<PriceValue> {
        let panel = self
            .find_tab_panels(doc)
            .into_iter()
            .find(|(label, _)| {
                let label = label.to_lowercase();
                self.panel_aliases.iter().any(|alias| label.contains(alias))
            })
            .map(|(_, panel)| panel)
            .or_else(|| {
                // Static fallback layout: any table mentioning the buy-price keyword.
                doc.select(&SEL_TABLE)
                    .find(|table| element_text(*table).to_lowercase().contains("kaufpreis"))
            })?;

        self.scan_container(panel)
    }

    /// Strategies 2 and 5 share the row scan: table rows, definition pairs
    /// and list items whose label side carries a price keyword.
    fn scan_container(&self, root: ElementRef) -> Option<PriceValue> {
        for dt in root.select(&SEL_DT) {
            let label = element_text(dt).to_lowercase();
            if !self.matches_keyword(&label) {
                continue;
            }
            let dd = dt
                .next_siblings()
                .find_map(ElementRef::wrap)
                .filter(|e| e.value().name() == "dd");
            if let Some(price) = dd.and_then(|dd| clean_price(&element_text(dd))) {
                return Some(price);
            }
        }

        for row in root.select(&SEL_TR) {
            let cells: Vec<String> = row.select(&SEL_CELL).map(element_text).collect();
            if cells.len() >= 2 && self.matches_keyword(&cells[0].to_lowercase()) {
                if let Some(price) = clean_price(&cells[1]) {
                    return Some(price);
                }
            }
        }

        for li in root.select(&SEL_LI) {
            let text = element_text(li);
            if let Some(caps) = RE_PRICE_LINE.captures(&text) {
                if let Some(price) = clean_price(&format!("{} €", &caps[2])) {
                    return Some(price);
                }
            }
        }

        None
    }

    /// Strategy 3: schema.org offer metadata embedded as JSON-LD. Malformed
    /// scripts are skipped silently; the cascade continues.
    fn json_ld(&self, doc: &Html) -> Option<PriceValue> {
        for script in doc.select(&SEL_JSON_LD) {
            let raw = script.text().collect::<String>();
            let data: Value = match serde_json::from_str(raw.trim()) {
                Ok(data) => data,
                Err(_) => continue,
            };

            let nodes: Vec<&Value> = match &data {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };

            for node in nodes {
                let Some(obj) = node.as_object() else { continue };

                let offer = match obj.get("@type").and_then(Value::as_str) {
                    Some("Offer") | Some("AggregateOffer") => Some(node),
                    _ => obj.get("offers"),
                };
                if let Some(offer) = offer.and_then(Value::as_object) {
                    for key in ["price", "lowPrice", "highPrice"] {
                        if let Some(amount) = offer.get(key).and_then(json_number) {
                            return Some(price_from_amount(amount));
                        }
                    }
                }
                for key in ["price", "lowPrice", "highPrice"] {
                    if let Some(amount) = obj.get(key).and_then(json_number) {
                        return Some(price_from_amount(amount));
                    }
                }
            }
        }
        None
    }

    /// Strategy 4: `<keyword>: <number> €` anywhere in the flattened text.
    fn line_scan(&self, page_text: &str) -> Option<PriceValue> {
        for line in page_text.lines() {
            if let Some(caps) = RE_PRICE_LINE.captures(line.trim()) {
                if let Some(price) = clean_price(&format!("{} €", &caps[2])) {
                    return Some(price);
                }
            }
        }
        None
    }

    /// Strategy 6: truncate the text at the first boilerplate marker and take
    /// the first plausibly-large currency number from the remaining head.
    fn top_of_page(&self, page_text: &str) -> Option<PriceValue> {
        let lower = page_text.to_lowercase();
        let cut = self
            .stop_phrases
            .iter()
            .filter_map(|phrase| lower.find(&phrase.to_lowercase()))
            .min()
            .unwrap_or(page_text.len());
        // Index comes from the lowercased copy; fall back to the full text
        // if it does not land on a boundary in the original.
        let head = page_text.get(..cut).unwrap_or(page_text);

        for m in RE_EUR_ANY.find_iter(head) {
            if let Some(price) = clean_price(m.as_str()) {
                if price.amount >= self.min_plausible {
                    return Some(price);
                }
            }
        }
        None
    }

    /// Strategy 7: last resort, the numerically largest currency-shaped
    /// number anywhere in the document text.
    fn global_max(&self, page_text: &str) -> Option<PriceValue> {
        RE_EUR_ANY
            .find_iter(page_text)
            .filter_map(|m| clean_price(m.as_str()))
            .max_by(|a, b| a.amount.total_cmp(&b.amount))
    }

    fn matches_keyword(&self, label: &str) -> bool {
        self.keywords.iter().any(|k| label.contains(k))
    }

    /// Tab navigation links paired with the panels they control, resolved via
    /// `href="#id"` or `aria-controls`.
    fn find_tab_panels<'a>(&self, doc: &'a Html) -> Vec<(String, ElementRef<'a>)> {
        let mut pairs = Vec::new();
        for a in doc.select(&SEL_TAB_LINKS) {
            let label = normalize_ws(&element_text(a));
            if label.is_empty() {
                continue;
            }
            let target = a
                .value()
                .attr("aria-controls")
                .or_else(|| a.value().attr("href").and_then(|h| h.strip_prefix('#')));
            let Some(id) = target.filter(|id| !id.is_empty()) else {
                continue;
            };
            if let Ok(selector) = Selector::parse(&format!("[id=\"{}\"]", id)) {
                if let Some(panel) = doc.select(&selector).next() {
                    pairs.push((label, panel));
                }
            }
        }
        pairs
    }
}

fn price_from_amount(amount: f64) -> PriceValue {
    PriceValue {
        display: format_price_display(amount),
        amount,
    }
}

fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => normalize_number_string(s).parse().ok(),
        _ => None,
    }
}

/// Full subtree text of an element, whitespace-normalized.
pub fn element_text(element: ElementRef) -> String {
    normalize_ws(&element.text().collect::<Vec<_>>().join(" "))
}

/// Text carried directly by an element, excluding descendant elements.
fn direct_text(element: ElementRef) -> String {
    element
        .children()
        .filter_map(|node| node.value().as_text().map(|t| t.text.to_string()))
        .collect::<Vec<_>>()
        .join(" ")
}
