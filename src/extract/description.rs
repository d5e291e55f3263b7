use anyhow::anyhow;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::config::{ExtractionConfig, SelectorConfig};
use crate::extract::price::element_text;
use crate::extract::text::normalize_ws;

static RE_PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\+49|\b0)[\d\s\-/()]{6,}").unwrap());
static RE_EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

static SEL_CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p, li, tr, dt").unwrap());
static SEL_CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());
static SEL_HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p.h4, h1, h2, h3, h4").unwrap());

/// Harvests the free-text description from the tabbed exposé widget.
///
/// Resolution order: the first tab panel, then whichever panel is marked
/// active, then any content box whose heading matches a description alias.
/// Lines are filtered against boilerplate markers and contact data, then
/// deduplicated and capped.
pub struct DescriptionExtractor {
    scope_selectors: Vec<Selector>,
    first_tab_panel: Selector,
    active_tab_panel: Selector,
    box_selectors: Vec<Selector>,
    aliases: Vec<String>,
    stop_phrases: Vec<String>,
    max_chars: usize,
}

impl DescriptionExtractor {
    pub fn new(selectors: &SelectorConfig, extraction: &ExtractionConfig) -> anyhow::Result<Self> {
        Ok(Self {
            scope_selectors: parse_selectors(&selectors.expose_scopes)?,
            first_tab_panel: parse_selector(&selectors.first_tab_panel)?,
            active_tab_panel: parse_selector(&selectors.active_tab_panel)?,
            box_selectors: parse_selectors(&selectors.description_boxes)?,
            aliases: extraction
                .description_aliases
                .iter()
                .map(|a| a.to_lowercase())
                .collect(),
            stop_phrases: extraction
                .stop_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            max_chars: extraction.description_max_chars,
        })
    }

    pub fn extract(&self, doc: &Html) -> String {
        let scope = self.scope(doc);
        let lines = match self.panel(scope) {
            Some(panel) => self.collect_lines(panel),
            None => self.alias_box_lines(scope),
        };
        let cleaned = self.clean_lines(lines);
        truncate_chars(&cleaned.join("\n"), self.max_chars)
    }

    /// Convenience for framed documents fetched separately.
    pub fn extract_from_html(&self, html: &str) -> String {
        self.extract(&Html::parse_document(html))
    }

    fn scope<'a>(&self, doc: &'a Html) -> ElementRef<'a> {
        self.scope_selectors
            .iter()
            .find_map(|sel| doc.select(sel).next())
            .unwrap_or_else(|| doc.root_element())
    }

    fn panel<'a>(&self, scope: ElementRef<'a>) -> Option<ElementRef<'a>> {
        scope
            .select(&self.first_tab_panel)
            .next()
            .or_else(|| scope.select(&self.active_tab_panel).next())
    }

    /// Without a tab panel, fall back to content boxes whose heading matches
    /// a description alias.
    fn alias_box_lines(&self, scope: ElementRef) -> Vec<String> {
        for selector in &self.box_selectors {
            for content_box in scope.select(selector) {
                let heading = content_box
                    .select(&SEL_HEADING)
                    .next()
                    .map(|h| element_text(h).to_lowercase())
                    .unwrap_or_default();
                if self.aliases.iter().any(|alias| heading.contains(alias)) {
                    return self.collect_lines(content_box);
                }
            }
        }
        Vec::new()
    }

    /// Flatten a panel into lines: paragraphs as-is (minus the box heading),
    /// list items as bullets, table rows and definition pairs as
    /// `label: value`.
    fn collect_lines(&self, panel: ElementRef) -> Vec<String> {
        let mut boxes: Vec<ElementRef> = Vec::new();
        for selector in &self.box_selectors {
            boxes.extend(panel.select(selector));
            if !boxes.is_empty() {
                break;
            }
        }
        if boxes.is_empty() {
            boxes.push(panel);
        }

        let mut lines = Vec::new();
        for content_box in boxes {
            for element in content_box.select(&SEL_CONTENT) {
                match element.value().name() {
                    "p" => {
                        if is_heading_paragraph(element) {
                            continue;
                        }
                        lines.push(element_text(element));
                    }
                    "li" => lines.push(format!("• {}", element_text(element))),
                    "tr" => {
                        let cells: Vec<String> = element
                            .select(&SEL_CELL)
                            .map(element_text)
                            .filter(|c| !c.is_empty())
                            .collect();
                        if !cells.is_empty() {
                            lines.push(cells.join(": "));
                        }
                    }
                    "dt" => {
                        let label = element_text(element);
                        let value = element
                            .next_siblings()
                            .find_map(ElementRef::wrap)
                            .filter(|e| e.value().name() == "dd")
                            .map(element_text)
                            .unwrap_or_default();
                        lines.push(if value.is_empty() {
                            label
                        } else {
                            format!("{}: {}", label, value)
                        });
                    }
                    _ => {}
                }
            }
        }
        lines
    }

    /// Drop empties, boilerplate and contact lines, then deduplicate while
    /// preserving first-seen order.
    fn clean_lines(&self, lines: Vec<String>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut cleaned = Vec::new();
        for line in lines {
            let line = normalize_ws(&line);
            if line.is_empty() || line == "•" {
                continue;
            }
            let lower = line.to_lowercase();
            if self.stop_phrases.iter().any(|p| lower.contains(p)) {
                continue;
            }
            if RE_PHONE.is_match(&line) || RE_EMAIL.is_match(&line) {
                continue;
            }
            if seen.insert(line.clone()) {
                cleaned.push(line);
            }
        }
        cleaned
    }
}

/// The box heading is rendered as a styled paragraph; skip it so the heading
/// text does not lead the description.
fn is_heading_paragraph(p: ElementRef) -> bool {
    p.value()
        .attr("class")
        .map(|classes| classes.split_whitespace().any(|c| c == "h4"))
        .unwrap_or(false)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn parse_selector(raw: &str) -> anyhow::Result<Selector> {
    Selector::parse(raw).map_err(|e| anyhow!("invalid selector '{}': {}", raw, e))
}

fn parse_selectors(raw: &[String]) -> anyhow::Result<Vec<Selector>> {
    raw.iter().map(|s| parse_selector(s)).collect()
}

/// A page that carries the exposé scope but a near-empty description panel
/// was served without client-side rendering.
pub fn seems_unrendered(doc: &Html, selectors: &SelectorConfig) -> bool {
    let scopes = match parse_selectors(&selectors.expose_scopes) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let Some(scope) = scopes.iter().find_map(|sel| doc.select(sel).next()) else {
        return false;
    };

    for raw in [&selectors.first_tab_panel, &selectors.active_tab_panel] {
        if let Ok(sel) = parse_selector(raw) {
            if let Some(panel) = scope.select(&sel).next() {
                return element_text(panel).chars().count() <= 50;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> DescriptionExtractor {
        DescriptionExtractor::new(&SelectorConfig::default(), &ExtractionConfig::default())
            .unwrap()
    }

    fn expose(inner: &str) -> Html {
        Html::parse_document(&format!(
            r#"<div class="v-expose">
                 <div class="v-tabs-items"><div class="v-window__container">
                   <div id="tab-0">{inner}</div>
                 </div></div>
               </div>"#
        ))
    }

    #[test]
    fn test_extracts_paragraphs_skipping_box_heading() {
        let doc = expose(
            r#"<div class="v-card"><div class="v-card__text">
                 <p class="h4">Beschreibung</p>
                 <p>Helle Wohnung in zentraler Lage.</p>
                 <p>Balkon mit Südausrichtung.</p>
               </div></div>"#,
        );
        let text = extractor().extract(&doc);
        assert_eq!(
            text,
            "Helle Wohnung in zentraler Lage.\nBalkon mit Südausrichtung."
        );
    }

    #[test]
    fn test_list_items_and_definition_pairs() {
        let doc = expose(
            r#"<div class="v-card__text">
                 <ul><li>3 Zimmer</li><li>Tiefgarage</li></ul>
                 <dl><dt>Baujahr</dt><dd>1998</dd></dl>
               </div>"#,
        );
        let text = extractor().extract(&doc);
        assert_eq!(text, "• 3 Zimmer\n• Tiefgarage\nBaujahr: 1998");
    }

    #[test]
    fn test_boilerplate_and_contact_lines_removed() {
        let doc = expose(
            r#"<div class="v-card__text">
                 <p>Gepflegtes Einfamilienhaus.</p>
                 <p>Ihre Anfrage senden Sie uns gerne.</p>
                 <p>Telefon: 0611 123456</p>
                 <p>info@example.de</p>
               </div>"#,
        );
        let text = extractor().extract(&doc);
        assert_eq!(text, "Gepflegtes Einfamilienhaus.");
    }

    #[test]
    fn test_duplicate_lines_collapsed_in_order() {
        let doc = expose(
            r#"<div class="v-card__text">
                 <p>Erster Absatz.</p>
                 <p>Zweiter Absatz.</p>
                 <p>Erster Absatz.</p>
               </div>"#,
        );
        let text = extractor().extract(&doc);
        assert_eq!(text, "Erster Absatz.\nZweiter Absatz.");
    }

    #[test]
    fn test_alias_box_fallback_without_panel() {
        let html = r#"
            <div class="v-expose">
              <div class="v-card"><div class="v-card__text">
                <p class="h4">Beschreibung</p>
                <p>Direkt vom Eigentümer.</p>
              </div></div>
            </div>"#;
        let doc = Html::parse_document(html);
        let text = extractor().extract(&doc);
        assert_eq!(text, "Direkt vom Eigentümer.");
    }

    #[test]
    fn test_output_capped_at_max_chars() {
        let mut cfg = ExtractionConfig::default();
        cfg.description_max_chars = 20;
        let ex = DescriptionExtractor::new(&SelectorConfig::default(), &cfg).unwrap();
        let doc = expose(
            r#"<div class="v-card__text"><p>Eine sehr lange Beschreibung die gekappt werden muss.</p></div>"#,
        );
        let text = ex.extract(&doc);
        assert_eq!(text.chars().count(), 20);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let doc = expose(
            r#"<div class="v-card__text">
                 <p>Erster Absatz.</p>
                 <ul><li>Balkon</li></ul>
               </div>"#,
        );
        let ex = extractor();
        let first = ex.extract(&doc);
        assert_eq!(ex.extract(&doc), first);
        assert_eq!(ex.extract_from_html(&doc.html()), first);
    }

    #[test]
    fn test_missing_widget_yields_empty() {
        let doc = Html::parse_document("<html><body><p>0611 987654</p></body></html>");
        assert_eq!(extractor().extract(&doc), "");
    }

    #[test]
    fn test_seems_unrendered_detection() {
        let selectors = SelectorConfig::default();

        let empty = expose(r#"<div class="v-card__text"></div>"#);
        assert!(seems_unrendered(&empty, &selectors));

        let filled = expose(
            r#"<div class="v-card__text"><p>Großzügige Maisonette mit Blick über die Dächer der Stadt.</p></div>"#,
        );
        assert!(!seems_unrendered(&filled, &selectors));

        let no_widget = Html::parse_document("<html><body><p>Startseite</p></body></html>");
        assert!(!seems_unrendered(&no_widget, &selectors));
    }
}
