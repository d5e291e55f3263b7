use anyhow::Result;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::config::SiteConfig;
use crate::extract::classifier::classify_category;
use crate::extract::description::DescriptionExtractor;
use crate::extract::price::{element_text, PriceParser};
use crate::extract::text::normalize_ws;
use crate::fetcher::PageFetcher;
use crate::models::{Category, PriceValue, ScrapedListing};

static RE_OBJEKTNR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)objekt[-\s]?nr\.?\s*:?\s*([A-Za-z0-9\-_/]+)").unwrap());
static RE_PLZ_ORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{5})\s+([A-Za-zÄÖÜäöüß][A-Za-zÄÖÜäöüß\- ]+)").unwrap()
});

static SEL_H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static SEL_TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static SEL_IMAGE_LINKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"a[href*="immo."], a[href*="screenwork"]"#).unwrap()
});
static SEL_IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img[src]").unwrap());
static SEL_LINKS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Separators that end the place name in an address line.
const PLACE_SEPARATORS: [char; 9] = ['|', ',', '•', '·', '–', '—', '/', '(', ')'];

/// Everything a detail page yields before the network fallbacks run.
struct ParsedPage {
    title: String,
    listing_id: String,
    location: String,
    image_url: String,
    price: Option<PriceValue>,
    category: Category,
    description: String,
    expose_links: Vec<String>,
}

/// Turns one fetched detail page into a `ScrapedListing`, filling the
/// description from captured iframes or linked external exposés when the
/// page itself carries none.
pub struct DetailParser {
    price: PriceParser,
    description: DescriptionExtractor,
    base_url: String,
}

impl DetailParser {
    pub fn new(config: &SiteConfig) -> Result<Self> {
        Ok(Self {
            price: PriceParser::new(&config.extraction),
            description: DescriptionExtractor::new(&config.selectors, &config.extraction)?,
            base_url: config.site.base_url.clone(),
        })
    }

    pub async fn parse_detail(
        &self,
        fetcher: &mut PageFetcher,
        url: &str,
    ) -> Result<ScrapedListing> {
        let html = fetcher.fetch(url).await?;
        let mut page = self.parse_page(&html);

        if page.description.is_empty() {
            for frame in fetcher.frames_for(url) {
                let text = self.description.extract_from_html(frame);
                if !text.is_empty() {
                    debug!("Description for {} recovered from iframe", url);
                    page.description = text;
                    break;
                }
            }
        }

        if page.description.is_empty() {
            for link in page.expose_links.iter().take(3) {
                match fetcher.fetch_plain(link).await {
                    Ok(html) => {
                        let text = self.description.extract_from_html(&html);
                        if !text.is_empty() {
                            debug!("Description for {} recovered from {}", url, link);
                            page.description = text;
                            break;
                        }
                    }
                    Err(e) => warn!("External exposé {} failed: {}", link, e),
                }
            }
        }

        Ok(ScrapedListing {
            title: page.title,
            url: url.to_string(),
            description: page.description,
            listing_id: page.listing_id,
            price: page.price,
            location: page.location,
            image_url: page.image_url,
            category: page.category,
        })
    }

    fn parse_page(&self, html: &str) -> ParsedPage {
        let doc = Html::parse_document(html);
        let page_text = flatten_text(&doc);

        ParsedPage {
            title: extract_title(&doc),
            listing_id: extract_listing_id(&page_text),
            location: extract_plz_ort(&page_text),
            image_url: self.extract_image(&doc),
            price: self.price.extract(&doc, &page_text),
            category: classify_category(&page_text, Category::Kaufen),
            description: self.description.extract(&doc),
            expose_links: extract_expose_links(&doc),
        }
    }

    fn extract_image(&self, doc: &Html) -> String {
        if let Some(a) = doc.select(&SEL_IMAGE_LINKS).next() {
            if let Some(href) = a.value().attr("href") {
                return self.absolutize(href);
            }
        }
        doc.select(&SEL_IMG)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| self.absolutize(src))
            .unwrap_or_default()
    }

    fn absolutize(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else if let Some(rest) = href.strip_prefix("//") {
            format!("https://{}", rest)
        } else if href.starts_with('/') {
            format!("{}{}", self.base_url.trim_end_matches('/'), href)
        } else {
            href.to_string()
        }
    }
}

/// All text nodes of the document, one per line.
pub fn flatten_text(doc: &Html) -> String {
    doc.root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_title(doc: &Html) -> String {
    if let Some(h1) = doc.select(&SEL_H1).next() {
        let title = element_text(h1);
        if !title.is_empty() {
            return title;
        }
    }
    doc.select(&SEL_TITLE)
        .next()
        .map(element_text)
        .unwrap_or_default()
}

fn extract_listing_id(page_text: &str) -> String {
    RE_OBJEKTNR
        .captures(page_text)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default()
}

/// Postal code plus place name, cut at the first separator. The all-zero
/// postal code is a placeholder, not an address.
fn extract_plz_ort(page_text: &str) -> String {
    for caps in RE_PLZ_ORT.captures_iter(page_text) {
        let plz = &caps[1];
        if plz == "00000" {
            continue;
        }
        let place = caps[2]
            .split(PLACE_SEPARATORS)
            .next()
            .unwrap_or("")
            .trim();
        let place = normalize_ws(place);
        if !place.is_empty() {
            return format!("{} {}", plz, place);
        }
    }
    String::new()
}

/// Links to externally hosted exposés, tried when the page and its frames
/// carry no description.
fn extract_expose_links(doc: &Html) -> Vec<String> {
    let mut links = Vec::new();
    for a in doc.select(&SEL_LINKS) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let lower = href.to_lowercase();
        if !href.starts_with("http") {
            continue;
        }
        if (lower.contains("expose") || lower.contains("immo.")) && !links.contains(&href.to_string())
        {
            links.push(href.to_string());
        }
    }
    links
}
