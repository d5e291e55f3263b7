use serde::{Deserialize, Serialize};

/// Configuration for the scraped property site: URL shapes, selectors for the
/// tabbed exposé widget, and the keyword sets driving extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub site: SiteSection,
    pub scraping: ScrapingConfig,
    pub selectors: SelectorConfig,
    pub extraction: ExtractionConfig,
}

/// Basic site information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSection {
    pub name: String,
    pub base_url: String,
    pub list_path: String,
    pub detail_link_marker: String,
}

/// Scraping behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    pub max_pages: usize,
    pub detail_delay_ms: u64,
    pub page_delay_ms: u64,
    pub max_retries: usize,
}

/// CSS selectors for the exposé widget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub expose_scopes: Vec<String>,
    pub first_tab_panel: String,
    pub active_tab_panel: String,
    pub description_boxes: Vec<String>,
}

/// Keyword sets and limits for field extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub price_keywords: Vec<String>,
    pub object_panel_aliases: Vec<String>,
    pub description_aliases: Vec<String>,
    pub stop_phrases: Vec<String>,
    pub description_max_chars: usize,
    pub min_plausible_price: f64,
    pub default_subtype: String,
}

impl SiteConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)?;
        let config: SiteConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// List page URLs: first page plus `/page/{n}/` variants up to the limit.
    pub fn list_page_urls(&self) -> Vec<String> {
        let first = format!("{}{}", self.site.base_url, self.site.list_path);
        let mut urls = vec![first.clone()];
        for n in 2..=self.scraping.max_pages {
            urls.push(format!("{}page/{}/", first, n));
        }
        urls
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site: SiteSection {
                name: "MSI Hessen".to_string(),
                base_url: "https://www.msi-hessen.de".to_string(),
                list_path: "/kaufen/immobilienangebote/".to_string(),
                detail_link_marker: "/angebote/".to_string(),
            },
            scraping: ScrapingConfig::default(),
            selectors: SelectorConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            detail_delay_ms: 150,
            page_delay_ms: 250,
            max_retries: 3,
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            expose_scopes: vec![
                ".sw-yframe .sw-vframe .v-expose".to_string(),
                ".v-expose".to_string(),
            ],
            first_tab_panel: ".v-tabs-items .v-window__container #tab-0".to_string(),
            active_tab_panel: ".v-tabs-items .v-window__container .v-window-item.v-window-item--active"
                .to_string(),
            description_boxes: vec![
                ".v-card .v-card__text".to_string(),
                ".v-card__text".to_string(),
            ],
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            price_keywords: vec![
                "kaufpreis".to_string(),
                "preis".to_string(),
                "kaltmiete".to_string(),
                "warmmiete".to_string(),
                "nettokaltmiete".to_string(),
                "miete".to_string(),
            ],
            object_panel_aliases: vec![
                "objektangaben".to_string(),
                "objektdaten".to_string(),
                "daten".to_string(),
            ],
            description_aliases: vec!["beschreibung".to_string()],
            stop_phrases: vec![
                "Ihre Anfrage".to_string(),
                "Exposé anfordern".to_string(),
                "Neueste Immobilien".to_string(),
                "Teilen auf".to_string(),
                "Datenschutz".to_string(),
                "Impressum".to_string(),
                "designed by wavepoint".to_string(),
                "Ansprechpartner".to_string(),
                "Kontaktieren Sie uns".to_string(),
                "Zur Objektanfrage".to_string(),
                "msi-hessen.de".to_string(),
            ],
            description_max_chars: 6000,
            min_plausible_price: 10_000.0,
            default_subtype: "Wohnung".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let config = SiteConfig::default();
        assert_eq!(config.scraping.max_pages, 50);
        assert_eq!(config.extraction.description_max_chars, 6000);
        assert!(!config.extraction.price_keywords.is_empty());
        assert!(!config.extraction.stop_phrases.is_empty());
    }

    #[test]
    fn test_list_page_urls() {
        let mut config = SiteConfig::default();
        config.scraping.max_pages = 3;

        let urls = config.list_page_urls();
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[0], "https://www.msi-hessen.de/kaufen/immobilienangebote/");
        assert_eq!(urls[1], "https://www.msi-hessen.de/kaufen/immobilienangebote/page/2/");
        assert_eq!(urls[2], "https://www.msi-hessen.de/kaufen/immobilienangebote/page/3/");
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SiteConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: SiteConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.site.base_url, config.site.base_url);
        assert_eq!(parsed.extraction.min_plausible_price, 10_000.0);
    }
}
