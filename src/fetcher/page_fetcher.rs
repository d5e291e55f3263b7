use anyhow::Result;
use scraper::Html;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::config::{RenderConfig, ScrapingConfig, SelectorConfig};
use crate::extract::description::seems_unrendered;
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::render_fetcher::RenderFetcher;

/// Fetches detail pages, falling back to headless rendering when the static
/// markup arrives without the client-side widget content. Frames captured
/// during rendering are kept per URL for the extraction stage.
pub struct PageFetcher {
    http: HttpFetcher,
    render: Option<RenderFetcher>,
    selectors: SelectorConfig,
    frames: HashMap<String, Vec<String>>,
}

impl PageFetcher {
    pub fn new(
        scraping: &ScrapingConfig,
        selectors: &SelectorConfig,
        render: &RenderConfig,
    ) -> Result<Self> {
        let render_fetcher = if render.enabled {
            Some(RenderFetcher::new(render, selectors))
        } else {
            None
        };
        Ok(Self {
            http: HttpFetcher::new(scraping.max_retries)?,
            render: render_fetcher,
            selectors: selectors.clone(),
            frames: HashMap::new(),
        })
    }

    /// Fetch without the rendering fallback (list pages, external exposés).
    pub async fn fetch_plain(&self, url: &str) -> Result<String> {
        self.http.fetch(url).await
    }

    pub async fn fetch(&mut self, url: &str) -> Result<String> {
        let html = self.http.fetch(url).await?;

        if self.render.is_some() {
            let needs_render = {
                let doc = Html::parse_document(&html);
                seems_unrendered(&doc, &self.selectors)
            };
            if needs_render {
                info!("Static markup for {} looks unrendered, rendering", url);
                if let Some(render) = self.render.as_mut() {
                    match render.render(url) {
                        Ok(page) => {
                            if !page.frames.is_empty() {
                                self.frames.insert(url.to_string(), page.frames);
                            }
                            return Ok(page.html);
                        }
                        Err(e) => {
                            warn!("Rendering {} failed, using static markup: {}", url, e);
                        }
                    }
                }
            }
        }

        Ok(html)
    }

    /// Frame documents captured while rendering `url`, if any.
    pub fn frames_for(&self, url: &str) -> &[String] {
        self.frames.get(url).map(Vec::as_slice).unwrap_or(&[])
    }
}
