use anyhow::{anyhow, Context, Result};
use headless_chrome::{Browser, LaunchOptions};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{RenderConfig, SelectorConfig};

/// JS run inside the rendered page to pull same-origin iframe documents.
const FRAME_CAPTURE_JS: &str = r#"
JSON.stringify(Array.from(document.querySelectorAll('iframe')).map(f => {
  try {
    return f.contentDocument ? f.contentDocument.documentElement.outerHTML : '';
  } catch (e) {
    return '';
  }
}).filter(h => h.length > 0))
"#;

/// Activates the description tab so its panel content gets mounted.
const CLICK_DESCRIPTION_TAB_JS: &str = r##"
(() => {
  const links = Array.from(document.querySelectorAll('a[href^="#"], .v-tab'));
  const hit = links.find(a => (a.textContent || '').toLowerCase().includes('beschreibung'));
  if (hit) { hit.click(); return true; }
  return false;
})()
"##;

pub struct RenderedPage {
    pub html: String,
    /// Serialized documents of same-origin iframes found on the page.
    pub frames: Vec<String>,
}

/// Headless-browser fallback for pages whose exposé widget is mounted
/// client-side. The browser launches lazily on first use so runs without any
/// unrendered page never pay the startup cost.
pub struct RenderFetcher {
    browser: Option<Browser>,
    timeout: Duration,
    wait_selectors: Vec<String>,
}

impl RenderFetcher {
    pub fn new(render: &RenderConfig, selectors: &SelectorConfig) -> Self {
        Self {
            browser: None,
            timeout: Duration::from_millis(render.timeout_ms),
            wait_selectors: selectors.expose_scopes.clone(),
        }
    }

    fn browser(&mut self) -> Result<&Browser> {
        if self.browser.is_none() {
            info!("Launching headless browser for client-side rendering");
            let options = LaunchOptions::default_builder()
                .headless(true)
                .build()
                .map_err(|e| anyhow!("browser launch options: {}", e))?;
            self.browser = Some(Browser::new(options)?);
        }
        // Checked above.
        self.browser
            .as_ref()
            .ok_or_else(|| anyhow!("browser unavailable"))
    }

    pub fn render(&mut self, url: &str) -> Result<RenderedPage> {
        let timeout = self.timeout;
        let wait_selectors = self.wait_selectors.clone();
        let tab = self
            .browser()?
            .new_tab()
            .context("opening browser tab")?;

        tab.set_default_timeout(timeout);
        tab.navigate_to(url).context("navigating")?;
        tab.wait_until_navigated().context("waiting for page load")?;

        // Wait for the widget to mount; a miss is not fatal, the page may
        // simply not carry it.
        for selector in &wait_selectors {
            if tab
                .wait_for_element_with_custom_timeout(selector, timeout)
                .is_ok()
            {
                break;
            }
        }

        match tab.evaluate(CLICK_DESCRIPTION_TAB_JS, false) {
            Ok(result) => {
                if result.value == Some(serde_json::Value::Bool(true)) {
                    debug!("Activated description tab on {}", url);
                    std::thread::sleep(Duration::from_millis(500));
                }
            }
            Err(e) => debug!("Tab activation script failed on {}: {}", url, e),
        }

        let html = tab.get_content().context("reading rendered markup")?;
        let frames = self.capture_frames(&tab)?;

        let _ = tab.close(true);
        info!(
            "Rendered {} ({} characters, {} frames)",
            url,
            html.len(),
            frames.len()
        );
        Ok(RenderedPage { html, frames })
    }

    fn capture_frames(&self, tab: &headless_chrome::Tab) -> Result<Vec<String>> {
        let result = match tab.evaluate(FRAME_CAPTURE_JS, false) {
            Ok(result) => result,
            Err(e) => {
                debug!("Frame capture script failed: {}", e);
                return Ok(Vec::new());
            }
        };
        let Some(serde_json::Value::String(raw)) = result.value else {
            return Ok(Vec::new());
        };
        let frames: Vec<String> =
            serde_json::from_str(&raw).context("parsing captured frame list")?;
        Ok(frames)
    }
}
