use std::env;

/// Optional headless-browser rendering, toggled via environment.
///
/// The site delivers the exposé tabs client-side on some templates; when
/// `MSI_RENDER=1` the fetcher re-renders pages that look under-rendered.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl RenderConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("MSI_RENDER").map(|v| v.trim() == "1").unwrap_or(false),
            timeout_ms: env::var("MSI_RENDER_TIMEOUT")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(15_000),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 15_000,
        }
    }
}
