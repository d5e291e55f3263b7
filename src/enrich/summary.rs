use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use wreq::Client;

use crate::config::SummaryConfig;
use crate::extract::classify_subtype;
use crate::models::ScrapedListing;
use crate::store::RemoteRecord;

const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const PLACEHOLDER: &str = "k. A.";

/// Fixed label order of the short-form summary.
const LABELS: [&str; 4] = ["Objektart", "Lage", "Preis", "Highlights"];

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Summaries already stored remotely, keyed by listing id. A cache hit is
/// reused verbatim so unchanged listings never trigger a generation call.
pub struct SummaryCache {
    by_listing_id: HashMap<String, String>,
}

impl SummaryCache {
    pub fn preload(records: &[RemoteRecord]) -> Self {
        let mut by_listing_id = HashMap::new();
        for record in records {
            let id = record
                .fields
                .get("Objektnummer")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty());
            let summary = record
                .fields
                .get("Kurzfassung")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty());
            if let (Some(id), Some(summary)) = (id, summary) {
                by_listing_id.insert(id.to_string(), summary.to_string());
            }
        }
        info!("Preloaded {} existing summaries", by_listing_id.len());
        Self { by_listing_id }
    }

    pub fn get(&self, listing_id: &str) -> Option<&str> {
        self.by_listing_id.get(listing_id).map(String::as_str)
    }
}

/// Generates the four-line summary, via the chat-completion API when
/// credentials are configured. Failures degrade to locally-derived values so
/// a sync run never aborts over the summary field.
pub struct Summarizer {
    client: Client,
    config: SummaryConfig,
    default_subtype: String,
}

impl Summarizer {
    pub fn new(config: SummaryConfig, default_subtype: String) -> Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            config,
            default_subtype,
        })
    }

    pub async fn summarize(&self, listing: &ScrapedListing, cache: &SummaryCache) -> String {
        if !listing.listing_id.is_empty() {
            if let Some(hit) = cache.get(&listing.listing_id) {
                debug!("Summary for {} reused from store", listing.listing_id);
                return hit.to_string();
            }
        }

        match self.generate(listing).await {
            Ok(text) => normalize_summary(&text, listing, &self.default_subtype),
            Err(e) => {
                warn!("Summary generation for '{}' failed: {}", listing.title, e);
                local_summary(listing, &self.default_subtype)
            }
        }
    }

    async fn generate(&self, listing: &ScrapedListing) -> Result<String> {
        let prompt = format!(
            "Fasse dieses Immobilienangebot in genau vier Zeilen zusammen, \
             jede Zeile beginnt mit einem der Labels Objektart, Lage, Preis, \
             Highlights gefolgt von einem Doppelpunkt. Fehlende Angaben als \
             '{}' ausgeben.\n\nTitel: {}\nKategorie: {}\nStandort: {}\nPreis: {}\n\n{}",
            PLACEHOLDER,
            listing.title,
            listing.category.label(),
            listing.location,
            listing
                .price
                .as_ref()
                .map(|p| p.display.clone())
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            listing.description
        );

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(CHAT_URL)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("chat API returned {}", response.status()));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("chat API returned no choices"))
    }
}

/// Summary built entirely from scraped fields, used without credentials or
/// when generation fails.
pub fn local_summary(listing: &ScrapedListing, default_subtype: &str) -> String {
    normalize_summary("", listing, default_subtype)
}

/// Summary path when no generator is configured: a stored summary is still
/// reused verbatim, so credential-less runs do not overwrite generated text
/// with locally-derived lines.
pub fn cached_or_local(
    listing: &ScrapedListing,
    cache: &SummaryCache,
    default_subtype: &str,
) -> String {
    if let Some(hit) = cache.get(&listing.listing_id) {
        debug!("Summary for {} reused from store", listing.listing_id);
        return hit.to_string();
    }
    local_summary(listing, default_subtype)
}

/// Force the summary into the fixed label layout. Lines the generator
/// provided are kept; missing labels are filled from scraped fields, with a
/// placeholder when nothing is known.
fn normalize_summary(raw: &str, listing: &ScrapedListing, default_subtype: &str) -> String {
    let mut provided: HashMap<&str, String> = HashMap::new();
    for line in raw.lines() {
        let line = line.trim().trim_start_matches(['-', '*', ' ']);
        if let Some((label, value)) = line.split_once(':') {
            let label = label.trim();
            let value = value.trim();
            if !value.is_empty() {
                if let Some(known) = LABELS.iter().find(|l| l.eq_ignore_ascii_case(label)) {
                    provided.entry(*known).or_insert_with(|| value.to_string());
                }
            }
        }
    }

    let fallback = |label: &str| -> String {
        match label {
            "Objektart" => {
                classify_subtype(&listing.title, &listing.description, default_subtype)
            }
            "Lage" if !listing.location.is_empty() => listing.location.clone(),
            "Preis" => listing
                .price
                .as_ref()
                .map(|p| p.display.clone())
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            "Highlights" => listing
                .description
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or(PLACEHOLDER)
                .to_string(),
            _ => PLACEHOLDER.to_string(),
        }
    };

    LABELS
        .iter()
        .map(|label| {
            let value = provided
                .get(label)
                .cloned()
                .unwrap_or_else(|| fallback(label));
            format!("{}: {}", label, value)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
