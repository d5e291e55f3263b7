use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use regex::Regex;

static RE_SOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bverkauft\b").unwrap());

/// Top-level listing category; each category is synced as an independent
/// partition of the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Kaufen,
    Mieten,
}

impl Category {
    /// Store-facing label (the `Kategorie` field value).
    pub fn label(&self) -> &'static str {
        match self {
            Category::Kaufen => "Kaufen",
            Category::Mieten => "Mieten",
        }
    }
}

/// Run mode from the CLI: sync one category or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Kauf,
    Miete,
    Auto,
}

impl Mode {
    pub fn parse(arg: Option<String>) -> anyhow::Result<Self> {
        match arg.as_deref().map(|s| s.trim().to_lowercase()).as_deref() {
            None | Some("auto") => Ok(Mode::Auto),
            Some("kauf") => Ok(Mode::Kauf),
            Some("miete") => Ok(Mode::Miete),
            Some(other) => Err(anyhow::anyhow!(
                "mode must be 'kauf', 'miete' or 'auto', got '{}'",
                other
            )),
        }
    }

    pub fn includes(&self, category: Category) -> bool {
        match self {
            Mode::Auto => true,
            Mode::Kauf => category == Category::Kaufen,
            Mode::Miete => category == Category::Mieten,
        }
    }
}

/// A parsed price: display string with period thousands separators plus the
/// normalized numeric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceValue {
    pub display: String,
    pub amount: f64,
}

/// One scraped listing detail page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedListing {
    pub title: String,
    pub url: String,
    pub description: String,
    pub listing_id: String,
    pub price: Option<PriceValue>,
    pub location: String,
    pub image_url: String,
    pub category: Category,
}

impl ScrapedListing {
    /// Map into the remote store's field schema. An absent price is omitted
    /// entirely, never written as zero or empty.
    pub fn to_fields(&self, summary: Option<String>) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("Titel".to_string(), Value::String(self.title.clone()));
        fields.insert(
            "Kategorie".to_string(),
            Value::String(self.category.label().to_string()),
        );
        fields.insert("Webseite".to_string(), Value::String(self.url.clone()));
        fields.insert(
            "Objektnummer".to_string(),
            Value::String(self.listing_id.clone()),
        );
        fields.insert(
            "Beschreibung".to_string(),
            Value::String(self.description.clone()),
        );
        fields.insert("Bild".to_string(), Value::String(self.image_url.clone()));
        if let Some(price) = &self.price {
            fields.insert("Preis".to_string(), number_value(price.amount));
        }
        fields.insert("Standort".to_string(), Value::String(self.location.clone()));
        if let Some(summary) = summary {
            fields.insert("Kurzfassung".to_string(), Value::String(summary));
        }
        fields
    }
}

/// Whole amounts are stored as integers; the store echoes them back that way.
fn number_value(amount: f64) -> Value {
    if amount.fract() == 0.0 && amount.abs() < i64::MAX as f64 {
        Value::Number((amount as i64).into())
    } else {
        serde_json::Number::from_f64(amount)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Listings whose title marks them as already sold never enter the sync set.
pub fn is_sold(title: &str) -> bool {
    RE_SOLD.is_match(title)
}

/// Natural key of a record field set, used to match records across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub value: String,
    /// False for the content-hash fallback, which changes whenever any field
    /// changes and therefore cannot match across runs.
    pub stable: bool,
}

/// Derive the natural key: site-assigned listing id, else URL, else a hash of
/// the full field set as a last resort.
pub fn natural_key(fields: &Map<String, Value>) -> NaturalKey {
    if let Some(id) = non_empty_str(fields, "Objektnummer") {
        return NaturalKey {
            value: format!("obj:{}", id),
            stable: true,
        };
    }
    if let Some(url) = non_empty_str(fields, "Webseite") {
        return NaturalKey {
            value: format!("url:{}", url),
            stable: true,
        };
    }

    // Sort keys so the hash does not depend on map insertion order.
    let mut entries: Vec<(&String, &Value)> = fields.iter().collect();
    entries.sort_by_key(|(k, _)| k.as_str());
    let mut hasher = DefaultHasher::new();
    for (key, value) in entries {
        key.hash(&mut hasher);
        value.to_string().hash(&mut hasher);
    }
    NaturalKey {
        value: format!("hash:{:x}", hasher.finish()),
        stable: false,
    }
}

fn non_empty_str<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_listing() -> ScrapedListing {
        ScrapedListing {
            title: "Charmante Stadtwohnung".to_string(),
            url: "https://www.msi-hessen.de/angebote/4220/".to_string(),
            description: "Helle Wohnung in zentraler Lage.".to_string(),
            listing_id: "4220".to_string(),
            price: Some(PriceValue {
                display: "479.000 €".to_string(),
                amount: 479_000.0,
            }),
            location: "65185 Wiesbaden".to_string(),
            image_url: "https://immo.example/4220.jpg".to_string(),
            category: Category::Kaufen,
        }
    }

    #[test]
    fn test_fields_omit_absent_price() {
        let mut listing = sample_listing();
        listing.price = None;

        let fields = listing.to_fields(None);
        assert!(!fields.contains_key("Preis"));
        assert_eq!(fields["Titel"], json!("Charmante Stadtwohnung"));
    }

    #[test]
    fn test_whole_price_stored_as_integer() {
        let fields = sample_listing().to_fields(None);
        assert_eq!(fields["Preis"], json!(479000));
    }

    #[test]
    fn test_summary_field_only_when_present() {
        let listing = sample_listing();
        assert!(!listing.to_fields(None).contains_key("Kurzfassung"));

        let fields = listing.to_fields(Some("Objektart: Wohnung".to_string()));
        assert_eq!(fields["Kurzfassung"], json!("Objektart: Wohnung"));
    }

    #[test]
    fn test_natural_key_prefers_listing_id() {
        let fields = sample_listing().to_fields(None);
        let key = natural_key(&fields);
        assert_eq!(key.value, "obj:4220");
        assert!(key.stable);
    }

    #[test]
    fn test_natural_key_falls_back_to_url() {
        let mut listing = sample_listing();
        listing.listing_id = String::new();
        let key = natural_key(&listing.to_fields(None));
        assert_eq!(key.value, "url:https://www.msi-hessen.de/angebote/4220/");
        assert!(key.stable);
    }

    #[test]
    fn test_natural_key_hash_is_unstable_marker() {
        let mut listing = sample_listing();
        listing.listing_id = String::new();
        listing.url = String::new();
        let key = natural_key(&listing.to_fields(None));
        assert!(key.value.starts_with("hash:"));
        assert!(!key.stable);

        // Any field change produces a different hash key.
        listing.title = "Anderer Titel".to_string();
        let other = natural_key(&listing.to_fields(None));
        assert_ne!(key.value, other.value);
    }

    #[test]
    fn test_sold_titles_detected() {
        assert!(is_sold("VERKAUFT: Einfamilienhaus in Kassel"));
        assert!(is_sold("Einfamilienhaus (verkauft)"));
        assert!(!is_sold("Verkaufsoffene Besichtigung"));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(Mode::parse(None).unwrap(), Mode::Auto);
        assert_eq!(Mode::parse(Some("Kauf".to_string())).unwrap(), Mode::Kauf);
        assert_eq!(Mode::parse(Some("miete".to_string())).unwrap(), Mode::Miete);
        assert!(Mode::parse(Some("beides".to_string())).is_err());
    }

    #[test]
    fn test_mode_category_filter() {
        assert!(Mode::Auto.includes(Category::Kaufen));
        assert!(Mode::Auto.includes(Category::Mieten));
        assert!(Mode::Kauf.includes(Category::Kaufen));
        assert!(!Mode::Kauf.includes(Category::Mieten));
    }
}
