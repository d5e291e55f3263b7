use regex::Regex;
use std::sync::LazyLock;

use crate::models::Category;

static RE_MIETE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bzur\s*miete\b|\b(kaltmiete|warmmiete|nettokaltmiete)\b").unwrap()
});
static RE_KAUF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bzum\s*kauf\b").unwrap());

const SUBTYPE_THRESHOLD: usize = 2;

const KW_WOHNUNG: [&str; 6] = [
    "wohnung",
    "etagenwohnung",
    "maisonette",
    "penthouse",
    "apartment",
    "appartement",
];
const KW_HAUS: [&str; 7] = [
    "haus",
    "einfamilienhaus",
    "doppelhaushälfte",
    "reihenhaus",
    "villa",
    "bungalow",
    "zweifamilienhaus",
];
const KW_GEWERBE: [&str; 6] = [
    "gewerbe",
    "büro",
    "praxis",
    "ladenlokal",
    "halle",
    "gastronomie",
];
const KW_ANLAGE: [&str; 5] = [
    "mehrfamilienhaus",
    "renditeobjekt",
    "kapitalanlage",
    "wohn- und geschäftshaus",
    "anlageobjekt",
];

/// Decide the listing category from page text. Rental vocabulary wins over
/// buy vocabulary when both appear; pages saying neither inherit the default
/// of the crawl section they were found in.
pub fn classify_category(page_text: &str, default: Category) -> Category {
    if RE_MIETE.is_match(page_text) {
        Category::Mieten
    } else if RE_KAUF.is_match(page_text) {
        Category::Kaufen
    } else {
        default
    }
}

/// Property sub-type from keyword frequency over title and description. A
/// sub-type wins only with at least two hits and a strictly higher count than
/// every other sub-type; ties and weak signals fall back to the default.
pub fn classify_subtype(title: &str, description: &str, default: &str) -> String {
    let haystack = format!("{} {}", title, description).to_lowercase();
    let score = |keywords: &[&str]| -> usize {
        keywords.iter().map(|k| haystack.matches(k).count()).sum()
    };

    let scored = [
        ("Wohnung", score(&KW_WOHNUNG)),
        ("Haus", score(&KW_HAUS)),
        ("Gewerbe", score(&KW_GEWERBE)),
        ("Anlage", score(&KW_ANLAGE)),
    ];

    let mut best: Option<(&str, usize)> = None;
    for (name, count) in scored {
        match best {
            Some((_, top)) if count > top => best = Some((name, count)),
            Some((_, top)) if count == top => {
                // A tie means no clear winner.
                best = Some(("", top));
            }
            None => best = Some((name, count)),
            _ => {}
        }
    }

    match best {
        Some((name, count)) if count >= SUBTYPE_THRESHOLD && !name.is_empty() => name.to_string(),
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rental_vocabulary_wins_over_buy() {
        let text = "Schöne Wohnung zum Kauf oder zur Miete, Kaltmiete 950 €";
        assert_eq!(classify_category(text, Category::Kaufen), Category::Mieten);
    }

    #[test]
    fn test_buy_marker_overrides_default() {
        assert_eq!(
            classify_category("Einfamilienhaus zum Kauf in Wiesbaden", Category::Mieten),
            Category::Kaufen
        );
    }

    #[test]
    fn test_no_marker_keeps_section_default() {
        assert_eq!(
            classify_category("Charmantes Objekt in Hanglage", Category::Kaufen),
            Category::Kaufen
        );
        assert_eq!(
            classify_category("Charmantes Objekt in Hanglage", Category::Mieten),
            Category::Mieten
        );
    }

    #[test]
    fn test_subtype_needs_two_hits() {
        // One mention only, so the default stands.
        assert_eq!(
            classify_subtype("Villa in Bestlage", "", "Wohnung"),
            "Wohnung"
        );
        assert_eq!(
            classify_subtype(
                "Villa in Bestlage",
                "Das Haus überzeugt durch seine Ausstattung.",
                "Wohnung"
            ),
            "Haus"
        );
    }

    #[test]
    fn test_subtype_tie_falls_back_to_default() {
        assert_eq!(
            classify_subtype(
                "Wohnung über der Praxis",
                "Die Wohnung liegt über einer Praxis.",
                "Wohnung"
            ),
            "Wohnung"
        );
    }

    #[test]
    fn test_subtype_clear_winner() {
        let desc = "Das Mehrfamilienhaus ist voll vermietet, ein solides Renditeobjekt \
                    und als Kapitalanlage geeignet.";
        assert_eq!(classify_subtype("Anlageobjekt", desc, "Wohnung"), "Anlage");
    }
}
