use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::{Category, ScrapedListing};

const HEADER: [&str; 8] = [
    "Titel",
    "Kategorie",
    "Webseite",
    "Objektnummer",
    "Beschreibung",
    "Bild",
    "Preis",
    "Standort",
];

/// Write one CSV per category under a timestamped run directory and return
/// that directory. Empty categories still get a header-only file so a run is
/// always fully represented on disk.
pub fn write_exports(listings: &[ScrapedListing], base_dir: &Path) -> Result<PathBuf> {
    let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let dir = base_dir.join(stamp);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating export directory {}", dir.display()))?;

    for (category, file_name) in [
        (Category::Kaufen, "msi_kauf.csv"),
        (Category::Mieten, "msi_miete.csv"),
    ] {
        let path = dir.join(file_name);
        let count = write_category(listings, category, &path)?;
        info!("Exported {} {} listings to {}", count, category.label(), path.display());
    }

    Ok(dir)
}

fn write_category(listings: &[ScrapedListing], category: Category, path: &Path) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    writer.write_record(HEADER)?;

    let mut count = 0;
    for listing in listings.iter().filter(|l| l.category == category) {
        let price = price_field(listing);
        writer.write_record([
            listing.title.as_str(),
            listing.category.label(),
            listing.url.as_str(),
            listing.listing_id.as_str(),
            listing.description.as_str(),
            listing.image_url.as_str(),
            price.as_str(),
            listing.location.as_str(),
        ])?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

/// Whole prices export as plain integers; an absent price stays empty.
fn price_field(listing: &ScrapedListing) -> String {
    match &listing.price {
        None => String::new(),
        Some(p) if p.amount.fract() == 0.0 => format!("{}", p.amount as i64),
        Some(p) => format!("{}", p.amount),
    }
}
