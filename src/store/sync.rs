use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{info, warn};

use crate::models::{natural_key, Category};
use crate::store::airtable::{AirtableStore, RemoteRecord};

/// The write set derived from comparing desired against existing records.
#[derive(Debug, Default)]
pub struct SyncPlan {
    pub creates: Vec<Map<String, Value>>,
    pub updates: Vec<(String, Map<String, Value>)>,
    pub deletes: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Records of one category partition; syncs never touch the other partition.
pub fn partition(records: &[RemoteRecord], category: Category) -> Vec<RemoteRecord> {
    records
        .iter()
        .filter(|r| r.fields.get("Kategorie").and_then(Value::as_str) == Some(category.label()))
        .cloned()
        .collect()
}

/// Column names the remote table is known to have, learned from the records
/// it returned. Empty when the table holds no records to learn from.
pub fn known_fields(records: &[RemoteRecord]) -> HashSet<String> {
    records
        .iter()
        .flat_map(|r| r.fields.keys().cloned())
        .collect()
}

/// Drop outgoing fields the table has no column for; a single unknown column
/// makes the store reject the whole batch. With an empty schema (no records
/// to learn from) everything passes through unchanged.
pub fn sanitize_fields(
    desired: &[Map<String, Value>],
    allowed: &HashSet<String>,
) -> Vec<Map<String, Value>> {
    if allowed.is_empty() {
        return desired.to_vec();
    }

    let mut dropped: BTreeSet<&str> = BTreeSet::new();
    let sanitized = desired
        .iter()
        .map(|fields| {
            fields
                .iter()
                .filter(|(key, _)| {
                    let keep = allowed.contains(key.as_str());
                    if !keep {
                        dropped.insert(key.as_str());
                    }
                    keep
                })
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .collect();

    if !dropped.is_empty() {
        warn!("Dropping fields without a remote column: {:?}", dropped);
    }
    sanitized
}

/// Diff desired against existing records by natural key.
///
/// Matching records are updated only when a desired field actually differs.
/// Existing records whose key no longer appears are deleted, as are remote
/// duplicates of an already-seen key. With `strict_keys`, listings that only
/// have the unstable content-hash key are skipped instead of churning
/// delete/create pairs every run.
pub fn plan(
    desired: &[Map<String, Value>],
    existing: &[RemoteRecord],
    strict_keys: bool,
) -> SyncPlan {
    let mut by_key: HashMap<String, (String, &Map<String, Value>)> = HashMap::new();
    let mut sync_plan = SyncPlan::default();

    for record in existing {
        let key = natural_key(&record.fields);
        if by_key.contains_key(&key.value) {
            sync_plan.deletes.push(record.id.clone());
        } else {
            by_key.insert(key.value, (record.id.clone(), &record.fields));
        }
    }

    for fields in desired {
        let key = natural_key(fields);
        if !key.stable {
            if strict_keys {
                warn!("Skipping listing without stable key: {}", key.value);
                continue;
            }
            warn!(
                "Listing only has content-hash key {}, it will churn on every change",
                key.value
            );
        }
        match by_key.remove(&key.value) {
            Some((id, old_fields)) => {
                let changed = diff_fields(fields, old_fields);
                if !changed.is_empty() {
                    sync_plan.updates.push((id, changed));
                }
            }
            None => sync_plan.creates.push(fields.clone()),
        }
    }

    sync_plan
        .deletes
        .extend(by_key.into_values().map(|(id, _)| id));
    sync_plan.deletes.sort();
    sync_plan
}

/// The fields whose desired value differs from the remote one. Updates carry
/// only this diff; extra remote fields (formulas, manual notes) never count
/// as drift.
fn diff_fields(desired: &Map<String, Value>, existing: &Map<String, Value>) -> Map<String, Value> {
    desired
        .iter()
        .filter(|(key, value)| !values_equal(value, existing.get(key.as_str())))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// The store omits empty fields in responses and echoes whole numbers back
/// as integers, so both cases must compare equal.
fn values_equal(desired: &Value, existing: Option<&Value>) -> bool {
    let Some(existing) = existing else {
        return is_empty_value(desired);
    };
    if let (Some(a), Some(b)) = (desired.as_f64(), existing.as_f64()) {
        return (a - b).abs() < 1e-9;
    }
    desired == existing
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Apply the full create/update/delete cycle for one category partition.
///
/// A category that scraped nothing is skipped while remote records exist:
/// an empty scrape is far more likely a site hiccup or classifier drift than
/// a genuinely cleared market, and mirroring it would wipe the partition.
pub async fn sync_category(
    store: &AirtableStore,
    category: Category,
    desired: &[Map<String, Value>],
    all_records: &[RemoteRecord],
    strict_keys: bool,
) -> Result<()> {
    let existing = partition(all_records, category);
    if desired.is_empty() && !existing.is_empty() {
        warn!(
            "[sync] {}: no listings scraped, keeping the {} existing records untouched",
            category.label(),
            existing.len()
        );
        return Ok(());
    }

    let desired = sanitize_fields(desired, &known_fields(all_records));
    let sync_plan = plan(&desired, &existing, strict_keys);

    info!(
        "[sync] {}: {} create, {} update, {} delete ({} desired, {} existing)",
        category.label(),
        sync_plan.creates.len(),
        sync_plan.updates.len(),
        sync_plan.deletes.len(),
        desired.len(),
        existing.len()
    );
    if sync_plan.is_empty() {
        return Ok(());
    }

    if !sync_plan.creates.is_empty() {
        store.batch_create(&sync_plan.creates).await?;
    }
    if !sync_plan.updates.is_empty() {
        store.batch_update(&sync_plan.updates).await?;
    }
    if !sync_plan.deletes.is_empty() {
        store.batch_delete(&sync_plan.deletes).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(id: &str, title: &str, price: Value) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("Titel".to_string(), json!(title));
        map.insert("Kategorie".to_string(), json!("Kaufen"));
        map.insert("Objektnummer".to_string(), json!(id));
        if !price.is_null() {
            map.insert("Preis".to_string(), price);
        }
        map
    }

    fn remote(rec_id: &str, obj_id: &str, title: &str, price: Value) -> RemoteRecord {
        RemoteRecord {
            id: rec_id.to_string(),
            fields: fields(obj_id, title, price),
        }
    }

    #[test]
    fn test_new_listings_become_creates() {
        let desired = vec![fields("4220", "Wohnung", json!(479000))];
        let result = plan(&desired, &[], false);
        assert_eq!(result.creates.len(), 1);
        assert!(result.updates.is_empty());
        assert!(result.deletes.is_empty());
    }

    #[test]
    fn test_vanished_listings_become_deletes() {
        let existing = vec![remote("recOLD", "9999", "Weg", json!(100000))];
        let result = plan(&[], &existing, false);
        assert_eq!(result.deletes, vec!["recOLD"]);
        assert!(result.creates.is_empty());
    }

    #[test]
    fn test_unchanged_listing_triggers_no_write() {
        let desired = vec![fields("4220", "Wohnung", json!(479000))];
        let existing = vec![remote("rec1", "4220", "Wohnung", json!(479000))];
        assert!(plan(&desired, &existing, false).is_empty());
    }

    #[test]
    fn test_changed_price_becomes_update_carrying_only_the_diff() {
        let desired = vec![fields("4220", "Wohnung", json!(479000))];
        let existing = vec![remote("rec1", "4220", "Wohnung", json!(450000))];
        let result = plan(&desired, &existing, false);
        assert_eq!(result.updates.len(), 1);
        assert_eq!(result.updates[0].0, "rec1");
        assert_eq!(result.updates[0].1.len(), 1);
        assert_eq!(result.updates[0].1["Preis"], json!(479000));
        assert!(result.deletes.is_empty());
    }

    #[test]
    fn test_integer_and_float_prices_compare_equal() {
        let desired = vec![fields("4220", "Wohnung", json!(479000))];
        let existing = vec![remote("rec1", "4220", "Wohnung", json!(479000.0))];
        assert!(plan(&desired, &existing, false).is_empty());
    }

    #[test]
    fn test_empty_string_matches_omitted_remote_field() {
        let mut f = fields("4220", "Wohnung", Value::Null);
        f.insert("Standort".to_string(), json!(""));
        let existing = vec![remote("rec1", "4220", "Wohnung", Value::Null)];
        assert!(plan(&[f], &existing, false).is_empty());
    }

    #[test]
    fn test_duplicate_remote_keys_are_cleaned_up() {
        let existing = vec![
            remote("rec1", "4220", "Wohnung", json!(479000)),
            remote("rec2", "4220", "Wohnung", json!(479000)),
        ];
        let desired = vec![fields("4220", "Wohnung", json!(479000))];
        let result = plan(&desired, &existing, false);
        assert_eq!(result.deletes, vec!["rec2"]);
        assert!(result.creates.is_empty());
        assert!(result.updates.is_empty());
    }

    #[test]
    fn test_strict_keys_skips_hash_only_listings() {
        let mut keyless = Map::new();
        keyless.insert("Titel".to_string(), json!("Ohne Kennung"));

        let relaxed = plan(&[keyless.clone()], &[], false);
        assert_eq!(relaxed.creates.len(), 1);

        let strict = plan(&[keyless], &[], true);
        assert!(strict.is_empty());
    }

    #[test]
    fn test_unknown_columns_dropped_from_outgoing_records() {
        let existing = vec![remote("rec1", "4220", "Wohnung", json!(479000))];
        let mut f = fields("4221", "Haus", json!(890000));
        f.insert("Kurzfassung".to_string(), json!("Objektart: Haus"));

        let sanitized = sanitize_fields(&[f], &known_fields(&existing));
        assert_eq!(sanitized.len(), 1);
        assert!(!sanitized[0].contains_key("Kurzfassung"));
        assert_eq!(sanitized[0]["Objektnummer"], json!("4221"));
    }

    #[test]
    fn test_empty_table_passes_fields_through() {
        let mut f = fields("4221", "Haus", json!(890000));
        f.insert("Kurzfassung".to_string(), json!("Objektart: Haus"));

        let sanitized = sanitize_fields(&[f.clone()], &known_fields(&[]));
        assert_eq!(sanitized, vec![f]);
    }

    #[tokio::test]
    async fn test_empty_scrape_keeps_existing_partition() {
        let store = AirtableStore::new(crate::config::StoreConfig {
            token: "pat123".to_string(),
            base_id: "appXYZ".to_string(),
            table_name: Some("Immobilien".to_string()),
            table_id: None,
            view: None,
            strict_keys: false,
        })
        .unwrap();
        let existing = vec![
            remote("rec1", "4220", "Wohnung", json!(479000)),
            remote("rec2", "4221", "Haus", json!(890000)),
            remote("rec3", "4222", "Halle", json!(1200000)),
        ];

        // Returns before any request goes out; without the guard this would
        // try to delete all three records.
        sync_category(&store, Category::Kaufen, &[], &existing, false)
            .await
            .unwrap();
    }

    #[test]
    fn test_partition_isolates_categories() {
        let mut miete = remote("recM", "7001", "Mietwohnung", json!(950));
        miete
            .fields
            .insert("Kategorie".to_string(), json!("Mieten"));
        let records = vec![remote("recK", "4220", "Wohnung", json!(479000)), miete];

        let kauf = partition(&records, Category::Kaufen);
        assert_eq!(kauf.len(), 1);
        assert_eq!(kauf[0].id, "recK");

        // A buy-side sync with nothing desired must not delete the rental row.
        let result = plan(&[], &kauf, false);
        assert_eq!(result.deletes, vec!["recK"]);
    }
}
