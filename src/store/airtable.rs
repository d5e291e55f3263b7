use anyhow::{bail, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};
use wreq::Client;

use crate::config::StoreConfig;

/// The REST API accepts at most ten records per write request.
const BATCH_SIZE: usize = 10;
const PAGE_SIZE: usize = 100;
const REQUEST_DELAY: Duration = Duration::from_millis(250);
const PAGE_DELAY: Duration = Duration::from_millis(150);

/// A record as the remote store returns it. Empty fields are omitted from
/// the response, not returned as empty strings.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RecordPage {
    records: Vec<RemoteRecord>,
    offset: Option<String>,
}

/// Airtable-backed record store for one table.
pub struct AirtableStore {
    client: Client,
    config: StoreConfig,
    url: String,
}

impl AirtableStore {
    pub fn new(config: StoreConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        let url = format!(
            "https://api.airtable.com/v0/{}/{}",
            config.base_id,
            config.table_segment()?
        );
        Ok(AirtableStore {
            client,
            config,
            url,
        })
    }

    fn api_url(&self) -> &str {
        &self.url
    }

    /// Fetch every record in the table, following the offset cursor.
    pub async fn list_all(&self) -> Result<Vec<RemoteRecord>> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut params: Vec<(String, String)> =
                vec![("pageSize".to_string(), PAGE_SIZE.to_string())];
            if let Some(view) = &self.config.view {
                params.push(("view".to_string(), view.clone()));
            }
            if let Some(cursor) = &offset {
                params.push(("offset".to_string(), cursor.clone()));
            }

            let response = self
                .client
                .get(self.api_url())
                .header("Authorization", format!("Bearer {}", self.config.token))
                .query(&params)
                .send()
                .await?;
            let response = self.checked("list", response).await?;

            let page: RecordPage = response.json().await?;
            records.extend(page.records);

            match page.offset {
                Some(cursor) => {
                    offset = Some(cursor);
                    sleep(PAGE_DELAY).await;
                }
                None => break,
            }
        }

        info!("Fetched {} records from remote table", records.len());
        Ok(records)
    }

    pub async fn batch_create(&self, records: &[Map<String, Value>]) -> Result<usize> {
        for payload in create_payloads(records) {
            let response = self
                .client
                .post(self.api_url())
                .header("Authorization", format!("Bearer {}", self.config.token))
                .json(&payload)
                .send()
                .await?;
            self.checked("create", response).await?;
            sleep(REQUEST_DELAY).await;
        }
        Ok(records.len())
    }

    pub async fn batch_update(&self, updates: &[(String, Map<String, Value>)]) -> Result<usize> {
        for payload in update_payloads(updates) {
            let response = self
                .client
                .patch(self.api_url())
                .header("Authorization", format!("Bearer {}", self.config.token))
                .json(&payload)
                .send()
                .await?;
            self.checked("update", response).await?;
            sleep(REQUEST_DELAY).await;
        }
        Ok(updates.len())
    }

    pub async fn batch_delete(&self, ids: &[String]) -> Result<usize> {
        for chunk in ids.chunks(BATCH_SIZE) {
            let params: Vec<(&str, &str)> = chunk
                .iter()
                .map(|id| ("records[]", id.as_str()))
                .collect();
            let response = self
                .client
                .delete(self.api_url())
                .header("Authorization", format!("Bearer {}", self.config.token))
                .query(&params)
                .send()
                .await?;
            self.checked("delete", response).await?;
            sleep(REQUEST_DELAY).await;
        }
        Ok(ids.len())
    }

    /// Fail loudly on API errors, with the response body truncated so a
    /// field-validation message stays readable in the log.
    async fn checked(&self, action: &str, response: wreq::Response) -> Result<wreq::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let body = truncate_chars(&body, 400);
        error!("Store {} failed with {}: {}", action, status, body);
        bail!("store {} failed with {}", action, status)
    }
}

/// One request body per chunk of at most `BATCH_SIZE` records.
fn create_payloads(records: &[Map<String, Value>]) -> Vec<Value> {
    records.chunks(BATCH_SIZE).map(create_payload).collect()
}

fn update_payloads(updates: &[(String, Map<String, Value>)]) -> Vec<Value> {
    updates.chunks(BATCH_SIZE).map(update_payload).collect()
}

fn create_payload(chunk: &[Map<String, Value>]) -> Value {
    json!({
        "records": chunk
            .iter()
            .map(|fields| json!({ "fields": fields }))
            .collect::<Vec<_>>(),
        "typecast": true,
    })
}

fn update_payload(chunk: &[(String, Map<String, Value>)]) -> Value {
    json!({
        "records": chunk
            .iter()
            .map(|(id, fields)| json!({ "id": id, "fields": fields }))
            .collect::<Vec<_>>(),
        "typecast": true,
    })
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
