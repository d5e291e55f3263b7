use anyhow::{Context, Result};
use std::env;

/// Credentials and table coordinates for the remote Airtable-style store,
/// loaded once from environment variables.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub token: String,
    pub base_id: String,
    pub table_name: Option<String>,
    pub table_id: Option<String>,
    pub view: Option<String>,
    /// When set, listings without a stable natural key are skipped instead of
    /// falling back to an unstable content hash.
    pub strict_keys: bool,
}

impl StoreConfig {
    /// Returns `None` when the store is not configured (sync is skipped).
    pub fn from_env() -> Result<Option<Self>> {
        let token = env_trimmed("AIRTABLE_TOKEN");
        let base_id = env_trimmed("AIRTABLE_BASE");

        let (token, base_id) = match (token, base_id) {
            (Some(t), Some(b)) => (t, b),
            _ => return Ok(None),
        };

        let config = Self {
            token,
            base_id,
            table_name: env_trimmed("AIRTABLE_TABLE"),
            table_id: env_trimmed("AIRTABLE_TABLE_ID"),
            view: env_trimmed("AIRTABLE_VIEW"),
            strict_keys: env::var("MSI_STRICT_KEYS").map(|v| v.trim() == "1").unwrap_or(false),
        };
        config.validate()?;
        Ok(Some(config))
    }

    /// Table path segment: the table id is preferred over the name.
    pub fn table_segment(&self) -> Result<&str> {
        self.table_id
            .as_deref()
            .or(self.table_name.as_deref())
            .context("AIRTABLE_TABLE or AIRTABLE_TABLE_ID must be set")
    }

    pub fn validate(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(anyhow::anyhow!("AIRTABLE_TOKEN cannot be empty"));
        }
        if self.base_id.is_empty() {
            return Err(anyhow::anyhow!("AIRTABLE_BASE cannot be empty"));
        }
        self.table_segment()?;
        Ok(())
    }
}

fn env_trimmed(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> StoreConfig {
        StoreConfig {
            token: "pat123".to_string(),
            base_id: "appXYZ".to_string(),
            table_name: Some("Immobilien".to_string()),
            table_id: None,
            view: None,
            strict_keys: false,
        }
    }

    #[test]
    fn test_table_segment_prefers_id() {
        let mut config = sample_config();
        assert_eq!(config.table_segment().unwrap(), "Immobilien");

        config.table_id = Some("tblABC".to_string());
        assert_eq!(config.table_segment().unwrap(), "tblABC");
    }

    #[test]
    fn test_validate_requires_table() {
        let mut config = sample_config();
        config.table_name = None;
        assert!(config.validate().is_err());

        config.table_id = Some("tblABC".to_string());
        assert!(config.validate().is_ok());
    }
}
