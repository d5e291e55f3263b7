use std::env;

/// Credentials for the optional text-generation collaborator used for
/// short-form listing summaries. Absent credentials disable generation
/// entirely; summaries then fall back to locally-derived field values.
#[derive(Debug, Clone)]
pub struct SummaryConfig {
    pub api_key: String,
    pub model: String,
}

impl SummaryConfig {
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())?;

        Some(Self {
            api_key,
            model: env::var("OPENAI_MODEL")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
        })
    }
}
