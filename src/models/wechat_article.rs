//! WeChat article model
//!
//! Articles collected from official accounts that publish regional policy
//! news. Keyword and industry lists are stored as JSON text; rows written by
//! older tooling used a comma-separated string, which decoding still accepts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Stored WeChat article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WechatArticle {
    pub id: i64,
    pub title: String,
    pub content: Option<String>,
    /// Publish date as `YYYY-MM-DD`
    pub publish_date: Option<String>,
    pub author: Option<String>,
    /// Name of the official account
    pub source_account: String,
    pub url: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub industry_relevance: Vec<String>,
    pub content_html: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WechatArticle {
    /// Text used when matching articles against regions and industries
    pub fn searchable_text(&self) -> String {
        let mut text = self.title.clone();
        for part in [&self.summary, &self.content].into_iter().flatten() {
            text.push('\n');
            text.push_str(part);
        }
        text
    }
}

/// Input for ingesting a WeChat article
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateWechatArticleInput {
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub publish_date: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    pub source_account: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub industry_relevance: Vec<String>,
    #[serde(default)]
    pub content_html: Option<String>,
}

impl CreateWechatArticleInput {
    pub fn new(title: impl Into<String>, source_account: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source_account: source_account.into(),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_publish_date(mut self, date: impl Into<String>) -> Self {
        self.publish_date = Some(date.into());
        self
    }

    /// Check required fields and the publish date format.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".to_string());
        }
        if self.source_account.trim().is_empty() {
            return Err("source_account is required".to_string());
        }
        if let Some(date) = self.publish_date.as_deref().filter(|d| !d.is_empty()) {
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|_| format!("publish_date must be YYYY-MM-DD, got '{}'", date))?;
        }
        Ok(())
    }
}

/// Encode a string list for storage
pub fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a stored string list, accepting JSON arrays and the legacy
/// comma-separated form.
pub fn decode_list(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    if raw.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(raw) {
            return items;
        }
    }
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
