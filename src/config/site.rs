//! Site configuration store
//!
//! A JSON document, separate from `config.yml`, that holds third-party API
//! keys and the dashboard taxonomy. The settings page reads and updates it
//! through `/api/config`. Updates are merged rather than replaced so that a
//! form which omits a secret never wipes it.

use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

use crate::config::PathsConfig;
use crate::llm::LlmService;
use crate::maps::MapProvider;

/// Version stamped on every merged document
pub const SITE_CONFIG_VERSION: &str = "1.1";

/// Environment variable that overrides the site config location
pub const SITE_CONFIG_ENV: &str = "DASHBOARD_SITE_CONFIG";

/// Parsed site configuration (always a JSON object)
pub type SiteConfig = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum SiteConfigError {
    #[error("Failed to read site config '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to write site config '{path}': {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("Site config '{path}' is not valid JSON: {message}")]
    Parse { path: String, message: String },
    #[error("Site config must be a JSON object")]
    NotAnObject,
}

/// Default document served when no file exists yet
pub fn default_site_config() -> SiteConfig {
    let value = json!({
        "categories": [
            "产业概述", "政策环境", "市场规模", "重点企业",
            "技术趋势", "发展机遇", "挑战风险", "未来展望"
        ],
        "ai_integration_focus": [
            "智能制造", "数据分析", "自动化流程", "预测性维护",
            "供应链优化", "客户服务", "质量控制"
        ]
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Merge an update into an existing document.
///
/// `api_keys` is merged key by key so secrets absent from the update survive.
/// Every other top-level key of the update replaces the existing value.
pub fn merge(existing: &SiteConfig, update: &SiteConfig) -> SiteConfig {
    let mut merged = existing.clone();

    let mut api_keys = existing
        .get("api_keys")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    if let Some(update_keys) = update.get("api_keys").and_then(Value::as_object) {
        for (k, v) in update_keys {
            api_keys.insert(k.clone(), v.clone());
        }
    }
    if !api_keys.is_empty() {
        merged.insert("api_keys".to_string(), Value::Object(api_keys));
    }

    for (k, v) in update {
        if k == "api_keys" {
            continue;
        }
        merged.insert(k.clone(), v.clone());
    }

    merged.insert(
        "version".to_string(),
        Value::String(SITE_CONFIG_VERSION.to_string()),
    );
    merged
}

/// Mask a secret for display: first 4 characters followed by `****`
fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{}****", prefix)
}

/// File-backed site configuration
#[derive(Debug, Clone)]
pub struct SiteConfigStore {
    path: PathBuf,
}

impl SiteConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve the location from `DASHBOARD_SITE_CONFIG`, else `paths.site_config`
    pub fn from_paths(paths: &PathsConfig) -> Self {
        match std::env::var(SITE_CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::new(path),
            _ => Self::new(paths.site_config.clone()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, or the defaults when the file does not exist
    pub fn load(&self) -> Result<SiteConfig, SiteConfigError> {
        if !self.path.exists() {
            return Ok(default_site_config());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| SiteConfigError::Read {
            path: self.path.display().to_string(),
            source: e,
        })?;
        let value: Value = serde_json::from_str(&content).map_err(|e| SiteConfigError::Parse {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(SiteConfigError::NotAnObject),
        }
    }

    /// Merge `update` into the stored document and write it back.
    ///
    /// An unreadable existing file is treated as empty.
    pub fn save_merged(&self, update: &SiteConfig) -> Result<Value, SiteConfigError> {
        let existing = if self.path.exists() {
            match self.load() {
                Ok(existing) => existing,
                Err(e) => {
                    tracing::warn!("Ignoring unreadable site config: {}", e);
                    Map::new()
                }
            }
        } else {
            Map::new()
        };

        let merged = merge(&existing, update);
        let content = serde_json::to_string_pretty(&Value::Object(merged)).map_err(|e| {
            SiteConfigError::Parse {
                path: self.path.display().to_string(),
                message: e.to_string(),
            }
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SiteConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(&self.path, content).map_err(|e| SiteConfigError::Write {
            path: self.path.display().to_string(),
            source: e,
        })?;

        tracing::info!("Site config saved to {}", self.path.display());
        Ok(json!({ "success": true, "version": SITE_CONFIG_VERSION }))
    }

    /// Look up an `api_keys` entry, treating empty strings as absent
    fn api_key(config: &SiteConfig, name: &str) -> Option<String> {
        config
            .get("api_keys")
            .and_then(|keys| keys.get(name))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
    }

    fn env_key(name: &str) -> Option<String> {
        std::env::var(name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// API key for an LLM service
    pub fn resolve_llm_key(&self, service: LlmService) -> Option<String> {
        let config = self.load().unwrap_or_default();
        match service {
            LlmService::Kimi => Self::api_key(&config, "kimi")
                .or_else(|| Self::api_key(&config, "kimi_api_key"))
                .or_else(|| Self::env_key("KIMI_API_KEY"))
                .or_else(|| Self::env_key("MOONSHOT_API_KEY")),
            LlmService::Gemini => Self::api_key(&config, "google_gemini")
                .or_else(|| Self::api_key(&config, "google_gemini_api_key"))
                .or_else(|| Self::env_key("GOOGLE_GEMINI_API_KEY")),
            LlmService::Doubao => Self::api_key(&config, "doubao_api_key"),
        }
    }

    /// API key for a map provider
    pub fn resolve_map_key(&self, provider: MapProvider) -> Option<String> {
        let config = self.load().unwrap_or_default();
        match provider {
            MapProvider::Baidu => Self::api_key(&config, "baidu_map"),
            MapProvider::Google => Self::api_key(&config, "google_map"),
        }
    }

    /// `google_maps.map_id`, used by the front end's vector maps
    pub fn google_map_id(&self) -> Option<String> {
        self.load()
            .ok()?
            .get("google_maps")?
            .get("map_id")?
            .as_str()
            .filter(|id| !id.is_empty())
            .map(String::from)
    }

    /// Services with a resolvable key, in fallback order
    pub fn available_llm_services(&self) -> Vec<LlmService> {
        LlmService::ALL
            .into_iter()
            .filter(|s| self.resolve_llm_key(*s).is_some())
            .collect()
    }

    /// Stored document with every API key masked
    pub fn redacted(&self) -> Result<SiteConfig, SiteConfigError> {
        let mut config = self.load()?;
        if let Some(Value::Object(keys)) = config.get_mut("api_keys") {
            for value in keys.values_mut() {
                if let Value::String(secret) = value {
                    if !secret.is_empty() {
                        *value = Value::String(mask_secret(secret));
                    }
                }
            }
        }
        Ok(config)
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn keys_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
        prop::collection::vec(("[a-z_]{1,10}", "[A-Za-z0-9]{0,16}"), 0..6)
    }

    proptest! {
        /// Keys not named in an update keep their original value.
        #[test]
        fn merge_never_drops_existing_api_keys(
            existing_keys in keys_strategy(),
            update_keys in keys_strategy(),
            extra in "x[a-z]{1,7}",
        ) {
            let mut existing = Map::new();
            existing.insert(
                "api_keys".into(),
                Value::Object(existing_keys.iter().map(|(k, v)| (k.clone(), json!(v))).collect()),
            );
            let mut update = Map::new();
            update.insert(
                "api_keys".into(),
                Value::Object(update_keys.iter().map(|(k, v)| (k.clone(), json!(v))).collect()),
            );
            update.insert(extra.clone(), json!(true));

            let merged = merge(&existing, &update);
            let merged_keys = merged
                .get("api_keys")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let updated: std::collections::HashMap<_, _> = update_keys.into_iter().collect();
            let original: std::collections::HashMap<_, _> = existing_keys.into_iter().collect();

            for (k, v) in &original {
                let expected = updated.get(k).unwrap_or(v);
                prop_assert_eq!(merged_keys.get(k), Some(&json!(expected)));
            }
            prop_assert_eq!(&merged["version"], &json!("1.1"));
            prop_assert_eq!(&merged[&extra], &json!(true));
        }
    }
}
