//! Map provider integration
//!
//! POI search against Baidu Place and Google Places, plus helpers that turn
//! the results into statistics and visualisation layers.

pub mod baidu;
pub mod coords;
pub mod google;
pub mod processor;
pub mod upload;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::MemoryCache;
use crate::config::MapsConfig;
use crate::models::{Poi, PoiPage};

pub use baidu::BaiduPoiSearcher;
pub use google::GooglePoiSearcher;

/// How long batch search results stay cached
const SEARCH_CACHE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapProvider {
    Baidu,
    Google,
}

impl MapProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapProvider::Baidu => "baidu",
            MapProvider::Google => "google",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "baidu" => Some(MapProvider::Baidu),
            "google" => Some(MapProvider::Google),
            _ => None,
        }
    }
}

impl fmt::Display for MapProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoiError {
    #[error("{0} map API key is not configured")]
    MissingKey(MapProvider),

    #[error("map request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error ({status}): {message}")]
    Provider {
        provider: MapProvider,
        status: String,
        message: String,
    },
}

/// Position in a provider's result list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageCursor {
    pub page_num: u32,
    /// Continuation token for providers that page by token
    pub token: Option<String>,
}

#[async_trait]
pub trait PoiSearcher: Send + Sync {
    fn provider(&self) -> MapProvider;

    /// One page of results for a single keyword
    async fn search(&self, keyword: &str, region: &str, page: &PageCursor) -> Result<PoiPage, PoiError>;

    /// Results for several keywords, paging until `max_results` or the
    /// provider runs out. A keyword that fails is skipped; the error is only
    /// returned when every keyword failed.
    async fn batch_search(
        &self,
        keywords: &[String],
        region: &str,
        max_results: usize,
    ) -> Result<Vec<Poi>, PoiError>;
}

pub fn create_searcher(
    provider: MapProvider,
    api_key: String,
    config: &MapsConfig,
) -> Result<Arc<dyn PoiSearcher>, PoiError> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let searcher: Arc<dyn PoiSearcher> = match provider {
        MapProvider::Baidu => Arc::new(BaiduPoiSearcher::new(http, api_key, &config.baidu_base_url)),
        MapProvider::Google => Arc::new(GooglePoiSearcher::new(http, api_key, &config.google_base_url)),
    };
    Ok(searcher)
}

/// Keywords are JSON-encoded so `["a,b"]` and `["a","b"]` get different keys
fn cache_key(provider: MapProvider, region: &str, keywords: &[String], max_results: usize) -> String {
    let keywords = serde_json::to_string(keywords).unwrap_or_default();
    format!("poi:{}:{}:{}:{}", provider, region, keywords, max_results)
}

/// `batch_search` through the shared cache
pub async fn cached_batch_search(
    cache: &MemoryCache,
    searcher: &dyn PoiSearcher,
    keywords: &[String],
    region: &str,
    max_results: usize,
) -> Result<Vec<Poi>, PoiError> {
    let key = cache_key(searcher.provider(), region, keywords, max_results);

    match cache.get::<Vec<Poi>>(&key).await {
        Ok(Some(hit)) => {
            tracing::debug!("POI cache hit: {}", key);
            return Ok(hit);
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!("Dropping unreadable POI cache entry {}: {:#}", key, e);
            cache.remove(&key).await;
        }
    }

    let results = searcher.batch_search(keywords, region, max_results).await?;
    if let Err(e) = cache.set(&key, &results, SEARCH_CACHE_TTL).await {
        tracing::warn!("POI cache write failed for {}: {}", key, e);
    }
    Ok(results)
}

/// Number as f64 whether the provider sent it as a number or a string
pub(crate) fn loose_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Non-empty string, or a number rendered as text
pub(crate) fn loose_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Location;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSearcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PoiSearcher for CountingSearcher {
        fn provider(&self) -> MapProvider {
            MapProvider::Baidu
        }

        async fn search(&self, _: &str, _: &str, _: &PageCursor) -> Result<PoiPage, PoiError> {
            Ok(PoiPage::default())
        }

        async fn batch_search(&self, keywords: &[String], _: &str, _: usize) -> Result<Vec<Poi>, PoiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(keywords
                .iter()
                .map(|k| Poi {
                    name: format!("{}园区", k),
                    address: String::new(),
                    poi_type: String::new(),
                    location: Location { lng: 121.0, lat: 31.0 },
                    distance: None,
                    tag: k.clone(),
                    tel: None,
                    detail_url: None,
                    price: None,
                    overall_rating: None,
                    provider: "baidu".into(),
                })
                .collect())
        }
    }

    fn cache() -> MemoryCache {
        MemoryCache::with_capacity_and_ttl(100, Duration::from_secs(60))
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!(MapProvider::from_str("Baidu"), Some(MapProvider::Baidu));
        assert_eq!(MapProvider::from_str("google"), Some(MapProvider::Google));
        assert_eq!(MapProvider::from_str("bing"), None);
        assert_eq!(MapProvider::Google.to_string(), "google");
    }

    #[test]
    fn test_loose_values() {
        assert_eq!(loose_f64(Some(&json!("4.5"))), Some(4.5));
        assert_eq!(loose_f64(Some(&json!(3))), Some(3.0));
        assert_eq!(loose_f64(Some(&json!(""))), None);
        assert_eq!(loose_string(Some(&json!(2))).as_deref(), Some("2"));
        assert_eq!(loose_string(Some(&json!(""))), None);
        assert_eq!(loose_string(None), None);
    }

    #[tokio::test]
    async fn test_cached_batch_search_hits_provider_once() {
        let cache = cache();
        let searcher = CountingSearcher {
            calls: AtomicUsize::new(0),
        };
        let keywords = vec!["芯片".to_string()];

        let first = cached_batch_search(&cache, &searcher, &keywords, "上海", 100).await.unwrap();
        let second = cached_batch_search(&cache, &searcher, &keywords, "上海", 100).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(searcher.calls.load(Ordering::SeqCst), 1);

        cached_batch_search(&cache, &searcher, &keywords, "北京", 100).await.unwrap();
        assert_eq!(searcher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_key_keeps_keyword_boundaries() {
        let joined = cache_key(MapProvider::Baidu, "上海", &["a,b".to_string()], 100);
        let split = cache_key(MapProvider::Baidu, "上海", &["a".to_string(), "b".to_string()], 100);
        assert_ne!(joined, split);
    }

    #[tokio::test]
    async fn test_comma_keyword_does_not_share_cached_results() {
        let cache = cache();
        let searcher = CountingSearcher {
            calls: AtomicUsize::new(0),
        };

        let split = vec!["a".to_string(), "b".to_string()];
        let joined = vec!["a,b".to_string()];
        let first = cached_batch_search(&cache, &searcher, &split, "上海", 100).await.unwrap();
        let second = cached_batch_search(&cache, &searcher, &joined, "上海", 100).await.unwrap();

        assert_eq!(searcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].tag, "a,b");
    }
}
