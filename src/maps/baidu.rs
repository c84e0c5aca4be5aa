//! Baidu Place API v2 search

use async_trait::async_trait;
use serde_json::Value;

use super::{loose_f64, loose_string, MapProvider, PageCursor, PoiError, PoiSearcher};
use crate::models::{Location, Poi, PoiPage};

/// Largest page the Place API accepts
pub const MAX_PAGE_SIZE: u32 = 20;

pub struct BaiduPoiSearcher {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    page_size: u32,
}

impl BaiduPoiSearcher {
    pub fn new(http: reqwest::Client, api_key: String, base_url: &str) -> Self {
        Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }
}

fn to_poi(raw: &Value, keyword: &str) -> Option<Poi> {
    let location = raw.get("location")?;
    let lng = location.get("lng").and_then(Value::as_f64)?;
    let lat = location.get("lat").and_then(Value::as_f64)?;
    let detail = raw.get("detail_info");

    Some(Poi {
        name: raw.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        address: raw.get("address").and_then(Value::as_str).unwrap_or_default().to_string(),
        poi_type: detail
            .and_then(|d| d.get("type"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        location: Location { lng, lat },
        distance: loose_f64(detail.and_then(|d| d.get("distance"))),
        tag: keyword.to_string(),
        tel: loose_string(raw.get("telephone")),
        detail_url: loose_string(detail.and_then(|d| d.get("detail_url"))),
        price: loose_string(detail.and_then(|d| d.get("price"))),
        overall_rating: loose_f64(detail.and_then(|d| d.get("overall_rating"))),
        provider: MapProvider::Baidu.as_str().to_string(),
    })
}

#[async_trait]
impl PoiSearcher for BaiduPoiSearcher {
    fn provider(&self) -> MapProvider {
        MapProvider::Baidu
    }

    async fn search(&self, keyword: &str, region: &str, page: &PageCursor) -> Result<PoiPage, PoiError> {
        let page_size = self.page_size.to_string();
        let page_num = page.page_num.to_string();
        let body: Value = self
            .http
            .get(format!("{}/place/v2/search", self.base_url))
            .query(&[
                ("query", keyword),
                ("region", region),
                ("output", "json"),
                ("scope", "2"),
                ("ak", self.api_key.as_str()),
                ("page_size", page_size.as_str()),
                ("page_num", page_num.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let status = body.get("status").and_then(Value::as_i64).unwrap_or(-1);
        if status != 0 {
            return Err(PoiError::Provider {
                provider: MapProvider::Baidu,
                status: status.to_string(),
                message: body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
                    .to_string(),
            });
        }

        let results: Vec<Poi> = body
            .get("results")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|r| to_poi(r, keyword)).collect())
            .unwrap_or_default();
        let total = body
            .get("total")
            .and_then(Value::as_u64)
            .map(|t| t as usize)
            .unwrap_or(results.len());

        Ok(PoiPage {
            results,
            total,
            page_num: page.page_num,
            page_size: self.page_size,
            next_page_token: None,
        })
    }

    async fn batch_search(
        &self,
        keywords: &[String],
        region: &str,
        max_results: usize,
    ) -> Result<Vec<Poi>, PoiError> {
        let mut all = Vec::new();
        let mut first_error = None;
        let mut any_ok = false;

        'keywords: for keyword in keywords {
            let mut cursor = PageCursor::default();
            loop {
                if all.len() >= max_results {
                    break 'keywords;
                }
                match self.search(keyword, region, &cursor).await {
                    Ok(page) => {
                        any_ok = true;
                        let fetched = page.results.len();
                        all.extend(page.results);
                        if fetched < self.page_size as usize {
                            break;
                        }
                        cursor.page_num += 1;
                    }
                    Err(e) => {
                        tracing::error!("Baidu POI search failed for '{}': {}", keyword, e);
                        first_error.get_or_insert(e);
                        break;
                    }
                }
            }
        }

        if !any_ok {
            if let Some(e) = first_error {
                return Err(e);
            }
        }
        all.truncate(max_results);
        tracing::info!("Baidu POI search in {}: {} results", region, all.len());
        Ok(all)
    }
}
