//! Google Places text search, limited to the geocoded bounds of the region

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{loose_f64, loose_string, MapProvider, PageCursor, PoiError, PoiSearcher};
use crate::models::{Location, Poi, PoiPage};

/// Rectangular region from the geocoder
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub northeast: Location,
    pub southwest: Location,
}

impl Bounds {
    pub fn contains(&self, point: &Location) -> bool {
        (self.southwest.lat..=self.northeast.lat).contains(&point.lat)
            && (self.southwest.lng..=self.northeast.lng).contains(&point.lng)
    }

    /// `circle:{radius}@{lat},{lng}` bias, radius clamped to 5-50 km
    pub fn location_bias(&self) -> String {
        let center_lat = (self.northeast.lat + self.southwest.lat) / 2.0;
        let center_lng = (self.northeast.lng + self.southwest.lng) / 2.0;
        let span = (self.northeast.lat - self.southwest.lat)
            .abs()
            .max((self.northeast.lng - self.southwest.lng).abs());
        let radius = ((span * 111_000.0) as i64).clamp(5_000, 50_000);
        format!("circle:{}@{},{}", radius, center_lat, center_lng)
    }
}

/// Related search terms for common industry keywords
pub fn expand_keyword(keyword: &str) -> Vec<String> {
    let extra: &[&str] = match keyword {
        "人工智能" => &["AI", "artificial intelligence", "machine learning", "智能科技", "算法", "大数据"],
        "文旅" => &["tourism", "culture", "heritage", "museum", "attraction"],
        "制造" => &["manufacturing", "factory", "industrial", "manufacturer"],
        "高校" => &["university", "college", "institute"],
        "科研院所" => &["research", "laboratory", "academy", "R&D"],
        _ => &[],
    };
    std::iter::once(keyword)
        .chain(extra.iter().copied())
        .map(str::to_string)
        .collect()
}

pub struct GooglePoiSearcher {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    /// Google rejects a `next_page_token` used immediately after it is issued
    page_token_delay: Duration,
    expand_keywords: bool,
}

impl GooglePoiSearcher {
    pub fn new(http: reqwest::Client, api_key: String, base_url: &str) -> Self {
        Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_token_delay: Duration::from_secs(2),
            expand_keywords: true,
        }
    }

    pub fn with_page_token_delay(mut self, delay: Duration) -> Self {
        self.page_token_delay = delay;
        self
    }

    pub fn with_keyword_expansion(mut self, enabled: bool) -> Self {
        self.expand_keywords = enabled;
        self
    }

    async fn get_json(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, PoiError> {
        let body = self
            .http
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body)
    }

    /// Bounds of the first geocoder result whose address mentions `region`
    pub async fn region_bounds(&self, region: &str) -> Result<Option<Bounds>, PoiError> {
        let body = self.get_json("geocode/json", &[("address", region)]).await?;
        if body.get("status").and_then(Value::as_str) != Some("OK") {
            return Ok(None);
        }

        let results = body.get("results").and_then(Value::as_array).cloned().unwrap_or_default();
        for result in results {
            let address = result.get("formatted_address").and_then(Value::as_str).unwrap_or_default();
            if !address.contains(region) {
                continue;
            }
            let bounds = result.get("geometry").and_then(|g| g.get("bounds"));
            if let Some(bounds) = bounds.and_then(parse_bounds) {
                return Ok(Some(bounds));
            }
        }
        Ok(None)
    }

    async fn text_search(
        &self,
        query: &str,
        tag: &str,
        bounds: Option<&Bounds>,
        page: &PageCursor,
    ) -> Result<PoiPage, PoiError> {
        let bias = bounds.map(Bounds::location_bias);
        let mut params: Vec<(&str, &str)> = vec![("query", query)];
        if let Some(bias) = bias.as_deref() {
            params.push(("locationbias", bias));
        }
        if let Some(token) = page.token.as_deref() {
            params.push(("pagetoken", token));
        }

        let body = self.get_json("place/textsearch/json", &params).await?;
        let status = body.get("status").and_then(Value::as_str).unwrap_or("UNKNOWN");
        match status {
            "OK" => {}
            "ZERO_RESULTS" => {
                return Ok(PoiPage {
                    page_num: page.page_num,
                    ..PoiPage::default()
                })
            }
            other => {
                return Err(PoiError::Provider {
                    provider: MapProvider::Google,
                    status: other.to_string(),
                    message: body
                        .get("error_message")
                        .and_then(Value::as_str)
                        .unwrap_or(other)
                        .to_string(),
                })
            }
        }

        let raw = body.get("results").and_then(Value::as_array).cloned().unwrap_or_default();
        let page_size = raw.len() as u32;
        let results: Vec<Poi> = raw
            .iter()
            .filter_map(|place| to_poi(place, tag))
            .filter(|(_, wgs)| bounds.map_or(true, |b| b.contains(wgs)))
            .map(|(poi, _)| poi)
            .collect();

        Ok(PoiPage {
            total: results.len(),
            results,
            page_num: page.page_num,
            page_size,
            next_page_token: body
                .get("next_page_token")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

fn parse_bounds(value: &Value) -> Option<Bounds> {
    let corner = |name: &str| -> Option<Location> {
        let c = value.get(name)?;
        Some(Location {
            lng: c.get("lng")?.as_f64()?,
            lat: c.get("lat")?.as_f64()?,
        })
    };
    Some(Bounds {
        northeast: corner("northeast")?,
        southwest: corner("southwest")?,
    })
}

/// POI in GCJ-02 plus the original WGS-84 point used for bounds checks
fn to_poi(place: &Value, tag: &str) -> Option<(Poi, Location)> {
    let loc = place.get("geometry")?.get("location")?;
    let wgs = Location {
        lng: loc.get("lng")?.as_f64()?,
        lat: loc.get("lat")?.as_f64()?,
    };
    let place_id = place.get("place_id").and_then(Value::as_str).unwrap_or_default();

    let poi = Poi {
        name: place.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        address: place
            .get("formatted_address")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        poi_type: place
            .get("types")
            .and_then(|t| t.get(0))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        location: wgs.to_gcj02(),
        distance: None,
        tag: tag.to_string(),
        tel: loose_string(place.get("formatted_phone_number")),
        detail_url: Some(format!("https://www.google.com/maps/place/?q=place_id:{}", place_id)),
        price: loose_string(place.get("price_level")),
        overall_rating: loose_f64(place.get("rating")),
        provider: MapProvider::Google.as_str().to_string(),
    };
    Some((poi, wgs))
}

#[async_trait]
impl PoiSearcher for GooglePoiSearcher {
    fn provider(&self) -> MapProvider {
        MapProvider::Google
    }

    async fn search(&self, keyword: &str, region: &str, page: &PageCursor) -> Result<PoiPage, PoiError> {
        let bounds = self.region_bounds(region).await?;
        let query = format!("{} in {}", keyword, region);
        self.text_search(&query, keyword, bounds.as_ref(), page).await
    }

    async fn batch_search(
        &self,
        keywords: &[String],
        region: &str,
        max_results: usize,
    ) -> Result<Vec<Poi>, PoiError> {
        let bounds = match self.region_bounds(region).await {
            Ok(bounds) => bounds,
            Err(e) => {
                tracing::warn!("Geocoding {} failed, searching without bounds: {}", region, e);
                None
            }
        };
        if bounds.is_none() {
            tracing::info!("No bounds for {}, results are not filtered", region);
        }

        let mut all: Vec<Poi> = Vec::new();
        let mut first_error = None;
        let mut any_ok = false;

        'keywords: for keyword in keywords {
            let terms = if self.expand_keywords {
                expand_keyword(keyword)
            } else {
                vec![keyword.clone()]
            };

            for term in terms {
                let query = format!("{} in {}", term, region);
                let mut cursor = PageCursor::default();
                loop {
                    if all.len() >= max_results {
                        break 'keywords;
                    }
                    match self.text_search(&query, keyword, bounds.as_ref(), &cursor).await {
                        Ok(page) => {
                            any_ok = true;
                            all.extend(page.results);
                            match page.next_page_token {
                                Some(token) => {
                                    cursor.page_num += 1;
                                    cursor.token = Some(token);
                                    if !self.page_token_delay.is_zero() {
                                        tokio::time::sleep(self.page_token_delay).await;
                                    }
                                }
                                None => break,
                            }
                        }
                        Err(e) => {
                            tracing::error!("Google Places search failed for '{}': {}", query, e);
                            first_error.get_or_insert(e);
                            break;
                        }
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
        tracing::info!("Google POI search in {}: {} results", region, all.len());
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn place(name: &str, lat: f64, lng: f64) -> Value {
        json!({
            "name": name,
            "place_id": format!("id-{}", name),
            "formatted_address": "上海市浦东新区",
            "types": ["point_of_interest"],
            "rating": 4.2,
            "geometry": {"location": {"lat": lat, "lng": lng}}
        })
    }

    async fn mount_geocode(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/geocode/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "results": [{
                    "formatted_address": "中国上海市",
                    "geometry": {
                        "location": {"lat": 31.2, "lng": 121.5},
                        "bounds": {
                            "northeast": {"lat": 31.9, "lng": 122.2},
                            "southwest": {"lat": 30.7, "lng": 120.9}
                        }
                    }
                }]
            })))
            .mount(server)
            .await;
    }

    fn searcher(server: &MockServer) -> GooglePoiSearcher {
        GooglePoiSearcher::new(reqwest::Client::new(), "gkey".to_string(), &server.uri())
            .with_page_token_delay(Duration::ZERO)
            .with_keyword_expansion(false)
    }

    #[test]
    fn test_bounds_contains_and_bias() {
        let bounds = Bounds {
            northeast: Location { lng: 122.2, lat: 31.9 },
            southwest: Location { lng: 120.9, lat: 30.7 },
        };
        assert!(bounds.contains(&Location { lng: 121.5, lat: 31.2 }));
        assert!(!bounds.contains(&Location { lng: 116.4, lat: 39.9 }));
        assert!(bounds.location_bias().starts_with("circle:50000@"));
    }

    #[test]
    fn test_expand_keyword() {
        assert_eq!(expand_keyword("咖啡"), vec!["咖啡"]);
        let expanded = expand_keyword("人工智能");
        assert_eq!(expanded[0], "人工智能");
        assert!(expanded.contains(&"AI".to_string()));
    }

    #[tokio::test]
    async fn test_search_filters_by_bounds_and_converts() {
        let server = MockServer::start().await;
        mount_geocode(&server).await;
        Mock::given(method("GET"))
            .and(path("/place/textsearch/json"))
            .and(query_param("query", "芯片 in 上海"))
            .and(query_param("key", "gkey"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "results": [place("inside", 31.2, 121.5), place("beijing", 39.9, 116.4)]
            })))
            .mount(&server)
            .await;

        let page = searcher(&server)
            .search("芯片", "上海", &PageCursor::default())
            .await
            .unwrap();
        assert_eq!(page.results.len(), 1);
        let poi = &page.results[0];
        assert_eq!(poi.name, "inside");
        assert_eq!(poi.tag, "芯片");
        assert_eq!(poi.detail_url.as_deref(), Some("https://www.google.com/maps/place/?q=place_id:id-inside"));
        assert!(poi.location.lng > 121.5);
    }

    #[tokio::test]
    async fn test_batch_follows_page_token() {
        let server = MockServer::start().await;
        mount_geocode(&server).await;
        Mock::given(method("GET"))
            .and(path("/place/textsearch/json"))
            .and(query_param("pagetoken", "next-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "results": [place("second", 31.3, 121.4)]
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/place/textsearch/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "results": [place("first", 31.2, 121.5)],
                "next_page_token": "next-1"
            })))
            .with_priority(2)
            .mount(&server)
            .await;

        let results = searcher(&server)
            .batch_search(&["芯片".to_string()], "上海", 100)
            .await
            .unwrap();
        let names: Vec<&str> = results.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_request_denied_is_an_error() {
        let server = MockServer::start().await;
        mount_geocode(&server).await;
        Mock::given(method("GET"))
            .and(path("/place/textsearch/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "REQUEST_DENIED",
                "error_message": "The provided API key is invalid."
            })))
            .mount(&server)
            .await;

        let err = searcher(&server)
            .batch_search(&["芯片".to_string()], "上海", 10)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("REQUEST_DENIED"));
    }

    #[tokio::test]
    async fn test_zero_results_is_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geocode/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ZERO_RESULTS"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/place/textsearch/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ZERO_RESULTS"})))
            .mount(&server)
            .await;

        let results = searcher(&server)
            .batch_search(&["芯片".to_string()], "火星", 10)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
