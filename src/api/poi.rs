//! POI search endpoint
//!
//! POST /api/poi-search - batch search a region for several keywords and
//! return the results with statistics, map layers and the JSON export path.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{AppState, Failure};
use crate::maps::processor::{self, ClusterPoint, HeatPoint, PoiStatistics};
use crate::maps::{cached_batch_search, create_searcher, MapProvider};
use crate::models::Poi;

#[derive(Debug, Deserialize)]
pub struct PoiSearchRequest {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_provider")]
    pub provider: String,
}

fn default_provider() -> String {
    "google".to_string()
}

#[derive(Debug, Serialize)]
pub struct PageInfo {
    pub current: u32,
    pub size: usize,
    pub total: u32,
}

#[derive(Debug, Serialize)]
pub struct ExportPaths {
    pub json: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Visualization {
    pub heatmap_data: Vec<HeatPoint>,
    pub cluster_data: Vec<ClusterPoint>,
}

#[derive(Debug, Serialize)]
pub struct PoiSearchData {
    pub results: Vec<Poi>,
    pub total_count: usize,
    pub page_info: PageInfo,
    pub export_paths: ExportPaths,
    pub visualization: Visualization,
    pub statistics: PoiStatistics,
}

#[derive(Debug, Serialize)]
pub struct PoiSearchResponse {
    pub success: bool,
    pub data: PoiSearchData,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/poi-search", post(poi_search))
}

fn missing_key_message(provider: MapProvider) -> &'static str {
    match provider {
        MapProvider::Google => "Google地图API密钥未配置",
        MapProvider::Baidu => "百度地图API密钥未配置",
    }
}

/// POST /api/poi-search
async fn poi_search(
    State(state): State<AppState>,
    Json(request): Json<PoiSearchRequest>,
) -> Result<Json<PoiSearchResponse>, Failure> {
    let region = request.region.trim();
    if region.is_empty() {
        return Err(Failure::bad_request("请输入目标区域"));
    }
    let keywords: Vec<String> = request
        .keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect();
    if keywords.is_empty() {
        return Err(Failure::bad_request("请提供至少一个搜索标签"));
    }
    let provider = MapProvider::from_str(&request.provider).unwrap_or_else(|| {
        tracing::warn!("Unknown map provider {:?}, using google", request.provider);
        MapProvider::Google
    });

    let api_key = state
        .site_config
        .resolve_map_key(provider)
        .ok_or_else(|| Failure::internal(missing_key_message(provider)))?;
    let searcher = create_searcher(provider, api_key, &state.config.maps)
        .map_err(|e| Failure::internal(e.to_string()))?;

    tracing::info!("POI search: {} in {} via {}", keywords.join(","), region, provider);
    let results = cached_batch_search(
        &state.cache,
        searcher.as_ref(),
        &keywords,
        region,
        state.config.maps.max_results,
    )
    .await
    .map_err(|e| {
        tracing::error!("POI search failed: {}", e);
        Failure::internal(format!("搜索失败: {}", e))
    })?;

    let export_dir = state.config.paths.poi_export_dir();
    let export = {
        let results = results.clone();
        tokio::task::spawn_blocking(move || processor::export_json(&results, &export_dir)).await
    };
    let json_path = match export {
        Ok(Ok(path)) => Some(path.display().to_string()),
        Ok(Err(e)) => {
            tracing::warn!("POI export failed: {:#}", e);
            None
        }
        Err(e) => {
            tracing::warn!("POI export task failed: {}", e);
            None
        }
    };

    let data = PoiSearchData {
        total_count: results.len(),
        page_info: PageInfo {
            current: 1,
            size: results.len(),
            total: 1,
        },
        export_paths: ExportPaths { json: json_path },
        visualization: Visualization {
            heatmap_data: processor::heatmap(&results),
            cluster_data: processor::clusters(&results),
        },
        statistics: processor::statistics(&results),
        results,
    };
    Ok(Json(PoiSearchResponse { success: true, data }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{body_json, build_test_state, build_test_state_with, post_json};
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_validation_and_missing_key() {
        let (state, _dir) = build_test_state().await;
        let app = crate::api::build_router(state, "http://localhost");

        let response = app
            .clone()
            .oneshot(post_json("/api/poi-search", json!({"keywords": ["芯片"]})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "请输入目标区域");

        let response = app
            .clone()
            .oneshot(post_json("/api/poi-search", json!({"region": "上海", "keywords": [" "]})))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["error"], "请提供至少一个搜索标签");

        let response = app
            .oneshot(post_json("/api/poi-search", json!({"region": "上海", "keywords": ["芯片"]})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({"success": false, "error": "Google地图API密钥未配置"})
        );
    }

    #[tokio::test]
    async fn test_baidu_search_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/place/v2/search"))
            .and(query_param("query", "芯片"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 0,
                "total": 2,
                "results": [
                    {"name": "张江", "location": {"lat": 31.2, "lng": 121.6}, "address": "浦东",
                     "detail_info": {"type": "company"}},
                    {"name": "漕河泾", "location": {"lat": 31.17, "lng": 121.4}, "address": "徐汇",
                     "detail_info": {"type": "park"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let (state, _dir) = build_test_state_with(move |config| {
            config.maps.baidu_base_url = uri.clone();
        })
        .await;
        std::fs::write(
            state.site_config.path(),
            r#"{"api_keys": {"baidu_map": "ak-test"}}"#,
        )
        .unwrap();
        let app = crate::api::build_router(state, "http://localhost");

        let request = json!({"region": "上海", "keywords": ["芯片"], "provider": "baidu"});
        let body = body_json(app.clone().oneshot(post_json("/api/poi-search", request.clone())).await.unwrap()).await;
        assert_eq!(body["success"], true);
        let data = &body["data"];
        assert_eq!(data["total_count"], 2);
        assert_eq!(data["page_info"], json!({"current": 1, "size": 2, "total": 1}));
        assert_eq!(data["statistics"]["type_distribution"]["company"], 1);
        assert_eq!(data["visualization"]["heatmap_data"].as_array().unwrap().len(), 2);
        assert_eq!(data["visualization"]["cluster_data"][1]["name"], "漕河泾");
        let export = data["export_paths"]["json"].as_str().unwrap();
        assert!(std::path::Path::new(export).is_file());

        // Second identical search is answered from the cache
        let body = body_json(app.oneshot(post_json("/api/poi-search", request)).await.unwrap()).await;
        assert_eq!(body["data"]["total_count"], 2);
    }
}
