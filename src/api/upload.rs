//! Upload endpoints
//!
//! - POST /api/upload - analyse a `.txt`, `.md` or `.json` document as a report
//! - POST /api/poi-upload - parse a JSON or CSV file of POIs for the map
//!
//! Both take multipart/form-data with a single file field named "file".

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, Failure};
use crate::api::poi::{ExportPaths, Visualization};
use crate::maps::processor::{self, PoiStatistics};
use crate::maps::upload::{self as poi_upload, ParseSummary};
use crate::models::Poi;

/// Largest accepted upload
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub report_id: String,
    pub title: String,
    /// Page showing the analysed report
    pub redirect: String,
}

#[derive(Debug, Serialize)]
pub struct PoiUploadData {
    pub results: Vec<Poi>,
    pub total_count: usize,
    pub parse: ParseSummary,
    pub export_paths: ExportPaths,
    pub visualization: Visualization,
    pub statistics: PoiStatistics,
}

#[derive(Debug, Serialize)]
pub struct PoiUploadResponse {
    pub success: bool,
    pub data: PoiUploadData,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_report))
        .route("/poi-upload", post(upload_pois))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// First `file` field with a non-empty file name
async fn read_file_field(multipart: &mut Multipart) -> Result<Option<(String, Bytes)>, String> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Failed to read multipart: {}", e))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().trim().to_string();
        if filename.is_empty() {
            continue;
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| format!("Failed to read file: {}", e))?;
        return Ok(Some((filename, data)));
    }
    Ok(None)
}

/// POST /api/upload
async fn upload_report(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let (filename, data) = read_file_field(&mut multipart)
        .await
        .map_err(ApiError::validation_error)?
        .ok_or_else(|| ApiError::validation_error("没有选择文件"))?;

    let report = state.report_service.create_uploaded_report(&filename, &data).await?;
    Ok(Json(UploadResponse {
        success: true,
        redirect: format!("/report/{}", report.report_id),
        report_id: report.report_id,
        title: report.title,
    }))
}

/// POST /api/poi-upload
async fn upload_pois(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PoiUploadResponse>, Failure> {
    let (filename, data) = read_file_field(&mut multipart)
        .await
        .map_err(|e| Failure::bad_request(format!("上传失败: {}", e)))?
        .ok_or_else(|| Failure::bad_request("没有上传文件"))?;

    let records = poi_upload::parse_records(&filename, &data).map_err(|e| {
        tracing::warn!("Rejected POI upload {}: {}", filename, e);
        Failure::bad_request(e.to_string())
    })?;
    let (pois, parse) = poi_upload::validate(&records);
    tracing::info!(
        "POI upload {}: {} rows, {} valid, {} invalid",
        filename,
        parse.processed,
        parse.valid,
        parse.invalid
    );

    let upload_dir = state.config.paths.poi_upload_dir();
    let upload_id = poi_upload::upload_id();
    let export = {
        let pois = pois.clone();
        tokio::task::spawn_blocking(move || poi_upload::export_upload(&pois, &upload_dir, &upload_id)).await
    };
    let json_path = match export {
        Ok(Ok(path)) => path.display().to_string(),
        Ok(Err(e)) => {
            tracing::error!("POI upload export failed: {:#}", e);
            return Err(Failure::internal(format!("文件处理失败: {}", e)));
        }
        Err(e) => {
            tracing::error!("POI upload export task failed: {}", e);
            return Err(Failure::internal(format!("文件处理失败: {}", e)));
        }
    };

    let data = PoiUploadData {
        total_count: pois.len(),
        parse,
        export_paths: ExportPaths { json: Some(json_path) },
        visualization: Visualization {
            heatmap_data: processor::heatmap(&pois),
            cluster_data: processor::clusters(&pois),
        },
        statistics: processor::statistics(&pois),
        results: pois,
    };
    Ok(Json(PoiUploadResponse { success: true, data }))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{body_json, build_test_state, get, multipart_file};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_upload_report_then_view_dashboard() {
        let (state, _dir) = build_test_state().await;
        let app = crate::api::build_router(state, "http://localhost");

        let text = "苏州生物医药产业规模持续扩大，政府出台扶持政策支持企业研发创新。\n\
                    龙头企业建设数据分析平台，利用临床数据预测市场需求增长趋势。";
        let response = app
            .clone()
            .oneshot(multipart_file("/api/upload", "suzhou.txt", text.as_bytes()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        let report_id = body["report_id"].as_str().unwrap().to_string();
        assert_eq!(body["redirect"], format!("/report/{}", report_id));

        let listing = body_json(app.clone().oneshot(get("/api/reports")).await.unwrap()).await;
        assert_eq!(listing["reports"][0]["report_type"], "upload");
        assert_eq!(listing["reports"][0]["status"], "completed");

        let uri = format!("/api/report/{}/visualizations", report_id);
        let dashboard = body_json(app.clone().oneshot(get(&uri)).await.unwrap()).await;
        assert!(dashboard["charts"]["category_distribution"].is_object());
        assert!(dashboard["ai_opportunities"]["数据分析"].is_object());
        assert_eq!(dashboard["title"], "suzhou - AIPE区域产业分析小工作台");
    }

    #[tokio::test]
    async fn test_upload_rejects_unsupported_and_missing_files() {
        let (state, _dir) = build_test_state().await;
        let app = crate::api::build_router(state, "http://localhost");

        let response = app
            .clone()
            .oneshot(multipart_file("/api/upload", "deck.pdf", b"%PDF-1.7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");

        let response = app
            .oneshot(multipart_file("/api/upload", "", b"ignored"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["message"], "没有选择文件");
    }

    #[tokio::test]
    async fn test_poi_upload_csv() {
        let (state, _dir) = build_test_state().await;
        let app = crate::api::build_router(state, "http://localhost");

        let csv = "name,address,type,lng,lat\n\
                   张江实验室,浦东,科研,121.6,31.2\n\
                   漕河泾园区,徐汇,园区,121.4,31.17\n\
                   无坐标,闵行,园区,,\n";
        let response = app
            .clone()
            .oneshot(multipart_file("/api/poi-upload", "pois.csv", csv.as_bytes()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let data = &body["data"];
        assert_eq!(data["total_count"], 2);
        assert_eq!(data["parse"]["processed"], 3);
        assert_eq!(data["parse"]["invalid_breakdown"]["missing_or_unparsed"], 1);
        assert_eq!(data["parse"]["invalid_examples"][0]["name"], "无坐标");
        assert_eq!(data["results"][0]["provider"], "upload");
        assert_eq!(data["results"][0]["tag"], "科研");
        assert_eq!(data["statistics"]["type_distribution"]["园区"], 1);
        assert_eq!(data["visualization"]["cluster_data"].as_array().unwrap().len(), 2);
        let export = data["export_paths"]["json"].as_str().unwrap();
        assert!(std::path::Path::new(export).is_file());

        let response = app
            .oneshot(multipart_file("/api/poi-upload", "pois.xlsx", b"PK"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["success"], false);
    }
}
