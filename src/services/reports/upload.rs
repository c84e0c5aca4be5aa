//! Uploaded documents and artifact downloads
//!
//! An uploaded `.txt`, `.md` or `.json` document is kept under `uploads/`,
//! analysed, and recorded as a completed `upload` report whose artifact holds
//! the text and its analysis.

use std::path::Path;

use anyhow::Context;
use chrono::Local;
use serde_json::{json, Map, Value};

use super::{ReportService, ReportServiceError};
use crate::analysis::analyze_text;
use crate::models::{CreateReportInput, Report, ReportStatus, ReportType};

pub const ALLOWED_EXTENSIONS: &[&str] = &["txt", "md", "json"];

/// Lower-cased extension of `filename`, if it is one we accept
pub fn allowed_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?.to_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// File name safe to join onto the uploads directory
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches(['.', '_']).to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

/// Analysable text of an upload; JSON documents contribute their string values
pub fn extract_text(ext: &str, data: &[u8]) -> Result<String, ReportServiceError> {
    let raw = std::str::from_utf8(data)
        .map_err(|_| ReportServiceError::ValidationError("文件不是 UTF-8 编码".to_string()))?;
    let text = if ext == "json" {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| ReportServiceError::ValidationError(format!("JSON 文件格式无效: {}", e)))?;
        let mut parts = Vec::new();
        collect_strings(&value, &mut parts);
        parts.join("\n")
    } else {
        raw.to_string()
    };
    if text.trim().is_empty() {
        return Err(ReportServiceError::ValidationError("文件内容为空".to_string()));
    }
    Ok(text)
}

/// `{city}_{industry}_产业分析报告.json` with path separators removed
pub fn download_filename(report: &Report) -> String {
    let safe = |value: &str, fallback: &str| {
        let value = value.trim();
        if value.is_empty() {
            fallback.to_string()
        } else {
            value.replace(['/', '\\'], "_")
        }
    };
    format!(
        "{}_{}_产业分析报告.json",
        safe(&report.city, "unknown_city"),
        safe(&report.industry, "unknown_industry")
    )
}

impl ReportService {
    /// Store, analyse and record an uploaded document
    pub async fn create_uploaded_report(&self, filename: &str, data: &[u8]) -> Result<Report, ReportServiceError> {
        let ext = allowed_extension(filename).ok_or_else(|| {
            ReportServiceError::ValidationError("不支持的文件格式。请上传 .txt, .md 或 .json 文件".to_string())
        })?;
        let text = extract_text(&ext, data)?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let report_id = format!("upload_{}_{}", timestamp, &suffix[..8]);

        tokio::fs::create_dir_all(&self.uploads_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.uploads_dir.display()))?;
        let saved = self
            .uploads_dir
            .join(format!("{}_{}", timestamp, sanitize_filename(filename)));
        tokio::fs::write(&saved, data)
            .await
            .with_context(|| format!("Failed to save upload {}", saved.display()))?;

        let mut metadata = Map::new();
        metadata.insert("source_file".into(), json!(filename));
        metadata.insert("upload_path".into(), json!(saved.to_string_lossy()));
        metadata.insert("report_id".into(), json!(report_id));
        let analysis = analyze_text(&text, metadata);

        let title = format!("上传文档分析 - {}", filename);
        let document = json!({
            "report_id": report_id,
            "title": title,
            "source_file": filename,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "full_content": text,
            "analysis": analysis,
        });
        tokio::fs::create_dir_all(&self.upload_output_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.upload_output_dir.display()))?;
        let artifact = self.upload_output_dir.join(format!("{}_analysis.json", report_id));
        let json = serde_json::to_string_pretty(&document).context("Failed to serialise upload analysis")?;
        tokio::fs::write(&artifact, json)
            .await
            .with_context(|| format!("Failed to write {}", artifact.display()))?;

        let input = CreateReportInput {
            report_id: report_id.clone(),
            title,
            city: String::new(),
            industry: String::new(),
            report_type: ReportType::Upload,
            file_path: String::new(),
            status: ReportStatus::Processing,
        };
        self.repo.create(&input).await?;
        let report = self.mark_completed(&report_id, &artifact).await?;
        tracing::info!("Analysed upload {} as report {}", filename, report_id);
        Ok(report)
    }

    /// Download name and raw bytes of a report's JSON artifact
    pub async fn report_json(&self, report_id: &str) -> Result<(String, Vec<u8>), ReportServiceError> {
        let report = self.get(report_id).await?;
        let path = self
            .resolve_report_file(&report)
            .ok_or_else(|| ReportServiceError::NotFound(format!("artifact for {}", report_id)))?;
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok((download_filename(&report), bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::reports::tests::setup_service;

    #[test]
    fn test_allowed_extension() {
        assert_eq!(allowed_extension("报告.MD").as_deref(), Some("md"));
        assert_eq!(allowed_extension("data.json").as_deref(), Some("json"));
        assert!(allowed_extension("slides.pdf").is_none());
        assert!(allowed_extension("noext").is_none());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\docs\\上海 报告.txt"), "上海_报告.txt");
        assert_eq!(sanitize_filename("..."), "upload");
    }

    #[test]
    fn test_extract_text() {
        let text = extract_text("json", r#"{"title": "芯片", "sections": [{"body": "设计领先"}, 3]}"#.as_bytes())
            .unwrap();
        assert_eq!(text, "芯片\n设计领先");
        assert!(matches!(
            extract_text("json", b"{not json"),
            Err(ReportServiceError::ValidationError(_))
        ));
        assert!(matches!(
            extract_text("txt", b"  \n "),
            Err(ReportServiceError::ValidationError(_))
        ));
        assert!(matches!(
            extract_text("txt", &[0xff, 0xfe, 0x00]),
            Err(ReportServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_uploaded_report_is_completed_with_analysis() {
        let (service, dir) = setup_service().await;
        let body = "上海集成电路产业规模持续增长，政府出台多项扶持政策支持企业研发创新。\n\
                    龙头企业加快智能制造升级，生产设备自动化水平显著提升。";
        let report = service
            .create_uploaded_report("上海芯片.md", body.as_bytes())
            .await
            .unwrap();
        assert!(report.report_id.starts_with("upload_"));
        assert_eq!(report.report_type, ReportType::Upload);
        assert_eq!(report.status, ReportStatus::Completed);
        assert!(report.completed_at.is_some());
        assert_eq!(report.title, "上传文档分析 - 上海芯片.md");

        let saved: Vec<_> = std::fs::read_dir(dir.path().join("uploads")).unwrap().collect();
        assert_eq!(saved.len(), 1);

        let doc = service.load_report_document(&report.report_id).await.unwrap();
        assert_eq!(doc["full_content"], body);
        assert!(doc["analysis"]["categories"]["政策环境"]["relevance_score"].as_f64().unwrap() > 0.0);
        assert!(doc["analysis"]["ai_opportunities"]["智能制造"].is_object());

        let hits = service.find_source(&report.report_id, "政策").await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_uploads_leave_no_report() {
        let (service, _dir) = setup_service().await;
        assert!(matches!(
            service.create_uploaded_report("deck.pdf", b"%PDF").await,
            Err(ReportServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.create_uploaded_report("empty.txt", b"").await,
            Err(ReportServiceError::ValidationError(_))
        ));
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_report_json_download() {
        let (service, _dir) = setup_service().await;
        let report = service.create_llm_report("上海", "芯片/半导体", None).await.unwrap();
        assert!(matches!(
            service.report_json(&report.report_id).await,
            Err(ReportServiceError::NotFound(_))
        ));

        service
            .write_llm_artifact(&report.report_id, &json!({"full_content": "内容"}))
            .await
            .unwrap();
        let (name, bytes) = service.report_json(&report.report_id).await.unwrap();
        assert_eq!(name, "上海_芯片_半导体_产业分析报告.json");
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["full_content"], "内容");

        let upload = service.create_uploaded_report("notes.txt", "文本内容".as_bytes()).await.unwrap();
        let (name, _) = service.report_json(&upload.report_id).await.unwrap();
        assert_eq!(name, "unknown_city_unknown_industry_产业分析报告.json");
    }
}
