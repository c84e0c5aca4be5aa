//! Report service
//!
//! Owns the report lifecycle (create, status transitions, listing) and the
//! JSON artifacts that hold report content on disk.

pub mod repair;
pub mod upload;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use serde_json::Value;

use crate::config::PathsConfig;
use crate::db::repositories::ReportRepository;
use crate::models::{CreateReportInput, Report, ReportStatus, ReportSummary, ReportType};

pub use repair::{MonitorReport, RepairSummary};

/// Most sentences returned by a source lookup
const MAX_SOURCE_MATCHES: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum ReportServiceError {
    #[error("Report not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Report {report_id} cannot move from {from} to {to}")]
    InvalidTransition {
        report_id: String,
        from: ReportStatus,
        to: ReportStatus,
    },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// `llm_report_{YYYYmmdd_HHMMSS}_{8 hex}`
pub fn generate_report_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "llm_report_{}_{}",
        Local::now().format("%Y%m%d_%H%M%S"),
        &suffix[..8]
    )
}

/// Sentences of `content` that mention `query`, case-insensitively
pub fn matching_sentences(content: &str, query: &str) -> Vec<String> {
    let needle = query.to_lowercase();
    content
        .split(['。', '.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.to_lowercase().contains(&needle))
        .take(MAX_SOURCE_MATCHES)
        .map(String::from)
        .collect()
}

pub struct ReportService {
    repo: Arc<dyn ReportRepository>,
    reports_dir: PathBuf,
    uploads_dir: PathBuf,
    upload_output_dir: PathBuf,
}

impl ReportService {
    pub fn new(repo: Arc<dyn ReportRepository>, paths: &PathsConfig) -> Self {
        Self {
            repo,
            reports_dir: paths.llm_reports_dir(),
            uploads_dir: paths.uploads_dir(),
            upload_output_dir: paths.upload_output_dir(),
        }
    }

    /// Directory LLM artifacts are written to
    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    pub(crate) fn repo(&self) -> &Arc<dyn ReportRepository> {
        &self.repo
    }

    /// Default artifact location for a report id
    pub fn artifact_path(&self, report_id: &str) -> PathBuf {
        self.reports_dir.join(format!("{}.json", report_id))
    }

    pub async fn create_llm_report(
        &self,
        city: &str,
        industry: &str,
        title: Option<&str>,
    ) -> Result<Report, ReportServiceError> {
        if city.trim().is_empty() || industry.trim().is_empty() {
            return Err(ReportServiceError::ValidationError(
                "City and industry are required".to_string(),
            ));
        }

        let input = CreateReportInput {
            report_id: generate_report_id(),
            title: title
                .map(String::from)
                .unwrap_or_else(|| format!("{}{}产业分析报告", city.trim(), industry.trim())),
            city: city.trim().to_string(),
            industry: industry.trim().to_string(),
            report_type: ReportType::Llm,
            file_path: String::new(),
            status: ReportStatus::Pending,
        };
        let report = self.repo.create(&input).await?;
        tracing::info!("Created report {} ({} / {})", report.report_id, report.city, report.industry);
        Ok(report)
    }

    pub async fn get(&self, report_id: &str) -> Result<Report, ReportServiceError> {
        self.repo
            .get_by_report_id(report_id)
            .await?
            .ok_or_else(|| ReportServiceError::NotFound(report_id.to_string()))
    }

    async fn transition(&self, report_id: &str, next: ReportStatus) -> Result<Report, ReportServiceError> {
        let report = self.get(report_id).await?;
        if !report.status.can_transition_to(next) {
            return Err(ReportServiceError::InvalidTransition {
                report_id: report_id.to_string(),
                from: report.status,
                to: next,
            });
        }
        let completed_at = next.completed_at_for(chrono::Utc::now());
        self.repo
            .update_status(report_id, next, completed_at)
            .await
            .with_context(|| format!("Failed to move report {} to {}", report_id, next))?;
        tracing::debug!("Report {}: {} -> {}", report_id, report.status, next);
        Ok(Report {
            status: next,
            completed_at,
            ..report
        })
    }

    pub async fn mark_processing(&self, report_id: &str) -> Result<Report, ReportServiceError> {
        self.transition(report_id, ReportStatus::Processing).await
    }

    pub async fn mark_completed(&self, report_id: &str, file_path: &Path) -> Result<Report, ReportServiceError> {
        let path = file_path.to_string_lossy().into_owned();
        let report = self.transition(report_id, ReportStatus::Completed).await?;
        self.repo.update_file_path(report_id, &path).await?;
        Ok(Report {
            file_path: path,
            ..report
        })
    }

    /// Failing an already failed report is a no-op
    pub async fn mark_failed(&self, report_id: &str) -> Result<Report, ReportServiceError> {
        let report = self.get(report_id).await?;
        if report.status == ReportStatus::Failed {
            return Ok(report);
        }
        self.transition(report_id, ReportStatus::Failed).await
    }

    pub async fn list(&self) -> Result<Vec<ReportSummary>, ReportServiceError> {
        let reports = self.repo.list().await?;
        Ok(reports.iter().map(ReportSummary::from).collect())
    }

    /// Artifact location for a report, if one exists on disk
    pub fn resolve_report_file(&self, report: &Report) -> Option<PathBuf> {
        if report.report_type == ReportType::Llm {
            let default = self.artifact_path(&report.report_id);
            if default.is_file() {
                return Some(default);
            }
        }
        let stored = report.file_path.trim();
        if stored.is_empty() || stored == "." {
            return None;
        }
        let stored = PathBuf::from(stored);
        stored.is_file().then_some(stored)
    }

    pub async fn load_report_document(&self, report_id: &str) -> Result<Value, ReportServiceError> {
        let report = self.get(report_id).await?;
        let path = self
            .resolve_report_file(&report)
            .ok_or_else(|| ReportServiceError::NotFound(format!("artifact for {}", report_id)))?;
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let document = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid report JSON in {}", path.display()))?;
        Ok(document)
    }

    pub async fn find_source(&self, report_id: &str, query: &str) -> Result<Vec<String>, ReportServiceError> {
        if query.trim().is_empty() {
            return Err(ReportServiceError::ValidationError("query is required".to_string()));
        }
        let document = self.load_report_document(report_id).await?;
        let content = document
            .get("full_content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(matching_sentences(content, query.trim()))
    }

    pub async fn write_llm_artifact(&self, report_id: &str, document: &Value) -> Result<PathBuf, ReportServiceError> {
        tokio::fs::create_dir_all(&self.reports_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.reports_dir.display()))?;
        let path = self.artifact_path(report_id);
        let json = serde_json::to_string_pretty(document).context("Failed to serialise report")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Wrote report artifact {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::db::migrations::run_migrations;
    use crate::db::repositories::SqlxReportRepository;
    use serde_json::json;
    use tempfile::TempDir;

    pub(crate) async fn setup_service() -> (ReportService, TempDir) {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let dir = TempDir::new().unwrap();
        let paths = PathsConfig {
            data_dir: dir.path().to_path_buf(),
            ..PathsConfig::default()
        };
        (ReportService::new(SqlxReportRepository::boxed(pool), &paths), dir)
    }

    #[test]
    fn test_generate_report_id_format() {
        let id = generate_report_id();
        let re = regex::Regex::new(r"^llm_report_\d{8}_\d{6}_[0-9a-f]{8}$").unwrap();
        assert!(re.is_match(&id), "unexpected id {}", id);
        assert_ne!(generate_report_id(), id);
    }

    #[test]
    fn test_matching_sentences() {
        let content = "上海发展AI。AI is growing! Nothing here? ai again\nlast AI line.a.b.c.d.e";
        let hits = matching_sentences(content, "AI");
        assert_eq!(hits, vec!["上海发展AI", "AI is growing", "ai again", "last AI line"]);

        let many = "x AI。".repeat(9);
        assert_eq!(matching_sentences(&many, "ai").len(), 5);
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let (service, _dir) = setup_service().await;
        let report = service.create_llm_report("上海", "人工智能", None).await.unwrap();
        assert_eq!(report.status, ReportStatus::Pending);
        assert_eq!(report.title, "上海人工智能产业分析报告");

        let err = service
            .mark_completed(&report.report_id, Path::new("x.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportServiceError::InvalidTransition { .. }));

        service.mark_processing(&report.report_id).await.unwrap();
        let path = service
            .write_llm_artifact(&report.report_id, &json!({"full_content": "内容"}))
            .await
            .unwrap();
        let done = service.mark_completed(&report.report_id, &path).await.unwrap();
        assert_eq!(done.status, ReportStatus::Completed);
        assert!(done.completed_at.is_some());

        let stored = service.get(&report.report_id).await.unwrap();
        assert_eq!(stored.file_path, path.to_string_lossy());
        assert!(matches!(
            service.mark_failed(&report.report_id).await,
            Err(ReportServiceError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_mark_failed_clears_completed_at_and_is_idempotent() {
        let (service, _dir) = setup_service().await;
        let report = service.create_llm_report("北京", "芯片", Some("t")).await.unwrap();
        service.mark_processing(&report.report_id).await.unwrap();
        let failed = service.mark_failed(&report.report_id).await.unwrap();
        assert_eq!(failed.status, ReportStatus::Failed);
        assert!(failed.completed_at.is_none());
        assert_eq!(service.mark_failed(&report.report_id).await.unwrap().status, ReportStatus::Failed);

        // retry
        service.mark_processing(&report.report_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_requires_city_and_industry() {
        let (service, _dir) = setup_service().await;
        assert!(matches!(
            service.create_llm_report(" ", "芯片", None).await,
            Err(ReportServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_and_find_source() {
        let (service, dir) = setup_service().await;
        let report = service.create_llm_report("上海", "芯片", None).await.unwrap();
        assert!(service.resolve_report_file(&report).is_none());
        assert!(matches!(
            service.find_source(&report.report_id, "芯片").await,
            Err(ReportServiceError::NotFound(_))
        ));

        service
            .write_llm_artifact(
                &report.report_id,
                &json!({"full_content": "芯片产业集聚。政策支持。芯片设计领先"}),
            )
            .await
            .unwrap();
        assert_eq!(
            service.resolve_report_file(&report),
            Some(service.artifact_path(&report.report_id))
        );
        let hits = service.find_source(&report.report_id, "芯片").await.unwrap();
        assert_eq!(hits, vec!["芯片产业集聚", "芯片设计领先"]);
        assert!(matches!(
            service.find_source(&report.report_id, "  ").await,
            Err(ReportServiceError::ValidationError(_))
        ));

        // upload reports only look at the stored path
        let upload = Report {
            report_type: ReportType::Upload,
            file_path: ".".to_string(),
            ..report.clone()
        };
        assert!(service.resolve_report_file(&upload).is_none());
        let other = dir.path().join("upload.json");
        std::fs::write(&other, "{}").unwrap();
        let upload = Report {
            file_path: other.to_string_lossy().into_owned(),
            ..upload
        };
        assert_eq!(service.resolve_report_file(&upload), Some(other));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let (service, _dir) = setup_service().await;
        let a = service.create_llm_report("上海", "芯片", None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let b = service.create_llm_report("北京", "医药", None).await.unwrap();

        let list = service.list().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].report_id, b.report_id);
        assert_eq!(list[1].report_id, a.report_id);
        assert!(list[0].completed_at.is_none());
    }
}
