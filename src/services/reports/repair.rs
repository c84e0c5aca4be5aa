//! Report repair and monitoring
//!
//! Reconciles report rows with the artifacts on disk: rows stuck in
//! `processing` whose artifact was written, completed rows whose artifact
//! vanished, and rows that never recorded their file path.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ReportService, ReportServiceError};
use crate::models::{Report, ReportStatus};

/// Largest gap between a row's `created_at` and an artifact's mtime for the
/// two to be considered the same report
const MATCH_WINDOW_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum FixOutcome {
    /// The artifact existed; its path was recorded
    PathRestored { file_path: String },
    /// No artifact could be found
    MarkedFailed,
    Unchanged,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RenamedReport {
    pub old_id: String,
    pub new_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairSummary {
    pub completed: Vec<String>,
    pub renamed: Vec<RenamedReport>,
    pub untouched: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorReport {
    pub total: usize,
    pub valid: Vec<String>,
    pub empty_path: Vec<String>,
    pub missing_file: Vec<String>,
    pub invalid_json: Vec<String>,
}

impl MonitorReport {
    pub fn problem_count(&self) -> usize {
        self.empty_path.len() + self.missing_file.len() + self.invalid_json.len()
    }
}

struct Candidate {
    stem: String,
    path: PathBuf,
    modified: DateTime<Utc>,
}

fn modified_at(path: &Path) -> anyhow::Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to read mtime of {}", path.display()))?;
    Ok(DateTime::<Utc>::from(modified))
}

/// `llm_report_*.json` files in `dir`
fn scan_candidates(dir: &Path) -> anyhow::Result<Vec<Candidate>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", dir.display())),
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stem) = name.strip_suffix(".json") else {
            continue;
        };
        if !stem.starts_with("llm_report_") {
            continue;
        }
        // A file can vanish between listing and stat
        let modified = match modified_at(&path) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!("Skipping {}: {:#}", path.display(), e);
                continue;
            }
        };
        candidates.push(Candidate {
            stem: stem.to_string(),
            modified,
            path,
        });
    }
    Ok(candidates)
}

impl ReportService {
    pub async fn fix_missing(&self, report_id: &str) -> Result<FixOutcome, ReportServiceError> {
        let report = self.get(report_id).await?;
        let default = self.artifact_path(report_id);

        if default.is_file() && report.file_path.trim().is_empty() {
            let file_path = default.to_string_lossy().into_owned();
            self.repo().update_file_path(report_id, &file_path).await?;
            tracing::info!("Report {}: recorded artifact path {}", report_id, file_path);
            return Ok(FixOutcome::PathRestored { file_path });
        }

        if self.resolve_report_file(&report).is_none() {
            self.repo()
                .update_status(report_id, ReportStatus::Failed, None)
                .await?;
            tracing::warn!("Report {}: artifact missing, marked failed", report_id);
            return Ok(FixOutcome::MarkedFailed);
        }

        Ok(FixOutcome::Unchanged)
    }

    async fn complete_from_file(&self, report_id: &str, path: &Path, modified: DateTime<Utc>) -> anyhow::Result<()> {
        self.repo()
            .update_file_path(report_id, &path.to_string_lossy())
            .await?;
        self.repo()
            .update_status(report_id, ReportStatus::Completed, Some(modified))
            .await?;
        Ok(())
    }

    pub async fn fix_stuck_processing(&self) -> Result<RepairSummary, ReportServiceError> {
        let stuck = self.repo().list_by_status(ReportStatus::Processing).await?;
        let candidates = scan_candidates(self.reports_dir())?;
        let mut claimed: HashSet<String> = self
            .repo()
            .list()
            .await?
            .into_iter()
            .map(|r| r.report_id)
            .collect();

        let mut summary = RepairSummary::default();
        for report in stuck {
            let exact = self.artifact_path(&report.report_id);
            if exact.is_file() {
                let modified = match modified_at(&exact) {
                    Ok(modified) => modified,
                    Err(e) => {
                        tracing::warn!("Report {}: {:#}", report.report_id, e);
                        summary.untouched.push(report.report_id);
                        continue;
                    }
                };
                self.complete_from_file(&report.report_id, &exact, modified).await?;
                tracing::info!("Report {}: completed from existing artifact", report.report_id);
                summary.completed.push(report.report_id);
                continue;
            }

            match closest_candidate(&report, &candidates, &claimed) {
                Some(candidate) => {
                    self.repo()
                        .rename_report_id(&report.report_id, &candidate.stem)
                        .await?;
                    self.complete_from_file(&candidate.stem, &candidate.path, candidate.modified)
                        .await?;
                    tracing::info!("Report {} matched artifact {}", report.report_id, candidate.stem);
                    claimed.insert(candidate.stem.clone());
                    summary.completed.push(candidate.stem.clone());
                    summary.renamed.push(RenamedReport {
                        old_id: report.report_id,
                        new_id: candidate.stem.clone(),
                    });
                }
                None => summary.untouched.push(report.report_id),
            }
        }

        tracing::info!(
            "Stuck report repair: {} completed, {} renamed, {} untouched",
            summary.completed.len(),
            summary.renamed.len(),
            summary.untouched.len()
        );
        Ok(summary)
    }

    pub async fn monitor(&self) -> Result<MonitorReport, ReportServiceError> {
        let completed = self.repo().list_by_status(ReportStatus::Completed).await?;
        let mut report = MonitorReport {
            total: completed.len(),
            ..MonitorReport::default()
        };

        for row in completed {
            let stored = row.file_path.trim();
            if stored.is_empty() || stored == "." {
                report.empty_path.push(row.report_id);
                continue;
            }
            let raw = match tokio::fs::read_to_string(stored).await {
                Ok(raw) => raw,
                Err(_) => {
                    report.missing_file.push(row.report_id);
                    continue;
                }
            };
            if serde_json::from_str::<serde_json::Value>(&raw).is_ok() {
                report.valid.push(row.report_id);
            } else {
                report.invalid_json.push(row.report_id);
            }
        }
        Ok(report)
    }
}

fn closest_candidate<'a>(
    report: &Report,
    candidates: &'a [Candidate],
    claimed: &HashSet<String>,
) -> Option<&'a Candidate> {
    candidates
        .iter()
        .filter(|c| !claimed.contains(&c.stem))
        .map(|c| (c, (c.modified - report.created_at).num_seconds().abs()))
        .filter(|(_, gap)| *gap <= MATCH_WINDOW_SECS)
        .min_by_key(|(_, gap)| *gap)
        .map(|(c, _)| c)
}
