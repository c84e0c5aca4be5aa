//! Report model
//!
//! A report row tracks one generated (`llm`) or uploaded (`upload`) analysis.
//! The content itself lives in a JSON artifact on disk; the row only records
//! where it is and how far generation got.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Report entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    /// Public identifier, also the artifact file stem
    pub report_id: String,
    pub title: String,
    pub city: String,
    pub industry: String,
    pub report_type: ReportType,
    /// Path of the artifact; empty until one has been written
    pub file_path: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// How a report came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    /// Generated by a language model
    Llm,
    /// Uploaded by a user
    Upload,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Llm => "llm",
            ReportType::Upload => "upload",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "llm" => Some(ReportType::Llm),
            "upload" => Some(ReportType::Upload),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Report processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Processing => "processing",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(ReportStatus::Pending),
            "processing" => Some(ReportStatus::Processing),
            "completed" => Some(ReportStatus::Completed),
            "failed" => Some(ReportStatus::Failed),
            _ => None,
        }
    }

    /// Whether the normal lifecycle allows moving from `self` to `next`.
    ///
    /// Failed reports may be retried. Completed is terminal here; only the
    /// repair tooling resets a completed report whose artifact disappeared.
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        use ReportStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Processing)
        )
    }

    /// `completed_at` value implied by entering this status
    pub fn completed_at_for(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ReportStatus::Completed => Some(now),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input for creating a report row
#[derive(Debug, Clone)]
pub struct CreateReportInput {
    pub report_id: String,
    pub title: String,
    pub city: String,
    pub industry: String,
    pub report_type: ReportType,
    pub file_path: String,
    pub status: ReportStatus,
}

/// Listing entry returned by `/api/reports`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub report_id: String,
    pub title: String,
    pub city: String,
    pub industry: String,
    pub report_type: ReportType,
    pub status: ReportStatus,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl From<&Report> for ReportSummary {
    fn from(report: &Report) -> Self {
        Self {
            report_id: report.report_id.clone(),
            title: report.title.clone(),
            city: report.city.clone(),
            industry: report.industry.clone(),
            report_type: report.report_type,
            status: report.status,
            created_at: report.created_at.to_rfc3339(),
            completed_at: report.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            ReportStatus::Pending,
            ReportStatus::Processing,
            ReportStatus::Completed,
            ReportStatus::Failed,
        ] {
            assert_eq!(ReportStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(ReportStatus::from_str("COMPLETED"), Some(ReportStatus::Completed));
        assert_eq!(ReportStatus::from_str("archived"), None);
        assert_eq!(ReportStatus::default(), ReportStatus::Pending);
    }

    #[test]
    fn test_transition_table() {
        use ReportStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Processing));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn test_completed_at_only_for_completed() {
        let now = Utc::now();
        assert_eq!(ReportStatus::Completed.completed_at_for(now), Some(now));
        assert_eq!(ReportStatus::Failed.completed_at_for(now), None);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&ReportType::Llm).unwrap(), "\"llm\"");
        assert_eq!(
            serde_json::from_str::<ReportStatus>("\"processing\"").unwrap(),
            ReportStatus::Processing
        );
    }
}
