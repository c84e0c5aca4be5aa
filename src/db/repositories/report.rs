//! Report repository
//!
//! - `ReportRepository` trait defining report data access
//! - `SqlxReportRepository` implementing it for SQLite and MySQL
//!
//! Reports are never deleted; rows only move through status changes.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{CreateReportInput, Report, ReportStatus, ReportType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Report repository trait
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn create(&self, input: &CreateReportInput) -> Result<Report>;

    async fn get_by_report_id(&self, report_id: &str) -> Result<Option<Report>>;

    /// All reports, newest first
    async fn list(&self) -> Result<Vec<Report>>;

    async fn list_by_status(&self, status: ReportStatus) -> Result<Vec<Report>>;

    /// Set status and `completed_at` together. Returns false if no row matched.
    async fn update_status(
        &self,
        report_id: &str,
        status: ReportStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    async fn update_file_path(&self, report_id: &str, file_path: &str) -> Result<bool>;

    /// Change a row's public identifier
    async fn rename_report_id(&self, old: &str, new: &str) -> Result<bool>;

    async fn count_by_status(&self, status: ReportStatus) -> Result<i64>;
}

/// SQLx-based report repository
pub struct SqlxReportRepository {
    pool: DynDatabasePool,
}

impl SqlxReportRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ReportRepository> {
        Arc::new(Self::new(pool))
    }

    /// Run a statement that binds string parameters and report how many rows changed
    async fn execute_update(&self, sql: &str, params: &[&str]) -> Result<u64> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(sql);
                for p in params {
                    query = query.bind(*p);
                }
                query.execute(self.pool.sqlite()?).await?.rows_affected()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(sql);
                for p in params {
                    query = query.bind(*p);
                }
                query.execute(self.pool.mysql()?).await?.rows_affected()
            }
        };
        Ok(affected)
    }
}

const SELECT_COLUMNS: &str = "SELECT id, report_id, title, city, industry, report_type, file_path, status, created_at, completed_at FROM reports";

#[async_trait]
impl ReportRepository for SqlxReportRepository {
    async fn create(&self, input: &CreateReportInput) -> Result<Report> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_report_sqlite(self.pool.sqlite()?, input).await,
            DatabaseDriver::Mysql => create_report_mysql(self.pool.mysql()?, input).await,
        }
    }

    async fn get_by_report_id(&self, report_id: &str) -> Result<Option<Report>> {
        let sql = format!("{} WHERE report_id = ?", SELECT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(report_id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get report")?;
                row.as_ref().map(row_to_report_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(report_id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get report")?;
                row.as_ref().map(row_to_report_mysql).transpose()
            }
        }
    }

    async fn list(&self) -> Result<Vec<Report>> {
        let sql = format!("{} ORDER BY created_at DESC, id DESC", SELECT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list reports")?;
                rows.iter().map(row_to_report_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list reports")?;
                rows.iter().map(row_to_report_mysql).collect()
            }
        }
    }

    async fn list_by_status(&self, status: ReportStatus) -> Result<Vec<Report>> {
        let sql = format!(
            "{} WHERE status = ? ORDER BY created_at DESC, id DESC",
            SELECT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(status.as_str())
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list reports by status")?;
                rows.iter().map(row_to_report_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(status.as_str())
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list reports by status")?;
                rows.iter().map(row_to_report_mysql).collect()
            }
        }
    }

    async fn update_status(
        &self,
        report_id: &str,
        status: ReportStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let sql = "UPDATE reports SET status = ?, completed_at = ? WHERE report_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(status.as_str())
                .bind(completed_at)
                .bind(report_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to update report status")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(status.as_str())
                .bind(completed_at)
                .bind(report_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to update report status")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn update_file_path(&self, report_id: &str, file_path: &str) -> Result<bool> {
        let affected = self
            .execute_update(
                "UPDATE reports SET file_path = ? WHERE report_id = ?",
                &[file_path, report_id],
            )
            .await
            .context("Failed to update report file path")?;
        Ok(affected > 0)
    }

    async fn rename_report_id(&self, old: &str, new: &str) -> Result<bool> {
        let affected = self
            .execute_update(
                "UPDATE reports SET report_id = ? WHERE report_id = ?",
                &[new, old],
            )
            .await
            .with_context(|| format!("Failed to rename report {} to {}", old, new))?;
        Ok(affected > 0)
    }

    async fn count_by_status(&self, status: ReportStatus) -> Result<i64> {
        let sql = "SELECT COUNT(*) as count FROM reports WHERE status = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(status.as_str())
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count reports")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(status.as_str())
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count reports")?
                .get("count"),
        };
        Ok(count)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_report_sqlite(pool: &SqlitePool, input: &CreateReportInput) -> Result<Report> {
    let now = Utc::now();
    let completed_at = input.status.completed_at_for(now);
    let result = sqlx::query(
        r#"
        INSERT INTO reports (report_id, title, city, industry, report_type, file_path, status, created_at, completed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.report_id)
    .bind(&input.title)
    .bind(&input.city)
    .bind(&input.industry)
    .bind(input.report_type.as_str())
    .bind(&input.file_path)
    .bind(input.status.as_str())
    .bind(now)
    .bind(completed_at)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to create report {}", input.report_id))?;

    Ok(report_from_input(result.last_insert_rowid(), input, now))
}

fn row_to_report_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Report> {
    let report_type: String = row.get("report_type");
    let status: String = row.get("status");
    Ok(Report {
        id: row.get("id"),
        report_id: row.get("report_id"),
        title: row.get("title"),
        city: row.get("city"),
        industry: row.get("industry"),
        report_type: parse_report_type(&report_type)?,
        file_path: row.get("file_path"),
        status: parse_status(&status)?,
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_report_mysql(pool: &MySqlPool, input: &CreateReportInput) -> Result<Report> {
    let now = Utc::now();
    let completed_at = input.status.completed_at_for(now);
    let result = sqlx::query(
        r#"
        INSERT INTO reports (report_id, title, city, industry, report_type, file_path, status, created_at, completed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.report_id)
    .bind(&input.title)
    .bind(&input.city)
    .bind(&input.industry)
    .bind(input.report_type.as_str())
    .bind(&input.file_path)
    .bind(input.status.as_str())
    .bind(now)
    .bind(completed_at)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to create report {}", input.report_id))?;

    Ok(report_from_input(result.last_insert_id() as i64, input, now))
}

fn row_to_report_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Report> {
    let report_type: String = row.get("report_type");
    let status: String = row.get("status");
    Ok(Report {
        id: row.get("id"),
        report_id: row.get("report_id"),
        title: row.get("title"),
        city: row.get("city"),
        industry: row.get("industry"),
        report_type: parse_report_type(&report_type)?,
        file_path: row.get("file_path"),
        status: parse_status(&status)?,
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    })
}

fn parse_report_type(s: &str) -> Result<ReportType> {
    ReportType::from_str(s).ok_or_else(|| anyhow::anyhow!("Invalid report type: {}", s))
}

fn parse_status(s: &str) -> Result<ReportStatus> {
    ReportStatus::from_str(s).ok_or_else(|| anyhow::anyhow!("Invalid report status: {}", s))
}

fn report_from_input(id: i64, input: &CreateReportInput, now: DateTime<Utc>) -> Report {
    Report {
        id,
        report_id: input.report_id.clone(),
        title: input.title.clone(),
        city: input.city.clone(),
        industry: input.industry.clone(),
        report_type: input.report_type,
        file_path: input.file_path.clone(),
        status: input.status,
        created_at: now,
        completed_at: input.status.completed_at_for(now),
    }
}
