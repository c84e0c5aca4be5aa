//! Schema migrations
//!
//! Each migration carries SQL for both backends. Applied versions are kept
//! in `_migrations`; on SQLite a migration and its bookkeeping row commit in
//! one transaction, on MySQL DDL commits statement by statement.

use std::collections::BTreeSet;

use anyhow::{Context, Result};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique, applied in ascending order
    pub version: i64,
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_mysql: &'static str,
}

impl Migration {
    fn sql_for(&self, driver: DatabaseDriver) -> &'static str {
        match driver {
            DatabaseDriver::Sqlite => self.up_sqlite,
            DatabaseDriver::Mysql => self.up_mysql,
        }
    }
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_wechat_articles",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS wechat_articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(500) NOT NULL,
                content TEXT,
                publish_date VARCHAR(20),
                author VARCHAR(100),
                source_account VARCHAR(100) NOT NULL,
                url VARCHAR(1000),
                summary TEXT,
                keywords TEXT NOT NULL DEFAULT '[]',
                industry_relevance TEXT NOT NULL DEFAULT '[]',
                content_html TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_wechat_articles_account ON wechat_articles(source_account);
            CREATE INDEX IF NOT EXISTS idx_wechat_articles_publish_date ON wechat_articles(publish_date);
            CREATE INDEX IF NOT EXISTS idx_wechat_articles_url ON wechat_articles(url);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS wechat_articles (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(500) NOT NULL,
                content LONGTEXT,
                publish_date VARCHAR(20),
                author VARCHAR(100),
                source_account VARCHAR(100) NOT NULL,
                url VARCHAR(1000),
                summary TEXT,
                keywords TEXT NOT NULL,
                industry_relevance TEXT NOT NULL,
                content_html LONGTEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            ) DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_wechat_articles_account ON wechat_articles(source_account);
            CREATE INDEX idx_wechat_articles_publish_date ON wechat_articles(publish_date);
            CREATE INDEX idx_wechat_articles_url ON wechat_articles(url(255));
        "#,
    },
    Migration {
        version: 2,
        name: "create_reports",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                report_id VARCHAR(100) NOT NULL UNIQUE,
                title VARCHAR(500) NOT NULL,
                city VARCHAR(100) NOT NULL,
                industry VARCHAR(100) NOT NULL,
                report_type VARCHAR(20) NOT NULL DEFAULT 'llm',
                file_path VARCHAR(1000) NOT NULL DEFAULT '',
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                completed_at TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_reports_status ON reports(status);
            CREATE INDEX IF NOT EXISTS idx_reports_created_at ON reports(created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS reports (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                report_id VARCHAR(100) NOT NULL UNIQUE,
                title VARCHAR(500) NOT NULL,
                city VARCHAR(100) NOT NULL,
                industry VARCHAR(100) NOT NULL,
                report_type VARCHAR(20) NOT NULL DEFAULT 'llm',
                file_path VARCHAR(1000) NOT NULL DEFAULT '',
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                completed_at TIMESTAMP NULL
            ) DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_reports_status ON reports(status);
            CREATE INDEX idx_reports_created_at ON reports(created_at);
        "#,
    },
];

const CREATE_MIGRATIONS_TABLE_SQLITE: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

const CREATE_MIGRATIONS_TABLE_MYSQL: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version BIGINT PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

/// Apply every pending migration; returns how many ran
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    let pending = pending_migrations(pool).await?;
    for migration in &pending {
        tracing::info!("Applying migration {}: {}", migration.version, migration.name);
        apply(pool, migration)
            .await
            .with_context(|| format!("Migration {} ({}) failed", migration.version, migration.name))?;
    }

    if pending.is_empty() {
        tracing::debug!("Schema is up to date");
    } else {
        tracing::info!("Applied {} migration(s)", pending.len());
    }
    Ok(pending.len())
}

/// Migrations not yet recorded in `_migrations`, in version order
pub async fn pending_migrations(pool: &DynDatabasePool) -> Result<Vec<&'static Migration>> {
    let applied = applied_versions(pool).await?;
    Ok(MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .collect())
}

async fn applied_versions(pool: &DynDatabasePool) -> Result<BTreeSet<i64>> {
    let query = "SELECT version FROM _migrations";
    let versions: Vec<i64> = match pool.driver() {
        DatabaseDriver::Sqlite => {
            pool.execute(CREATE_MIGRATIONS_TABLE_SQLITE).await?;
            sqlx::query_scalar(query).fetch_all(pool.sqlite()?).await
        }
        DatabaseDriver::Mysql => {
            pool.execute(CREATE_MIGRATIONS_TABLE_MYSQL).await?;
            sqlx::query_scalar(query).fetch_all(pool.mysql()?).await
        }
    }
    .context("Failed to read applied migrations")?;
    Ok(versions.into_iter().collect())
}

async fn apply(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    let statements = split_statements(migration.sql_for(pool.driver()));
    let record = "INSERT INTO _migrations (version, name) VALUES (?, ?)";

    match pool.driver() {
        DatabaseDriver::Sqlite => {
            let mut tx = pool.sqlite()?.begin().await?;
            for statement in &statements {
                sqlx::query(statement)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
            }
            sqlx::query(record)
                .bind(migration.version)
                .bind(migration.name)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }
        DatabaseDriver::Mysql => {
            let mysql = pool.mysql()?;
            for statement in &statements {
                sqlx::query(statement)
                    .execute(mysql)
                    .await
                    .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
            }
            sqlx::query(record)
                .bind(migration.version)
                .bind(migration.name)
                .execute(mysql)
                .await?;
        }
    }
    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    if sql.chars().count() > 100 {
        format!("{}...", sql.chars().take(100).collect::<String>())
    } else {
        sql.to_string()
    }
}

/// Statements of a migration script, with `--` comment lines dropped.
/// Semicolons inside string literals are not supported.
fn split_statements(sql: &str) -> Vec<String> {
    let without_comments: String = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use sqlx::Row;

    #[tokio::test]
    async fn test_run_migrations_once() {
        let pool = create_test_pool().await.unwrap();

        assert_eq!(pending_migrations(&pool).await.unwrap().len(), MIGRATIONS.len());
        assert_eq!(run_migrations(&pool).await.unwrap(), MIGRATIONS.len());
        assert_eq!(run_migrations(&pool).await.unwrap(), 0);
        assert!(pending_migrations(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wechat_articles_table_defaults() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        pool.execute("INSERT INTO wechat_articles (title, source_account) VALUES ('集成电路', '上海发布')")
            .await
            .unwrap();

        let row = sqlx::query("SELECT keywords, industry_relevance FROM wechat_articles")
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap();
        let keywords: String = row.get("keywords");
        let relevance: String = row.get("industry_relevance");
        assert_eq!(keywords, "[]");
        assert_eq!(relevance, "[]");
    }

    #[tokio::test]
    async fn test_reports_defaults_and_unique_id() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let insert = "INSERT INTO reports (report_id, title, city, industry) VALUES ('r1', 't', '苏州', '纺织')";
        pool.execute(insert).await.unwrap();
        assert!(pool.execute(insert).await.is_err());

        let row = sqlx::query("SELECT status, report_type, file_path FROM reports WHERE report_id = 'r1'")
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap();
        let status: String = row.get("status");
        let report_type: String = row.get("report_type");
        let file_path: String = row.get("file_path");
        assert_eq!(status, "pending");
        assert_eq!(report_type, "llm");
        assert!(file_path.is_empty());
    }

    #[test]
    fn test_versions_ascend() {
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
    }

    #[test]
    fn test_split_statements() {
        assert_eq!(split_statements(MIGRATIONS[0].up_sqlite).len(), 4);
        assert_eq!(split_statements(MIGRATIONS[1].up_mysql).len(), 3);

        let statements = split_statements("-- header\nCREATE TABLE a (id INT);\n-- trailing\n");
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)"]);
    }

    #[test]
    fn test_truncate_sql_respects_char_boundaries() {
        let truncated = truncate_sql(&"报".repeat(150));
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 103);
    }
}
