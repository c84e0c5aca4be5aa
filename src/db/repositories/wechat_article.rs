//! WeChat article repository
//!
//! - `WechatArticleRepository` trait defining article data access
//! - `SqlxWechatArticleRepository` implementing it for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{decode_list, encode_list, CreateWechatArticleInput, WechatArticle};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// WeChat article repository trait
#[async_trait]
pub trait WechatArticleRepository: Send + Sync {
    /// Persist a new article
    async fn create(&self, input: &CreateWechatArticleInput) -> Result<WechatArticle>;

    async fn get_by_id(&self, id: i64) -> Result<Option<WechatArticle>>;

    /// Newest articles first
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<WechatArticle>>;

    /// Articles matching any keyword in title, content or summary,
    /// additionally restricted to those mentioning `region` when given
    async fn search(
        &self,
        keywords: &[String],
        region: Option<&str>,
        limit: i64,
    ) -> Result<Vec<WechatArticle>>;

    async fn list_by_account(&self, account: &str, limit: i64) -> Result<Vec<WechatArticle>>;

    async fn count(&self) -> Result<i64>;

    async fn exists_by_url(&self, url: &str) -> Result<bool>;
}

/// SQLx-based WeChat article repository
pub struct SqlxWechatArticleRepository {
    pool: DynDatabasePool,
}

impl SqlxWechatArticleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn WechatArticleRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_COLUMNS: &str = "SELECT id, title, content, publish_date, author, source_account, url, summary, keywords, industry_relevance, content_html, created_at, updated_at FROM wechat_articles";

/// Build the WHERE clause for a keyword search.
///
/// Returns the SQL and the LIKE patterns to bind in order.
fn build_search_query(keywords: &[String], region: Option<&str>) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();

    let keyword_clauses: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| {
            let pattern = format!("%{}%", k);
            binds.extend([pattern.clone(), pattern.clone(), pattern]);
            "(title LIKE ? OR content LIKE ? OR summary LIKE ?)"
        })
        .collect();
    if !keyword_clauses.is_empty() {
        clauses.push(format!("({})", keyword_clauses.join(" OR ")));
    }

    if let Some(region) = region.map(str::trim).filter(|r| !r.is_empty()) {
        let pattern = format!("%{}%", region);
        binds.extend([pattern.clone(), pattern.clone(), pattern]);
        clauses.push("(title LIKE ? OR content LIKE ? OR summary LIKE ?)".to_string());
    }

    let mut sql = SELECT_COLUMNS.to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY publish_date DESC, id DESC LIMIT ?");
    (sql, binds)
}

#[async_trait]
impl WechatArticleRepository for SqlxWechatArticleRepository {
    async fn create(&self, input: &CreateWechatArticleInput) -> Result<WechatArticle> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_sqlite(self.pool.sqlite()?, input).await,
            DatabaseDriver::Mysql => create_mysql(self.pool.mysql()?, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<WechatArticle>> {
        let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get WeChat article by ID")?;
                row.as_ref().map(row_to_article_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get WeChat article by ID")?;
                row.as_ref().map(row_to_article_mysql).transpose()
            }
        }
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<WechatArticle>> {
        let sql = format!(
            "{} ORDER BY publish_date DESC, id DESC LIMIT ? OFFSET ?",
            SELECT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list WeChat articles")?;
                rows.iter().map(row_to_article_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list WeChat articles")?;
                rows.iter().map(row_to_article_mysql).collect()
            }
        }
    }

    async fn search(
        &self,
        keywords: &[String],
        region: Option<&str>,
        limit: i64,
    ) -> Result<Vec<WechatArticle>> {
        let (sql, binds) = build_search_query(keywords, region);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql);
                for pattern in &binds {
                    query = query.bind(pattern);
                }
                let rows = query
                    .bind(limit)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to search WeChat articles")?;
                rows.iter().map(row_to_article_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql);
                for pattern in &binds {
                    query = query.bind(pattern);
                }
                let rows = query
                    .bind(limit)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to search WeChat articles")?;
                rows.iter().map(row_to_article_mysql).collect()
            }
        }
    }

    async fn list_by_account(&self, account: &str, limit: i64) -> Result<Vec<WechatArticle>> {
        let sql = format!(
            "{} WHERE source_account = ? ORDER BY publish_date DESC, id DESC LIMIT ?",
            SELECT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(account)
                    .bind(limit)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list WeChat articles by account")?;
                rows.iter().map(row_to_article_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(account)
                    .bind(limit)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list WeChat articles by account")?;
                rows.iter().map(row_to_article_mysql).collect()
            }
        }
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) as count FROM wechat_articles";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count WeChat articles")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count WeChat articles")?
                .get("count"),
        };
        Ok(count)
    }

    async fn exists_by_url(&self, url: &str) -> Result<bool> {
        let sql = "SELECT COUNT(*) as count FROM wechat_articles WHERE url = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(url)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to check WeChat article URL")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(url)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to check WeChat article URL")?
                .get("count"),
        };
        Ok(count > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_sqlite(pool: &SqlitePool, input: &CreateWechatArticleInput) -> Result<WechatArticle> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO wechat_articles (title, content, publish_date, author, source_account, url, summary, keywords, industry_relevance, content_html, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.content)
    .bind(&input.publish_date)
    .bind(&input.author)
    .bind(&input.source_account)
    .bind(&input.url)
    .bind(&input.summary)
    .bind(encode_list(&input.keywords))
    .bind(encode_list(&input.industry_relevance))
    .bind(&input.content_html)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create WeChat article")?;

    Ok(article_from_input(result.last_insert_rowid(), input, now))
}

fn row_to_article_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<WechatArticle> {
    let keywords: String = row.try_get("keywords").unwrap_or_default();
    let industry: String = row.try_get("industry_relevance").unwrap_or_default();
    Ok(WechatArticle {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        publish_date: row.get("publish_date"),
        author: row.get("author"),
        source_account: row.get("source_account"),
        url: row.get("url"),
        summary: row.get("summary"),
        keywords: decode_list(&keywords),
        industry_relevance: decode_list(&industry),
        content_html: row.get("content_html"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_mysql(pool: &MySqlPool, input: &CreateWechatArticleInput) -> Result<WechatArticle> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO wechat_articles (title, content, publish_date, author, source_account, url, summary, keywords, industry_relevance, content_html, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.content)
    .bind(&input.publish_date)
    .bind(&input.author)
    .bind(&input.source_account)
    .bind(&input.url)
    .bind(&input.summary)
    .bind(encode_list(&input.keywords))
    .bind(encode_list(&input.industry_relevance))
    .bind(&input.content_html)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create WeChat article")?;

    Ok(article_from_input(result.last_insert_id() as i64, input, now))
}

fn row_to_article_mysql(row: &sqlx::mysql::MySqlRow) -> Result<WechatArticle> {
    let keywords: String = row.try_get("keywords").unwrap_or_default();
    let industry: String = row.try_get("industry_relevance").unwrap_or_default();
    Ok(WechatArticle {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        publish_date: row.get("publish_date"),
        author: row.get("author"),
        source_account: row.get("source_account"),
        url: row.get("url"),
        summary: row.get("summary"),
        keywords: decode_list(&keywords),
        industry_relevance: decode_list(&industry),
        content_html: row.get("content_html"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn article_from_input(
    id: i64,
    input: &CreateWechatArticleInput,
    now: chrono::DateTime<Utc>,
) -> WechatArticle {
    WechatArticle {
        id,
        title: input.title.clone(),
        content: input.content.clone(),
        publish_date: input.publish_date.clone(),
        author: input.author.clone(),
        source_account: input.source_account.clone(),
        url: input.url.clone(),
        summary: input.summary.clone(),
        keywords: input.keywords.clone(),
        industry_relevance: input.industry_relevance.clone(),
        content_html: input.content_html.clone(),
        created_at: now,
        updated_at: now,
    }
}
