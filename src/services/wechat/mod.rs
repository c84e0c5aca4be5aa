//! WeChat article service
//!
//! Ingests articles collected from official accounts and answers the
//! dashboard's regional / keyword / account queries against them.

pub mod analysis;

use std::sync::Arc;

use anyhow::Context;

use crate::db::repositories::WechatArticleRepository;
use crate::models::{CreateWechatArticleInput, WechatArticle};

pub use analysis::{analyze, ContentAnalysis, Sentiment};

/// Error types for WeChat service operations
#[derive(Debug, thiserror::Error)]
pub enum WechatServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct WechatService {
    repo: Arc<dyn WechatArticleRepository>,
}

impl WechatService {
    pub fn new(repo: Arc<dyn WechatArticleRepository>) -> Self {
        Self { repo }
    }

    /// Store an article. Returns `None` when an article with the same URL
    /// already exists.
    pub async fn ingest(
        &self,
        mut input: CreateWechatArticleInput,
    ) -> Result<Option<WechatArticle>, WechatServiceError> {
        input.validate().map_err(WechatServiceError::ValidationError)?;

        if let Some(url) = input.url.as_deref().filter(|u| !u.trim().is_empty()) {
            if self.repo.exists_by_url(url).await? {
                tracing::debug!("Skipping duplicate article {}", url);
                return Ok(None);
            }
        }

        let summary_missing = input.summary.as_deref().map_or(true, |s| s.trim().is_empty());
        if summary_missing {
            if let Some(content) = input.content.as_deref() {
                input.summary = Some(analysis::summarize(content));
            }
        }

        let article = self
            .repo
            .create(&input)
            .await
            .context("Failed to store article")?;
        tracing::info!("Ingested article '{}' from {}", article.title, article.source_account);
        Ok(Some(article))
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<WechatArticle>, WechatServiceError> {
        Ok(self.repo.list(limit, 0).await?)
    }

    pub async fn search(
        &self,
        keywords: &[String],
        region: Option<&str>,
        limit: i64,
    ) -> Result<Vec<WechatArticle>, WechatServiceError> {
        if keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(WechatServiceError::ValidationError(
                "at least one keyword is required".to_string(),
            ));
        }
        Ok(self.repo.search(keywords, region, limit).await?)
    }

    pub async fn account_articles(
        &self,
        account: &str,
        limit: i64,
    ) -> Result<Vec<WechatArticle>, WechatServiceError> {
        let account = account.trim();
        if account.is_empty() {
            return Err(WechatServiceError::ValidationError(
                "account name is required".to_string(),
            ));
        }
        Ok(self.repo.list_by_account(account, limit).await?)
    }

    /// Articles mentioning both region and industry, falling back to
    /// articles mentioning either when none mention both
    pub async fn fetch_regional(
        &self,
        region: &str,
        industry: &str,
        limit: i64,
    ) -> Result<Vec<WechatArticle>, WechatServiceError> {
        let (region, industry) = (region.trim(), industry.trim());
        if region.is_empty() && industry.is_empty() {
            return Err(WechatServiceError::ValidationError(
                "region or industry is required".to_string(),
            ));
        }

        let both = self
            .repo
            .search(&[industry.to_string()], Some(region), limit)
            .await?;
        if !both.is_empty() || region.is_empty() || industry.is_empty() {
            return Ok(both);
        }

        let either = self
            .repo
            .search(&[region.to_string(), industry.to_string()], None, limit)
            .await?;
        tracing::debug!(
            "No articles mention both {} and {}; {} mention either",
            region,
            industry,
            either.len()
        );
        Ok(either)
    }

    pub fn analyze(&self, content: &str) -> Result<ContentAnalysis, WechatServiceError> {
        if content.trim().is_empty() {
            return Err(WechatServiceError::ValidationError(
                "content is required".to_string(),
            ));
        }
        Ok(analyze(content))
    }
}
