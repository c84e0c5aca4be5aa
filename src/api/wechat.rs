//! WeChat article endpoints
//!
//! - POST /api/wechat-articles - articles about a region and industry
//! - POST /api/wechat-search - keyword search, optionally within a region
//! - POST /api/wechat-account-articles - latest articles of one account
//! - POST /api/wechat-analyze - keyword / sentiment / policy analysis
//! - POST /api/wechat-ingest - store a collected article

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::middleware::{AppState, Failure};
use crate::models::{CreateWechatArticleInput, WechatArticle};
use crate::services::wechat::ContentAnalysis;

fn default_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct RegionalArticlesRequest {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

/// A single keyword string or a list of them
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Keywords {
    One(String),
    Many(Vec<String>),
}

impl Default for Keywords {
    fn default() -> Self {
        Keywords::Many(Vec::new())
    }
}

impl Keywords {
    /// Non-blank keywords; a single string is split on whitespace and commas
    pub fn normalized(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Keywords::One(s) => s.split(|c: char| c.is_whitespace() || c == ',' || c == '，').collect(),
            Keywords::Many(list) => list.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub keywords: Keywords,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct AccountArticlesRequest {
    #[serde(default)]
    pub account_name: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ArticlesResponse {
    pub success: bool,
    pub articles: Vec<WechatArticle>,
    pub count: usize,
}

impl From<Vec<WechatArticle>> for ArticlesResponse {
    fn from(articles: Vec<WechatArticle>) -> Self {
        Self {
            success: true,
            count: articles.len(),
            articles,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub analysis: ContentAnalysis,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/wechat-articles", post(regional_articles))
        .route("/wechat-search", post(search_articles))
        .route("/wechat-account-articles", post(account_articles))
        .route("/wechat-analyze", post(analyze_content))
        .route("/wechat-ingest", post(ingest_article))
}

/// POST /api/wechat-articles
async fn regional_articles(
    State(state): State<AppState>,
    Json(request): Json<RegionalArticlesRequest>,
) -> Result<Json<ArticlesResponse>, Failure> {
    if request.region.trim().is_empty() || request.industry.trim().is_empty() {
        return Err(Failure::bad_request("请输入区域与产业名称"));
    }
    let articles = state
        .wechat_service
        .fetch_regional(&request.region, &request.industry, request.limit)
        .await?;
    Ok(Json(articles.into()))
}

/// POST /api/wechat-search
async fn search_articles(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<ArticlesResponse>, Failure> {
    let keywords = request.keywords.normalized();
    if keywords.is_empty() {
        return Err(Failure::bad_request("请输入搜索关键词"));
    }
    let region = request.region.as_deref().map(str::trim).filter(|r| !r.is_empty());
    let articles = state
        .wechat_service
        .search(&keywords, region, request.limit)
        .await?;
    Ok(Json(articles.into()))
}

/// POST /api/wechat-account-articles
async fn account_articles(
    State(state): State<AppState>,
    Json(request): Json<AccountArticlesRequest>,
) -> Result<Json<ArticlesResponse>, Failure> {
    if request.account_name.trim().is_empty() {
        return Err(Failure::bad_request("请输入公众号名称"));
    }
    let articles = state
        .wechat_service
        .account_articles(&request.account_name, request.limit)
        .await?;
    Ok(Json(articles.into()))
}

/// POST /api/wechat-analyze
async fn analyze_content(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, Failure> {
    if request.content.trim().is_empty() {
        return Err(Failure::bad_request("请输入文章内容"));
    }
    let analysis = state.wechat_service.analyze(&request.content)?;
    Ok(Json(AnalyzeResponse {
        success: true,
        analysis,
    }))
}

/// POST /api/wechat-ingest
async fn ingest_article(
    State(state): State<AppState>,
    Json(input): Json<CreateWechatArticleInput>,
) -> Result<Json<Value>, Failure> {
    let stored = state.wechat_service.ingest(input).await?;
    Ok(Json(json!({
        "success": true,
        "duplicate": stored.is_none(),
        "article": stored,
    })))
}
