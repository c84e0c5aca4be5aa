//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one entity.

pub mod report;
pub mod wechat_article;

pub use report::{ReportRepository, SqlxReportRepository};
pub use wechat_article::{SqlxWechatArticleRepository, WechatArticleRepository};
