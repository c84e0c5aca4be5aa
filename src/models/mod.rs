//! Data models
//!
//! - Database entities (`WechatArticle`, `Report`)
//! - Map search results (`Poi`)
//! - Input and listing types used by the services and the HTTP layer

mod poi;
mod report;
mod wechat_article;

pub use poi::{Location, Poi, PoiPage};
pub use report::{CreateReportInput, Report, ReportStatus, ReportSummary, ReportType};
pub use wechat_article::{decode_list, encode_list, CreateWechatArticleInput, WechatArticle};
