//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories:
//! - Enforcing the report lifecycle and managing report artifacts
//! - Validating and ingesting WeChat articles
//! - Pure text analysis used by the WeChat endpoints

pub mod reports;
pub mod wechat;

pub use reports::{generate_report_id, ReportService, ReportServiceError};
pub use wechat::{WechatService, WechatServiceError};
