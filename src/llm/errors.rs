//! Provider error classification
//!
//! Raw provider failures are matched against per-service pattern tables and
//! turned into a `ClassifiedError` carrying a user-facing message, a
//! suggested action and a retry hint. Classified errors are kept in an
//! `ErrorHistory` that backs `/api/api-status`.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::LlmService;

/// Category of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorType {
    QuotaExceeded,
    RateLimited,
    ConnectionTimeout,
    ConnectionRefused,
    ServiceUnavailable,
    AuthenticationError,
    InvalidRequest,
    UnknownError,
}

impl ApiErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorType::QuotaExceeded => "quota_exceeded",
            ApiErrorType::RateLimited => "rate_limited",
            ApiErrorType::ConnectionTimeout => "connection_timeout",
            ApiErrorType::ConnectionRefused => "connection_refused",
            ApiErrorType::ServiceUnavailable => "service_unavailable",
            ApiErrorType::AuthenticationError => "authentication_error",
            ApiErrorType::InvalidRequest => "invalid_request",
            ApiErrorType::UnknownError => "unknown_error",
        }
    }
}

type PatternTable = Vec<(ApiErrorType, Vec<Regex>)>;

fn table(entries: &[(ApiErrorType, &[&str])]) -> PatternTable {
    entries
        .iter()
        .map(|(kind, patterns)| {
            let compiled = patterns
                .iter()
                .filter_map(|p| Regex::new(&format!("(?i){}", p)).ok())
                .collect();
            (*kind, compiled)
        })
        .collect()
}

static KIMI_PATTERNS: Lazy<PatternTable> = Lazy::new(|| {
    table(&[
        (
            ApiErrorType::QuotaExceeded,
            &[
                r"quota.*exceeded",
                r"rate.*limit.*exceeded",
                r"insufficient.*quota",
                r"配额.*已用完",
                r"配额.*不足",
                r"超出.*配额",
                r"余额.*不足",
            ],
        ),
        (
            ApiErrorType::RateLimited,
            &[r"too.*many.*requests", r"rate.*limit", r"request.*limit"],
        ),
        (
            ApiErrorType::ConnectionTimeout,
            &[r"timeout", r"timed.*out", r"connection.*timeout"],
        ),
        (
            ApiErrorType::ConnectionRefused,
            &[r"connection.*refused", r"refused.*connection", r"unable.*to.*connect"],
        ),
        (
            ApiErrorType::ServiceUnavailable,
            &[r"service.*unavailable", r"server.*error", r"internal.*error", r"maintenance"],
        ),
        (
            ApiErrorType::AuthenticationError,
            &[
                r"authentication.*failed",
                r"invalid.*api.*key",
                r"unauthorized",
                r"认证.*失败",
                r"无效.*密钥",
            ],
        ),
    ])
});

static GEMINI_PATTERNS: Lazy<PatternTable> = Lazy::new(|| {
    table(&[
        (
            ApiErrorType::QuotaExceeded,
            &[
                r"quota.*exceeded",
                r"project.*quota",
                r"user.*quota",
                r"quota.*limit",
                r"配额.*已用完",
                r"配额.*不足",
                r"超出.*配额",
                r"余额.*不足",
            ],
        ),
        (
            ApiErrorType::RateLimited,
            &[
                r"too.*many.*requests",
                r"rate.*limit.*exceeded",
                r"rate.*limit",
                r"quota.*per.*minute",
            ],
        ),
        (
            ApiErrorType::ConnectionTimeout,
            &[r"timeout", r"deadline.*exceeded", r"connection.*timeout"],
        ),
        (
            ApiErrorType::ConnectionRefused,
            &[r"connection.*refused", r"unreachable", r"network.*error"],
        ),
        (
            ApiErrorType::ServiceUnavailable,
            &[
                r"service.*unavailable",
                r"internal.*server.*error",
                r"temporarily.*unavailable",
            ],
        ),
        (
            ApiErrorType::AuthenticationError,
            &[
                r"api.*key.*not.*valid",
                r"permission.*denied",
                r"authentication.*failed",
            ],
        ),
    ])
});

static DOUBAO_PATTERNS: Lazy<PatternTable> = Lazy::new(|| {
    table(&[
        (
            ApiErrorType::QuotaExceeded,
            &[r"quota.*exceeded", r"insufficient.*balance", r"余额.*不足"],
        ),
        (ApiErrorType::RateLimited, &[r"rate.*limit", r"too.*many.*requests"]),
        (ApiErrorType::ConnectionTimeout, &[r"timeout", r"connection.*timeout"]),
        (
            ApiErrorType::ConnectionRefused,
            &[r"connection.*refused", r"unable.*to.*connect"],
        ),
        (
            ApiErrorType::ServiceUnavailable,
            &[r"service.*unavailable", r"server.*error"],
        ),
        (
            ApiErrorType::AuthenticationError,
            &[r"authentication.*failed", r"invalid.*credentials"],
        ),
    ])
});

static RETRY_AFTER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)retry.*after.*(\d+)").ok());

fn patterns_for(service: LlmService) -> &'static PatternTable {
    match service {
        LlmService::Kimi => &KIMI_PATTERNS,
        LlmService::Gemini => &GEMINI_PATTERNS,
        LlmService::Doubao => &DOUBAO_PATTERNS,
    }
}

/// Detect the error type of a raw provider message
pub fn detect_type(message: &str, service: LlmService) -> ApiErrorType {
    let lowered = message.to_lowercase();

    for (kind, patterns) in patterns_for(service) {
        if patterns.iter().any(|re| re.is_match(&lowered)) {
            return *kind;
        }
    }

    if ["connection", "network", "timeout", "refused"]
        .iter()
        .any(|k| lowered.contains(k))
    {
        if lowered.contains("timeout") {
            return ApiErrorType::ConnectionTimeout;
        }
        if lowered.contains("refused") {
            return ApiErrorType::ConnectionRefused;
        }
        return ApiErrorType::ServiceUnavailable;
    }

    ApiErrorType::UnknownError
}

pub fn user_message(kind: ApiErrorType, service: LlmService) -> &'static str {
    match (kind, service) {
        (ApiErrorType::QuotaExceeded, LlmService::Kimi) => {
            "🚫 Kimi API 配额已用完！本月免费额度已耗尽，请考虑以下选项："
        }
        (ApiErrorType::QuotaExceeded, LlmService::Gemini) => {
            "🚫 Google Gemini API 配额已用完！请检查您的 Google Cloud 配额设置："
        }
        (ApiErrorType::QuotaExceeded, LlmService::Doubao) => {
            "🚫 豆包大模型 API 余额不足！请充值或更换其他服务："
        }
        (ApiErrorType::RateLimited, LlmService::Kimi) => "⏳ Kimi API 请求过于频繁！请稍后再试：",
        (ApiErrorType::RateLimited, LlmService::Gemini) => {
            "⏳ Google Gemini API 请求过于频繁！请稍后再试："
        }
        (ApiErrorType::RateLimited, LlmService::Doubao) => {
            "⏳ 豆包大模型 API 请求过于频繁！请稍后再试："
        }
        (ApiErrorType::ConnectionTimeout, _) => "⏰ 连接超时！请检查网络连接或稍后再试。",
        (ApiErrorType::ConnectionRefused, _) => {
            "❌ 无法连接到 AI 服务！请检查网络设置或防火墙配置。"
        }
        (ApiErrorType::ServiceUnavailable, _) => {
            "🔧 AI 服务暂时不可用！服务可能正在维护中，请稍后再试。"
        }
        (ApiErrorType::AuthenticationError, _) => {
            "🔑 API 密钥验证失败！请检查配置文件中的 API 密钥是否正确。"
        }
        (ApiErrorType::InvalidRequest, _) | (ApiErrorType::UnknownError, _) => {
            "❓ 发生未知错误！请查看日志详情或联系技术支持。"
        }
    }
}

pub fn suggested_action(kind: ApiErrorType, service: LlmService) -> &'static str {
    match (kind, service) {
        (ApiErrorType::QuotaExceeded, LlmService::Kimi) => {
            "建议：1) 切换到 Gemini 或豆包大模型 2) 等待下个月配额重置 3) 购买付费套餐"
        }
        (ApiErrorType::QuotaExceeded, LlmService::Gemini) => {
            "建议：1) 切换到 Kimi 或豆包大模型 2) 在 Google Cloud Console 中增加配额 3) 使用其他 Google 项目"
        }
        (ApiErrorType::QuotaExceeded, LlmService::Doubao) => {
            "建议：1) 切换到 Kimi 或 Gemini 2) 为豆包大模型账户充值 3) 使用其他服务"
        }
        (ApiErrorType::RateLimited, _) => "建议：等待几分钟后重试，或切换到其他 AI 服务。",
        (ApiErrorType::ConnectionTimeout, _) => "建议：检查网络连接，刷新页面，或稍后再试。",
        (ApiErrorType::ConnectionRefused, _) => {
            "建议：检查防火墙设置，确认网络可以访问外部服务，或联系网络管理员。"
        }
        (ApiErrorType::ServiceUnavailable, _) => "建议：等待服务恢复，或切换到其他可用的 AI 服务。",
        (ApiErrorType::AuthenticationError, _) => {
            "建议：检查 config.json 文件中的 API 密钥配置，确保密钥有效且未过期。"
        }
        (ApiErrorType::InvalidRequest, _) | (ApiErrorType::UnknownError, _) => {
            "建议：查看详细错误日志，尝试重新操作，或联系技术支持。"
        }
    }
}

/// Recommended wait in seconds before retrying
pub fn retry_after(kind: ApiErrorType, message: &str) -> Option<u64> {
    match kind {
        ApiErrorType::RateLimited => Some(60),
        ApiErrorType::ConnectionTimeout => Some(30),
        ApiErrorType::ServiceUnavailable => Some(300),
        ApiErrorType::QuotaExceeded => Some(3600),
        _ => RETRY_AFTER
            .as_ref()
            .and_then(|re| re.captures(message))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok()),
    }
}

/// A provider failure with everything needed to report it to the user
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedError {
    pub error_type: ApiErrorType,
    pub service: LlmService,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub retry_after: Option<u64>,
    pub suggested_action: String,
    pub user_message: String,
}

impl ClassifiedError {
    /// Quota and credential problems need user action; transient failures
    /// can be retried straight away.
    pub fn should_retry_immediately(&self) -> bool {
        matches!(
            self.error_type,
            ApiErrorType::ConnectionTimeout
                | ApiErrorType::ConnectionRefused
                | ApiErrorType::ServiceUnavailable
                | ApiErrorType::RateLimited
        )
    }
}

pub fn classify(message: &str, service: LlmService) -> ClassifiedError {
    let error_type = detect_type(message, service);
    ClassifiedError {
        error_type,
        service,
        message: message.to_string(),
        timestamp: Utc::now(),
        retry_after: retry_after(error_type, message),
        suggested_action: suggested_action(error_type, service).to_string(),
        user_message: user_message(error_type, service).to_string(),
    }
}

/// First service in fallback order, other than `failed`, that is available
pub fn fallback_service(failed: LlmService, available: &[LlmService]) -> Option<LlmService> {
    LlmService::ALL
        .into_iter()
        .find(|s| *s != failed && available.contains(s))
}

/// Process-wide record of classified provider failures
#[derive(Debug, Default)]
pub struct ErrorHistory {
    errors: Mutex<Vec<ClassifiedError>>,
}

impl ErrorHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ClassifiedError>> {
        self.errors.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Classify `message`, store it and return the classification
    pub fn record(&self, message: &str, service: LlmService) -> ClassifiedError {
        let classified = classify(message, service);
        tracing::error!(
            service = %service,
            error_type = classified.error_type.as_str(),
            "LLM API error: {} ({})",
            classified.user_message,
            message
        );
        self.lock().push(classified.clone());
        classified
    }

    /// Most recent `n` errors, oldest first
    pub fn recent(&self, n: usize) -> Vec<ClassifiedError> {
        let errors = self.lock();
        let start = errors.len().saturating_sub(n);
        errors[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Aggregate over the last ten errors
    pub fn summary(&self) -> Value {
        let errors = self.lock();
        if errors.is_empty() {
            return json!({"status": "ok", "message": "No recent errors"});
        }

        let start = errors.len().saturating_sub(10);
        let recent = &errors[start..];

        let mut error_types = Map::new();
        let mut affected_services = Map::new();
        for err in recent {
            bump(&mut error_types, err.error_type.as_str());
            bump(&mut affected_services, err.service.as_str());
        }

        let last = &recent[recent.len() - 1];
        json!({
            "status": "error_summary",
            "total_errors": errors.len(),
            "recent_errors": recent.len(),
            "error_types": error_types,
            "affected_services": affected_services,
            "last_error": {
                "type": last.error_type.as_str(),
                "service": last.service.as_str(),
                "message": last.user_message,
                "timestamp": last.timestamp.to_rfc3339(),
            }
        })
    }
}

fn bump(counts: &mut Map<String, Value>, key: &str) {
    let next = counts.get(key).and_then(Value::as_u64).unwrap_or(0) + 1;
    counts.insert(key.to_string(), json!(next));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kimi_rate_limit_exceeded_is_quota() {
        assert_eq!(
            detect_type("Rate limit exceeded for org", LlmService::Kimi),
            ApiErrorType::QuotaExceeded
        );
        assert_eq!(
            detect_type("Rate limit exceeded for org", LlmService::Gemini),
            ApiErrorType::RateLimited
        );
    }

    #[test]
    fn test_pattern_tables_per_service() {
        assert_eq!(
            detect_type("HTTP 429 Too Many Requests: slow down", LlmService::Kimi),
            ApiErrorType::RateLimited
        );
        assert_eq!(
            detect_type("Deadline exceeded while waiting", LlmService::Gemini),
            ApiErrorType::ConnectionTimeout
        );
        assert_eq!(
            detect_type("API key not valid. Please pass a valid API key.", LlmService::Gemini),
            ApiErrorType::AuthenticationError
        );
        assert_eq!(
            detect_type("HTTP 401 Unauthorized: Invalid Authentication", LlmService::Kimi),
            ApiErrorType::AuthenticationError
        );
        assert_eq!(
            detect_type("账户余额不足", LlmService::Doubao),
            ApiErrorType::QuotaExceeded
        );
        assert_eq!(
            detect_type("HTTP 503 Service Unavailable: busy", LlmService::Doubao),
            ApiErrorType::ServiceUnavailable
        );
    }

    #[test]
    fn test_heuristics_when_no_pattern_matches() {
        assert_eq!(
            detect_type("network is down", LlmService::Kimi),
            ApiErrorType::ServiceUnavailable
        );
        assert_eq!(
            detect_type("connection reset", LlmService::Doubao),
            ApiErrorType::ServiceUnavailable
        );
        assert_eq!(
            detect_type("something odd happened", LlmService::Kimi),
            ApiErrorType::UnknownError
        );
    }

    #[test]
    fn test_classification_messages_and_retry_hints() {
        let err = classify("insufficient quota", LlmService::Kimi);
        assert_eq!(err.error_type, ApiErrorType::QuotaExceeded);
        assert_eq!(err.retry_after, Some(3600));
        assert!(err.user_message.starts_with("🚫 Kimi API 配额已用完"));
        assert!(err.suggested_action.contains("切换到 Gemini"));
        assert!(!err.should_retry_immediately());

        let err = classify("request timed out", LlmService::Kimi);
        assert_eq!(err.error_type, ApiErrorType::ConnectionTimeout);
        assert_eq!(err.retry_after, Some(30));
        assert!(err.should_retry_immediately());

        let err = classify("weird failure, retry after 42 seconds", LlmService::Gemini);
        assert_eq!(err.error_type, ApiErrorType::UnknownError);
        assert!(err.retry_after.is_some());
        assert_eq!(err.user_message, "❓ 发生未知错误！请查看日志详情或联系技术支持。");
    }

    #[test]
    fn test_fallback_order_skips_failed_and_unavailable() {
        let all = LlmService::ALL.to_vec();
        assert_eq!(fallback_service(LlmService::Kimi, &all), Some(LlmService::Gemini));
        assert_eq!(fallback_service(LlmService::Gemini, &all), Some(LlmService::Kimi));
        assert_eq!(
            fallback_service(LlmService::Kimi, &[LlmService::Kimi, LlmService::Doubao]),
            Some(LlmService::Doubao)
        );
        assert_eq!(fallback_service(LlmService::Kimi, &[LlmService::Kimi]), None);
    }

    #[test]
    fn test_history_summary() {
        let history = ErrorHistory::new();
        assert_eq!(history.summary()["status"], "ok");

        history.record("quota exceeded", LlmService::Kimi);
        history.record("request timed out", LlmService::Kimi);
        history.record("permission denied", LlmService::Gemini);

        let summary = history.summary();
        assert_eq!(summary["status"], "error_summary");
        assert_eq!(summary["total_errors"], 3);
        assert_eq!(summary["recent_errors"], 3);
        assert_eq!(summary["error_types"]["quota_exceeded"], 1);
        assert_eq!(summary["affected_services"]["kimi"], 2);
        assert_eq!(summary["last_error"]["type"], "authentication_error");
        assert_eq!(summary["last_error"]["service"], "gemini");

        let recent = history.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].service, LlmService::Gemini);

        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_summary_window_is_last_ten() {
        let history = ErrorHistory::new();
        for _ in 0..12 {
            history.record("timeout", LlmService::Kimi);
        }
        let summary = history.summary();
        assert_eq!(summary["total_errors"], 12);
        assert_eq!(summary["recent_errors"], 10);
        assert_eq!(summary["error_types"]["connection_timeout"], 10);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn classification_is_deterministic_and_consistent(msg in ".{0,80}", idx in 0usize..3) {
            let service = LlmService::ALL[idx];
            let first = classify(&msg, service);
            let second = classify(&msg, service);
            prop_assert_eq!(first.error_type, second.error_type);
            prop_assert_eq!(first.user_message, user_message(first.error_type, service));
            prop_assert_eq!(first.suggested_action, suggested_action(first.error_type, service));
        }

        #[test]
        fn fixed_retry_hints_ignore_message(msg in "[a-z ]{0,40}") {
            prop_assert_eq!(retry_after(ApiErrorType::RateLimited, &msg), Some(60));
            prop_assert_eq!(retry_after(ApiErrorType::QuotaExceeded, &msg), Some(3600));
        }

        #[test]
        fn fallback_never_returns_failed_service(failed in 0usize..3, mask in 0u8..8) {
            let failed = LlmService::ALL[failed];
            let available: Vec<LlmService> = LlmService::ALL
                .into_iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, s)| s)
                .collect();
            if let Some(next) = fallback_service(failed, &available) {
                prop_assert_ne!(next, failed);
                prop_assert!(available.contains(&next));
            }
        }
    }
}
