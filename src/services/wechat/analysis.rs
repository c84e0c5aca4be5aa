//! Text analysis of WeChat article content
//!
//! Everything here is pure: keyword extraction, a vocabulary-based sentiment
//! score and the policy documents an article refers to.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const SUMMARY_CHARS: usize = 200;
const MAX_AMOUNTS: usize = 10;
const MAX_POLICIES: usize = 10;

const POLICY_KEYWORDS: &[&str] = &[
    "政策", "补贴", "扶持", "资金", "税收", "优惠", "人才", "研发", "创新", "产业", "发展", "计划",
    "申报", "资格", "条件", "项目", "支持", "措施", "要求", "标准", "金额", "比例", "期限", "截止日期",
];

const POSITIVE_WORDS: &[&str] = &[
    "支持", "鼓励", "促进", "推动", "发展", "利好", "优惠", "补贴", "扶持", "奖励", "增长", "提升",
    "创新", "突破", "成就",
];

const NEGATIVE_WORDS: &[&str] = &[
    "限制", "禁止", "暂停", "取消", "整改", "处罚", "风险", "挑战", "困难", "下降", "减少", "关停",
    "问题", "障碍", "不利",
];

fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => unreachable!("invalid built-in pattern {}: {}", pattern, e),
    }
}

static TAG: Lazy<Regex> = Lazy::new(|| compile(r"<[^>]*>"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| compile(r"\s+"));
static AMOUNT: Lazy<Regex> = Lazy::new(|| compile(r"(\d+(?:\.\d+)?)\s*(?:[亿万千百]|万元?|%)"));
static DATES: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        compile(r"(\d{4})年(\d{1,2})月(\d{1,2})日"),
        compile(r"(\d{4})-(\d{1,2})-(\d{1,2})"),
    ]
});
static POLICY_REFERENCES: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        compile(r"(?:关于|印发|发布|制定)(.*?)(?:政策|办法|条例|规定|意见|实施方案|指导意见|通知|细则)"),
        compile(r"(.*?)(?:政策|办法|条例|规定|意见|实施方案|指导意见|通知|细则)(?:相关|有关|具体)"),
        compile(r"(?:参考|依据|按照)(.*?)(?:政策|文件|规定|要求)"),
    ]
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Overall {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
    pub overall: Overall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub content_keywords: Vec<String>,
    pub sentiment: Sentiment,
    pub related_policies: Vec<String>,
    pub summary: String,
}

/// Replace tags with spaces and collapse whitespace
pub fn clean_html(html: &str) -> String {
    let text = TAG.replace_all(html, " ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// First `SUMMARY_CHARS` characters of the cleaned text
pub fn summarize(content: &str) -> String {
    clean_html(content).chars().take(SUMMARY_CHARS).collect()
}

fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// Policy vocabulary, amounts and full dates found in `content`
pub fn content_keywords(content: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    for word in POLICY_KEYWORDS {
        if content.contains(word) {
            push_unique(&mut keywords, word.to_string());
        }
    }
    for amount in AMOUNT.captures_iter(content).take(MAX_AMOUNTS) {
        push_unique(&mut keywords, amount[1].to_string());
    }
    for pattern in DATES.iter() {
        for date in pattern.captures_iter(content) {
            push_unique(&mut keywords, format!("{}年{}月{}日", &date[1], &date[2], &date[3]));
        }
    }
    keywords
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

pub fn sentiment(content: &str) -> Sentiment {
    let text = content.to_lowercase();
    let positive = POSITIVE_WORDS.iter().filter(|w| text.contains(*w)).count() as f64;
    let negative = NEGATIVE_WORDS.iter().filter(|w| text.contains(*w)).count() as f64;
    let total = positive + negative;

    if total == 0.0 {
        return Sentiment {
            positive: 0.5,
            negative: 0.0,
            neutral: 0.5,
            overall: Overall::Neutral,
        };
    }

    let pos = positive / total;
    let neg = negative / total;
    let overall = if pos > neg * 1.5 {
        Overall::Positive
    } else if neg > pos * 1.5 {
        Overall::Negative
    } else {
        Overall::Neutral
    };
    Sentiment {
        positive: round3(pos),
        negative: round3(neg),
        neutral: round3(1.0 - (pos + neg)),
        overall,
    }
}

/// Names of policy documents the text refers to
pub fn related_policies(content: &str) -> Vec<String> {
    let mut policies = Vec::new();
    for pattern in POLICY_REFERENCES.iter() {
        for caps in pattern.captures_iter(content) {
            let name = caps[1].trim();
            if name.chars().count() > 2 {
                push_unique(&mut policies, name.to_string());
            }
        }
    }
    policies.truncate(MAX_POLICIES);
    policies
}

/// Full analysis of possibly HTML content
pub fn analyze(content: &str) -> ContentAnalysis {
    let text = clean_html(content);
    ContentAnalysis {
        content_keywords: content_keywords(&text),
        sentiment: sentiment(&text),
        related_policies: related_policies(&text),
        summary: text.chars().take(SUMMARY_CHARS).collect(),
    }
}
