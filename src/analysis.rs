//! Report text analysis
//!
//! Turns the text of a generated or uploaded report into the
//! [`AnalysisResult`] the dashboard is drawn from: how strongly each industry
//! category is covered, where AI could be applied, keyword and figure
//! highlights, text statistics and a per-segment sentiment split.

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::charts::{AiOpportunity, AnalysisResult, CategoryData, ContentItem};
use crate::services::wechat::analysis::sentiment;

/// Segments longer than this start a new one
const SEGMENT_MAX_CHARS: usize = 200;
/// Shorter segments are dropped
const SEGMENT_MIN_CHARS: usize = 20;
const KEY_POINT_CHARS: usize = 100;
const MAX_KEY_POINTS: usize = 3;
const MAX_RELEVANT_SENTENCES: usize = 3;
const MAX_TOP_KEYWORDS: usize = 10;
const MAX_FIGURES: usize = 10;
const WORDS_PER_MINUTE: usize = 300;

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("产业概述", &["产业", "行业", "概述", "介绍", "背景", "现状", "发展历程", "规模"]),
    ("政策环境", &["政策", "政府", "法规", "支持", "扶持", "规划", "战略", "指导意见"]),
    ("市场规模", &["市场", "规模", "增长", "收入", "产值", "份额", "预测", "趋势"]),
    ("重点企业", &["企业", "公司", "厂商", "品牌", "龙头", "领军", "代表性", "知名"]),
    ("技术趋势", &["技术", "创新", "研发", "突破", "先进", "前沿", "升级", "改进"]),
    ("发展机遇", &["机遇", "机会", "优势", "潜力", "前景", "增长点", "新兴", "蓝海"]),
    ("挑战风险", &["挑战", "风险", "困难", "问题", "瓶颈", "威胁", "竞争", "压力"]),
    ("未来展望", &["未来", "展望", "预期", "预测", "目标", "规划", "愿景", "前景"]),
];

const AI_AREAS: &[(&str, &[&str], &str)] = &[
    (
        "智能制造",
        &["制造", "生产", "工厂", "设备", "自动化"],
        "考虑引入智能制造系统，通过物联网和机器学习优化生产流程",
    ),
    (
        "数据分析",
        &["数据", "分析", "统计", "洞察", "预测"],
        "建立数据分析平台，利用大数据和AI技术提供商业洞察",
    ),
    (
        "自动化流程",
        &["流程", "自动", "效率", "优化", "简化"],
        "实施流程自动化，使用RPA和AI减少人工操作",
    ),
    (
        "预测性维护",
        &["维护", "保养", "故障", "检修", "监控"],
        "部署预测性维护系统，利用传感器数据和机器学习预防设备故障",
    ),
    (
        "供应链优化",
        &["供应链", "物流", "库存", "采购", "配送"],
        "优化供应链管理，使用AI算法改进需求预测和库存管理",
    ),
    (
        "客户服务",
        &["客户", "服务", "体验", "满意", "支持"],
        "升级客户服务体系，引入智能客服和个性化推荐系统",
    ),
    (
        "质量控制",
        &["质量", "检测", "控制", "标准", "合规"],
        "强化质量控制，利用计算机视觉和机器学习自动检测产品质量",
    ),
];

fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => unreachable!("invalid built-in pattern {}: {}", pattern, e),
    }
}

// Markdown markup and other symbols; figures keep their `.` and `%`
static SYMBOLS: Lazy<Regex> =
    Lazy::new(|| compile(r"[^\w\s。，、；：？！“”‘’（）【】《》〈〉.%]"));
static BLANKS: Lazy<Regex> = Lazy::new(|| compile(r"[ \t\u{3000}]+"));
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| compile(r"[。！？]"));
static FIGURE: Lazy<Regex> = Lazy::new(|| compile(r"(.{0,20}?)(\d+(?:\.\d+)?[%万亿元美年月人家项个])"));
static LABEL_NOISE: Lazy<Regex> = Lazy::new(|| compile(r"[^\w\s]"));

/// Strip markup symbols and collapse blanks, keeping line breaks
pub fn clean_text(text: &str) -> String {
    let text = SYMBOLS.replace_all(text, " ");
    text.lines()
        .map(|line| BLANKS.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Paragraphs split into sentence runs of at most `SEGMENT_MAX_CHARS`
pub fn segment_text(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    for paragraph in text.lines().map(str::trim).filter(|p| !p.is_empty()) {
        let mut current = String::new();
        for sentence in SENTENCE_END.split(paragraph).map(str::trim).filter(|s| !s.is_empty()) {
            if !current.is_empty() && current.chars().count() + sentence.chars().count() > SEGMENT_MAX_CHARS {
                segments.push(std::mem::take(&mut current));
            }
            current.push_str(sentence);
            current.push('。');
        }
        if !current.is_empty() {
            segments.push(current);
        }
    }
    segments.retain(|s| s.chars().count() > SEGMENT_MIN_CHARS);
    segments
}

fn key_point(text: &str) -> String {
    if text.chars().count() > KEY_POINT_CHARS {
        format!("{}...", text.chars().take(KEY_POINT_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Keyword-scored segments per category, best first
pub fn categorize(segments: &[String]) -> BTreeMap<String, CategoryData> {
    CATEGORY_KEYWORDS
        .iter()
        .map(|(category, keywords)| {
            let mut content: Vec<ContentItem> = segments
                .iter()
                .filter_map(|segment| {
                    let score: usize = keywords.iter().map(|k| segment.matches(k).count() * 2).sum();
                    (score > 0).then(|| ContentItem {
                        text: segment.clone(),
                        score: score as f64,
                    })
                })
                .collect();
            content.sort_by(|a, b| b.score.total_cmp(&a.score));

            let data = CategoryData {
                relevance_score: content.iter().map(|c| c.score).sum(),
                key_points: content.iter().take(MAX_KEY_POINTS).map(|c| key_point(&c.text)).collect(),
                content,
            };
            (category.to_string(), data)
        })
        .collect()
}

fn recommendation(base: &str, mentions: usize) -> String {
    if mentions >= 5 {
        format!("高优先级：{}，该领域在文档中被频繁提及", base)
    } else if mentions >= 3 {
        format!("中等优先级：{}，具有一定的应用基础", base)
    } else {
        format!("潜在机会：{}，可以作为未来发展方向", base)
    }
}

/// AI application areas mentioned in `content`, scored 0-100
pub fn ai_opportunities(content: &str) -> BTreeMap<String, AiOpportunity> {
    let sentences: Vec<&str> = SENTENCE_END.split(content).map(str::trim).collect();

    AI_AREAS
        .iter()
        .filter_map(|(area, keywords, base)| {
            let mentions: usize = keywords.iter().map(|k| content.matches(k).count()).sum();
            if mentions == 0 {
                return None;
            }

            let mut relevant: Vec<Value> = Vec::new();
            for keyword in keywords.iter() {
                for sentence in sentences.iter().filter(|s| s.contains(keyword) && s.chars().count() > 10) {
                    let sentence = json!(sentence);
                    if !relevant.contains(&sentence) {
                        relevant.push(sentence);
                    }
                }
            }
            relevant.truncate(MAX_RELEVANT_SENTENCES);

            let opportunity = AiOpportunity {
                potential_score: (mentions * 10).min(100) as f64,
                recommendation: recommendation(base, mentions),
                relevant_content: relevant,
            };
            Some((area.to_string(), opportunity))
        })
        .collect()
}

/// Vocabulary terms by frequency, ties in table order
fn top_keywords(content: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut counts: Vec<(&str, usize)> = CATEGORY_KEYWORDS
        .iter()
        .flat_map(|(_, keywords)| keywords.iter())
        .chain(AI_AREAS.iter().flat_map(|(_, keywords, _)| keywords.iter()))
        .filter(|term| seen.insert(**term))
        .map(|term| (*term, content.matches(term).count()))
        .filter(|(_, count)| *count > 0)
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    counts
        .into_iter()
        .take(MAX_TOP_KEYWORDS)
        .map(|(term, frequency)| json!({ "term": term, "frequency": frequency }))
        .collect()
}

/// Figures with units, labelled by the text just before them
fn figures(content: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    FIGURE
        .captures_iter(content)
        .filter_map(|caps| {
            let context = LABEL_NOISE.replace_all(&caps[1], "");
            let words: Vec<&str> = context.split_whitespace().collect();
            if words.is_empty() {
                return None;
            }
            let value = caps[2].to_string();
            if !seen.insert(value.clone()) {
                return None;
            }
            let label = words[words.len().saturating_sub(3)..].join(" ");
            Some(json!({ "label": label, "value": value }))
        })
        .take(MAX_FIGURES)
        .collect()
}

fn key_insights(content: &str) -> Vec<Value> {
    let mut insights = vec![json!({
        "type": "top_keywords",
        "title": "关键词分析",
        "data": top_keywords(content),
    })];
    let figures = figures(content);
    if !figures.is_empty() {
        insights.push(json!({ "type": "numerical_data", "title": "数据要点", "data": figures }));
    }
    insights
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Latin words and numbers as-is, Chinese runs in two-character chunks
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut latin = String::new();
    let mut cjk: Vec<char> = Vec::new();

    let flush_cjk = |cjk: &mut Vec<char>, tokens: &mut Vec<String>| {
        tokens.extend(cjk.chunks(2).map(|pair| pair.iter().collect::<String>()));
        cjk.clear();
    };

    for c in text.chars() {
        if is_cjk(c) {
            if !latin.is_empty() {
                tokens.push(std::mem::take(&mut latin));
            }
            cjk.push(c);
        } else if c.is_alphanumeric() {
            flush_cjk(&mut cjk, &mut tokens);
            latin.push(c);
        } else {
            flush_cjk(&mut cjk, &mut tokens);
            if !latin.is_empty() {
                tokens.push(std::mem::take(&mut latin));
            }
        }
    }
    flush_cjk(&mut cjk, &mut tokens);
    if !latin.is_empty() {
        tokens.push(latin);
    }
    tokens
}

fn statistics(content: &str, segments: &[String]) -> Map<String, Value> {
    let tokens = tokenize(content);
    let unique: HashSet<&String> = tokens.iter().collect();
    let segment_chars: usize = segments.iter().map(|s| s.chars().count()).sum();
    let avg_segment_length = if segments.is_empty() { 0 } else { segment_chars / segments.len() };

    let stats = json!({
        "total_characters": content.chars().count(),
        "total_words": tokens.len(),
        "total_segments": segments.len(),
        "avg_segment_length": avg_segment_length,
        "reading_time_minutes": (tokens.len() / WORDS_PER_MINUTE).max(1),
        "unique_words": unique.len(),
    });
    match stats {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Vocabulary sentiment per segment; above .6 counts positive, below .4 negative
fn sentiment_analysis(segments: &[String]) -> Map<String, Value> {
    let scores: Vec<f64> = segments
        .iter()
        .filter(|s| s.chars().count() > 10)
        .map(|s| sentiment(s).positive)
        .collect();
    let positive = scores.iter().filter(|s| **s > 0.6).count();
    let negative = scores.iter().filter(|s| **s < 0.4).count();
    let average = if scores.is_empty() {
        0.5
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };
    let overall = if average > 0.6 {
        "积极"
    } else if average < 0.4 {
        "消极"
    } else {
        "中性"
    };

    let result = json!({
        "overall_sentiment": overall,
        "average_score": round3(average),
        "positive_segments": positive,
        "negative_segments": negative,
        "total_segments": scores.len(),
        "confidence": round3(1.0 - (0.5 - average).abs() * 2.0),
    });
    match result {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Full analysis of a report's text; `metadata` is stored as given
pub fn analyze_text(content: &str, metadata: Map<String, Value>) -> AnalysisResult {
    let clean = clean_text(content);
    let segments = segment_text(&clean);

    tracing::debug!("Analysed {} chars into {} segments", clean.chars().count(), segments.len());

    AnalysisResult {
        categories: categorize(&segments),
        ai_opportunities: ai_opportunities(&clean),
        key_insights: key_insights(&clean),
        statistics: statistics(&clean, &segments),
        sentiment_analysis: sentiment_analysis(&segments),
        metadata,
    }
}
