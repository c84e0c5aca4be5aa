//! Plotly chart payloads for the analysis dashboard
//!
//! Charts are plain serde structures that serialise to the JSON shape the
//! frontend hands to `Plotly.newPlot`.

use std::collections::BTreeMap;

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PRIMARY: &str = "#2563eb";
pub const SUCCESS: &str = "#059669";
pub const WARNING: &str = "#d97706";
pub const DANGER: &str = "#dc2626";
pub const INFO: &str = "#0891b2";
pub const LIGHT: &str = "#f1f5f9";

const DEFAULT_TITLE: &str = "区域产业分析报告";
const TITLE_SUFFIX: &str = " - AIPE区域产业分析小工作台";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Color {
    Single(String),
    PerBar(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub color: Color,
}

/// One plotly trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trace {
    Scatterpolar {
        r: Vec<f64>,
        theta: Vec<String>,
        fill: String,
        name: String,
    },
    Bar {
        x: Vec<String>,
        y: Vec<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        marker: Option<Marker>,
    },
    Pie {
        labels: Vec<String>,
        values: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadialAxis {
    pub visible: bool,
    pub range: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polar {
    pub radialaxis: RadialAxis,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xaxis: Option<Axis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaxis: Option<Axis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polar: Option<Polar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub showlegend: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub data: Vec<Trace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryData {
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(default)]
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiOpportunity {
    #[serde(default)]
    pub potential_score: f64,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default)]
    pub relevant_content: Vec<Value>,
}

/// Output of the text analyser, as stored under `analysis` in a report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryData>,
    #[serde(default)]
    pub ai_opportunities: BTreeMap<String, AiOpportunity>,
    #[serde(default)]
    pub key_insights: Vec<Value>,
    #[serde(default)]
    pub statistics: Map<String, Value>,
    #[serde(default)]
    pub sentiment_analysis: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

pub fn priority_level(score: f64) -> &'static str {
    if score >= 70.0 {
        "high"
    } else if score >= 40.0 {
        "medium"
    } else if score > 0.0 {
        "low"
    } else {
        "none"
    }
}

pub fn score_color(score: f64) -> &'static str {
    if score >= 70.0 {
        SUCCESS
    } else if score >= 40.0 {
        WARNING
    } else if score > 0.0 {
        INFO
    } else {
        LIGHT
    }
}

fn num(map: &Map<String, Value>, key: &str) -> f64 {
    map.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Always exactly one `scatterpolar` series, empty when there is no data
pub fn ai_radar_chart(opportunities: &BTreeMap<String, AiOpportunity>) -> Chart {
    Chart {
        data: vec![Trace::Scatterpolar {
            r: opportunities.values().map(|o| o.potential_score).collect(),
            theta: opportunities.keys().cloned().collect(),
            fill: "toself".to_string(),
            name: "AI应用机会".to_string(),
        }],
        layout: Some(Layout {
            title: Some("AI应用机会雷达图".to_string()),
            polar: Some(Polar {
                radialaxis: RadialAxis {
                    visible: true,
                    range: [0.0, 100.0],
                },
            }),
            showlegend: Some(false),
            ..Layout::default()
        }),
    }
}

/// Part-of-speech counts, from `[{pos, count}]`
pub fn pos_chart(pos: &[Value]) -> Chart {
    Chart {
        data: vec![Trace::Bar {
            x: pos
                .iter()
                .map(|p| p.get("pos").and_then(Value::as_str).unwrap_or("Unknown").to_string())
                .collect(),
            y: pos
                .iter()
                .map(|p| p.get("count").and_then(Value::as_f64).unwrap_or(0.0))
                .collect(),
            marker: Some(Marker {
                color: Color::Single(PRIMARY.to_string()),
            }),
        }],
        layout: Some(Layout {
            title: Some("词性分析统计".to_string()),
            xaxis: Some(Axis { title: "词性".to_string() }),
            yaxis: Some(Axis { title: "出现次数".to_string() }),
            ..Layout::default()
        }),
    }
}

/// Donut of categories with a positive relevance score
pub fn category_chart(categories: &BTreeMap<String, CategoryData>) -> Option<Chart> {
    let scored: Vec<(&String, f64)> = categories
        .iter()
        .filter(|(_, c)| c.relevance_score > 0.0)
        .map(|(name, c)| (name, c.relevance_score))
        .collect();
    if scored.is_empty() {
        return None;
    }
    Some(Chart {
        data: vec![Trace::Pie {
            labels: scored.iter().map(|(n, _)| (*n).clone()).collect(),
            values: scored.iter().map(|(_, s)| *s).collect(),
        }],
        layout: None,
    })
}

/// Top ten terms from `[{term, frequency}]`
pub fn keyword_chart(keywords: &[Value]) -> Option<Chart> {
    if keywords.is_empty() {
        return None;
    }
    let top = &keywords[..keywords.len().min(10)];
    Some(Chart {
        data: vec![Trace::Bar {
            x: top
                .iter()
                .map(|k| k.get("term").and_then(Value::as_str).unwrap_or_default().to_string())
                .collect(),
            y: top
                .iter()
                .map(|k| k.get("frequency").and_then(Value::as_f64).unwrap_or(0.0))
                .collect(),
            marker: None,
        }],
        layout: None,
    })
}

pub fn statistics_chart(statistics: &Map<String, Value>) -> Option<Chart> {
    if statistics.is_empty() {
        return None;
    }
    let fields = [
        ("总字符数", "total_characters"),
        ("总词数", "total_words"),
        ("文本段数", "total_segments"),
        ("平均段落长度", "avg_segment_length"),
        ("阅读时间(分钟)", "reading_time_minutes"),
        ("唯一词数", "unique_words"),
    ];
    Some(Chart {
        data: vec![Trace::Bar {
            x: fields.iter().map(|(label, _)| label.to_string()).collect(),
            y: fields.iter().map(|(_, key)| num(statistics, key)).collect(),
            marker: None,
        }],
        layout: None,
    })
}

/// Positive / neutral / negative segment counts
pub fn sentiment_chart(sentiment: &Map<String, Value>) -> Option<Chart> {
    if sentiment.is_empty() {
        return None;
    }
    let positive = num(sentiment, "positive_segments");
    let negative = num(sentiment, "negative_segments");
    let total = sentiment
        .get("total_segments")
        .and_then(Value::as_f64)
        .unwrap_or(1.0);
    let neutral = total - positive - negative;

    Some(Chart {
        data: vec![Trace::Bar {
            x: vec!["积极".to_string(), "中性".to_string(), "消极".to_string()],
            y: vec![positive, neutral, negative],
            marker: Some(Marker {
                color: Color::PerBar(vec![SUCCESS.to_string(), INFO.to_string(), DANGER.to_string()]),
            }),
        }],
        layout: Some(Layout {
            title: Some("情感分析分布".to_string()),
            xaxis: Some(Axis { title: "情感倾向".to_string() }),
            yaxis: Some(Axis { title: "段落数量".to_string() }),
            ..Layout::default()
        }),
    })
}

fn insight_data<'a>(insights: &'a [Value], kind: &str) -> Option<&'a [Value]> {
    insights
        .iter()
        .find(|i| i.get("type").and_then(Value::as_str) == Some(kind))
        .map(|i| i.get("data").and_then(Value::as_array).map_or(&[][..], |a| a.as_slice()))
}

pub fn charts(analysis: &AnalysisResult) -> BTreeMap<String, Chart> {
    let mut charts = BTreeMap::new();

    if let Some(chart) = category_chart(&analysis.categories) {
        charts.insert("category_distribution".to_string(), chart);
    }
    charts.insert("ai_opportunities".to_string(), ai_radar_chart(&analysis.ai_opportunities));
    if let Some(chart) = insight_data(&analysis.key_insights, "top_keywords").and_then(keyword_chart) {
        charts.insert("keyword_frequency".to_string(), chart);
    }
    if let Some(chart) = statistics_chart(&analysis.statistics) {
        charts.insert("statistics_overview".to_string(), chart);
    }
    let overall = analysis
        .sentiment_analysis
        .get("overall_sentiment")
        .and_then(Value::as_str);
    if overall != Some("未知") {
        if let Some(chart) = sentiment_chart(&analysis.sentiment_analysis) {
            charts.insert("sentiment_analysis".to_string(), chart);
        }
    }
    if let Some(pos) = insight_data(&analysis.key_insights, "pos_analysis") {
        charts.insert("pos_analysis".to_string(), pos_chart(pos));
    }
    charts
}

static TIMESTAMP_RUN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\d{8}_?\d{6}").ok());

/// Dashboard title from the analysed file name
pub fn dashboard_title(metadata: &Map<String, Value>) -> String {
    let source = metadata
        .get("source_file")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_TITLE);
    let stem = match source.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => source,
    };

    // Timestamps are stripped before separators become spaces
    let stripped = match TIMESTAMP_RUN.as_ref() {
        Some(re) => re.replace_all(stem, "").into_owned(),
        None => stem.to_string(),
    };
    let mut base = stripped.replace(['_', '-'], " ").trim().to_string();

    if base.chars().count() > 30 {
        let words: Vec<&str> = base
            .split_whitespace()
            .filter(|w| w.chars().count() > 1 && !w.chars().all(|c| c.is_ascii_digit()))
            .collect();
        if words.len() > 5 {
            base = words[..5].join(" ");
        }
    }
    if base.chars().count() > 50 || base.chars().count() < 2 {
        base = DEFAULT_TITLE.to_string();
    }
    format!("{}{}", base, TITLE_SUFFIX)
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub word_count: f64,
    pub reading_time: f64,
    pub categories_analyzed: usize,
    pub ai_opportunities: usize,
    pub high_priority_ai: usize,
    pub key_highlights: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryView {
    pub relevance_score: f64,
    pub content_count: usize,
    pub key_points: Vec<String>,
    pub top_content: Vec<String>,
    pub has_content: bool,
    pub priority_level: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AiOpportunityView {
    pub potential_score: f64,
    pub priority_level: &'static str,
    pub recommendation: String,
    pub relevant_content: Vec<Value>,
    pub color: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub title: String,
    pub summary: DashboardSummary,
    pub charts: BTreeMap<String, Chart>,
    pub categories: BTreeMap<String, CategoryView>,
    pub key_insights: Vec<Value>,
    pub ai_opportunities: BTreeMap<String, AiOpportunityView>,
    pub statistics: Map<String, Value>,
    pub sentiment_analysis: Map<String, Value>,
    pub metadata: Map<String, Value>,
    pub timestamp: String,
}

fn key_highlights(analysis: &AnalysisResult) -> Vec<String> {
    let mut highlights = Vec::new();

    let top_category = analysis
        .categories
        .iter()
        .filter(|(_, c)| c.relevance_score > 0.0)
        .max_by(|a, b| a.1.relevance_score.total_cmp(&b.1.relevance_score));
    if let Some((name, _)) = top_category {
        highlights.push(format!("重点关注领域：{}", name));
    }

    let top_ai = analysis
        .ai_opportunities
        .iter()
        .max_by(|a, b| a.1.potential_score.total_cmp(&b.1.potential_score));
    if let Some((name, opp)) = top_ai {
        if opp.potential_score > 50.0 {
            highlights.push(format!("AI应用潜力最高：{}", name));
        }
    }

    let words = num(&analysis.statistics, "total_words");
    if words > 5000.0 {
        highlights.push("内容详实，信息丰富".to_string());
    } else if words > 1000.0 {
        highlights.push("内容适中，重点突出".to_string());
    }

    highlights.truncate(5);
    highlights
}

pub fn generate_dashboard(analysis: &AnalysisResult) -> Dashboard {
    let summary = DashboardSummary {
        word_count: num(&analysis.statistics, "total_words"),
        reading_time: num(&analysis.statistics, "reading_time_minutes"),
        categories_analyzed: analysis
            .categories
            .values()
            .filter(|c| !c.content.is_empty())
            .count(),
        ai_opportunities: analysis.ai_opportunities.len(),
        high_priority_ai: analysis
            .ai_opportunities
            .values()
            .filter(|o| o.potential_score > 70.0)
            .count(),
        key_highlights: key_highlights(analysis),
    };

    let categories = analysis
        .categories
        .iter()
        .map(|(name, c)| {
            let view = CategoryView {
                relevance_score: c.relevance_score,
                content_count: c.content.len(),
                key_points: c.key_points.clone(),
                top_content: c.content.iter().take(3).map(|i| i.text.clone()).collect(),
                has_content: !c.content.is_empty(),
                priority_level: priority_level(c.relevance_score),
            };
            (name.clone(), view)
        })
        .collect();

    let ai_opportunities = analysis
        .ai_opportunities
        .iter()
        .map(|(name, o)| {
            let view = AiOpportunityView {
                potential_score: o.potential_score,
                priority_level: priority_level(o.potential_score),
                recommendation: o.recommendation.clone(),
                relevant_content: o.relevant_content.clone(),
                color: score_color(o.potential_score),
            };
            (name.clone(), view)
        })
        .collect();

    Dashboard {
        title: dashboard_title(&analysis.metadata),
        summary,
        charts: charts(analysis),
        categories,
        key_insights: analysis.key_insights.clone(),
        ai_opportunities,
        statistics: analysis.statistics.clone(),
        sentiment_analysis: analysis.sentiment_analysis.clone(),
        metadata: analysis.metadata.clone(),
        timestamp: Local::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> AnalysisResult {
        serde_json::from_value(json!({
            "categories": {
                "政策环境": {"relevance_score": 80, "content": [{"text": "a"}, {"text": "b"}], "key_points": ["k"]},
                "市场规模": {"relevance_score": 0, "content": []}
            },
            "ai_opportunities": {
                "智能制造": {"potential_score": 75, "recommendation": "优先部署"},
                "数据分析": {"potential_score": 30}
            },
            "key_insights": [
                {"type": "top_keywords", "data": [{"term": "芯片", "frequency": 12}]},
                {"type": "pos_analysis", "data": [{"pos": "n", "count": 40}, {"pos": "v", "count": 12}]}
            ],
            "statistics": {"total_words": 6000, "reading_time_minutes": 12},
            "sentiment_analysis": {"overall_sentiment": "积极", "positive_segments": 5, "negative_segments": 1, "total_segments": 10},
            "metadata": {"source_file": "上海_人工智能_20240101_120000.pdf"}
        }))
        .unwrap()
    }

    #[test]
    fn test_radar_chart_shape() {
        let chart = ai_radar_chart(&sample().ai_opportunities);
        assert_eq!(chart.data.len(), 1);
        let value = serde_json::to_value(&chart).unwrap();
        assert_eq!(value["data"][0]["type"], "scatterpolar");
        assert_eq!(value["data"][0]["fill"], "toself");
        assert_eq!(value["data"][0]["name"], "AI应用机会");
        assert_eq!(value["layout"]["polar"]["radialaxis"]["range"], json!([0.0, 100.0]));
        assert_eq!(value["layout"]["showlegend"], false);
    }

    #[test]
    fn test_empty_radar_and_pos_still_have_one_series() {
        let radar = ai_radar_chart(&BTreeMap::new());
        assert_eq!(radar.data.len(), 1);
        match &radar.data[0] {
            Trace::Scatterpolar { r, theta, .. } => assert!(r.is_empty() && theta.is_empty()),
            other => panic!("unexpected trace {:?}", other),
        }

        let pos = pos_chart(&[]);
        assert_eq!(pos.data.len(), 1);
        let value = serde_json::to_value(&pos).unwrap();
        assert_eq!(value["data"][0]["marker"]["color"], PRIMARY);
        assert_eq!(value["layout"]["title"], "词性分析统计");
        assert_eq!(value["layout"]["xaxis"]["title"], "词性");
    }

    #[test]
    fn test_optional_charts() {
        assert!(category_chart(&BTreeMap::new()).is_none());
        assert!(keyword_chart(&[]).is_none());
        assert!(statistics_chart(&Map::new()).is_none());

        let keywords: Vec<Value> = (0..15).map(|i| json!({"term": format!("t{}", i), "frequency": i})).collect();
        match &keyword_chart(&keywords).unwrap().data[0] {
            Trace::Bar { x, .. } => assert_eq!(x.len(), 10),
            other => panic!("unexpected trace {:?}", other),
        }
    }

    #[test]
    fn test_sentiment_chart_neutral_is_remainder() {
        let chart = sentiment_chart(&sample().sentiment_analysis).unwrap();
        match &chart.data[0] {
            Trace::Bar { y, .. } => assert_eq!(y, &vec![5.0, 4.0, 1.0]),
            other => panic!("unexpected trace {:?}", other),
        }
    }

    #[test]
    fn test_charts_round_trip() {
        for chart in charts(&sample()).values() {
            let json = serde_json::to_string(chart).unwrap();
            let back: Chart = serde_json::from_str(&json).unwrap();
            assert_eq!(&back, chart);
        }
    }

    #[test]
    fn test_priority_levels_and_colors() {
        assert_eq!(priority_level(70.0), "high");
        assert_eq!(priority_level(40.0), "medium");
        assert_eq!(priority_level(1.0), "low");
        assert_eq!(priority_level(0.0), "none");
        assert_eq!(score_color(90.0), SUCCESS);
        assert_eq!(score_color(0.0), LIGHT);
    }

    #[test]
    fn test_dashboard_title() {
        let mut meta = Map::new();
        assert_eq!(dashboard_title(&meta), "区域产业分析报告 - AIPE区域产业分析小工作台");
        meta.insert("source_file".into(), json!("上海_人工智能_20240101_120000.pdf"));
        assert_eq!(dashboard_title(&meta), "上海 人工智能 - AIPE区域产业分析小工作台");
    }

    #[test]
    fn test_generate_dashboard() {
        let dashboard = generate_dashboard(&sample());
        assert_eq!(dashboard.summary.categories_analyzed, 1);
        assert_eq!(dashboard.summary.high_priority_ai, 1);
        assert_eq!(
            dashboard.summary.key_highlights,
            vec!["重点关注领域：政策环境", "AI应用潜力最高：智能制造", "内容详实，信息丰富"]
        );
        assert_eq!(dashboard.categories["政策环境"].priority_level, "high");
        assert_eq!(dashboard.categories["政策环境"].top_content, vec!["a", "b"]);
        assert_eq!(dashboard.ai_opportunities["数据分析"].color, INFO);
        assert!(dashboard.charts.contains_key("keyword_frequency"));
        assert!(dashboard.charts.contains_key("pos_analysis"));
        assert!(dashboard.charts.contains_key("sentiment_analysis"));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn radar_round_trips(entries in proptest::collection::btree_map("[a-z]{1,8}", 0.0f64..100.0, 0..8)) {
            let opportunities: BTreeMap<String, AiOpportunity> = entries
                .into_iter()
                .map(|(k, score)| (k, AiOpportunity { potential_score: score, ..AiOpportunity::default() }))
                .collect();
            let chart = ai_radar_chart(&opportunities);
            prop_assert_eq!(chart.data.len(), 1);
            let back: Chart = serde_json::from_value(serde_json::to_value(&chart).unwrap()).unwrap();
            prop_assert_eq!(back, chart);
        }
    }
}
