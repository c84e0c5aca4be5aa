//! Streaming industry report generation
//!
//! A generation run produces, in order:
//! 1. the main report from the requested provider (falling back to another
//!    configured provider on failure),
//! 2. a Chinese and an English executive summary,
//! 3. a SWOT analysis as JSON.
//!
//! Every step is reported as a `GenerationChunk` so the HTTP layer can relay
//! progress to the browser as it happens.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::errors::{self, ClassifiedError, ErrorHistory};
use super::{create_client, LlmClient, LlmError, LlmService};
use crate::analysis::analyze_text;
use crate::config::{LlmConfig, PathsConfig, SiteConfigStore};

pub const DEFAULT_TEMPLATE: &str = "请生成一份关于[目标城市] [目标行业]的产业分析报告，包含以下章节：

1. 执行摘要
2. 产业概览与核心数据
3. 政策环境分析
4. 产业生态与关键参与者
5. 产业链分析
6. AI融合潜力分析
7. 结论与建议

请提供详细、专业的分析内容。";

const CLOSING_INSTRUCTION: &str =
    "\n\n请按照上述框架，生成一份详细、专业的产业分析报告。报告应包含具体的数据、案例和洞察。";

const SUMMARY_SOURCE_CHARS: usize = 3000;
const SWOT_SOURCE_CHARS: usize = 4000;

/// Load the prompt template from disk, falling back to the built-in one
pub fn load_template(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(template) if !template.trim().is_empty() => template,
        Ok(_) => DEFAULT_TEMPLATE.to_string(),
        Err(e) => {
            tracing::warn!(
                "Prompt template {} unavailable ({}), using built-in template",
                path.display(),
                e
            );
            DEFAULT_TEMPLATE.to_string()
        }
    }
}

pub fn prepare_prompt(template: &str, city: &str, industry: &str, additional_context: &str) -> String {
    let mut prompt = template
        .replace("[目标城市]", city)
        .replace("[目标行业]", industry);
    if !additional_context.is_empty() {
        prompt.push_str("\n\n补充信息和要求：\n");
        prompt.push_str(additional_context);
    }
    prompt.push_str(CLOSING_INSTRUCTION);
    prompt
}

fn head_chars(content: &str, n: usize) -> String {
    content.chars().take(n).collect()
}

pub fn summary_prompt_zh(content: &str) -> String {
    format!(
        "请基于以下完整的产业分析报告，生成一份简洁的执行摘要（Executive Summary），\n长度控制在300-500字，包含：\n1. 核心发现（2-3点）\n2. 关键数据指标（2-3个）\n3. 主要建议（2-3条）\n\n报告内容：\n{}\n\n请直接输出摘要内容，不需要额外的格式说明。",
        head_chars(content, SUMMARY_SOURCE_CHARS)
    )
}

pub fn summary_prompt_en(content: &str) -> String {
    format!(
        "Based on the following industrial analysis report, \ngenerate a concise Executive Summary in English (200-300 words) including:\n1. Key findings (2-3 points)\n2. Critical metrics (2-3 items)\n3. Main recommendations (2-3 items)\n\nReport content:\n{}\n\nPlease output the summary directly without additional formatting instructions.",
        head_chars(content, SUMMARY_SOURCE_CHARS)
    )
}

pub fn swot_prompt(content: &str) -> String {
    format!(
        "请基于以下产业分析报告，生成详细的SWOT战略分析。\n\n要求：\n1. 每个维度（优势、劣势、机遇、威胁）至少列出4-6个要点\n2. 要点要具体、可操作、有洞察力\n3. 结合报告中的具体数据和案例\n4. 严格按照JSON格式输出\n\n输出格式：\n{{\n    \"strengths\": [\"优势1：具体描述...\", \"优势2：具体描述...\"],\n    \"weaknesses\": [\"劣势1：具体描述...\", \"劣势2：具体描述...\"],\n    \"opportunities\": [\"机遇1：具体描述...\", \"机遇2：具体描述...\"],\n    \"threats\": [\"威胁1：具体描述...\", \"威胁2：具体描述...\"]\n}}\n\n报告内容：\n{}\n\n请只输出JSON格式的内容，不要包含markdown代码块标记或其他说明文字。",
        head_chars(content, SWOT_SOURCE_CHARS)
    )
}

const SECTION_MARKERS: &[(&str, &[&str])] = &[
    ("executive_summary", &["1. 执行摘要", "Executive Summary"]),
    ("industry_overview", &["2. 产业概览", "产业概览与核心数据"]),
    ("policy_landscape", &["3. 政策环境", "Policy Landscape"]),
    ("ecosystem", &["4. 产业生态", "产业生态与关键参与者"]),
    ("value_chain", &["5. 产业链分析", "Value Chain Analysis"]),
    ("ai_integration", &["6. AI融合潜力", "AI Integration Potential"]),
    ("conclusion", &["7. 结论", "Conclusion", "战略建议"]),
];

/// Split a report into named sections.
///
/// A line containing a section marker opens that section; the marker line
/// itself is not part of the content. Text before the first marker is
/// dropped. With no markers at all the whole text is `full_report`.
pub fn parse_sections(content: &str) -> BTreeMap<String, String> {
    let mut sections = BTreeMap::new();
    let mut current: Option<&str> = None;
    let mut lines: Vec<&str> = Vec::new();

    for line in content.split('\n') {
        let opened = SECTION_MARKERS
            .iter()
            .find(|(_, markers)| markers.iter().any(|m| line.contains(m)))
            .map(|(key, _)| *key);

        match opened {
            Some(key) => {
                if let Some(prev) = current {
                    sections.insert(prev.to_string(), lines.join("\n").trim().to_string());
                }
                current = Some(key);
                lines.clear();
            }
            None if current.is_some() => lines.push(line),
            None => {}
        }
    }

    if let Some(prev) = current {
        sections.insert(prev.to_string(), lines.join("\n").trim().to_string());
    }

    if sections.is_empty() {
        sections.insert("full_report".to_string(), content.to_string());
    }
    sections
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Swot {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub opportunities: Vec<String>,
    #[serde(default)]
    pub threats: Vec<String>,
}

/// Parse model output into a SWOT structure, tolerating ``` fences
pub fn parse_swot(text: &str) -> Option<Swot> {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = rest.strip_prefix("json").unwrap_or(rest);
        body = body.trim_end();
        body = body.strip_suffix("```").unwrap_or(body);
    }
    serde_json::from_str(body.trim()).ok()
}

/// Progress of a generation run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationChunk {
    Start {
        stage: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    Chunk {
        content: String,
        accumulated: String,
        chunk_index: usize,
        stage: String,
    },
    Complete {
        content: String,
        stage: String,
        metadata: Value,
    },
    ServiceFallback {
        original_service: LlmService,
        fallback_service: LlmService,
        message: String,
    },
    SummaryChunk {
        content: String,
        language: String,
        accumulated: String,
    },
    SummaryComplete {
        content: String,
        language: String,
    },
    SwotChunk {
        content: String,
        accumulated: String,
    },
    SwotComplete {
        content: String,
    },
    Error {
        error: String,
        api_error: Value,
    },
}

impl GenerationChunk {
    fn start(stage: &str, message: &str) -> Self {
        GenerationChunk::Start {
            stage: stage.to_string(),
            message: message.to_string(),
            metadata: None,
        }
    }

    fn error(classified: &ClassifiedError) -> Self {
        GenerationChunk::Error {
            error: classified.message.clone(),
            api_error: json!({
                "type": classified.error_type.as_str(),
                "service": classified.service.as_str(),
                "user_message": classified.user_message,
                "suggested_action": classified.suggested_action,
                "retry_after": classified.retry_after,
            }),
        }
    }
}

/// The receiver went away; stop generating
#[derive(Debug)]
struct Disconnected;

struct Emitter {
    tx: mpsc::UnboundedSender<GenerationChunk>,
}

impl Emitter {
    fn send(&self, chunk: GenerationChunk) -> Result<(), Disconnected> {
        self.tx.unbounded_send(chunk).map_err(|_| Disconnected)
    }
}

enum StageError {
    Disconnected,
    Llm(LlmError),
}

impl From<Disconnected> for StageError {
    fn from(_: Disconnected) -> Self {
        StageError::Disconnected
    }
}

impl From<LlmError> for StageError {
    fn from(e: LlmError) -> Self {
        StageError::Llm(e)
    }
}

/// Drives one report through every generation stage
pub struct ReportGenerator {
    service: LlmService,
    clients: HashMap<LlmService, Arc<dyn LlmClient>>,
    enable_fallback: bool,
    template: String,
    history: Arc<ErrorHistory>,
}

impl ReportGenerator {
    pub fn new(
        service: LlmService,
        clients: Vec<Arc<dyn LlmClient>>,
        enable_fallback: bool,
        history: Arc<ErrorHistory>,
    ) -> Self {
        Self {
            service,
            clients: clients.into_iter().map(|c| (c.service(), c)).collect(),
            enable_fallback,
            template: DEFAULT_TEMPLATE.to_string(),
            history,
        }
    }

    /// Build clients for every provider with a configured key
    pub fn from_config(
        service: LlmService,
        llm: &LlmConfig,
        paths: &PathsConfig,
        store: &SiteConfigStore,
        history: Arc<ErrorHistory>,
    ) -> Self {
        let clients = store
            .available_llm_services()
            .into_iter()
            .filter_map(|s| match create_client(s, llm, store) {
                Ok(client) => Some(client),
                Err(e) => {
                    tracing::warn!("Failed to initialise {} client: {}", s, e);
                    None
                }
            })
            .collect();

        Self::new(service, clients, llm.enable_fallback, history)
            .with_template(load_template(&paths.prompt_template))
    }

    pub fn with_template(mut self, template: String) -> Self {
        self.template = template;
        self
    }

    pub fn service(&self) -> LlmService {
        self.service
    }

    /// Services that have a client, in fallback order
    pub fn available_services(&self) -> Vec<LlmService> {
        LlmService::ALL
            .into_iter()
            .filter(|s| self.clients.contains_key(s))
            .collect()
    }

    pub fn is_available(&self, service: LlmService) -> bool {
        self.clients.contains_key(&service)
    }

    /// Start a generation run on a background task
    pub fn generate(
        self: Arc<Self>,
        city: String,
        industry: String,
        additional_context: String,
    ) -> BoxStream<'static, GenerationChunk> {
        let (tx, rx) = mpsc::unbounded();
        tokio::spawn(async move {
            let emitter = Emitter { tx };
            if self
                .run(&city, &industry, &additional_context, &emitter)
                .await
                .is_err()
            {
                tracing::info!("Report stream for {} - {} closed by client", city, industry);
            }
        });
        rx.boxed()
    }

    async fn run(
        &self,
        city: &str,
        industry: &str,
        additional_context: &str,
        out: &Emitter,
    ) -> Result<(), Disconnected> {
        tracing::info!("Starting streamed report: {} - {} ({})", city, industry, self.service);
        let prompt = prepare_prompt(&self.template, city, industry, additional_context);

        out.send(GenerationChunk::Start {
            stage: "generating".to_string(),
            message: "开始生成报告主体...".to_string(),
            metadata: Some(json!({
                "city": city,
                "industry": industry,
                "service": self.service,
            })),
        })?;

        let (content, service) = match self.generate_main(&prompt, out).await? {
            Ok(done) => done,
            Err(classified) => {
                out.send(GenerationChunk::error(&classified))?;
                return Ok(());
            }
        };

        for (language, stage, message, prompt) in [
            ("zh", "summary_zh", "正在生成中文执行摘要...", summary_prompt_zh(&content)),
            ("en", "summary_en", "正在生成英文执行摘要...", summary_prompt_en(&content)),
        ] {
            out.send(GenerationChunk::start(stage, message))?;
            let summary = self
                .stream_secondary(service, &prompt, out, |delta, acc| GenerationChunk::SummaryChunk {
                    content: delta,
                    language: language.to_string(),
                    accumulated: acc,
                })
                .await?;
            out.send(GenerationChunk::SummaryComplete {
                content: summary,
                language: language.to_string(),
            })?;
        }

        out.send(GenerationChunk::start("swot", "正在生成 SWOT 分析..."))?;
        let swot = self
            .stream_secondary(service, &swot_prompt(&content), out, |delta, acc| {
                GenerationChunk::SwotChunk {
                    content: delta,
                    accumulated: acc,
                }
            })
            .await?;
        out.send(GenerationChunk::SwotComplete { content: swot })?;

        tracing::info!("Streamed report finished: {} - {}", city, industry);
        Ok(())
    }

    /// Main report with fallback. The outer result is the connection state;
    /// the inner one is the generation outcome.
    async fn generate_main(
        &self,
        prompt: &str,
        out: &Emitter,
    ) -> Result<Result<(String, LlmService), ClassifiedError>, Disconnected> {
        let mut service = self.service;
        let mut tried: Vec<LlmService> = Vec::new();

        loop {
            tried.push(service);
            let err = match self.stream_main(service, prompt, out).await {
                Ok(content) => return Ok(Ok((content, service))),
                Err(StageError::Disconnected) => return Err(Disconnected),
                Err(StageError::Llm(e)) => e,
            };

            tracing::error!("{} streaming call failed: {}", service, err);
            let classified = self.history.record(&err.to_string(), service);
            if !self.enable_fallback {
                return Ok(Err(classified));
            }

            let candidates: Vec<LlmService> = self
                .available_services()
                .into_iter()
                .filter(|s| !tried.contains(s))
                .collect();
            match errors::fallback_service(service, &candidates) {
                Some(next) => {
                    tracing::info!("Falling back from {} to {}", service, next);
                    out.send(GenerationChunk::ServiceFallback {
                        original_service: service,
                        fallback_service: next,
                        message: format!("正在切换到 {} 服务...", next.as_str().to_uppercase()),
                    })?;
                    service = next;
                }
                None => {
                    let message = format!("{}: {}", LlmError::NoFallback, err);
                    return Ok(Err(errors::classify(&message, self.service)));
                }
            }
        }
    }

    async fn stream_main(
        &self,
        service: LlmService,
        prompt: &str,
        out: &Emitter,
    ) -> Result<String, StageError> {
        let client = self
            .clients
            .get(&service)
            .ok_or(LlmError::MissingKey(service))?;
        let mut stream = client.stream_completion(prompt).await?;

        let mut accumulated = String::new();
        let mut chunk_index = 0;
        while let Some(delta) = stream.next().await {
            let delta = delta?;
            accumulated.push_str(&delta);
            chunk_index += 1;
            out.send(GenerationChunk::Chunk {
                content: delta,
                accumulated: accumulated.clone(),
                chunk_index,
                stage: "generating".to_string(),
            })?;
        }

        tracing::info!(
            "{} stream complete: {} chunks, {} chars",
            service,
            chunk_index,
            accumulated.chars().count()
        );
        out.send(GenerationChunk::Complete {
            content: accumulated.clone(),
            stage: "generating".to_string(),
            metadata: json!({
                "chunks": chunk_index,
                "service": service,
                "total_length": accumulated.chars().count(),
            }),
        })?;
        Ok(accumulated)
    }

    /// Summary and SWOT stages. Only Kimi and Gemini produce them; a failure
    /// here is recorded and yields whatever text arrived before it.
    async fn stream_secondary<F>(
        &self,
        service: LlmService,
        prompt: &str,
        out: &Emitter,
        make_chunk: F,
    ) -> Result<String, Disconnected>
    where
        F: Fn(String, String) -> GenerationChunk,
    {
        let mut accumulated = String::new();
        if service == LlmService::Doubao {
            return Ok(accumulated);
        }
        let Some(client) = self.clients.get(&service) else {
            return Ok(accumulated);
        };

        let mut stream = match client.stream_completion(prompt).await {
            Ok(stream) => stream,
            Err(e) => {
                self.history.record(&e.to_string(), service);
                return Ok(accumulated);
            }
        };

        while let Some(delta) = stream.next().await {
            match delta {
                Ok(delta) => {
                    accumulated.push_str(&delta);
                    out.send(make_chunk(delta, accumulated.clone()))?;
                }
                Err(e) => {
                    self.history.record(&e.to_string(), service);
                    break;
                }
            }
        }
        Ok(accumulated)
    }
}

/// Collects the final texts of a run for the report artifact
#[derive(Debug, Clone, Default)]
pub struct ReportAccumulator {
    pub content: Option<String>,
    pub service: Option<LlmService>,
    pub summary_zh: String,
    pub summary_en: String,
    pub swot_raw: String,
    pub error: Option<String>,
}

impl ReportAccumulator {
    pub fn observe(&mut self, chunk: &GenerationChunk) {
        match chunk {
            GenerationChunk::Complete { content, metadata, .. } => {
                self.content = Some(content.clone());
                self.service = metadata
                    .get("service")
                    .and_then(Value::as_str)
                    .and_then(LlmService::from_str);
            }
            GenerationChunk::SummaryComplete { content, language } => match language.as_str() {
                "zh" => self.summary_zh = content.clone(),
                _ => self.summary_en = content.clone(),
            },
            GenerationChunk::SwotComplete { content } => self.swot_raw = content.clone(),
            GenerationChunk::Error { error, .. } => self.error = Some(error.clone()),
            _ => {}
        }
    }

    /// JSON artifact for a finished run; `None` when no main report arrived
    pub fn into_document(self, report_id: &str, city: &str, industry: &str) -> Option<Value> {
        let content = self.content?;
        let mut metadata = serde_json::Map::new();
        metadata.insert("source_file".into(), json!(format!("{}_{}_产业分析报告.json", city, industry)));
        metadata.insert("report_id".into(), json!(report_id));
        metadata.insert("city".into(), json!(city));
        metadata.insert("industry".into(), json!(industry));
        let analysis = analyze_text(&content, metadata);

        let mut doc = json!({
            "report_id": report_id,
            "city": city,
            "industry": industry,
            "service": self.service,
            "generated_at": Utc::now().to_rfc3339(),
            "full_content": content,
            "sections": parse_sections(&content),
            "summary_zh": self.summary_zh,
            "summary_en": self.summary_en,
            "analysis": analysis,
        });
        match parse_swot(&self.swot_raw) {
            Some(swot) => doc["swot"] = json!(swot),
            None => doc["swot_raw"] = json!(self.swot_raw),
        }
        Some(doc)
    }
}
