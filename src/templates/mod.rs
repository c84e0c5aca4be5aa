//! Server-rendered pages
//!
//! Templates are embedded in the binary and can be overridden per file by
//! dropping a template with the same name into `paths.templates_dir`.

use std::error::Error as StdError;
use std::fs;
use std::path::Path;

use chrono::Datelike;
use rust_embed::RustEmbed;
use serde::Serialize;
use tera::{Context as TeraContext, Tera};

mod error;

pub use error::TemplateError;

pub const SITE_NAME: &str = "AIPE区域产业分析小工作台";

#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct EmbeddedTemplates;

/// Variables every page receives
#[derive(Debug, Clone, Serialize)]
pub struct StandardVars {
    pub site_name: String,
    pub request_path: String,
    pub year: i32,
}

impl StandardVars {
    pub fn new(request_path: &str) -> Self {
        Self {
            site_name: SITE_NAME.to_string(),
            request_path: request_path.to_string(),
            year: chrono::Local::now().year(),
        }
    }
}

pub struct TemplateEngine {
    tera: Tera,
}

fn render_error(e: tera::Error, what: &str) -> TemplateError {
    let mut message = format!("{}: {}", what, e);
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    TemplateError::Render(message)
}

impl TemplateEngine {
    /// Embedded templates, overridden by any `*.html` in `overrides_dir`
    pub fn new(overrides_dir: &Path) -> Result<Self, TemplateError> {
        let mut templates: Vec<(String, String)> = EmbeddedTemplates::iter()
            .filter_map(|name| {
                let file = EmbeddedTemplates::get(&name)?;
                let content = String::from_utf8_lossy(&file.data).into_owned();
                Some((name.to_string(), content))
            })
            .collect();

        if overrides_dir.is_dir() {
            for entry in fs::read_dir(overrides_dir)? {
                let path = entry?.path();
                if path.extension().map_or(true, |ext| ext != "html") {
                    continue;
                }
                let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                    continue;
                };
                let content = fs::read_to_string(&path)?;
                templates.retain(|(existing, _)| existing != &name);
                templates.push((name, content));
            }
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| render_error(e, "Failed to load templates"))?;
        tracing::debug!("Loaded {} templates", tera.get_template_names().count());
        Ok(Self { tera })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|t| t == name)
    }

    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String, TemplateError> {
        if !self.has_template(template) {
            return Err(TemplateError::NotFound(template.to_string()));
        }
        self.tera
            .render(template, context)
            .map_err(|e| render_error(e, &format!("Failed to render '{}'", template)))
    }

    /// Render with the standard variables added
    pub fn render_page(
        &self,
        template: &str,
        context: &TeraContext,
        vars: &StandardVars,
    ) -> Result<String, TemplateError> {
        let mut full = context.clone();
        full.insert("site_name", &vars.site_name);
        full.insert("request_path", &vars.request_path);
        full.insert("year", &vars.year);
        self.render(template, &full)
    }

    /// Render `template`, falling back to `error.html` and then to a bare
    /// HTML page. Never fails.
    pub fn render_with_fallback(&self, template: &str, context: &TeraContext, vars: &StandardVars) -> String {
        match self.render_page(template, context, vars) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Failed to render template '{}': {}", template, e);
                let mut error_context = context.clone();
                error_context.insert("error_message", &e.to_string());
                match self.render_page("error.html", &error_context, vars) {
                    Ok(html) => html,
                    Err(inner) => {
                        tracing::warn!("Failed to render error template: {}", inner);
                        simple_error_page(&e.to_string())
                    }
                }
            }
        }
    }
}

fn simple_error_page(message: &str) -> String {
    let escaped = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Error</title></head>\
<body><h1>Error</h1><pre>{}</pre></body></html>",
        escaped
    )
}

/// Markdown report body to HTML
pub fn markdown_to_html(markdown: &str) -> String {
    use pulldown_cmark::{html, Options, Parser};

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine() -> TemplateEngine {
        TemplateEngine::new(Path::new("/nonexistent-templates")).unwrap()
    }

    #[test]
    fn test_embedded_templates_present() {
        let engine = engine();
        for name in [
            "base.html",
            "index.html",
            "login.html",
            "register.html",
            "streaming.html",
            "report.html",
            "error.html",
        ] {
            assert!(engine.has_template(name), "missing {}", name);
        }
    }

    #[test]
    fn test_streaming_page() {
        let mut ctx = TeraContext::new();
        ctx.insert("city", "上海");
        ctx.insert("industry", "人工智能");
        ctx.insert("llm_service", "kimi");
        ctx.insert("additional_context", "");
        let html = engine()
            .render_page("streaming.html", &ctx, &StandardVars::new("/streaming-generate-report"))
            .unwrap();
        assert!(html.contains("streaming-container"));
        assert!(html.contains("Auto-starting streaming"));
        assert!(html.contains("retry-streaming"));
        assert!(html.contains("上海"));
        assert!(html.contains("人工智能"));
    }

    #[test]
    fn test_city_is_escaped() {
        let mut ctx = TeraContext::new();
        ctx.insert("city", "<script>x</script>");
        ctx.insert("industry", "i");
        ctx.insert("llm_service", "kimi");
        ctx.insert("additional_context", "");
        let html = engine()
            .render_page("streaming.html", &ctx, &StandardVars::new("/"))
            .unwrap();
        assert!(!html.contains("<span id=\"report-city\"><script>"));
    }

    #[test]
    fn test_override_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("login.html"), "custom login {{ site_name }}").unwrap();
        let engine = TemplateEngine::new(dir.path()).unwrap();
        let html = engine
            .render_page("login.html", &TeraContext::new(), &StandardVars::new("/login"))
            .unwrap();
        assert_eq!(html, format!("custom login {}", SITE_NAME));
    }

    #[test]
    fn test_fallback_to_error_page() {
        let html = engine().render_with_fallback("missing.html", &TeraContext::new(), &StandardVars::new("/x"));
        assert!(html.contains("页面出错了"));
        assert!(html.contains("missing.html"));
    }

    #[test]
    fn test_markdown_to_html() {
        let html = markdown_to_html("# 标题\n\n| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(html.contains("<h1>标题</h1>"));
        assert!(html.contains("<table>"));
    }
}
