//! Browser abstraction used by the scenario runner

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::DemoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// `big` 1920×1080, `small` 1280×720, anything else 1280×800
    pub fn for_screen(size: Option<&str>) -> Self {
        match size {
            Some("big") => Self { width: 1920, height: 1080 },
            Some("small") => Self { width: 1280, height: 720 },
            _ => Self { width: 1280, height: 800 },
        }
    }
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), DemoError>;

    async fn click(&self, selector: &str) -> Result<(), DemoError>;

    /// Clear the field, then type `value`
    async fn fill(&self, selector: &str, value: &str) -> Result<(), DemoError>;

    async fn evaluate(&self, script: &str) -> Result<Value, DemoError>;

    async fn close(&self) -> Result<(), DemoError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Goto(String),
    Click(String),
    Fill(String, String),
    Evaluate(String),
}

/// Driver that records every call instead of driving a browser.
///
/// Selectors registered with [`RecordingDriver::fail_on`] fail to click and
/// fill; scripts are answered from a fixed page geometry.
pub struct RecordingDriver {
    calls: Mutex<Vec<DriverCall>>,
    failing: HashSet<String>,
    page_height: f64,
    viewport_height: f64,
}

impl Default for RecordingDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            page_height: 3000.0,
            viewport_height: 800.0,
        }
    }

    pub fn fail_on(mut self, selector: &str) -> Self {
        self.failing.insert(selector.to_string());
        self
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: DriverCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn check(&self, selector: &str) -> Result<(), DemoError> {
        if self.failing.contains(selector) {
            Err(DemoError::Browser(format!("no element matches {}", selector)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrowserDriver for RecordingDriver {
    async fn goto(&self, url: &str) -> Result<(), DemoError> {
        self.record(DriverCall::Goto(url.to_string()));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), DemoError> {
        self.record(DriverCall::Click(selector.to_string()));
        self.check(selector)
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), DemoError> {
        self.record(DriverCall::Fill(selector.to_string(), value.to_string()));
        self.check(selector)
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DemoError> {
        self.record(DriverCall::Evaluate(script.to_string()));
        let answer = if script.contains("scrollHeight") {
            Value::from(self.page_height)
        } else if script.contains("innerHeight") {
            Value::from(self.viewport_height)
        } else if script.contains("AUTO_DEMO_PAUSED") {
            Value::Bool(false)
        } else {
            Value::Bool(true)
        };
        Ok(answer)
    }
}
