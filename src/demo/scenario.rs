//! YAML scenario files
//!
//! ```yaml
//! name: 区域产业分析演示
//! base_url: http://localhost:5000
//! config: { slow_motion: 50, action_delay: 1.5 }
//! steps:
//!   - action: navigate
//!     url: /
//!     subtitle: 打开首页
//!   - action: click
//!     selector: "#generate"
//!     fallback: ["button.generate", { selector: "text=生成报告" }]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::DemoError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Delay before each browser operation, in milliseconds
    #[serde(default = "default_slow_motion")]
    pub slow_motion: u64,
    /// Pause between steps, in seconds
    #[serde(default = "default_action_delay")]
    pub action_delay: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            slow_motion: default_slow_motion(),
            action_delay: default_action_delay(),
        }
    }
}

fn default_slow_motion() -> u64 {
    50
}

pub(crate) fn default_action_delay() -> f64 {
    1.5
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub config: ScenarioConfig,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_yaml(raw: &str) -> Result<Self, DemoError> {
        if raw.trim().is_empty() {
            return Err(DemoError::EmptyScenario);
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, DemoError> {
        let raw = std::fs::read_to_string(path).map_err(|source| DemoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let scenario = Self::from_yaml(&raw)?;
        tracing::info!("Loaded scenario: {}", scenario.name);
        Ok(scenario)
    }

    /// `url` as-is when absolute, otherwise appended to `base_url`
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http") {
            url.to_string()
        } else {
            format!("{}{}", self.base_url, url)
        }
    }
}

/// A click fallback, written either as a bare selector or `{selector: ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FallbackSelector {
    Plain(String),
    Detailed { selector: String },
}

impl FallbackSelector {
    pub fn selector(&self) -> &str {
        match self {
            FallbackSelector::Plain(s) => s,
            FallbackSelector::Detailed { selector } => selector,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    #[default]
    Down,
    Up,
}

/// One step as written in the file. Fields that an action does not use are
/// ignored; see [`Step::action`] for the interpreted form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub action: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub fallback: Vec<FallbackSelector>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub direction: Option<ScrollDirection>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Navigate { url: String },
    Click { selector: String, fallback: Vec<String> },
    Fill { selector: String, value: String },
    Wait { seconds: f64 },
    ScrollSmooth { direction: ScrollDirection, seconds: f64 },
    Highlight { selector: String, seconds: f64 },
    Message { text: String },
    Unknown(String),
}

impl Step {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            description: None,
            subtitle: None,
            optional: false,
            url: None,
            selector: None,
            fallback: Vec::new(),
            value: None,
            duration: None,
            direction: None,
            text: None,
        }
    }

    /// Subtitle shown while the step runs
    pub fn caption(&self) -> Option<&str> {
        self.subtitle
            .as_deref()
            .or(self.description.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn action(&self) -> Action {
        let selector = self.selector.clone().unwrap_or_default();
        match self.action.as_str() {
            "navigate" => Action::Navigate {
                url: self.url.clone().unwrap_or_else(|| "/".to_string()),
            },
            "click" => Action::Click {
                selector,
                fallback: self.fallback.iter().map(|f| f.selector().to_string()).collect(),
            },
            "fill" => Action::Fill {
                selector,
                value: self.value.clone().unwrap_or_default(),
            },
            "wait" => Action::Wait {
                seconds: self.duration.unwrap_or(1.0),
            },
            "scroll_smooth" => Action::ScrollSmooth {
                direction: self.direction.unwrap_or_default(),
                seconds: self.duration.unwrap_or(5.0),
            },
            "highlight" => Action::Highlight {
                selector,
                seconds: self.duration.unwrap_or(1.5),
            },
            "message" => Action::Message {
                text: self.text.clone().unwrap_or_default(),
            },
            other => Action::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
name: demo
steps:
  - action: navigate
    url: /reports
    description: 打开报告
  - action: click
    selector: "#go"
    optional: true
    fallback:
      - button.go
      - selector: "a.go"
  - action: scroll_smooth
    direction: up
  - action: teleport
"##;

    #[test]
    fn test_defaults() {
        let scenario = Scenario::from_yaml(SAMPLE).unwrap();
        assert_eq!(scenario.base_url, "http://localhost:5000");
        assert_eq!(scenario.config.slow_motion, 50);
        assert_eq!(scenario.config.action_delay, 1.5);
        assert_eq!(scenario.steps.len(), 4);
    }

    #[test]
    fn test_actions() {
        let scenario = Scenario::from_yaml(SAMPLE).unwrap();
        assert_eq!(
            scenario.steps[0].action(),
            Action::Navigate { url: "/reports".into() }
        );
        assert_eq!(scenario.steps[0].caption(), Some("打开报告"));
        assert_eq!(
            scenario.steps[1].action(),
            Action::Click {
                selector: "#go".into(),
                fallback: vec!["button.go".into(), "a.go".into()]
            }
        );
        assert!(scenario.steps[1].optional);
        assert_eq!(
            scenario.steps[2].action(),
            Action::ScrollSmooth {
                direction: ScrollDirection::Up,
                seconds: 5.0
            }
        );
        assert_eq!(scenario.steps[3].action(), Action::Unknown("teleport".into()));
    }

    #[test]
    fn test_resolve_url() {
        let scenario = Scenario::from_yaml("name: x").unwrap();
        assert_eq!(scenario.resolve_url("/a"), "http://localhost:5000/a");
        assert_eq!(scenario.resolve_url("https://example.com"), "https://example.com");
    }

    #[test]
    fn test_empty_and_missing() {
        assert!(matches!(Scenario::from_yaml("  \n"), Err(DemoError::EmptyScenario)));
        assert!(matches!(
            Scenario::load(Path::new("/nonexistent/scenario.yml")),
            Err(DemoError::Io { .. })
        ));
        assert!(matches!(Scenario::from_yaml("steps: 3"), Err(DemoError::Yaml(_))));
    }
}
