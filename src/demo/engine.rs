//! Sequential scenario runner

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::driver::BrowserDriver;
use super::scenario::{default_action_delay, Action, Scenario, ScrollDirection, Step};

const PAUSE_POLL: Duration = Duration::from_millis(100);
const WAIT_TICK: f64 = 0.1;
const SCROLL_FPS: f64 = 20.0;
const MIN_SCROLL_STEPS: usize = 20;

/// Pause between steps; negatives clamp to zero, unrepresentable values use the default
fn step_delay(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or_else(|_| {
        tracing::warn!("Ignoring action_delay {}, using {}s", seconds, default_action_delay());
        Duration::from_secs_f64(default_action_delay())
    })
}

const PAUSED_SCRIPT: &str = r#"localStorage.getItem("AUTO_DEMO_PAUSED") === "true""#;

const CONTROL_PANEL_SCRIPT: &str = r#"(function() {
  if (!localStorage.getItem('AUTO_DEMO_PAUSED')) { localStorage.setItem('AUTO_DEMO_PAUSED', 'false'); }
  var btn = document.getElementById('auto-demo-toggle');
  if (!btn) {
    btn = document.createElement('button');
    btn.id = 'auto-demo-toggle';
    btn.style.cssText = 'position:fixed;top:50%;right:20px;width:60px;height:60px;border-radius:50%;border:none;color:#fff;opacity:.5;z-index:9999999;cursor:pointer';
    document.body.appendChild(btn);
  }
  var render = function() {
    var paused = localStorage.getItem('AUTO_DEMO_PAUSED') === 'true';
    btn.textContent = paused ? 'Play' : 'Pause';
    btn.style.backgroundColor = paused ? 'rgba(255,165,0,.5)' : 'rgba(128,0,128,.5)';
  };
  render();
  if (!btn._bound) {
    btn.addEventListener('click', function() {
      var paused = localStorage.getItem('AUTO_DEMO_PAUSED') === 'true';
      localStorage.setItem('AUTO_DEMO_PAUSED', paused ? 'false' : 'true');
      render();
    });
    btn._bound = true;
  }
  return true;
})();"#;

/// Script that shows `text` as a subtitle for five seconds
pub fn subtitle_script(text: &str) -> String {
    let literal = serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(function() {{
  var old = document.getElementById('automation-subtitle');
  if (old) {{ old.remove(); }}
  var el = document.createElement('div');
  el.id = 'automation-subtitle';
  el.textContent = {literal};
  el.style.cssText = 'position:fixed;bottom:150px;left:50%;transform:translateX(-50%);background:black;color:yellow;padding:15px 30px;border-radius:8px;font-size:20px;font-weight:bold;z-index:9999999;max-width:90%;border:3px solid yellow';
  document.body.appendChild(el);
  setTimeout(function() {{ if (el.parentNode) {{ el.remove(); }} }}, 5000);
  return true;
}})();"#
    )
}

/// Script that outlines the first element matching `selector`
pub fn highlight_script(selector: &str, seconds: f64) -> String {
    let literal = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    let millis = (seconds * 1000.0) as u64;
    format!(
        "(function(){{var el=document.querySelector({literal});if(!el) return false;\
var old=el.style.boxShadow;var old2=el.style.outline;\
el.style.outline='3px solid #f59e0b';el.style.boxShadow='0 0 18px rgba(245,158,11,0.8)';\
setTimeout(function(){{el.style.boxShadow=old;el.style.outline=old2;}}, {millis});return true;}})();"
    )
}

/// Scroll positions visited by a smooth scroll, ending exactly at the target
pub fn scroll_positions(direction: ScrollDirection, page_height: f64, viewport_height: f64, seconds: f64) -> Vec<i64> {
    let bottom = page_height - viewport_height;
    let (start, end) = match direction {
        ScrollDirection::Down => (0.0, bottom),
        ScrollDirection::Up => (bottom, 0.0),
    };
    let steps = ((seconds * SCROLL_FPS) as usize).max(MIN_SCROLL_STEPS);
    let step = (end - start) / steps as f64;

    let mut positions: Vec<i64> = (1..=steps).map(|i| (start + step * i as f64) as i64).collect();
    positions.push(end as i64);
    positions
}

pub struct DemoRunner {
    driver: Arc<dyn BrowserDriver>,
    scenario: Scenario,
    settle: Duration,
}

impl DemoRunner {
    pub fn new(driver: Arc<dyn BrowserDriver>, scenario: Scenario) -> Self {
        Self {
            driver,
            scenario,
            settle: Duration::from_millis(300),
        }
    }

    /// Pause after navigation and clicks
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    async fn is_paused(&self) -> bool {
        matches!(self.driver.evaluate(PAUSED_SCRIPT).await, Ok(Value::Bool(true)))
    }

    async fn respect_pause(&self) {
        while self.is_paused().await {
            tokio::time::sleep(PAUSE_POLL).await;
        }
    }

    async fn inject_control_panel(&self) {
        if let Err(e) = self.driver.evaluate(CONTROL_PANEL_SCRIPT).await {
            tracing::debug!("Control panel injection failed: {}", e);
        }
    }

    async fn show_subtitle(&self, step: &Step) {
        let Some(text) = step.caption() else {
            return;
        };
        tracing::info!("Displaying subtitle: {}", text);
        if let Err(e) = self.driver.evaluate(&subtitle_script(text)).await {
            tracing::warn!("Failed to display subtitle: {}", e);
        }
    }

    /// Run every step in order. A failed required step stops the run.
    pub async fn run(&self) -> bool {
        let steps = &self.scenario.steps;
        if steps.is_empty() {
            tracing::warn!("No steps found in scenario");
            return false;
        }

        let delay = step_delay(self.scenario.config.action_delay);
        tracing::info!("Starting demo '{}' with {} steps", self.scenario.name, steps.len());

        for (idx, step) in steps.iter().enumerate() {
            let label = step
                .description
                .clone()
                .unwrap_or_else(|| format!("Step {}", idx + 1));
            tracing::info!("[{}/{}] {}", idx + 1, steps.len(), label);

            self.respect_pause().await;
            self.inject_control_panel().await;
            let ok = self.execute(step).await;

            if !ok {
                if step.optional {
                    tracing::warn!("Optional step failed, continuing: {}", label);
                } else {
                    tracing::error!("Failed to execute required step: {}", label);
                    return false;
                }
            }

            if idx + 1 < steps.len() {
                self.respect_pause().await;
                tokio::time::sleep(delay).await;
            }
        }

        tracing::info!("Demo completed successfully");
        true
    }

    pub async fn execute(&self, step: &Step) -> bool {
        self.show_subtitle(step).await;
        tokio::time::sleep(Duration::from_millis(self.scenario.config.slow_motion)).await;

        match step.action() {
            Action::Navigate { url } => self.navigate(step, &url).await,
            Action::Click { selector, fallback } => self.click(&selector, &fallback).await,
            Action::Fill { selector, value } => match self.driver.fill(&selector, &value).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!("Fill failed for {}: {}", selector, e);
                    false
                }
            },
            Action::Wait { seconds } => {
                self.wait(seconds).await;
                true
            }
            Action::ScrollSmooth { direction, seconds } => self.scroll(direction, seconds).await,
            Action::Highlight { selector, seconds } => {
                match self.driver.evaluate(&highlight_script(&selector, seconds)).await {
                    Ok(Value::Bool(found)) => found,
                    Ok(_) => true,
                    Err(e) => {
                        tracing::error!("Highlight failed for {}: {}", selector, e);
                        false
                    }
                }
            }
            Action::Message { text } => {
                tracing::info!("==== {} ====", text);
                true
            }
            Action::Unknown(action) => {
                tracing::warn!("Unknown action: {}", action);
                false
            }
        }
    }

    async fn navigate(&self, step: &Step, url: &str) -> bool {
        let full = self.scenario.resolve_url(url);
        if let Err(e) = self.driver.goto(&full).await {
            tracing::error!("Navigation failed to {}: {}", full, e);
            return false;
        }
        tokio::time::sleep(self.settle).await;
        // the new document dropped the overlay
        self.show_subtitle(step).await;
        self.inject_control_panel().await;
        true
    }

    async fn click(&self, selector: &str, fallback: &[String]) -> bool {
        match self.driver.click(selector).await {
            Ok(()) => {
                tokio::time::sleep(self.settle).await;
                return true;
            }
            Err(e) => tracing::warn!("Primary selector failed: {} ({})", selector, e),
        }
        for candidate in fallback {
            if self.driver.click(candidate).await.is_ok() {
                tracing::info!("Fallback selector succeeded: {}", candidate);
                tokio::time::sleep(self.settle).await;
                return true;
            }
        }
        tracing::error!("All click attempts failed for: {}", selector);
        false
    }

    async fn wait(&self, seconds: f64) {
        let mut elapsed = 0.0;
        while elapsed < seconds {
            self.respect_pause().await;
            tokio::time::sleep(Duration::from_secs_f64(WAIT_TICK)).await;
            elapsed += WAIT_TICK;
        }
    }

    async fn scroll(&self, direction: ScrollDirection, seconds: f64) -> bool {
        let height = |v: Result<Value, _>| v.ok().and_then(|v: Value| v.as_f64());
        let page_height = height(self.driver.evaluate("document.documentElement.scrollHeight").await);
        let viewport_height = height(self.driver.evaluate("window.innerHeight").await);
        let (Some(page_height), Some(viewport_height)) = (page_height, viewport_height) else {
            tracing::error!("Smooth scroll failed: page geometry unavailable");
            return false;
        };

        let positions = scroll_positions(direction, page_height, viewport_height, seconds);
        let frame = Duration::from_secs_f64(seconds.max(0.0) / positions.len() as f64);
        for y in positions {
            self.respect_pause().await;
            if let Err(e) = self.driver.evaluate(&format!("window.scrollTo(0, {})", y)).await {
                tracing::error!("Smooth scroll failed: {}", e);
                return false;
            }
            tokio::time::sleep(frame).await;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::driver::{DriverCall, RecordingDriver};

    fn scenario(yaml: &str) -> Scenario {
        let mut s = Scenario::from_yaml(yaml).unwrap();
        s.config.action_delay = 0.0;
        s.config.slow_motion = 0;
        s
    }

    fn runner(driver: Arc<RecordingDriver>, yaml: &str) -> DemoRunner {
        DemoRunner::new(driver, scenario(yaml)).with_settle_delay(Duration::ZERO)
    }

    fn non_script_calls(driver: &RecordingDriver) -> Vec<DriverCall> {
        driver
            .calls()
            .into_iter()
            .filter(|c| !matches!(c, DriverCall::Evaluate(_)))
            .collect()
    }

    #[test]
    fn test_subtitle_script_escapes_text() {
        let script = subtitle_script("他说\"你好\"'x'\n</script>");
        assert!(script.contains(r#"el.textContent = "他说\"你好\"'x'\n</script>";"#));
    }

    #[test]
    fn test_highlight_script_escapes_selector() {
        let script = highlight_script("a[title='x']", 1.5);
        assert!(script.contains(r#"document.querySelector("a[title='x']")"#));
        assert!(script.contains("1500"));
    }

    #[test]
    fn test_scroll_positions() {
        let down = scroll_positions(ScrollDirection::Down, 3000.0, 800.0, 5.0);
        assert_eq!(down.len(), 101);
        assert_eq!(*down.last().unwrap(), 2200);
        assert_eq!(down[0], 22);

        let up = scroll_positions(ScrollDirection::Up, 3000.0, 800.0, 0.1);
        assert_eq!(up.len(), 21);
        assert_eq!(*up.last().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_navigates_with_base_url_and_clicks_fallback() {
        let driver = Arc::new(RecordingDriver::new().fail_on("#primary"));
        let yaml = r##"
base_url: http://demo.local
steps:
  - action: navigate
    url: /reports
  - action: click
    selector: "#primary"
    fallback: ["#second", {selector: "#third"}]
  - action: fill
    selector: "#city"
    value: 上海
"##;
        assert!(runner(driver.clone(), yaml).run().await);
        assert_eq!(
            non_script_calls(&driver),
            vec![
                DriverCall::Goto("http://demo.local/reports".into()),
                DriverCall::Click("#primary".into()),
                DriverCall::Click("#second".into()),
                DriverCall::Fill("#city".into(), "上海".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_required_failure_aborts() {
        let driver = Arc::new(RecordingDriver::new().fail_on("#a"));
        let yaml = r##"
steps:
  - action: click
    selector: "#a"
  - action: navigate
    url: /never
"##;
        assert!(!runner(driver.clone(), yaml).run().await);
        assert!(!non_script_calls(&driver).contains(&DriverCall::Goto("http://localhost:5000/never".into())));
    }

    #[tokio::test]
    async fn test_optional_failure_and_unknown_action() {
        let driver = Arc::new(RecordingDriver::new().fail_on("#a"));
        let yaml = r##"
steps:
  - action: click
    selector: "#a"
    optional: true
  - action: dance
    optional: true
  - action: message
    text: 完成
"##;
        assert!(runner(driver.clone(), yaml).run().await);

        let unknown = Step::new("dance");
        assert!(!runner(driver, "name: x").execute(&unknown).await);
    }

    #[test]
    fn test_step_delay_bounds() {
        assert_eq!(step_delay(0.25), Duration::from_millis(250));
        assert_eq!(step_delay(-3.0), Duration::ZERO);
        assert_eq!(step_delay(f64::NAN), Duration::ZERO);
        assert_eq!(step_delay(f64::INFINITY), Duration::from_secs_f64(1.5));
        assert_eq!(step_delay(1e300), Duration::from_secs_f64(1.5));
    }

    #[tokio::test]
    async fn test_infinite_action_delay_does_not_abort_run() {
        let driver = Arc::new(RecordingDriver::new());
        let mut s = scenario("steps:\n  - action: message\n    text: 完成\n");
        s.config.action_delay = f64::INFINITY;
        let runner = DemoRunner::new(driver, s).with_settle_delay(Duration::ZERO);
        assert!(runner.run().await);
    }

    #[tokio::test]
    async fn test_empty_scenario_fails() {
        let driver = Arc::new(RecordingDriver::new());
        assert!(!runner(driver, "name: empty").run().await);
    }

    #[tokio::test]
    async fn test_scroll_and_subtitle_use_scripts() {
        let driver = Arc::new(RecordingDriver::new());
        let yaml = r##"
steps:
  - action: scroll_smooth
    duration: 0
    subtitle: 向下浏览
"##;
        assert!(runner(driver.clone(), yaml).run().await);
        let scripts: Vec<String> = driver
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Evaluate(s) => Some(s),
                _ => None,
            })
            .collect();
        assert!(scripts.iter().any(|s| s.contains("向下浏览")));
        assert!(scripts.iter().any(|s| s == "window.scrollTo(0, 2200)"));
        assert_eq!(scripts.iter().filter(|s| s.starts_with("window.scrollTo")).count(), 21);
    }
}
