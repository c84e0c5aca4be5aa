//! Scripted UI walkthroughs
//!
//! A scenario is a YAML list of browser steps (navigate, click, fill,
//! scroll, ...) replayed in order against the running dashboard. The browser
//! sits behind [`BrowserDriver`]; the Chromium implementation needs the
//! `browser` feature.

#[cfg(feature = "browser")]
pub mod chromium;
pub mod driver;
pub mod engine;
pub mod scenario;

use std::path::PathBuf;

#[cfg(feature = "browser")]
pub use chromium::ChromiumDriver;
pub use driver::{BrowserDriver, DriverCall, RecordingDriver, Viewport};
pub use engine::DemoRunner;
pub use scenario::{Action, Scenario, ScenarioConfig, Step};

#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scenario: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("scenario file is empty")]
    EmptyScenario,

    #[error("browser error: {0}")]
    Browser(String),
}
