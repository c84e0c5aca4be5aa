//! Configuration management
//!
//! This module handles loading and parsing server configuration for the dashboard.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.
//!
//! API keys and dashboard taxonomy live in a separate JSON file, see [`site`].

pub mod site;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use site::{SiteConfig, SiteConfigError, SiteConfigStore};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,
    /// LLM provider settings
    #[serde(default)]
    pub llm: LlmConfig,
    /// Map provider settings
    #[serde(default)]
    pub maps: MapsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/dashboard.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// In-process cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

fn default_max_capacity() -> u64 {
    10_000
}

/// Filesystem locations used by the server and the maintenance tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// JSON file holding API keys and dashboard taxonomy
    #[serde(default = "default_site_config")]
    pub site_config: PathBuf,
    /// Root of `output/llm_reports`, `output/poi_search` and friends
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Built single-page app (`index.html` + `assets/`)
    #[serde(default = "default_frontend_dist")]
    pub frontend_dist: PathBuf,
    /// Optional directory of template overrides
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    /// Markdown prompt template for report generation
    #[serde(default = "default_prompt_template")]
    pub prompt_template: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            site_config: default_site_config(),
            data_dir: default_data_dir(),
            frontend_dist: default_frontend_dist(),
            templates_dir: default_templates_dir(),
            prompt_template: default_prompt_template(),
        }
    }
}

impl PathsConfig {
    /// Directory where generated LLM report artifacts are written
    pub fn llm_reports_dir(&self) -> PathBuf {
        self.data_dir.join("output").join("llm_reports")
    }

    /// Directory where POI search exports are written
    pub fn poi_export_dir(&self) -> PathBuf {
        self.data_dir.join("output").join("poi_search")
    }

    /// Directory where uploaded POI files are exported after parsing
    pub fn poi_upload_dir(&self) -> PathBuf {
        self.data_dir.join("output").join("poi_upload")
    }

    /// Raw files received through the report upload
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// Analysis artifacts of uploaded documents
    pub fn upload_output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }
}

fn default_site_config() -> PathBuf {
    PathBuf::from("config.json")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_frontend_dist() -> PathBuf {
    PathBuf::from("frontend-vue/dist")
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_prompt_template() -> PathBuf {
    PathBuf::from("industry_analysis_llm_prompt.md")
}

/// LLM provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_kimi_base_url")]
    pub kimi_base_url: String,
    #[serde(default = "default_kimi_model")]
    pub kimi_model: String,
    #[serde(default = "default_temperature")]
    pub kimi_temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub kimi_max_tokens: u32,
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    /// Minimum spacing between two calls to the same provider
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Switch to another configured provider when the requested one fails
    #[serde(default = "default_enable_fallback")]
    pub enable_fallback: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            kimi_base_url: default_kimi_base_url(),
            kimi_model: default_kimi_model(),
            kimi_temperature: default_temperature(),
            kimi_max_tokens: default_max_tokens(),
            gemini_base_url: default_gemini_base_url(),
            gemini_model: default_gemini_model(),
            min_interval_ms: default_min_interval_ms(),
            request_timeout_secs: default_request_timeout(),
            enable_fallback: default_enable_fallback(),
        }
    }
}

fn default_kimi_base_url() -> String {
    "https://api.moonshot.cn/v1".to_string()
}

fn default_kimi_model() -> String {
    "moonshot-v1-128k".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    8000
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash-latest".to_string()
}

fn default_min_interval_ms() -> u64 {
    500
}

fn default_request_timeout() -> u64 {
    300
}

fn default_enable_fallback() -> bool {
    true
}

/// Map provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapsConfig {
    #[serde(default = "default_baidu_base_url")]
    pub baidu_base_url: String,
    #[serde(default = "default_google_base_url")]
    pub google_base_url: String,
    /// Upper bound for a batch POI search
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            baidu_base_url: default_baidu_base_url(),
            google_base_url: default_google_base_url(),
            max_results: default_max_results(),
        }
    }
}

fn default_baidu_base_url() -> String {
    "http://api.map.baidu.com".to_string()
}

fn default_google_base_url() -> String {
    "https://maps.googleapis.com/maps/api".to_string()
}

fn default_max_results() -> usize {
    100
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with the location.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - DASHBOARD_SERVER_HOST / DASHBOARD_SERVER_PORT / DASHBOARD_SERVER_CORS_ORIGIN
    /// - DASHBOARD_DATABASE_DRIVER / DASHBOARD_DATABASE_URL
    /// - DASHBOARD_SITE_CONFIG / DASHBOARD_DATA_DIR / DASHBOARD_FRONTEND_DIST
    /// - KIMI_MODEL / KIMI_TEMPERATURE / KIMI_MAX_TOKENS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError("server.port must not be 0".into()));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError("database.url must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.llm.kimi_temperature) {
            return Err(ConfigError::ValidationError(format!(
                "llm.kimi_temperature must be within [0, 2], got {}",
                self.llm.kimi_temperature
            )));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("DASHBOARD_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("DASHBOARD_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("DASHBOARD_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(driver) = std::env::var("DASHBOARD_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("DASHBOARD_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(path) = std::env::var("DASHBOARD_SITE_CONFIG") {
            self.paths.site_config = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("DASHBOARD_DATA_DIR") {
            self.paths.data_dir = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("DASHBOARD_FRONTEND_DIST") {
            self.paths.frontend_dist = PathBuf::from(path);
        }

        if let Ok(model) = std::env::var("KIMI_MODEL") {
            if !model.trim().is_empty() {
                self.llm.kimi_model = model;
            }
        }
        if let Ok(temp) = std::env::var("KIMI_TEMPERATURE") {
            if let Ok(temp) = temp.parse::<f32>() {
                self.llm.kimi_temperature = temp;
            }
        }
        if let Ok(max) = std::env::var("KIMI_MAX_TOKENS") {
            if let Ok(max) = max.parse::<u32>() {
                self.llm.kimi_max_tokens = max;
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all tests that modify environment variables.
#[cfg(test)]
pub(crate) static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ENV_VARS: &[&str] = &[
        "DASHBOARD_SERVER_HOST",
        "DASHBOARD_SERVER_PORT",
        "DASHBOARD_SERVER_CORS_ORIGIN",
        "DASHBOARD_DATABASE_DRIVER",
        "DASHBOARD_DATABASE_URL",
        "DASHBOARD_SITE_CONFIG",
        "DASHBOARD_DATA_DIR",
        "DASHBOARD_FRONTEND_DIST",
        "KIMI_MODEL",
        "KIMI_TEMPERATURE",
        "KIMI_MAX_TOKENS",
    ];

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        let guard = super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
        guard
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_config.yml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.database.url, "data/dashboard.db");
        assert_eq!(config.cache.ttl_seconds, 3600);
        assert_eq!(config.paths.site_config, PathBuf::from("config.json"));
        assert_eq!(config.llm.kimi_model, "moonshot-v1-128k");
        assert_eq!(config.llm.gemini_model, "gemini-1.5-flash-latest");
        assert_eq!(config.maps.max_results, 100);
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.port, 5000);
        assert!(config.llm.enable_fallback);
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 3000\nllm:\n  kimi_max_tokens: 4000\n").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.llm.kimi_max_tokens, 4000);
        assert_eq!(config.llm.kimi_temperature, 0.7);
    }

    #[test]
    fn test_derived_output_dirs() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "paths:\n  data_dir: /srv/dash\n").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(
            config.paths.llm_reports_dir(),
            PathBuf::from("/srv/dash/output/llm_reports")
        );
        assert_eq!(
            config.paths.poi_export_dir(),
            PathBuf::from("/srv/dash/output/poi_search")
        );
        assert_eq!(config.paths.poi_upload_dir(), PathBuf::from("/srv/dash/output/poi_upload"));
        assert_eq!(config.paths.uploads_dir(), PathBuf::from("/srv/dash/uploads"));
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: not_a_number\n").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn test_load_malformed_yaml_reports_location() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  host: [invalid yaml").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("line"));
    }

    #[test]
    fn test_validate_rejects_bad_temperature() {
        let mut config = Config::default();
        config.llm.kimi_temperature = 3.5;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        config.llm.kimi_temperature = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_override_server_and_paths() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8080\n").unwrap();

        std::env::set_var("DASHBOARD_SERVER_HOST", "127.0.0.1");
        std::env::set_var("DASHBOARD_SERVER_PORT", "4000");
        std::env::set_var("DASHBOARD_SITE_CONFIG", "/etc/dashboard/config.json");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.paths.site_config, PathBuf::from("/etc/dashboard/config.json"));

        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_env_override_kimi_settings() {
        let _guard = lock_env();

        let file = NamedTempFile::new().unwrap();
        std::env::set_var("KIMI_MODEL", "moonshot-v1-32k");
        std::env::set_var("KIMI_TEMPERATURE", "0.3");
        std::env::set_var("KIMI_MAX_TOKENS", "2048");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.llm.kimi_model, "moonshot-v1-32k");
        assert_eq!(config.llm.kimi_temperature, 0.3);
        assert_eq!(config.llm.kimi_max_tokens, 2048);

        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_env_override_invalid_values_ignored() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8080\ndatabase:\n  driver: sqlite\n").unwrap();

        std::env::set_var("DASHBOARD_SERVER_PORT", "not_a_number");
        std::env::set_var("DASHBOARD_DATABASE_DRIVER", "oracle");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);

        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }
}
