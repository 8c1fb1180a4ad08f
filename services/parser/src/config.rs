use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the parser service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Parsing backend selection
    #[serde(default)]
    pub backend: BackendConfig,
    /// Gemini settings, required when the gemini backend is selected
    pub gemini: Option<GeminiConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

/// Which parser answers `/parse`
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Constant recipe, no external calls
    #[default]
    Stub,
    /// Google Gemini multimodal model
    Gemini,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
}

/// Gemini model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    /// API key
    pub api_key: String,
    /// Model name
    #[serde(default = "default_gemini_model")]
    pub model: String,
    /// API base URL
    #[serde(default = "default_gemini_api_base")]
    pub api_base: String,
    /// Base URL that stored paths are downloaded from
    pub storage_base_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl GeminiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_service_name() -> String {
    "parser-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9091
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash-preview-05-20".to_string()
}

fn default_gemini_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", "parser-service")?
            .set_default("service.log_level", "info")?
            .add_source(config::File::with_name("config/parser").required(false))
            .add_source(config::File::with_name("/etc/cheapfood/parser").required(false))
            // PARSER__GEMINI__API_KEY -> gemini.api_key
            .add_source(
                config::Environment::with_prefix("PARSER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: default_cors_origins(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(config.backend.kind, BackendKind::Stub);
        assert_eq!(config.api.port, 8000);
        assert_eq!(config.api.cors_origins, vec!["http://localhost:3000"]);
        assert!(config.gemini.is_none());
    }

    #[test]
    fn test_gemini_section() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "backend": { "kind": "gemini" },
            "gemini": {
                "api_key": "key",
                "storage_base_url": "https://abc.supabase.co/storage/v1/object/uploads"
            }
        }))
        .unwrap();

        let gemini = config.gemini.unwrap();
        assert_eq!(config.backend.kind, BackendKind::Gemini);
        assert_eq!(gemini.model, "gemini-2.5-flash-preview-05-20");
        assert_eq!(gemini.request_timeout(), Duration::from_secs(120));
    }
}
