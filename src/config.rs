use std::{net::SocketAddr, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

/// Top-level gateway configuration, loaded from an optional TOML file and
/// layered with CLI overrides in `main.rs`. Parsing itself is a thin
/// deserialize — the interesting policy logic lives in the component each
/// section configures (`middleware::cors`, `middleware::rate_limit`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
    pub api_key: ApiKeyConfig,
    pub rate_limit: RateLimitConfig,
    pub engines: EnginesConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            cors: CorsConfig::default(),
            api_key: ApiKeyConfig::default(),
            rate_limit: RateLimitConfig::default(),
            engines: EnginesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Default filter directive, overridden by `RUST_LOG` when set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config: GatewayConfig = toml::from_str(s)?;
        Ok(config)
    }

    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&contents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub request_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub models_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".parse().expect("valid default bind addr"),
            request_timeout_secs: 30,
            idle_timeout_secs: 30,
            models_dir: "./models".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "DELETE".to_string(),
                "OPTIONS".to_string(),
            ],
            allowed_headers: vec!["*".to_string()],
            allow_credentials: false,
            max_age_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeyConfig {
    pub enabled: bool,
    pub required: bool,
    pub header_name: String,
    pub keys: Vec<String>,
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            required: false,
            header_name: "Authorization".to_string(),
            keys: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 120,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    pub idle_timeout_secs: u64,
    pub idle_sweep_interval_secs: u64,
    #[serde(default)]
    pub preload: Vec<PreloadEngine>,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 600,
            idle_sweep_interval_secs: 30,
            preload: Vec::new(),
        }
    }
}

impl EnginesConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn idle_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.idle_sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreloadEngine {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub load_params: Option<serde_json::Value>,
    #[serde(default)]
    pub gpu_id: Option<i32>,
    #[serde(default)]
    pub load_at_startup: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = GatewayConfig::default();
        assert!(config.cors.enabled);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.max_requests, 120);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let toml_str = r#"
            [server]
            bind = "127.0.0.1:9000"

            [rate_limit]
            max_requests = 3
            window_secs = 60
        "#;
        let config = GatewayConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.server.bind.port(), 9000);
        assert_eq!(config.rate_limit.max_requests, 3);
        // Untouched sections keep their defaults.
        assert!(config.cors.enabled);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(GatewayConfig::from_toml_str("not = [valid").is_err());
    }
}
