use crate::llm::{DEFAULT_MODEL, LlmSettings, Provider, provider::DEFAULT_AZURE_API_VERSION};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::session::EvictionPolicy;

/// Prefix of environment variables read by the `config` layer.
pub const ENV_PREFIX: &str = "MODECHAT";

/// Config file picked up from the working directory when none is given.
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Enable rate limiting
    #[arg(long, env = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub chat: ChatConfig,
    pub sessions: SessionsConfig,
    pub resilience: ResilienceConfig,
    pub images: ImagesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Session retention. A zero value disables the corresponding bound.
#[derive(Debug, Deserialize, Clone)]
pub struct SessionsConfig {
    pub max_sessions: usize,
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub rate_limit_enabled: bool,
    pub requests_per_second: f32,
    pub burst_size: f32,
    pub body_limit_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImagesConfig {
    pub size: String,
}

impl SessionsConfig {
    #[must_use]
    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy {
            max_sessions: (self.max_sessions > 0).then_some(self.max_sessions),
            idle_timeout: (self.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.idle_timeout_secs)),
        }
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 8000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("chat.temperature", 0.3)?
            .set_default("chat.max_tokens", 2000)?
            .set_default("sessions.max_sessions", 10_000)?
            .set_default("sessions.idle_timeout_secs", 24 * 60 * 60)?
            .set_default("sessions.sweep_interval_secs", 60)?
            .set_default("resilience.rate_limit_enabled", false)?
            .set_default("resilience.requests_per_second", 5.0)?
            .set_default("resilience.burst_size", 10.0)?
            .set_default("resilience.body_limit_bytes", 10 * 1024 * 1024)?
            .set_default("images.size", crate::llm::images::DEFAULT_IMAGE_SIZE)?;

        // 2. Config file: explicit path is required, ./config.yaml is optional
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path));
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
        }

        // 3. Environment variables, e.g. MODECHAT_SERVER__PORT=9000
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (clap already folded in PORT / RATE_LIMIT_ENABLED)
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(rl) = cli.rate_limit_enabled {
            builder = builder.set_override("resilience.rate_limit_enabled", rl)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}

/// Load provider settings from the environment.
///
/// Fails when no API key is set; callers treat that as "provider not
/// configured" rather than a fatal error.
pub fn load_llm_settings(chat: &ChatConfig) -> Result<LlmSettings, String> {
    let api_key = std::env::var("LLM_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .ok()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| "Missing required env var: LLM_API_KEY or OPENAI_API_KEY".to_string())?;

    let base_url = std::env::var("LLM_BASE_URL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "https://api.openai.com".to_string());

    let model = std::env::var("LLM_MODEL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    // Auto-detect provider from base URL
    let mut provider = Provider::detect_from_url(&base_url);
    if let Provider::AzureOpenAI { .. } = &provider {
        let deployment_name = std::env::var("AZURE_DEPLOYMENT_NAME")
            .map_err(|_| "Azure endpoints require AZURE_DEPLOYMENT_NAME".to_string())?;
        provider = Provider::AzureOpenAI {
            deployment_name,
            api_version: std::env::var("AZURE_API_VERSION")
                .unwrap_or_else(|_| DEFAULT_AZURE_API_VERSION.to_string()),
        };
    }

    Ok(LlmSettings {
        base_url,
        api_key,
        model,
        provider,
        temperature: chat.temperature,
        max_tokens: chat.max_tokens,
    })
}
