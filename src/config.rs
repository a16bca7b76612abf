use crate::error::ConfigurationError;
use crate::keepalive::MAX_PROBE_INTERVAL;
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL, GeminiSettings, GenerationConfig};
use clap::Parser;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use url::Url;

/// Environment variable holding the upstream API credential.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Prefix for environment overrides, e.g. `RELAY_SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "RELAY";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// URL requested by the liveness prober. Set this to the public URL of
    /// the deployment; the loopback default does not count as inbound traffic
    /// for hosting platforms that idle quiet processes.
    #[arg(long, env = "KEEPALIVE_URL")]
    pub keepalive_url: Option<String>,

    /// Disable the liveness prober
    #[arg(long, env = "KEEPALIVE_DISABLED")]
    pub keepalive_disabled: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub session: SessionConfig,
    pub keepalive: KeepAliveConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("top_k", &self.top_k)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub history_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeepAliveConfig {
    pub enabled: bool,
    #[serde(default)]
    pub url: Option<String>,
    pub interval_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigurationError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        // 1. Defaults
        let mut builder = Config::builder()
            .set_default("server.port", 8080)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("llm.base_url", DEFAULT_BASE_URL)?
            .set_default("llm.model", DEFAULT_MODEL)?
            .set_default("llm.temperature", 1.0)?
            .set_default("llm.top_p", 0.95)?
            .set_default("llm.top_k", 64)?
            .set_default("llm.max_output_tokens", 8192)?
            .set_default("session.history_capacity", 25)?
            .set_default("keepalive.enabled", true)?
            .set_default("keepalive.interval_secs", 600)?;

        // 2. Config file: an explicit path must exist, ./config.yaml is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::new("config", FileFormat::Yaml).required(false)),
        };

        // 3. Prefixed environment, e.g. RELAY_KEEPALIVE__INTERVAL_SECS=300
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags and their plain env fallbacks win over everything else
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(url) = cli.keepalive_url {
            builder = builder.set_override("keepalive.url", url)?;
        }
        if let Some(disabled) = cli.keepalive_disabled {
            builder = builder.set_override("keepalive.enabled", !disabled)?;
        }
        if let Ok(key) = env::var(API_KEY_ENV) {
            builder = builder.set_override("llm.api_key", key)?;
        }

        let cfg = builder.build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Address the HTTP server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Upstream settings; fails if the API credential is absent or blank.
    pub fn gemini_settings(&self) -> Result<GeminiSettings, ConfigurationError> {
        let api_key = self
            .llm
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigurationError::MissingCredential(API_KEY_ENV))?;

        Ok(GeminiSettings {
            base_url: self.llm.base_url.clone(),
            api_key: api_key.to_string(),
            model: self.llm.model.clone(),
            generation: GenerationConfig {
                temperature: self.llm.temperature,
                top_p: self.llm.top_p,
                top_k: self.llm.top_k,
                max_output_tokens: self.llm.max_output_tokens,
                ..GenerationConfig::default()
            },
        })
    }

    /// URL the liveness prober requests; defaults to this server's own `/ping`.
    pub fn keepalive_target(&self) -> Result<Url, ConfigurationError> {
        let raw = match &self.keepalive.url {
            Some(url) => url.clone(),
            None => format!("http://127.0.0.1:{}/ping", self.server.port),
        };
        Url::parse(&raw).map_err(|source| ConfigurationError::InvalidUrl {
            key: "keepalive.url",
            source,
        })
    }

    /// True when no `keepalive.url` is set and the prober falls back to loopback.
    #[must_use]
    pub fn keepalive_uses_loopback(&self) -> bool {
        self.keepalive.url.is_none()
    }

    /// Delay between liveness probes; must be non-zero and at most one day.
    pub fn keepalive_interval(&self) -> Result<Duration, ConfigurationError> {
        let secs = self.keepalive.interval_secs;
        let max = MAX_PROBE_INTERVAL.as_secs();
        if secs == 0 || secs > max {
            return Err(ConfigurationError::InvalidInterval {
                key: "keepalive.interval_secs",
                value: secs,
                max,
            });
        }
        Ok(Duration::from_secs(secs))
    }
}
