//! Application settings and configuration management

use crate::backend::poller::PollSettings;
use crate::backend::registry::ProviderKind;
use crate::backend::{aliyun, cloudflare, modelscope};
use crate::error::{AppError, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_request_timeout() -> u64 {
    300
}

fn default_max_upload() -> usize {
    10 * 1024 * 1024
}

/// Where the capability document lives
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CapabilitiesConfig {
    #[serde(default = "default_capabilities_path")]
    pub path: String,
}

fn default_capabilities_path() -> String {
    "models_config.json".to_string()
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            path: default_capabilities_path(),
        }
    }
}

/// Connection settings of one backend family
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEndpointConfig {
    pub base_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    60000
}

impl ProviderEndpointConfig {
    fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            enabled: true,
            timeout_ms: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_cloudflare")]
    pub cloudflare: ProviderEndpointConfig,
    #[serde(default = "default_modelscope")]
    pub modelscope: ProviderEndpointConfig,
    #[serde(default = "default_aliyun")]
    pub aliyun: ProviderEndpointConfig,
}

fn default_cloudflare() -> ProviderEndpointConfig {
    ProviderEndpointConfig::with_base_url(cloudflare::DEFAULT_BASE_URL)
}

fn default_modelscope() -> ProviderEndpointConfig {
    ProviderEndpointConfig::with_base_url(modelscope::DEFAULT_BASE_URL)
}

fn default_aliyun() -> ProviderEndpointConfig {
    ProviderEndpointConfig::with_base_url(aliyun::DEFAULT_BASE_URL)
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            cloudflare: default_cloudflare(),
            modelscope: default_modelscope(),
            aliyun: default_aliyun(),
        }
    }
}

impl ProvidersConfig {
    pub fn endpoint(&self, kind: ProviderKind) -> &ProviderEndpointConfig {
        match kind {
            ProviderKind::Cloudflare => &self.cloudflare,
            ProviderKind::ModelScope => &self.modelscope,
            ProviderKind::Aliyun => &self.aliyun,
        }
    }
}

/// Limits for submit-then-poll backends
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollerConfig {
    #[serde(default = "default_poll_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
}

fn default_poll_timeout() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    5
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_poll_timeout(),
            interval_secs: default_poll_interval(),
        }
    }
}

impl PollerConfig {
    pub fn settings(&self) -> PollSettings {
        PollSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            interval: Duration::from_secs(self.interval_secs),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Refuse to start when the capability document names a provider that
    /// has no bound factory
    #[serde(default)]
    pub strict_provider_check: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/gateway.yaml")
    }

    /// Load settings from a YAML or TOML file, with `IMAGE_GATEWAY__*` overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Determine file format
        let format = if path
            .extension()
            .map_or(false, |ext| ext == "yaml" || ext == "yml")
        {
            FileFormat::Yaml
        } else {
            FileFormat::Toml
        };

        let mut config_builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("server.request_timeout_secs", default_request_timeout() as i64)?
            .set_default("server.max_upload_bytes", default_max_upload() as i64)?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?;

        if path.exists() {
            config_builder = config_builder.add_source(File::from(path).format(format));
        }

        config_builder = config_builder.add_source(
            Environment::with_prefix("IMAGE_GATEWAY")
                .separator("__")
                .try_parsing(true),
        );

        let config = config_builder.build()?;
        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0".to_string()));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(invalid("Request timeout cannot be 0".to_string()));
        }

        for kind in ProviderKind::ALL {
            let endpoint = self.providers.endpoint(kind);
            if endpoint.enabled && endpoint.base_url.is_empty() {
                return Err(invalid(format!("Provider '{}' must have a base_url", kind)));
            }
            if endpoint.timeout_ms == 0 {
                return Err(invalid(format!("Provider '{}' timeout cannot be 0", kind)));
            }
        }

        if self.poller.interval_secs == 0 {
            return Err(invalid("Poll interval cannot be 0".to_string()));
        }
        if self.poller.interval_secs > self.poller.timeout_secs {
            return Err(invalid(format!(
                "Poll interval ({}s) exceeds poll timeout ({}s)",
                self.poller.interval_secs, self.poller.timeout_secs
            )));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

fn invalid(message: String) -> AppError {
    AppError::Config(config::ConfigError::Message(message))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                max_upload_bytes: default_max_upload(),
            },
            capabilities: CapabilitiesConfig::default(),
            providers: ProvidersConfig::default(),
            poller: PollerConfig::default(),
            dispatch: DispatchConfig::default(),
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
        }
    }
}
