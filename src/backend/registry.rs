//! Provider factory registry: provider id -> factory bound to credentials

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::backend::aliyun::AliyunFactory;
use crate::backend::cloudflare::CloudflareFactory;
use crate::backend::http::build_client;
use crate::backend::modelscope::ModelScopeFactory;
use crate::backend::traits::{ImageProvider, ProviderFactory};
use crate::capability::CapabilityRegistry;
use crate::config::{ProviderCredentials, ProviderEndpointConfig, Settings};
use crate::error::{AppError, Result};

/// Backend families this gateway has adapters for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Cloudflare,
    ModelScope,
    Aliyun,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Cloudflare,
        ProviderKind::ModelScope,
        ProviderKind::Aliyun,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Cloudflare => "cloudflare",
            ProviderKind::ModelScope => "modelscope",
            ProviderKind::Aliyun => "aliyun",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AppError::ProviderNotImplemented(s.to_string()))
    }
}

/// Registry of provider factories, built once at startup and then read-only
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, Arc<dyn ProviderFactory>>,
}

impl FactoryRegistry {
    /// Create a new empty factory registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every enabled provider family that has credentials
    pub fn from_settings(settings: &Settings, credentials: ProviderCredentials) -> Result<Self> {
        let mut registry = Self::new();
        let ProviderCredentials {
            mut cloudflare,
            mut modelscope,
            mut aliyun,
        } = credentials;

        for kind in ProviderKind::ALL {
            let endpoint = settings.providers.endpoint(kind);
            if !endpoint.enabled {
                info!(provider = %kind, "Skipping disabled provider");
                continue;
            }

            let factory: Option<Arc<dyn ProviderFactory>> = match kind {
                ProviderKind::Cloudflare => match cloudflare.take() {
                    Some(creds) => Some(Arc::new(CloudflareFactory::new(
                        client_for(endpoint)?,
                        creds,
                        endpoint.base_url.clone(),
                    ))),
                    None => None,
                },
                ProviderKind::ModelScope => match modelscope.take() {
                    Some(token) => Some(Arc::new(ModelScopeFactory::new(
                        client_for(endpoint)?,
                        token,
                        endpoint.base_url.clone(),
                    ))),
                    None => None,
                },
                ProviderKind::Aliyun => match aliyun.take() {
                    Some(key) => Some(Arc::new(AliyunFactory::new(
                        client_for(endpoint)?,
                        key,
                        endpoint.base_url.clone(),
                        settings.poller.settings(),
                    ))),
                    None => None,
                },
            };

            match factory {
                Some(factory) => {
                    registry.register(kind.as_str(), factory);
                    info!(provider = %kind, base_url = %endpoint.base_url, "Registered provider");
                }
                None => warn!(provider = %kind, "Missing credentials, provider not registered"),
            }
        }

        Ok(registry)
    }

    /// Bind `factory` under `provider`, replacing any previous binding
    pub fn register(&mut self, provider: impl Into<String>, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(provider.into(), factory);
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn ProviderFactory>> {
        self.factories.get(provider).cloned()
    }

    /// Build a provider instance for `model`
    pub fn create_provider(&self, provider: &str, model: &str) -> Result<Arc<dyn ImageProvider>> {
        let factory = self
            .get(provider)
            .ok_or_else(|| AppError::ProviderNotImplemented(provider.to_string()))?;
        Ok(factory.create_provider(model))
    }

    /// Providers the capability registry lists but nothing is bound for
    pub fn missing_for(&self, capabilities: &CapabilityRegistry) -> Vec<String> {
        capabilities
            .providers()
            .filter(|provider| !self.contains(provider))
            .map(String::from)
            .collect()
    }

    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.factories.contains_key(provider)
    }
}

fn client_for(endpoint: &ProviderEndpointConfig) -> Result<reqwest::Client> {
    build_client(Duration::from_millis(endpoint.timeout_ms))
}
