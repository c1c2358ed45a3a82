//! Common traits and types for image generation providers

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::capability::Task;
use crate::error::{AppError, Result};

/// Provider-specific settings forwarded with a generation call
///
/// Each adapter documents the keys it maps into its own payload shape. Keys an
/// adapter does not know about are sent to the backend unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions(Map<String, Value>);

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys outside an adapter's recognized set
    pub fn unrecognized<'a>(&'a self, recognized: &'a [&str]) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .keys()
            .map(String::as_str)
            .filter(move |key| !recognized.contains(key))
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for GenerationOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for GenerationOptions {
    type Error = AppError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(AppError::MissingParameter(format!(
                "options must be a JSON object, got {}",
                other
            ))),
        }
    }
}

/// Uniform capability set of an image generation backend
///
/// Adapters implement both primitives; one their backend lacks returns
/// [`AppError::NotSupported`].
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Provider family identifier, e.g. `cloudflare`
    fn name(&self) -> &str;

    /// Model the instance is bound to
    fn model(&self) -> &str;

    async fn text_to_image(&self, prompt: &str, options: GenerationOptions) -> Result<Vec<u8>>;

    async fn image_to_image(
        &self,
        input_image: &[u8],
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<Vec<u8>>;

    /// Route a task name to the matching primitive
    async fn generate(
        &self,
        task: &str,
        prompt: &str,
        input_image: Option<&[u8]>,
        options: GenerationOptions,
    ) -> Result<Vec<u8>> {
        let task: Task = task.parse()?;
        if prompt.is_empty() {
            return Err(AppError::MissingParameter(format!(
                "{} task requires a 'prompt' parameter",
                task
            )));
        }

        debug!(provider = %self.name(), model = %self.model(), task = %task, "Dispatching to provider");

        match task {
            Task::TextToImage => self.text_to_image(prompt, options).await,
            Task::ImageToImage => match input_image {
                Some(image) if !image.is_empty() => {
                    self.image_to_image(image, prompt, options).await
                }
                _ => Err(AppError::MissingParameter(
                    "image_to_image task requires both 'prompt' and 'input_image' parameters"
                        .to_string(),
                )),
            },
        }
    }
}

/// Builds provider instances for one backend family
pub trait ProviderFactory: Send + Sync {
    /// Bind the factory's credentials to `model`; no network calls
    fn create_provider(&self, model: &str) -> std::sync::Arc<dyn ImageProvider>;
}
