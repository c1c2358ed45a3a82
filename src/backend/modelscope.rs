//! ModelScope inference API adapter
//!
//! The generation call answers with `{"images": [{"url": ...}]}`; the first
//! URL is downloaded to obtain the image. Any hub model id is accepted.
//!
//! Recognized options: `negative_prompt`, `width`, `height`, `size`, `seed`,
//! `steps`, `guidance`.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::backend::http::{bearer_headers, ensure_success, fetch_image, pass_through, read_json};
use crate::backend::traits::{GenerationOptions, ImageProvider, ProviderFactory};
use crate::error::{AppError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api-inference.modelscope.cn";

pub const RECOGNIZED_OPTIONS: &[&str] = &[
    "negative_prompt",
    "width",
    "height",
    "size",
    "seed",
    "steps",
    "guidance",
];

#[derive(Debug, Deserialize)]
struct GenerationEnvelope {
    #[serde(default)]
    images: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: Option<String>,
}

/// Pull the first image URL out of a generation response
fn first_image_url(body: Value) -> Result<String> {
    let envelope: GenerationEnvelope = serde_json::from_value(body)
        .map_err(|e| AppError::MalformedResponse(format!("unexpected envelope: {}", e)))?;

    envelope
        .images
        .into_iter()
        .next()
        .ok_or_else(|| AppError::MalformedResponse("response contains no images".to_string()))?
        .url
        .ok_or_else(|| AppError::MalformedResponse("first image has no url".to_string()))
}

pub struct ModelScopeProvider {
    client: Client,
    api_token: Arc<SecretString>,
    base_url: String,
    model: String,
}

impl ModelScopeProvider {
    fn generations_url(&self) -> String {
        format!("{}/v1/images/generations", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ImageProvider for ModelScopeProvider {
    fn name(&self) -> &str {
        "modelscope"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn text_to_image(&self, prompt: &str, options: GenerationOptions) -> Result<Vec<u8>> {
        for key in options.unrecognized(RECOGNIZED_OPTIONS) {
            debug!(provider = "modelscope", option = %key, "Passing through unrecognized option");
        }

        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(self.model));
        payload.insert("prompt".to_string(), json!(prompt));
        pass_through(&mut payload, options.into_map());

        debug!(provider = "modelscope", model = %self.model, "Sending generation request");

        let response = self
            .client
            .post(self.generations_url())
            .headers(bearer_headers(&self.api_token)?)
            .json(&Value::Object(payload))
            .send()
            .await?;
        let response = ensure_success("modelscope", response).await?;
        let url = first_image_url(read_json("modelscope", response).await?)?;

        fetch_image(&self.client, "modelscope", &url).await
    }

    async fn image_to_image(
        &self,
        _input_image: &[u8],
        _prompt: &str,
        _options: GenerationOptions,
    ) -> Result<Vec<u8>> {
        Err(AppError::NotSupported {
            provider: "modelscope",
            operation: "image-to-image generation",
        })
    }
}

/// Binds a ModelScope token to hub model ids
pub struct ModelScopeFactory {
    client: Client,
    api_token: Arc<SecretString>,
    base_url: String,
}

impl ModelScopeFactory {
    pub fn new(client: Client, api_token: SecretString, base_url: impl Into<String>) -> Self {
        Self {
            client,
            api_token: Arc::new(api_token),
            base_url: base_url.into(),
        }
    }
}

impl ProviderFactory for ModelScopeFactory {
    fn create_provider(&self, model: &str) -> Arc<dyn ImageProvider> {
        Arc::new(ModelScopeProvider {
            client: self.client.clone(),
            api_token: self.api_token.clone(),
            base_url: self.base_url.clone(),
            model: model.to_string(),
        })
    }
}
