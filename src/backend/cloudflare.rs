//! Cloudflare Workers AI adapter
//!
//! One synchronous POST per generation; the response body is the PNG itself.
//!
//! Recognized options (forwarded as top-level payload fields):
//! `negative_prompt`, `height`, `width` (256-2048), `num_steps` (max 20),
//! `guidance` (default 7.5), `strength` (image-to-image, 0-1), `seed`.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::backend::http::{bearer_headers, ensure_success, pass_through};
use crate::backend::traits::{GenerationOptions, ImageProvider, ProviderFactory};
use crate::config::CloudflareCredentials;
use crate::error::Result;

pub const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

pub const RECOGNIZED_OPTIONS: &[&str] = &[
    "negative_prompt",
    "height",
    "width",
    "num_steps",
    "guidance",
    "strength",
    "seed",
];

pub struct CloudflareProvider {
    client: Client,
    credentials: Arc<CloudflareCredentials>,
    base_url: String,
    model: String,
}

impl CloudflareProvider {
    fn run_url(&self) -> String {
        format!(
            "{}/accounts/{}/ai/run/{}",
            self.base_url.trim_end_matches('/'),
            self.credentials.account_id.expose_secret(),
            self.model
        )
    }

    async fn run(&self, mut payload: Map<String, Value>, options: GenerationOptions) -> Result<Vec<u8>> {
        for key in options.unrecognized(RECOGNIZED_OPTIONS) {
            debug!(provider = "cloudflare", option = %key, "Passing through unrecognized option");
        }
        pass_through(&mut payload, options.into_map());

        debug!(provider = "cloudflare", model = %self.model, "Sending generation request");

        let response = self
            .client
            .post(self.run_url())
            .headers(bearer_headers(&self.credentials.api_token)?)
            .json(&Value::Object(payload))
            .send()
            .await?;
        let response = ensure_success("cloudflare", response).await?;

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ImageProvider for CloudflareProvider {
    fn name(&self) -> &str {
        "cloudflare"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn text_to_image(&self, prompt: &str, options: GenerationOptions) -> Result<Vec<u8>> {
        let mut payload = Map::new();
        payload.insert("prompt".to_string(), json!(prompt));
        self.run(payload, options).await
    }

    async fn image_to_image(
        &self,
        input_image: &[u8],
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<Vec<u8>> {
        let mut payload = Map::new();
        payload.insert("prompt".to_string(), json!(prompt));
        payload.insert("image_b64".to_string(), json!(STANDARD.encode(input_image)));
        self.run(payload, options).await
    }
}

/// Binds a Cloudflare account to model names
pub struct CloudflareFactory {
    client: Client,
    credentials: Arc<CloudflareCredentials>,
    base_url: String,
}

impl CloudflareFactory {
    pub fn new(client: Client, credentials: CloudflareCredentials, base_url: impl Into<String>) -> Self {
        Self {
            client,
            credentials: Arc::new(credentials),
            base_url: base_url.into(),
        }
    }
}

impl ProviderFactory for CloudflareFactory {
    fn create_provider(&self, model: &str) -> Arc<dyn ImageProvider> {
        Arc::new(CloudflareProvider {
            client: self.client.clone(),
            credentials: self.credentials.clone(),
            base_url: self.base_url.clone(),
            model: model.to_string(),
        })
    }
}
