//! Dispatch orchestrator: validate, pick a provider, generate

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::registry::FactoryRegistry;
use crate::backend::traits::GenerationOptions;
use crate::capability::{CapabilityRegistry, Task};
use crate::error::{AppError, Result};

/// One inbound generation call
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub provider: String,
    pub model: String,
    pub task: String,
    pub prompt: String,
    pub input_image: Option<Vec<u8>>,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        task: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            task: task.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_input_image(mut self, image: Vec<u8>) -> Self {
        self.input_image = Some(image);
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

/// Shared, read-only dispatch state
pub struct Dispatcher {
    capabilities: Arc<CapabilityRegistry>,
    factories: Arc<FactoryRegistry>,
}

impl Dispatcher {
    pub fn new(capabilities: Arc<CapabilityRegistry>, factories: Arc<FactoryRegistry>) -> Self {
        Self {
            capabilities,
            factories,
        }
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    pub fn factories(&self) -> &FactoryRegistry {
        &self.factories
    }

    /// Validate `request` and run it against the matching provider
    pub async fn handle_generate(&self, request: GenerationRequest) -> Result<Vec<u8>> {
        let GenerationRequest {
            provider,
            model,
            task,
            prompt,
            input_image,
            options,
        } = request;

        let mut missing: Vec<&str> = Vec::new();
        for (name, value) in [
            ("provider", &provider),
            ("model", &model),
            ("task", &task),
            ("prompt", &prompt),
        ] {
            if value.is_empty() {
                missing.push(name);
            }
        }
        if !missing.is_empty() {
            return Err(AppError::MissingParameter(missing.join(", ")));
        }

        let has_image = input_image.as_ref().map_or(false, |image| !image.is_empty());
        if task == Task::ImageToImage.as_str() && !has_image {
            return Err(AppError::MissingParameter(
                "'image' file for image-to-image task".to_string(),
            ));
        }

        let parsed_task: Task = task.parse()?;
        self.capabilities.validate(&provider, &model, parsed_task)?;

        let instance = self.factories.create_provider(&provider, &model).map_err(|e| {
            warn!(provider = %provider, "Provider passed validation but has no factory");
            e
        })?;

        debug!(provider = %provider, model = %model, task = %parsed_task, "Request validated");

        let image = instance
            .generate(&task, &prompt, input_image.as_deref(), options)
            .await?;

        info!(
            provider = %provider,
            model = %model,
            task = %parsed_task,
            bytes = image.len(),
            "Image generation completed"
        );

        Ok(image)
    }
}
