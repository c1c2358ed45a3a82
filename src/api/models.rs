//! API request and response models

use serde::{Deserialize, Serialize};

use crate::backend::traits::GenerationOptions;
use crate::error::{AppError, Result};
use crate::gateway::GenerationRequest;

/// Fields collected from a `/generate` multipart form
#[derive(Debug, Clone, Default)]
pub struct GenerateForm {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub task: Option<String>,
    pub prompt: Option<String>,
    /// JSON object with provider-specific options
    pub options: Option<String>,
    pub image: Option<Vec<u8>>,
}

impl GenerateForm {
    /// Set a text field; unknown names are ignored
    pub fn set_text(&mut self, name: &str, value: String) {
        let slot = match name {
            "provider" => &mut self.provider,
            "model" => &mut self.model,
            "task" => &mut self.task,
            "prompt" => &mut self.prompt,
            "options" => &mut self.options,
            _ => return,
        };
        *slot = Some(value);
    }

    pub fn into_request(self) -> Result<GenerationRequest> {
        let options = match self.options.as_deref().map(str::trim) {
            None | Some("") => GenerationOptions::new(),
            Some(raw) => {
                let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
                    AppError::MissingParameter(format!("'options' is not valid JSON: {}", e))
                })?;
                GenerationOptions::try_from(value)?
            }
        };

        Ok(GenerationRequest {
            provider: self.provider.unwrap_or_default(),
            model: self.model.unwrap_or_default(),
            task: self.task.unwrap_or_default(),
            prompt: self.prompt.unwrap_or_default(),
            input_image: self.image,
            options,
        })
    }
}

/// Health check response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Providers with a bound factory
    pub providers: Vec<String>,
    /// Providers the capability document lists without a bound factory
    pub unavailable: Vec<String>,
}
