//! Aliyun DashScope image synthesis adapter
//!
//! Synthesis is submitted as an async task (`X-DashScope-Async: enable`), the
//! returned `task_id` is polled at `/api/v1/tasks/{task_id}` until it reaches
//! a terminal status, and the first result URL of a succeeded task is
//! downloaded. Parameters depend on the model family:
//!
//! - `stable-diffusion*` models take `negative_prompt` in `input`;
//! - every other model (the wanx family) takes `style` and, for
//!   image-to-image, `ref_mode` and `ref_strength` in `parameters`.
//!
//! Both families accept `n`, `size` and `seed`. Unrecognized options go into
//! `parameters` unchanged.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::{Arc, OnceLock};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::backend::http::{bearer_headers, ensure_success, fetch_image, pass_through, read_json};
use crate::backend::poller::{await_with_settings, JobState, PollSettings};
use crate::backend::traits::{GenerationOptions, ImageProvider, ProviderFactory};
use crate::error::{AppError, Result};

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com";

/// Image synthesis only runs as an async task
const ASYNC_HEADER: &str = "X-DashScope-Async";

const DEFAULT_N: u32 = 1;
const DEFAULT_SIZE: &str = "1024*1024";
const DEFAULT_STYLE: &str = "<auto>";
const DEFAULT_REF_MODE: &str = "repaint";
const DEFAULT_REF_STRENGTH: f64 = 1.0;

/// Parameter set a model expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    StableDiffusion,
    Wanx,
}

impl ModelFamily {
    /// Guess the family from the model id.
    ///
    /// This is a prefix match only: a model named `stable-diffusion-*` that
    /// actually expects the wanx parameters would be sent the wrong set.
    pub fn detect(model: &str) -> Self {
        if model.starts_with("stable-diffusion") {
            ModelFamily::StableDiffusion
        } else {
            ModelFamily::Wanx
        }
    }

    pub fn recognized_options(&self) -> &'static [&'static str] {
        match self {
            ModelFamily::StableDiffusion => &["n", "size", "seed", "negative_prompt"],
            ModelFamily::Wanx => &["n", "size", "seed", "style", "ref_mode", "ref_strength"],
        }
    }
}

/// Input image written to a temporary file for the duration of one call
///
/// The file is removed when the guard drops, whichever way the call ends.
struct StagedImage {
    file: NamedTempFile,
}

impl StagedImage {
    async fn stage(bytes: &[u8]) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("dashscope-input-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| AppError::Internal(format!("Failed to stage input image: {}", e)))?;
        tokio::fs::write(file.path(), bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to stage input image: {}", e)))?;

        debug!(path = %file.path().display(), "Staged input image");
        Ok(Self { file })
    }

    fn url(&self) -> String {
        format!("file://{}", self.file.path().display())
    }
}

impl Drop for StagedImage {
    fn drop(&mut self) {
        debug!(path = %self.file.path().display(), "Releasing staged input image");
    }
}

#[derive(Debug, Deserialize)]
struct TaskEnvelope {
    code: Option<String>,
    message: Option<String>,
    output: Option<TaskOutput>,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    task_id: Option<String>,
    task_status: Option<String>,
    code: Option<String>,
    message: Option<String>,
    #[serde(default)]
    results: Vec<TaskResult>,
}

#[derive(Debug, Deserialize)]
struct TaskResult {
    url: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

/// Unwrap the `output` object of a submit or task query response
fn task_output(body: Value) -> Result<TaskOutput> {
    let envelope: TaskEnvelope = serde_json::from_value(body)
        .map_err(|e| AppError::MalformedResponse(format!("unexpected envelope: {}", e)))?;

    if let Some(code) = envelope.code.filter(|c| !c.is_empty()) {
        return Err(AppError::BackendFailure {
            code,
            message: envelope.message.unwrap_or_default(),
        });
    }

    envelope
        .output
        .ok_or_else(|| AppError::MalformedResponse("response has no output".to_string()))
}

/// Task id handed back by an accepted submission
fn submitted_task_id(body: Value) -> Result<String> {
    let output = task_output(body)?;

    if output.task_status.as_deref() == Some("FAILED") {
        return Err(AppError::BackendFailure {
            code: output.code.unwrap_or_else(|| "FAILED".to_string()),
            message: output.message.unwrap_or_default(),
        });
    }

    output
        .task_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::MalformedResponse("submission returned no task_id".to_string()))
}

fn job_state(task_status: Option<&str>) -> Result<JobState> {
    match task_status {
        Some("PENDING") | Some("RUNNING") => Ok(JobState::Pending),
        Some("SUCCEEDED") => Ok(JobState::Complete),
        Some("FAILED") | Some("UNKNOWN") | Some("CANCELED") => Ok(JobState::Failed),
        Some(other) => Err(AppError::MalformedResponse(format!(
            "unexpected task_status '{}'",
            other
        ))),
        None => Err(AppError::MalformedResponse(
            "task response has no task_status".to_string(),
        )),
    }
}

/// First image URL of a finished task
fn first_result_url(output: TaskOutput) -> Result<String> {
    let first = output
        .results
        .into_iter()
        .next()
        .ok_or_else(|| AppError::MalformedResponse("response contains no results".to_string()))?;

    match (first.url, first.code) {
        (Some(url), _) => Ok(url),
        (None, Some(code)) => Err(AppError::BackendFailure {
            code,
            message: first.message.unwrap_or_default(),
        }),
        (None, None) => Err(AppError::MalformedResponse(
            "first result has no url".to_string(),
        )),
    }
}

pub struct AliyunProvider {
    client: Client,
    api_key: Arc<SecretString>,
    base_url: String,
    model: String,
    poll: PollSettings,
}

impl AliyunProvider {
    fn synthesis_url(&self) -> String {
        format!(
            "{}/api/v1/services/aigc/text2image/image-synthesis",
            self.base_url.trim_end_matches('/')
        )
    }

    fn task_url(&self, task_id: &str) -> String {
        format!("{}/api/v1/tasks/{}", self.base_url.trim_end_matches('/'), task_id)
    }

    /// Split the options bag into the `input` and `parameters` objects
    fn build_payload(
        &self,
        prompt: &str,
        sketch_image_url: Option<String>,
        mut options: GenerationOptions,
    ) -> Value {
        let family = ModelFamily::detect(&self.model);
        for key in options.unrecognized(family.recognized_options()) {
            debug!(provider = "aliyun", option = %key, "Passing through unrecognized option");
        }

        let mut input = Map::new();
        input.insert("prompt".to_string(), json!(prompt));

        let mut parameters = Map::new();
        parameters.insert(
            "n".to_string(),
            options.remove("n").unwrap_or_else(|| json!(DEFAULT_N)),
        );
        parameters.insert(
            "size".to_string(),
            options.remove("size").unwrap_or_else(|| json!(DEFAULT_SIZE)),
        );
        if let Some(seed) = options.remove("seed") {
            parameters.insert("seed".to_string(), seed);
        }

        match family {
            ModelFamily::StableDiffusion => {
                if let Some(negative_prompt) = options.remove("negative_prompt") {
                    input.insert("negative_prompt".to_string(), negative_prompt);
                }
            }
            ModelFamily::Wanx => {
                parameters.insert(
                    "style".to_string(),
                    options.remove("style").unwrap_or_else(|| json!(DEFAULT_STYLE)),
                );
                if sketch_image_url.is_some() {
                    parameters.insert(
                        "ref_mode".to_string(),
                        options.remove("ref_mode").unwrap_or_else(|| json!(DEFAULT_REF_MODE)),
                    );
                    parameters.insert(
                        "ref_strength".to_string(),
                        options
                            .remove("ref_strength")
                            .unwrap_or_else(|| json!(DEFAULT_REF_STRENGTH)),
                    );
                }
            }
        }

        if let Some(url) = sketch_image_url {
            input.insert("sketch_image_url".to_string(), json!(url));
        }

        pass_through(&mut parameters, options.into_map());

        json!({
            "model": self.model,
            "input": input,
            "parameters": parameters,
        })
    }

    /// Submit a synthesis task, wait for it, then download the first image
    async fn synthesize(&self, payload: Value) -> Result<Vec<u8>> {
        debug!(provider = "aliyun", model = %self.model, "Submitting synthesis task");

        let response = self
            .client
            .post(self.synthesis_url())
            .headers(bearer_headers(&self.api_key)?)
            .header(ASYNC_HEADER, "enable")
            .json(&payload)
            .send()
            .await?;
        let response = ensure_success("aliyun", response).await?;
        let task_id = submitted_task_id(read_json("aliyun", response).await?)?;

        debug!(provider = "aliyun", task_id = %task_id, "Synthesis task accepted");

        let image_url = OnceLock::new();
        let image_url = &image_url;
        await_with_settings(
            &task_id,
            |task_id| self.query_task(task_id, image_url),
            |task_id| async move {
                let url = image_url.get().cloned().ok_or_else(|| {
                    AppError::MalformedResponse(format!("task {} finished without a result", task_id))
                })?;
                fetch_image(&self.client, "aliyun", &url).await
            },
            self.poll,
        )
        .await
        .map_err(|e| {
            warn!(provider = "aliyun", model = %self.model, error = %e, "Synthesis returned no image");
            e
        })
    }

    /// One task status query; records the result URL once the task succeeds
    async fn query_task(&self, task_id: String, image_url: &OnceLock<String>) -> Result<JobState> {
        let response = self
            .client
            .get(self.task_url(&task_id))
            .headers(bearer_headers(&self.api_key)?)
            .send()
            .await?;
        let response = ensure_success("aliyun", response).await?;
        let output = task_output(read_json("aliyun", response).await?)?;
        let state = job_state(output.task_status.as_deref())?;

        match state {
            JobState::Complete => {
                let _ = image_url.set(first_result_url(output)?);
            }
            JobState::Failed => warn!(
                provider = "aliyun",
                task_id = %task_id,
                code = output.code.as_deref().unwrap_or_default(),
                message = output.message.as_deref().unwrap_or_default(),
                "Synthesis task failed"
            ),
            JobState::Pending => {}
        }

        Ok(state)
    }
}

#[async_trait]
impl ImageProvider for AliyunProvider {
    fn name(&self) -> &str {
        "aliyun"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn text_to_image(&self, prompt: &str, options: GenerationOptions) -> Result<Vec<u8>> {
        let payload = self.build_payload(prompt, None, options);
        self.synthesize(payload).await
    }

    async fn image_to_image(
        &self,
        input_image: &[u8],
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<Vec<u8>> {
        let staged = StagedImage::stage(input_image).await?;
        let payload = self.build_payload(prompt, Some(staged.url()), options);
        let result = self.synthesize(payload).await;
        drop(staged);
        result
    }
}

/// Binds a DashScope API key to model names
pub struct AliyunFactory {
    client: Client,
    api_key: Arc<SecretString>,
    base_url: String,
    poll: PollSettings,
}

impl AliyunFactory {
    pub fn new(
        client: Client,
        api_key: SecretString,
        base_url: impl Into<String>,
        poll: PollSettings,
    ) -> Self {
        Self {
            client,
            api_key: Arc::new(api_key),
            base_url: base_url.into(),
            poll,
        }
    }
}

impl ProviderFactory for AliyunFactory {
    fn create_provider(&self, model: &str) -> Arc<dyn ImageProvider> {
        Arc::new(AliyunProvider {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: model.to_string(),
            poll: self.poll,
        })
    }
}
