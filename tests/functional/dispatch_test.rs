//! Functional tests for request dispatch

use async_trait::async_trait;
use image_dispatch_gateway::backend::registry::FactoryRegistry;
use image_dispatch_gateway::backend::traits::{GenerationOptions, ImageProvider, ProviderFactory};
use image_dispatch_gateway::capability::CapabilityRegistry;
use image_dispatch_gateway::gateway::{Dispatcher, GenerationRequest};
use image_dispatch_gateway::{AppError, Result};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Records every call that reaches a backend
#[derive(Default)]
struct CallLog {
    factory_calls: AtomicUsize,
    calls: Mutex<Vec<(String, String, Option<usize>)>>,
}

impl CallLog {
    fn backend_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

struct StubProvider {
    name: String,
    model: String,
    log: Arc<CallLog>,
}

#[async_trait]
impl ImageProvider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn text_to_image(&self, prompt: &str, _options: GenerationOptions) -> Result<Vec<u8>> {
        self.log
            .calls
            .lock()
            .unwrap()
            .push((self.model.clone(), prompt.to_string(), None));
        Ok(format!("PNG:{}:{}", self.model, prompt).into_bytes())
    }

    async fn image_to_image(
        &self,
        input_image: &[u8],
        prompt: &str,
        _options: GenerationOptions,
    ) -> Result<Vec<u8>> {
        self.log.calls.lock().unwrap().push((
            self.model.clone(),
            prompt.to_string(),
            Some(input_image.len()),
        ));
        Ok(b"PNG:i2i".to_vec())
    }
}

struct StubFactory {
    name: &'static str,
    log: Arc<CallLog>,
}

impl ProviderFactory for StubFactory {
    fn create_provider(&self, model: &str) -> Arc<dyn ImageProvider> {
        self.log.factory_calls.fetch_add(1, Ordering::SeqCst);
        Arc::new(StubProvider {
            name: self.name.to_string(),
            model: model.to_string(),
            log: self.log.clone(),
        })
    }
}

fn create_dispatcher(log: &Arc<CallLog>) -> Dispatcher {
    let capabilities = CapabilityRegistry::from_document(json!({
        "cloudflare": { "modelX": ["text_to_image"], "modelY": ["text_to_image", "image_to_image"] },
        "hub": { "*": ["text_to_image"] },
        "replicate": { "sdxl": ["text_to_image"] }
    }))
    .unwrap();

    let mut factories = FactoryRegistry::new();
    factories.register(
        "cloudflare",
        Arc::new(StubFactory {
            name: "cloudflare",
            log: log.clone(),
        }),
    );
    factories.register(
        "hub",
        Arc::new(StubFactory {
            name: "hub",
            log: log.clone(),
        }),
    );

    Dispatcher::new(Arc::new(capabilities), Arc::new(factories))
}

#[tokio::test]
async fn test_text_to_image_reaches_provider() {
    let log = Arc::new(CallLog::default());
    let dispatcher = create_dispatcher(&log);

    let image = dispatcher
        .handle_generate(GenerationRequest::new("cloudflare", "modelX", "text_to_image", "a cat"))
        .await
        .unwrap();

    assert_eq!(image, b"PNG:modelX:a cat");
    assert_eq!(log.factory_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        log.calls.lock().unwrap().as_slice(),
        &[("modelX".to_string(), "a cat".to_string(), None)]
    );
}

#[tokio::test]
async fn test_image_to_image_passes_input_bytes() {
    let log = Arc::new(CallLog::default());
    let dispatcher = create_dispatcher(&log);

    let request = GenerationRequest::new("cloudflare", "modelY", "image_to_image", "make it blue")
        .with_input_image(vec![0u8; 64])
        .with_options(GenerationOptions::new().with("strength", 0.5));
    let image = dispatcher.handle_generate(request).await.unwrap();

    assert_eq!(image, b"PNG:i2i");
    assert_eq!(log.calls.lock().unwrap()[0].2, Some(64));
}

#[tokio::test]
async fn test_unsupported_task_never_reaches_provider() {
    let log = Arc::new(CallLog::default());
    let dispatcher = create_dispatcher(&log);

    let request = GenerationRequest::new("cloudflare", "modelX", "image_to_image", "a cat")
        .with_input_image(b"image".to_vec());
    let err = dispatcher.handle_generate(request).await.unwrap_err();

    assert!(matches!(err, AppError::UnsupportedTask { .. }));
    assert!(err.is_client_error());
    assert_eq!(log.factory_calls.load(Ordering::SeqCst), 0);
    assert_eq!(log.backend_calls(), 0);
}

#[tokio::test]
async fn test_wildcard_provider_accepts_any_model() {
    let log = Arc::new(CallLog::default());
    let dispatcher = create_dispatcher(&log);

    let image = dispatcher
        .handle_generate(GenerationRequest::new("hub", "any/model-name", "text_to_image", "x"))
        .await
        .unwrap();

    assert_eq!(image, b"PNG:any/model-name:x");
}

#[tokio::test]
async fn test_missing_fields_are_reported_together() {
    let log = Arc::new(CallLog::default());
    let dispatcher = create_dispatcher(&log);

    let err = dispatcher
        .handle_generate(GenerationRequest::new("cloudflare", "", "text_to_image", ""))
        .await
        .unwrap_err();

    match err {
        AppError::MissingParameter(fields) => {
            assert!(fields.contains("model"));
            assert!(fields.contains("prompt"));
            assert!(!fields.contains("provider"));
        }
        other => panic!("expected MissingParameter, got {:?}", other),
    }
    assert_eq!(log.backend_calls(), 0);
}

#[tokio::test]
async fn test_image_to_image_without_image() {
    let log = Arc::new(CallLog::default());
    let dispatcher = create_dispatcher(&log);

    let request = GenerationRequest::new("cloudflare", "modelY", "image_to_image", "a cat")
        .with_input_image(Vec::new());
    let err = dispatcher.handle_generate(request).await.unwrap_err();

    assert!(matches!(err, AppError::MissingParameter(_)));
    assert_eq!(log.factory_calls.load(Ordering::SeqCst), 0);
    assert_eq!(log.backend_calls(), 0);
}

#[tokio::test]
async fn test_invalid_task_is_rejected() {
    let log = Arc::new(CallLog::default());
    let dispatcher = create_dispatcher(&log);

    let err = dispatcher
        .handle_generate(GenerationRequest::new("cloudflare", "modelX", "upscale", "a cat"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidTask(task) if task == "upscale"));
    assert_eq!(log.backend_calls(), 0);
}

#[tokio::test]
async fn test_unknown_provider_and_model() {
    let log = Arc::new(CallLog::default());
    let dispatcher = create_dispatcher(&log);

    let err = dispatcher
        .handle_generate(GenerationRequest::new("openai", "dall-e", "text_to_image", "a cat"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UnknownProvider(_)));

    let err = dispatcher
        .handle_generate(GenerationRequest::new("cloudflare", "modelZ", "text_to_image", "a cat"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UnknownModel { .. }));
    assert_eq!(log.backend_calls(), 0);
}

#[tokio::test]
async fn test_provider_without_factory_is_a_server_error() {
    let log = Arc::new(CallLog::default());
    let dispatcher = create_dispatcher(&log);

    let err = dispatcher
        .handle_generate(GenerationRequest::new("replicate", "sdxl", "text_to_image", "a cat"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ProviderNotImplemented(ref p) if p == "replicate"));
    assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        dispatcher.factories().missing_for(dispatcher.capabilities()),
        vec!["replicate".to_string()]
    );
}

#[tokio::test]
async fn test_concurrent_requests_are_independent() {
    let log = Arc::new(CallLog::default());
    let dispatcher = Arc::new(create_dispatcher(&log));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let model = if i % 2 == 0 { "modelX" } else { "modelY" };
                let prompt = format!("prompt-{}", i);
                let image = dispatcher
                    .handle_generate(GenerationRequest::new("cloudflare", model, "text_to_image", prompt.clone()))
                    .await
                    .unwrap();
                assert_eq!(image, format!("PNG:{}:{}", model, prompt).into_bytes());
            })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        result.unwrap();
    }
    assert_eq!(log.backend_calls(), 16);
    assert_eq!(log.factory_calls.load(Ordering::SeqCst), 16);
}
