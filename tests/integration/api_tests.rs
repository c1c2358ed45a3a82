//! API endpoint integration tests

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use image_dispatch_gateway::api::models::HealthResponse;
use image_dispatch_gateway::api::routes::create_router;
use image_dispatch_gateway::backend::registry::FactoryRegistry;
use image_dispatch_gateway::backend::traits::{GenerationOptions, ImageProvider, ProviderFactory};
use image_dispatch_gateway::capability::CapabilityRegistry;
use image_dispatch_gateway::config::Settings;
use image_dispatch_gateway::gateway::Dispatcher;
use image_dispatch_gateway::{AppState, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "gateway-test-boundary";

struct EchoProvider {
    model: String,
}

#[async_trait]
impl ImageProvider for EchoProvider {
    fn name(&self) -> &str {
        "cloudflare"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn text_to_image(&self, prompt: &str, options: GenerationOptions) -> Result<Vec<u8>> {
        let seed = options.get("seed").cloned().unwrap_or(Value::Null);
        Ok(format!("PNG:{}:{}:{}", self.model, prompt, seed).into_bytes())
    }

    async fn image_to_image(
        &self,
        input_image: &[u8],
        _prompt: &str,
        _options: GenerationOptions,
    ) -> Result<Vec<u8>> {
        Ok([b"PNG:".as_slice(), input_image].concat())
    }
}

struct EchoFactory;

impl ProviderFactory for EchoFactory {
    fn create_provider(&self, model: &str) -> Arc<dyn ImageProvider> {
        Arc::new(EchoProvider {
            model: model.to_string(),
        })
    }
}

fn document() -> Value {
    json!({
        "cloudflare": {
            "modelX": ["text_to_image"],
            "modelY": ["text_to_image", "image_to_image"]
        },
        "aliyun": { "wanx-v1": ["text_to_image"] }
    })
}

fn create_app() -> Router {
    let capabilities = CapabilityRegistry::from_document(document()).unwrap();
    let mut factories = FactoryRegistry::new();
    factories.register("cloudflare", Arc::new(EchoFactory));

    let state = Arc::new(AppState {
        settings: Arc::new(Settings::default()),
        dispatcher: Arc::new(Dispatcher::new(Arc::new(capabilities), Arc::new(factories))),
    });
    create_router(state)
}

/// Multipart body from text fields and an optional `image` file part
fn multipart_body(fields: &[(&str, &str)], image: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some(image) = image {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"input.png\"\r\nContent-Type: image/png\r\n\r\n",
                BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(image);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn generate_request(fields: &[(&str, &str)], image: Option<&[u8]>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(fields, image)))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_models_returns_document() {
    let response = create_app()
        .oneshot(Request::get("/models").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, document());
}

#[tokio::test]
async fn test_health_reports_unbound_providers() {
    let response = create_app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health: HealthResponse = serde_json::from_value(json_body(response).await).unwrap();
    assert_eq!(health.status, "degraded");
    assert_eq!(health.providers, vec!["cloudflare".to_string()]);
    assert_eq!(health.unavailable, vec!["aliyun".to_string()]);
}

#[tokio::test]
async fn test_generate_text_to_image() {
    let request = generate_request(
        &[
            ("provider", "cloudflare"),
            ("model", "modelX"),
            ("task", "text_to_image"),
            ("prompt", "a cat"),
            ("options", r#"{"seed": 5}"#),
        ],
        None,
    );
    let response = create_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("generated_image.png"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"PNG:modelX:a cat:5");
}

#[tokio::test]
async fn test_generate_image_to_image() {
    let request = generate_request(
        &[
            ("provider", "cloudflare"),
            ("model", "modelY"),
            ("task", "image_to_image"),
            ("prompt", "make it blue"),
        ],
        Some(b"input-bytes"),
    );
    let response = create_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"PNG:input-bytes");
}

#[tokio::test]
async fn test_generate_missing_fields() {
    let request = generate_request(&[("provider", "cloudflare"), ("task", "text_to_image")], None);
    let response = create_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "missing_parameter");
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("model"));
    assert!(message.contains("prompt"));
}

#[tokio::test]
async fn test_generate_image_to_image_without_image() {
    let request = generate_request(
        &[
            ("provider", "cloudflare"),
            ("model", "modelY"),
            ("task", "image_to_image"),
            ("prompt", "make it blue"),
        ],
        Some(b""),
    );
    let response = create_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["kind"], "missing_parameter");
}

#[tokio::test]
async fn test_generate_unsupported_task() {
    let request = generate_request(
        &[
            ("provider", "cloudflare"),
            ("model", "modelX"),
            ("task", "image_to_image"),
            ("prompt", "a cat"),
        ],
        Some(b"input-bytes"),
    );
    let response = create_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["kind"], "unsupported_task");
}

#[tokio::test]
async fn test_generate_invalid_options() {
    let request = generate_request(
        &[
            ("provider", "cloudflare"),
            ("model", "modelX"),
            ("task", "text_to_image"),
            ("prompt", "a cat"),
            ("options", "{not json"),
        ],
        None,
    );
    let response = create_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_generate_provider_without_factory() {
    let request = generate_request(
        &[
            ("provider", "aliyun"),
            ("model", "wanx-v1"),
            ("task", "text_to_image"),
            ("prompt", "a fox"),
        ],
        None,
    );
    let response = create_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["kind"], "provider_not_implemented");
}

#[tokio::test]
async fn test_unknown_route() {
    let response = create_app()
        .oneshot(Request::get("/nonexistent").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
