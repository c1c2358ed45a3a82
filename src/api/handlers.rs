//! HTTP request handlers

use crate::api::models::{GenerateForm, HealthResponse};
use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{multipart::Field, Multipart, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Generate an image from a multipart form
pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let span = info_span!("generate", request_id = %Uuid::new_v4());

    async move {
        let form = read_form(multipart).await?;
        info!(
            provider = form.provider.as_deref().unwrap_or_default(),
            model = form.model.as_deref().unwrap_or_default(),
            task = form.task.as_deref().unwrap_or_default(),
            has_image = form.image.is_some(),
            "Received image generation request"
        );

        let image = state.dispatcher.handle_generate(form.into_request()?).await?;

        Ok((
            [
                (CONTENT_TYPE, "image/png"),
                (
                    CONTENT_DISPOSITION,
                    "attachment; filename=\"generated_image.png\"",
                ),
            ],
            image,
        )
            .into_response())
    }
    .instrument(span)
    .await
}

async fn read_form(mut multipart: Multipart) -> Result<GenerateForm, AppError> {
    let mut form = GenerateForm::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "image" {
            form.image = read_image(field).await?;
        } else {
            let value = field.text().await.map_err(bad_form)?;
            form.set_text(&name, value);
        }
    }

    Ok(form)
}

/// An image part with no filename or no content counts as absent
async fn read_image(field: Field<'_>) -> Result<Option<Vec<u8>>, AppError> {
    let has_filename = field.file_name().map_or(false, |name| !name.is_empty());
    let data = field.bytes().await.map_err(bad_form)?;

    Ok((has_filename && !data.is_empty()).then(|| data.to_vec()))
}

fn bad_form(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::MissingParameter(format!("could not read form data: {}", err))
}

/// Capability document, unmodified
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.dispatcher.capabilities().document().clone())
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let factories = state.dispatcher.factories();
    let unavailable = factories.missing_for(state.dispatcher.capabilities());

    Json(HealthResponse {
        status: if unavailable.is_empty() { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        providers: factories.providers(),
        unavailable,
    })
}
