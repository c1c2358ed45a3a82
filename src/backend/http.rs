//! HTTP plumbing shared by the provider adapters

use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Response,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error};

use crate::error::{AppError, Result};

/// Build the client shared by every provider instance of one factory
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// JSON content type plus a bearer token
pub fn bearer_headers(token: &SecretString) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(|_| AppError::Internal("API token is not a valid header value".to_string()))?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);

    Ok(headers)
}

/// Turn a non-success response into [`AppError::BackendError`]
pub async fn ensure_success(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!(provider = %provider, status = %status, "Backend returned an error");

    Err(AppError::BackendError {
        status: status.as_u16(),
        body,
    })
}

/// Parse a successful response body as JSON
pub async fn read_json(provider: &str, response: Response) -> Result<Value> {
    response.json::<Value>().await.map_err(|e| {
        error!(provider = %provider, error = %e, "Failed to parse backend response");
        AppError::MalformedResponse(format!("response body is not valid JSON: {}", e.without_url()))
    })
}

/// Download a generated image from the URL a backend handed back
pub async fn fetch_image(client: &Client, provider: &str, url: &str) -> Result<Vec<u8>> {
    debug!(provider = %provider, "Downloading generated image");

    let response = client.get(url).send().await?;
    let response = ensure_success(provider, response).await?;
    let bytes = response.bytes().await?;

    Ok(bytes.to_vec())
}

/// Copy every key the adapter did not consume into `target`
pub fn pass_through(target: &mut Map<String, Value>, rest: Map<String, Value>) {
    for (key, value) in rest {
        target.entry(key).or_insert(value);
    }
}
