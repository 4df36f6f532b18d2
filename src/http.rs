//! Shared HTTP plumbing for the hosted-service clients.

use std::time::Duration;

use carebot_core::error::{Error, Result};
use reqwest::{Client, Response};

/// Build the single HTTP client shared by every service client.
pub fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::remote("http", e))
}

/// Pass a successful response through; turn anything else into a
/// [`Error::RemoteService`] carrying the status and response body.
pub async fn check_status(service: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::remote(
        service,
        format!("HTTP {}: {}", status, body.trim()),
    ))
}

/// Decode a JSON response body.
pub async fn json_body(service: &str, response: Response) -> Result<serde_json::Value> {
    let response = check_status(service, response).await?;
    response
        .json()
        .await
        .map_err(|e| Error::remote(service, format!("invalid JSON response: {}", e)))
}

/// Join a base URL and a path without doubling the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
