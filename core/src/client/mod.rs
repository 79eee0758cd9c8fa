//! Stateless HTTP request builder and response parser for the lost-pets API.
//!
//! # Design
//! `PetsClient` holds only a `base_url` and carries no mutable state between
//! calls. Each REST operation is split into a `build_*` method that produces
//! an `HttpRequest` and a `parse_*` method that consumes an `HttpResponse`.
//! The operations are grouped by resource in the submodules; the shared
//! plumbing (JSON bodies, status checks, error messages) lives here.
//!
//! Requests built here never carry an `Authorization` header. Attaching the
//! session token is the job of [`Api`](crate::api::Api).

mod auth;
mod comments;
mod listings;
mod users;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use listings::search_query;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, RequestBody};

/// Synchronous, stateless client for the lost-pets API.
#[derive(Debug, Clone)]
pub struct PetsClient {
    base_url: String,
}

impl PetsClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn bare(&self, method: HttpMethod, path: &str) -> HttpRequest {
        HttpRequest {
            method,
            path: self.url(path),
            headers: Vec::new(),
            body: None,
        }
    }

    fn json<T: Serialize>(&self, method: HttpMethod, path: &str, input: &T) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(input).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(HttpRequest {
            method,
            path: self.url(path),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(RequestBody::Json(body)),
        })
    }
}

/// Check for a 2xx status and decode the body as `T`.
fn parse_json<T: DeserializeOwned>(response: HttpResponse) -> Result<T, ApiError> {
    check_status(&response)?;
    serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
}

/// Check for a 2xx status and ignore the body.
fn parse_empty(response: HttpResponse) -> Result<(), ApiError> {
    check_status(&response)
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::from_status(response.status, error_message(&response.body)))
}

/// Extract the human-readable message from an error body. The API answers
/// with `{"message": ...}`; some middleware uses `{"error": ...}`; plain-text
/// bodies are passed through.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["message", "error"] {
            if let Some(text) = value.get(field).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
        if value.is_object() {
            return String::new();
        }
    }
    body.trim().to_string()
}
