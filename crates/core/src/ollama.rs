//! [`Generator`] backed by an Ollama server.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

use crate::generator::{GenerationError, Generator, PullProgress};

pub const DEFAULT_HOST: &str = "http://localhost:11434";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

pub struct OllamaClient {
    host: String,
    http: Client,
    request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PullLine {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaClient {
    pub fn new(host: impl AsRef<str>) -> Self {
        Self::with_timeout(host, DEFAULT_REQUEST_TIMEOUT)
    }

    /// `request_timeout` bounds generation calls; pulls are not limited.
    pub fn with_timeout(host: impl AsRef<str>, request_timeout: Duration) -> Self {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            host: normalize_host(host.as_ref()),
            http,
            request_timeout,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    fn unreachable(&self, err: reqwest::Error) -> GenerationError {
        GenerationError::Connectivity {
            host: self.host.clone(),
            reason: err.to_string(),
        }
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        images: &[Vec<u8>],
    ) -> Result<String, GenerationError> {
        let mut body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
        });
        if !images.is_empty() {
            let encoded: Vec<String> = images.iter().map(|img| STANDARD.encode(img)).collect();
            body["images"] = serde_json::json!(encoded);
        }

        debug!(model, images = images.len(), prompt_chars = prompt.len(), "generate request");

        let response = self
            .http
            .post(self.url("/api/generate"))
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(classify_failure(
                status.as_u16(),
                message,
                model,
                !images.is_empty(),
            ));
        }

        let parsed: GenerateResponse =
            response.json().await.map_err(|e| GenerationError::Api {
                status: status.as_u16(),
                message: format!("unexpected response body: {e}"),
            })?;

        Ok(parsed.response)
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate_text(&self, model: &str, prompt: &str) -> Result<String, GenerationError> {
        self.generate(model, prompt, &[]).await
    }

    async fn generate_vision(
        &self,
        model: &str,
        prompt: &str,
        images: &[Vec<u8>],
    ) -> Result<String, GenerationError> {
        self.generate(model, prompt, images).await
    }

    async fn model_available(&self, model: &str) -> Result<bool, GenerationError> {
        let response = self
            .http
            .get(self.url("/api/tags"))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        let tags: TagsResponse = response.json().await.map_err(|e| GenerationError::Api {
            status: status.as_u16(),
            message: format!("unexpected tags body: {e}"),
        })?;

        Ok(tags.models.iter().any(|tag| same_model(&tag.name, model)))
    }

    async fn pull_model(
        &self,
        model: &str,
        on_progress: &(dyn Fn(PullProgress) + Send + Sync),
    ) -> Result<(), GenerationError> {
        let pull_failed = |reason: String| GenerationError::PullFailed {
            model: model.to_string(),
            reason,
        };

        let mut response = self
            .http
            .post(self.url("/api/pull"))
            .json(&serde_json::json!({ "model": model, "stream": true }))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        if !response.status().is_success() {
            return Err(pull_failed(error_message(response).await));
        }

        let mut buffer: Vec<u8> = Vec::new();
        let mut succeeded = false;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| pull_failed(e.to_string()))?
        {
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                succeeded |= handle_pull_line(&line, on_progress).map_err(&pull_failed)?;
            }
        }
        if !buffer.is_empty() {
            succeeded |= handle_pull_line(&buffer, on_progress).map_err(&pull_failed)?;
        }

        if succeeded {
            Ok(())
        } else {
            Err(pull_failed("stream ended before the pull completed".into()))
        }
    }
}

/// Returns whether the line reported completion.
fn handle_pull_line(
    line: &[u8],
    on_progress: &(dyn Fn(PullProgress) + Send + Sync),
) -> Result<bool, String> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(false);
    }

    let parsed: PullLine =
        serde_json::from_str(text).map_err(|e| format!("bad progress line '{text}': {e}"))?;
    if let Some(error) = parsed.error {
        return Err(error);
    }

    let status = parsed.status.unwrap_or_default();
    let done = status == "success";
    on_progress(PullProgress {
        status,
        completed: parsed.completed,
        total: parsed.total,
    });
    Ok(done)
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

fn same_model(installed: &str, wanted: &str) -> bool {
    installed == wanted || (!wanted.contains(':') && installed == format!("{wanted}:latest"))
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| status.to_string())
}

fn classify_failure(
    status: u16,
    message: String,
    model: &str,
    had_images: bool,
) -> GenerationError {
    let lower = message.to_lowercase();

    // A bare 404 from a proxy or wrong path must not trigger a pull.
    let names_model = lower.contains("model") || lower.contains(&model.to_lowercase());
    if status == 404 && lower.contains("not found") && names_model {
        return GenerationError::ModelNotFound {
            model: model.to_string(),
        };
    }

    if had_images && (lower.contains("image") || lower.contains("vision")) {
        return GenerationError::UnsupportedMedia {
            model: model.to_string(),
            message,
        };
    }

    GenerationError::Api { status, message }
}
