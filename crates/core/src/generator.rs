//! Text and vision generation boundary.
//!
//! The pipeline never talks to a model server directly. Everything goes
//! through [`Generator`], and the free functions in this module layer the
//! recovery policy on top: a missing model is pulled and the request retried
//! once, and every call races the run's cancellation token.

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("cannot reach model server at {host}: {reason}")]
    Connectivity { host: String, reason: String },

    #[error("model server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("model '{model}' is not available")]
    ModelNotFound { model: String },

    #[error("model '{model}' does not accept image input: {message}")]
    UnsupportedMedia { model: String, message: String },

    #[error("pulling model '{model}' failed: {reason}")]
    PullFailed { model: String, reason: String },

    #[error("request cancelled")]
    Cancelled,
}

/// One progress line reported while a model is being pulled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullProgress {
    pub status: String,
    pub completed: Option<u64>,
    pub total: Option<u64>,
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate_text(&self, model: &str, prompt: &str) -> Result<String, GenerationError>;

    async fn generate_vision(
        &self,
        model: &str,
        prompt: &str,
        images: &[Vec<u8>],
    ) -> Result<String, GenerationError>;

    async fn model_available(&self, model: &str) -> Result<bool, GenerationError>;

    async fn pull_model(
        &self,
        model: &str,
        on_progress: &(dyn Fn(PullProgress) + Send + Sync),
    ) -> Result<(), GenerationError>;
}

/// Races `fut` against the cancellation token.
pub async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, GenerationError>>,
) -> Result<T, GenerationError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GenerationError::Cancelled),
        res = fut => res,
    }
}

/// Makes sure `model` is present on the server, pulling it when it is not.
pub async fn ensure_model(
    generator: &dyn Generator,
    model: &str,
    on_progress: &(dyn Fn(PullProgress) + Send + Sync),
    cancel: &CancellationToken,
) -> Result<(), GenerationError> {
    if cancellable(cancel, generator.model_available(model)).await? {
        return Ok(());
    }

    info!(model, "model not present, pulling");
    cancellable(cancel, generator.pull_model(model, on_progress)).await
}

/// Text generation with a single pull-then-retry when the model is missing.
pub async fn generate_text(
    generator: &dyn Generator,
    model: &str,
    prompt: &str,
    cancel: &CancellationToken,
) -> Result<String, GenerationError> {
    match cancellable(cancel, generator.generate_text(model, prompt)).await {
        Err(GenerationError::ModelNotFound { .. }) => {
            pull_for_retry(generator, model, cancel).await?;
            cancellable(cancel, generator.generate_text(model, prompt)).await
        }
        other => other,
    }
}

/// Vision generation with a single pull-then-retry when the model is missing.
pub async fn generate_vision(
    generator: &dyn Generator,
    model: &str,
    prompt: &str,
    images: &[Vec<u8>],
    cancel: &CancellationToken,
) -> Result<String, GenerationError> {
    match cancellable(cancel, generator.generate_vision(model, prompt, images)).await {
        Err(GenerationError::ModelNotFound { .. }) => {
            pull_for_retry(generator, model, cancel).await?;
            cancellable(cancel, generator.generate_vision(model, prompt, images)).await
        }
        other => other,
    }
}

async fn pull_for_retry(
    generator: &dyn Generator,
    model: &str,
    cancel: &CancellationToken,
) -> Result<(), GenerationError> {
    warn!(model, "model missing on server, pulling before retry");
    cancellable(cancel, generator.pull_model(model, &|_| {})).await
}
