//! Scripted [`Generator`] used by unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::generator::{GenerationError, Generator, PullProgress};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Text,
    Vision,
    Available,
    Pull,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub kind: CallKind,
    pub model: String,
    pub prompt: String,
    pub image_count: usize,
    /// How many calls of the same kind came before this one.
    pub attempt: usize,
}

type Responder = Box<dyn Fn(&Call) -> Result<String, GenerationError> + Send + Sync>;

pub struct ScriptedGenerator {
    respond: Responder,
    available: bool,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedGenerator {
    pub fn new(
        respond: impl Fn(&Call) -> Result<String, GenerationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            available: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls().iter().filter(|c| c.kind == kind).count()
    }

    pub fn prompts(&self, kind: CallKind) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.prompt)
            .collect()
    }

    fn record(&self, kind: CallKind, model: &str, prompt: &str, image_count: usize) -> Call {
        let mut calls = self.calls.lock().unwrap();
        let attempt = calls.iter().filter(|c| c.kind == kind).count();
        let call = Call {
            kind,
            model: model.to_string(),
            prompt: prompt.to_string(),
            image_count,
            attempt,
        };
        calls.push(call.clone());
        call
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate_text(&self, model: &str, prompt: &str) -> Result<String, GenerationError> {
        let call = self.record(CallKind::Text, model, prompt, 0);
        (self.respond)(&call)
    }

    async fn generate_vision(
        &self,
        model: &str,
        prompt: &str,
        images: &[Vec<u8>],
    ) -> Result<String, GenerationError> {
        let call = self.record(CallKind::Vision, model, prompt, images.len());
        (self.respond)(&call)
    }

    async fn model_available(&self, model: &str) -> Result<bool, GenerationError> {
        self.record(CallKind::Available, model, "", 0);
        Ok(self.available)
    }

    async fn pull_model(
        &self,
        model: &str,
        on_progress: &(dyn Fn(PullProgress) + Send + Sync),
    ) -> Result<(), GenerationError> {
        self.record(CallKind::Pull, model, "", 0);
        on_progress(PullProgress {
            status: "success".to_string(),
            ..Default::default()
        });
        Ok(())
    }
}
