//! Scripted model double for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::{CompletionRequest, LanguageModel};

type Responder = Box<dyn Fn(&str) -> Result<String, LlmError> + Send + Sync>;

pub struct ScriptedModel {
    responder: Responder,
    queue: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedModel {
    /// Answer every prompt with `respond(prompt)`.
    pub fn new(respond: impl Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(respond),
            queue: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn always(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Return queued responses in order, then fail.
    pub fn sequence(responses: Vec<Result<String, LlmError>>) -> Self {
        let model = Self::new(|_| Err(LlmError::Other("script exhausted".into())));
        *model.queue.lock().unwrap() = responses.into();
        model
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let queued = self.queue.lock().unwrap().pop_front();
        match queued {
            Some(response) => response,
            None => (self.responder)(&request.prompt),
        }
    }
}
