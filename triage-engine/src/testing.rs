//! Test doubles shared by the engine's unit tests

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use triage_llm::{ChatClient, ChatRequest, LlmError};

use crate::analysis::ProgressReporter;

type Responder = dyn Fn(&ChatRequest) -> Result<String, LlmError> + Send + Sync;

/// Chat client answering from a closure and counting calls
pub struct ScriptedClient {
    responder: Box<Responder>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(
        responder: impl Fn(&ChatRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Holds every call for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn chat(&self, request: ChatRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let answer = (self.responder)(&request);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        answer
    }
}

/// Progress reporter recording every update
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<(usize, usize)>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<(usize, usize)> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, total: usize, processed: usize) {
        self.events.lock().unwrap().push((total, processed));
    }
}
