use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use reqwest_eventsource::EventSource;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::message::ChatMessage;
use crate::provider::ProviderConfig;
use crate::request::build_request;
use crate::state::ResponseState;
use crate::stream::drive_stream;

/// Streaming chat client. One instance owns one request at a time; the
/// observable state resets between requests.
///
/// Must be used inside a Tokio runtime: `send_message` spawns the stream
/// reader as a task.
pub struct LlmClient {
    http: reqwest::Client,
    system_prompt: Option<String>,
    state_tx: watch::Sender<ResponseState>,
    state_rx: watch::Receiver<ResponseState>,
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClient {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(ResponseState::Idle);
        Self {
            http: reqwest::Client::new(),
            system_prompt: None,
            state_tx,
            state_rx,
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// System message prepended to every request.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
    }

    /// Observable state stream; receivers replay the latest value.
    pub fn response_state(&self) -> watch::Receiver<ResponseState> {
        self.state_rx.clone()
    }

    pub fn current_state(&self) -> ResponseState {
        self.state_rx.borrow().clone()
    }

    /// Begin a streaming request. Valid only while the state is Idle or
    /// terminal; `context` is the prior conversation in order.
    pub fn send_message(
        &mut self,
        message: ChatMessage,
        context: &[ChatMessage],
        provider: &ProviderConfig,
    ) -> Result<()> {
        if !provider.is_usable() {
            bail!("provider {} is not configured", provider.kind.as_str());
        }
        if !self.current_state().accepts_new_request() {
            bail!("a request is already in flight");
        }

        let prepared = build_request(provider, self.system_prompt.as_deref(), context, &message);
        let mut request = self.http.post(&prepared.url).json(&prepared.body);
        for (name, value) in &prepared.headers {
            request = request.header(*name, value.as_str());
        }
        let events = EventSource::new(request)
            .map_err(|err| anyhow!("failed to open event stream: {err}"))?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.state_tx.send(ResponseState::Loading);

        let tx = self.state_tx.clone();
        let gen_guard = Arc::clone(&self.generation);
        let kind = provider.kind;
        self.task = Some(tokio::spawn(async move {
            // Emissions from a cancelled request are discarded.
            let mut emit = |state: ResponseState| {
                if gen_guard.load(Ordering::SeqCst) == generation {
                    let _ = tx.send(state);
                }
            };
            drive_stream(kind, events, &mut emit).await;
        }));
        Ok(())
    }

    /// Close the in-flight stream and reset to Idle without a terminal
    /// event. Late callbacks from the closed stream are dropped.
    pub fn cancel_request(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let _ = self.state_tx.send(ResponseState::Idle);
    }

    /// Wait until the current request reaches Success or Error. Returns
    /// Idle immediately when no request is running.
    pub async fn await_terminal(&self) -> ResponseState {
        let mut rx = self.state_rx.clone();
        loop {
            let state = rx.borrow_and_update().clone();
            if state.is_terminal() || state == ResponseState::Idle {
                return state;
            }
            if rx.changed().await.is_err() {
                return self.current_state();
            }
        }
    }
}

impl Drop for LlmClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
