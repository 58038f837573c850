use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mentii_llm::{GatewayError, GatewayResult, GenerateRequest, ModelGateway};

use super::store::SessionStore;
use crate::chat::{ChatId, Message, MessageId, build_history};

/// Assistant reply recorded when the gateway fails.
pub const FALLBACK_REPLY: &str = "I apologize, but I encountered an error. Please try again.";

/// Request parameters applied to every submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub model_id: String,
    pub preamble: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    /// `None` waits for the gateway indefinitely.
    pub request_timeout: Option<Duration>,
    pub fallback_reply: String,
}

impl OrchestratorConfig {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            preamble: None,
            temperature: None,
            max_tokens: None,
            request_timeout: None,
            fallback_reply: FALLBACK_REPLY.to_string(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn request(&self, history: Vec<mentii_llm::HistoryTurn>, text: &str) -> GenerateRequest {
        let mut request = GenerateRequest::new(self.model_id.clone(), history, text);
        if let Some(preamble) = &self.preamble {
            request = request.with_preamble(preamble.clone());
        }
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }
}

/// Holds the shared `loading` flag high for as long as it lives.
#[derive(Debug)]
struct LoadingGuard {
    flag: Arc<AtomicBool>,
}

impl LoadingGuard {
    /// Returns `None` when another turn already holds the flag.
    fn engage(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// A submission whose user message is recorded and whose reply is outstanding.
pub struct PendingTurn {
    chat_id: ChatId,
    request: GenerateRequest,
    gateway: Arc<dyn ModelGateway>,
    timeout: Option<Duration>,
    loading: LoadingGuard,
}

impl PendingTurn {
    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn request(&self) -> &GenerateRequest {
        &self.request
    }

    /// Runs the gateway call. The store is not borrowed while this is awaited.
    pub async fn resolve(self) -> ResolvedTurn {
        let Self {
            chat_id,
            request,
            gateway,
            timeout,
            loading,
        } = self;

        let call = gateway.generate(request);
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::TimedOut {
                    stage: "resolve-turn",
                    limit,
                }),
            },
            None => call.await,
        };

        ResolvedTurn {
            chat_id,
            result,
            loading,
        }
    }
}

/// Gateway outcome waiting to be committed to the store.
pub struct ResolvedTurn {
    chat_id: ChatId,
    result: GatewayResult<String>,
    loading: LoadingGuard,
}

impl ResolvedTurn {
    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Replied { message_id: MessageId },
    Fallback { message_id: MessageId },
    /// The chat was deleted before the reply arrived.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnReport {
    pub chat_id: ChatId,
    pub outcome: TurnOutcome,
}

/// Drives one submission at a time from text to recorded reply.
pub struct RequestOrchestrator {
    gateway: Arc<dyn ModelGateway>,
    config: OrchestratorConfig,
    input: String,
    loading: Arc<AtomicBool>,
}

impl RequestOrchestrator {
    pub fn new(gateway: Arc<dyn ModelGateway>, config: OrchestratorConfig) -> Self {
        Self {
            gateway,
            config,
            input: String::new(),
            loading: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn set_model(&mut self, model_id: impl Into<String>) {
        self.config.model_id = model_id.into();
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Submits the input buffer.
    pub async fn submit_input(&mut self, store: &mut SessionStore) -> Option<TurnReport> {
        let text = self.input.clone();
        self.submit(store, &text).await
    }

    /// Records `text`, asks the gateway for a reply and records the outcome.
    ///
    /// Returns `None` when the submission is rejected without touching any state.
    pub async fn submit(&mut self, store: &mut SessionStore, text: &str) -> Option<TurnReport> {
        let pending = self.begin(store, text)?;
        let resolved = pending.resolve().await;
        Some(self.complete(store, resolved))
    }

    /// First phase: validates, records the user message and prepares the request.
    pub fn begin(&mut self, store: &mut SessionStore, text: &str) -> Option<PendingTurn> {
        if text.trim().is_empty() {
            return None;
        }

        let Some(loading) = LoadingGuard::engage(&self.loading) else {
            tracing::debug!("ignoring submission while a reply is outstanding");
            return None;
        };

        let active_chat_id = store.active_chat_id().filter(|id| store.contains(*id));
        let chat_id = match active_chat_id {
            Some(chat_id) => chat_id,
            None => store.create_chat(),
        };

        // History is taken before the new message lands; it travels as the current turn.
        let history = store.get_chat(chat_id).map(build_history).unwrap_or_default();

        let message_id = store.ids().message_id();
        store.append_message(chat_id, Message::user(message_id, text));

        self.input.clear();

        tracing::debug!(
            chat_id = %chat_id,
            message_id = %message_id,
            history_len = history.len(),
            "submitting turn"
        );

        Some(PendingTurn {
            chat_id,
            request: self.config.request(history, text),
            gateway: self.gateway.clone(),
            timeout: self.config.request_timeout,
            loading,
        })
    }

    /// Second phase: records the reply, or the fallback when the gateway failed.
    pub fn complete(&self, store: &mut SessionStore, resolved: ResolvedTurn) -> TurnReport {
        let ResolvedTurn {
            chat_id,
            result,
            loading,
        } = resolved;

        let outcome = if !store.contains(chat_id) {
            tracing::warn!(chat_id = %chat_id, "discarding reply for a deleted chat");
            TurnOutcome::Discarded
        } else {
            let message_id = store.ids().message_id();
            match result {
                Ok(text) => {
                    store.append_message(chat_id, Message::assistant(message_id, text));
                    TurnOutcome::Replied { message_id }
                }
                Err(error) => {
                    tracing::error!(
                        chat_id = %chat_id,
                        gateway = self.gateway.id(),
                        error = %error,
                        "model gateway failed; recording fallback reply"
                    );
                    store.append_message(
                        chat_id,
                        Message::assistant(message_id, self.config.fallback_reply.clone()),
                    );
                    TurnOutcome::Fallback { message_id }
                }
            }
        };

        drop(loading);
        TurnReport { chat_id, outcome }
    }
}
