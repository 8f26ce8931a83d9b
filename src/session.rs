use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::HeaderValue;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::error::ChatError;
use crate::protocol::{event_stream, StreamEvent};
use crate::request::{chat_completion_body, ChatTurn, GenerationRequest};
use crate::tool::{ToolCallAccumulator, ToolExecutor};

/// Event delivered on the session's output channel.
///
/// Text deltas arrive in model order; exactly one terminal variant
/// (`Completed`, `Cancelled`, or `Failed`) ends the sequence, after which
/// the channel closes. Cancellation is a clean terminal, never an error.
#[derive(Debug)]
pub enum ChatEvent {
    TextDelta(String),
    Completed,
    Cancelled,
    Failed(ChatError),
}

/// HTTP client configuration for a chat session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Total request timeout in seconds; 0 disables it (streams may run
    /// arbitrarily long).
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 0,
            connect_timeout_secs: 5,
            pool_max_idle_per_host: 16,
        }
    }
}

/// A chat session: owns the HTTP client, the tool-result cache, and the
/// cancellation gate. Cheap to clone; all clones share the same session
/// state, so at most one generation is in flight per session.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    client: reqwest::Client,
    executor: ToolExecutor,
    /// Current cancellation controller; replaced on every new generation.
    cancel: Mutex<Option<watch::Sender<bool>>>,
}

enum TurnOutcome {
    /// Message ended; accumulated tool calls decide whether the loop
    /// continues.
    MessageEnd,
    Completed,
    Cancelled,
    /// The consumer dropped the output channel; stop silently.
    ConsumerGone,
    Failed(ChatError),
}

impl ChatSession {
    /// Create a session with its own connection pool and tool cache.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] when the HTTP client cannot be built.
    pub fn new(config: &SessionConfig) -> Result<Self, ChatError> {
        let client = build_client(config)?;
        Ok(Self {
            inner: Arc::new(SessionInner {
                client,
                executor: ToolExecutor::new(),
                cancel: Mutex::new(None),
            }),
        })
    }

    /// Start a generation for the given request and message history.
    ///
    /// Single-flight: any generation still in progress on this session is
    /// cancelled first (its channel receives `Cancelled`), then a fresh
    /// cancellation controller is installed and the conversation task is
    /// spawned. The returned channel yields text deltas as the model
    /// produces them and closes after one terminal event.
    pub fn generate_response(
        &self,
        request: GenerationRequest,
        history: Vec<ChatTurn>,
    ) -> mpsc::Receiver<ChatEvent> {
        self.stop_stream();

        let (cancel_tx, cancel_rx) = watch::channel(false);
        *self.inner.cancel.lock() = Some(cancel_tx);

        let (tx, rx) = mpsc::channel(64);
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.run_conversation(request, history, cancel_rx, tx).await;
        });
        rx
    }

    /// Cancel the in-flight generation, if any. Idempotent.
    pub fn stop_stream(&self) {
        if let Some(cancel) = self.inner.cancel.lock().take() {
            let _ = cancel.send(true);
        }
    }
}

impl SessionInner {
    async fn run_conversation(
        &self,
        request: GenerationRequest,
        history: Vec<ChatTurn>,
        mut cancelled: watch::Receiver<bool>,
        tx: mpsc::Sender<ChatEvent>,
    ) {
        let request_id = uuid::Uuid::new_v4();

        let url = match url::Url::parse(&request.api_url) {
            Ok(url) => url,
            Err(err) => {
                let _ = tx
                    .send(ChatEvent::Failed(ChatError::InvalidRequest(format!(
                        "Invalid endpoint URL: {err}"
                    ))))
                    .await;
                return;
            }
        };
        let mut auth = match HeaderValue::from_str(&format!("Bearer {}", request.api_key)) {
            Ok(value) => value,
            Err(_) => {
                let _ = tx
                    .send(ChatEvent::Failed(ChatError::InvalidRequest(
                        "API key is not a valid header value".to_string(),
                    )))
                    .await;
                return;
            }
        };
        auth.set_sensitive(true);
        let mut headers = http::HeaderMap::with_capacity(2);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, auth);

        let mut messages: Vec<ChatTurn> = Vec::with_capacity(history.len() + 1);
        if !request.system_prompt.is_empty() {
            messages.push(ChatTurn::system(request.system_prompt.clone()));
        }
        messages.extend(history);

        // Documents ride only on the initial turn; continuations after tool
        // dispatch reuse model and tools with the extended history.
        let mut first_turn = true;
        loop {
            let body = match chat_completion_body(&request, &messages, first_turn) {
                Ok(body) => body,
                Err(err) => {
                    let _ = tx.send(ChatEvent::Failed(err)).await;
                    return;
                }
            };
            tracing::debug!(
                request_id = %request_id,
                model = %request.model,
                messages = messages.len(),
                "issuing generation request"
            );

            let send = self
                .client
                .post(url.as_str())
                .headers(headers.clone())
                .body(body)
                .send();
            let response = tokio::select! {
                _ = cancelled.changed() => {
                    let _ = tx.send(ChatEvent::Cancelled).await;
                    return;
                }
                result = send => match result {
                    Ok(response) => response,
                    Err(err) => {
                        let _ = tx
                            .send(ChatEvent::Failed(ChatError::Transport(err.to_string())))
                            .await;
                        return;
                    }
                },
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(
                    request_id = %request_id,
                    status = status.as_u16(),
                    "generation request rejected"
                );
                let _ = tx
                    .send(ChatEvent::Failed(ChatError::Upstream {
                        status: status.as_u16(),
                        body,
                    }))
                    .await;
                return;
            }

            let mut accumulator = ToolCallAccumulator::new();
            match self
                .drive_stream(response, &mut accumulator, &tx, &mut cancelled)
                .await
            {
                TurnOutcome::Cancelled => {
                    let _ = tx.send(ChatEvent::Cancelled).await;
                    return;
                }
                TurnOutcome::ConsumerGone => return,
                TurnOutcome::Failed(err) => {
                    let _ = tx.send(ChatEvent::Failed(err)).await;
                    return;
                }
                TurnOutcome::Completed => {
                    let _ = tx.send(ChatEvent::Completed).await;
                    return;
                }
                TurnOutcome::MessageEnd => {
                    let calls = accumulator.into_calls();
                    if calls.is_empty() {
                        let _ = tx.send(ChatEvent::Completed).await;
                        return;
                    }
                    tracing::debug!(
                        request_id = %request_id,
                        tool_calls = calls.len(),
                        "dispatching tool calls"
                    );
                    let results = self.executor.execute(&calls, &request.tools).await;
                    messages.push(ChatTurn::assistant_tool_calls(&calls));
                    messages.extend(results);
                    first_turn = false;
                }
            }
        }
    }

    /// Consume one response stream, forwarding text and accumulating tool
    /// fragments until a terminal event, cancellation, end-of-data, or a
    /// transport error. The response body is dropped on every exit path.
    async fn drive_stream(
        &self,
        response: reqwest::Response,
        accumulator: &mut ToolCallAccumulator,
        tx: &mpsc::Sender<ChatEvent>,
        cancelled: &mut watch::Receiver<bool>,
    ) -> TurnOutcome {
        let mut events = std::pin::pin!(event_stream(response.bytes_stream()));
        loop {
            tokio::select! {
                _ = cancelled.changed() => return TurnOutcome::Cancelled,
                next = events.next() => match next {
                    None => return TurnOutcome::Completed,
                    Some(Err(err)) => return TurnOutcome::Failed(err),
                    Some(Ok(StreamEvent::TextDelta(text))) => {
                        if tx.send(ChatEvent::TextDelta(text)).await.is_err() {
                            return TurnOutcome::ConsumerGone;
                        }
                    }
                    Some(Ok(StreamEvent::ToolCallStart { index, id, name, arguments })) => {
                        accumulator.start(index, id, name, arguments);
                    }
                    Some(Ok(StreamEvent::ToolCallDelta { index, arguments })) => {
                        accumulator.append(index, &arguments);
                    }
                    Some(Ok(StreamEvent::MessageEnd { .. })) => return TurnOutcome::MessageEnd,
                    Some(Ok(StreamEvent::StreamEnd)) => return TurnOutcome::Completed,
                },
            }
        }
    }
}

fn build_client(config: &SessionConfig) -> Result<reqwest::Client, ChatError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(reqwest::redirect::Policy::none());
    if config.request_timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
    }
    builder
        .build()
        .map_err(|err| ChatError::Config(format!("Failed to build HTTP client: {err}")))
}
