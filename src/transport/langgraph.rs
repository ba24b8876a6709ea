//! LangGraph HTTP + SSE transport
//!
//! One thread per session, created lazily. Each submission or resume is a
//! streamed run on that thread.

use super::{EventSink, Transport, TransportEvent};
use crate::protocol::{error_detail, run_body, RunInput, SseDecoder, SseFrame, StreamFrame};
use crate::{Result, TimebookError};
use futures::future::BoxFuture;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_DETAIL: usize = 500;

#[derive(Debug, Default)]
struct ThreadState {
    thread_id: Option<String>,
    run_id: Option<String>,
}

#[derive(Clone)]
pub struct LangGraphTransport {
    http: Client,
    api_url: String,
    assistant_id: String,
    request_timeout: Duration,
    state: Arc<Mutex<ThreadState>>,
}

#[derive(Debug, PartialEq)]
enum Flow {
    Continue,
    Stop,
}

impl LangGraphTransport {
    /// Streams are long-lived, so only connection setup and the short
    /// control requests are bounded.
    pub fn new(
        api_url: impl Into<String>,
        assistant_id: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("timebook/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            assistant_id: assistant_id.into(),
            request_timeout,
            state: Arc::new(Mutex::new(ThreadState::default())),
        }
    }

    pub fn from_config(config: &crate::TimebookConfig) -> Self {
        Self::new(&config.api_url, &config.assistant_id, config.request_timeout)
    }

    /// Thread id of this session, once created
    pub async fn thread_id(&self) -> Option<String> {
        self.state.lock().await.thread_id.clone()
    }

    async fn ensure_thread(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        if let Some(id) = &state.thread_id {
            return Ok(id.clone());
        }

        let url = format!("{}/threads", self.api_url);
        let response = self
            .http
            .post(&url)
            .timeout(self.request_timeout)
            .json(&json!({}))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_response_status(response).await?;
        let body: Value = response.json().await.map_err(map_reqwest_error)?;
        let id = body
            .get("thread_id")
            .and_then(Value::as_str)
            .ok_or_else(|| TimebookError::Protocol("thread response has no thread_id".into()))?
            .to_string();

        info!("Created thread {}", id);
        state.thread_id = Some(id.clone());
        Ok(id)
    }

    async fn run_stream(&self, input: RunInput, sink: EventSink) -> Result<()> {
        let thread_id = self.ensure_thread().await?;
        // An aborted run never reaches the reset below
        self.state.lock().await.run_id = None;
        let url = format!("{}/threads/{}/runs/stream", self.api_url, thread_id);
        let body = run_body(&self.assistant_id, &input);
        debug!("Starting run {} on thread {}", sink.run(), thread_id);

        let response = self
            .http
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_response_status(response).await?;
        if !sink.emit(TransportEvent::Opened).await {
            return Ok(());
        }

        let result = self.pump(response, &sink).await;
        self.state.lock().await.run_id = None;
        result
    }

    async fn pump(&self, response: reqwest::Response, sink: &EventSink) -> Result<()> {
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| TimebookError::Transport(format!("stream error: {e}")))?;
            for frame in decoder.push_bytes(&bytes) {
                if self.handle_frame(&frame, sink).await? == Flow::Stop {
                    return Ok(());
                }
            }
        }
        if let Some(frame) = decoder.finish() {
            self.handle_frame(&frame, sink).await?;
        }
        Ok(())
    }

    async fn handle_frame(&self, frame: &SseFrame, sink: &EventSink) -> Result<Flow> {
        let delivered = match StreamFrame::decode(frame)? {
            StreamFrame::Metadata { run_id } => {
                debug!("Run {} is server run {:?}", sink.run(), run_id);
                self.state.lock().await.run_id = run_id;
                true
            }
            StreamFrame::Values {
                messages,
                interrupt,
            } => {
                let mut delivered = true;
                if let Some(messages) = messages {
                    delivered = sink.emit(TransportEvent::Messages(messages)).await;
                }
                delivered && sink.emit(TransportEvent::Interrupt(interrupt)).await
            }
            StreamFrame::Updates {
                interrupt: Some(interrupt),
            } => sink.emit(TransportEvent::Interrupt(Some(interrupt))).await,
            StreamFrame::Updates { interrupt: None } => true,
            StreamFrame::Error(message) => return Err(TimebookError::Protocol(message)),
            StreamFrame::End => return Ok(Flow::Stop),
            StreamFrame::Other(event) => {
                debug!("Ignoring {} frame", event);
                true
            }
        };
        Ok(if delivered { Flow::Continue } else { Flow::Stop })
    }

    async fn cancel_run(&self) -> Result<()> {
        let (thread_id, run_id) = {
            let state = self.state.lock().await;
            (state.thread_id.clone(), state.run_id.clone())
        };
        let (Some(thread_id), Some(run_id)) = (thread_id, run_id) else {
            debug!("No server run to cancel");
            return Ok(());
        };

        let url = format!("{}/threads/{}/runs/{}/cancel", self.api_url, thread_id, run_id);
        let response = self
            .http
            .post(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_response_status(response).await?;
        info!("Cancelled run {}", run_id);
        Ok(())
    }
}

impl Transport for LangGraphTransport {
    fn run(&self, input: RunInput, sink: EventSink) -> BoxFuture<'static, Result<()>> {
        let this = self.clone();
        Box::pin(async move { this.run_stream(input, sink).await })
    }

    fn cancel(&self) -> BoxFuture<'static, Result<()>> {
        let this = self.clone();
        Box::pin(async move {
            let result = this.cancel_run().await;
            if let Err(e) = &result {
                warn!("Cancel failed: {}", e);
            }
            result
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TimebookError {
    if e.is_timeout() {
        TimebookError::Transport(format!("timeout: {e}"))
    } else if e.is_connect() {
        TimebookError::Transport(format!("network: {e}"))
    } else {
        TimebookError::Transport(e.to_string())
    }
}

async fn check_response_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = extract_error_detail(&body);
    if detail.is_empty() {
        return Err(TimebookError::Transport(format!("API error {status}")));
    }
    Err(TimebookError::Transport(format!("API error {status}: {detail}")))
}

fn extract_error_detail(body: &str) -> String {
    let trimmed = body.trim();
    let detail = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => error_detail(&value),
        Err(_) => trimmed.to_string(),
    };
    truncate(&detail, MAX_ERROR_DETAIL)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
