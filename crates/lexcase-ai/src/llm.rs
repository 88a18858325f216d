//! LLM completion boundary.
//!
//! One request type carries an explicit [`ResponseMode`]. Streaming forwards
//! visible text to a [`ChunkSink`] as it arrives; both modes return the full
//! sanitized completion, so callers never branch on the mode.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";
pub const DEFAULT_MODEL: &str = "nvidia/llama-3.3-nemotron-super-49b-v1.5";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend returned HTTP {status}: {body}")]
    Server { status: u16, body: String },

    #[error("could not decode backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Only timeouts are worth repeating verbatim.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Streaming,
    #[default]
    Buffered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub mode: ResponseMode,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            temperature: 0.35,
            max_tokens: 1700,
            mode: ResponseMode::Buffered,
        }
    }
}

/// Receives visible completion text while a streaming call is in flight.
pub trait ChunkSink: Send + Sync {
    fn on_chunk(&self, chunk: &str);

    /// Called once after the last chunk of a streaming call.
    fn on_finish(&self) {}
}

/// Discards every chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ChunkSink for NullSink {
    fn on_chunk(&self, _chunk: &str) {}
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Model identifier, for logs and result metadata.
    fn model(&self) -> &str;

    /// Run one completion and return its sanitized text.
    async fn complete(
        &self,
        request: &CompletionRequest,
        sink: &dyn ChunkSink,
    ) -> Result<String, BackendError>;
}

static THINK_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<think>.*?</think>")
        .unwrap_or_else(|e| panic!("think pattern does not compile: {e}"))
});

/// Remove `<think>…</think>` reasoning blocks and surrounding whitespace.
pub fn sanitize_output(text: &str) -> String {
    THINK_BLOCK.replace_all(text, "").trim().to_string()
}

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Incremental counterpart of [`sanitize_output`] for streamed chunks.
///
/// Tags may arrive split across chunks, so a trailing partial tag is held
/// back until the next chunk decides it.
#[derive(Debug, Default)]
struct ThinkFilter {
    pending: String,
    inside: bool,
}

impl ThinkFilter {
    fn push(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        let mut visible = String::new();
        loop {
            let lower = self.pending.to_ascii_lowercase();
            let tag = if self.inside { THINK_CLOSE } else { THINK_OPEN };
            if let Some(at) = lower.find(tag) {
                if !self.inside {
                    visible.push_str(&self.pending[..at]);
                }
                self.pending.drain(..at + tag.len());
                self.inside = !self.inside;
                continue;
            }
            let keep = partial_tag_len(&lower, tag);
            let cut = self.pending.len() - keep;
            if !self.inside {
                visible.push_str(&self.pending[..cut]);
            }
            self.pending.drain(..cut);
            return visible;
        }
    }

    fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        if self.inside { String::new() } else { rest }
    }
}

/// Length of the longest proper prefix of `tag` that `text` ends with.
fn partial_tag_len(text: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&n| text.ends_with(&tag[..n]))
        .unwrap_or(0)
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Done,
}

/// Parse one server-sent-events line of a streamed chat completion.
///
/// Comments, blank lines and chunks without content yield `None`.
fn parse_sse_line(line: &str) -> Result<Option<SseEvent>, BackendError> {
    let Some(payload) = line.trim_end_matches('\r').strip_prefix("data:") else {
        return Ok(None);
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }
    let chunk: StreamChunk =
        serde_json::from_str(payload).map_err(|e| BackendError::Decode(e.to_string()))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty())
        .map(SseEvent::Delta))
}

// ── OpenAI-compatible wire types ──

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    frequency_penalty: f32,
    presence_penalty: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: ChatContent,
}

#[derive(Deserialize, Default)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint, such as the
/// NVIDIA inference API.
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
    top_p: f32,
    penalty: f32,
}

impl ChatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, BackendError> {
        Self::with_timeout(base_url, api_key, model, DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            timeout_secs,
            top_p: 0.95,
            penalty: 0.2,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn map_err(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout {
                secs: self.timeout_secs,
            }
        } else if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Unavailable(e.to_string())
        }
    }

    async fn send(&self, request: &CompletionRequest) -> Result<reqwest::Response, BackendError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BackendError::Unavailable("no API key configured (NVIDIA_API_KEY)".into()))?;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            top_p: self.top_p,
            max_tokens: request.max_tokens,
            frequency_penalty: self.penalty,
            presence_penalty: self.penalty,
            stream: request.mode == ResponseMode::Streaming,
        };

        info!(
            model = %self.model,
            mode = ?request.mode,
            prompt_len = request.prompt.len(),
            "calling chat completions"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "chat completions returned an error");
            return Err(BackendError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn read_stream(
        &self,
        response: reqwest::Response,
        sink: &dyn ChunkSink,
    ) -> Result<String, BackendError> {
        let mut stream = response.bytes_stream();
        let mut line_buf: Vec<u8> = Vec::new();
        let mut text = String::new();
        let mut filter = ThinkFilter::default();

        let mut handle_line = |line: &[u8], text: &mut String| -> Result<bool, BackendError> {
            let line = std::str::from_utf8(line).map_err(|e| BackendError::Decode(e.to_string()))?;
            match parse_sse_line(line)? {
                Some(SseEvent::Delta(delta)) => {
                    text.push_str(&delta);
                    let visible = filter.push(&delta);
                    if !visible.is_empty() {
                        sink.on_chunk(&visible);
                    }
                    Ok(false)
                }
                Some(SseEvent::Done) => Ok(true),
                None => Ok(false),
            }
        };

        'read: while let Some(bytes) = stream.next().await {
            let bytes = bytes.map_err(|e| self.map_err(e))?;
            line_buf.extend_from_slice(&bytes);
            while let Some(pos) = line_buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = line_buf.drain(..=pos).collect();
                if handle_line(&line[..pos], &mut text)? {
                    break 'read;
                }
            }
        }
        if !line_buf.is_empty() {
            handle_line(&line_buf, &mut text)?;
        }
        drop(handle_line);

        let tail = filter.finish();
        if !tail.is_empty() {
            sink.on_chunk(&tail);
        }
        sink.on_finish();
        Ok(sanitize_output(&text))
    }
}

#[async_trait]
impl CompletionBackend for ChatClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        sink: &dyn ChunkSink,
    ) -> Result<String, BackendError> {
        let response = self.send(request).await?;
        let text = match request.mode {
            ResponseMode::Streaming => self.read_stream(response, sink).await?,
            ResponseMode::Buffered => {
                let parsed: ChatResponse = response.json().await.map_err(|e| self.map_err(e))?;
                let content = parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .ok_or_else(|| BackendError::Decode("response has no message content".into()))?;
                sanitize_output(&content)
            }
        };
        debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}
