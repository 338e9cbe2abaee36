//! Reqwest-based LLM client implementing OpenAI-compatible Chat Completions streaming.

use std::pin::Pin;

use anyhow::{Context, Result};
use async_stream::try_stream;
use futures_core::Stream;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::Config;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// Non-success HTTP status from the chat endpoint. Carried inside `anyhow::Error`
/// so callers can downcast and tell rate limiting apart from other failures.
#[derive(Debug, Clone)]
pub struct HttpStatusError {
    pub status: u16,
    pub body: String,
}

impl std::fmt::Display for HttpStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LLM error: {} {}", self.status, self.body)
    }
}

impl std::error::Error for HttpStatusError {}

#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = normalize_base_url(
            &cfg.get("API_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".into()),
        );
        let api_key = cfg.api_key();

        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()?;

        Ok(Self { http, base_url, api_key })
    }

    pub fn chat_stream(
        &self,
        messages: Vec<ChatMessage>,
        opts: ChatOptions,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>> {
        let http = self.http.clone();
        let base_url = self.base_url.clone();
        let api_key = self.api_key.clone();

        Box::pin(try_stream! {
            let url = format!("{}/chat/completions", base_url);

            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("text/event-stream"));
            if let Some(key) = api_key.clone() {
                let hv = HeaderValue::from_str(&format!("Bearer {}", key))?;
                headers.insert(AUTHORIZATION, hv);
            }

            let mut body = serde_json::json!({
                "model": opts.model,
                "temperature": opts.temperature,
                "messages": messages,
                "stream": true,
            });
            if let Some(max) = opts.max_tokens {
                body["max_tokens"] = serde_json::json!(max);
            }

            let resp = http
                .post(url)
                .headers(headers)
                .json(&body)
                .send()
                .await
                .context("failed to send chat request")?;

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                Err(anyhow::Error::new(HttpStatusError { status, body }))?;
                return;
            }

            let mut lines = LineBuffer::default();
            let mut stream = resp.bytes_stream();
            use futures_util::StreamExt as _;

            while let Some(chunk) = stream.next().await {
                let bytes = chunk.context("stream error")?;
                lines.push(&bytes);
                while let Some(line) = lines.next_line() {
                    match parse_sse_line(&line) {
                        Some(SseLine::Done) => { yield StreamEvent::Done; return; }
                        Some(SseLine::Content(parts)) => {
                            for part in parts {
                                yield StreamEvent::Content(part);
                            }
                        }
                        None => {}
                    }
                }
            }
            yield StreamEvent::Done;
        })
    }
}

fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('/');
    if !trimmed.ends_with("/v1") && !trimmed.contains("/v1/") {
        format!("{}/v1", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Raw bytes received so far. Lines are decoded only once complete so a
/// multi-byte character split across chunks survives.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

#[derive(Debug, PartialEq)]
pub enum StreamEvent {
    Content(String),
    Done,
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Content(Vec<String>),
    Done,
}

fn parse_sse_line(line: &str) -> Option<SseLine> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = line.strip_prefix("data:")?.trim();
    if payload == "[DONE]" {
        return Some(SseLine::Done);
    }
    // malformed lines are ignored
    let chunk = serde_json::from_str::<Chunk>(payload).ok()?;
    let parts: Vec<String> = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.and_then(|d| d.content))
        .filter(|c| !c.is_empty())
        .collect();
    Some(SseLine::Content(parts))
}

// Minimal chunk structures for OpenAI-like streaming
#[derive(Debug, Deserialize)]
struct Chunk {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_v1_suffix() {
        assert_eq!(normalize_base_url("https://api.example.com/"), "https://api.example.com/v1");
        assert_eq!(
            normalize_base_url("https://api.intelligence.io.solutions/api/v1"),
            "https://api.intelligence.io.solutions/api/v1"
        );
    }

    #[test]
    fn sse_content_and_done() {
        let line = r#"data: {"choices":[{"delta":{"content":"print(1)"}}]}"#;
        assert_eq!(
            parse_sse_line(line),
            Some(SseLine::Content(vec!["print(1)".to_string()]))
        );
        assert_eq!(parse_sse_line("data: [DONE]"), Some(SseLine::Done));
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line("data: {not json"), None);
    }

    #[test]
    fn line_buffer_keeps_split_characters() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"print('é')\"}}]}\n";
        let bytes = line.as_bytes();
        let split = line.find('é').unwrap() + 1;

        let mut buf = LineBuffer::default();
        buf.push(&bytes[..split]);
        assert_eq!(buf.next_line(), None);
        buf.push(&bytes[split..]);
        let got = buf.next_line().unwrap();
        assert_eq!(
            parse_sse_line(&got),
            Some(SseLine::Content(vec!["print('é')".to_string()]))
        );
        assert_eq!(buf.next_line(), None);
    }

    #[test]
    fn line_buffer_splits_multiple_lines() {
        let mut buf = LineBuffer::default();
        buf.push(b"data: a\r\n\ndata: [DO");
        assert_eq!(buf.next_line().as_deref(), Some("data: a"));
        assert_eq!(buf.next_line().as_deref(), Some(""));
        assert_eq!(buf.next_line(), None);
        buf.push(b"NE]\n");
        assert_eq!(buf.next_line().as_deref(), Some("data: [DONE]"));
    }

    #[test]
    fn role_serializes_lowercase() {
        let msg = ChatMessage::new(Role::System, "x");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "system");
    }
}
