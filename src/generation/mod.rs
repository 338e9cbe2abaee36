//! Code generation collaborator: natural-language prompt in, source text out.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    config::Config,
    errors::GenerationError,
    llm::{ChatMessage, ChatOptions, HttpStatusError, LlmClient, Role, StreamEvent},
    role::code_role_text,
    utils::strip_fences,
};

#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Turn a prompt into source text with any surrounding fences removed.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Talks to an OpenAI-compatible chat endpoint directly.
pub struct LlmGenerator {
    client: LlmClient,
    role_text: String,
    opts: ChatOptions,
}

impl LlmGenerator {
    pub fn from_config(cfg: &Config, model: Option<&str>, temperature: Option<f32>) -> anyhow::Result<Self> {
        let client = LlmClient::from_config(cfg)?;
        let opts = ChatOptions {
            model: model
                .map(str::to_string)
                .or_else(|| cfg.get("DEFAULT_MODEL"))
                .unwrap_or_else(|| "gpt-4o".to_string()),
            temperature: temperature.or_else(|| cfg.get_f32("TEMPERATURE")).unwrap_or(0.3),
            max_tokens: cfg.get_u64("MAX_TOKENS").map(|m| m as u32),
        };
        Ok(Self { client, role_text: code_role_text(cfg), opts })
    }
}

#[async_trait]
impl CodeGenerator for LlmGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let messages = vec![
            ChatMessage::new(Role::System, self.role_text.clone()),
            ChatMessage::new(Role::User, prompt),
        ];
        let mut stream = self.client.chat_stream(messages, self.opts.clone());
        let mut code = String::new();
        while let Some(ev) = stream.next().await {
            match ev.map_err(classify_transport_error)? {
                StreamEvent::Content(t) => code.push_str(&t),
                StreamEvent::Done => break,
            }
        }
        debug!(chars = code.len(), model = %self.opts.model, "generation stream finished");
        finish_code(&code)
    }
}

fn classify_transport_error(err: anyhow::Error) -> GenerationError {
    match err.downcast_ref::<HttpStatusError>() {
        Some(http) if http.status == 429 => GenerationError::RateLimited {
            message: "the model provider is rate limiting requests".to_string(),
        },
        Some(http) => GenerationError::Http {
            status: http.status,
            message: error_message_from_body(&http.body),
        },
        None => GenerationError::Unreachable(format!("{:#}", err)),
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    code: Option<String>,
    error: Option<String>,
}

/// Posts `{ "prompt": ... }` to a generation endpoint and reads back `{ "code": ... }`.
pub struct EndpointGenerator {
    http: reqwest::Client,
    url: String,
}

impl EndpointGenerator {
    pub fn new(cfg: &Config, url: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl CodeGenerator for EndpointGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&GenerateRequest { prompt })
            .send()
            .await
            .map_err(|e| GenerationError::Unreachable(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| GenerationError::Unreachable(e.to_string()))?;
        parse_endpoint_response(status, &body)
    }
}

fn parse_endpoint_response(status: u16, body: &str) -> Result<String, GenerationError> {
    if status == 429 {
        return Err(GenerationError::RateLimited { message: error_message_from_body(body) });
    }
    if !(200..300).contains(&status) {
        warn!(status, "generation endpoint returned an error");
        return Err(GenerationError::Http { status, message: error_message_from_body(body) });
    }
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::Malformed(e.to_string()))?;
    match (parsed.code, parsed.error) {
        (Some(code), _) => finish_code(&code),
        (None, Some(err)) => Err(GenerationError::Malformed(err)),
        (None, None) => Err(GenerationError::Malformed("response has no 'code' field".into())),
    }
}

fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error").and_then(|e| {
                e.as_str()
                    .map(str::to_string)
                    .or_else(|| e.get("message").and_then(|m| m.as_str()).map(str::to_string))
            })
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() { "no details".to_string() } else { trimmed.to_string() }
        })
}

fn finish_code(raw: &str) -> Result<String, GenerationError> {
    let code = strip_fences(raw);
    if code.is_empty() {
        return Err(GenerationError::EmptyCode);
    }
    Ok(code)
}

/// Pick the collaborator: an explicit endpoint wins over direct model access.
pub fn from_config(
    cfg: &Config,
    model: Option<&str>,
    temperature: Option<f32>,
) -> anyhow::Result<Box<dyn CodeGenerator>> {
    match cfg.get("GENERATION_ENDPOINT").filter(|u| !u.trim().is_empty()) {
        Some(url) => Ok(Box::new(EndpointGenerator::new(cfg, url)?)),
        None => Ok(Box::new(LlmGenerator::from_config(cfg, model, temperature)?)),
    }
}

#[async_trait]
impl<T: CodeGenerator + ?Sized> CodeGenerator for Box<T> {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        (**self).generate(prompt).await
    }
}
