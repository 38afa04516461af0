//! Completion backends for the CLI.
//!
//! `openai` talks to any OpenAI-compatible `/chat/completions` endpoint.
//! `echo` answers offline with the prompt it was given.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use deliberate_core::fakes::EchoCompletion;
use deliberate_core::{Completion, CompletionError, CompletionRequest, Params};

use crate::config::{BackendConfig, BackendKind};

/// Build the completion backend described by `config`.
pub fn from_config(config: &BackendConfig) -> Result<Arc<dyn Completion>> {
    match config.kind {
        BackendKind::Echo => Ok(Arc::new(EchoCompletion::new())),
        BackendKind::Openai => {
            let api_key = std::env::var(&config.api_key_env).ok();
            if api_key.is_none() {
                tracing::warn!(
                    var = %config.api_key_env,
                    "API key variable not set; sending unauthenticated requests"
                );
            }
            let client = OpenAiCompletion::new(
                &config.base_url,
                api_key,
                Duration::from_secs(config.timeout_secs),
            )?;
            debug!(endpoint = client.endpoint(), "using chat completions backend");
            Ok(Arc::new(client))
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(flatten)]
    params: &'a Params,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions API.
pub struct OpenAiCompletion {
    endpoint: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl OpenAiCompletion {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("deliberate/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn request_body(request: &CompletionRequest) -> ChatRequest<'_> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system.as_deref() {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &request.user,
    });
    ChatRequest {
        model: &request.model,
        messages,
        params: &request.params,
    }
}

fn parse_reply(body: &str) -> Result<String, CompletionError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::parse(format!("invalid chat response: {e}")))?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    if content.trim().is_empty() {
        return Err(CompletionError::empty());
    }
    Ok(content)
}

#[async_trait]
impl Completion for OpenAiCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let mut builder = self
            .http_client
            .post(&self.endpoint)
            .json(&request_body(&request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CompletionError::network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::network(e.to_string()))?;
        debug!(status = status.as_u16(), model = %request.model, "chat completion answered");

        if !status.is_success() {
            return Err(CompletionError::from_status(status.as_u16(), body));
        }
        parse_reply(&body)
    }
}
