//! Deterministic completion fakes (testing only)
//!
//! Provides `ScriptedCompletion`, `EchoCompletion`, `RoutedCompletion` and
//! `FailingCompletion` that satisfy the [`Completion`] contract without a
//! network backend. Every fake records the requests it receives.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::completion::{Completion, CompletionError, CompletionErrorKind, CompletionRequest};

// ---------------------------------------------------------------------------
// ScriptedCompletion
// ---------------------------------------------------------------------------

/// Replays a fixed queue of results, one per call.
///
/// Once the script runs out every call fails with a `Client` error.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<String, CompletionError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new(script: Vec<Result<String, CompletionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: every entry succeeds.
    pub fn replies<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self::new(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(CompletionError::client("script exhausted")))
    }
}

// ---------------------------------------------------------------------------
// EchoCompletion
// ---------------------------------------------------------------------------

/// Answers with the user prompt, optionally prefixed.
#[derive(Debug, Default)]
pub struct EchoCompletion {
    prefix: String,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl EchoCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Completion for EchoCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let reply = format!("{}{}", self.prefix, request.user);
        self.requests.lock().unwrap().push(request);
        Ok(reply)
    }
}

// ---------------------------------------------------------------------------
// RoutedCompletion
// ---------------------------------------------------------------------------

/// Answers with a fixed reply after a fixed latency, both chosen per
/// instance. Useful for giving each participant a distinct identity and
/// response time.
#[derive(Debug)]
pub struct RoutedCompletion {
    reply: String,
    latency: Duration,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl RoutedCompletion {
    pub fn new(reply: impl Into<String>, latency: Duration) -> Self {
        Self {
            reply: reply.into(),
            latency,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// User prompt of the most recent call.
    pub fn last_user_prompt(&self) -> Option<String> {
        self.requests.lock().unwrap().last().map(|r| r.user.clone())
    }
}

#[async_trait]
impl Completion for RoutedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(request);
        tokio::time::sleep(self.latency).await;
        Ok(self.reply.clone())
    }
}

// ---------------------------------------------------------------------------
// FailingCompletion
// ---------------------------------------------------------------------------

/// Fails every call with the same error kind.
#[derive(Debug)]
pub struct FailingCompletion {
    kind: CompletionErrorKind,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FailingCompletion {
    pub fn new(kind: CompletionErrorKind) -> Self {
        Self {
            kind,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Completion for FailingCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(request);
        Err(CompletionError::new(self.kind, "injected failure"))
    }
}
