//! Bounded retry with fixed backoff for participant turns.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::completion::CompletionError;
use crate::participant::Participant;

/// Retry behaviour for transient completion failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per turn, including the first. Values below 1 act as 1.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// A single attempt, no retry.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run one turn of `participant`, retrying transient failures.
    ///
    /// Permanent failures return immediately. The last error is returned
    /// once attempts are exhausted.
    pub async fn run(
        &self,
        participant: &mut Participant,
        previous: &str,
    ) -> Result<String, CompletionError> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match participant.process(previous).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() && attempt < attempts => {
                    debug!(
                        participant = %participant.name(),
                        attempt,
                        error = %err,
                        "transient completion failure, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!(
                            participant = %participant.name(),
                            attempts,
                            error = %err,
                            "retries exhausted"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}
