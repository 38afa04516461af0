//! Fan-out structure: every participant answers the task independently.

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, Instrument};

use crate::error::DeliberationResult;
use crate::moderator::ModeratorSpec;
use crate::obs;
use crate::participant::ParticipantSpec;
use crate::retry::RetryPolicy;
use crate::structure::{record, Structure, StructureConfig, StructureCore, StructureKind};
use crate::template::format_present_responses;

/// Concurrent calls allowed per cycle unless configured otherwise.
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Concurrent fan-out.
///
/// All participants of a cycle run at once with no shared context. Each
/// result lands in the slot of its participant index, so `responses` keeps
/// submission order whatever order the calls finish in.
#[derive(Debug)]
pub struct Ensemble {
    core: StructureCore,
    retry: RetryPolicy,
    max_concurrent: usize,
}

impl Ensemble {
    pub fn new(
        participants: Vec<ParticipantSpec>,
        config: StructureConfig,
        moderator: Option<ModeratorSpec>,
    ) -> DeliberationResult<Self> {
        // Window and shuffle do not apply; participants never see each other.
        let core =
            StructureCore::build(StructureKind::Ensemble, participants, config, 1, moderator)?;
        Ok(Self {
            core,
            retry: RetryPolicy::default(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Values below 1 act as 1.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    async fn run(&mut self) -> DeliberationResult<Option<String>> {
        let start = self.core.begin().await?;
        let run_id = self.core.run_id();
        let retry = self.retry;
        let semaphore = Semaphore::new(self.max_concurrent);
        let core = &mut self.core;

        for cycle in 0..core.cycles() {
            let mut slots: Vec<Option<String>> = vec![None; core.participants.len()];
            let mut pending: FuturesUnordered<_> = core
                .participants
                .iter_mut()
                .enumerate()
                .map(|(idx, participant)| {
                    let semaphore = &semaphore;
                    async move {
                        let _permit = semaphore.acquire().await.ok();
                        let result = retry.run(participant, "").await;
                        let response = record(run_id, participant.name(), cycle, result);
                        (idx, response)
                    }
                })
                .collect();

            while let Some((idx, response)) = pending.next().await {
                debug!(slot = idx, cycle, "fan-out slot filled");
                slots[idx] = response;
            }
            drop(pending);

            core.responses.extend(slots);
        }

        let block = format_present_responses(&self.core.responses[start.base..]);
        self.core.finish(start, block).await
    }
}

#[async_trait]
impl Structure for Ensemble {
    fn core(&self) -> &StructureCore {
        &self.core
    }

    async fn process(&mut self) -> DeliberationResult<Option<String>> {
        let span = obs::run_span(self.core.run_id(), StructureKind::Ensemble.as_str());
        self.run().instrument(span).await
    }
}
