//! Relay structure: participants answer one after another.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{warn, Instrument};

use crate::error::DeliberationResult;
use crate::moderator::ModeratorSpec;
use crate::obs;
use crate::participant::ParticipantSpec;
use crate::structure::{record, Structure, StructureConfig, StructureCore, StructureKind};
use crate::template::format_present_responses;

/// Window used when the config does not set one.
pub const DEFAULT_LAST_N: usize = 1;

/// Sequential relay.
///
/// Each participant sees the last `last_n` outputs of the run so far,
/// formatted as a numbered block. With `shuffle`, the order is redrawn at
/// the start of every cycle.
#[derive(Debug)]
pub struct Chain {
    core: StructureCore,
}

impl Chain {
    pub fn new(
        participants: Vec<ParticipantSpec>,
        config: StructureConfig,
        moderator: Option<ModeratorSpec>,
    ) -> DeliberationResult<Self> {
        let core = StructureCore::build(
            StructureKind::Chain,
            participants,
            config,
            DEFAULT_LAST_N,
            moderator,
        )?;
        Ok(Self { core })
    }

    async fn run(&mut self) -> DeliberationResult<Option<String>> {
        let start = self.core.begin().await?;
        let core = &mut self.core;
        let run_id = core.run_id();
        let last_n = core.last_n();

        let mut order: Vec<usize> = (0..core.participants.len()).collect();
        let mut previous: Vec<Option<String>> = Vec::new();

        for cycle in 0..core.cycles() {
            if core.shuffle() {
                order.shuffle(&mut rand::thread_rng());
            }
            for &idx in &order {
                let window = &previous[previous.len().saturating_sub(last_n)..];
                let context = format_present_responses(window);
                let participant = &mut core.participants[idx];
                if context.is_empty() && !previous.is_empty() {
                    warn!(
                        participant = %participant.name(),
                        "no usable context from earlier participants"
                    );
                }

                let result = participant.process(&context).await;
                let response = record(run_id, participant.name(), cycle, result);
                previous.push(response.clone());
                core.responses.push(response);
            }
        }

        let block = format_present_responses(&previous);
        self.core.finish(start, block).await
    }
}

#[async_trait]
impl Structure for Chain {
    fn core(&self) -> &StructureCore {
        &self.core
    }

    async fn process(&mut self) -> DeliberationResult<Option<String>> {
        let span = obs::run_span(self.core.run_id(), StructureKind::Chain.as_str());
        self.run().instrument(span).await
    }
}
