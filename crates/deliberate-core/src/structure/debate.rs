//! Exchange structure: two debaters alternate turns.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::Instrument;

use crate::error::{DeliberationError, DeliberationResult};
use crate::moderator::ModeratorSpec;
use crate::obs;
use crate::participant::ParticipantSpec;
use crate::structure::{record, Structure, StructureConfig, StructureCore, StructureKind};
use crate::template::format_present_responses;

/// Window used when the config does not set one.
pub const DEFAULT_LAST_N: usize = 2;

/// Label on a debater's own earlier turns in its view.
pub const SELF_LABEL: &str = "[WHAT YOU SAID]: ";
/// Label on the opponent's turns in a debater's view.
pub const OTHER_LABEL: &str = "[WHAT OTHER PARTICIPANT SAID]: ";

const ECHOED_LABEL: &str = r"\[(?:Debater \d+|WHAT YOU SAID|WHAT OTHER PARTICIPANT SAID)\]:[ \t]*";

/// Two-party debate.
///
/// Every debater keeps its own view of the exchange: its turns labelled
/// [`SELF_LABEL`], the opponent's [`OTHER_LABEL`]. The shared response log
/// labels each turn `[Debater N]: ` for the moderator. Views start empty on
/// every `process()` call.
#[derive(Debug)]
pub struct Debate {
    core: StructureCore,
    views: [Vec<String>; 2],
}

impl Debate {
    pub fn new(
        participants: Vec<ParticipantSpec>,
        config: StructureConfig,
        moderator: Option<ModeratorSpec>,
    ) -> DeliberationResult<Self> {
        if participants.len() != 2 {
            return Err(DeliberationError::DebateParticipantCount {
                found: participants.len(),
            });
        }
        let core = StructureCore::build(
            StructureKind::Debate,
            participants,
            config,
            DEFAULT_LAST_N,
            moderator,
        )?;
        Ok(Self {
            core,
            views: [Vec::new(), Vec::new()],
        })
    }

    /// The labelled view debater `idx` (0 or 1) has of the exchange.
    pub fn view(&self, idx: usize) -> &[String] {
        self.views.get(idx).map(Vec::as_slice).unwrap_or(&[])
    }

    async fn run(&mut self) -> DeliberationResult<Option<String>> {
        let start = self.core.begin().await?;
        self.views = [Vec::new(), Vec::new()];
        let core = &mut self.core;
        let run_id = core.run_id();
        let last_n = core.last_n();

        for cycle in 0..core.cycles() {
            for idx in 0..2 {
                let view = &self.views[idx];
                let context = view[view.len().saturating_sub(last_n)..].join("\n");
                let participant = &mut core.participants[idx];

                let result = participant.process(context.trim()).await;
                let response = record(run_id, participant.name(), cycle, result);

                let entry = response.map(|text| {
                    let cleaned = strip_echoed_labels(&text);
                    self.views[idx].push(format!("{SELF_LABEL}{cleaned}"));
                    self.views[1 - idx].push(format!("{OTHER_LABEL}{cleaned}"));
                    format!("[Debater {}]: {}", idx + 1, cleaned)
                });
                core.responses.push(entry);
            }
        }

        let block = format_present_responses(&self.core.responses[start.base..]);
        self.core.finish(start, block).await
    }
}

#[async_trait]
impl Structure for Debate {
    fn core(&self) -> &StructureCore {
        &self.core
    }

    async fn process(&mut self) -> DeliberationResult<Option<String>> {
        let span = obs::run_span(self.core.run_id(), StructureKind::Debate.as_str());
        self.run().instrument(span).await
    }
}

fn echoed_label() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(ECHOED_LABEL).ok()).as_ref()
}

/// Remove debate labels a model echoed back into its answer.
pub fn strip_echoed_labels(text: &str) -> String {
    match echoed_label() {
        Some(re) => re.replace_all(text, "").trim().to_string(),
        None => text.trim().to_string(),
    }
}
