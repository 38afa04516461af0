//! Deliberation structures.
//!
//! A structure binds a set of participant specs to shared configuration,
//! runs them through one topology and optionally hands the outputs to a
//! moderator. Construction performs the whole resolution pass; a
//! structure that constructs successfully can always run.

pub mod chain;
pub mod debate;
pub mod ensemble;
pub mod graph;

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::completion::CompletionError;
use crate::error::{DeliberationError, DeliberationResult};
use crate::info::StructureInfo;
use crate::moderator::{Moderator, ModeratorSpec};
use crate::obs;
use crate::participant::{non_empty, Participant, ParticipantSpec};
use crate::presets::{Instructions, PresetKind};

pub use chain::Chain;
pub use debate::Debate;
pub use ensemble::Ensemble;
pub use graph::Graph;

/// The topology a structure runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    Chain,
    Ensemble,
    Debate,
    Graph,
}

impl StructureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StructureKind::Chain => "chain",
            StructureKind::Ensemble => "ensemble",
            StructureKind::Debate => "debate",
            StructureKind::Graph => "graph",
        }
    }

    /// Whether `last_n` limits the context this topology shows participants.
    pub fn uses_window(self) -> bool {
        matches!(self, StructureKind::Chain | StructureKind::Debate)
    }
}

impl std::fmt::Display for StructureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shared configuration applied to every participant of a structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureConfig {
    /// Shared task. Overrides participant tasks when set.
    pub task: Option<String>,
    /// Shared combination instructions for participants without their own.
    pub combination_instructions: Instructions,
    /// Full passes over all participants. Ignored by `Graph`.
    pub cycles: usize,
    /// Most recent outputs shown to the next participant. `None` uses the
    /// structure's default.
    pub last_n: Option<usize>,
    /// Reshuffle participant order every cycle. Only `Chain` honours it.
    pub shuffle: bool,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            task: None,
            combination_instructions: Instructions::default_preset(),
            cycles: 1,
            last_n: None,
            shuffle: false,
        }
    }
}

impl StructureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_combination_instructions(mut self, instructions: Instructions) -> Self {
        self.combination_instructions = instructions;
        self
    }

    pub fn with_cycles(mut self, cycles: usize) -> Self {
        self.cycles = cycles;
        self
    }

    pub fn with_last_n(mut self, last_n: usize) -> Self {
        self.last_n = Some(last_n);
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }
}

/// Where a run started, so the run's own slice of `responses` can be found.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunStart {
    pub at: Instant,
    pub base: usize,
}

/// State shared by every structure: bound participants, resolved
/// configuration, moderator and the response log.
#[derive(Debug)]
pub struct StructureCore {
    kind: StructureKind,
    pub(crate) participants: Vec<Participant>,
    task: Option<String>,
    combination_instructions: String,
    cycles: usize,
    last_n: usize,
    shuffle: bool,
    pub(crate) moderator: Option<Moderator>,
    pub(crate) responses: Vec<Option<String>>,
    final_response: Option<String>,
    processed: bool,
    run_id: Uuid,
}

impl StructureCore {
    /// Validate `config` and bind every spec.
    ///
    /// Participants without a name are called `participant-{index}`.
    pub(crate) fn build(
        kind: StructureKind,
        specs: Vec<ParticipantSpec>,
        config: StructureConfig,
        default_last_n: usize,
        moderator: Option<ModeratorSpec>,
    ) -> DeliberationResult<Self> {
        if specs.is_empty() {
            return Err(DeliberationError::NoParticipants {
                structure: kind.to_string(),
            });
        }
        if config.cycles == 0 {
            return Err(DeliberationError::InvalidCycles { cycles: 0 });
        }
        let last_n = if kind.uses_window() {
            config.last_n.unwrap_or(default_last_n)
        } else {
            default_last_n
        };
        if last_n == 0 {
            return Err(DeliberationError::InvalidWindow { last_n });
        }

        let task = non_empty(config.task.as_deref()).map(str::to_string);
        let combination_instructions = config
            .combination_instructions
            .resolve(PresetKind::Combination)?;

        let participants = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                let name = spec.name_or(|| format!("participant-{index}"));
                Participant::bind(spec, name, task.as_deref(), &combination_instructions)
            })
            .collect::<DeliberationResult<Vec<_>>>()?;

        let moderator = moderator
            .map(|spec| Moderator::bind(spec, task.as_deref()))
            .transpose()?;

        debug!(
            kind = %kind,
            participants = participants.len(),
            cycles = config.cycles,
            last_n,
            "structure bound"
        );

        Ok(Self {
            kind,
            participants,
            task,
            combination_instructions,
            cycles: config.cycles,
            last_n,
            shuffle: config.shuffle,
            moderator,
            responses: Vec::new(),
            final_response: None,
            processed: false,
            run_id: Uuid::new_v4(),
        })
    }

    /// Start a run: resolve `auto` moderator instructions and log.
    pub(crate) async fn begin(&mut self) -> DeliberationResult<RunStart> {
        if self.processed {
            warn!(
                kind = %self.kind,
                "structure already processed; responses from this run are appended"
            );
        }
        if let Some(moderator) = self.moderator.as_mut() {
            moderator.prepare().await?;
        }
        obs::emit_structure_started(
            self.run_id,
            self.kind.as_str(),
            self.participants.len(),
            self.cycles,
        );
        Ok(RunStart {
            at: Instant::now(),
            base: self.responses.len(),
        })
    }

    /// Finish a run: synthesize `block` when a moderator is present and set
    /// the final response.
    pub(crate) async fn finish(
        &mut self,
        start: RunStart,
        block: String,
    ) -> DeliberationResult<Option<String>> {
        let inputs = self.responses[start.base..].iter().flatten().count();
        if let Some(moderator) = self.moderator.as_mut() {
            let synthesized = moderator.synthesize(&block).await;
            obs::emit_synthesis_finished(self.run_id, inputs, synthesized.is_some());
            self.responses.push(synthesized.clone());
            self.final_response = synthesized;
        } else {
            self.final_response = self.responses.last().cloned().flatten();
        }
        self.processed = true;

        let run = &self.responses[start.base..];
        obs::emit_structure_finished(
            self.run_id,
            start.at.elapsed().as_millis() as u64,
            run.len(),
            run.iter().filter(|r| r.is_none()).count(),
        );
        Ok(self.final_response.clone())
    }

    pub fn kind(&self) -> StructureKind {
        self.kind
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// The structure-level task, if one was given.
    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    pub fn combination_instructions(&self) -> &str {
        &self.combination_instructions
    }

    pub fn cycles(&self) -> usize {
        self.cycles
    }

    pub fn last_n(&self) -> usize {
        self.last_n
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn moderator(&self) -> Option<&Moderator> {
        self.moderator.as_ref()
    }

    pub fn responses(&self) -> &[Option<String>] {
        &self.responses
    }

    pub fn final_response(&self) -> Option<&str> {
        self.final_response.as_deref()
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn info(&self) -> StructureInfo {
        if !self.processed {
            warn!(kind = %self.kind, "structure info requested before process()");
        }
        StructureInfo::from_core(self)
    }
}

/// Turn one participant turn into a response slot, logging failures.
pub(crate) fn record(
    run_id: Uuid,
    participant: &str,
    cycle: usize,
    result: Result<String, CompletionError>,
) -> Option<String> {
    obs::emit_participant_responded(run_id, participant, cycle, result.is_ok());
    match result {
        Ok(response) => Some(response),
        Err(err) => {
            obs::emit_participant_failed(run_id, participant, &err);
            None
        }
    }
}

/// Common surface of every topology.
#[async_trait]
pub trait Structure: Send {
    fn core(&self) -> &StructureCore;

    /// Run the topology once and return the final response.
    ///
    /// Fatal errors only come from moderator auto-instruction generation;
    /// failed participant turns are recorded as `None`.
    async fn process(&mut self) -> DeliberationResult<Option<String>>;

    fn kind(&self) -> StructureKind {
        self.core().kind()
    }

    fn responses(&self) -> &[Option<String>] {
        self.core().responses()
    }

    fn final_response(&self) -> Option<&str> {
        self.core().final_response()
    }

    fn participants(&self) -> &[Participant] {
        self.core().participants()
    }

    fn info(&self) -> StructureInfo {
        self.core().info()
    }
}
