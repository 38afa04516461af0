//! The moderator: merges participant outputs into one final answer.
//!
//! Like participants, a moderator is described by a [`ModeratorSpec`] and
//! bound by the owning structure. Task precedence is reversed here: the
//! moderator's own task wins over the structure's.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::completion::{Completion, CompletionRequest, Params};
use crate::error::{DeliberationError, DeliberationResult};
use crate::participant::{non_empty, HistoryEntry, Prompts, DEFAULT_MODEL};
use crate::presets::{Instructions, PresetKind};
use crate::template::{self, PREVIOUS_RESPONSES, TASK};

/// Marker an auto-generated instruction string must start with.
pub const AUTO_MARKER: &str = "System Instructions:";

/// Attempts allowed for auto-generated system instructions.
pub const MAX_AUTO_ATTEMPTS: u32 = 10;

/// Where a moderator's system instructions come from, besides a persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeratorSystem {
    Literal(String),
    /// Generate instructions from the task before the run.
    Auto,
}

#[derive(Clone)]
pub struct ModeratorSpec {
    persona: Option<Instructions>,
    system: Option<ModeratorSystem>,
    combination: Instructions,
    task: Option<String>,
    model: String,
    params: Params,
    completion: Arc<dyn Completion>,
}

impl std::fmt::Debug for ModeratorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeratorSpec")
            .field("persona", &self.persona)
            .field("system", &self.system)
            .field("combination", &self.combination)
            .field("task", &self.task)
            .field("model", &self.model)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl ModeratorSpec {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self {
            persona: None,
            system: None,
            combination: Instructions::default_preset(),
            task: None,
            model: DEFAULT_MODEL.to_string(),
            params: Params::new(),
            completion,
        }
    }

    pub fn with_persona(mut self, persona: Instructions) -> Self {
        self.persona = Some(persona);
        self
    }

    pub fn with_system_instructions(mut self, system: impl Into<String>) -> Self {
        self.system = Some(ModeratorSystem::Literal(system.into()));
        self
    }

    pub fn with_auto_system_instructions(mut self) -> Self {
        self.system = Some(ModeratorSystem::Auto);
        self
    }

    pub fn with_combination_instructions(mut self, combination: Instructions) -> Self {
        self.combination = combination;
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Generation parameters sent with every moderator call.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeratorInfo {
    pub model: String,
    pub task: String,
    pub persona: Option<String>,
    pub system_instructions: Option<String>,
    pub combination_instructions: String,
    pub params: Params,
    pub last_prompt: Option<String>,
    pub history: Vec<HistoryEntry>,
}

pub struct Moderator {
    model: String,
    task: String,
    persona: Option<String>,
    system_instructions: Option<String>,
    auto_pending: bool,
    combination_instructions: String,
    params: Params,
    last_prompt: Option<String>,
    history: Vec<HistoryEntry>,
    completion: Arc<dyn Completion>,
}

impl std::fmt::Debug for Moderator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Moderator")
            .field("model", &self.model)
            .field("task", &self.task)
            .field("auto_pending", &self.auto_pending)
            .finish_non_exhaustive()
    }
}

impl Moderator {
    /// Bind a moderator outside any structure. The spec must carry a task.
    pub fn standalone(spec: ModeratorSpec) -> DeliberationResult<Self> {
        Self::bind(spec, None)
    }

    pub(crate) fn bind(
        spec: ModeratorSpec,
        structure_task: Option<&str>,
    ) -> DeliberationResult<Self> {
        let task = match (non_empty(spec.task.as_deref()), non_empty(structure_task)) {
            (Some(own), Some(shared)) => {
                if own != shared {
                    warn!("moderator task differs from structure task; using the moderator task");
                }
                own.to_string()
            }
            (Some(own), None) => own.to_string(),
            (None, Some(shared)) => shared.to_string(),
            (None, None) => return Err(DeliberationError::MissingModeratorTask),
        };
        let values = [(TASK, Some(task.as_str()))];

        let (persona, system_instructions, auto_pending) = match (spec.persona, spec.system) {
            (Some(_), Some(_)) => {
                return Err(DeliberationError::ConflictingInstructions(
                    "a moderator takes either a persona or system instructions, not both"
                        .to_string(),
                ))
            }
            (None, Some(ModeratorSystem::Literal(text))) => {
                (None, Some(template::render(&text, &values)), false)
            }
            (None, Some(ModeratorSystem::Auto)) => (None, None, true),
            (Some(persona), None) => {
                let text = persona.resolve(PresetKind::ModeratorPersona)?;
                let rendered = template::render(&text, &values);
                (Some(rendered.clone()), Some(rendered), false)
            }
            (None, None) => (None, None, false),
        };

        let combination_instructions =
            spec.combination.resolve(PresetKind::ModeratorCombination)?;

        Ok(Self {
            model: spec.model,
            task,
            persona,
            system_instructions,
            auto_pending,
            combination_instructions,
            params: spec.params,
            last_prompt: None,
            history: Vec::new(),
            completion: spec.completion,
        })
    }

    /// Ask the completion backend for system instructions derived from the
    /// task.
    ///
    /// An answer must start with [`AUTO_MARKER`]; the marker is stripped.
    /// Answers without it and transient failures count as failed attempts.
    /// A permanent completion failure is returned as is.
    pub async fn generate_system_instructions(&mut self) -> DeliberationResult<String> {
        let request = CompletionRequest {
            model: self.model.clone(),
            system: None,
            user: auto_prompt(&self.task),
            params: self.params.clone(),
        };

        for attempt in 1..=MAX_AUTO_ATTEMPTS {
            match self.completion.complete(request.clone()).await {
                Ok(answer) => {
                    if let Some(rest) = answer.trim().strip_prefix(AUTO_MARKER) {
                        let instructions = rest.trim().to_string();
                        if !instructions.is_empty() {
                            info!(attempt, "generated moderator system instructions");
                            self.system_instructions = Some(instructions.clone());
                            self.auto_pending = false;
                            return Ok(instructions);
                        }
                    }
                    debug!(attempt, "auto instructions missing marker, retrying");
                }
                Err(err) if err.is_transient() => {
                    debug!(attempt, error = %err, "auto instructions call failed, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(DeliberationError::AutoInstructionsExhausted {
            attempts: MAX_AUTO_ATTEMPTS,
        })
    }

    /// Resolve `auto` instructions if they have not been generated yet.
    pub(crate) async fn prepare(&mut self) -> DeliberationResult<()> {
        if self.auto_pending {
            self.generate_system_instructions().await?;
        }
        Ok(())
    }

    /// Merge an already formatted block of responses.
    ///
    /// A failed call is logged and yields `None`; the run is not aborted.
    pub async fn synthesize(&mut self, formatted: &str) -> Option<String> {
        let values = [
            (PREVIOUS_RESPONSES, Some(formatted)),
            (TASK, Some(self.task.as_str())),
        ];
        let user = template::render(&self.combination_instructions, &values);
        let system = self
            .system_instructions
            .as_deref()
            .map(|s| template::render(s, &values));
        self.last_prompt = Some(user.clone());

        let request = CompletionRequest {
            model: self.model.clone(),
            system,
            user,
            params: self.params.clone(),
        };
        match self.completion.complete(request.clone()).await {
            Ok(answer) if !answer.trim().is_empty() => {
                self.history.push(HistoryEntry {
                    prompts: Prompts {
                        system: request.system,
                        user: request.user,
                    },
                    response: answer.clone(),
                    model: request.model,
                    params: request.params,
                    recorded_at: Utc::now(),
                });
                Some(answer)
            }
            Ok(_) => {
                warn!("moderator returned an empty answer");
                None
            }
            Err(err) => {
                warn!(error = %err, "moderator failed to synthesize");
                None
            }
        }
    }

    /// Format an ordered response log, skipping absent entries, then merge.
    pub async fn synthesize_responses(&mut self, responses: &[Option<String>]) -> Option<String> {
        let block = template::format_present_responses(responses);
        self.synthesize(&block).await
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn persona(&self) -> Option<&str> {
        self.persona.as_deref()
    }

    pub fn system_instructions(&self) -> Option<&str> {
        self.system_instructions.as_deref()
    }

    pub fn combination_instructions(&self) -> &str {
        &self.combination_instructions
    }

    /// The user prompt sent on the last synthesis.
    pub fn last_prompt(&self) -> Option<&str> {
        self.last_prompt.as_deref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn info(&self) -> ModeratorInfo {
        ModeratorInfo {
            model: self.model.clone(),
            task: self.task.clone(),
            persona: self.persona.clone(),
            system_instructions: self.system_instructions.clone(),
            combination_instructions: self.combination_instructions.clone(),
            params: self.params.clone(),
            last_prompt: self.last_prompt.clone(),
            history: self.history.clone(),
        }
    }
}

fn auto_prompt(task: &str) -> String {
    format!(
        "Write short system instructions for a moderator who will read several \
         responses to the following task and combine them into one final answer.\n\
         Task: {task}\n\
         Start your answer with \"{AUTO_MARKER}\" followed by the instructions, \
         and write nothing else."
    )
}
