//! TOML deliberation plans.
//!
//! A plan names the structure kind, its shared settings, the participants,
//! an optional moderator, graph edges and the completion backend.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use deliberate_core::{
    Chain, Completion, Debate, Ensemble, Graph, Instructions, ModeratorSpec, Params,
    ParticipantSpec, PresetKind, RetryPolicy, Structure, StructureConfig, StructureKind,
};

/// Sentinel for generated moderator system instructions.
pub const AUTO: &str = "auto";

/// Plan problems that the core library cannot see.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("edges are only valid for graph plans, found {count} on a {kind} plan")]
    EdgesOnNonGraph { kind: StructureKind, count: usize },

    #[error("graph edges must all be index pairs or all be name pairs")]
    MixedEdgeForms,

    #[error("named graph edges need a name on every participant (participant {index} has none)")]
    UnnamedParticipant { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Offline backend that answers with the prompt it was given.
    #[default]
    Echo,
    /// OpenAI-compatible chat completions endpoint.
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Echo,
            base_url: "https://api.openai.com/v1".to_string(),
            model: deliberate_core::participant::DEFAULT_MODEL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParticipantConfig {
    pub name: Option<String>,
    pub task: Option<String>,
    pub model: Option<String>,
    pub combination_instructions: Option<String>,
    pub system_instructions: Option<String>,
    pub persona: Option<String>,
    pub persona_template: Option<String>,
    /// Generation parameters such as `temperature` or `max_tokens`.
    #[serde(default)]
    pub params: Params,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModeratorConfig {
    pub task: Option<String>,
    pub model: Option<String>,
    pub persona: Option<String>,
    /// Literal instructions, or `"auto"` to generate them from the task.
    pub system_instructions: Option<String>,
    pub combination_instructions: Option<String>,
    #[serde(default)]
    pub params: Params,
}

/// A graph edge: `[0, 1]` or `["a", "b"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgeConfig {
    Index(usize, usize),
    Named(String, String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanConfig {
    pub kind: StructureKind,
    pub task: Option<String>,
    pub combination_instructions: Option<String>,
    #[serde(default = "default_cycles")]
    pub cycles: usize,
    pub last_n: Option<usize>,
    #[serde(default)]
    pub shuffle: bool,
    /// Fan-out only.
    pub max_concurrent: Option<usize>,
    /// Fan-out only.
    pub retry_attempts: Option<u32>,
    /// Fan-out only.
    pub retry_backoff_ms: Option<u64>,
    #[serde(default)]
    pub backend: BackendConfig,
    pub participants: Vec<ParticipantConfig>,
    pub moderator: Option<ModeratorConfig>,
    #[serde(default)]
    pub edges: Vec<EdgeConfig>,
}

fn default_cycles() -> usize {
    1
}

impl PlanConfig {
    /// Read and parse a plan file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid plan {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let plan: PlanConfig = toml::from_str(raw).context("failed to parse plan TOML")?;
        plan.check()?;
        Ok(plan)
    }

    fn check(&self) -> Result<(), PlanError> {
        if self.kind != StructureKind::Graph && !self.edges.is_empty() {
            return Err(PlanError::EdgesOnNonGraph {
                kind: self.kind,
                count: self.edges.len(),
            });
        }
        let named = self
            .edges
            .iter()
            .filter(|e| matches!(e, EdgeConfig::Named(..)))
            .count();
        if named != 0 && named != self.edges.len() {
            return Err(PlanError::MixedEdgeForms);
        }
        if named > 0 {
            if let Some(index) = self.participants.iter().position(|p| p.name.is_none()) {
                return Err(PlanError::UnnamedParticipant { index });
            }
        }
        Ok(())
    }

    fn structure_config(&self) -> StructureConfig {
        let mut config = StructureConfig::new()
            .with_cycles(self.cycles)
            .with_shuffle(self.shuffle);
        if let Some(task) = &self.task {
            config = config.with_task(task.clone());
        }
        if let Some(text) = &self.combination_instructions {
            let instructions = Instructions::lookup(PresetKind::Combination, text.clone());
            config = config.with_combination_instructions(instructions);
        }
        if let Some(last_n) = self.last_n {
            config = config.with_last_n(last_n);
        }
        config
    }

    fn participant_spec(
        &self,
        p: &ParticipantConfig,
        completion: &Arc<dyn Completion>,
    ) -> ParticipantSpec {
        let model = p.model.clone().unwrap_or_else(|| self.backend.model.clone());
        let mut spec = ParticipantSpec::new(Arc::clone(completion))
            .with_model(model)
            .with_params(p.params.clone());
        if let Some(name) = &p.name {
            spec = spec.with_name(name.clone());
        }
        if let Some(task) = &p.task {
            spec = spec.with_task(task.clone());
        }
        if let Some(text) = &p.combination_instructions {
            let instructions = Instructions::lookup(PresetKind::Combination, text.clone());
            spec = spec.with_combination_instructions(instructions);
        }
        if let Some(system) = &p.system_instructions {
            spec = spec.with_system_instructions(system.clone());
        }
        if let Some(persona) = &p.persona {
            spec = spec.with_persona(persona.clone());
        }
        if let Some(template) = &p.persona_template {
            let template = Instructions::lookup(PresetKind::PersonaTemplate, template.clone());
            spec = spec.with_persona_template(template);
        }
        spec
    }

    fn moderator_spec(
        &self,
        m: &ModeratorConfig,
        completion: &Arc<dyn Completion>,
    ) -> ModeratorSpec {
        let model = m.model.clone().unwrap_or_else(|| self.backend.model.clone());
        let mut spec = ModeratorSpec::new(Arc::clone(completion))
            .with_model(model)
            .with_params(m.params.clone());
        if let Some(task) = &m.task {
            spec = spec.with_task(task.clone());
        }
        if let Some(persona) = &m.persona {
            let persona = Instructions::lookup(PresetKind::ModeratorPersona, persona.clone());
            spec = spec.with_persona(persona);
        }
        match m.system_instructions.as_deref() {
            Some(AUTO) => spec = spec.with_auto_system_instructions(),
            Some(text) => spec = spec.with_system_instructions(text),
            None => {}
        }
        if let Some(text) = &m.combination_instructions {
            let instructions =
                Instructions::lookup(PresetKind::ModeratorCombination, text.clone());
            spec = spec.with_combination_instructions(instructions);
        }
        spec
    }

    /// Bind the plan into a runnable structure backed by `completion`.
    pub fn build(&self, completion: Arc<dyn Completion>) -> Result<Box<dyn Structure>> {
        self.check()?;
        let config = self.structure_config();
        let moderator = self
            .moderator
            .as_ref()
            .map(|m| self.moderator_spec(m, &completion));
        let specs: Vec<ParticipantSpec> = self
            .participants
            .iter()
            .map(|p| self.participant_spec(p, &completion))
            .collect();

        let structure: Box<dyn Structure> = match self.kind {
            StructureKind::Chain => Box::new(Chain::new(specs, config, moderator)?),
            StructureKind::Debate => Box::new(Debate::new(specs, config, moderator)?),
            StructureKind::Ensemble => {
                let mut ensemble = Ensemble::new(specs, config, moderator)?;
                let default = RetryPolicy::default();
                if self.retry_attempts.is_some() || self.retry_backoff_ms.is_some() {
                    ensemble = ensemble.with_retry(RetryPolicy::new(
                        self.retry_attempts.unwrap_or(default.max_attempts),
                        self.retry_backoff_ms
                            .map(Duration::from_millis)
                            .unwrap_or(default.backoff),
                    ));
                }
                if let Some(max) = self.max_concurrent {
                    ensemble = ensemble.with_max_concurrent(max);
                }
                Box::new(ensemble)
            }
            StructureKind::Graph => {
                let named = self.edges.iter().any(|e| matches!(e, EdgeConfig::Named(..)));
                if named {
                    let participants = self
                        .participants
                        .iter()
                        .zip(specs)
                        .map(|(p, spec)| (p.name.clone().unwrap_or_default(), spec))
                        .collect();
                    let edges = self
                        .edges
                        .iter()
                        .filter_map(|e| match e {
                            EdgeConfig::Named(a, b) => Some((a.clone(), b.clone())),
                            EdgeConfig::Index(..) => None,
                        })
                        .collect();
                    Box::new(Graph::from_named(participants, edges, config, moderator)?)
                } else {
                    let edges = self
                        .edges
                        .iter()
                        .filter_map(|e| match e {
                            EdgeConfig::Index(a, b) => Some((*a, *b)),
                            EdgeConfig::Named(..) => None,
                        })
                        .collect();
                    Box::new(Graph::new(specs, edges, config, moderator)?)
                }
            }
        };
        Ok(structure)
    }
}
