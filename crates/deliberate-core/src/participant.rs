//! Participants: the units a structure coordinates.
//!
//! A caller describes a participant with an immutable [`ParticipantSpec`].
//! A structure's resolution pass turns the spec into a bound
//! [`Participant`], fixing its task, combination instructions and system
//! instructions. Bound participants cannot be reconfigured; they only
//! accumulate history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::completion::{Completion, CompletionError, CompletionRequest, Params};
use crate::error::{DeliberationError, DeliberationResult};
use crate::presets::{Instructions, PresetKind};
use crate::template::{self, PERSONA, PREVIOUS_RESPONSES, TASK};

/// Model identifier used when a spec does not name one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Caller-side description of a participant.
#[derive(Clone)]
pub struct ParticipantSpec {
    name: Option<String>,
    model: String,
    task: Option<String>,
    combination: Option<Instructions>,
    system: Option<String>,
    persona: Option<String>,
    persona_template: Option<Instructions>,
    params: Params,
    completion: Arc<dyn Completion>,
}

impl std::fmt::Debug for ParticipantSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticipantSpec")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("task", &self.task)
            .field("combination", &self.combination)
            .field("system", &self.system)
            .field("persona", &self.persona)
            .field("persona_template", &self.persona_template)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl ParticipantSpec {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self {
            name: None,
            model: DEFAULT_MODEL.to_string(),
            task: None,
            combination: None,
            system: None,
            persona: None,
            persona_template: None,
            params: Params::new(),
            completion,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Bespoke combination instructions; kept even inside a structure that
    /// sets its own.
    pub fn with_combination_instructions(mut self, instructions: Instructions) -> Self {
        self.combination = Some(instructions);
        self
    }

    pub fn with_system_instructions(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    /// Template wrapping the persona; a preset name or a literal
    /// containing `${persona}`.
    pub fn with_persona_template(mut self, template: Instructions) -> Self {
        self.persona_template = Some(template);
        self
    }

    /// Generation parameters sent with every call of this participant.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn task(&self) -> Option<&str> {
        non_empty(self.task.as_deref())
    }

    pub(crate) fn name_or(&self, fallback: impl FnOnce() -> String) -> String {
        self.name.clone().unwrap_or_else(fallback)
    }
}

/// One recorded exchange with the completion backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompts {
    pub system: Option<String>,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub prompts: Prompts,
    pub response: String,
    pub model: String,
    #[serde(default)]
    pub params: Params,
    pub recorded_at: DateTime<Utc>,
}

/// Serialisable snapshot of a bound participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub name: String,
    pub model: String,
    pub original_task: String,
    pub current_task: String,
    pub combination_instructions: String,
    pub system_instructions: Option<String>,
    pub persona: Option<String>,
    pub params: Params,
    pub history: Vec<HistoryEntry>,
}

/// A participant bound to its resolved configuration.
pub struct Participant {
    name: String,
    model: String,
    original_task: String,
    current_task: String,
    combination_instructions: String,
    system_instructions: Option<String>,
    persona: Option<String>,
    params: Params,
    history: Vec<HistoryEntry>,
    completion: Arc<dyn Completion>,
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("original_task", &self.original_task)
            .field("history_len", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl Participant {
    /// Bind a participant outside any structure. The spec must carry a task.
    pub fn standalone(spec: ParticipantSpec) -> DeliberationResult<Self> {
        let name = spec.name_or(|| "participant".to_string());
        let combination = Instructions::default_preset().resolve(PresetKind::Combination)?;
        Self::bind(spec, name, None, &combination)
    }

    /// Resolution pass for one participant.
    ///
    /// A structure task replaces the participant's own task, with a warning
    /// whenever one was set. A non-empty participant combination template is
    /// kept; otherwise the structure's resolved template is used.
    pub(crate) fn bind(
        spec: ParticipantSpec,
        name: String,
        structure_task: Option<&str>,
        structure_combination: &str,
    ) -> DeliberationResult<Self> {
        let task = match (non_empty(structure_task), spec.task()) {
            (Some(shared), Some(own)) => {
                warn!(
                    participant = %name,
                    own_task = %own,
                    "overwriting participant task with the structure task"
                );
                shared.to_string()
            }
            (Some(shared), None) => shared.to_string(),
            (None, Some(own)) => own.to_string(),
            (None, None) => return Err(DeliberationError::MissingTask { participant: name }),
        };

        let own_combination = match &spec.combination {
            Some(instructions) => instructions.resolve(PresetKind::Combination)?,
            None => String::new(),
        };
        let combination_instructions = if own_combination.is_empty() {
            structure_combination.to_string()
        } else {
            own_combination
        };

        let system_instructions = resolve_system(&spec, &task)?;

        Ok(Self {
            name,
            model: spec.model,
            current_task: task.clone(),
            original_task: task,
            combination_instructions,
            system_instructions,
            persona: spec.persona,
            params: spec.params,
            history: Vec::new(),
            completion: spec.completion,
        })
    }

    /// Run one turn with `previous` as formatted context.
    ///
    /// With empty context the prompt is the bare task; otherwise the task is
    /// followed by the rendered combination instructions. An empty answer is
    /// a [`CompletionError`] of kind `Empty`. History grows only on success.
    pub async fn process(&mut self, previous: &str) -> Result<String, CompletionError> {
        let user = if previous.trim().is_empty() {
            self.original_task.clone()
        } else {
            let combination = template::render(
                &self.combination_instructions,
                &[
                    (PREVIOUS_RESPONSES, Some(previous)),
                    (TASK, Some(&self.original_task)),
                ],
            );
            format!("{}\n{}", self.original_task, combination)
        };
        self.current_task = user.clone();

        let request = CompletionRequest {
            model: self.model.clone(),
            system: self.system_instructions.clone(),
            user,
            params: self.params.clone(),
        };
        let response = self.completion.complete(request.clone()).await?;
        if response.trim().is_empty() {
            return Err(CompletionError::empty());
        }

        self.history.push(HistoryEntry {
            prompts: Prompts {
                system: request.system,
                user: request.user,
            },
            response: response.clone(),
            model: request.model,
            params: request.params,
            recorded_at: Utc::now(),
        });
        Ok(response)
    }

    /// Re-task the participant, then run one turn.
    pub async fn process_task(
        &mut self,
        task: impl Into<String>,
        previous: &str,
    ) -> Result<String, CompletionError> {
        self.original_task = task.into();
        self.process(previous).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn original_task(&self) -> &str {
        &self.original_task
    }

    /// The user prompt of the most recent turn.
    pub fn current_task(&self) -> &str {
        &self.current_task
    }

    pub fn combination_instructions(&self) -> &str {
        &self.combination_instructions
    }

    pub fn system_instructions(&self) -> Option<&str> {
        self.system_instructions.as_deref()
    }

    pub fn persona(&self) -> Option<&str> {
        self.persona.as_deref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            name: self.name.clone(),
            model: self.model.clone(),
            original_task: self.original_task.clone(),
            current_task: self.current_task.clone(),
            combination_instructions: self.combination_instructions.clone(),
            system_instructions: self.system_instructions.clone(),
            persona: self.persona.clone(),
            params: self.params.clone(),
            history: self.history.clone(),
        }
    }
}

fn resolve_system(spec: &ParticipantSpec, task: &str) -> DeliberationResult<Option<String>> {
    let values = [(TASK, Some(task))];
    match (&spec.system, &spec.persona) {
        (Some(_), Some(_)) => Err(DeliberationError::ConflictingInstructions(
            "a participant takes either system instructions or a persona, not both".to_string(),
        )),
        (Some(system), None) => Ok(Some(template::render(system, &values))),
        (None, Some(persona)) => {
            let source = spec
                .persona_template
                .clone()
                .unwrap_or_else(Instructions::default_preset);
            let wrapper = source.resolve(PresetKind::PersonaTemplate)?;
            if !template::has_placeholder(&wrapper, PERSONA) {
                return Err(DeliberationError::InvalidPersonaTemplate { template: wrapper });
            }
            let with_persona = template::render(&wrapper, &[(PERSONA, Some(persona))]);
            Ok(Some(template::render(&with_persona, &values)))
        }
        (None, None) => Ok(None),
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::fakes::{EchoCompletion, ScriptedCompletion};

    fn echo() -> Arc<dyn Completion> {
        Arc::new(EchoCompletion::new())
    }

    #[test]
    fn test_standalone_requires_task() {
        let spec = ParticipantSpec::new(echo()).with_name("a");
        let err = Participant::standalone(spec).unwrap_err();
        assert!(matches!(
            err,
            DeliberationError::MissingTask { ref participant } if participant == "a"
        ));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn bind_with_logs(spec: ParticipantSpec, structure_task: &str) -> (Participant, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let p = tracing::subscriber::with_default(subscriber, || {
            Participant::bind(spec, "a".into(), Some(structure_task), "C").unwrap()
        });
        let logs = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        (p, logs)
    }

    #[test]
    fn test_structure_task_overwrites_participant_task() {
        let spec = ParticipantSpec::new(echo()).with_task("own");
        let (p, logs) = bind_with_logs(spec, "shared");
        assert_eq!(p.original_task(), "shared");
        assert!(logs.contains("WARN"), "logs: {logs}");
        assert!(logs.contains("overwriting participant task"));
    }

    #[test]
    fn test_overwrite_warns_even_when_tasks_match() {
        let spec = ParticipantSpec::new(echo()).with_task("same");
        let (p, logs) = bind_with_logs(spec, "same");
        assert_eq!(p.original_task(), "same");
        assert!(logs.contains("WARN"), "logs: {logs}");

        let (_, logs) = bind_with_logs(ParticipantSpec::new(echo()), "same");
        assert!(!logs.contains("overwriting participant task"));
    }

    #[test]
    fn test_participant_task_used_when_structure_has_none() {
        let spec = ParticipantSpec::new(echo()).with_task("own");
        let p = Participant::bind(spec, "a".into(), None, "C").unwrap();
        assert_eq!(p.original_task(), "own");
    }

    #[test]
    fn test_blank_tasks_count_as_unset() {
        let spec = ParticipantSpec::new(echo()).with_task("   ");
        let err = Participant::bind(spec, "a".into(), Some(""), "C").unwrap_err();
        assert!(matches!(err, DeliberationError::MissingTask { .. }));
    }

    #[test]
    fn test_own_combination_instructions_win() {
        let spec = ParticipantSpec::new(echo())
            .with_combination_instructions(Instructions::literal("agent 2 instructions"));
        let p = Participant::bind(spec, "a".into(), Some("t"), "shared").unwrap();
        assert_eq!(p.combination_instructions(), "agent 2 instructions");

        let spec = ParticipantSpec::new(echo());
        let p = Participant::bind(spec, "b".into(), Some("t"), "shared").unwrap();
        assert_eq!(p.combination_instructions(), "shared");
    }

    #[test]
    fn test_persona_rendered_through_template_and_task() {
        let spec = ParticipantSpec::new(echo())
            .with_persona("a farmer thinking about ${task}")
            .with_persona_template(Instructions::literal("Be ${persona}. Task: ${task}"));
        let p = Participant::bind(spec, "a".into(), Some("crops"), "C").unwrap();
        // ${task} inside the persona is rendered in the task pass
        assert_eq!(
            p.system_instructions(),
            Some("Be a farmer thinking about crops. Task: crops")
        );
    }

    #[test]
    fn test_literal_persona_template_needs_placeholder() {
        let spec = ParticipantSpec::new(echo())
            .with_persona("a farmer")
            .with_persona_template(Instructions::literal("Act as someone"));
        let err = Participant::bind(spec, "a".into(), Some("t"), "C").unwrap_err();
        assert!(matches!(err, DeliberationError::InvalidPersonaTemplate { .. }));
    }

    #[test]
    fn test_persona_and_system_conflict() {
        let spec = ParticipantSpec::new(echo())
            .with_persona("a farmer")
            .with_system_instructions("be terse");
        let err = Participant::bind(spec, "a".into(), Some("t"), "C").unwrap_err();
        assert!(matches!(err, DeliberationError::ConflictingInstructions(_)));
    }

    #[test]
    fn test_system_instructions_task_placeholder_rendered() {
        let spec = ParticipantSpec::new(echo()).with_system_instructions("Expert on ${task}.");
        let p = Participant::bind(spec, "a".into(), Some("tax law."), "C").unwrap();
        assert_eq!(p.system_instructions(), Some("Expert on tax law."));
    }

    #[tokio::test]
    async fn test_process_without_context_sends_bare_task() {
        let fake = Arc::new(ScriptedCompletion::new(vec![Ok("answer".to_string())]));
        let spec = ParticipantSpec::new(fake.clone()).with_task("Say hi");
        let mut p = Participant::standalone(spec).unwrap();

        let out = p.process("").await.unwrap();
        assert_eq!(out, "answer");
        assert_eq!(p.current_task(), "Say hi");
        assert_eq!(p.history().len(), 1);
        assert_eq!(p.history()[0].prompts.user, "Say hi");
        assert_eq!(fake.requests()[0].user, "Say hi");
    }

    #[tokio::test]
    async fn test_process_with_context_appends_combination() {
        let fake = Arc::new(ScriptedCompletion::new(vec![Ok("ok".to_string())]));
        let spec = ParticipantSpec::new(fake).with_task("Task");
        let mut p = Participant::standalone(spec).unwrap();

        p.process("Response 0: earlier").await.unwrap();
        assert_eq!(
            p.current_task(),
            "Task\nUSE PREVIOUS RESPONSES TO COMPLETE THE TASK\nHere are the previous responses: \n <start>\n Response 0: earlier\n <end>"
        );
    }

    #[tokio::test]
    async fn test_empty_answer_is_error_and_not_recorded() {
        let fake = Arc::new(ScriptedCompletion::new(vec![Ok("  ".to_string())]));
        let spec = ParticipantSpec::new(fake).with_task("Task");
        let mut p = Participant::standalone(spec).unwrap();

        let err = p.process("").await.unwrap_err();
        assert!(err.is_transient());
        assert!(p.history().is_empty());
    }

    #[tokio::test]
    async fn test_process_task_retasks() {
        let spec = ParticipantSpec::new(echo()).with_task("first");
        let mut p = Participant::standalone(spec).unwrap();
        p.process_task("second", "").await.unwrap();
        assert_eq!(p.original_task(), "second");
        assert_eq!(p.info().history.len(), 1);
    }

    #[tokio::test]
    async fn test_params_forwarded_and_recorded() {
        let fake = Arc::new(ScriptedCompletion::replies(["ok"]));
        let mut params = Params::new();
        params.insert("temperature".to_string(), json!(0.2));
        params.insert("max_tokens".to_string(), json!(64));
        let spec = ParticipantSpec::new(fake.clone())
            .with_task("Task")
            .with_params(params.clone());
        let mut p = Participant::standalone(spec).unwrap();

        p.process("").await.unwrap();
        assert_eq!(fake.requests()[0].params, params);
        assert_eq!(p.history()[0].params, params);
        assert_eq!(p.info().params["max_tokens"], json!(64));
    }
}
