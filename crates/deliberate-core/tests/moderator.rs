//! Moderator behaviour inside structures.

use std::sync::Arc;

use deliberate_core::fakes::{FailingCompletion, ScriptedCompletion};
use deliberate_core::{
    Chain, CompletionError, CompletionErrorKind, DeliberationError, Ensemble, Instructions,
    ModeratorSpec, ParticipantSpec, PresetKind, Structure, StructureConfig,
};

#[tokio::test]
async fn test_auto_instructions_resolved_before_participants_run() {
    let participant = Arc::new(ScriptedCompletion::replies(["answer"]));
    let moderator = Arc::new(ScriptedCompletion::new(vec![
        Ok("System Instructions: Be even-handed.".to_string()),
        Ok("summary".to_string()),
    ]));

    let mut chain = Chain::new(
        vec![ParticipantSpec::new(participant.clone())],
        StructureConfig::new().with_task("Choose a name"),
        Some(ModeratorSpec::new(moderator.clone()).with_auto_system_instructions()),
    )
    .unwrap();
    let out = chain.process().await.unwrap();

    assert_eq!(out.as_deref(), Some("summary"));
    let requests = moderator.requests();
    assert!(requests[0].user.contains("Choose a name"));
    assert_eq!(requests[1].system.as_deref(), Some("Be even-handed."));
    assert_eq!(
        chain.core().moderator().unwrap().system_instructions(),
        Some("Be even-handed.")
    );
}

#[tokio::test]
async fn test_auto_instruction_exhaustion_aborts_run() {
    let participant = Arc::new(ScriptedCompletion::replies(["unused"]));
    let moderator = Arc::new(ScriptedCompletion::new(
        (0..10).map(|_| Ok("no marker".to_string())).collect(),
    ));

    let mut chain = Chain::new(
        vec![ParticipantSpec::new(participant.clone())],
        StructureConfig::new().with_task("T"),
        Some(ModeratorSpec::new(moderator).with_auto_system_instructions()),
    )
    .unwrap();
    let err = chain.process().await.unwrap_err();

    assert!(matches!(err, DeliberationError::AutoInstructionsExhausted { attempts: 10 }));
    assert_eq!(participant.calls(), 0);
    assert!(chain.responses().is_empty());
}

#[test]
fn test_moderator_task_precedence_inside_structure() {
    let p = Arc::new(ScriptedCompletion::default());
    let m = Arc::new(ScriptedCompletion::default());

    let chain = Chain::new(
        vec![ParticipantSpec::new(p.clone())],
        StructureConfig::new().with_task("structure task"),
        Some(ModeratorSpec::new(m.clone()).with_task("moderator task")),
    )
    .unwrap();
    let moderator = chain.core().moderator().unwrap();
    assert_eq!(moderator.task(), "moderator task");
    assert_eq!(chain.participants()[0].original_task(), "structure task");

    // Participants carry the task; the moderator has none and neither does
    // the structure.
    let err = Chain::new(
        vec![ParticipantSpec::new(p).with_task("own")],
        StructureConfig::new(),
        Some(ModeratorSpec::new(m)),
    )
    .unwrap_err();
    assert!(matches!(err, DeliberationError::MissingModeratorTask));
}

#[tokio::test]
async fn test_voting_presets_and_failed_synthesis() {
    let p = Arc::new(ScriptedCompletion::replies(["A", "B"]));
    let m = Arc::new(FailingCompletion::new(CompletionErrorKind::ServerError));

    let mut ensemble = Ensemble::new(
        vec![ParticipantSpec::new(p.clone()), ParticipantSpec::new(p)],
        StructureConfig::new().with_task("Vote A or B"),
        Some(
            ModeratorSpec::new(m.clone())
                .with_persona(Instructions::lookup(PresetKind::ModeratorPersona, "voting"))
                .with_combination_instructions(Instructions::lookup(
                    PresetKind::ModeratorCombination,
                    "voting",
                )),
        ),
    )
    .unwrap();
    let out = ensemble.process().await.unwrap();

    // synthesis failure is absorbed: absent final entry, run still succeeds
    assert_eq!(out, None);
    assert_eq!(ensemble.responses().len(), 3);
    assert_eq!(ensemble.responses()[2], None);
    assert_eq!(m.calls(), 1);

    let info = ensemble.info();
    let moderator = info.moderator.unwrap();
    assert!(moderator.persona.unwrap().contains("Vote A or B"));
    assert!(moderator.last_prompt.unwrap().contains("votes"));
}

#[tokio::test]
async fn test_permanent_auto_failure_surfaces_completion_error() {
    let m = Arc::new(ScriptedCompletion::new(vec![Err(CompletionError::client("bad key"))]));
    let mut chain = Chain::new(
        vec![ParticipantSpec::new(Arc::new(ScriptedCompletion::default()))],
        StructureConfig::new().with_task("T"),
        Some(ModeratorSpec::new(m).with_auto_system_instructions()),
    )
    .unwrap();

    let err = chain.process().await.unwrap_err();
    assert!(matches!(
        err,
        DeliberationError::Completion(ref e) if e.kind == CompletionErrorKind::Client
    ));
}
