//! Relay structure: windowing, precedence and end-to-end behaviour.

use std::sync::Arc;
use std::time::Duration;

use deliberate_core::fakes::{RoutedCompletion, ScriptedCompletion};
use deliberate_core::{
    Chain, Completion, Instructions, ModeratorSpec, ParticipantSpec, PresetKind, Structure,
    StructureConfig,
};

fn routed(reply: &str) -> Arc<RoutedCompletion> {
    Arc::new(RoutedCompletion::new(reply, Duration::ZERO))
}

#[tokio::test]
async fn test_three_participants_window_one() {
    let fakes: Vec<Arc<RoutedCompletion>> =
        ["alpha", "beta", "gamma"].into_iter().map(routed).collect();
    let specs = fakes
        .iter()
        .map(|f| ParticipantSpec::new(f.clone() as Arc<dyn Completion>))
        .collect();

    let mut chain = Chain::new(
        specs,
        StructureConfig::new().with_task("Name a colour").with_last_n(1),
        None,
    )
    .unwrap();
    let out = chain.process().await.unwrap();

    assert_eq!(chain.responses().len(), 3);
    assert_eq!(out.as_deref(), Some("gamma"));

    let third = fakes[2].last_user_prompt().unwrap();
    assert!(third.contains("beta"));
    assert!(!third.contains("alpha"));
    assert!(third.contains("Response 0: beta"));
}

#[tokio::test]
async fn test_window_shows_k_most_recent_in_order() {
    let fakes: Vec<Arc<RoutedCompletion>> =
        ["r0", "r1", "r2", "r3", "r4"].into_iter().map(routed).collect();
    let specs = fakes
        .iter()
        .map(|f| ParticipantSpec::new(f.clone() as Arc<dyn Completion>))
        .collect();

    let mut chain = Chain::new(
        specs,
        StructureConfig::new().with_task("T").with_last_n(2),
        None,
    )
    .unwrap();
    chain.process().await.unwrap();

    let last = fakes[4].last_user_prompt().unwrap();
    assert!(last.contains("Response 0: r2\nResponse 1: r3"));
    assert!(!last.contains("r1"));
    assert!(!last.contains("r0"));
}

#[tokio::test]
async fn test_bespoke_combination_instructions_survive_structure_preset() {
    let own = routed("x");
    let shared = routed("y");
    let mine = Instructions::literal("Mine: ${previous_responses}");
    let mut chain = Chain::new(
        vec![
            ParticipantSpec::new(own.clone()).with_combination_instructions(mine.clone()),
            ParticipantSpec::new(shared.clone()),
            ParticipantSpec::new(own.clone()).with_combination_instructions(mine),
        ],
        StructureConfig::new()
            .with_task("T")
            .with_combination_instructions(Instructions::lookup(PresetKind::Combination, "voting")),
        None,
    )
    .unwrap();

    let participants = chain.participants();
    assert_eq!(participants[0].combination_instructions(), "Mine: ${previous_responses}");
    assert!(participants[1].combination_instructions().contains("VOTING INSTRUCTIONS"));

    chain.process().await.unwrap();
    assert_eq!(own.last_user_prompt().unwrap(), "T\nMine: Response 0: y");
}

#[tokio::test]
async fn test_moderated_chain_appends_synthesis() {
    let a = Arc::new(ScriptedCompletion::replies(["first"]));
    let b = Arc::new(ScriptedCompletion::replies(["second"]));
    let m = Arc::new(ScriptedCompletion::replies(["merged"]));

    let mut chain = Chain::new(
        vec![ParticipantSpec::new(a), ParticipantSpec::new(b)],
        StructureConfig::new().with_task("Plan a trip"),
        Some(ModeratorSpec::new(m.clone()).with_persona(Instructions::default_preset())),
    )
    .unwrap();
    let out = chain.process().await.unwrap();

    assert_eq!(out.as_deref(), Some("merged"));
    assert_eq!(chain.responses().len(), 3);
    assert_eq!(chain.responses()[2].as_deref(), Some("merged"));

    let prompt = m.requests()[0].clone();
    assert!(prompt.user.contains("Response 0: first\nResponse 1: second"));
    assert!(prompt.system.as_deref().unwrap().contains("Plan a trip"));
}

#[tokio::test]
async fn test_rerun_accumulates_responses() {
    let fake = Arc::new(ScriptedCompletion::replies(["one", "two"]));
    let mut chain = Chain::new(
        vec![ParticipantSpec::new(fake)],
        StructureConfig::new().with_task("T"),
        None,
    )
    .unwrap();

    chain.process().await.unwrap();
    let out = chain.process().await.unwrap();
    assert_eq!(out.as_deref(), Some("two"));
    assert_eq!(chain.responses().len(), 2);
}
