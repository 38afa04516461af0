//! Dependency graph structure: scheduling and context routing.

use std::sync::Arc;
use std::time::Duration;

use deliberate_core::fakes::{FailingCompletion, RoutedCompletion, ScriptedCompletion};
use deliberate_core::{
    Completion, CompletionErrorKind, DeliberationError, Graph, ModeratorSpec, ParticipantSpec,
    Structure, StructureConfig,
};

fn routed(reply: &str) -> Arc<RoutedCompletion> {
    Arc::new(RoutedCompletion::new(reply, Duration::ZERO))
}

fn named(fakes: &[(&str, Arc<RoutedCompletion>)]) -> Vec<(String, ParticipantSpec)> {
    fakes
        .iter()
        .map(|(name, f)| (name.to_string(), ParticipantSpec::new(f.clone() as Arc<dyn Completion>)))
        .collect()
}

#[tokio::test]
async fn test_named_graph_runs_in_topological_order() {
    let liberal = routed("Response from you are a liberal");
    let conservative = routed("Response from you are a conservative");
    let libertarian = routed("Response from you are a libertarian");

    let mut graph = Graph::from_named(
        named(&[
            ("libertarian", libertarian.clone()),
            ("conservative", conservative.clone()),
            ("liberal", liberal.clone()),
        ]),
        vec![
            ("liberal".into(), "conservative".into()),
            ("liberal".into(), "libertarian".into()),
            ("conservative".into(), "libertarian".into()),
        ],
        StructureConfig::new().with_task("Discuss taxes"),
        None,
    )
    .unwrap();

    assert_eq!(graph.execution_order(), &[2, 1, 0]);
    let out = graph.process().await.unwrap();

    assert_eq!(out.as_deref(), Some("Response from you are a libertarian"));
    assert_eq!(
        graph.responses(),
        &[
            Some("Response from you are a liberal".to_string()),
            Some("Response from you are a conservative".to_string()),
            Some("Response from you are a libertarian".to_string()),
        ]
    );

    let last = libertarian.last_user_prompt().unwrap();
    assert!(last.contains("Response from liberal: Response from you are a liberal"));
    assert!(last.contains("Response from conservative: Response from you are a conservative"));
    assert_eq!(liberal.last_user_prompt().unwrap(), "Discuss taxes");
}

#[tokio::test]
async fn test_context_holds_direct_predecessors_only() {
    // 0 -> 1 -> 2 and 0 -> 3: node 2 must not see node 0.
    let fakes: Vec<Arc<RoutedCompletion>> =
        ["zero", "one", "two", "three"].into_iter().map(routed).collect();
    let specs = fakes
        .iter()
        .map(|f| ParticipantSpec::new(f.clone() as Arc<dyn Completion>))
        .collect();

    let mut graph = Graph::new(
        specs,
        vec![(0, 1), (1, 2), (0, 3)],
        StructureConfig::new().with_task("T"),
        None,
    )
    .unwrap();
    graph.process().await.unwrap();

    let two = fakes[2].last_user_prompt().unwrap();
    assert!(two.contains("Response 1: one"));
    assert!(!two.contains("zero"));

    let three = fakes[3].last_user_prompt().unwrap();
    assert!(three.contains("Response 0: zero"));
    assert!(!three.contains("one"));
}

#[tokio::test]
async fn test_single_edge_matches_default_combination_format() {
    let first = routed("Social media has both positive and negative impacts on society.");
    let second = routed("ok");
    let task = "Describe the impact of social media on society in 50 words.";

    let mut graph = Graph::new(
        vec![ParticipantSpec::new(first), ParticipantSpec::new(second)],
        vec![(0, 1)],
        StructureConfig::new().with_task(task),
        None,
    )
    .unwrap();
    graph.process().await.unwrap();

    let expected = "Describe the impact of social media on society in 50 words.\n\
USE PREVIOUS RESPONSES TO COMPLETE THE TASK\n\
Here are the previous responses: \n <start>\n Response 0: Social media has both positive and negative impacts on society.\n <end>";
    assert_eq!(graph.participants()[1].current_task(), expected);
    assert_eq!(graph.participants()[0].current_task(), task);
}

#[test]
fn test_cycle_fails_construction_via_length_check() {
    let specs = (0..3)
        .map(|_| ParticipantSpec::new(routed("x") as Arc<dyn Completion>))
        .collect();
    let err = Graph::new(
        specs,
        vec![(0, 1), (1, 2), (2, 0)],
        StructureConfig::new().with_task("T"),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, DeliberationError::DependencyCycle { scheduled: 0, total: 3 }));
}

#[tokio::test]
async fn test_failed_predecessor_yields_bare_task() {
    let bad: Arc<dyn Completion> = Arc::new(FailingCompletion::new(CompletionErrorKind::Client));
    let after = routed("fine");
    let mut graph = Graph::new(
        vec![ParticipantSpec::new(bad), ParticipantSpec::new(after.clone())],
        vec![(0, 1)],
        StructureConfig::new().with_task("T"),
        None,
    )
    .unwrap();
    graph.process().await.unwrap();

    assert_eq!(graph.responses(), &[None, Some("fine".to_string())]);
    assert_eq!(after.last_user_prompt().unwrap(), "T");
}

#[tokio::test]
async fn test_moderator_receives_labelled_block_in_topological_order() {
    let moderator = Arc::new(ScriptedCompletion::replies(["Moderated final response"]));
    let mut graph = Graph::from_named(
        named(&[("b", routed("from b")), ("a", routed("from a"))]),
        vec![("a".into(), "b".into())],
        StructureConfig::new().with_task("T"),
        Some(ModeratorSpec::new(moderator.clone())),
    )
    .unwrap();
    let out = graph.process().await.unwrap();

    assert_eq!(out.as_deref(), Some("Moderated final response"));
    assert_eq!(graph.responses().len(), 3);
    assert_eq!(graph.responses()[2].as_deref(), Some("Moderated final response"));

    let prompt = moderator.requests()[0].user.clone();
    assert!(prompt.contains("Response from a: from a\nResponse from b: from b"));
}
