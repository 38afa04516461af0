//! Dependency graph structure.
//!
//! Participants are nodes; an edge `(a, b)` means "b reads a's output", so
//! a runs before b. The execution order is computed with Kahn's algorithm
//! when the graph is built, and each participant only sees the outputs of
//! its direct predecessors.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tracing::{debug, warn, Instrument};

use crate::error::{DeliberationError, DeliberationResult};
use crate::moderator::ModeratorSpec;
use crate::obs;
use crate::participant::ParticipantSpec;
use crate::structure::{record, Structure, StructureConfig, StructureCore, StructureKind};
use crate::template::format_labeled;

/// Participants connected by data dependencies.
#[derive(Debug)]
pub struct Graph {
    core: StructureCore,
    order: Vec<usize>,
    predecessors: Vec<Vec<usize>>,
    labels: Vec<String>,
}

impl Graph {
    /// List form: participants by position, edges as index pairs.
    ///
    /// Predecessor outputs are labelled `Response {index}`.
    pub fn new(
        participants: Vec<ParticipantSpec>,
        edges: Vec<(usize, usize)>,
        config: StructureConfig,
        moderator: Option<ModeratorSpec>,
    ) -> DeliberationResult<Self> {
        let len = participants.len();
        for &(from, to) in &edges {
            if from >= len || to >= len {
                return Err(DeliberationError::EdgeOutOfRange { from, to, len });
            }
        }
        let labels = (0..len).map(|i| format!("Response {i}")).collect();
        let names: Vec<String> = participants
            .iter()
            .enumerate()
            .map(|(i, spec)| spec.name_or(|| format!("participant-{i}")))
            .collect();
        Self::build(participants, &names, edges, labels, config, moderator)
    }

    /// Named form: participants keyed by name, edges as name pairs.
    ///
    /// Normalised to the list form in the given participant order. Each
    /// participant takes its key as its name. Predecessor outputs are
    /// labelled `Response from {name}`.
    pub fn from_named(
        participants: Vec<(String, ParticipantSpec)>,
        edges: Vec<(String, String)>,
        config: StructureConfig,
        moderator: Option<ModeratorSpec>,
    ) -> DeliberationResult<Self> {
        let mut index: HashMap<String, usize> = HashMap::with_capacity(participants.len());
        for (i, (name, _)) in participants.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(DeliberationError::DuplicateParticipant { name: name.clone() });
            }
        }

        let lookup = |name: &str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| DeliberationError::UnknownParticipant {
                    name: name.to_string(),
                })
        };
        let edges = edges
            .iter()
            .map(|(from, to)| Ok((lookup(from)?, lookup(to)?)))
            .collect::<DeliberationResult<Vec<_>>>()?;

        let names: Vec<String> = participants.iter().map(|(name, _)| name.clone()).collect();
        let labels = names.iter().map(|n| format!("Response from {n}")).collect();
        let specs = participants
            .into_iter()
            .map(|(name, spec)| spec.with_name(name))
            .collect();
        Self::build(specs, &names, edges, labels, config, moderator)
    }

    fn build(
        specs: Vec<ParticipantSpec>,
        names: &[String],
        edges: Vec<(usize, usize)>,
        labels: Vec<String>,
        config: StructureConfig,
        moderator: Option<ModeratorSpec>,
    ) -> DeliberationResult<Self> {
        if let Some(&(node, _)) = edges.iter().find(|(from, to)| from == to) {
            return Err(DeliberationError::SelfLoop {
                participant: names[node].clone(),
            });
        }

        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
        let mut unique: Vec<(usize, usize)> = Vec::with_capacity(edges.len());
        for (from, to) in edges {
            if !predecessors[to].contains(&from) {
                predecessors[to].push(from);
                unique.push((from, to));
            }
        }
        for preds in &mut predecessors {
            preds.sort_unstable();
        }

        let order = topological_order(specs.len(), &unique)?;

        let config = StructureConfig {
            cycles: 1,
            ..config
        };
        let core = StructureCore::build(StructureKind::Graph, specs, config, 1, moderator)?;
        debug!(order = ?order, "graph execution order");

        Ok(Self {
            core,
            order,
            predecessors,
            labels,
        })
    }

    /// Participant indices in execution order.
    pub fn execution_order(&self) -> &[usize] {
        &self.order
    }

    /// Direct predecessors of participant `idx`, ascending.
    pub fn predecessors(&self, idx: usize) -> &[usize] {
        self.predecessors.get(idx).map(Vec::as_slice).unwrap_or(&[])
    }

    async fn run(&mut self) -> DeliberationResult<Option<String>> {
        let start = self.core.begin().await?;
        let core = &mut self.core;
        let run_id = core.run_id();
        let mut outputs: Vec<Option<String>> = vec![None; core.participants.len()];

        for &idx in &self.order {
            let inputs: Vec<(&str, &str)> = self.predecessors[idx]
                .iter()
                .filter_map(|&p| outputs[p].as_deref().map(|text| (self.labels[p].as_str(), text)))
                .collect();
            let context = format_labeled(&inputs);
            let participant = &mut core.participants[idx];
            if context.is_empty() && !self.predecessors[idx].is_empty() {
                warn!(
                    participant = %participant.name(),
                    "all predecessors failed; running with the bare task"
                );
            }

            let result = participant.process(&context).await;
            let response = record(run_id, participant.name(), 0, result);
            outputs[idx] = response.clone();
            core.responses.push(response);
        }

        let labelled: Vec<(&str, &str)> = self
            .order
            .iter()
            .filter_map(|&i| outputs[i].as_deref().map(|text| (self.labels[i].as_str(), text)))
            .collect();
        let block = format_labeled(&labelled);
        self.core.finish(start, block).await
    }
}

#[async_trait]
impl Structure for Graph {
    fn core(&self) -> &StructureCore {
        &self.core
    }

    async fn process(&mut self) -> DeliberationResult<Option<String>> {
        let span = obs::run_span(self.core.run_id(), StructureKind::Graph.as_str());
        self.run().instrument(span).await
    }
}

/// Kahn's algorithm over `len` nodes.
///
/// Among ready nodes the lowest index goes first. If fewer than `len`
/// nodes can be scheduled the edges contain a cycle.
pub fn topological_order(len: usize, edges: &[(usize, usize)]) -> DeliberationResult<Vec<usize>> {
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); len];
    let mut in_degree = vec![0usize; len];
    for &(from, to) in edges {
        successors[from].push(to);
        in_degree[to] += 1;
    }

    let mut ready: BTreeSet<usize> = (0..len).filter(|&n| in_degree[n] == 0).collect();
    let mut order = Vec::with_capacity(len);

    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &next in &successors[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() != len {
        return Err(DeliberationError::DependencyCycle {
            scheduled: order.len(),
            total: len,
        });
    }
    Ok(order)
}
