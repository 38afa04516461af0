//! Error types for structure construction and execution.

use thiserror::Error;

use crate::completion::CompletionError;

/// Errors produced while configuring or running a deliberation structure.
///
/// Every variant is fatal. Non-fatal conditions (precedence overwrites,
/// failed participant turns, empty context) are logged, never returned.
#[derive(Debug, Error)]
pub enum DeliberationError {
    /// Neither the structure nor a participant carries a task.
    #[error("no task specified for participant {participant} or for the structure")]
    MissingTask { participant: String },

    /// Neither the structure nor the moderator carries a task.
    #[error("no task specified for the moderator or for the structure")]
    MissingModeratorTask,

    /// A structure needs at least one participant.
    #[error("{structure} requires at least one participant")]
    NoParticipants { structure: String },

    /// `cycles` must be at least 1.
    #[error("cycles must be at least 1, got {cycles}")]
    InvalidCycles { cycles: usize },

    /// The context window must be at least 1.
    #[error("context window (last_n) must be at least 1, got {last_n}")]
    InvalidWindow { last_n: usize },

    /// A debate runs between exactly two participants.
    #[error("debate requires exactly 2 participants, got {found}")]
    DebateParticipantCount { found: usize },

    /// An index-form edge points outside the participant list.
    #[error("edge ({from}, {to}) references a participant outside 0..{len}")]
    EdgeOutOfRange { from: usize, to: usize, len: usize },

    /// A name-form edge references a participant that does not exist.
    #[error("edge references unknown participant: {name}")]
    UnknownParticipant { name: String },

    /// Two participants were registered under the same name.
    #[error("participant name registered twice: {name}")]
    DuplicateParticipant { name: String },

    /// An edge from a participant to itself.
    #[error("self-loop on participant {participant} is not allowed in a dependency graph")]
    SelfLoop { participant: String },

    /// Kahn's algorithm could not schedule every participant.
    #[error("dependency graph contains a cycle: scheduled {scheduled} of {total} participants")]
    DependencyCycle { scheduled: usize, total: usize },

    /// A literal persona template has no `${persona}` placeholder.
    #[error("persona template must contain a ${{persona}} placeholder or name a preset: {template}")]
    InvalidPersonaTemplate { template: String },

    /// An explicit preset name that is not in the table for its kind.
    #[error("unknown {kind} preset: {name}")]
    UnknownPreset { kind: String, name: String },

    /// Mutually exclusive instruction sources were both supplied.
    #[error("conflicting instructions: {0}")]
    ConflictingInstructions(String),

    /// `auto` system-instruction generation never produced a valid answer.
    #[error("could not generate valid system instructions after {attempts} attempts")]
    AutoInstructionsExhausted { attempts: u32 },

    /// A completion failure that cannot be absorbed as an absent response.
    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),
}

/// Result type for deliberation operations.
pub type DeliberationResult<T> = std::result::Result<T, DeliberationError>;
