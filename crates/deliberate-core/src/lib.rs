//! Deliberate core: multi-participant deliberation structures.
//!
//! A set of participants, each backed by a [`Completion`], is run through
//! one of four topologies:
//!
//! - [`Chain`]: sequential relay with a sliding context window
//! - [`Ensemble`]: concurrent fan-out with ordered results and retry
//! - [`Debate`]: two debaters alternating turns
//! - [`Graph`]: a dependency DAG executed in topological order
//!
//! An optional [`Moderator`] merges the outputs into one final answer.

pub mod completion;
pub mod error;
pub mod fakes;
pub mod info;
pub mod moderator;
pub mod obs;
pub mod participant;
pub mod presets;
pub mod retry;
pub mod structure;
pub mod telemetry;
pub mod template;

pub use completion::{Completion, CompletionError, CompletionErrorKind, CompletionRequest, Params};
pub use error::{DeliberationError, DeliberationResult};
pub use info::StructureInfo;
pub use moderator::{Moderator, ModeratorInfo, ModeratorSpec, ModeratorSystem};
pub use participant::{HistoryEntry, Participant, ParticipantInfo, ParticipantSpec};
pub use presets::{Instructions, PresetKind};
pub use retry::RetryPolicy;
pub use structure::{
    Chain, Debate, Ensemble, Graph, Structure, StructureConfig, StructureCore, StructureKind,
};

/// Crate version, for CLI banners and run metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
