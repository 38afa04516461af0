//! Read-only inspection snapshot of a structure.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::moderator::ModeratorInfo;
use crate::participant::ParticipantInfo;
use crate::structure::{StructureCore, StructureKind};

/// Everything a caller may want to inspect after a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureInfo {
    pub run_id: Uuid,
    pub kind: StructureKind,
    pub processed: bool,
    pub task: Option<String>,
    pub combination_instructions: String,
    pub cycles: usize,
    pub last_n: usize,
    pub shuffle: bool,
    pub responses: Vec<Option<String>>,
    pub final_response: Option<String>,
    pub moderator: Option<ModeratorInfo>,
    pub participants: Vec<ParticipantInfo>,
}

impl StructureInfo {
    pub(crate) fn from_core(core: &StructureCore) -> Self {
        Self {
            run_id: core.run_id(),
            kind: core.kind(),
            processed: core.is_processed(),
            task: core.task().map(str::to_string),
            combination_instructions: core.combination_instructions().to_string(),
            cycles: core.cycles(),
            last_n: core.last_n(),
            shuffle: core.shuffle(),
            responses: core.responses().to_vec(),
            final_response: core.final_response().map(str::to_string),
            moderator: core.moderator().map(|m| m.info()),
            participants: core.participants().iter().map(|p| p.info()).collect(),
        }
    }

    /// Pretty JSON rendering for CLI output.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
