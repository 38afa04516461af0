//! Structured lifecycle events for structure runs.
//!
//! Every run gets a `deliberate.run` span tagged with its run id and
//! structure kind. Events are emitted at `info!` with an `event` field so
//! JSON log consumers can filter on them.

use tracing::{info, warn, Span};
use uuid::Uuid;

/// Span covering one structure run.
///
/// Attach it to the run future with `tracing::Instrument` so every event
/// emitted by participants carries the run id.
pub fn run_span(run_id: Uuid, kind: &str) -> Span {
    tracing::info_span!("deliberate.run", run_id = %run_id, kind = %kind)
}

/// Emit event: structure run started.
pub fn emit_structure_started(run_id: Uuid, kind: &str, participants: usize, cycles: usize) {
    info!(
        event = "structure.started",
        run_id = %run_id,
        kind = %kind,
        participants = participants,
        cycles = cycles,
    );
}

/// Emit event: one participant turn finished (successfully or not).
pub fn emit_participant_responded(run_id: Uuid, participant: &str, cycle: usize, success: bool) {
    info!(
        event = "participant.responded",
        run_id = %run_id,
        participant = %participant,
        cycle = cycle,
        success = success,
    );
}

/// Emit event: a failed participant turn (warning level).
pub fn emit_participant_failed(run_id: Uuid, participant: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "participant.failed",
        run_id = %run_id,
        participant = %participant,
        error = %error,
    );
}

/// Emit event: the moderator produced (or failed to produce) a final answer.
pub fn emit_synthesis_finished(run_id: Uuid, inputs: usize, success: bool) {
    info!(
        event = "synthesis.finished",
        run_id = %run_id,
        inputs = inputs,
        success = success,
    );
}

/// Emit event: structure run finished.
pub fn emit_structure_finished(run_id: Uuid, duration_ms: u64, responses: usize, absent: usize) {
    info!(
        event = "structure.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        responses = responses,
        absent = absent,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let span = run_span(Uuid::new_v4(), "chain");
        let _entered = span.enter();
        emit_structure_started(Uuid::nil(), "chain", 2, 1);
    }
}
