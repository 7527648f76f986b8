use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::{
    dao::room::ParticipantId,
    dto::{
        notifications::{
            MatchNotification, OutcomeEvent, PhaseChangedEvent, ScoreDroppedEvent,
            ScoreUpdatedEvent,
        },
        snapshot::to_team_scores,
    },
    error::MatchError,
    state::{MatchState, TeamId, outcome::Outcome, state_machine::MatchPhase},
};

/// Event name for phase transitions.
pub const EVENT_PHASE_CHANGED: &str = "phase_changed";
/// Event name for applied scores.
pub const EVENT_SCORE_UPDATED: &str = "score.updated";
/// Event name for dropped scores.
pub const EVENT_SCORE_DROPPED: &str = "score.dropped";
/// Event name for the local outcome.
pub const EVENT_OUTCOME: &str = "match.outcome";

/// Broadcast a phase change notification.
pub fn broadcast_phase_changed(state: &MatchState, phase: MatchPhase, version: usize) {
    let payload = PhaseChangedEvent { phase, version };
    send_event(state, EVENT_PHASE_CHANGED, &payload);
}

/// Broadcast the new total of the team that just scored.
pub fn broadcast_score_updated(
    state: &MatchState,
    scorer: ParticipantId,
    team: TeamId,
    score: u32,
) {
    let payload = ScoreUpdatedEvent {
        scorer,
        team,
        score,
    };
    send_event(state, EVENT_SCORE_UPDATED, &payload);
}

/// Broadcast that a score event was dropped.
pub fn broadcast_score_dropped(state: &MatchState, scorer: ParticipantId, reason: &MatchError) {
    let payload = ScoreDroppedEvent {
        scorer,
        reason: reason.to_string(),
    };
    send_event(state, EVENT_SCORE_DROPPED, &payload);
}

/// Broadcast the evaluated (or failed) local outcome.
pub fn broadcast_outcome(
    state: &MatchState,
    team: Option<TeamId>,
    outcome: &Result<Outcome, MatchError>,
    scores: &IndexMap<TeamId, u32>,
) {
    let payload = OutcomeEvent {
        participant: state.room().local_participant(),
        team,
        outcome: outcome.as_ref().ok().copied(),
        error: outcome.as_ref().err().map(ToString::to_string),
        scores: to_team_scores(scores),
    };
    send_event(state, EVENT_OUTCOME, &payload);
}

fn send_event(state: &MatchState, event: &str, payload: &impl Serialize) {
    match MatchNotification::json(event, payload) {
        Ok(notification) => state.notifications().broadcast(notification),
        Err(err) => warn!(event, error = %err, "failed to serialize match notification"),
    }
}
