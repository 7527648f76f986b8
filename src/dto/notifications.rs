use serde::Serialize;

use crate::{
    dao::room::ParticipantId,
    dto::snapshot::TeamScore,
    state::{TeamId, outcome::Outcome, state_machine::MatchPhase},
};

#[derive(Clone, Debug)]
/// Dispatched payload carried on the match notification hub.
pub struct MatchNotification {
    /// Event name (e.g. `phase_changed`).
    pub event: String,
    /// JSON-encoded payload.
    pub data: String,
}

impl MatchNotification {
    /// Convenience wrapper that serialises `payload` into the data field.
    pub fn json<T>(event: &str, payload: &T) -> serde_json::Result<Self>
    where
        T: Serialize,
    {
        Ok(Self {
            event: event.to_string(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize)]
/// Broadcast after each applied phase transition.
pub struct PhaseChangedEvent {
    /// Phase the match entered.
    pub phase: MatchPhase,
    /// State machine version after the transition.
    pub version: usize,
}

#[derive(Debug, Serialize)]
/// Broadcast when a score was applied; only the affected team is included.
pub struct ScoreUpdatedEvent {
    /// Participant that scored.
    pub scorer: ParticipantId,
    /// Team credited with the score.
    pub team: TeamId,
    /// New total of that team.
    pub score: u32,
}

#[derive(Debug, Serialize)]
/// Broadcast when a score event could not be applied.
pub struct ScoreDroppedEvent {
    /// Participant that scored.
    pub scorer: ParticipantId,
    /// Why the event was dropped.
    pub reason: String,
}

#[derive(Debug, Serialize)]
/// Broadcast once the local outcome has been evaluated at the end of the match.
pub struct OutcomeEvent {
    /// Local participant.
    pub participant: ParticipantId,
    /// Team of the local participant, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamId>,
    /// Evaluated outcome, absent when evaluation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// Evaluation failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Scores the outcome was computed from.
    pub scores: Vec<TeamScore>,
}
