use thiserror::Error;

use crate::state::{
    AbortError, ApplyError, PlanError, TeamId,
    outcome::OutcomeError,
    state_machine::{MatchEvent, MatchPhase},
};

/// Failure reported by an injected collaborator (display sink, scoring trigger, room platform).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{collaborator} failed: {message}")]
pub struct CollaboratorError {
    /// Short name of the collaborator that failed (e.g. `display`).
    pub collaborator: &'static str,
    /// Human readable failure description.
    pub message: String,
}

impl CollaboratorError {
    /// Build an error for the given collaborator.
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

/// Errors that can occur while coordinating a match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// A required room-level option is missing or unusable.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A replicated value exists but does not have the expected shape.
    #[error("invalid value for `{key}`: {message}")]
    InvalidProperty {
        /// Replicated key that holds the bad value.
        key: String,
        /// Why the value was rejected.
        message: String,
    },
    /// A replicated value has not arrived yet; the caller should retry later.
    #[error("`{0}` has not been replicated yet")]
    NotReady(String),
    /// A score resolved to a team the ledger does not know.
    #[error("team {team} is not registered in the ledger")]
    UnknownTeam {
        /// Team the scoring participant belongs to.
        team: TeamId,
    },
    /// The outcome could not be computed.
    #[error(transparent)]
    Outcome(#[from] OutcomeError),
    /// An external collaborator call failed.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    /// The operation is reserved to the room authority.
    #[error("only the room authority can {0}")]
    NotAuthority(String),
    /// Room configuration can no longer change.
    #[error("room configuration is frozen once the match is active")]
    ConfigFrozen,
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A score event arrived outside the active phase.
    #[error("scoring is disabled during {0:?}")]
    ScoringDisabled(MatchPhase),
    /// Work attached to a phase transition exceeded its time limit.
    #[error("{0:?} preparation timed out")]
    Timeout(MatchEvent),
    /// The local participant left the match before the operation finished.
    #[error("match was cancelled")]
    Cancelled,
}

impl From<PlanError> for MatchError {
    fn from(err: PlanError) -> Self {
        MatchError::InvalidState(err.to_string())
    }
}

impl From<ApplyError> for MatchError {
    fn from(err: ApplyError) -> Self {
        MatchError::InvalidState(format!("cannot apply transition: {err}"))
    }
}

impl From<AbortError> for MatchError {
    fn from(err: AbortError) -> Self {
        MatchError::InvalidState(format!("cannot abort transition: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::state_machine::{InvalidTransition, MatchEvent};

    #[test]
    fn transition_errors_become_invalid_state() {
        let err = MatchError::from(PlanError::InvalidTransition(InvalidTransition {
            from: MatchPhase::Warmup,
            event: MatchEvent::MatchElapsed,
        }));
        assert_eq!(
            err.to_string(),
            "invalid state: MatchElapsed does not apply to the Warmup phase"
        );
        assert!(matches!(
            MatchError::from(ApplyError::NoPending),
            MatchError::InvalidState(_)
        ));
    }

    #[test]
    fn collaborator_failures_name_the_collaborator() {
        let err = MatchError::from(CollaboratorError::new("display", "timer[2] is missing"));
        assert_eq!(err.to_string(), "display failed: timer[2] is missing");
    }
}
