//! Match phase machine.
//!
//! Transitions are two-step: [`MatchStateMachine::plan`] reserves the next
//! phase, the caller prepares it, then either [`MatchStateMachine::apply`]
//! commits or [`MatchStateMachine::abort`] releases the reservation.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Phases a match goes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPhase {
    /// Pre-match countdown; scoring is disabled.
    Warmup,
    /// The match clock is running and scores are accepted.
    Active,
    /// Terminal phase: scoring is disabled and outcomes are shown.
    Ended,
}

impl MatchPhase {
    /// Whether score events should be applied while in this phase.
    pub fn scoring_enabled(self) -> bool {
        matches!(self, MatchPhase::Active)
    }

    /// Lowercase name, also used as the replicated phase value.
    pub fn as_str(self) -> &'static str {
        match self {
            MatchPhase::Warmup => "warmup",
            MatchPhase::Active => "active",
            MatchPhase::Ended => "ended",
        }
    }
}

/// Countdown expiries moving the match forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    /// The warm-up countdown reached zero.
    WarmupElapsed,
    /// The match countdown reached zero.
    MatchElapsed,
}

/// `event` has no entry in the transition table for phase `from`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{event:?} does not apply to the {from:?} phase")]
pub struct InvalidTransition {
    /// Phase at the time of the event.
    pub from: MatchPhase,
    /// Rejected event.
    pub event: MatchEvent,
}

/// Why a transition could not be reserved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Another transition is reserved and still being prepared.
    #[error("phase transition already pending")]
    AlreadyPending,
    /// No such transition.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// Why a reserved transition could not be committed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// Nothing is reserved.
    #[error("no transition is pending")]
    NoPending,
    /// The reservation belongs to another plan; it stays in place.
    #[error("plan {0} is not the pending transition")]
    WrongPlan(PlanId),
    /// The machine moved since the plan was made.
    #[error("plan made at version {planned} is stale at version {current}")]
    Stale {
        /// Version the plan was made against.
        planned: usize,
        /// Version of the machine now.
        current: usize,
    },
}

/// Why a reservation could not be released.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortError {
    /// Nothing is reserved.
    #[error("no transition is pending")]
    NoPending,
    /// The reservation belongs to another plan; it stays in place.
    #[error("plan {0} is not the pending transition")]
    WrongPlan(PlanId),
}

/// Identifier handed out by [`MatchStateMachine::plan`].
pub type PlanId = Uuid;

/// Reserved transition.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Identifier to pass back to apply or abort.
    pub id: PlanId,
    /// Phase being left.
    pub from: MatchPhase,
    /// Phase being entered.
    pub to: MatchPhase,
    /// Event that asked for the transition.
    pub event: MatchEvent,
    /// Version the machine was at when planning.
    pub base_version: usize,
    /// When the reservation was made.
    pub planned_at: Instant,
}

/// Point-in-time view of the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase.
    pub phase: MatchPhase,
    /// Number of transitions applied so far.
    pub version: usize,
    /// Phase being prepared, if any.
    pub pending: Option<MatchPhase>,
}

/// Warmup → Active → Ended, with no skips and no way back.
#[derive(Debug, Clone)]
pub struct MatchStateMachine {
    phase: MatchPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for MatchStateMachine {
    fn default() -> Self {
        Self {
            phase: MatchPhase::Warmup,
            version: 0,
            pending: None,
        }
    }
}

impl MatchStateMachine {
    /// Machine in the warm-up phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Whether score events are accepted right now.
    ///
    /// False as soon as a transition out of a scoring phase is reserved, so no
    /// score lands after the final tally is taken.
    pub fn scoring_enabled(&self) -> bool {
        self.phase.scoring_enabled()
            && self
                .pending
                .as_ref()
                .is_none_or(|plan| plan.to.scoring_enabled())
    }

    /// Current phase, version and reservation.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Reserve the transition triggered by `event`.
    pub fn plan(&mut self, event: MatchEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let to = next_phase(self.phase, event)?;
        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to,
            event,
            base_version: self.version,
            planned_at: Instant::now(),
        };
        self.pending = Some(plan.clone());
        Ok(plan)
    }

    /// Commit the reserved transition and return the phase entered.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<MatchPhase, ApplyError> {
        let plan = match self.pending.take() {
            None => return Err(ApplyError::NoPending),
            Some(plan) if plan.id != plan_id => {
                self.pending = Some(plan);
                return Err(ApplyError::WrongPlan(plan_id));
            }
            Some(plan) => plan,
        };

        if plan.from != self.phase || plan.base_version != self.version {
            return Err(ApplyError::Stale {
                planned: plan.base_version,
                current: self.version,
            });
        }

        self.phase = plan.to;
        self.version += 1;
        Ok(self.phase)
    }

    /// Release the reservation without changing phase.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        match &self.pending {
            None => Err(AbortError::NoPending),
            Some(plan) if plan.id != plan_id => Err(AbortError::WrongPlan(plan_id)),
            Some(_) => {
                self.pending = None;
                Ok(())
            }
        }
    }
}

fn next_phase(from: MatchPhase, event: MatchEvent) -> Result<MatchPhase, InvalidTransition> {
    match (from, event) {
        (MatchPhase::Warmup, MatchEvent::WarmupElapsed) => Ok(MatchPhase::Active),
        (MatchPhase::Active, MatchEvent::MatchElapsed) => Ok(MatchPhase::Ended),
        _ => Err(InvalidTransition { from, event }),
    }
}
