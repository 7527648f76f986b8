/// Notification hub.
pub mod events;
/// Per-match team scores.
pub mod ledger;
/// Win, tie or loss evaluation.
pub mod outcome;
/// Replicated room options.
pub mod room_config;
pub mod state_machine;
pub mod timer;
/// Transitions with phase replication and broadcast.
pub mod transitions;

use std::{sync::Arc, time::Duration};

use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    dao::room::RoomPlatform,
    dto::notifications::MatchNotification,
    error::MatchError,
    services::{
        display::{DisplayLayout, DisplaySink},
        scoring_service::ScoringControls,
        team_assignment::RetryPolicy,
    },
};

pub use self::events::NotificationHub;
pub use self::state_machine::{AbortError, ApplyError, Plan, PlanError, PlanId, Snapshot};
use self::{
    ledger::TeamScoreLedger,
    room_config::RoomConfig,
    state_machine::{MatchEvent, MatchPhase, MatchStateMachine},
    timer::{CancelSignal, Canceller},
};

/// Team identifier; teams are numbered by join order starting at zero.
pub type TeamId = u32;
/// Match state shared between the driver, score handlers and room listener.
pub type SharedMatch = Arc<MatchState>;
/// Upper bound for the preparation work attached to a phase transition.
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

const NOTIFICATION_CAPACITY: usize = 64;

/// Host collaborators injected into a match.
#[derive(Clone)]
pub struct Collaborators {
    /// Networked room the match runs in.
    pub room: Arc<dyn RoomPlatform>,
    /// Text views for timers, scoreboards and the popup.
    pub display: Arc<dyn DisplaySink>,
    /// Scoring trigger and tagged scene objects.
    pub scoring: Arc<dyn ScoringControls>,
}

/// Local tuning of one match instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSettings {
    /// Real-time length of one timer tick.
    pub tick_interval: Duration,
    /// Views exposed by the host.
    pub layout: DisplayLayout,
    /// Backoff while waiting for replicated team data.
    pub team_retry: RetryPolicy,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            layout: DisplayLayout::default(),
            team_retry: RetryPolicy::default(),
        }
    }
}

/// State of one match as seen by the local participant.
pub struct MatchState {
    collaborators: Collaborators,
    settings: MatchSettings,
    machine: RwLock<MatchStateMachine>,
    ledger: RwLock<TeamScoreLedger>,
    config: RwLock<Option<RoomConfig>>,
    notifications: NotificationHub,
    cancel: Canceller,
    transition_gate: Mutex<()>,
    transition_timeout: Option<Duration>,
}

impl MatchState {
    /// Construct a new match in the warm-up phase.
    pub fn new(collaborators: Collaborators, settings: MatchSettings) -> SharedMatch {
        Arc::new(Self {
            collaborators,
            settings,
            machine: RwLock::new(MatchStateMachine::new()),
            ledger: RwLock::new(TeamScoreLedger::new()),
            config: RwLock::new(None),
            notifications: NotificationHub::new(NOTIFICATION_CAPACITY),
            cancel: Canceller::new(),
            transition_gate: Mutex::new(()),
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
        })
    }

    /// Room the match runs in.
    pub fn room(&self) -> &dyn RoomPlatform {
        self.collaborators.room.as_ref()
    }

    /// Host text views.
    pub fn display(&self) -> &dyn DisplaySink {
        self.collaborators.display.as_ref()
    }

    /// Owned handle to the text views, for timer tasks.
    pub(crate) fn display_handle(&self) -> Arc<dyn DisplaySink> {
        self.collaborators.display.clone()
    }

    /// Scoring trigger and tagged objects.
    pub fn scoring(&self) -> &dyn ScoringControls {
        self.collaborators.scoring.as_ref()
    }

    /// Local tuning.
    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    /// Hub publishing phase, score and outcome notifications.
    pub fn notifications(&self) -> &NotificationHub {
        &self.notifications
    }

    /// Subscribe to match notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<MatchNotification> {
        self.notifications.subscribe()
    }

    /// Current phase.
    pub async fn phase(&self) -> MatchPhase {
        self.machine.read().await.phase()
    }

    /// Snapshot of the state machine.
    pub async fn snapshot(&self) -> Snapshot {
        self.machine.read().await.snapshot()
    }

    /// Per-match score ledger.
    pub fn ledger(&self) -> &RwLock<TeamScoreLedger> {
        &self.ledger
    }

    /// State machine guarding phase transitions.
    pub(crate) fn machine(&self) -> &RwLock<MatchStateMachine> {
        &self.machine
    }

    /// Configuration frozen at Active entry, if the match got that far.
    pub async fn frozen_config(&self) -> Option<RoomConfig> {
        *self.config.read().await
    }

    /// Store the configuration used for the rest of the match. Only the first call wins.
    pub(crate) async fn freeze_config(&self, config: RoomConfig) -> RoomConfig {
        let mut slot = self.config.write().await;
        *slot.get_or_insert(config)
    }

    /// Signal observed by every timer and wait of this match.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.signal()
    }

    /// Whether the local participant left the match.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop every timer without completing it, then leave the room.
    pub fn leave(&self) -> Result<(), MatchError> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        self.cancel.cancel();
        info!(
            participant = %self.room().local_participant(),
            "leaving match; pending timers cancelled"
        );
        self.room().leave_room()?;
        Ok(())
    }

    /// Plan a transition to the state machine, returning the plan.
    async fn plan_transition(&self, event: MatchEvent) -> Result<Plan, PlanError> {
        let mut sm = self.machine.write().await;
        sm.plan(event)
    }

    /// Apply the planned transition, returning the next phase.
    async fn apply_planned_transition(&self, plan_id: PlanId) -> Result<MatchPhase, ApplyError> {
        let mut sm = self.machine.write().await;
        sm.apply(plan_id)
    }

    /// Abort a planned transition.
    async fn abort_transition(&self, plan_id: PlanId) -> Result<(), AbortError> {
        let mut sm = self.machine.write().await;
        sm.abort(plan_id)
    }

    /// Plan `event`, run `work`, then apply the transition if `work` succeeded
    /// or abort it otherwise.
    pub async fn run_transition<F, Fut, T>(
        &self,
        event: MatchEvent,
        work: F,
    ) -> Result<(T, MatchPhase), MatchError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, MatchError>>,
    {
        let gate = self.transition_gate.lock().await;
        let Plan { id: plan_id, .. } = self.plan_transition(event).await?;

        let work_future = work();
        let outcome = if let Some(limit) = self.transition_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    if let Err(abort_err) = self.abort_transition(plan_id).await {
                        warn!(
                            event = ?event,
                            plan_id = %plan_id,
                            error = ?abort_err,
                            "failed to abort transition after timeout"
                        );
                    }
                    drop(gate);
                    return Err(MatchError::Timeout(event));
                }
            }
        } else {
            work_future.await
        };

        match outcome {
            Ok(value) => {
                let next = self.apply_planned_transition(plan_id).await?;
                drop(gate);
                Ok((value, next))
            }
            Err(err) => {
                if let Err(abort_err) = self.abort_transition(plan_id).await {
                    warn!(
                        event = ?event,
                        plan_id = %plan_id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                drop(gate);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use super::*;
    use crate::{
        dao::memory::RoomHandle,
        services::{display::testing::RecordingDisplay, scoring_service::testing::RecordingControls},
    };

    /// Match wired to recording fakes.
    pub struct Harness {
        pub state: SharedMatch,
        pub room: RoomHandle,
        pub display: Arc<RecordingDisplay>,
        pub controls: Arc<RecordingControls>,
    }

    pub fn harness(room: RoomHandle) -> Harness {
        harness_with_display(room, RecordingDisplay::default())
    }

    pub fn harness_with_display(room: RoomHandle, display: RecordingDisplay) -> Harness {
        build(room, display, RetryPolicy::default())
    }

    pub fn harness_with_retry(room: RoomHandle, team_retry: RetryPolicy) -> Harness {
        build(room, RecordingDisplay::default(), team_retry)
    }

    fn build(room: RoomHandle, display: RecordingDisplay, team_retry: RetryPolicy) -> Harness {
        let display = Arc::new(display);
        let controls = Arc::new(RecordingControls::default());
        let state = MatchState::new(
            Collaborators {
                room: Arc::new(room.clone()),
                display: display.clone(),
                scoring: controls.clone(),
            },
            MatchSettings {
                layout: DisplayLayout {
                    timer_views: 2,
                    scoreboards: 2,
                    team_slots: 2,
                },
                team_retry,
                ..MatchSettings::default()
            },
        );
        Harness {
            state,
            room,
            display,
            controls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{testing::harness, *};
    use crate::dao::memory::InMemoryRoom;

    #[tokio::test]
    async fn failed_work_aborts_transition() {
        let room = InMemoryRoom::new();
        let h = harness(room.join("host").unwrap());

        let result: Result<((), MatchPhase), MatchError> = h
            .state
            .run_transition(MatchEvent::WarmupElapsed, || async {
                Err(MatchError::Configuration("missing".into()))
            })
            .await;

        assert!(matches!(result, Err(MatchError::Configuration(_))));
        let snapshot = h.state.snapshot().await;
        assert_eq!(snapshot.phase, MatchPhase::Warmup);
        assert_eq!(snapshot.pending, None);
    }

    #[tokio::test]
    async fn successful_work_applies_transition() {
        let room = InMemoryRoom::new();
        let h = harness(room.join("host").unwrap());

        let (value, next) = h
            .state
            .run_transition(MatchEvent::WarmupElapsed, || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(next, MatchPhase::Active);
        assert_eq!(h.state.phase().await, MatchPhase::Active);
    }

    #[tokio::test]
    async fn invalid_event_is_reported_as_invalid_state() {
        let room = InMemoryRoom::new();
        let h = harness(room.join("host").unwrap());
        let result = h
            .state
            .run_transition(MatchEvent::MatchElapsed, || async { Ok(()) })
            .await;
        assert!(matches!(result, Err(MatchError::InvalidState(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_work_times_out_and_aborts() {
        let room = InMemoryRoom::new();
        let h = harness(room.join("host").unwrap());

        let result: Result<((), MatchPhase), MatchError> = h
            .state
            .run_transition(MatchEvent::WarmupElapsed, || async {
                tokio::time::sleep(DEFAULT_TRANSITION_TIMEOUT * 2).await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(MatchError::Timeout(MatchEvent::WarmupElapsed)));
        assert_eq!(
            result.unwrap_err().to_string(),
            "WarmupElapsed preparation timed out"
        );
        let snapshot = h.state.snapshot().await;
        assert_eq!(snapshot.phase, MatchPhase::Warmup);
        assert_eq!(snapshot.pending, None);
    }

    #[tokio::test]
    async fn config_freezes_on_first_write() {
        let room = InMemoryRoom::new();
        let h = harness(room.join("host").unwrap());
        let first = RoomConfig {
            warmup_seconds: 1,
            match_seconds: 2,
            points_per_score: 3,
        };
        assert_eq!(h.state.freeze_config(first).await, first);
        assert_eq!(h.state.freeze_config(RoomConfig::default()).await, first);
        assert_eq!(h.state.frozen_config().await, Some(first));
    }

    #[tokio::test]
    async fn leave_cancels_and_leaves_room_once() {
        let room = InMemoryRoom::new();
        let h = harness(room.join("host").unwrap());
        let signal = h.state.cancel_signal();
        h.state.leave().unwrap();
        assert!(h.state.is_cancelled());
        assert!(signal.is_cancelled());
        assert!(h.state.leave().is_ok());
        assert_eq!(room.authority_id(), None);
    }
}
