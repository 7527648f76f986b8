//! Match driver.
//!
//! The authority runs the driving countdowns and decides every transition.
//! Other participants show the same countdowns as passive views and only move
//! on once the replicated `match.phase` says so.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::{
    dao::room::{ParticipantId, PropertyKey, RoomEvent, RoomPlatform},
    dto::snapshot::FinalScores,
    error::MatchError,
    services::{
        display::{self, DisplaySink, SinkId, warmup_text},
        notifications::broadcast_outcome,
        scoring_service::{reset_scoreboards, retire_scoring_objects, set_scoring},
        team_assignment::{await_team, team_of},
    },
    state::{
        MatchState, SharedMatch, TeamId,
        outcome::{Outcome, evaluate},
        room_config::{RoomConfig, RoomSetting, read_setting},
        state_machine::{MatchEvent, MatchPhase},
        timer::{PhaseTimer, Remaining, TimerHandle, TimerOutcome},
        transitions::run_transition_with_broadcast,
    },
};

/// Non-fatal failures collected while entering a phase.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PhaseEntry {
    /// Failures that were logged and skipped.
    pub errors: Vec<MatchError>,
}

impl PhaseEntry {
    fn extend(&mut self, errors: impl IntoIterator<Item = MatchError>) {
        self.errors.extend(errors);
    }

    fn push_err<T>(&mut self, result: Result<T, MatchError>) {
        if let Err(err) = result {
            self.errors.push(err);
        }
    }
}

/// What the driver hands back once the match is over.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchReport {
    /// Phase the local state machine ended in.
    pub phase: MatchPhase,
    /// Scores the outcome was evaluated from.
    pub scores: IndexMap<TeamId, u32>,
    /// Team of the local participant, if it could be resolved.
    pub team: Option<TeamId>,
    /// Outcome of the local participant.
    pub outcome: Result<Outcome, MatchError>,
    /// Non-fatal failures collected over the whole match.
    pub errors: Vec<MatchError>,
}

/// Spawn [`run_match`] on the runtime and log how it ended.
pub fn spawn_match(state: SharedMatch) -> JoinHandle<Result<MatchReport, MatchError>> {
    tokio::spawn(async move {
        let result = run_match(&state).await;
        match &result {
            Ok(report) => info!(
                participant = %state.room().local_participant(),
                outcome = ?report.outcome,
                errors = report.errors.len(),
                "match finished"
            ),
            Err(MatchError::Cancelled) => info!("match cancelled"),
            Err(err) => warn!(error = %err, "match aborted"),
        }
        result
    })
}

/// Drive one match from warm-up to the presented outcome.
pub async fn run_match(state: &MatchState) -> Result<MatchReport, MatchError> {
    let mut errors = Vec::new();

    let (warmup_seconds, warmup_error) = read_duration(state.room(), RoomSetting::WarmupLength);
    errors.extend(warmup_error);
    info!(
        warmup_seconds,
        authority = state.room().is_authority(),
        "warm-up started"
    );

    let timer = start_warmup_countdown(state, warmup_seconds);
    run_phase(state, timer, MatchPhase::Active).await?;

    let active = enter_active(state).await?;
    log_entry_errors(MatchPhase::Active, &active);
    errors.extend(active.errors);

    let match_seconds = state
        .frozen_config()
        .await
        .map(|config| config.match_seconds)
        .unwrap_or_default();
    let timer = start_match_countdown(state, match_seconds);
    run_phase(state, timer, MatchPhase::Ended).await?;

    let mut report = enter_ended(state).await?;
    errors.append(&mut report.errors);
    report.errors = errors;
    Ok(report)
}

/// Wait until the current phase is over: the authority waits for its driving
/// timer, everyone else for the replicated phase.
async fn run_phase(
    state: &MatchState,
    timer: TimerHandle,
    next: MatchPhase,
) -> Result<(), MatchError> {
    if state.room().is_authority() {
        return match timer.finished().await {
            TimerOutcome::Completed => Ok(()),
            TimerOutcome::Cancelled => Err(MatchError::Cancelled),
        };
    }

    let reached = wait_for_phase(state, next).await;
    timer.cancel();
    timer.finished().await;
    reached.map(|_| ())
}

/// Transition to Active and prepare scoring.
///
/// Resolves every participant's team first, with the configured backoff and
/// outside the bounded transition work. The room options are then frozen and
/// the ledger seeded before the phase changes; a missing `points_per_score`
/// aborts the transition. Display and trigger updates follow once the phase is
/// applied.
pub async fn enter_active(state: &MatchState) -> Result<PhaseEntry, MatchError> {
    let (teams, team_errors) = resolve_teams(state).await?;
    let mut entry = run_transition_with_broadcast(state, MatchEvent::WarmupElapsed, || {
        prepare_active(state, teams)
    })
    .await?;
    entry.extend(team_errors);

    entry.push_err(display::update(state.display(), SinkId::Popup, ""));
    let teams: Vec<TeamId> = state.ledger().read().await.teams().collect();
    entry.extend(reset_scoreboards(state, &teams));
    entry.push_err(set_scoring(state, true));

    Ok(entry)
}

async fn prepare_active(state: &MatchState, teams: Vec<TeamId>) -> Result<PhaseEntry, MatchError> {
    let mut entry = PhaseEntry::default();
    let room = state.room();

    let points_per_score = read_setting(room, RoomSetting::PointsPerScore)?;
    let (warmup_seconds, warmup_error) = read_duration(room, RoomSetting::WarmupLength);
    let (match_seconds, match_error) = read_duration(room, RoomSetting::GameLength);
    entry.extend(warmup_error);
    entry.extend(match_error);

    let config = state
        .freeze_config(RoomConfig {
            warmup_seconds,
            match_seconds,
            points_per_score,
        })
        .await;
    info!(?config, "room configuration frozen");

    let added = state.ledger().write().await.initialize(teams);
    info!(teams = added, "score ledger initialised");
    Ok(entry)
}

/// Transition to Ended, then present the local outcome.
///
/// The trigger is disarmed and, on the authority, the canonical scores are
/// published before the phase changes, so followers observe them first.
pub async fn enter_ended(state: &MatchState) -> Result<MatchReport, MatchError> {
    let mut entry = run_transition_with_broadcast(state, MatchEvent::MatchElapsed, || {
        prepare_ended(state)
    })
    .await?;

    let scores = final_scores(state, &mut entry).await;
    let team = local_team(state).await;
    let outcome = match &team {
        Ok(team) => evaluate(&scores, *team).map_err(MatchError::from),
        Err(err) => Err(err.clone()),
    };

    match &outcome {
        Ok(outcome) => {
            info!(team = ?team.as_ref().ok(), ?outcome, "match outcome");
            entry.push_err(display::update(state.display(), SinkId::Popup, outcome.message()));
        }
        Err(err) => {
            warn!(error = %err, "could not evaluate match outcome");
            entry.push_err(display::update(state.display(), SinkId::Popup, ""));
        }
    }
    let team = team.ok();
    broadcast_outcome(state, team, &outcome, &scores);
    entry.extend(retire_scoring_objects(state));
    log_entry_errors(MatchPhase::Ended, &entry);

    Ok(MatchReport {
        phase: state.phase().await,
        scores,
        team,
        outcome,
        errors: entry.errors,
    })
}

async fn prepare_ended(state: &MatchState) -> Result<PhaseEntry, MatchError> {
    let mut entry = PhaseEntry::default();
    entry.push_err(set_scoring(state, false));

    if state.room().is_authority() {
        let snapshot = state.ledger().read().await.snapshot();
        let published = FinalScores::from_snapshot(&snapshot).publish(state.room());
        if let Err(err) = &published {
            warn!(error = %err, "failed to publish final scores");
        }
        entry.push_err(published);
    }
    Ok(entry)
}

/// Resolve once the replicated phase reaches `target` or later.
///
/// Never transitions by itself. Stops with [`MatchError::Cancelled`] when the
/// local participant leaves.
pub async fn wait_for_phase(
    state: &MatchState,
    target: MatchPhase,
) -> Result<MatchPhase, MatchError> {
    let room = state.room();
    let mut events = room.subscribe();
    let mut cancel = state.cancel_signal();

    loop {
        if let Some(phase) = replicated_phase(room)
            && phase >= target
        {
            debug!(phase = phase.as_str(), "replicated phase reached");
            return Ok(phase);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MatchError::Cancelled),
            event = events.recv() => match event {
                Ok(RoomEvent::Left(id)) => {
                    debug!(participant = %id, "participant left while waiting for phase");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "room events lagged; re-reading phase");
                }
                Err(RecvError::Closed) => {
                    return Err(MatchError::InvalidState("room event stream closed".into()));
                }
            },
        }
    }
}

fn replicated_phase(room: &dyn RoomPlatform) -> Option<MatchPhase> {
    let value = room.shared_property(PropertyKey::Phase)?;
    match serde_json::from_value(value) {
        Ok(phase) => Some(phase),
        Err(err) => {
            warn!(error = %err, "ignoring malformed replicated phase");
            None
        }
    }
}

/// Read a countdown length, falling back to zero when it is unusable.
fn read_duration(room: &dyn RoomPlatform, setting: RoomSetting) -> (u32, Option<MatchError>) {
    match read_setting(room, setting) {
        Ok(seconds) => (seconds, None),
        Err(err) => {
            warn!(key = %setting.key(), error = %err, "countdown length unavailable; using 0");
            (0, Some(err))
        }
    }
}

/// Resolve the team of every participant, retrying the ones whose team has not
/// been replicated yet with a shared backoff.
async fn resolve_teams(state: &MatchState) -> Result<(Vec<TeamId>, Vec<MatchError>), MatchError> {
    let room = state.room();
    let retry = state.settings().team_retry;
    let attempts = retry.attempts.max(1);
    let mut cancel = state.cancel_signal();

    let mut pending: Vec<ParticipantId> = room.participants().into_iter().map(|p| p.id).collect();
    let mut teams = Vec::new();
    let mut errors = Vec::new();
    let mut delay = retry.initial_delay;

    for attempt in 1..=attempts {
        let mut unresolved = Vec::new();
        for participant in pending {
            match team_of(room, participant) {
                Ok(team) => {
                    if !teams.contains(&team) {
                        teams.push(team);
                    }
                }
                Err(MatchError::NotReady(_)) => unresolved.push(participant),
                Err(err) => {
                    warn!(%participant, error = %err, "skipping participant with invalid team");
                    errors.push(err);
                }
            }
        }
        pending = unresolved;

        if pending.is_empty() || attempt == attempts {
            break;
        }
        debug!(attempt, waiting = pending.len(), "teams not replicated yet; retrying");
        tokio::select! {
            _ = cancel.cancelled() => return Err(MatchError::Cancelled),
            _ = sleep(delay) => {}
        }
        delay = (delay * 2).min(retry.max_delay);
    }

    for participant in pending {
        warn!(%participant, "team never replicated; participant left out of the ledger");
        errors.push(MatchError::NotReady(PropertyKey::Team(participant).to_string()));
    }
    Ok((teams, errors))
}

async fn final_scores(state: &MatchState, entry: &mut PhaseEntry) -> IndexMap<TeamId, u32> {
    match FinalScores::read(state.room()) {
        Ok(Some(canonical)) => return canonical.to_snapshot(),
        Ok(None) => warn!("final scores not replicated; evaluating from the local ledger"),
        Err(err) => {
            warn!(error = %err, "unreadable final scores; evaluating from the local ledger");
            entry.errors.push(err);
        }
    }
    state.ledger().read().await.snapshot()
}

async fn local_team(state: &MatchState) -> Result<TeamId, MatchError> {
    let room = state.room();
    await_team(
        room,
        room.local_participant(),
        state.settings().team_retry,
        state.cancel_signal(),
    )
    .await
}

fn start_warmup_countdown(state: &MatchState, seconds: u32) -> TimerHandle {
    let mut views = Views::new(state.display_handle(), vec![SinkId::Popup]);
    PhaseTimer::new(seconds, state.settings().tick_interval).start(
        move |remaining| views.show(&warmup_text(remaining)),
        None::<fn()>,
        state.cancel_signal(),
    )
}

/// One countdown per phase; every timer view shows its ticks.
fn start_match_countdown(state: &MatchState, seconds: u32) -> TimerHandle {
    let sinks = state.settings().layout.timer_sinks().collect();
    let mut views = Views::new(state.display_handle(), sinks);
    views.show(&Remaining { seconds, tenths: 0 }.to_string());
    PhaseTimer::new(seconds, state.settings().tick_interval).start(
        move |remaining| views.show(&remaining.to_string()),
        None::<fn()>,
        state.cancel_signal(),
    )
}

/// Sinks fed by a timer. A failing sink is reported once and skipped from then on.
struct Views {
    display: Arc<dyn DisplaySink>,
    sinks: Vec<SinkId>,
    failed: HashSet<SinkId>,
}

impl Views {
    fn new(display: Arc<dyn DisplaySink>, sinks: Vec<SinkId>) -> Self {
        Self {
            display,
            sinks,
            failed: HashSet::new(),
        }
    }

    fn show(&mut self, text: &str) {
        for sink in &self.sinks {
            if self.failed.contains(sink) {
                continue;
            }
            if let Err(err) = self.display.update_display(*sink, text) {
                warn!(%sink, error = %err, "timer view unavailable; skipping it");
                self.failed.insert(*sink);
            }
        }
    }
}

fn log_entry_errors(phase: MatchPhase, entry: &PhaseEntry) {
    for err in &entry.errors {
        warn!(phase = phase.as_str(), error = %err, "phase entry step failed");
    }
}
