use tracing::{debug, warn};

use crate::{
    dao::room::ParticipantId,
    error::{CollaboratorError, MatchError},
    services::{
        display::{self, SinkId},
        notifications::{broadcast_score_dropped, broadcast_score_updated},
        team_assignment::team_of,
    },
    state::{MatchState, Snapshot, TeamId},
};

/// Tag of the racks spawning new balls.
pub const RACK_TAG: &str = "Rack";
/// Tag of the in-flight scoring objects.
pub const BALL_TAG: &str = "Basketball";
/// Tags retired when the match ends.
pub const RETIRED_TAGS: [&str; 2] = [RACK_TAG, BALL_TAG];

/// Host objects that make scoring possible.
pub trait ScoringControls: Send + Sync {
    /// Arm or disarm the scoring trigger.
    fn set_scoring_enabled(&self, enabled: bool) -> Result<(), CollaboratorError>;
    /// Disable every object carrying `tag`, returning how many were disabled.
    fn disable_tagged_objects(&self, tag: &str) -> Result<usize, CollaboratorError>;
}

/// Entry point for the scoring trigger: credit the scorer's current team.
///
/// The team is resolved when the event is applied. Events outside the active
/// phase are ignored; events that cannot be attributed are dropped, logged and
/// broadcast as `score.dropped`. Returns the new team total.
pub async fn on_score(state: &MatchState, scorer: ParticipantId) -> Result<u32, MatchError> {
    let machine = state.machine().read().await;
    if !machine.scoring_enabled() {
        let Snapshot { phase, pending, .. } = machine.snapshot();
        // A match being ended already had its final scores taken.
        let phase = pending.filter(|to| !to.scoring_enabled()).unwrap_or(phase);
        debug!(%scorer, phase = phase.as_str(), "ignoring score outside active phase");
        return Err(MatchError::ScoringDisabled(phase));
    }

    let result = apply_score(state, scorer).await;
    drop(machine);

    if let Err(err) = &result {
        warn!(%scorer, error = %err, "dropping score event");
        broadcast_score_dropped(state, scorer, err);
    }
    result
}

async fn apply_score(state: &MatchState, scorer: ParticipantId) -> Result<u32, MatchError> {
    let points = state
        .frozen_config()
        .await
        .map(|config| config.points_per_score)
        .ok_or_else(|| MatchError::Configuration("points per score is not frozen".into()))?;
    let team = team_of(state.room(), scorer)?;

    // Refresh while holding the ledger so a team's displays follow score order.
    let mut ledger = state.ledger().write().await;
    let score = ledger.apply_score(team, points)?;
    refresh_team(state, team, score);
    broadcast_score_updated(state, scorer, team, score);
    drop(ledger);

    debug!(%scorer, team, score, "score applied");
    Ok(score)
}

/// Show `score` in the slot of `team` on every scoreboard; other slots are untouched.
pub fn refresh_team(state: &MatchState, team: TeamId, score: u32) -> Vec<MatchError> {
    let sinks = state.settings().layout.score_sinks(team);
    display::update_all(state.display(), sinks, &score.to_string())
}

/// Show zero for every ledger team and blank out unused team slots.
pub fn reset_scoreboards(state: &MatchState, teams: &[TeamId]) -> Vec<MatchError> {
    let layout = state.settings().layout;
    let mut errors = Vec::new();

    for board in 0..layout.scoreboards {
        for slot in 0..layout.team_slots {
            let Ok(team) = TeamId::try_from(slot) else {
                break;
            };
            let text = if teams.contains(&team) { "0" } else { "" };
            if let Err(err) = display::update(state.display(), SinkId::Score { board, team }, text) {
                errors.push(err);
            }
        }
    }

    errors
}

/// Arm or disarm the trigger, logging failures.
pub fn set_scoring(state: &MatchState, enabled: bool) -> Result<(), MatchError> {
    state.scoring().set_scoring_enabled(enabled).map_err(|err| {
        warn!(enabled, error = %err, "failed to toggle scoring trigger");
        MatchError::from(err)
    })
}

/// Disable every retired tag; a failing tag does not stop the others.
pub fn retire_scoring_objects(state: &MatchState) -> Vec<MatchError> {
    let mut errors = Vec::new();
    for tag in RETIRED_TAGS {
        match state.scoring().disable_tagged_objects(tag) {
            Ok(count) => debug!(tag, count, "disabled tagged objects"),
            Err(err) => {
                warn!(tag, error = %err, "failed to disable tagged objects");
                errors.push(err.into());
            }
        }
    }
    errors
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Scoring fake recording trigger toggles and retired tags.
    #[derive(Debug, Default)]
    pub struct RecordingControls {
        pub toggles: Mutex<Vec<bool>>,
        pub retired: Mutex<Vec<String>>,
    }

    impl RecordingControls {
        pub fn toggles(&self) -> Vec<bool> {
            self.toggles.lock().unwrap().clone()
        }

        pub fn retired(&self) -> Vec<String> {
            self.retired.lock().unwrap().clone()
        }
    }

    impl ScoringControls for RecordingControls {
        fn set_scoring_enabled(&self, enabled: bool) -> Result<(), CollaboratorError> {
            self.toggles.lock().unwrap().push(enabled);
            Ok(())
        }

        fn disable_tagged_objects(&self, tag: &str) -> Result<usize, CollaboratorError> {
            self.retired.lock().unwrap().push(tag.to_string());
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{memory::InMemoryRoom, room::RoomPlatform},
        services::{match_service::enter_active, team_assignment::assign_teams_by_join_order},
        state::{
            room_config::RoomConfig,
            state_machine::{MatchEvent, MatchPhase},
            testing::{Harness, harness},
        },
    };

    fn config(points_per_score: u32) -> RoomConfig {
        RoomConfig {
            warmup_seconds: 2,
            match_seconds: 2,
            points_per_score,
        }
    }

    async fn active_match(points: u32) -> (Harness, Vec<ParticipantId>) {
        let room = InMemoryRoom::new();
        let host = room.join("host").unwrap();
        let guest = room.join("guest").unwrap();
        config(points).publish(&host).unwrap();
        assign_teams_by_join_order(&host).unwrap();

        let h = harness(host.clone());
        enter_active(&h.state).await.unwrap();
        (h, vec![host.id(), guest.id()])
    }

    #[tokio::test(start_paused = true)]
    async fn score_credits_scorer_team_only() {
        let (h, players) = active_match(3).await;
        h.display.clear();

        assert_eq!(on_score(&h.state, players[0]).await, Ok(3));
        let snapshot = h.state.ledger().read().await.snapshot();
        assert_eq!(snapshot.get(&0), Some(&3));
        assert_eq!(snapshot.get(&1), Some(&0));

        let touched: Vec<_> = h.display.updates().into_iter().map(|(sink, _)| sink).collect();
        assert_eq!(
            touched,
            vec![
                SinkId::Score { board: 0, team: 0 },
                SinkId::Score { board: 1, team: 0 },
            ]
        );
        assert_eq!(
            h.display.last_text(SinkId::Score { board: 1, team: 0 }).as_deref(),
            Some("3")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn both_teams_scoring_once_is_a_tie_in_the_ledger() {
        let (h, players) = active_match(5).await;
        on_score(&h.state, players[0]).await.unwrap();
        on_score(&h.state, players[1]).await.unwrap();
        let snapshot = h.state.ledger().read().await.snapshot();
        assert_eq!(snapshot.get(&0), Some(&5));
        assert_eq!(snapshot.get(&1), Some(&5));
    }

    #[tokio::test(start_paused = true)]
    async fn score_during_warmup_is_ignored() {
        let room = InMemoryRoom::new();
        let host = room.join("host").unwrap();
        config(3).publish(&host).unwrap();
        assign_teams_by_join_order(&host).unwrap();
        let h = harness(host.clone());

        assert_eq!(
            on_score(&h.state, host.id()).await,
            Err(MatchError::ScoringDisabled(MatchPhase::Warmup))
        );
        assert!(h.state.ledger().read().await.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn score_while_ending_is_refused() {
        let (h, players) = active_match(3).await;
        let plan = h
            .state
            .machine()
            .write()
            .await
            .plan(MatchEvent::MatchElapsed)
            .unwrap();
        let tally = h.state.ledger().read().await.snapshot();
        h.display.clear();

        assert_eq!(
            on_score(&h.state, players[1]).await,
            Err(MatchError::ScoringDisabled(MatchPhase::Ended))
        );
        assert_eq!(h.state.ledger().read().await.snapshot(), tally);
        assert!(h.display.updates().is_empty());

        h.state.machine().write().await.abort(plan.id).unwrap();
        assert_eq!(on_score(&h.state, players[1]).await, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn unassigned_scorer_is_dropped_and_reported() {
        let (h, players) = active_match(3).await;
        let mut notifications = h.state.subscribe();
        h.room.room().remove_property(crate::dao::room::PropertyKey::Team(players[1]));

        let before = h.state.ledger().read().await.snapshot();
        let result = on_score(&h.state, players[1]).await;
        assert!(matches!(result, Err(MatchError::NotReady(_))));
        assert_eq!(h.state.ledger().read().await.snapshot(), before);

        let notification = notifications.recv().await.unwrap();
        assert_eq!(notification.event, "score.dropped");
        let payload: serde_json::Value = serde_json::from_str(&notification.data).unwrap();
        assert_eq!(payload["scorer"], serde_json::json!(players[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn late_joiner_team_is_not_in_ledger() {
        let (h, _) = active_match(3).await;
        let late = h.room.room().join("late").unwrap();
        assign_teams_by_join_order(&h.room).unwrap();

        assert_eq!(
            on_score(&h.state, late.id()).await,
            Err(MatchError::UnknownTeam { team: 2 })
        );
        assert_eq!(h.state.ledger().read().await.teams().count(), 2);
        assert!(h.room.is_authority());
    }

    #[tokio::test(start_paused = true)]
    async fn team_is_resolved_when_the_score_is_applied() {
        let (h, players) = active_match(2).await;
        h.room.room().remove_property(crate::dao::room::PropertyKey::Team(players[1]));
        h.room
            .set_shared_property(
                crate::dao::room::PropertyKey::Team(players[1]),
                serde_json::json!(0),
            )
            .unwrap();

        assert_eq!(on_score(&h.state, players[1]).await, Ok(2));
        assert_eq!(h.state.ledger().read().await.score(1), Some(0));
    }
}
