use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dao::room::RoomEvent,
    error::MatchError,
    services::team_assignment::assign_joiner,
    state::{MatchState, SharedMatch, state_machine::MatchPhase},
};

/// Follow room notifications for the lifetime of the match.
pub fn spawn_room_listener(state: SharedMatch) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = state.room().subscribe();
        let mut cancel = state.cancel_signal();

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(event) => {
                    if let Err(err) = handle_room_event(&state, &event).await {
                        warn!(?event, error = %err, "room event not applied");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "room listener lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("room listener stopped");
    })
}

/// React to one room notification.
pub async fn handle_room_event(state: &MatchState, event: &RoomEvent) -> Result<(), MatchError> {
    let room = state.room();
    match event {
        RoomEvent::Joined(participant) => {
            if room.is_authority() {
                let team = assign_joiner(room, *participant)?;
                debug!(%participant, team, "joiner has a team");
            }
        }
        RoomEvent::Left(participant) => {
            info!(%participant, "participant left; their team keeps its score");
            if room.authority().is_none() {
                warn!(%participant, "room authority left; phase progression may stall");
            }
        }
        RoomEvent::PropertyChanged(key) if key.is_configuration() => {
            let phase = state.phase().await;
            if phase > MatchPhase::Warmup {
                warn!(
                    %key,
                    phase = phase.as_str(),
                    "room option changed after the match started; ignored"
                );
                return Err(MatchError::ConfigFrozen);
            }
        }
        RoomEvent::PropertyChanged(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        dao::{
            memory::InMemoryRoom,
            room::{PropertyKey, RoomPlatform},
        },
        services::{match_service::enter_active, team_assignment::team_of},
        state::{room_config::RoomConfig, testing::harness},
    };

    #[tokio::test(start_paused = true)]
    async fn authority_assigns_joiners() {
        let room = InMemoryRoom::new();
        let host = room.join("host").unwrap();
        let h = harness(host.clone());
        let listener = spawn_room_listener(h.state.clone());
        tokio::time::sleep(Duration::from_millis(1)).await;

        let guest = room.join("guest").unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(team_of(&host, guest.id()), Ok(1));

        h.state.leave().unwrap();
        listener.await.unwrap();
    }

    #[tokio::test]
    async fn followers_do_not_assign_joiners() {
        let room = InMemoryRoom::new();
        let _host = room.join("host").unwrap();
        let guest = room.join("guest").unwrap();
        let h = harness(guest.clone());

        let late = room.join("late").unwrap();
        handle_room_event(&h.state, &RoomEvent::Joined(late.id()))
            .await
            .unwrap();
        assert!(team_of(&guest, late.id()).is_err());
    }

    #[tokio::test]
    async fn authority_leaving_is_tolerated() {
        let room = InMemoryRoom::new();
        let host = room.join("host").unwrap();
        let guest = room.join("guest").unwrap();
        let h = harness(guest.clone());

        host.leave_room().unwrap();
        assert!(
            handle_room_event(&h.state, &RoomEvent::Left(host.id()))
                .await
                .is_ok()
        );
        assert_eq!(guest.authority(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn configuration_change_after_start_is_a_violation() {
        let room = InMemoryRoom::new();
        let host = room.join("host").unwrap();
        RoomConfig::default().publish(&host).unwrap();
        let h = harness(host.clone());
        let event = RoomEvent::PropertyChanged(PropertyKey::PointsPerScore);

        assert!(handle_room_event(&h.state, &event).await.is_ok());
        enter_active(&h.state).await.unwrap();

        host.set_shared_property(PropertyKey::PointsPerScore, json!(10))
            .unwrap();
        assert_eq!(
            handle_room_event(&h.state, &event).await,
            Err(MatchError::ConfigFrozen)
        );
        assert_eq!(h.state.frozen_config().await.map(|c| c.points_per_score), Some(3));
        assert!(
            handle_room_event(&h.state, &RoomEvent::PropertyChanged(PropertyKey::Phase))
                .await
                .is_ok()
        );
    }
}
