use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    config::{TeamColor, color_for},
    dao::room::{ParticipantId, RoomPlatform},
    error::MatchError,
    services::team_assignment::team_of,
    state::{
        TeamId,
        room_config::{RoomConfig, RoomSetting},
        state_machine::MatchPhase,
    },
};

/// One line of the lobby roster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterEntry {
    /// Participant identifier.
    pub participant: ParticipantId,
    /// Display name.
    pub nickname: String,
    /// Replicated team, `None` while it has not arrived.
    pub team: Option<TeamId>,
    /// Team color, when the team is known.
    pub color: Option<TeamColor>,
}

/// Publish the room options the match will start with.
pub fn publish_default_settings(
    room: &dyn RoomPlatform,
    defaults: &RoomConfig,
) -> Result<(), MatchError> {
    ensure_authority(room, "publish room settings")?;
    defaults.publish(room)?;
    info!(?defaults, "published default room settings");
    Ok(())
}

/// Change one room option before the match starts.
pub fn update_setting(
    room: &dyn RoomPlatform,
    setting: RoomSetting,
    value: u32,
    phase: MatchPhase,
) -> Result<(), MatchError> {
    ensure_authority(room, "change room settings")?;
    if phase > MatchPhase::Warmup {
        warn!(key = %setting.key(), value, phase = phase.as_str(), "rejected late setting change");
        return Err(MatchError::ConfigFrozen);
    }
    room.set_shared_property(setting.key(), Value::from(value))?;
    info!(key = %setting.key(), value, "room setting updated");
    Ok(())
}

/// Close the room to new joiners and let the match begin.
pub fn start_match(room: &dyn RoomPlatform) -> Result<(), MatchError> {
    ensure_authority(room, "start the match")?;
    room.set_open(false)?;
    info!(participants = room.participants().len(), "room closed; match starting");
    Ok(())
}

/// Participants in join order with their replicated team and color.
pub fn roster(room: &dyn RoomPlatform, palette: &[TeamColor]) -> Vec<RosterEntry> {
    room.participants()
        .into_iter()
        .map(|participant| {
            let team = team_of(room, participant.id).ok();
            RosterEntry {
                participant: participant.id,
                nickname: participant.nickname,
                team,
                color: team.map(|team| color_for(palette, team)),
            }
        })
        .collect()
}

fn ensure_authority(room: &dyn RoomPlatform, action: &str) -> Result<(), MatchError> {
    if room.is_authority() {
        Ok(())
    } else {
        Err(MatchError::NotAuthority(action.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{memory::InMemoryRoom, room::PropertyKey},
        services::team_assignment::assign_local_team,
        state::room_config::read_setting,
    };

    #[test]
    fn authority_publishes_defaults() {
        let room = InMemoryRoom::new();
        let host = room.join("host").unwrap();
        let guest = room.join("guest").unwrap();

        assert!(matches!(
            publish_default_settings(&guest, &RoomConfig::default()),
            Err(MatchError::NotAuthority(_))
        ));
        publish_default_settings(&host, &RoomConfig::default()).unwrap();
        assert_eq!(RoomConfig::read(&guest).unwrap(), RoomConfig::default());
    }

    #[test]
    fn settings_freeze_once_active() {
        let room = InMemoryRoom::new();
        let host = room.join("host").unwrap();
        publish_default_settings(&host, &RoomConfig::default()).unwrap();

        update_setting(&host, RoomSetting::PointsPerScore, 5, MatchPhase::Warmup).unwrap();
        assert_eq!(read_setting(&host, RoomSetting::PointsPerScore), Ok(5));

        for phase in [MatchPhase::Active, MatchPhase::Ended] {
            assert_eq!(
                update_setting(&host, RoomSetting::PointsPerScore, 9, phase),
                Err(MatchError::ConfigFrozen)
            );
        }
        assert_eq!(read_setting(&host, RoomSetting::PointsPerScore), Ok(5));
    }

    #[test]
    fn followers_cannot_change_settings() {
        let room = InMemoryRoom::new();
        let _host = room.join("host").unwrap();
        let guest = room.join("guest").unwrap();
        assert!(matches!(
            update_setting(&guest, RoomSetting::GameLength, 30, MatchPhase::Warmup),
            Err(MatchError::NotAuthority(_))
        ));
        assert_eq!(guest.shared_property(PropertyKey::GameLength), None);
    }

    #[test]
    fn starting_closes_the_room() {
        let room = InMemoryRoom::new();
        let host = room.join("host").unwrap();
        let guest = room.join("guest").unwrap();

        assert!(start_match(&guest).is_err());
        assert!(room.is_open());
        start_match(&host).unwrap();
        assert!(!room.is_open());
        assert!(room.join("late").is_err());
    }

    #[test]
    fn roster_lists_join_order_with_colors() {
        let room = InMemoryRoom::new();
        let host = room.join("host").unwrap();
        let guest = room.join("guest").unwrap();
        assign_local_team(&host).unwrap();

        let config = AppConfig::default();
        let entries = roster(&guest, config.palette());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].nickname, "host");
        assert_eq!(entries[0].team, Some(0));
        assert_eq!(entries[0].color, Some(config.team_color(0)));
        assert_eq!(entries[1].participant, guest.id());
        assert_eq!(entries[1].team, None);
        assert_eq!(entries[1].color, None);
    }
}
