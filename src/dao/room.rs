use std::fmt;

use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::CollaboratorError;

/// Stable identifier of a participant connection.
pub type ParticipantId = Uuid;

/// Participant as listed by the room platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Connection identifier.
    pub id: ParticipantId,
    /// Display name chosen by the participant.
    pub nickname: String,
}

/// Keys of replicated room properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// Warm-up length in seconds.
    WarmupLength,
    /// Match length in seconds.
    GameLength,
    /// Points added to a team per score event.
    PointsPerScore,
    /// Team assigned to a participant.
    Team(ParticipantId),
    /// Phase published by the authority.
    Phase,
    /// Canonical final scores published by the authority at the end of the match.
    FinalScores,
}

impl PropertyKey {
    /// Whether this key is part of the room configuration frozen at Active entry.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PropertyKey::WarmupLength | PropertyKey::GameLength | PropertyKey::PointsPerScore
        )
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::WarmupLength => f.write_str("warmup_length"),
            PropertyKey::GameLength => f.write_str("game_length"),
            PropertyKey::PointsPerScore => f.write_str("points_per_score"),
            PropertyKey::Team(id) => write!(f, "team.{id}"),
            PropertyKey::Phase => f.write_str("match.phase"),
            PropertyKey::FinalScores => f.write_str("match.final_scores"),
        }
    }
}

/// Notifications delivered by the room platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// A participant entered the room.
    Joined(ParticipantId),
    /// A participant left the room.
    Left(ParticipantId),
    /// A replicated property was written.
    PropertyChanged(PropertyKey),
}

/// Networked room the match runs in.
///
/// Writes are fire-and-forget: they are published to every participant and
/// observed eventually, with no ordering guarantee across keys.
pub trait RoomPlatform: Send + Sync {
    /// Identifier of the participant running this process.
    fn local_participant(&self) -> ParticipantId;
    /// Current participants in join order.
    fn participants(&self) -> Vec<Participant>;
    /// Publish a replicated property.
    fn set_shared_property(&self, key: PropertyKey, value: Value) -> Result<(), CollaboratorError>;
    /// Read the locally replicated value of a property.
    fn shared_property(&self, key: PropertyKey) -> Option<Value>;
    /// Whether the local participant currently holds the authority role.
    fn is_authority(&self) -> bool;
    /// Participant holding the authority role, `None` once it left.
    fn authority(&self) -> Option<ParticipantId>;
    /// Subscribe to join/leave and property notifications.
    fn subscribe(&self) -> broadcast::Receiver<RoomEvent>;
    /// Allow or refuse new joiners.
    fn set_open(&self, open: bool) -> Result<(), CollaboratorError>;
    /// Leave the room.
    fn leave_room(&self) -> Result<(), CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_render_as_replicated_names() {
        let id = Uuid::nil();
        assert_eq!(PropertyKey::WarmupLength.to_string(), "warmup_length");
        assert_eq!(PropertyKey::GameLength.to_string(), "game_length");
        assert_eq!(PropertyKey::PointsPerScore.to_string(), "points_per_score");
        assert_eq!(
            PropertyKey::Team(id).to_string(),
            "team.00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(PropertyKey::Phase.to_string(), "match.phase");
    }

    #[test]
    fn only_settings_are_configuration() {
        assert!(PropertyKey::PointsPerScore.is_configuration());
        assert!(!PropertyKey::Team(Uuid::nil()).is_configuration());
        assert!(!PropertyKey::Phase.is_configuration());
    }
}
