use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    dao::room::{PropertyKey, RoomPlatform},
    error::MatchError,
};

/// Room-level match options replicated to every participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Warm-up countdown length.
    pub warmup_seconds: u32,
    /// Match countdown length.
    pub match_seconds: u32,
    /// Points added to a team for each score.
    pub points_per_score: u32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            warmup_seconds: 15,
            match_seconds: 60,
            points_per_score: 3,
        }
    }
}

/// One editable room option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomSetting {
    /// Warm-up length in seconds.
    WarmupLength,
    /// Match length in seconds.
    GameLength,
    /// Points per score.
    PointsPerScore,
}

impl RoomSetting {
    /// Replicated key holding this option.
    pub fn key(self) -> PropertyKey {
        match self {
            RoomSetting::WarmupLength => PropertyKey::WarmupLength,
            RoomSetting::GameLength => PropertyKey::GameLength,
            RoomSetting::PointsPerScore => PropertyKey::PointsPerScore,
        }
    }
}

impl RoomConfig {
    /// Read every option; any missing or malformed option is an error.
    pub fn read(room: &dyn RoomPlatform) -> Result<Self, MatchError> {
        Ok(Self {
            warmup_seconds: read_setting(room, RoomSetting::WarmupLength)?,
            match_seconds: read_setting(room, RoomSetting::GameLength)?,
            points_per_score: read_setting(room, RoomSetting::PointsPerScore)?,
        })
    }

    /// Publish every option to the room.
    pub fn publish(&self, room: &dyn RoomPlatform) -> Result<(), MatchError> {
        for (setting, value) in [
            (RoomSetting::WarmupLength, self.warmup_seconds),
            (RoomSetting::GameLength, self.match_seconds),
            (RoomSetting::PointsPerScore, self.points_per_score),
        ] {
            room.set_shared_property(setting.key(), Value::from(value))?;
        }
        Ok(())
    }
}

/// Read one option from the room.
///
/// A missing option is reported as [`MatchError::Configuration`]; options are
/// written before the match scene starts, so absence is not a replication race.
pub fn read_setting(room: &dyn RoomPlatform, setting: RoomSetting) -> Result<u32, MatchError> {
    let key = setting.key();
    let value = room
        .shared_property(key)
        .ok_or_else(|| MatchError::Configuration(format!("room option `{key}` is not set")))?;
    parse_u32(key, &value)
}

/// Interpret a replicated value as a non-negative integer.
pub fn parse_u32(key: PropertyKey, value: &Value) -> Result<u32, MatchError> {
    value
        .as_u64()
        .and_then(|raw| u32::try_from(raw).ok())
        .ok_or_else(|| MatchError::InvalidProperty {
            key: key.to_string(),
            message: format!("expected a non-negative integer, got {value}"),
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dao::memory::InMemoryRoom;

    #[test]
    fn defaults_match_waiting_room_values() {
        let defaults = RoomConfig::default();
        assert_eq!(defaults.warmup_seconds, 15);
        assert_eq!(defaults.match_seconds, 60);
        assert_eq!(defaults.points_per_score, 3);
    }

    #[test]
    fn publish_then_read_returns_same_options() {
        let room = InMemoryRoom::new();
        let host = room.join("host").unwrap();
        let config = RoomConfig {
            warmup_seconds: 2,
            match_seconds: 4,
            points_per_score: 5,
        };
        config.publish(&host).unwrap();
        assert_eq!(RoomConfig::read(&host).unwrap(), config);
    }

    #[test]
    fn missing_option_is_a_configuration_error() {
        let room = InMemoryRoom::new();
        let host = room.join("host").unwrap();
        RoomConfig::default().publish(&host).unwrap();
        room.remove_property(PropertyKey::PointsPerScore);

        match RoomConfig::read(&host) {
            Err(MatchError::Configuration(message)) => {
                assert!(message.contains("points_per_score"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn negative_or_textual_values_are_rejected() {
        assert!(matches!(
            parse_u32(PropertyKey::GameLength, &json!(-4)),
            Err(MatchError::InvalidProperty { .. })
        ));
        assert!(matches!(
            parse_u32(PropertyKey::GameLength, &json!("60")),
            Err(MatchError::InvalidProperty { .. })
        ));
        assert_eq!(parse_u32(PropertyKey::GameLength, &json!(60)), Ok(60));
    }
}
