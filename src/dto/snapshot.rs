use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    dao::room::{PropertyKey, RoomPlatform},
    error::MatchError,
    state::TeamId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Score of one team.
pub struct TeamScore {
    /// Team identifier.
    pub team: TeamId,
    /// Accumulated score.
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Canonical scores published by the authority when the match ends.
pub struct FinalScores {
    /// Every ledger entry, ordered by team.
    pub scores: Vec<TeamScore>,
}

impl FinalScores {
    /// Build from a ledger snapshot.
    pub fn from_snapshot(snapshot: &IndexMap<TeamId, u32>) -> Self {
        Self {
            scores: to_team_scores(snapshot),
        }
    }

    /// Convert back to a team → score mapping.
    pub fn to_snapshot(&self) -> IndexMap<TeamId, u32> {
        self.scores
            .iter()
            .map(|entry| (entry.team, entry.score))
            .collect()
    }

    /// Publish as the canonical result of the match.
    pub fn publish(&self, room: &dyn RoomPlatform) -> Result<(), MatchError> {
        let value = serde_json::to_value(self).map_err(|err| MatchError::InvalidProperty {
            key: PropertyKey::FinalScores.to_string(),
            message: err.to_string(),
        })?;
        room.set_shared_property(PropertyKey::FinalScores, value)?;
        Ok(())
    }

    /// Read the canonical result, `Ok(None)` when it has not been replicated.
    pub fn read(room: &dyn RoomPlatform) -> Result<Option<Self>, MatchError> {
        let Some(value) = room.shared_property(PropertyKey::FinalScores) else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|err| MatchError::InvalidProperty {
                key: PropertyKey::FinalScores.to_string(),
                message: err.to_string(),
            })
    }
}

/// Flatten a ledger snapshot into serialisable entries.
pub fn to_team_scores(snapshot: &IndexMap<TeamId, u32>) -> Vec<TeamScore> {
    snapshot
        .iter()
        .map(|(team, score)| TeamScore {
            team: *team,
            score: *score,
        })
        .collect()
}
