use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    dao::room::{ParticipantId, PropertyKey, RoomPlatform},
    error::MatchError,
    state::{TeamId, room_config::parse_u32, timer::CancelSignal},
};

/// Backoff used while waiting for replicated team data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the second read.
    pub initial_delay: Duration,
    /// Upper bound for the doubling delay.
    pub max_delay: Duration,
    /// Total number of reads, including the first one.
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            attempts: 4,
        }
    }
}

/// Read the replicated team of `participant`.
///
/// Missing data is [`MatchError::NotReady`]: the assignment may still be in
/// flight, so callers retry instead of assuming a team.
pub fn team_of(room: &dyn RoomPlatform, participant: ParticipantId) -> Result<TeamId, MatchError> {
    let key = PropertyKey::Team(participant);
    let value = room
        .shared_property(key)
        .ok_or_else(|| MatchError::NotReady(key.to_string()))?;
    parse_u32(key, &value)
}

/// Poll [`team_of`] with exponential backoff until it resolves, attempts run
/// out, or the match is cancelled.
pub async fn await_team(
    room: &dyn RoomPlatform,
    participant: ParticipantId,
    retry: RetryPolicy,
    mut cancel: CancelSignal,
) -> Result<TeamId, MatchError> {
    let mut delay = retry.initial_delay;
    let mut attempt = 1;

    loop {
        match team_of(room, participant) {
            Err(MatchError::NotReady(key)) if attempt < retry.attempts => {
                debug!(%participant, attempt, %key, "team not replicated yet; retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(MatchError::Cancelled),
                    _ = sleep(delay) => {}
                }
                delay = (delay * 2).min(retry.max_delay);
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Give every unassigned participant the team matching its join index.
///
/// Existing assignments are kept, even when they differ from the index.
/// Returns the assignments of every participant in join order.
pub fn assign_teams_by_join_order(
    room: &dyn RoomPlatform,
) -> Result<Vec<(ParticipantId, TeamId)>, MatchError> {
    let mut assignments = Vec::new();

    for (index, participant) in room.participants().into_iter().enumerate() {
        let team = join_index_team(index)?;
        let assigned = assign_if_missing(room, participant.id, team)?;
        assignments.push((participant.id, assigned));
    }

    Ok(assignments)
}

/// Assign the local participant to the team matching its own join index.
pub fn assign_local_team(room: &dyn RoomPlatform) -> Result<TeamId, MatchError> {
    let local = room.local_participant();
    let index = join_index(room, local)?;
    assign_if_missing(room, local, join_index_team(index)?)
}

/// Assign a participant that just joined. Only the authority writes other
/// participants' teams.
pub fn assign_joiner(
    room: &dyn RoomPlatform,
    participant: ParticipantId,
) -> Result<TeamId, MatchError> {
    if !room.is_authority() {
        return Err(MatchError::NotAuthority("assign teams".into()));
    }
    let index = join_index(room, participant)?;
    assign_if_missing(room, participant, join_index_team(index)?)
}

fn join_index(room: &dyn RoomPlatform, participant: ParticipantId) -> Result<usize, MatchError> {
    room.participants()
        .iter()
        .position(|candidate| candidate.id == participant)
        .ok_or_else(|| {
            MatchError::InvalidState(format!("participant {participant} is not in the room"))
        })
}

fn join_index_team(index: usize) -> Result<TeamId, MatchError> {
    TeamId::try_from(index)
        .map_err(|_| MatchError::InvalidState(format!("join index {index} exceeds team range")))
}

fn assign_if_missing(
    room: &dyn RoomPlatform,
    participant: ParticipantId,
    team: TeamId,
) -> Result<TeamId, MatchError> {
    match team_of(room, participant) {
        Ok(existing) => {
            if existing != team {
                warn!(
                    %participant,
                    existing,
                    join_order_team = team,
                    "participant already assigned; keeping existing team"
                );
            }
            Ok(existing)
        }
        Err(MatchError::NotReady(_)) => {
            room.set_shared_property(PropertyKey::Team(participant), Value::from(team))?;
            info!(%participant, team, "assigned participant to team");
            Ok(team)
        }
        Err(err) => Err(err),
    }
}
