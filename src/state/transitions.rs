use serde_json::Value;
use tracing::{info, warn};

use crate::{
    dao::room::PropertyKey,
    error::MatchError,
    services::notifications::broadcast_phase_changed,
    state::{
        MatchState,
        state_machine::{MatchEvent, MatchPhase},
    },
};

/// Execute a planned state-machine transition, publish the new phase to the
/// room when the local participant is the authority, then broadcast it locally.
pub async fn run_transition_with_broadcast<F, Fut, T>(
    state: &MatchState,
    event: MatchEvent,
    work: F,
) -> Result<T, MatchError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, MatchError>>,
{
    let (res, next) = state.run_transition(event, work).await?;
    info!(phase = next.as_str(), "match phase changed");

    if state.room().is_authority() {
        publish_phase(state, next);
    }
    let version = state.snapshot().await.version;
    broadcast_phase_changed(state, next, version);
    Ok(res)
}

/// Replicate `phase` so followers can apply the same transition.
fn publish_phase(state: &MatchState, phase: MatchPhase) {
    if let Err(err) = state
        .room()
        .set_shared_property(PropertyKey::Phase, Value::from(phase.as_str()))
    {
        warn!(phase = phase.as_str(), error = %err, "failed to publish match phase");
    }
}
