//! Demo host running a scripted two-player match on an in-process room.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use match_loop::{
    config::AppConfig,
    dao::{
        memory::{InMemoryRoom, RoomHandle},
        room::ParticipantId,
    },
    error::CollaboratorError,
    services::{
        display::{DisplaySink, SinkId},
        lobby_service::{publish_default_settings, roster, start_match},
        match_service::{MatchReport, spawn_match, wait_for_phase},
        room_events::spawn_room_listener,
        scoring_service::{ScoringControls, on_score},
        team_assignment::assign_teams_by_join_order,
    },
    state::{Collaborators, MatchState, SharedMatch, state_machine::MatchPhase},
};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let room = InMemoryRoom::new();
    let host = room.join("host").context("joining as host")?;
    let guest = room.join("guest").context("joining as guest")?;

    publish_default_settings(&host, &config.room_defaults).context("publishing settings")?;
    assign_teams_by_join_order(&host).context("assigning teams")?;
    for entry in roster(&host, config.palette()) {
        info!(
            participant = %entry.participant,
            nickname = %entry.nickname,
            team = ?entry.team,
            color = ?entry.color,
            "roster"
        );
    }
    start_match(&host).context("starting match")?;

    let host_match = new_match("host", host.clone(), &config);
    let guest_match = new_match("guest", guest.clone(), &config);
    let listener = spawn_room_listener(host_match.clone());
    let host_run = spawn_match(host_match.clone());
    let guest_run = spawn_match(guest_match.clone());

    let scorers = vec![host.id(), guest.id(), host.id()];
    let script = tokio::spawn(play_script(
        vec![host_match.clone(), guest_match.clone()],
        scorers,
        config.room_defaults.match_seconds,
    ));

    let host_report = host_run.await.context("host match task")??;
    let guest_report = guest_run.await.context("guest match task")??;
    script.await.context("score script task")?;
    log_report("host", &host_report);
    log_report("guest", &guest_report);

    guest_match.leave()?;
    host_match.leave()?;
    listener.await.context("room listener task")?;
    Ok(())
}

fn new_match(owner: &'static str, room: RoomHandle, config: &AppConfig) -> SharedMatch {
    MatchState::new(
        Collaborators {
            room: Arc::new(room),
            display: Arc::new(LogDisplay { owner }),
            scoring: Arc::new(LogControls { owner }),
        },
        config.match_settings(),
    )
}

/// Fire the scoring trigger on every participant, spread over the match.
async fn play_script(matches: Vec<SharedMatch>, scorers: Vec<ParticipantId>, match_seconds: u32) {
    let Some(first) = matches.first() else {
        return;
    };
    if let Err(err) = wait_for_phase(first, MatchPhase::Active).await {
        warn!(error = %err, "score script stopped before the match started");
        return;
    }

    let gap = Duration::from_secs(u64::from(match_seconds)) / (scorers.len() as u32 + 1);
    for scorer in scorers {
        sleep(gap).await;
        for state in &matches {
            if let Err(err) = on_score(state, scorer).await {
                warn!(%scorer, error = %err, "scripted score rejected");
            }
        }
    }
}

fn log_report(owner: &str, report: &MatchReport) {
    info!(
        owner,
        phase = report.phase.as_str(),
        team = ?report.team,
        scores = ?report.scores,
        outcome = ?report.outcome,
        errors = report.errors.len(),
        "match report"
    );
}

/// Display sink writing every view update to the log.
struct LogDisplay {
    owner: &'static str,
}

impl DisplaySink for LogDisplay {
    fn update_display(&self, sink: SinkId, text: &str) -> Result<(), CollaboratorError> {
        match sink {
            SinkId::Popup if !text.is_empty() => info!(owner = self.owner, text, "popup"),
            _ => debug!(owner = self.owner, %sink, text, "view updated"),
        }
        Ok(())
    }
}

/// Scoring controls that only log.
struct LogControls {
    owner: &'static str,
}

impl ScoringControls for LogControls {
    fn set_scoring_enabled(&self, enabled: bool) -> Result<(), CollaboratorError> {
        info!(owner = self.owner, enabled, "scoring trigger toggled");
        Ok(())
    }

    fn disable_tagged_objects(&self, tag: &str) -> Result<usize, CollaboratorError> {
        info!(owner = self.owner, tag, "tagged objects disabled");
        Ok(0)
    }
}

/// Configure tracing subscribers; `RUST_LOG` overrides the default level.
fn init_tracing() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
