use std::fmt;

use tracing::warn;

use crate::{
    error::{CollaboratorError, MatchError},
    state::{TeamId, timer::Remaining},
};

/// Prefix of the warm-up popup countdown.
pub const WARMUP_PREFIX: &str = "Warmup ending in ";

/// Addressable text view owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkId {
    /// Popup used for the warm-up countdown and the final outcome.
    Popup,
    /// Match clock view.
    Timer(usize),
    /// Score slot of `team` on scoreboard `board`.
    Score {
        /// Scoreboard index.
        board: usize,
        /// Team slot on that scoreboard.
        team: TeamId,
    },
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkId::Popup => f.write_str("popup"),
            SinkId::Timer(index) => write!(f, "timer[{index}]"),
            SinkId::Score { board, team } => write!(f, "scoreboard[{board}].team[{team}]"),
        }
    }
}

/// Host-provided text views.
pub trait DisplaySink: Send + Sync {
    /// Replace the text shown by `sink`. Empty text hides the view.
    fn update_display(&self, sink: SinkId, text: &str) -> Result<(), CollaboratorError>;
}

/// How many timer views and scoreboards the host exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayLayout {
    /// Number of match clock views.
    pub timer_views: usize,
    /// Number of scoreboards; each has one slot per team.
    pub scoreboards: usize,
    /// Team slots per scoreboard.
    pub team_slots: usize,
}

impl Default for DisplayLayout {
    fn default() -> Self {
        Self {
            timer_views: 3,
            scoreboards: 3,
            team_slots: 6,
        }
    }
}

impl DisplayLayout {
    /// Every match clock view.
    pub fn timer_sinks(&self) -> impl Iterator<Item = SinkId> + use<> {
        (0..self.timer_views).map(SinkId::Timer)
    }

    /// The slot of `team` on every scoreboard.
    pub fn score_sinks(&self, team: TeamId) -> impl Iterator<Item = SinkId> + use<> {
        (0..self.scoreboards).map(move |board| SinkId::Score { board, team })
    }
}

/// Popup text for the warm-up countdown.
pub fn warmup_text(remaining: Remaining) -> String {
    format!("{WARMUP_PREFIX}{remaining}")
}

/// Update one sink, logging and returning any failure.
pub fn update(display: &dyn DisplaySink, sink: SinkId, text: &str) -> Result<(), MatchError> {
    display.update_display(sink, text).map_err(|err| {
        warn!(%sink, error = %err, "display update failed");
        MatchError::from(err)
    })
}

/// Update several sinks; one failing sink does not stop the others.
pub fn update_all(
    display: &dyn DisplaySink,
    sinks: impl IntoIterator<Item = SinkId>,
    text: &str,
) -> Vec<MatchError> {
    sinks
        .into_iter()
        .filter_map(|sink| update(display, sink, text).err())
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Display fake recording every update, optionally failing for some sinks.
    #[derive(Debug, Default)]
    pub struct RecordingDisplay {
        pub updates: Mutex<Vec<(SinkId, String)>>,
        pub broken: Vec<SinkId>,
    }

    impl RecordingDisplay {
        pub fn with_broken(broken: Vec<SinkId>) -> Self {
            Self {
                broken,
                ..Self::default()
            }
        }

        pub fn updates(&self) -> Vec<(SinkId, String)> {
            self.updates.lock().unwrap().clone()
        }

        pub fn last_text(&self, sink: SinkId) -> Option<String> {
            self.updates()
                .into_iter()
                .rev()
                .find(|(target, _)| *target == sink)
                .map(|(_, text)| text)
        }

        pub fn clear(&self) {
            self.updates.lock().unwrap().clear();
        }
    }

    impl DisplaySink for RecordingDisplay {
        fn update_display(&self, sink: SinkId, text: &str) -> Result<(), CollaboratorError> {
            if self.broken.contains(&sink) {
                return Err(CollaboratorError::new("display", format!("{sink} is missing")));
            }
            self.updates.lock().unwrap().push((sink, text.to_string()));
            Ok(())
        }
    }
}
