use indexmap::IndexMap;

use crate::{error::MatchError, state::TeamId};

/// Per-match team scores.
///
/// The team set is fixed the first time [`TeamScoreLedger::initialize`] runs
/// (Active entry); afterwards only existing entries can grow.
#[derive(Debug, Clone, Default)]
pub struct TeamScoreLedger {
    scores: IndexMap<TeamId, u32>,
    frozen: bool,
}

impl TeamScoreLedger {
    /// Create an empty, not yet initialised ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every distinct team with a score of zero and freeze the team set.
    ///
    /// Returns the number of teams registered by this call. Calling it again after
    /// the ledger is frozen registers nothing.
    pub fn initialize(&mut self, teams: impl IntoIterator<Item = TeamId>) -> usize {
        if self.frozen {
            return 0;
        }

        let before = self.scores.len();
        for team in teams {
            self.scores.entry(team).or_insert(0);
        }
        self.scores.sort_keys();
        self.frozen = true;

        self.scores.len() - before
    }

    /// Add `points` to `team`, returning its new total.
    pub fn apply_score(&mut self, team: TeamId, points: u32) -> Result<u32, MatchError> {
        let score = self
            .scores
            .get_mut(&team)
            .ok_or(MatchError::UnknownTeam { team })?;
        *score = score.saturating_add(points);
        Ok(*score)
    }

    /// Current score of `team`, if registered.
    pub fn score(&self, team: TeamId) -> Option<u32> {
        self.scores.get(&team).copied()
    }

    /// Registered teams in ascending order.
    pub fn teams(&self) -> impl Iterator<Item = TeamId> + '_ {
        self.scores.keys().copied()
    }

    /// Whether the team set has been fixed.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Copy of every team score, ordered by team id.
    pub fn snapshot(&self) -> IndexMap<TeamId, u32> {
        self.scores.clone()
    }
}
