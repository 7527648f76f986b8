use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::state::TeamId;

/// Result of a match from the point of view of one team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The team holds the highest score alone.
    Win,
    /// The team shares the highest score with at least one other team.
    Tie,
    /// Another team scored more.
    Loss,
}

impl Outcome {
    /// Popup text shown to the local participant.
    pub fn message(self) -> &'static str {
        match self {
            Outcome::Win => "You Won!",
            Outcome::Tie => "You Tied!",
            Outcome::Loss => "You Lost!",
        }
    }
}

/// Reasons an outcome cannot be computed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutcomeError {
    /// No team was registered when the match started.
    #[error("cannot evaluate an outcome from an empty ledger")]
    EmptyLedger,
    /// The local team never made it into the ledger.
    #[error("team {0} is not present in the ledger")]
    TeamNotInLedger(TeamId),
}

/// Decide whether `team` won, tied or lost given the final scores.
pub fn evaluate(scores: &IndexMap<TeamId, u32>, team: TeamId) -> Result<Outcome, OutcomeError> {
    let max_score = scores
        .values()
        .copied()
        .max()
        .ok_or(OutcomeError::EmptyLedger)?;
    let own = *scores.get(&team).ok_or(OutcomeError::TeamNotInLedger(team))?;

    if own != max_score {
        return Ok(Outcome::Loss);
    }

    let at_max = scores.values().filter(|score| **score == max_score).count();
    if at_max == 1 {
        Ok(Outcome::Win)
    } else {
        Ok(Outcome::Tie)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(entries: &[(TeamId, u32)]) -> IndexMap<TeamId, u32> {
        entries.iter().copied().collect()
    }

    #[test]
    fn unique_leader_wins_and_others_lose() {
        let ledger = scores(&[(0, 3), (1, 0)]);
        assert_eq!(evaluate(&ledger, 0), Ok(Outcome::Win));
        assert_eq!(evaluate(&ledger, 1), Ok(Outcome::Loss));
    }

    #[test]
    fn shared_maximum_is_a_tie() {
        let ledger = scores(&[(0, 5), (1, 5)]);
        assert_eq!(evaluate(&ledger, 0), Ok(Outcome::Tie));
        assert_eq!(evaluate(&ledger, 1), Ok(Outcome::Tie));
    }

    #[test]
    fn goalless_match_ties_everyone() {
        let ledger = scores(&[(0, 0), (1, 0), (2, 0)]);
        for team in 0..3 {
            assert_eq!(evaluate(&ledger, team), Ok(Outcome::Tie));
        }
    }

    #[test]
    fn tie_at_top_still_loses_for_trailing_team() {
        let ledger = scores(&[(0, 6), (1, 6), (2, 3)]);
        assert_eq!(evaluate(&ledger, 2), Ok(Outcome::Loss));
        assert_eq!(evaluate(&ledger, 1), Ok(Outcome::Tie));
    }

    #[test]
    fn win_only_when_alone_at_maximum() {
        let ledgers = [
            scores(&[(0, 9), (1, 3), (2, 3)]),
            scores(&[(0, 3), (1, 9), (2, 9)]),
            scores(&[(0, 0)]),
            scores(&[(3, 12), (7, 15)]),
        ];
        for ledger in &ledgers {
            let max = ledger.values().copied().max().unwrap();
            let leaders = ledger.values().filter(|score| **score == max).count();
            for (team, score) in ledger {
                let outcome = evaluate(ledger, *team).unwrap();
                assert_eq!(outcome == Outcome::Win, *score == max && leaders == 1);
                assert_eq!(outcome == Outcome::Tie, *score == max && leaders > 1);
                assert_eq!(outcome == Outcome::Loss, *score != max);
            }
        }
    }

    #[test]
    fn empty_ledger_is_rejected() {
        assert_eq!(
            evaluate(&IndexMap::new(), 0),
            Err(OutcomeError::EmptyLedger)
        );
    }

    #[test]
    fn missing_team_is_surfaced_instead_of_loss() {
        let ledger = scores(&[(0, 3), (1, 0)]);
        assert_eq!(evaluate(&ledger, 4), Err(OutcomeError::TeamNotInLedger(4)));
    }

    #[test]
    fn messages_match_popup_text() {
        assert_eq!(Outcome::Win.message(), "You Won!");
        assert_eq!(Outcome::Tie.message(), "You Tied!");
        assert_eq!(Outcome::Loss.message(), "You Lost!");
    }
}
