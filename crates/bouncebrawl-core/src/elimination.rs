use crate::error::MatchError;
use crate::participant::ParticipantId;

/// What recording one elimination produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EliminationOutcome {
    /// `place` is the final placement of the eliminated participant.
    Recorded { place: usize },
    /// Only one participant is left; it was appended as the winner.
    Finalized {
        place: usize,
        winner: ParticipantId,
        /// Winner first.
        standings: Vec<ParticipantId>,
    },
}

/// Death order of one match.
///
/// `order` lists participants first eliminated first; once finalized the
/// winner is its last entry.
#[derive(Debug, Clone, Default)]
pub struct EliminationRecord {
    order: Vec<ParticipantId>,
    finalized: bool,
}

impl EliminationRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` as eliminated. `roster` is every participant of the match.
    pub fn record(
        &mut self,
        id: ParticipantId,
        roster: &[ParticipantId],
    ) -> Result<EliminationOutcome, MatchError> {
        if self.finalized {
            return Err(MatchError::LeaderboardClosed);
        }
        if !roster.contains(&id) {
            return Err(MatchError::UnknownParticipant(id));
        }
        if self.order.contains(&id) {
            return Err(MatchError::AlreadyEliminated(id));
        }

        self.order.push(id);
        let place = roster.len() + 1 - self.order.len();
        tracing::info!(participant = id, place, "Participant eliminated");

        if self.order.len() + 1 < roster.len() {
            return Ok(EliminationOutcome::Recorded { place });
        }

        // With a single participant nobody survives; the last one out wins
        let winner = match roster.iter().find(|p| !self.order.contains(p)) {
            Some(&survivor) => {
                self.order.push(survivor);
                survivor
            },
            None => id,
        };
        self.finalized = true;
        let standings = self.standings();
        tracing::info!(winner, ?standings, "Leaderboard finalized");
        Ok(EliminationOutcome::Finalized {
            place,
            winner,
            standings,
        })
    }

    /// Elimination sequence, first eliminated first.
    pub fn order(&self) -> &[ParticipantId] {
        &self.order
    }

    /// Final ranking, winner first.
    pub fn standings(&self) -> Vec<ParticipantId> {
        self.order.iter().rev().copied().collect()
    }

    pub fn winner(&self) -> Option<ParticipantId> {
        if self.finalized {
            self.order.last().copied()
        } else {
            None
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn is_eliminated(&self, id: ParticipantId) -> bool {
        self.order.contains(&id) && self.winner() != Some(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.finalized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survivor_appended_as_winner() {
        let roster = [1, 2, 3, 4];
        let mut record = EliminationRecord::new();

        assert_eq!(
            record.record(2, &roster).unwrap(),
            EliminationOutcome::Recorded { place: 4 }
        );
        assert_eq!(
            record.record(4, &roster).unwrap(),
            EliminationOutcome::Recorded { place: 3 }
        );
        assert_eq!(
            record.record(1, &roster).unwrap(),
            EliminationOutcome::Finalized {
                place: 2,
                winner: 3,
                standings: vec![3, 1, 4, 2],
            }
        );
        assert_eq!(record.order(), &[2, 4, 1, 3]);
        assert_eq!(record.winner(), Some(3));
        assert!(!record.is_eliminated(3));
        assert!(record.is_eliminated(2));
    }

    #[test]
    fn rejects_repeat_unknown_and_late_deaths() {
        let roster = [1, 2, 3];
        let mut record = EliminationRecord::new();
        record.record(1, &roster).unwrap();
        assert_eq!(record.record(1, &roster), Err(MatchError::AlreadyEliminated(1)));
        assert_eq!(record.record(9, &roster), Err(MatchError::UnknownParticipant(9)));

        record.record(2, &roster).unwrap();
        assert!(record.is_finalized());
        assert_eq!(record.record(3, &roster), Err(MatchError::LeaderboardClosed));
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn solo_match_finalizes_on_first_death() {
        let mut record = EliminationRecord::new();
        let outcome = record.record(7, &[7]).unwrap();
        assert_eq!(
            outcome,
            EliminationOutcome::Finalized {
                place: 1,
                winner: 7,
                standings: vec![7],
            }
        );
        assert_eq!(record.order(), &[7]);
    }

    #[test]
    fn two_players_finalize_immediately() {
        let mut record = EliminationRecord::new();
        let outcome = record.record(1, &[1, 2]).unwrap();
        assert!(matches!(outcome, EliminationOutcome::Finalized { winner: 2, .. }));
    }

    #[test]
    fn clear_reopens() {
        let mut record = EliminationRecord::new();
        record.record(1, &[1, 2]).unwrap();
        record.clear();
        assert!(record.is_empty());
        assert!(!record.is_finalized());
        assert_eq!(record.winner(), None);
        assert!(record.record(2, &[1, 2]).is_ok());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn finalizes_exactly_once(
                roster in proptest::sample::subsequence((1u64..=8).collect::<Vec<_>>(), 2..=8)
                    .prop_shuffle(),
            ) {
                let mut record = EliminationRecord::new();
                let n = roster.len();
                let mut finalized = 0;
                for (i, &id) in roster.iter().take(n - 1).enumerate() {
                    match record.record(id, &roster).unwrap() {
                        EliminationOutcome::Recorded { place } => {
                            prop_assert!(i < n - 2);
                            prop_assert_eq!(place, n - i);
                        },
                        EliminationOutcome::Finalized { winner, standings, .. } => {
                            finalized += 1;
                            prop_assert_eq!(winner, roster[n - 1]);
                            prop_assert_eq!(standings.len(), n);
                            prop_assert_eq!(standings[0], winner);
                        },
                    }
                }
                prop_assert_eq!(finalized, 1);
                prop_assert_eq!(record.order(), roster.as_slice());
                prop_assert_eq!(
                    record.record(roster[n - 1], &roster),
                    Err(MatchError::LeaderboardClosed)
                );
            }
        }
    }
}
