//! Bracket generation: single and double elimination trees from a seeded entrant list.
//!
//! The builder is pure. It returns a flat list of [`BracketMatch`] records whose
//! forward pointers refer to other records by generation sequence
//! ([`BracketLink::Pending`]); the persister swaps those for real match ids.

use crate::models::{BracketType, MatchId, TeamId, TournamentError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Elimination format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketKind {
    #[default]
    Single,
    Double,
}

/// One entrant of a bracket. Unseeded entrants are seeded by list position.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BracketEntrant {
    pub team_id: TeamId,
    pub seed: Option<u32>,
}

/// Forward pointer to another match of the same bracket.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketLink {
    /// Generation sequence of the target, before persistence.
    Pending(usize),
    Resolved(MatchId),
}

impl BracketLink {
    pub fn match_id(self) -> Option<MatchId> {
        match self {
            BracketLink::Resolved(id) => Some(id),
            BracketLink::Pending(_) => None,
        }
    }
}

/// A generated match, before or after persistence.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BracketMatch {
    pub round: u32,
    pub sequence: usize,
    pub bracket_type: BracketType,
    /// Index within the round, top to bottom.
    pub position: usize,
    pub team_a: Option<TeamId>,
    pub team_b: Option<TeamId>,
    pub next_match_win: Option<BracketLink>,
    pub next_match_lose: Option<BracketLink>,
    /// Entrants that can ever reach this match (2 real, 1 bye, 0 void).
    pub expected_entrants: u8,
    /// Set once persisted.
    pub match_id: Option<MatchId>,
}

impl BracketMatch {
    /// Exactly one slot filled at generation time: auto-advances without play.
    pub fn is_bye(&self) -> bool {
        self.team_a.is_some() != self.team_b.is_some()
    }

    fn seated_count(&self) -> u8 {
        u8::from(self.team_a.is_some()) + u8::from(self.team_b.is_some())
    }
}

/// Build a single-elimination bracket.
pub fn generate_single_elimination(
    entrants: &[BracketEntrant],
) -> Result<Vec<BracketMatch>, TournamentError> {
    let ranked = rank_entrants(entrants)?;
    let mut builder = Builder::default();
    builder.winner_bracket(&ranked);
    builder.count_entrants();
    Ok(builder.matches)
}

/// Build a double-elimination bracket: winner bracket, loser bracket, grand final.
pub fn generate_double_elimination(
    entrants: &[BracketEntrant],
) -> Result<Vec<BracketMatch>, TournamentError> {
    let ranked = rank_entrants(entrants)?;
    let mut builder = Builder::default();
    let winner_rounds = builder.winner_bracket(&ranked);
    builder.loser_bracket(&winner_rounds);
    builder.count_entrants();
    Ok(builder.matches)
}

pub fn generate(
    kind: BracketKind,
    entrants: &[BracketEntrant],
) -> Result<Vec<BracketMatch>, TournamentError> {
    match kind {
        BracketKind::Single => generate_single_elimination(entrants),
        BracketKind::Double => generate_double_elimination(entrants),
    }
}

/// Standard seeding order for a power-of-two bracket, e.g. size 8 gives `[1,8,4,5,2,7,3,6]`.
///
/// Consecutive pairs are the first-round pairings. Seeds 1 and 2 land in opposite halves.
pub fn seeding_order(size: usize) -> Vec<usize> {
    let mut order = vec![1, 2];
    order.truncate(size);
    while order.len() < size {
        let count = order.len();
        order = order
            .iter()
            .flat_map(|&seed| [seed, count * 2 + 1 - seed])
            .collect();
    }
    order
}

/// Number of rounds of the winner bracket: `ceil(log2(n))`.
pub fn rounds_for(entrants: usize) -> usize {
    let mut rounds = 0;
    while (1usize << rounds) < entrants {
        rounds += 1;
    }
    rounds
}

/// Order entrants by seed (explicit seed, or 1-based list position when absent), stable.
fn rank_entrants(entrants: &[BracketEntrant]) -> Result<Vec<TeamId>, TournamentError> {
    if entrants.len() < 2 {
        return Err(TournamentError::NotEnoughParticipants {
            count: entrants.len(),
        });
    }
    let mut seen = HashSet::new();
    if !entrants.iter().all(|e| seen.insert(e.team_id)) {
        return Err(TournamentError::DuplicateBracketEntry);
    }
    let mut indexed: Vec<(u32, TeamId)> = entrants
        .iter()
        .zip(1u32..)
        .map(|(e, position)| (e.seed.unwrap_or(position), e.team_id))
        .collect();
    indexed.sort_by_key(|(seed, _)| *seed);
    Ok(indexed.into_iter().map(|(_, team)| team).collect())
}

#[derive(Default)]
struct Builder {
    /// Index equals sequence.
    matches: Vec<BracketMatch>,
}

impl Builder {
    fn push(&mut self, round: usize, bracket_type: BracketType, position: usize) -> usize {
        let sequence = self.matches.len();
        self.matches.push(BracketMatch {
            round: round as u32,
            sequence,
            bracket_type,
            position,
            team_a: None,
            team_b: None,
            next_match_win: None,
            next_match_lose: None,
            expected_entrants: 0,
            match_id: None,
        });
        sequence
    }

    /// Generate rounds from the final back to round 1 and seat round 1.
    /// Returns sequences per round, round 1 first.
    fn winner_bracket(&mut self, ranked: &[TeamId]) -> Vec<Vec<usize>> {
        let total_rounds = rounds_for(ranked.len());
        let size = 1usize << total_rounds;

        let mut rounds = vec![Vec::new(); total_rounds];
        for round in (1..=total_rounds).rev() {
            let count = 1usize << (total_rounds - round);
            rounds[round - 1] = (0..count)
                .map(|i| self.push(round, BracketType::Winner, i))
                .collect();
        }

        for pair in rounds.windows(2) {
            for (i, &seq) in pair[0].iter().enumerate() {
                self.matches[seq].next_match_win = Some(BracketLink::Pending(pair[1][i / 2]));
            }
        }

        let order = seeding_order(size);
        for (i, &seq) in rounds[0].iter().enumerate() {
            let m = &mut self.matches[seq];
            m.team_a = ranked.get(order[2 * i] - 1).copied();
            m.team_b = ranked.get(order[2 * i + 1] - 1).copied();
        }

        rounds
    }

    /// Loser bracket of `2 * W - 2` rounds plus the grand final.
    ///
    /// Odd loser rounds feed the next round 1:1, even loser rounds merge pairs 2:1.
    /// Losers of winner round 1 pair up in loser round 1; losers of winner round
    /// `k >= 2` enter loser round `2 * (k - 1)`.
    fn loser_bracket(&mut self, winner_rounds: &[Vec<usize>]) {
        let total_winner = winner_rounds.len();
        let size = 1usize << total_winner;
        let total_loser = 2 * total_winner - 2;

        let mut rounds = vec![Vec::new(); total_loser];
        for round in (1..=total_loser).rev() {
            let count = size >> ((round + 1) / 2 + 1);
            rounds[round - 1] = (0..count)
                .map(|i| self.push(round, BracketType::Loser, i))
                .collect();
        }
        let grand_final = self.push(total_winner + 1, BracketType::GrandFinal, 0);

        for round in 1..total_loser {
            let merge = round % 2 == 0;
            let (from, to) = (&rounds[round - 1], &rounds[round]);
            for (i, &seq) in from.iter().enumerate() {
                let target = if merge { to[i / 2] } else { to[i] };
                self.matches[seq].next_match_win = Some(BracketLink::Pending(target));
            }
        }

        for (i, &seq) in winner_rounds[0].iter().enumerate() {
            let target = rounds.first().map_or(grand_final, |first| first[i / 2]);
            self.matches[seq].next_match_lose = Some(BracketLink::Pending(target));
        }
        for (k, seqs) in winner_rounds.iter().enumerate().skip(1) {
            let loser_round = &rounds[2 * k - 1];
            for (i, &seq) in seqs.iter().enumerate() {
                self.matches[seq].next_match_lose = Some(BracketLink::Pending(loser_round[i]));
            }
        }

        let winner_final = winner_rounds[total_winner - 1][0];
        self.matches[winner_final].next_match_win = Some(BracketLink::Pending(grand_final));
        if let Some(last) = rounds.last() {
            self.matches[last[0]].next_match_win = Some(BracketLink::Pending(grand_final));
        }
    }

    /// Propagate entrant presence through the graph: a winner exists when a match has
    /// at least one entrant, a loser only when it has two.
    fn count_entrants(&mut self) {
        let mut feeders: HashMap<usize, Vec<(usize, bool)>> = HashMap::new();
        for m in &self.matches {
            if let Some(BracketLink::Pending(target)) = m.next_match_win {
                feeders.entry(target).or_default().push((m.sequence, true));
            }
            if let Some(BracketLink::Pending(target)) = m.next_match_lose {
                feeders.entry(target).or_default().push((m.sequence, false));
            }
        }

        let mut expected: Vec<Option<u8>> = vec![None; self.matches.len()];
        let mut remaining = self.matches.len();
        while remaining > 0 {
            let before = remaining;
            for seq in 0..self.matches.len() {
                if expected[seq].is_some() {
                    continue;
                }
                let count = match feeders.get(&seq) {
                    None => Some(self.matches[seq].seated_count()),
                    Some(sources) => sources.iter().try_fold(0u8, |acc, &(source, winner)| {
                        expected[source].map(|n| {
                            let produces = if winner { n >= 1 } else { n == 2 };
                            acc + u8::from(produces)
                        })
                    }),
                };
                if let Some(count) = count {
                    expected[seq] = Some(count);
                    remaining -= 1;
                }
            }
            if remaining == before {
                break;
            }
        }

        for (m, count) in self.matches.iter_mut().zip(expected) {
            m.expected_entrants = count.unwrap_or(0);
        }
    }
}
