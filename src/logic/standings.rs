//! Standings: a pure aggregation of match outcomes into a ranked table.

use crate::models::{Match, MatchParticipation, MatchStatus, Side, TeamMode, Tournament};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

/// Which results count.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandingsView {
    /// Finalized results only.
    #[default]
    Official,
    /// Finalized plus freshly reported results.
    Provisional,
}

impl StandingsView {
    pub fn statuses(self) -> &'static [MatchStatus] {
        match self {
            StandingsView::Official => &MatchStatus::OFFICIAL,
            StandingsView::Provisional => &MatchStatus::PROVISIONAL,
        }
    }
}

/// One row of the table: a team in static mode, a player in flex mode.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct StandingsEntry {
    pub id: Uuid,
    pub name: String,
    pub points: i32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_scored: u32,
    pub goals_conceded: u32,
    pub goal_difference: i64,
    pub matches_played: u32,
}

impl StandingsEntry {
    fn new(id: Uuid, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            ..Self::default()
        }
    }

    fn record(&mut self, scored: u32, conceded: u32, outcome: Outcome, tournament: &Tournament) {
        self.goals_scored += scored;
        self.goals_conceded += conceded;
        self.goal_difference += i64::from(scored) - i64::from(conceded);
        self.matches_played += 1;
        let scoring = &tournament.scoring;
        match outcome {
            Outcome::Win => {
                self.wins += 1;
                self.points += scoring.point_per_victory;
            }
            Outcome::Draw => {
                self.draws += 1;
                self.points += scoring.point_per_draw;
            }
            Outcome::Loss => {
                self.losses += 1;
                self.points += scoring.point_per_loss;
            }
            Outcome::Unresolved => {}
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Outcome {
    Win,
    Draw,
    Loss,
    /// Scored but no winner recorded, e.g. an admin override on a tie.
    Unresolved,
}

fn outcome(m: &Match, side: Side, allow_draw: bool) -> Outcome {
    match m.winner {
        _ if allow_draw && m.is_draw() => Outcome::Draw,
        Some(winner) if winner == side => Outcome::Win,
        Some(_) => Outcome::Loss,
        None => Outcome::Unresolved,
    }
}

/// Build the ranked table.
///
/// `entrants` are the teams (static mode) or participants (flex mode), each with a
/// display name; every one of them appears even without a match. Only matches whose
/// status belongs to `view` and that carry both scores are counted. Flex rosters are
/// read from `participations`.
///
/// Ordered by points, goal difference and goals scored (all descending), then by id.
pub fn compute_standings(
    tournament: &Tournament,
    entrants: &[(Uuid, String)],
    matches: &[Match],
    participations: &[MatchParticipation],
    view: StandingsView,
) -> Vec<StandingsEntry> {
    let mut table: HashMap<Uuid, StandingsEntry> = entrants
        .iter()
        .map(|(id, name)| (*id, StandingsEntry::new(*id, name)))
        .collect();

    let mut rosters: HashMap<(Uuid, Side), Vec<Uuid>> = HashMap::new();
    if tournament.team_mode == TeamMode::Flex {
        for row in participations {
            rosters
                .entry((row.match_id, row.side))
                .or_default()
                .push(row.participant_id);
        }
    }

    let statuses = view.statuses();
    for m in matches {
        if m.tournament_id != tournament.id || !statuses.contains(&m.status) {
            continue;
        }
        let (Some(score_a), Some(score_b)) = (m.score_a, m.score_b) else {
            continue;
        };
        let sides: [(Side, Vec<Uuid>); 2] = match tournament.team_mode {
            TeamMode::Static => {
                let (Some(a), Some(b)) = (m.team_a, m.team_b) else {
                    continue;
                };
                [(Side::A, vec![a]), (Side::B, vec![b])]
            }
            TeamMode::Flex => [Side::A, Side::B].map(|side| {
                (side, rosters.get(&(m.id, side)).cloned().unwrap_or_default())
            }),
        };
        for (side, ids) in sides {
            let (scored, conceded) = match side {
                Side::A => (score_a, score_b),
                Side::B => (score_b, score_a),
            };
            let result = outcome(m, side, tournament.allow_draw);
            for id in ids {
                match table.get_mut(&id) {
                    Some(entry) => entry.record(scored, conceded, result, tournament),
                    None => log::debug!("match {} references unknown entrant {id}", m.id),
                }
            }
        }
    }

    let mut entries: Vec<StandingsEntry> = table.into_values().collect();
    entries.sort_by(rank);
    entries
}

fn rank(a: &StandingsEntry, b: &StandingsEntry) -> Ordering {
    b.points
        .cmp(&a.points)
        .then(b.goal_difference.cmp(&a.goal_difference))
        .then(b.goals_scored.cmp(&a.goals_scored))
        .then(a.id.cmp(&b.id))
}
