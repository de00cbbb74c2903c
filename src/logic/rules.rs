//! Match rule engine: roster composition and per-player repetition quotas.
//!
//! [`resolve_sides`] and [`check_quotas`] fail fast on the first violation.
//! [`validate_match`] runs the same checks without mutating anything and
//! collects every violation, plus non-blocking warnings.

use crate::models::{
    MatchId, MatchStatus, Participant, ParticipantId, StoreError, Team, TeamId, TeamMode,
    Tournament, TournamentError,
};
use crate::store::{PairQuery, Pairing, TournamentStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A proposed match, for creation, update or a pre-flight validation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MatchInput {
    #[serde(default = "default_round")]
    pub round: u32,
    /// Static mode sides.
    #[serde(default)]
    pub team_a: Option<TeamId>,
    #[serde(default)]
    pub team_b: Option<TeamId>,
    /// Flex mode rosters.
    #[serde(default)]
    pub players_a: Vec<ParticipantId>,
    #[serde(default)]
    pub players_b: Vec<ParticipantId>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Creates the match already reported.
    #[serde(default)]
    pub score: Option<ScoreInput>,
    /// Editing an existing match: do not count it against the quotas.
    #[serde(default)]
    pub exclude_match_id: Option<MatchId>,
}

fn default_round() -> u32 {
    1
}

impl Default for MatchInput {
    fn default() -> Self {
        Self {
            round: default_round(),
            team_a: None,
            team_b: None,
            players_a: Vec::new(),
            players_b: Vec::new(),
            scheduled_at: None,
            score: None,
            exclude_match_id: None,
        }
    }
}

/// A reported result as submitted. Scores are checked before being stored unsigned.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ScoreInput {
    pub score_a: i64,
    pub score_b: i64,
    #[serde(default)]
    pub proof: Option<String>,
}

impl ScoreInput {
    /// Non-negative scores, and a tie only when the tournament allows draws.
    pub fn checked(&self, allow_draw: bool) -> Result<(u32, u32), TournamentError> {
        let a = u32::try_from(self.score_a).map_err(|_| TournamentError::InvalidScore)?;
        let b = u32::try_from(self.score_b).map_err(|_| TournamentError::InvalidScore)?;
        if a == b && !allow_draw {
            return Err(TournamentError::DrawNotAllowed);
        }
        Ok((a, b))
    }
}

/// Pre-flight result.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Rosters of a proposed match after composition checks.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResolvedSides {
    pub team_a: Option<TeamId>,
    pub team_b: Option<TeamId>,
    pub side_a: Vec<ParticipantId>,
    pub side_b: Vec<ParticipantId>,
}

/// Composition checks, first violation wins.
pub fn resolve_sides(
    tournament: &Tournament,
    participants: &[Participant],
    teams: &[Team],
    input: &MatchInput,
) -> Result<ResolvedSides, TournamentError> {
    composition(tournament, participants, teams, input)
        .map_err(|mut errors| errors.remove(0))
}

fn composition(
    tournament: &Tournament,
    participants: &[Participant],
    teams: &[Team],
    input: &MatchInput,
) -> Result<ResolvedSides, Vec<TournamentError>> {
    match tournament.team_mode {
        TeamMode::Static => {
            let find = |id: Option<TeamId>| {
                id.and_then(|id| {
                    teams
                        .iter()
                        .find(|t| t.id == id && t.tournament_id == tournament.id)
                })
            };
            match (find(input.team_a), find(input.team_b)) {
                (Some(a), Some(b)) if a.id != b.id => Ok(ResolvedSides {
                    team_a: Some(a.id),
                    team_b: Some(b.id),
                    side_a: a.members.clone(),
                    side_b: b.members.clone(),
                }),
                _ => Err(vec![TournamentError::InvalidTeams]),
            }
        }
        TeamMode::Flex => {
            let mut errors = Vec::new();
            let known: HashSet<ParticipantId> = participants
                .iter()
                .filter(|p| p.tournament_id == tournament.id)
                .map(|p| p.id)
                .collect();
            let (a, b) = (&input.players_a, &input.players_b);
            let unique = |side: &[ParticipantId]| {
                side.iter().collect::<HashSet<_>>().len() == side.len()
            };
            let all_known = a.iter().chain(b).all(|id| known.contains(id));
            if !all_known || !unique(a.as_slice()) || !unique(b.as_slice()) {
                errors.push(TournamentError::InvalidPlayers);
            }
            if a.len() != b.len() {
                errors.push(TournamentError::TeamSizeMismatch {
                    size_a: a.len(),
                    size_b: b.len(),
                });
            }
            for size in [a.len(), b.len()] {
                if !tournament.team_size_allowed(size) {
                    errors.push(TournamentError::InvalidTeamSize {
                        size,
                        min: tournament.min_team_size,
                        max: tournament.max_team_size,
                    });
                    break;
                }
            }
            let overlap: Vec<ParticipantId> =
                a.iter().filter(|id| b.contains(id)).copied().collect();
            if !overlap.is_empty() {
                errors.push(TournamentError::OverlappingPlayers(overlap));
            }
            if errors.is_empty() {
                Ok(ResolvedSides {
                    team_a: None,
                    team_b: None,
                    side_a: a.clone(),
                    side_b: b.clone(),
                })
            } else {
                Err(errors)
            }
        }
    }
}

/// Quota checks, first violation wins.
pub fn check_quotas<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    participants: &[Participant],
    sides: &ResolvedSides,
    exclude: Option<MatchId>,
) -> Result<(), TournamentError> {
    let mut violations = quota_violations(store, tournament, participants, sides, exclude, true)?;
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations.remove(0))
    }
}

/// Per-player, partner and opponent caps. Partner and opponent history only counts
/// matches played at the proposed number of players per side. Static teams have
/// fixed partners, so only the player and opponent caps apply there.
fn quota_violations<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    participants: &[Participant],
    sides: &ResolvedSides,
    exclude: Option<MatchId>,
    fail_fast: bool,
) -> Result<Vec<TournamentError>, StoreError> {
    let names: HashMap<ParticipantId, &str> =
        participants.iter().map(|p| (p.id, p.name.as_str())).collect();
    let name = |id: &ParticipantId| {
        names
            .get(id)
            .map_or_else(|| id.to_string(), |n| n.to_string())
    };
    let mut violations = Vec::new();
    let team_size = sides.side_a.len();

    if let Some(max) = tournament.max_matches_per_player {
        for player in sides.side_a.iter().chain(&sides.side_b) {
            let played = store.count_player_matches(tournament.id, *player, exclude)?;
            log::debug!("player {player} has {played}/{max} matches");
            if played >= max {
                violations.push(TournamentError::MaxMatchesExceeded {
                    max,
                    player_name: name(player),
                });
                if fail_fast {
                    return Ok(violations);
                }
            }
        }
    }

    let pair_count = |first: ParticipantId, second: ParticipantId, pairing: Pairing| {
        store.count_pair_matches(PairQuery {
            tournament_id: tournament.id,
            first,
            second,
            pairing,
            team_size: Some(team_size),
            exclude,
        })
    };

    if let (Some(max), TeamMode::Flex) = (tournament.max_times_with_same_partner, tournament.team_mode)
    {
        for side in [&sides.side_a, &sides.side_b] {
            for (i, first) in side.iter().enumerate() {
                for second in &side[i + 1..] {
                    if pair_count(*first, *second, Pairing::Partners)? >= max {
                        violations.push(TournamentError::MaxPartnerMatchesExceeded {
                            max,
                            player_name: name(first),
                            partner_name: name(second),
                            team_size,
                        });
                        if fail_fast {
                            return Ok(violations);
                        }
                    }
                }
            }
        }
    }

    if let Some(max) = tournament.max_times_with_same_opponent {
        for first in &sides.side_a {
            for second in &sides.side_b {
                if pair_count(*first, *second, Pairing::Opponents)? >= max {
                    violations.push(TournamentError::MaxOpponentMatchesExceeded {
                        max,
                        player_name: name(first),
                        opponent_name: name(second),
                        team_size,
                    });
                    if fail_fast {
                        return Ok(violations);
                    }
                }
            }
        }
    }

    Ok(violations)
}

/// Whether the same team-vs-team (or roster-vs-roster) pairing already exists.
pub fn similar_match_exists<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    sides: &ResolvedSides,
    exclude: Option<MatchId>,
) -> Result<bool, StoreError> {
    let key = |a: &[ParticipantId], b: &[ParticipantId]| {
        let mut a = a.to_vec();
        let mut b = b.to_vec();
        a.sort_unstable();
        b.sort_unstable();
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    };
    let proposed = key(sides.side_a.as_slice(), sides.side_b.as_slice());
    for m in store.matches(tournament.id, &[])? {
        if m.status == MatchStatus::Cancelled || Some(m.id) == exclude {
            continue;
        }
        let same = match (sides.team_a, sides.team_b) {
            (Some(a), Some(b)) => {
                let pair = (m.team_a, m.team_b);
                pair == (Some(a), Some(b)) || pair == (Some(b), Some(a))
            }
            _ => {
                let rosters = store.rosters(&m)?;
                key(rosters.a.members(), rosters.b.members()) == proposed
            }
        };
        if same {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Non-mutating pre-flight: every violation as a readable string, plus warnings.
pub fn validate_match<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    participants: &[Participant],
    teams: &[Team],
    input: &MatchInput,
) -> Result<ValidationReport, StoreError> {
    let mut report = ValidationReport::default();

    if let Some(score) = &input.score {
        if let Err(e) = score.checked(tournament.allow_draw) {
            report.errors.push(e.to_string());
        }
    }

    match composition(tournament, participants, teams, input) {
        Ok(sides) => {
            let exclude = input.exclude_match_id;
            for violation in
                quota_violations(store, tournament, participants, &sides, exclude, false)?
            {
                report.errors.push(violation.to_string());
            }
            if similar_match_exists(store, tournament, &sides, exclude)? {
                report
                    .warnings
                    .push("a similar match already exists in this tournament".to_string());
            }
        }
        Err(errors) => report.errors.extend(errors.iter().map(ToString::to_string)),
    }

    report.valid = report.errors.is_empty();
    Ok(report)
}
