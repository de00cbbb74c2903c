//! Bracket persistence: give generated matches real ids, commit them in one
//! transaction, then settle the matches that will never be played.

use crate::logic::bracket::{BracketLink, BracketMatch};
use crate::logic::progression::{advance, finalize_void, finalize_walkover};
use crate::models::{
    BracketInfo, Match, MatchId, MatchParticipation, Side, Team, TeamId, TeamMode, Tournament,
    TournamentError,
};
use crate::store::TournamentStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Commit a generated bracket.
///
/// Every record gets its match id and every [`BracketLink::Pending`] pointer is
/// rewritten to [`BracketLink::Resolved`] in place. `new_teams` (teams synthesized
/// for the bracket) are written in the same transaction. Fails without writing
/// anything if the tournament already has matches.
pub fn persist_bracket<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    bracket: &mut [BracketMatch],
    new_teams: Vec<Team>,
    now: DateTime<Utc>,
) -> Result<Vec<Match>, TournamentError> {
    let ids: HashMap<usize, MatchId> = bracket
        .iter()
        .map(|bm| (bm.sequence, Uuid::new_v4()))
        .collect();
    let resolve = |link: Option<BracketLink>| -> Result<Option<BracketLink>, TournamentError> {
        match link {
            Some(BracketLink::Pending(seq)) => ids
                .get(&seq)
                .map(|id| Some(BracketLink::Resolved(*id)))
                .ok_or_else(|| TournamentError::Internal(format!("dangling bracket link {seq}"))),
            other => Ok(other),
        }
    };
    for bm in bracket.iter_mut() {
        bm.match_id = ids.get(&bm.sequence).copied();
        bm.next_match_win = resolve(bm.next_match_win)?;
        bm.next_match_lose = resolve(bm.next_match_lose)?;
    }

    let mut members: HashMap<TeamId, Vec<_>> = store
        .teams(tournament.id)?
        .into_iter()
        .map(|t| (t.id, t.members))
        .collect();
    members.extend(new_teams.iter().map(|t| (t.id, t.members.clone())));

    let mut records = Vec::with_capacity(bracket.len());
    let mut participations = Vec::new();
    for bm in bracket.iter() {
        let Some(id) = bm.match_id else {
            continue;
        };
        let mut m = Match::new(tournament.id, bm.round);
        m.id = id;
        m.created_at = now;
        m.team_a = bm.team_a;
        m.team_b = bm.team_b;
        m.bracket = Some(BracketInfo {
            sequence: bm.sequence,
            bracket_type: bm.bracket_type,
            position: bm.position,
            next_match_win: bm.next_match_win.and_then(BracketLink::match_id),
            next_match_lose: bm.next_match_lose.and_then(BracketLink::match_id),
            expected_entrants: bm.expected_entrants,
        });
        if tournament.team_mode == TeamMode::Flex {
            for (side, team) in [(Side::A, bm.team_a), (Side::B, bm.team_b)] {
                let roster = team.and_then(|t| members.get(&t)).cloned().unwrap_or_default();
                participations.extend(roster.into_iter().map(|participant_id| {
                    MatchParticipation {
                        match_id: id,
                        participant_id,
                        side,
                    }
                }));
            }
        }
        records.push(m);
    }

    store.insert_bracket(tournament.id, new_teams, records.clone(), participations)?;
    log::info!(
        "persisted bracket of {} matches for tournament {}",
        records.len(),
        tournament.id
    );
    Ok(records)
}

/// Auto-finalize byes (one entrant) and void matches (none), then propagate.
/// Returns the ids of the byes and void matches finalized.
pub fn settle_byes<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    records: &[Match],
    now: DateTime<Utc>,
) -> Result<Vec<MatchId>, TournamentError> {
    let mut settled = Vec::new();
    for m in records {
        let Some(info) = &m.bracket else {
            continue;
        };
        match (info.expected_entrants, m.seated()) {
            (0, _) => {
                if finalize_void(store, m, now)?.is_some() {
                    settled.push(m.id);
                }
            }
            (1, 1) => {
                if let Some(done) = finalize_walkover(store, m, now)? {
                    settled.push(done.id);
                    advance(store, tournament, &done, now)?;
                }
            }
            _ => {}
        }
    }

    Ok(settled)
}
