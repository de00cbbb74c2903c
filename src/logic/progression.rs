//! Bracket progression: moving winners and losers into their next matches.

use crate::models::{
    FinalizationReason, Match, MatchId, MatchParticipation, MatchStatus, Side, StoreError, TeamId,
    TeamMode, Tournament, TournamentError,
};
use crate::store::TournamentStore;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Seat the outcome of a finalized bracket match into its successors.
///
/// Successors that can only ever receive one entrant are walkovers: they finalize
/// as soon as that entrant arrives, and progression carries on from them.
pub fn advance<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    finished: &Match,
    now: DateTime<Utc>,
) -> Result<(), TournamentError> {
    let mut queue = VecDeque::from([finished.clone()]);
    while let Some(m) = queue.pop_front() {
        let Some(info) = &m.bracket else {
            continue;
        };
        if m.winner.is_none() {
            log::warn!("bracket match {} finalized without a winner, nothing advances", m.id);
            continue;
        }
        let moves = [
            (info.next_match_win, m.winner_team_id()),
            (info.next_match_lose, m.loser_team_id()),
        ];
        for (target, team) in moves {
            let (Some(target), Some(team)) = (target, team) else {
                continue;
            };
            if let Some(walkover) = seat(store, tournament, target, team, now)? {
                queue.push_back(walkover);
            }
        }
    }
    Ok(())
}

/// Put `team` in the first open slot of `target`. Returns the target if that made it a
/// finished walkover.
fn seat<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    target: MatchId,
    team: TeamId,
    now: DateTime<Utc>,
) -> Result<Option<Match>, TournamentError> {
    let mut side = None;
    let Some(seated) = store.update_match(target, &[MatchStatus::Scheduled], &mut |m| {
        side = m.seat(team);
    })?
    else {
        log::warn!("cannot seat team {team} into match {target}: not scheduled");
        return Ok(None);
    };
    let Some(side) = side else {
        log::warn!("cannot seat team {team} into match {target}: no open slot");
        return Ok(None);
    };
    log::info!("team {team} advances to match {target} (side {side:?})");

    if tournament.team_mode == TeamMode::Flex {
        let members = store.team(team)?.map(|t| t.members).unwrap_or_default();
        let rows = members
            .into_iter()
            .map(|participant_id| MatchParticipation {
                match_id: target,
                participant_id,
                side,
            })
            .collect();
        store.add_participations(rows)?;
    }

    let walkover = seated
        .bracket
        .as_ref()
        .is_some_and(|b| b.expected_entrants == 1 && seated.seated() == 1);
    if walkover {
        return Ok(finalize_walkover(store, &seated, now)?);
    }
    Ok(None)
}

/// Finalize a scheduled match that has exactly one entrant, with that entrant as winner.
pub fn finalize_walkover<S: TournamentStore + ?Sized>(
    store: &S,
    m: &Match,
    now: DateTime<Utc>,
) -> Result<Option<Match>, StoreError> {
    let side = if m.team_a.is_some() { Side::A } else { Side::B };
    let done = store.update_match(m.id, &[MatchStatus::Scheduled], &mut |m| {
        m.status = MatchStatus::Finalized;
        m.winner = Some(side);
        m.finalization_reason = Some(FinalizationReason::AutoValidation);
        m.finalized_at = Some(now);
    })?;
    if done.is_some() {
        log::info!("match {} resolved as a walkover", m.id);
    }
    Ok(done)
}

/// Finalize a bracket match no entrant can ever reach.
pub fn finalize_void<S: TournamentStore + ?Sized>(
    store: &S,
    m: &Match,
    now: DateTime<Utc>,
) -> Result<Option<Match>, StoreError> {
    store.update_match(m.id, &[MatchStatus::Scheduled], &mut |m| {
        m.status = MatchStatus::Finalized;
        m.finalization_reason = Some(FinalizationReason::AutoValidation);
        m.finalized_at = Some(now);
    })
}
