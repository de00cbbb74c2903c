//! Match lifecycle: reporting, multi-party confirmation, contestation and finalization.
//!
//! Every status change goes through a compare-and-set on the stored match, so two
//! racing confirmations (or a confirmation racing the sweep) finalize at most once.

use crate::config::LifecycleSettings;
use crate::logic::permissions::{self, Actor, Capabilities};
use crate::logic::progression::advance;
use crate::logic::rules::{check_quotas, resolve_sides, MatchInput, ResolvedSides, ScoreInput};
use crate::models::{
    FinalizationReason, Match, MatchConfirmation, MatchId, MatchParticipation, MatchRosters,
    MatchStatus, ParticipantId, Side, TeamMode, Tournament, TournamentError, TournamentId, UserId,
};
use crate::store::TournamentStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Statuses a result may be (re-)reported from.
const REPORTABLE: [MatchStatus; 3] = [
    MatchStatus::Scheduled,
    MatchStatus::Reported,
    MatchStatus::PendingConfirmation,
];

/// Every status that is neither terminal nor cancelled.
const LIVE: [MatchStatus; 5] = [
    MatchStatus::Scheduled,
    MatchStatus::Reported,
    MatchStatus::PendingConfirmation,
    MatchStatus::Confirmed,
    MatchStatus::Disputed,
];

/// Statuses a match can be edited or deleted from.
const EDITABLE: [MatchStatus; 5] = [
    MatchStatus::Scheduled,
    MatchStatus::Reported,
    MatchStatus::PendingConfirmation,
    MatchStatus::Disputed,
    MatchStatus::Cancelled,
];

/// A contestation as submitted.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContestInput {
    pub reason: String,
    #[serde(default)]
    pub proof: Option<String>,
}

/// Outcome of one pass of the timeout sweep.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct SweepReport {
    pub total: usize,
    pub finalized: Vec<MatchId>,
    pub disputed: Vec<MatchId>,
}

fn load_match<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    id: MatchId,
) -> Result<Match, TournamentError> {
    store
        .get_match(id)?
        .filter(|m| m.tournament_id == tournament.id)
        .ok_or(TournamentError::MatchNotFound(id))
}

fn capabilities<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    rosters: Option<&MatchRosters>,
    actor: &Actor,
) -> Result<Capabilities, TournamentError> {
    let participants = store.participants(tournament.id)?;
    Ok(permissions::resolve(tournament, &participants, rosters, actor))
}

fn status_error(status: MatchStatus) -> TournamentError {
    match status {
        MatchStatus::Finalized => TournamentError::AlreadyFinalized,
        other => TournamentError::InvalidStatus(other),
    }
}

/// A compare-and-set lost to a concurrent writer: report the status that won.
fn lost_race<S: TournamentStore + ?Sized>(store: &S, id: MatchId) -> TournamentError {
    match store.get_match(id) {
        Ok(Some(m)) => status_error(m.status),
        Ok(None) => TournamentError::MatchNotFound(id),
        Err(e) => e.into(),
    }
}

fn confirmation(
    match_id: MatchId,
    participant_id: ParticipantId,
    contest: Option<&ContestInput>,
    now: DateTime<Utc>,
) -> MatchConfirmation {
    MatchConfirmation {
        match_id,
        participant_id,
        is_confirmed: contest.is_none(),
        contest_reason: contest.map(|c| c.reason.clone()),
        contest_proof: contest.and_then(|c| c.proof.clone()),
        updated_at: now,
    }
}

/// Bracket matches are played only once both entrants are seated.
fn require_seated(m: &Match) -> Result<(), TournamentError> {
    if m.bracket.is_some() && m.seated() < 2 {
        return Err(TournamentError::MatchNotReady);
    }
    Ok(())
}

fn confirmation_deadline(
    settings: &LifecycleSettings,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, TournamentError> {
    now.checked_add_signed(settings.confirmation_window)
        .ok_or_else(|| {
            TournamentError::Internal(format!(
                "confirmation window {} overflows the calendar",
                settings.confirmation_window
            ))
        })
}

fn record_result(
    m: &mut Match,
    (score_a, score_b): (u32, u32),
    proof: Option<String>,
    reporter: UserId,
    deadline: DateTime<Utc>,
    now: DateTime<Utc>,
) {
    m.score_a = Some(score_a);
    m.score_b = Some(score_b);
    m.winner = match score_a.cmp(&score_b) {
        Ordering::Greater => Some(Side::A),
        Ordering::Less => Some(Side::B),
        Ordering::Equal => None,
    };
    m.status = MatchStatus::Reported;
    m.reported_by = Some(reporter);
    m.reported_at = Some(now);
    m.confirmation_deadline = Some(deadline);
    m.proof = proof;
}

fn participation_rows(match_id: MatchId, sides: &ResolvedSides) -> Vec<MatchParticipation> {
    let row = |side: Side| move |participant_id: &ParticipantId| MatchParticipation {
        match_id,
        participant_id: *participant_id,
        side,
    };
    sides
        .side_a
        .iter()
        .map(row(Side::A))
        .chain(sides.side_b.iter().map(row(Side::B)))
        .collect()
}

/// Create an ad-hoc match, already reported when `input.score` is given.
///
/// Permitted to players named in the match and to tournament managers.
pub fn create_match<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    input: &MatchInput,
    actor: &Actor,
    settings: &LifecycleSettings,
    now: DateTime<Utc>,
) -> Result<Match, TournamentError> {
    let participants = store.participants(tournament.id)?;
    let teams = store.teams(tournament.id)?;
    let sides = resolve_sides(tournament, &participants, &teams, input)?;

    let caps = permissions::resolve(tournament, &participants, None, actor);
    let playing = caps
        .participant
        .filter(|p| sides.side_a.contains(p) || sides.side_b.contains(p));
    if !caps.manage && playing.is_none() {
        return Err(TournamentError::NotAParticipant);
    }

    let score = input
        .score
        .as_ref()
        .map(|s| s.checked(tournament.allow_draw))
        .transpose()?;
    check_quotas(store, tournament, &participants, &sides, None)?;

    let mut m = Match::new(tournament.id, input.round);
    m.created_at = now;
    m.team_a = sides.team_a;
    m.team_b = sides.team_b;
    m.scheduled_at = input.scheduled_at;
    if let Some(score) = score {
        let proof = input.score.as_ref().and_then(|s| s.proof.clone());
        let deadline = confirmation_deadline(settings, now)?;
        record_result(&mut m, score, proof, actor.user_id, deadline, now);
    }
    let rows = match tournament.team_mode {
        TeamMode::Flex => participation_rows(m.id, &sides),
        TeamMode::Static => Vec::new(),
    };
    store.insert_match(m.clone(), rows)?;

    if let (MatchStatus::Reported, Some(reporter)) = (m.status, playing) {
        store.upsert_confirmation(confirmation(m.id, reporter, None, now))?;
    }
    log::info!(
        "match {} created in tournament {} ({})",
        m.id,
        tournament.id,
        m.status
    );
    Ok(m)
}

/// Report (or re-report) a result. The reporter's own confirmation is recorded and any
/// earlier verdicts are discarded.
pub fn report_result<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    match_id: MatchId,
    score: &ScoreInput,
    actor: &Actor,
    settings: &LifecycleSettings,
    now: DateTime<Utc>,
) -> Result<Match, TournamentError> {
    let m = load_match(store, tournament, match_id)?;
    if !REPORTABLE.contains(&m.status) {
        return Err(status_error(m.status));
    }
    require_seated(&m)?;
    let rosters = store.rosters(&m)?;
    let (reporter, _) =
        capabilities(store, tournament, Some(&rosters), actor)?.require_participant()?;
    let allow_draw = tournament.allow_draw && m.bracket.is_none();
    let result = score.checked(allow_draw)?;
    let deadline = confirmation_deadline(settings, now)?;

    let reported = store
        .update_match(m.id, &REPORTABLE, &mut |m| {
            record_result(m, result, score.proof.clone(), actor.user_id, deadline, now)
        })?
        .ok_or_else(|| lost_race(store, m.id))?;
    store.clear_confirmations(m.id)?;
    store.upsert_confirmation(confirmation(m.id, reporter, None, now))?;
    log::info!(
        "match {} reported {}-{} by {}",
        m.id,
        result.0,
        result.1,
        actor.user_id
    );
    Ok(reported)
}

/// Record the actor's confirmation, then finalize by consensus if it is reached.
pub fn confirm_match<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    match_id: MatchId,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Match, TournamentError> {
    let m = load_match(store, tournament, match_id)?;
    if !m.status.awaiting_confirmation() {
        return Err(status_error(m.status));
    }
    let rosters = store.rosters(&m)?;
    let (participant, _) =
        capabilities(store, tournament, Some(&rosters), actor)?.require_participant()?;
    store.upsert_confirmation(confirmation(m.id, participant, None, now))?;
    log::debug!("participant {participant} confirmed match {}", m.id);

    if let Some(done) = check_consensus(store, tournament, &m, &rosters, now)? {
        return Ok(done);
    }
    if let Some(pending) = store.update_match(m.id, &[MatchStatus::Reported], &mut |m| {
        m.status = MatchStatus::PendingConfirmation;
    })? {
        return Ok(pending);
    }
    store
        .get_match(m.id)?
        .ok_or(TournamentError::MatchNotFound(m.id))
}

/// Finalize with reason `consensus` when nobody contests, both sides have confirmed,
/// and the confirmations are a strict majority of the roster.
///
/// Returns `None` when consensus is not reached, or when another writer already moved
/// the match on.
pub fn check_consensus<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    m: &Match,
    rosters: &MatchRosters,
    now: DateTime<Utc>,
) -> Result<Option<Match>, TournamentError> {
    let confirmations = store.confirmations(m.id)?;
    if confirmations.iter().any(MatchConfirmation::is_contested) {
        return Ok(None);
    }
    let sides: Vec<Side> = confirmations
        .iter()
        .filter_map(|c| rosters.side_of(c.participant_id))
        .collect();
    let both_sides = sides.contains(&Side::A) && sides.contains(&Side::B);
    if !both_sides || sides.len() * 2 <= rosters.len() {
        return Ok(None);
    }
    finalize_transition(
        store,
        tournament,
        m.id,
        FinalizationReason::Consensus,
        &|m: &Match| m.status.awaiting_confirmation(),
        now,
    )
}

/// Contest a reported result. The match becomes `disputed` at once.
pub fn contest_match<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    match_id: MatchId,
    contest: &ContestInput,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Match, TournamentError> {
    let m = load_match(store, tournament, match_id)?;
    if !m.status.awaiting_confirmation() {
        return Err(status_error(m.status));
    }
    let rosters = store.rosters(&m)?;
    let (participant, _) =
        capabilities(store, tournament, Some(&rosters), actor)?.require_participant()?;
    store.upsert_confirmation(confirmation(m.id, participant, Some(contest), now))?;

    let disputed = store
        .update_match(m.id, &MatchStatus::AWAITING_CONFIRMATION, &mut |m| {
            m.status = MatchStatus::Disputed;
        })?
        .ok_or_else(|| lost_race(store, m.id))?;
    log::info!(
        "match {} contested by participant {participant}: {}",
        m.id,
        contest.reason
    );
    Ok(disputed)
}

/// Explicit finalization. With an actor it is an administrative act and needs management
/// rights; without one it is a system call.
pub fn finalize_match<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    match_id: MatchId,
    reason: FinalizationReason,
    actor: Option<&Actor>,
    now: DateTime<Utc>,
) -> Result<Match, TournamentError> {
    let m = load_match(store, tournament, match_id)?;
    if !LIVE.contains(&m.status) {
        return Err(status_error(m.status));
    }
    if let Some(actor) = actor {
        capabilities(store, tournament, None, actor)?.require_manage()?;
    }
    require_seated(&m)?;
    if !m.has_result() && reason != FinalizationReason::AdminOverride {
        return Err(TournamentError::InvalidStatus(m.status));
    }
    finalize_transition(
        store,
        tournament,
        m.id,
        reason,
        &|m: &Match| LIVE.contains(&m.status),
        now,
    )?
    .ok_or_else(|| lost_race(store, m.id))
}

/// The one path to `finalized`: guarded transition, played counters, then bracket
/// progression.
fn finalize_transition<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    id: MatchId,
    reason: FinalizationReason,
    guard: &dyn Fn(&Match) -> bool,
    now: DateTime<Utc>,
) -> Result<Option<Match>, TournamentError> {
    let Some(done) = store.update_match_if(id, guard, &mut |m| {
        m.status = MatchStatus::Finalized;
        m.finalization_reason = Some(reason);
        m.finalized_at = Some(now);
    })?
    else {
        return Ok(None);
    };
    let rosters = store.rosters(&done)?;
    let players: Vec<ParticipantId> = rosters.all().collect();
    store.increment_matches_played(&players)?;
    log::info!("match {} finalized ({reason:?})", done.id);
    if done.bracket.is_some() {
        advance(store, tournament, &done, now)?;
    }
    Ok(Some(done))
}

/// Administrative cancellation of any live match.
pub fn cancel_match<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    match_id: MatchId,
    actor: &Actor,
) -> Result<Match, TournamentError> {
    let m = load_match(store, tournament, match_id)?;
    capabilities(store, tournament, None, actor)?.require_manage()?;
    if !LIVE.contains(&m.status) {
        return Err(status_error(m.status));
    }
    let cancelled = store
        .update_match(m.id, &LIVE, &mut |m| m.status = MatchStatus::Cancelled)?
        .ok_or_else(|| lost_race(store, m.id))?;
    log::info!("match {} cancelled by {}", m.id, actor.user_id);
    Ok(cancelled)
}

/// Change round, schedule and rosters. Rosters are re-checked against the rules
/// without counting the match itself. Bracket matches keep their round and seats;
/// only the schedule moves.
pub fn update_match<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    match_id: MatchId,
    input: &MatchInput,
    actor: &Actor,
) -> Result<Match, TournamentError> {
    let m = load_match(store, tournament, match_id)?;
    capabilities(store, tournament, None, actor)?.require_manage()?;
    if m.status.is_locked() {
        return Err(TournamentError::AlreadyConfirmed);
    }
    if !EDITABLE.contains(&m.status) {
        return Err(TournamentError::InvalidStatus(m.status));
    }

    let sides = match m.bracket {
        Some(_) => None,
        None => {
            let participants = store.participants(tournament.id)?;
            let teams = store.teams(tournament.id)?;
            let sides = resolve_sides(tournament, &participants, &teams, input)?;
            check_quotas(store, tournament, &participants, &sides, Some(m.id))?;
            Some(sides)
        }
    };

    let updated = store
        .update_match(m.id, &EDITABLE, &mut |m| {
            m.scheduled_at = input.scheduled_at;
            if let Some(sides) = &sides {
                m.round = input.round;
                m.team_a = sides.team_a;
                m.team_b = sides.team_b;
            }
        })?
        .ok_or_else(|| lost_race(store, m.id))?;
    if let (Some(sides), TeamMode::Flex) = (&sides, tournament.team_mode) {
        store.replace_participations(m.id, participation_rows(m.id, sides))?;
    }
    log::info!("match {} updated by {}", m.id, actor.user_id);
    Ok(updated)
}

/// Remove an ad-hoc match that is not yet locked, with its participations and
/// confirmations. Bracket matches stay: their feeders point at them.
pub fn delete_match<S: TournamentStore + ?Sized>(
    store: &S,
    tournament: &Tournament,
    match_id: MatchId,
    actor: &Actor,
) -> Result<(), TournamentError> {
    let m = load_match(store, tournament, match_id)?;
    capabilities(store, tournament, None, actor)?.require_manage()?;
    if m.status.is_locked() || m.bracket.is_some() {
        return Err(TournamentError::CannotBeDeleted);
    }
    if !store.delete_match(m.id, &EDITABLE)? {
        return Err(match lost_race(store, m.id) {
            TournamentError::AlreadyFinalized => TournamentError::CannotBeDeleted,
            other => other,
        });
    }
    log::info!("match {} deleted by {}", m.id, actor.user_id);
    Ok(())
}

enum SweepOutcome {
    Finalized,
    Disputed,
}

/// Settle every match whose confirmation window has closed: contested ones become
/// `disputed`, the rest finalize (by consensus if reached, otherwise on timeout).
///
/// A failure on one match is logged and the pass carries on.
pub fn auto_finalize_expired<S: TournamentStore + ?Sized>(
    store: &S,
    now: DateTime<Utc>,
) -> Result<SweepReport, TournamentError> {
    let expired = store.expired_matches(now)?;
    let mut report = SweepReport {
        total: expired.len(),
        ..SweepReport::default()
    };
    let mut tournaments: HashMap<TournamentId, Tournament> = HashMap::new();
    for m in &expired {
        match sweep_one(store, &mut tournaments, m, now) {
            Ok(Some(SweepOutcome::Finalized)) => report.finalized.push(m.id),
            Ok(Some(SweepOutcome::Disputed)) => report.disputed.push(m.id),
            Ok(None) => log::debug!("match {} moved on during the sweep, skipped", m.id),
            Err(e) => log::warn!("sweep could not settle match {}: {e}", m.id),
        }
    }
    if report.total > 0 {
        log::info!(
            "sweep: {} expired, {} finalized, {} disputed",
            report.total,
            report.finalized.len(),
            report.disputed.len()
        );
    }
    Ok(report)
}

fn sweep_one<S: TournamentStore + ?Sized>(
    store: &S,
    tournaments: &mut HashMap<TournamentId, Tournament>,
    m: &Match,
    now: DateTime<Utc>,
) -> Result<Option<SweepOutcome>, TournamentError> {
    if !tournaments.contains_key(&m.tournament_id) {
        let t = store
            .tournament(m.tournament_id)?
            .ok_or(TournamentError::TournamentNotFound(m.tournament_id))?;
        tournaments.insert(t.id, t);
    }
    let Some(tournament) = tournaments.get(&m.tournament_id) else {
        return Err(TournamentError::TournamentNotFound(m.tournament_id));
    };

    let expired = |m: &Match| {
        m.status.awaiting_confirmation() && m.confirmation_deadline.is_some_and(|d| d < now)
    };
    let contested = store
        .confirmations(m.id)?
        .iter()
        .any(MatchConfirmation::is_contested);
    if contested {
        let disputed = store.update_match_if(m.id, &expired, &mut |m| {
            m.status = MatchStatus::Disputed;
        })?;
        return Ok(disputed.map(|_| SweepOutcome::Disputed));
    }

    let rosters = store.rosters(m)?;
    if check_consensus(store, tournament, m, &rosters, now)?.is_some() {
        return Ok(Some(SweepOutcome::Finalized));
    }
    let done = finalize_transition(
        store,
        tournament,
        m.id,
        FinalizationReason::Timeout,
        &expired,
        now,
    )?;
    Ok(done.map(|_| SweepOutcome::Finalized))
}
