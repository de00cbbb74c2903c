//! In-memory store: every method takes the single lock once, so each call is atomic.

use super::{Pairing, PairQuery, TournamentStore};
use crate::models::{
    FinalizationReason, Match, MatchConfirmation, MatchId, MatchParticipation, MatchRosters,
    MatchStatus, Participant, ParticipantId, Roster, Side, StoreError, Team, TeamId, Tournament,
    TournamentError, TournamentId, TournamentStatus,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    tournaments: HashMap<TournamentId, Tournament>,
    participants: HashMap<ParticipantId, Participant>,
    teams: HashMap<TeamId, Team>,
    matches: HashMap<MatchId, Match>,
    participations: Vec<MatchParticipation>,
    confirmations: HashMap<(MatchId, ParticipantId), MatchConfirmation>,
}

impl Inner {
    fn roster(&self, m: &Match, side: Side) -> Roster {
        if let Some(team_id) = m.team(side) {
            let members = self
                .teams
                .get(&team_id)
                .map(|t| t.members.clone())
                .unwrap_or_default();
            return Roster::Team { team_id, members };
        }
        let members: Vec<ParticipantId> = self
            .participations
            .iter()
            .filter(|p| p.match_id == m.id && p.side == side)
            .map(|p| p.participant_id)
            .collect();
        if members.is_empty() {
            Roster::Empty
        } else {
            Roster::Players { members }
        }
    }

    fn rosters(&self, m: &Match) -> MatchRosters {
        MatchRosters {
            a: self.roster(m, Side::A),
            b: self.roster(m, Side::B),
        }
    }

    /// Matches that count as played history, minus `exclude`, with their rosters.
    /// Cancelled matches and unplayed bracket walkovers are left out.
    fn history(
        &self,
        tournament_id: TournamentId,
        exclude: Option<MatchId>,
    ) -> impl Iterator<Item = MatchRosters> + '_ {
        self.matches
            .values()
            .filter(move |m| {
                m.tournament_id == tournament_id
                    && m.status != MatchStatus::Cancelled
                    && !is_walkover(m)
                    && Some(m.id) != exclude
            })
            .map(|m| self.rosters(m))
    }
}

/// A bye or void bracket match: settled without play.
fn is_walkover(m: &Match) -> bool {
    m.finalization_reason == Some(FinalizationReason::AutoValidation) && !m.has_result()
}

/// Thread-safe in-memory implementation of [`TournamentStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }
}

fn sort_matches(matches: &mut [Match]) {
    matches.sort_by_key(|m| {
        (
            m.round,
            m.bracket.as_ref().map_or(usize::MAX, |b| b.sequence),
            m.created_at,
            m.id,
        )
    });
}

impl TournamentStore for MemoryStore {
    fn insert_tournament(&self, tournament: Tournament) -> Result<(), StoreError> {
        self.write()?.tournaments.insert(tournament.id, tournament);
        Ok(())
    }

    fn tournament(&self, id: TournamentId) -> Result<Option<Tournament>, StoreError> {
        Ok(self.read()?.tournaments.get(&id).cloned())
    }

    fn set_tournament_status(
        &self,
        id: TournamentId,
        status: TournamentStatus,
    ) -> Result<(), StoreError> {
        if let Some(t) = self.write()?.tournaments.get_mut(&id) {
            t.status = status;
        }
        Ok(())
    }

    fn insert_participant(&self, participant: Participant) -> Result<(), TournamentError> {
        let mut g = self.write()?;
        let registered = g.participants.values().any(|p| {
            p.tournament_id == participant.tournament_id && p.user_id == participant.user_id
        });
        if registered {
            return Err(TournamentError::AlreadyRegistered);
        }
        g.participants.insert(participant.id, participant);
        Ok(())
    }

    fn remove_participant(&self, id: ParticipantId) -> Result<Participant, TournamentError> {
        let mut g = self.write()?;
        let participant = g
            .participants
            .get(&id)
            .ok_or(TournamentError::ParticipantNotFound(id))?;
        let on_team = participant.team_id.is_some()
            || g.teams.values().any(|t| t.members.contains(&id));
        let in_match = g.participations.iter().any(|p| p.participant_id == id);
        if on_team || in_match {
            return Err(TournamentError::ParticipantLocked);
        }
        g.participants
            .remove(&id)
            .ok_or(TournamentError::ParticipantNotFound(id))
    }

    fn participant(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError> {
        Ok(self.read()?.participants.get(&id).cloned())
    }

    fn participants(&self, tournament_id: TournamentId) -> Result<Vec<Participant>, StoreError> {
        let mut list: Vec<Participant> = self
            .read()?
            .participants
            .values()
            .filter(|p| p.tournament_id == tournament_id)
            .cloned()
            .collect();
        list.sort_by_key(|p| (p.joined_at, p.id));
        Ok(list)
    }

    fn increment_matches_played(&self, ids: &[ParticipantId]) -> Result<(), StoreError> {
        let mut g = self.write()?;
        for id in ids {
            if let Some(p) = g.participants.get_mut(id) {
                p.matches_played += 1;
            }
        }
        Ok(())
    }

    fn insert_team(&self, team: Team) -> Result<(), TournamentError> {
        let mut g = self.write()?;
        let siblings = || g.teams.values().filter(|t| t.tournament_id == team.tournament_id);
        if siblings().any(|t| t.name.eq_ignore_ascii_case(&team.name)) {
            return Err(TournamentError::TeamNameTaken(team.name.clone()));
        }
        if siblings().any(|t| t.composition_hash == team.composition_hash) {
            return Err(TournamentError::TeamCompositionTaken);
        }
        for member in &team.members {
            if let Some(p) = g.participants.get_mut(member) {
                p.team_id = Some(team.id);
            }
        }
        g.teams.insert(team.id, team);
        Ok(())
    }

    fn team(&self, id: TeamId) -> Result<Option<Team>, StoreError> {
        Ok(self.read()?.teams.get(&id).cloned())
    }

    fn teams(&self, tournament_id: TournamentId) -> Result<Vec<Team>, StoreError> {
        let mut list: Vec<Team> = self
            .read()?
            .teams
            .values()
            .filter(|t| t.tournament_id == tournament_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    fn insert_match(
        &self,
        m: Match,
        participations: Vec<MatchParticipation>,
    ) -> Result<(), StoreError> {
        let mut g = self.write()?;
        g.matches.insert(m.id, m);
        g.participations.extend(participations);
        Ok(())
    }

    fn insert_bracket(
        &self,
        tournament_id: TournamentId,
        teams: Vec<Team>,
        matches: Vec<Match>,
        participations: Vec<MatchParticipation>,
    ) -> Result<(), TournamentError> {
        let mut g = self.write()?;
        if g.matches.values().any(|m| m.tournament_id == tournament_id) {
            return Err(TournamentError::BracketAlreadyExists);
        }
        for team in teams {
            g.teams.insert(team.id, team);
        }
        for m in matches {
            g.matches.insert(m.id, m);
        }
        g.participations.extend(participations);
        Ok(())
    }

    fn get_match(&self, id: MatchId) -> Result<Option<Match>, StoreError> {
        Ok(self.read()?.matches.get(&id).cloned())
    }

    fn matches(
        &self,
        tournament_id: TournamentId,
        statuses: &[MatchStatus],
    ) -> Result<Vec<Match>, StoreError> {
        let mut list: Vec<Match> = self
            .read()?
            .matches
            .values()
            .filter(|m| m.tournament_id == tournament_id)
            .filter(|m| statuses.is_empty() || statuses.contains(&m.status))
            .cloned()
            .collect();
        sort_matches(&mut list);
        Ok(list)
    }

    fn update_match_if(
        &self,
        id: MatchId,
        guard: &dyn Fn(&Match) -> bool,
        update: &mut dyn FnMut(&mut Match),
    ) -> Result<Option<Match>, StoreError> {
        let mut g = self.write()?;
        match g.matches.get_mut(&id) {
            Some(m) if guard(m) => {
                update(m);
                Ok(Some(m.clone()))
            }
            _ => Ok(None),
        }
    }

    fn delete_match(&self, id: MatchId, expected: &[MatchStatus]) -> Result<bool, StoreError> {
        let mut g = self.write()?;
        let deletable = g
            .matches
            .get(&id)
            .is_some_and(|m| expected.contains(&m.status));
        if !deletable {
            return Ok(false);
        }
        g.matches.remove(&id);
        g.participations.retain(|p| p.match_id != id);
        g.confirmations.retain(|(match_id, _), _| *match_id != id);
        Ok(true)
    }

    fn participations(&self, match_id: MatchId) -> Result<Vec<MatchParticipation>, StoreError> {
        Ok(self
            .read()?
            .participations
            .iter()
            .filter(|p| p.match_id == match_id)
            .cloned()
            .collect())
    }

    fn tournament_participations(
        &self,
        tournament_id: TournamentId,
    ) -> Result<Vec<MatchParticipation>, StoreError> {
        let g = self.read()?;
        Ok(g.participations
            .iter()
            .filter(|p| {
                g.matches
                    .get(&p.match_id)
                    .is_some_and(|m| m.tournament_id == tournament_id)
            })
            .cloned()
            .collect())
    }

    fn add_participations(&self, rows: Vec<MatchParticipation>) -> Result<(), StoreError> {
        self.write()?.participations.extend(rows);
        Ok(())
    }

    fn replace_participations(
        &self,
        match_id: MatchId,
        rows: Vec<MatchParticipation>,
    ) -> Result<(), StoreError> {
        let mut g = self.write()?;
        g.participations.retain(|p| p.match_id != match_id);
        g.participations.extend(rows);
        Ok(())
    }

    fn rosters(&self, m: &Match) -> Result<MatchRosters, StoreError> {
        Ok(self.read()?.rosters(m))
    }

    fn confirmations(&self, match_id: MatchId) -> Result<Vec<MatchConfirmation>, StoreError> {
        let mut rows: Vec<MatchConfirmation> = self
            .read()?
            .confirmations
            .values()
            .filter(|c| c.match_id == match_id)
            .cloned()
            .collect();
        rows.sort_by_key(|c| (c.updated_at, c.participant_id));
        Ok(rows)
    }

    fn upsert_confirmation(&self, confirmation: MatchConfirmation) -> Result<(), StoreError> {
        let key = (confirmation.match_id, confirmation.participant_id);
        self.write()?.confirmations.insert(key, confirmation);
        Ok(())
    }

    fn clear_confirmations(&self, match_id: MatchId) -> Result<(), StoreError> {
        self.write()?
            .confirmations
            .retain(|(id, _), _| *id != match_id);
        Ok(())
    }

    fn expired_matches(&self, now: DateTime<Utc>) -> Result<Vec<Match>, StoreError> {
        let mut list: Vec<Match> = self
            .read()?
            .matches
            .values()
            .filter(|m| m.status.awaiting_confirmation())
            .filter(|m| m.confirmation_deadline.is_some_and(|d| d < now))
            .cloned()
            .collect();
        sort_matches(&mut list);
        Ok(list)
    }

    fn count_player_matches(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
        exclude: Option<MatchId>,
    ) -> Result<u32, StoreError> {
        let g = self.read()?;
        let count = g
            .history(tournament_id, exclude)
            .filter(|r| r.side_of(participant_id).is_some())
            .count();
        Ok(count as u32)
    }

    fn count_pair_matches(&self, query: PairQuery) -> Result<u32, StoreError> {
        let g = self.read()?;
        let count = g
            .history(query.tournament_id, query.exclude)
            .filter(|r| {
                let (Some(first), Some(second)) = (r.side_of(query.first), r.side_of(query.second))
                else {
                    return false;
                };
                let related = match query.pairing {
                    Pairing::Partners => first == second,
                    Pairing::Opponents => first != second,
                };
                let size = r.side(first).members().len();
                related && query.team_size.map_or(true, |s| s == size)
            })
            .count();
        Ok(count as u32)
    }
}
