//! Storage collaborator: the repository interface the engine is written against.
//!
//! Any backend satisfies it as long as every method is individually atomic.
//! [`MemoryStore`] is the in-process implementation used by the web binary and tests.

mod memory;

pub use memory::MemoryStore;

use crate::models::{
    Match, MatchConfirmation, MatchId, MatchParticipation, MatchRosters, MatchStatus, Participant,
    ParticipantId, StoreError, Team, TeamId, Tournament, TournamentError, TournamentId,
    TournamentStatus,
};
use chrono::{DateTime, Utc};

/// How two players relate within one match.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Pairing {
    /// Same side.
    Partners,
    /// Opposite sides.
    Opponents,
}

/// Filter for pair-history counts.
#[derive(Clone, Copy, Debug)]
pub struct PairQuery {
    pub tournament_id: TournamentId,
    pub first: ParticipantId,
    pub second: ParticipantId,
    pub pairing: Pairing,
    /// Only count matches played at this many players per side.
    pub team_size: Option<usize>,
    pub exclude: Option<MatchId>,
}

pub trait TournamentStore: Send + Sync {
    fn insert_tournament(&self, tournament: Tournament) -> Result<(), StoreError>;
    fn tournament(&self, id: TournamentId) -> Result<Option<Tournament>, StoreError>;
    fn set_tournament_status(
        &self,
        id: TournamentId,
        status: TournamentStatus,
    ) -> Result<(), StoreError>;

    /// Fails with `AlreadyRegistered` when the user already has an entry in the tournament.
    fn insert_participant(&self, participant: Participant) -> Result<(), TournamentError>;
    /// Removes a participant that is on no team and in no match.
    fn remove_participant(&self, id: ParticipantId) -> Result<Participant, TournamentError>;
    fn participant(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError>;
    fn participants(&self, tournament_id: TournamentId) -> Result<Vec<Participant>, StoreError>;
    fn increment_matches_played(&self, ids: &[ParticipantId]) -> Result<(), StoreError>;

    /// Fails on a duplicate name or composition, and assigns members to the team.
    fn insert_team(&self, team: Team) -> Result<(), TournamentError>;
    fn team(&self, id: TeamId) -> Result<Option<Team>, StoreError>;
    fn teams(&self, tournament_id: TournamentId) -> Result<Vec<Team>, StoreError>;

    fn insert_match(
        &self,
        m: Match,
        participations: Vec<MatchParticipation>,
    ) -> Result<(), StoreError>;
    /// Writes teams, matches and participations in one transaction.
    /// Fails with `BracketAlreadyExists` if the tournament has any match.
    fn insert_bracket(
        &self,
        tournament_id: TournamentId,
        teams: Vec<Team>,
        matches: Vec<Match>,
        participations: Vec<MatchParticipation>,
    ) -> Result<(), TournamentError>;
    fn get_match(&self, id: MatchId) -> Result<Option<Match>, StoreError>;
    /// Matches of a tournament whose status is in `statuses`; all matches when empty.
    fn matches(
        &self,
        tournament_id: TournamentId,
        statuses: &[MatchStatus],
    ) -> Result<Vec<Match>, StoreError>;
    /// Apply `update` only if `guard` holds for the stored match, in one atomic step.
    /// Returns the updated match, or `None` when the match is missing or the guard failed.
    fn update_match_if(
        &self,
        id: MatchId,
        guard: &dyn Fn(&Match) -> bool,
        update: &mut dyn FnMut(&mut Match),
    ) -> Result<Option<Match>, StoreError>;
    /// [`TournamentStore::update_match_if`] guarded on the current status.
    fn update_match(
        &self,
        id: MatchId,
        expected: &[MatchStatus],
        update: &mut dyn FnMut(&mut Match),
    ) -> Result<Option<Match>, StoreError> {
        self.update_match_if(id, &|m| expected.contains(&m.status), update)
    }
    /// Deletes a match and its rows if its status is in `expected`.
    fn delete_match(&self, id: MatchId, expected: &[MatchStatus]) -> Result<bool, StoreError>;

    fn participations(&self, match_id: MatchId) -> Result<Vec<MatchParticipation>, StoreError>;
    fn tournament_participations(
        &self,
        tournament_id: TournamentId,
    ) -> Result<Vec<MatchParticipation>, StoreError>;
    fn add_participations(&self, rows: Vec<MatchParticipation>) -> Result<(), StoreError>;
    fn replace_participations(
        &self,
        match_id: MatchId,
        rows: Vec<MatchParticipation>,
    ) -> Result<(), StoreError>;
    /// Both sides of a match: team members for team slots, participation rows otherwise.
    fn rosters(&self, m: &Match) -> Result<MatchRosters, StoreError>;

    fn confirmations(&self, match_id: MatchId) -> Result<Vec<MatchConfirmation>, StoreError>;
    /// Insert or replace by `(match_id, participant_id)`.
    fn upsert_confirmation(&self, confirmation: MatchConfirmation) -> Result<(), StoreError>;
    fn clear_confirmations(&self, match_id: MatchId) -> Result<(), StoreError>;

    /// Reported or pending matches whose confirmation deadline is before `now`.
    fn expired_matches(&self, now: DateTime<Utc>) -> Result<Vec<Match>, StoreError>;

    /// Non-cancelled matches of the tournament the participant appears in.
    fn count_player_matches(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
        exclude: Option<MatchId>,
    ) -> Result<u32, StoreError>;
    /// Non-cancelled matches where the two participants relate as `query.pairing`.
    fn count_pair_matches(&self, query: PairQuery) -> Result<u32, StoreError>;
}
