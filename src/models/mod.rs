//! Data structures for the tournament engine: tournaments, entrants, matches, errors.

mod error;
mod game;
mod participant;
mod tournament;

pub use error::{ErrorCategory, StoreError, TournamentError};
pub use game::{
    BracketInfo, BracketType, FinalizationReason, Match, MatchConfirmation, MatchId,
    MatchParticipation, MatchRosters, MatchStatus, Roster, Side,
};
pub use participant::{composition_hash, Participant, ParticipantId, Team, TeamId};
pub use tournament::{Scoring, TeamMode, Tournament, TournamentId, TournamentStatus, UserId};
