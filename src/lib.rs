//! Tournament engine: elimination brackets, multi-party match confirmation and standings.

pub mod config;
pub mod logic;
pub mod models;
pub mod notify;
pub mod store;

pub use config::{Config, LifecycleSettings};
pub use logic::{
    Actor, BracketKind, BracketMatch, ContestInput, MatchInput, ScoreInput, SeededEntrant,
    StandingsEntry, StandingsView, SweepReport, TournamentService, ValidationReport,
};
pub use models::{
    ErrorCategory, FinalizationReason, Match, MatchId, MatchStatus, Participant, ParticipantId,
    Team, TeamId, TeamMode, Tournament, TournamentError, TournamentId, UserId,
};
pub use notify::{ChannelRegistry, ConnectionRegistry, MatchEvent};
pub use store::{MemoryStore, TournamentStore};
