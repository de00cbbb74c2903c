//! Tournament business logic: brackets, match lifecycle, rules and standings.

pub mod bracket;
pub mod lifecycle;
pub mod permissions;
pub mod persist;
pub mod progression;
pub mod rules;
pub mod service;
pub mod standings;

pub use bracket::{BracketEntrant, BracketKind, BracketLink, BracketMatch};
pub use lifecycle::{ContestInput, SweepReport};
pub use permissions::{Actor, Capabilities};
pub use rules::{MatchInput, ScoreInput, ValidationReport};
pub use service::{SeededEntrant, TournamentService};
pub use standings::{StandingsEntry, StandingsView};
