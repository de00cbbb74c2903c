//! Errors raised by the engine, each with a stable code, a category and a detail payload.

use crate::models::game::{MatchId, MatchStatus};
use crate::models::participant::{ParticipantId, TeamId};
use crate::models::tournament::TournamentId;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Broad class of an error, for callers that need to pick a response type.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    NotFound,
    Permission,
    Validation,
    Conflict,
    State,
    Unknown,
}

impl ErrorCategory {
    /// Conventional HTTP status class for the category.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCategory::NotFound => 404,
            ErrorCategory::Permission => 403,
            ErrorCategory::Validation => 400,
            ErrorCategory::Conflict | ErrorCategory::State => 409,
            ErrorCategory::Unknown => 500,
        }
    }
}

/// Failures of the storage collaborator.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum StoreError {
    #[error("storage lock poisoned")]
    Poisoned,
    #[error("storage failure: {0}")]
    Backend(String),
}

/// Errors that can occur during tournament operations.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum TournamentError {
    #[error("tournament {0} not found")]
    TournamentNotFound(TournamentId),
    #[error("match {0} not found")]
    MatchNotFound(MatchId),
    #[error("team {0} not found")]
    TeamNotFound(TeamId),
    #[error("participant {0} not found")]
    ParticipantNotFound(ParticipantId),

    #[error("user is not a participant of this match")]
    NotAParticipant,
    #[error("user may not manage this tournament")]
    PermissionDenied,

    #[error("scores must be non-negative integers")]
    InvalidScore,
    #[error("draws are not allowed in this tournament")]
    DrawNotAllowed,
    #[error("team sizes differ ({size_a} vs {size_b})")]
    TeamSizeMismatch { size_a: usize, size_b: usize },
    #[error("team size {size} is outside {min}..={max}")]
    InvalidTeamSize { size: usize, min: usize, max: usize },
    #[error("players appear on both sides")]
    OverlappingPlayers(Vec<ParticipantId>),
    #[error("teams do not belong to this tournament")]
    InvalidTeams,
    #[error("players do not belong to this tournament")]
    InvalidPlayers,
    #[error("need at least 2 participants to build a bracket (got {count})")]
    NotEnoughParticipants { count: usize },
    #[error("participant listed more than once in the bracket")]
    DuplicateBracketEntry,

    #[error("{player_name} already played {max} matches")]
    MaxMatchesExceeded { max: u32, player_name: String },
    #[error("{player_name} and {partner_name} already partnered {max} times at {team_size} per side")]
    MaxPartnerMatchesExceeded {
        max: u32,
        player_name: String,
        partner_name: String,
        team_size: usize,
    },
    #[error("{player_name} and {opponent_name} already faced each other {max} times at {team_size} per side")]
    MaxOpponentMatchesExceeded {
        max: u32,
        player_name: String,
        opponent_name: String,
        team_size: usize,
    },

    #[error("tournament already has matches")]
    BracketAlreadyExists,
    #[error("user is already registered")]
    AlreadyRegistered,
    #[error("participant already belongs to a team or a match")]
    ParticipantLocked,
    #[error("team name {0:?} is already taken")]
    TeamNameTaken(String),
    #[error("a team with this roster already exists")]
    TeamCompositionTaken,

    #[error("tournament is not open for registration")]
    TournamentNotOpen,
    #[error("match is already finalized")]
    AlreadyFinalized,
    #[error("match result is already confirmed")]
    AlreadyConfirmed,
    #[error("match cannot be deleted once confirmed")]
    CannotBeDeleted,
    #[error("operation not allowed while match is {0}")]
    InvalidStatus(MatchStatus),
    #[error("bracket match is still waiting for an entrant")]
    MatchNotReady,

    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl TournamentError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        use TournamentError::*;
        match self {
            TournamentNotFound(_) => "TOURNAMENT_NOT_FOUND",
            MatchNotFound(_) => "MATCH_NOT_FOUND",
            TeamNotFound(_) => "TEAM_NOT_FOUND",
            ParticipantNotFound(_) => "PARTICIPANT_NOT_FOUND",
            NotAParticipant => "NOT_A_PARTICIPANT",
            PermissionDenied => "PERMISSION_DENIED",
            InvalidScore => "MATCH_INVALID_SCORE",
            DrawNotAllowed => "MATCH_DRAW_NOT_ALLOWED",
            TeamSizeMismatch { .. } => "MATCH_TEAM_SIZE_MISMATCH",
            InvalidTeamSize { .. } => "MATCH_INVALID_TEAM_SIZE",
            OverlappingPlayers(_) => "MATCH_OVERLAPPING_PLAYERS",
            InvalidTeams => "MATCH_INVALID_TEAMS",
            InvalidPlayers => "MATCH_INVALID_PLAYERS",
            NotEnoughParticipants { .. } => "BRACKET_NOT_ENOUGH_PARTICIPANTS",
            DuplicateBracketEntry => "BRACKET_DUPLICATE_ENTRY",
            MaxMatchesExceeded { .. } => "MAX_MATCHES_EXCEEDED",
            MaxPartnerMatchesExceeded { .. } => "MAX_PARTNER_MATCHES_EXCEEDED",
            MaxOpponentMatchesExceeded { .. } => "MAX_OPPONENT_MATCHES_EXCEEDED",
            BracketAlreadyExists => "BRACKET_ALREADY_EXISTS",
            AlreadyRegistered => "PARTICIPANT_ALREADY_REGISTERED",
            ParticipantLocked => "PARTICIPANT_LOCKED",
            TeamNameTaken(_) => "TEAM_NAME_TAKEN",
            TeamCompositionTaken => "TEAM_COMPOSITION_TAKEN",
            TournamentNotOpen => "TOURNAMENT_NOT_OPEN",
            AlreadyFinalized => "MATCH_ALREADY_FINALIZED",
            AlreadyConfirmed => "MATCH_ALREADY_CONFIRMED",
            CannotBeDeleted => "MATCH_CANNOT_BE_DELETED",
            InvalidStatus(_) => "MATCH_INVALID_STATUS",
            MatchNotReady => "MATCH_NOT_READY",
            Storage(_) | Internal(_) => "UNKNOWN_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        use TournamentError::*;
        match self {
            TournamentNotFound(_) | MatchNotFound(_) | TeamNotFound(_) | ParticipantNotFound(_) => {
                ErrorCategory::NotFound
            }
            NotAParticipant | PermissionDenied => ErrorCategory::Permission,
            InvalidScore
            | DrawNotAllowed
            | TeamSizeMismatch { .. }
            | InvalidTeamSize { .. }
            | OverlappingPlayers(_)
            | InvalidTeams
            | InvalidPlayers
            | NotEnoughParticipants { .. }
            | DuplicateBracketEntry => ErrorCategory::Validation,
            MaxMatchesExceeded { .. }
            | MaxPartnerMatchesExceeded { .. }
            | MaxOpponentMatchesExceeded { .. }
            | BracketAlreadyExists
            | AlreadyRegistered
            | ParticipantLocked
            | TeamNameTaken(_)
            | TeamCompositionTaken => ErrorCategory::Conflict,
            TournamentNotOpen
            | AlreadyFinalized
            | AlreadyConfirmed
            | CannotBeDeleted
            | InvalidStatus(_)
            | MatchNotReady => ErrorCategory::State,
            Storage(_) | Internal(_) => ErrorCategory::Unknown,
        }
    }

    /// Structured payload for client-side messages.
    pub fn details(&self) -> Value {
        use TournamentError::*;
        match self {
            TournamentNotFound(id) | MatchNotFound(id) | TeamNotFound(id)
            | ParticipantNotFound(id) => json!({ "id": id }),
            TeamSizeMismatch { size_a, size_b } => json!({ "sizeA": size_a, "sizeB": size_b }),
            InvalidTeamSize { size, min, max } => json!({ "size": size, "min": min, "max": max }),
            OverlappingPlayers(ids) => json!({ "players": ids }),
            NotEnoughParticipants { count } => json!({ "count": count, "min": 2 }),
            MaxMatchesExceeded { max, player_name } => {
                json!({ "max": max, "playerName": player_name })
            }
            MaxPartnerMatchesExceeded {
                max,
                player_name,
                partner_name,
                team_size,
            } => json!({
                "max": max,
                "playerName": player_name,
                "partnerName": partner_name,
                "teamSize": team_size,
            }),
            MaxOpponentMatchesExceeded {
                max,
                player_name,
                opponent_name,
                team_size,
            } => json!({
                "max": max,
                "playerName": player_name,
                "opponentName": opponent_name,
                "teamSize": team_size,
            }),
            TeamNameTaken(name) => json!({ "name": name }),
            InvalidStatus(status) => json!({ "status": status }),
            _ => json!({}),
        }
    }
}
