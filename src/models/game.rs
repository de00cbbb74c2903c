//! Match, its bracket metadata, rosters, participations and confirmations.

use crate::models::participant::{ParticipantId, TeamId};
use crate::models::tournament::{TournamentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a match.
pub type MatchId = Uuid;

/// One of the two sides of a match.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// Match lifecycle status.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    #[default]
    Scheduled,
    Reported,
    PendingConfirmation,
    Confirmed,
    Disputed,
    Finalized,
    Cancelled,
}

impl MatchStatus {
    /// A reported result waiting for the other participants.
    pub const AWAITING_CONFIRMATION: [MatchStatus; 2] =
        [MatchStatus::Reported, MatchStatus::PendingConfirmation];

    /// Statuses counted by official standings.
    pub const OFFICIAL: [MatchStatus; 1] = [MatchStatus::Finalized];

    /// Statuses counted by provisional standings.
    pub const PROVISIONAL: [MatchStatus; 2] = [MatchStatus::Reported, MatchStatus::Finalized];

    pub fn awaiting_confirmation(self) -> bool {
        Self::AWAITING_CONFIRMATION.contains(&self)
    }

    /// Confirmed and finalized results can no longer be edited or deleted.
    pub fn is_locked(self) -> bool {
        matches!(self, MatchStatus::Confirmed | MatchStatus::Finalized)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Reported => "reported",
            MatchStatus::PendingConfirmation => "pending_confirmation",
            MatchStatus::Confirmed => "confirmed",
            MatchStatus::Disputed => "disputed",
            MatchStatus::Finalized => "finalized",
            MatchStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a match reached `finalized`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizationReason {
    /// A majority of the roster confirmed, with both sides represented.
    Consensus,
    AdminOverride,
    /// Resolved without play (byes and void bracket matches).
    AutoValidation,
    /// The confirmation window expired without contestation.
    Timeout,
}

/// Bracket partition a generated match belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketType {
    Winner,
    Loser,
    GrandFinal,
}

/// Bracket metadata carried by a persisted match.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BracketInfo {
    /// Generation order; unique within one tournament's bracket.
    pub sequence: usize,
    pub bracket_type: BracketType,
    pub position: usize,
    pub next_match_win: Option<MatchId>,
    pub next_match_lose: Option<MatchId>,
    /// Entrants that can ever reach this match: 2 is a real game, 1 a bye, 0 a void match.
    pub expected_entrants: u8,
}

/// The persistent unit of competition.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub round: u32,
    pub bracket: Option<BracketInfo>,
    /// Team slots; empty in flex mode outside brackets (rosters live in participations).
    pub team_a: Option<TeamId>,
    pub team_b: Option<TeamId>,
    pub score_a: Option<u32>,
    pub score_b: Option<u32>,
    /// `None` while undecided or on a draw.
    pub winner: Option<Side>,
    pub status: MatchStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub reported_by: Option<UserId>,
    pub reported_at: Option<DateTime<Utc>>,
    pub confirmation_deadline: Option<DateTime<Utc>>,
    pub proof: Option<String>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub finalization_reason: Option<FinalizationReason>,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn new(tournament_id: TournamentId, round: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            tournament_id,
            round,
            bracket: None,
            team_a: None,
            team_b: None,
            score_a: None,
            score_b: None,
            winner: None,
            status: MatchStatus::Scheduled,
            scheduled_at: None,
            reported_by: None,
            reported_at: None,
            confirmation_deadline: None,
            proof: None,
            finalized_at: None,
            finalization_reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn team(&self, side: Side) -> Option<TeamId> {
        match side {
            Side::A => self.team_a,
            Side::B => self.team_b,
        }
    }

    pub fn winner_team_id(&self) -> Option<TeamId> {
        self.winner.and_then(|side| self.team(side))
    }

    pub fn loser_team_id(&self) -> Option<TeamId> {
        self.winner.and_then(|side| self.team(side.other()))
    }

    pub fn has_result(&self) -> bool {
        self.score_a.is_some() && self.score_b.is_some()
    }

    pub fn is_draw(&self) -> bool {
        self.has_result() && self.score_a == self.score_b
    }

    /// Number of filled team slots.
    pub fn seated(&self) -> usize {
        usize::from(self.team_a.is_some()) + usize::from(self.team_b.is_some())
    }

    /// Put a team in the first empty slot. Returns the side used, or `None` when full.
    pub fn seat(&mut self, team_id: TeamId) -> Option<Side> {
        if self.team_a.is_none() {
            self.team_a = Some(team_id);
            Some(Side::A)
        } else if self.team_b.is_none() {
            self.team_b = Some(team_id);
            Some(Side::B)
        } else {
            None
        }
    }
}

/// Flex mode: which side a player represents in one match.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MatchParticipation {
    pub match_id: MatchId,
    pub participant_id: ParticipantId,
    pub side: Side,
}

/// One player's verdict on a reported result.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MatchConfirmation {
    pub match_id: MatchId,
    pub participant_id: ParticipantId,
    pub is_confirmed: bool,
    pub contest_reason: Option<String>,
    pub contest_proof: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl MatchConfirmation {
    pub fn is_contested(&self) -> bool {
        !self.is_confirmed
    }
}

/// One side of a match as read back from storage.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Roster {
    /// A stored team (static mode, or any bracket match).
    Team {
        team_id: TeamId,
        members: Vec<ParticipantId>,
    },
    /// An ad-hoc roster assembled from participation rows (flex mode).
    Players { members: Vec<ParticipantId> },
    /// Slot not filled yet.
    Empty,
}

impl Roster {
    pub fn members(&self) -> &[ParticipantId] {
        match self {
            Roster::Team { members, .. } | Roster::Players { members } => members,
            Roster::Empty => &[],
        }
    }

    pub fn team_id(&self) -> Option<TeamId> {
        match self {
            Roster::Team { team_id, .. } => Some(*team_id),
            _ => None,
        }
    }
}

/// Both sides of a match.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MatchRosters {
    pub a: Roster,
    pub b: Roster,
}

impl MatchRosters {
    pub fn side(&self, side: Side) -> &Roster {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    pub fn side_of(&self, participant_id: ParticipantId) -> Option<Side> {
        if self.a.members().contains(&participant_id) {
            Some(Side::A)
        } else if self.b.members().contains(&participant_id) {
            Some(Side::B)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.a.members().len() + self.b.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.a.members().iter().chain(self.b.members()).copied()
    }
}
