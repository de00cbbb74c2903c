//! Tournament context: scoring configuration, team topology and repetition caps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tournament.
pub type TournamentId = Uuid;

/// Unique identifier for an authenticated user (owner, co-admin, player).
pub type UserId = Uuid;

/// How players are grouped into sides.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamMode {
    /// Participants are pre-assigned to fixed, named teams.
    #[default]
    Static,
    /// Each match declares its own rosters of individual players.
    Flex,
}

/// Current phase of the tournament.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    /// Registration is open; participants may join and leave.
    #[default]
    Open,
    /// Matches are being played.
    Ongoing,
    Completed,
}

/// Points awarded per match outcome.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Scoring {
    pub point_per_victory: i32,
    pub point_per_draw: i32,
    pub point_per_loss: i32,
}

impl Default for Scoring {
    fn default() -> Self {
        Self {
            point_per_victory: 3,
            point_per_draw: 1,
            point_per_loss: 0,
        }
    }
}

/// A tournament as consumed by the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub owner_id: UserId,
    pub co_admins: Vec<UserId>,
    pub status: TournamentStatus,
    pub team_mode: TeamMode,
    pub allow_draw: bool,
    pub scoring: Scoring,
    pub min_team_size: usize,
    pub max_team_size: usize,
    /// `None` means unlimited.
    pub max_matches_per_player: Option<u32>,
    pub max_times_with_same_partner: Option<u32>,
    pub max_times_with_same_opponent: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Tournament {
    /// Create an open tournament with default scoring (3/1/0), no draws, 1v1 sides and no caps.
    pub fn new(name: impl Into<String>, owner_id: UserId, team_mode: TeamMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner_id,
            co_admins: Vec::new(),
            status: TournamentStatus::Open,
            team_mode,
            allow_draw: false,
            scoring: Scoring::default(),
            min_team_size: 1,
            max_team_size: 1,
            max_matches_per_player: None,
            max_times_with_same_partner: None,
            max_times_with_same_opponent: None,
            created_at: Utc::now(),
        }
    }

    /// Owner or co-admin of this tournament.
    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.owner_id == user_id || self.co_admins.contains(&user_id)
    }

    pub fn is_open(&self) -> bool {
        self.status == TournamentStatus::Open
    }

    pub fn team_size_allowed(&self, size: usize) -> bool {
        (self.min_team_size..=self.max_team_size).contains(&size)
    }
}
