//! Participant and Team data structures.

use crate::models::tournament::{TournamentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a participant (one user's entry in one tournament).
pub type ParticipantId = Uuid;

/// Unique identifier for a team.
pub type TeamId = Uuid;

/// An entrant in a tournament.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub tournament_id: TournamentId,
    pub user_id: UserId,
    pub name: String,
    /// Set in static mode once the participant is placed on a team.
    pub team_id: Option<TeamId>,
    pub matches_played: u32,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(tournament_id: TournamentId, user_id: UserId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tournament_id,
            user_id,
            name: name.into(),
            team_id: None,
            matches_played: 0,
            joined_at: Utc::now(),
        }
    }
}

/// A named grouping of participants within one tournament.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub tournament_id: TournamentId,
    pub name: String,
    pub members: Vec<ParticipantId>,
    /// Identical rosters hash identically, whatever the member order.
    pub composition_hash: Uuid,
}

impl Team {
    pub fn new(
        tournament_id: TournamentId,
        name: impl Into<String>,
        members: Vec<ParticipantId>,
    ) -> Self {
        let composition_hash = composition_hash(tournament_id, &members);
        Self {
            id: Uuid::new_v4(),
            tournament_id,
            name: name.into(),
            members,
            composition_hash,
        }
    }
}

/// UUIDv5 over the sorted member ids, namespaced by the tournament.
pub fn composition_hash(tournament_id: TournamentId, members: &[ParticipantId]) -> Uuid {
    let mut sorted = members.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let bytes: Vec<u8> = sorted.iter().flat_map(|id| id.as_bytes().to_vec()).collect();
    Uuid::new_v5(&tournament_id, &bytes)
}
