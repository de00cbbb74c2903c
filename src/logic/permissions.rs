//! Capability resolution: who may do what to a match.

use crate::models::{
    MatchRosters, Participant, ParticipantId, Side, Tournament, TournamentError, UserId,
};
use serde::{Deserialize, Serialize};

/// The acting user.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    /// Global super-admin, may manage every tournament.
    #[serde(default)]
    pub super_admin: bool,
}

impl Actor {
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            super_admin: false,
        }
    }

    pub fn super_admin(user_id: UserId) -> Self {
        Self {
            user_id,
            super_admin: true,
        }
    }
}

/// What an actor may do in one tournament and, optionally, one match.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Capabilities {
    /// Owner, co-admin or super-admin.
    pub manage: bool,
    /// The actor's entry in the tournament, if registered.
    pub participant: Option<ParticipantId>,
    /// Side the actor plays on in the match under consideration.
    pub side: Option<Side>,
}

impl Capabilities {
    pub fn require_manage(&self) -> Result<(), TournamentError> {
        if self.manage {
            Ok(())
        } else {
            Err(TournamentError::PermissionDenied)
        }
    }

    /// The actor's participant id, if they play in the match.
    pub fn require_participant(&self) -> Result<(ParticipantId, Side), TournamentError> {
        match (self.participant, self.side) {
            (Some(participant), Some(side)) => Ok((participant, side)),
            _ => Err(TournamentError::NotAParticipant),
        }
    }

    /// Plays in the match, or manages the tournament.
    pub fn require_participant_or_manage(&self) -> Result<(), TournamentError> {
        if self.manage || self.side.is_some() {
            Ok(())
        } else {
            Err(TournamentError::NotAParticipant)
        }
    }
}

/// Resolve an actor's capabilities against a tournament and (when given) a match's rosters.
pub fn resolve(
    tournament: &Tournament,
    participants: &[Participant],
    rosters: Option<&MatchRosters>,
    actor: &Actor,
) -> Capabilities {
    let manage = actor.super_admin || tournament.is_admin(actor.user_id);
    let participant = participants
        .iter()
        .find(|p| p.tournament_id == tournament.id && p.user_id == actor.user_id)
        .map(|p| p.id);
    let side = participant.and_then(|id| rosters.and_then(|r| r.side_of(id)));
    Capabilities {
        manage,
        participant,
        side,
    }
}
