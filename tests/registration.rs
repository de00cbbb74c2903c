//! Integration tests for joining, leaving and team registration.

mod common;

use common::Fixture;
use tourney_engine::logic::BracketKind;
use tourney_engine::models::TournamentStatus;
use tourney_engine::{
    Actor, MatchInput, Team, TeamMode, Tournament, TournamentError, TournamentStore,
};
use uuid::Uuid;

#[test]
fn tournaments_reject_inverted_team_sizes() {
    let fx = Fixture::new(TeamMode::Flex, |_| {});
    let mut draft = Tournament::new("Broken", fx.owner.user_id, TeamMode::Static);
    draft.min_team_size = 3;
    draft.max_team_size = 2;
    assert!(matches!(
        fx.service.create_tournament(draft, &fx.owner),
        Err(TournamentError::InvalidTeamSize { .. })
    ));
}

#[test]
fn a_user_joins_a_tournament_once() {
    let fx = Fixture::new(TeamMode::Flex, |_| {});
    let (actor, _) = fx.join("Ada");
    assert_eq!(
        fx.service.join_tournament(fx.id(), "Ada again", &actor),
        Err(TournamentError::AlreadyRegistered)
    );
    assert_eq!(fx.service.participants(fx.id()).unwrap().len(), 1);
}

#[test]
fn leaving_is_free_until_the_player_is_committed() {
    let fx = Fixture::new(TeamMode::Flex, |_| {});
    let p = fx.players(3);
    fx.service.leave_tournament(fx.id(), &p[2].0).unwrap();
    assert_eq!(fx.service.participants(fx.id()).unwrap().len(), 2);

    let proposal = MatchInput {
        players_a: vec![p[0].1.id],
        players_b: vec![p[1].1.id],
        ..MatchInput::default()
    };
    fx.service.create_match(fx.id(), &proposal, &fx.owner).unwrap();
    assert_eq!(
        fx.service.leave_tournament(fx.id(), &p[0].0),
        Err(TournamentError::ParticipantLocked)
    );
}

#[test]
fn team_members_cannot_leave() {
    let fx = Fixture::new(TeamMode::Static, |_| {});
    let teams = fx.teams(1, 1);
    assert_eq!(
        fx.service.leave_tournament(fx.id(), &teams[0].0[0]),
        Err(TournamentError::ParticipantLocked)
    );
}

#[test]
fn strangers_cannot_leave() {
    let fx = Fixture::new(TeamMode::Flex, |_| {});
    let stranger = Actor::user(Uuid::new_v4());
    assert_eq!(
        fx.service.leave_tournament(fx.id(), &stranger),
        Err(TournamentError::NotAParticipant)
    );
}

#[test]
fn registration_closes_once_the_bracket_exists() {
    let fx = Fixture::new(TeamMode::Flex, |_| {});
    let p = fx.players(2);
    fx.service
        .generate_bracket(fx.id(), BracketKind::Single, &[], &fx.owner)
        .unwrap();
    assert_eq!(
        fx.service.tournament(fx.id()).unwrap().status,
        TournamentStatus::Ongoing
    );

    let late = Actor::user(Uuid::new_v4());
    assert_eq!(
        fx.service.join_tournament(fx.id(), "Late", &late),
        Err(TournamentError::TournamentNotOpen)
    );
    assert_eq!(
        fx.service.leave_tournament(fx.id(), &p[0].0),
        Err(TournamentError::TournamentNotOpen)
    );
}

#[test]
fn team_names_are_unique_ignoring_case() {
    let fx = Fixture::new(TeamMode::Static, |_| {});
    fx.teams(1, 1);
    let (_, extra) = fx.join("Extra");
    assert_eq!(
        fx.service.create_team(fx.id(), "t0", vec![extra.id], &fx.owner),
        Err(TournamentError::TeamNameTaken("t0".to_string()))
    );
}

#[test]
fn a_roster_is_registered_only_once() {
    let fx = Fixture::new(TeamMode::Static, |t| t.max_team_size = 2);
    let teams = fx.teams(1, 2);
    let members = teams[0].1.members.clone();
    let mut reversed = members.clone();
    reversed.reverse();
    let clone = Team::new(fx.id(), "Copycats", reversed);
    assert_eq!(clone.composition_hash, teams[0].1.composition_hash);
    assert_eq!(
        fx.service.store().insert_team(clone),
        Err(TournamentError::TeamCompositionTaken)
    );
}

#[test]
fn players_sit_on_a_single_team() {
    let fx = Fixture::new(TeamMode::Static, |t| t.max_team_size = 2);
    let teams = fx.teams(1, 2);
    let (_, extra) = fx.join("Extra");
    let poached = vec![teams[0].1.members[0], extra.id];
    assert_eq!(
        fx.service.create_team(fx.id(), "Poachers", poached, &fx.owner),
        Err(TournamentError::ParticipantLocked)
    );
}

#[test]
fn team_rosters_are_checked_before_storing() {
    let fx = Fixture::new(TeamMode::Static, |t| t.max_team_size = 2);
    let p = fx.players(3);
    let all: Vec<Uuid> = p.iter().map(|(_, participant)| participant.id).collect();
    assert_eq!(
        fx.service.create_team(fx.id(), "Crowd", all, &fx.owner),
        Err(TournamentError::InvalidTeamSize {
            size: 3,
            min: 1,
            max: 2
        })
    );
    assert_eq!(
        fx.service
            .create_team(fx.id(), "Echo", vec![p[0].1.id, p[0].1.id], &fx.owner),
        Err(TournamentError::InvalidPlayers)
    );
    assert_eq!(
        fx.service
            .create_team(fx.id(), "Ghosts", vec![Uuid::new_v4()], &fx.owner),
        Err(TournamentError::InvalidPlayers)
    );
}

#[test]
fn players_only_register_teams_they_belong_to() {
    let fx = Fixture::new(TeamMode::Static, |t| t.max_team_size = 2);
    let p = fx.players(3);
    assert_eq!(
        fx.service
            .create_team(fx.id(), "Others", vec![p[1].1.id, p[2].1.id], &p[0].0),
        Err(TournamentError::NotAParticipant)
    );
    let team = fx
        .service
        .create_team(fx.id(), " Mine ", vec![p[0].1.id, p[1].1.id], &p[0].0)
        .unwrap();
    assert_eq!(team.name, "Mine");
    let members = fx.service.participants(fx.id()).unwrap();
    assert!(members
        .iter()
        .filter(|m| team.members.contains(&m.id))
        .all(|m| m.team_id == Some(team.id)));
}

#[test]
fn flex_tournaments_have_no_stored_teams() {
    let fx = Fixture::new(TeamMode::Flex, |_| {});
    let p = fx.players(1);
    assert_eq!(
        fx.service.create_team(fx.id(), "Solo", vec![p[0].1.id], &p[0].0),
        Err(TournamentError::InvalidTeams)
    );
}
