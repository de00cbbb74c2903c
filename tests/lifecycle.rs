//! Integration tests for the match lifecycle: report, confirm, contest, finalize, sweep.

mod common;

use chrono::{Duration, Utc};
use common::Fixture;
use tourney_engine::models::{MatchConfirmation, Participant};
use tourney_engine::{
    Actor, BracketKind, ContestInput, FinalizationReason, LifecycleSettings, Match, MatchEvent,
    MatchInput, MatchStatus, ScoreInput, SeededEntrant, TeamMode, TournamentError,
    TournamentStore,
};
use uuid::Uuid;

/// Flex tournament allowing 1v1 and 2v2.
fn flex(allow_draw: bool) -> Fixture {
    Fixture::new(TeamMode::Flex, |t| {
        t.allow_draw = allow_draw;
        t.max_team_size = 2;
    })
}

fn input(a: &[&Participant], b: &[&Participant]) -> MatchInput {
    MatchInput {
        players_a: a.iter().map(|p| p.id).collect(),
        players_b: b.iter().map(|p| p.id).collect(),
        ..MatchInput::default()
    }
}

fn score(a: i64, b: i64) -> ScoreInput {
    ScoreInput {
        score_a: a,
        score_b: b,
        proof: None,
    }
}

fn contest(reason: &str) -> ContestInput {
    ContestInput {
        reason: reason.to_string(),
        proof: None,
    }
}

#[test]
fn report_sets_winner_deadline_and_reporter_confirmation() {
    let fx = flex(false);
    let p = fx.players(2);
    let m = fx
        .service
        .create_match(fx.id(), &input(&[&p[0].1], &[&p[1].1]), &p[0].0)
        .unwrap();
    assert_eq!(m.status, MatchStatus::Scheduled);

    let reported = fx.service.report_result(m.id, &score(2, 1), &p[0].0).unwrap();
    assert_eq!(reported.status, MatchStatus::Reported);
    assert_eq!(reported.winner, Some(tourney_engine::models::Side::A));
    assert_eq!(reported.reported_by, Some(p[0].0.user_id));
    let reported_at = reported.reported_at.unwrap();
    assert_eq!(
        reported.confirmation_deadline,
        Some(reported_at + Duration::hours(72))
    );

    let rows = fx.service.store().confirmations(m.id).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].participant_id, p[0].1.id);
    assert!(rows[0].is_confirmed);
}

#[test]
fn draws_depend_on_the_tournament() {
    let strict = flex(false);
    let p = strict.players(2);
    let m = strict
        .service
        .create_match(strict.id(), &input(&[&p[0].1], &[&p[1].1]), &p[0].0)
        .unwrap();
    assert_eq!(
        strict.service.report_result(m.id, &score(1, 1), &p[0].0),
        Err(TournamentError::DrawNotAllowed)
    );

    let relaxed = flex(true);
    let p = relaxed.players(2);
    let m = relaxed
        .service
        .create_match(relaxed.id(), &input(&[&p[0].1], &[&p[1].1]), &p[0].0)
        .unwrap();
    let drawn = relaxed.service.report_result(m.id, &score(1, 1), &p[0].0).unwrap();
    assert_eq!(drawn.status, MatchStatus::Reported);
    assert_eq!(drawn.winner, None);
}

#[test]
fn bracket_matches_never_draw() {
    let fx = flex(true);
    let p = fx.players(2);
    let seeded: Vec<SeededEntrant> = p
        .iter()
        .map(|(_, participant)| SeededEntrant {
            id: participant.id,
            seed: None,
        })
        .collect();
    fx.service
        .generate_bracket(fx.id(), BracketKind::Single, &seeded, &fx.owner)
        .unwrap();
    let m = fx.service.matches(fx.id()).unwrap().remove(0);
    assert_eq!(
        fx.service.report_result(m.id, &score(2, 2), &p[0].0),
        Err(TournamentError::DrawNotAllowed)
    );
}

#[test]
fn negative_scores_are_rejected() {
    let fx = flex(false);
    let p = fx.players(2);
    let m = fx
        .service
        .create_match(fx.id(), &input(&[&p[0].1], &[&p[1].1]), &p[0].0)
        .unwrap();
    assert_eq!(
        fx.service.report_result(m.id, &score(-1, 3), &p[0].0),
        Err(TournamentError::InvalidScore)
    );
}

#[test]
fn only_match_players_report() {
    let fx = flex(false);
    let p = fx.players(3);
    let m = fx
        .service
        .create_match(fx.id(), &input(&[&p[0].1], &[&p[1].1]), &fx.owner)
        .unwrap();
    assert_eq!(
        fx.service.report_result(m.id, &score(2, 0), &p[2].0),
        Err(TournamentError::NotAParticipant)
    );
    // Managing the tournament is not standing in the match.
    assert_eq!(
        fx.service.report_result(m.id, &score(2, 0), &fx.owner),
        Err(TournamentError::NotAParticipant)
    );
}

#[test]
fn outsiders_cannot_create_matches_for_others() {
    let fx = flex(false);
    let p = fx.players(3);
    let result = fx
        .service
        .create_match(fx.id(), &input(&[&p[0].1], &[&p[1].1]), &p[2].0);
    assert_eq!(result, Err(TournamentError::NotAParticipant));
    let stranger = Actor::super_admin(uuid::Uuid::new_v4());
    assert!(fx
        .service
        .create_match(fx.id(), &input(&[&p[0].1], &[&p[1].1]), &stranger)
        .is_ok());
}

#[test]
fn three_of_four_confirmations_finalize_by_consensus() {
    let fx = flex(false);
    let p = fx.players(4);
    let m = fx
        .service
        .create_match(
            fx.id(),
            &input(&[&p[0].1, &p[1].1], &[&p[2].1, &p[3].1]),
            &p[0].0,
        )
        .unwrap();
    fx.service.report_result(m.id, &score(5, 3), &p[0].0).unwrap();

    let pending = fx.service.confirm_match(m.id, &p[1].0).unwrap();
    assert_eq!(pending.status, MatchStatus::PendingConfirmation);

    let done = fx.service.confirm_match(m.id, &p[2].0).unwrap();
    assert_eq!(done.status, MatchStatus::Finalized);
    assert_eq!(done.finalization_reason, Some(FinalizationReason::Consensus));
    assert!(done.finalized_at.is_some());

    for participant in fx.service.participants(fx.id()).unwrap() {
        assert_eq!(participant.matches_played, 1, "{}", participant.name);
    }
}

#[test]
fn half_the_roster_is_not_a_majority() {
    let fx = flex(false);
    let p = fx.players(4);
    let m = fx
        .service
        .create_match(
            fx.id(),
            &input(&[&p[0].1, &p[1].1], &[&p[2].1, &p[3].1]),
            &p[0].0,
        )
        .unwrap();
    fx.service.report_result(m.id, &score(5, 3), &p[0].0).unwrap();
    let m = fx.service.confirm_match(m.id, &p[2].0).unwrap();
    assert_eq!(m.status, MatchStatus::PendingConfirmation);
}

#[test]
fn one_side_alone_cannot_finalize() {
    let fx = flex(false);
    let p = fx.players(4);
    let m = fx
        .service
        .create_match(
            fx.id(),
            &input(&[&p[0].1, &p[1].1], &[&p[2].1, &p[3].1]),
            &p[0].0,
        )
        .unwrap();
    fx.service.report_result(m.id, &score(5, 3), &p[0].0).unwrap();
    let m = fx.service.confirm_match(m.id, &p[1].0).unwrap();
    assert_eq!(m.status, MatchStatus::PendingConfirmation);
}

#[test]
fn a_single_contest_disputes_the_match() {
    let fx = flex(false);
    let p = fx.players(4);
    let m = fx
        .service
        .create_match(
            fx.id(),
            &input(&[&p[0].1, &p[1].1], &[&p[2].1, &p[3].1]),
            &p[0].0,
        )
        .unwrap();
    fx.service.report_result(m.id, &score(5, 3), &p[0].0).unwrap();
    fx.service.confirm_match(m.id, &p[1].0).unwrap();

    let disputed = fx
        .service
        .contest_match(m.id, &contest("score was 4-5"), &p[3].0)
        .unwrap();
    assert_eq!(disputed.status, MatchStatus::Disputed);
    assert_eq!(
        fx.service.confirm_match(m.id, &p[2].0),
        Err(TournamentError::InvalidStatus(MatchStatus::Disputed))
    );

    let rows = fx.service.store().confirmations(m.id).unwrap();
    let contested: Vec<&MatchConfirmation> = rows.iter().filter(|c| c.is_contested()).collect();
    assert_eq!(contested.len(), 1);
    assert_eq!(contested[0].contest_reason.as_deref(), Some("score was 4-5"));
}

#[test]
fn contest_needs_a_pending_report() {
    let fx = flex(false);
    let p = fx.players(2);
    let m = fx
        .service
        .create_match(fx.id(), &input(&[&p[0].1], &[&p[1].1]), &p[0].0)
        .unwrap();
    assert_eq!(
        fx.service.contest_match(m.id, &contest("never played"), &p[1].0),
        Err(TournamentError::InvalidStatus(MatchStatus::Scheduled))
    );

    fx.service.report_result(m.id, &score(3, 0), &p[0].0).unwrap();
    fx.service.confirm_match(m.id, &p[1].0).unwrap();
    assert_eq!(
        fx.service.contest_match(m.id, &contest("too late"), &p[1].0),
        Err(TournamentError::AlreadyFinalized)
    );
}

#[test]
fn re_reporting_discards_earlier_verdicts() {
    let fx = flex(false);
    let p = fx.players(4);
    let m = fx
        .service
        .create_match(
            fx.id(),
            &input(&[&p[0].1, &p[1].1], &[&p[2].1, &p[3].1]),
            &p[0].0,
        )
        .unwrap();
    fx.service.report_result(m.id, &score(5, 3), &p[0].0).unwrap();
    fx.service.confirm_match(m.id, &p[1].0).unwrap();

    let again = fx.service.report_result(m.id, &score(3, 5), &p[2].0).unwrap();
    assert_eq!(again.status, MatchStatus::Reported);
    assert_eq!(again.winner, Some(tourney_engine::models::Side::B));
    let rows = fx.service.store().confirmations(m.id).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].participant_id, p[2].1.id);
}

#[test]
fn creating_with_a_score_starts_reported() {
    let fx = flex(false);
    let p = fx.players(2);
    let mut proposal = input(&[&p[0].1], &[&p[1].1]);
    proposal.score = Some(score(0, 2));
    let m = fx.service.create_match(fx.id(), &proposal, &p[1].0).unwrap();
    assert_eq!(m.status, MatchStatus::Reported);
    assert_eq!(m.winner, Some(tourney_engine::models::Side::B));
    assert!(m.confirmation_deadline.is_some());

    let done = fx.service.confirm_match(m.id, &p[0].0).unwrap();
    assert_eq!(done.status, MatchStatus::Finalized);
}

#[test]
fn explicit_finalization_rules() {
    let fx = flex(false);
    let p = fx.players(2);
    let m = fx
        .service
        .create_match(fx.id(), &input(&[&p[0].1], &[&p[1].1]), &p[0].0)
        .unwrap();

    assert_eq!(
        fx.service
            .finalize_match(m.id, FinalizationReason::Consensus, Some(&fx.owner)),
        Err(TournamentError::InvalidStatus(MatchStatus::Scheduled))
    );
    fx.service.report_result(m.id, &score(1, 0), &p[0].0).unwrap();
    assert_eq!(
        fx.service
            .finalize_match(m.id, FinalizationReason::AdminOverride, Some(&p[0].0)),
        Err(TournamentError::PermissionDenied)
    );

    let done = fx
        .service
        .finalize_match(m.id, FinalizationReason::AdminOverride, Some(&fx.owner))
        .unwrap();
    assert_eq!(done.finalization_reason, Some(FinalizationReason::AdminOverride));
    assert_eq!(
        fx.service
            .finalize_match(m.id, FinalizationReason::AdminOverride, None),
        Err(TournamentError::AlreadyFinalized)
    );
}

#[test]
fn disputes_are_settled_by_an_admin() {
    let fx = flex(false);
    let p = fx.players(2);
    let m = fx
        .service
        .create_match(fx.id(), &input(&[&p[0].1], &[&p[1].1]), &p[0].0)
        .unwrap();
    fx.service.report_result(m.id, &score(1, 0), &p[0].0).unwrap();
    fx.service
        .contest_match(m.id, &contest("wrong winner"), &p[1].0)
        .unwrap();
    let done = fx
        .service
        .finalize_match(m.id, FinalizationReason::AdminOverride, Some(&fx.owner))
        .unwrap();
    assert_eq!(done.status, MatchStatus::Finalized);
}

#[test]
fn sweep_finalizes_expired_reports_and_is_idempotent() {
    let fx = flex(false);
    let p = fx.players(4);
    let quiet = fx
        .service
        .create_match(fx.id(), &input(&[&p[0].1], &[&p[1].1]), &p[0].0)
        .unwrap();
    let contested = fx
        .service
        .create_match(fx.id(), &input(&[&p[2].1], &[&p[3].1]), &p[2].0)
        .unwrap();
    fx.service.report_result(quiet.id, &score(2, 1), &p[0].0).unwrap();
    fx.service
        .report_result(contested.id, &score(2, 1), &p[2].0)
        .unwrap();
    // A contestation that landed without the status change, as after a crash.
    fx.service
        .store()
        .upsert_confirmation(MatchConfirmation {
            match_id: contested.id,
            participant_id: p[3].1.id,
            is_confirmed: false,
            contest_reason: Some("no".to_string()),
            contest_proof: None,
            updated_at: Utc::now(),
        })
        .unwrap();

    let early = fx.service.auto_finalize_expired_matches_at(Utc::now()).unwrap();
    assert_eq!(early.total, 0);

    let later = Utc::now() + Duration::hours(73);
    let first = fx.service.auto_finalize_expired_matches_at(later).unwrap();
    assert_eq!(first.total, 2);
    assert_eq!(first.finalized, vec![quiet.id]);
    assert_eq!(first.disputed, vec![contested.id]);

    let quiet = fx.service.get_match(quiet.id).unwrap();
    assert_eq!(quiet.status, MatchStatus::Finalized);
    assert_eq!(quiet.finalization_reason, Some(FinalizationReason::Timeout));
    assert_eq!(
        fx.service.get_match(contested.id).unwrap().status,
        MatchStatus::Disputed
    );

    let second = fx.service.auto_finalize_expired_matches_at(later).unwrap();
    assert_eq!(second.total, 0);
    assert!(second.finalized.is_empty());
    assert!(second.disputed.is_empty());
}

#[test]
fn racing_confirmations_and_sweep_finalize_once() {
    for _ in 0..50 {
        let fx = flex(false);
        let p = fx.players(4);
        let m = fx
            .service
            .create_match(
                fx.id(),
                &input(&[&p[0].1, &p[1].1], &[&p[2].1, &p[3].1]),
                &p[0].0,
            )
            .unwrap();
        fx.service.report_result(m.id, &score(4, 2), &p[0].0).unwrap();

        let (service, id) = (&fx.service, m.id);
        let later = Utc::now() + Duration::hours(73);
        let (confirmed, swept) = std::thread::scope(|s| {
            let confirmers: Vec<_> = [&p[2].0, &p[3].0]
                .into_iter()
                .map(|actor| s.spawn(move || service.confirm_match(id, actor)))
                .collect();
            let sweeper = s.spawn(move || service.auto_finalize_expired_matches_at(later));
            let confirmed: Vec<_> = confirmers.into_iter().map(|h| h.join().unwrap()).collect();
            (confirmed, sweeper.join().unwrap().unwrap())
        });

        for result in confirmed {
            // The sweep may settle the match before a confirmer loads it.
            assert!(
                matches!(result, Ok(_) | Err(TournamentError::AlreadyFinalized)),
                "{result:?}"
            );
        }
        assert!(swept.finalized.len() <= 1);
        assert_eq!(
            fx.service.get_match(m.id).unwrap().status,
            MatchStatus::Finalized
        );
        for participant in fx.service.participants(fx.id()).unwrap() {
            assert_eq!(participant.matches_played, 1, "{}", participant.name);
        }
    }
}

#[test]
fn sweep_skips_a_broken_match_and_settles_the_rest() {
    let fx = flex(false);
    let p = fx.players(4);
    let mut reported = Vec::new();
    for pair in p.chunks(2) {
        let m = fx
            .service
            .create_match(fx.id(), &input(&[&pair[0].1], &[&pair[1].1]), &pair[0].0)
            .unwrap();
        fx.service.report_result(m.id, &score(1, 0), &pair[0].0).unwrap();
        reported.push(m.id);
    }
    // An expired report whose tournament is gone.
    let mut orphan = Match::new(Uuid::new_v4(), 0);
    orphan.score_a = Some(1);
    orphan.score_b = Some(0);
    orphan.status = MatchStatus::Reported;
    orphan.confirmation_deadline = Some(Utc::now());
    fx.service
        .store()
        .insert_match(orphan.clone(), Vec::new())
        .unwrap();

    let later = Utc::now() + Duration::hours(73);
    let report = fx.service.auto_finalize_expired_matches_at(later).unwrap();
    assert_eq!(report.total, 3);
    assert_eq!(report.finalized.len(), 2);
    for id in &reported {
        assert!(report.finalized.contains(id));
        assert_eq!(
            fx.service.get_match(*id).unwrap().status,
            MatchStatus::Finalized
        );
    }
    let untouched = fx.service.store().get_match(orphan.id).unwrap().unwrap();
    assert_eq!(untouched.status, MatchStatus::Reported);
}

#[test]
fn an_unrepresentable_deadline_fails_the_report() {
    let settings = LifecycleSettings {
        confirmation_window: Duration::try_days(365 * 1_000_000).unwrap(),
    };
    let fx = Fixture::with_settings(TeamMode::Flex, settings, |_| {});
    let p = fx.players(2);
    let m = fx
        .service
        .create_match(fx.id(), &input(&[&p[0].1], &[&p[1].1]), &p[0].0)
        .unwrap();
    assert!(matches!(
        fx.service.report_result(m.id, &score(1, 0), &p[0].0),
        Err(TournamentError::Internal(_))
    ));
    assert_eq!(
        fx.service.get_match(m.id).unwrap().status,
        MatchStatus::Scheduled
    );
}

#[test]
fn cancelled_matches_take_no_results() {
    let fx = flex(false);
    let p = fx.players(2);
    let m = fx
        .service
        .create_match(fx.id(), &input(&[&p[0].1], &[&p[1].1]), &p[0].0)
        .unwrap();
    assert_eq!(
        fx.service.cancel_match(m.id, &p[0].0),
        Err(TournamentError::PermissionDenied)
    );
    let cancelled = fx.service.cancel_match(m.id, &fx.owner).unwrap();
    assert_eq!(cancelled.status, MatchStatus::Cancelled);
    assert_eq!(
        fx.service.report_result(m.id, &score(1, 0), &p[0].0),
        Err(TournamentError::InvalidStatus(MatchStatus::Cancelled))
    );
}

#[test]
fn update_and_delete_are_for_managers_until_locked() {
    let fx = flex(false);
    let p = fx.players(3);
    let m = fx
        .service
        .create_match(fx.id(), &input(&[&p[0].1], &[&p[1].1]), &p[0].0)
        .unwrap();
    assert_eq!(
        fx.service.delete_match(m.id, &p[0].0),
        Err(TournamentError::PermissionDenied)
    );

    let mut edit = input(&[&p[0].1], &[&p[2].1]);
    edit.round = 2;
    let updated = fx.service.update_match(m.id, &edit, &fx.owner).unwrap();
    assert_eq!(updated.round, 2);
    let rows = fx.service.store().participations(m.id).unwrap();
    assert!(rows.iter().any(|r| r.participant_id == p[2].1.id));
    assert!(rows.iter().all(|r| r.participant_id != p[1].1.id));

    fx.service.report_result(m.id, &score(1, 0), &p[0].0).unwrap();
    fx.service.confirm_match(m.id, &p[2].0).unwrap();
    assert_eq!(
        fx.service.update_match(m.id, &edit, &fx.owner),
        Err(TournamentError::AlreadyConfirmed)
    );
    assert_eq!(
        fx.service.delete_match(m.id, &fx.owner),
        Err(TournamentError::CannotBeDeleted)
    );

    let scratch = fx
        .service
        .create_match(fx.id(), &input(&[&p[1].1], &[&p[2].1]), &fx.owner)
        .unwrap();
    fx.service.delete_match(scratch.id, &fx.owner).unwrap();
    assert_eq!(
        fx.service.get_match(scratch.id),
        Err(TournamentError::MatchNotFound(scratch.id))
    );
}

#[test]
fn players_hear_about_reports_and_finalization() {
    let fx = flex(false);
    let p = fx.players(2);
    let mut inbox = fx.registry.subscribe(p[1].0.user_id);
    let m = fx
        .service
        .create_match(fx.id(), &input(&[&p[0].1], &[&p[1].1]), &p[0].0)
        .unwrap();
    fx.service.report_result(m.id, &score(2, 1), &p[0].0).unwrap();
    assert_eq!(
        inbox.try_recv().unwrap(),
        MatchEvent::ResultReported {
            tournament_id: fx.id(),
            match_id: m.id,
        }
    );
    fx.service.confirm_match(m.id, &p[1].0).unwrap();
    assert_eq!(
        inbox.try_recv().unwrap(),
        MatchEvent::MatchFinalized {
            tournament_id: fx.id(),
            match_id: m.id,
            reason: FinalizationReason::Consensus,
        }
    );
    assert!(inbox.try_recv().is_err());
}
