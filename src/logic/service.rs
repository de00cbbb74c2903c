//! Tournament service: the operations callers invoke, wired to a store and a
//! connection registry.

use crate::config::LifecycleSettings;
use crate::logic::bracket::{self, BracketEntrant, BracketKind, BracketMatch};
use crate::logic::lifecycle::{self, ContestInput, SweepReport};
use crate::logic::permissions::{self, Actor, Capabilities};
use crate::logic::persist::{persist_bracket, settle_byes};
use crate::logic::rules::{self, MatchInput, ScoreInput, ValidationReport};
use crate::logic::standings::{compute_standings, StandingsEntry, StandingsView};
use crate::models::{
    FinalizationReason, Match, MatchId, MatchStatus, Participant, ParticipantId, Team, TeamId,
    TeamMode, Tournament, TournamentError, TournamentId, TournamentStatus,
};
use crate::notify::{ConnectionRegistry, MatchEvent};
use crate::store::TournamentStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// One bracket entrant as requested: a team (static mode) or a participant (flex mode).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SeededEntrant {
    pub id: Uuid,
    #[serde(default)]
    pub seed: Option<u32>,
}

pub struct TournamentService<S> {
    store: S,
    registry: Arc<dyn ConnectionRegistry>,
    settings: LifecycleSettings,
}

impl<S: TournamentStore> TournamentService<S> {
    pub fn new(
        store: S,
        registry: Arc<dyn ConnectionRegistry>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    fn load(&self, id: TournamentId) -> Result<Tournament, TournamentError> {
        self.store
            .tournament(id)?
            .ok_or(TournamentError::TournamentNotFound(id))
    }

    /// The match and the tournament that owns it.
    fn load_match(&self, id: MatchId) -> Result<(Tournament, Match), TournamentError> {
        let m = self
            .store
            .get_match(id)?
            .ok_or(TournamentError::MatchNotFound(id))?;
        Ok((self.load(m.tournament_id)?, m))
    }

    fn capabilities(
        &self,
        tournament: &Tournament,
        actor: &Actor,
    ) -> Result<Capabilities, TournamentError> {
        let participants = self.store.participants(tournament.id)?;
        Ok(permissions::resolve(tournament, &participants, None, actor))
    }

    /// Deliver `event` to every player of the match. Delivery failures never fail
    /// the operation.
    fn notify(&self, m: &Match, event: MatchEvent) {
        let users = self.store.rosters(m).and_then(|rosters| {
            let members: HashSet<ParticipantId> = rosters.all().collect();
            Ok(self
                .store
                .participants(m.tournament_id)?
                .into_iter()
                .filter(|p| members.contains(&p.id))
                .map(|p| p.user_id)
                .collect::<Vec<_>>())
        });
        match users {
            Ok(users) => {
                let delivered: usize = users
                    .into_iter()
                    .map(|user| self.registry.publish(user, &event))
                    .sum();
                log::debug!("match {} event delivered on {delivered} channels", m.id);
            }
            Err(e) => log::warn!("could not notify players of match {}: {e}", m.id),
        }
    }

    fn notify_finalized(&self, m: &Match) {
        if let Some(reason) = m.finalization_reason {
            self.notify(
                m,
                MatchEvent::MatchFinalized {
                    tournament_id: m.tournament_id,
                    match_id: m.id,
                    reason,
                },
            );
        }
    }

    /// Store a new tournament owned by the actor.
    pub fn create_tournament(
        &self,
        mut tournament: Tournament,
        actor: &Actor,
    ) -> Result<Tournament, TournamentError> {
        if tournament.min_team_size == 0 || tournament.min_team_size > tournament.max_team_size {
            return Err(TournamentError::InvalidTeamSize {
                size: tournament.min_team_size,
                min: 1,
                max: tournament.max_team_size,
            });
        }
        tournament.owner_id = actor.user_id;
        tournament.status = TournamentStatus::Open;
        self.store.insert_tournament(tournament.clone())?;
        log::info!("tournament {} ({}) created", tournament.id, tournament.name);
        Ok(tournament)
    }

    pub fn tournament(&self, id: TournamentId) -> Result<Tournament, TournamentError> {
        self.load(id)
    }

    pub fn participants(&self, id: TournamentId) -> Result<Vec<Participant>, TournamentError> {
        self.load(id)?;
        Ok(self.store.participants(id)?)
    }

    pub fn matches(&self, id: TournamentId) -> Result<Vec<Match>, TournamentError> {
        self.load(id)?;
        Ok(self.store.matches(id, &[])?)
    }

    pub fn get_match(&self, id: MatchId) -> Result<Match, TournamentError> {
        Ok(self.load_match(id)?.1)
    }

    pub fn join_tournament(
        &self,
        tournament_id: TournamentId,
        name: &str,
        actor: &Actor,
    ) -> Result<Participant, TournamentError> {
        let tournament = self.load(tournament_id)?;
        if !tournament.is_open() {
            return Err(TournamentError::TournamentNotOpen);
        }
        let participant = Participant::new(tournament.id, actor.user_id, name);
        self.store.insert_participant(participant.clone())?;
        log::info!("{} joined tournament {}", participant.name, tournament.id);
        Ok(participant)
    }

    pub fn leave_tournament(
        &self,
        tournament_id: TournamentId,
        actor: &Actor,
    ) -> Result<(), TournamentError> {
        let tournament = self.load(tournament_id)?;
        if !tournament.is_open() {
            return Err(TournamentError::TournamentNotOpen);
        }
        let participant = self
            .capabilities(&tournament, actor)?
            .participant
            .ok_or(TournamentError::NotAParticipant)?;
        let removed = self.store.remove_participant(participant)?;
        log::info!("{} left tournament {}", removed.name, tournament.id);
        Ok(())
    }

    /// Static mode: register a team. Managers may build any team, a player only one
    /// they belong to.
    pub fn create_team(
        &self,
        tournament_id: TournamentId,
        name: &str,
        members: Vec<ParticipantId>,
        actor: &Actor,
    ) -> Result<Team, TournamentError> {
        let tournament = self.load(tournament_id)?;
        if !tournament.is_open() {
            return Err(TournamentError::TournamentNotOpen);
        }
        if tournament.team_mode != TeamMode::Static {
            return Err(TournamentError::InvalidTeams);
        }
        let caps = self.capabilities(&tournament, actor)?;
        let own = caps.participant.is_some_and(|p| members.contains(&p));
        if !caps.manage && !own {
            return Err(TournamentError::NotAParticipant);
        }

        let unique: HashSet<ParticipantId> = members.iter().copied().collect();
        if unique.len() != members.len() {
            return Err(TournamentError::InvalidPlayers);
        }
        if !tournament.team_size_allowed(members.len()) {
            return Err(TournamentError::InvalidTeamSize {
                size: members.len(),
                min: tournament.min_team_size,
                max: tournament.max_team_size,
            });
        }
        let participants: HashMap<ParticipantId, Participant> = self
            .store
            .participants(tournament.id)?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        for member in &members {
            match participants.get(member) {
                None => return Err(TournamentError::InvalidPlayers),
                Some(p) if p.team_id.is_some() => return Err(TournamentError::ParticipantLocked),
                Some(_) => {}
            }
        }

        let team = Team::new(tournament.id, name.trim(), members);
        self.store.insert_team(team.clone())?;
        log::info!("team {} created in tournament {}", team.name, tournament.id);
        Ok(team)
    }

    /// Build and commit an elimination bracket, settle its byes, and start the
    /// tournament. With no entrants given, every team (static) or participant (flex)
    /// enters in registration order.
    pub fn generate_bracket(
        &self,
        tournament_id: TournamentId,
        kind: BracketKind,
        entrants: &[SeededEntrant],
        actor: &Actor,
    ) -> Result<Vec<BracketMatch>, TournamentError> {
        let tournament = self.load(tournament_id)?;
        self.capabilities(&tournament, actor)?.require_manage()?;
        if !self.store.matches(tournament.id, &[])?.is_empty() {
            return Err(TournamentError::BracketAlreadyExists);
        }

        let (entrants, new_teams) = self.bracket_entrants(&tournament, entrants)?;
        let mut generated = bracket::generate(kind, &entrants)?;
        let now = Utc::now();
        let records = persist_bracket(&self.store, &tournament, &mut generated, new_teams, now)?;
        let settled = settle_byes(&self.store, &tournament, &records, now)?;
        if tournament.status == TournamentStatus::Open {
            self.store
                .set_tournament_status(tournament.id, TournamentStatus::Ongoing)?;
        }
        log::info!(
            "{kind:?} elimination bracket for tournament {}: {} matches, {} settled without play",
            tournament.id,
            generated.len(),
            settled.len()
        );
        Ok(generated)
    }

    /// Map requested entrants to bracket teams, synthesizing one-person teams in flex mode.
    fn bracket_entrants(
        &self,
        tournament: &Tournament,
        requested: &[SeededEntrant],
    ) -> Result<(Vec<BracketEntrant>, Vec<Team>), TournamentError> {
        match tournament.team_mode {
            TeamMode::Static => {
                let teams = self.store.teams(tournament.id)?;
                let requested = if requested.is_empty() {
                    teams
                        .iter()
                        .map(|t| SeededEntrant { id: t.id, seed: None })
                        .collect()
                } else {
                    requested.to_vec()
                };
                let known: HashSet<TeamId> = teams.iter().map(|t| t.id).collect();
                if requested.iter().any(|e| !known.contains(&e.id)) {
                    return Err(TournamentError::InvalidTeams);
                }
                let entrants = requested
                    .iter()
                    .map(|e| BracketEntrant {
                        team_id: e.id,
                        seed: e.seed,
                    })
                    .collect();
                Ok((entrants, Vec::new()))
            }
            TeamMode::Flex => {
                let participants = self.store.participants(tournament.id)?;
                let requested = if requested.is_empty() {
                    participants
                        .iter()
                        .map(|p| SeededEntrant { id: p.id, seed: None })
                        .collect()
                } else {
                    requested.to_vec()
                };
                let by_id: HashMap<ParticipantId, &Participant> =
                    participants.iter().map(|p| (p.id, p)).collect();
                let mut teams: HashMap<ParticipantId, Team> = HashMap::new();
                let mut order = Vec::new();
                let mut entrants = Vec::with_capacity(requested.len());
                for e in &requested {
                    let participant = by_id.get(&e.id).ok_or(TournamentError::InvalidPlayers)?;
                    let team = teams.entry(e.id).or_insert_with(|| {
                        order.push(e.id);
                        Team::new(tournament.id, participant.name.clone(), vec![e.id])
                    });
                    entrants.push(BracketEntrant {
                        team_id: team.id,
                        seed: e.seed,
                    });
                }
                let new_teams = order.iter().filter_map(|id| teams.remove(id)).collect();
                Ok((entrants, new_teams))
            }
        }
    }

    pub fn create_match(
        &self,
        tournament_id: TournamentId,
        input: &MatchInput,
        actor: &Actor,
    ) -> Result<Match, TournamentError> {
        let tournament = self.load(tournament_id)?;
        let m = lifecycle::create_match(
            &self.store,
            &tournament,
            input,
            actor,
            &self.settings,
            Utc::now(),
        )?;
        if m.status == MatchStatus::Reported {
            self.notify(
                &m,
                MatchEvent::ResultReported {
                    tournament_id: m.tournament_id,
                    match_id: m.id,
                },
            );
        }
        Ok(m)
    }

    pub fn report_result(
        &self,
        match_id: MatchId,
        score: &ScoreInput,
        actor: &Actor,
    ) -> Result<Match, TournamentError> {
        let (tournament, _) = self.load_match(match_id)?;
        let m = lifecycle::report_result(
            &self.store,
            &tournament,
            match_id,
            score,
            actor,
            &self.settings,
            Utc::now(),
        )?;
        self.notify(
            &m,
            MatchEvent::ResultReported {
                tournament_id: m.tournament_id,
                match_id: m.id,
            },
        );
        Ok(m)
    }

    pub fn confirm_match(
        &self,
        match_id: MatchId,
        actor: &Actor,
    ) -> Result<Match, TournamentError> {
        let (tournament, _) = self.load_match(match_id)?;
        let m = lifecycle::confirm_match(&self.store, &tournament, match_id, actor, Utc::now())?;
        if m.status == MatchStatus::Finalized {
            self.notify_finalized(&m);
        }
        Ok(m)
    }

    pub fn contest_match(
        &self,
        match_id: MatchId,
        contest: &ContestInput,
        actor: &Actor,
    ) -> Result<Match, TournamentError> {
        let (tournament, _) = self.load_match(match_id)?;
        let m = lifecycle::contest_match(
            &self.store,
            &tournament,
            match_id,
            contest,
            actor,
            Utc::now(),
        )?;
        self.notify(
            &m,
            MatchEvent::MatchContested {
                tournament_id: m.tournament_id,
                match_id: m.id,
            },
        );
        Ok(m)
    }

    /// `actor` is `None` for system-triggered finalization.
    pub fn finalize_match(
        &self,
        match_id: MatchId,
        reason: FinalizationReason,
        actor: Option<&Actor>,
    ) -> Result<Match, TournamentError> {
        let (tournament, _) = self.load_match(match_id)?;
        let m = lifecycle::finalize_match(
            &self.store,
            &tournament,
            match_id,
            reason,
            actor,
            Utc::now(),
        )?;
        self.notify_finalized(&m);
        Ok(m)
    }

    pub fn cancel_match(
        &self,
        match_id: MatchId,
        actor: &Actor,
    ) -> Result<Match, TournamentError> {
        let (tournament, _) = self.load_match(match_id)?;
        let m = lifecycle::cancel_match(&self.store, &tournament, match_id, actor)?;
        self.notify(
            &m,
            MatchEvent::StatusChanged {
                tournament_id: m.tournament_id,
                match_id: m.id,
                status: m.status,
            },
        );
        Ok(m)
    }

    pub fn update_match(
        &self,
        match_id: MatchId,
        input: &MatchInput,
        actor: &Actor,
    ) -> Result<Match, TournamentError> {
        let (tournament, _) = self.load_match(match_id)?;
        lifecycle::update_match(&self.store, &tournament, match_id, input, actor)
    }

    pub fn delete_match(&self, match_id: MatchId, actor: &Actor) -> Result<(), TournamentError> {
        let (tournament, _) = self.load_match(match_id)?;
        lifecycle::delete_match(&self.store, &tournament, match_id, actor)
    }

    /// Non-mutating pre-flight of a proposed match.
    pub fn validate_match(
        &self,
        tournament_id: TournamentId,
        input: &MatchInput,
    ) -> Result<ValidationReport, TournamentError> {
        let tournament = self.load(tournament_id)?;
        let participants = self.store.participants(tournament.id)?;
        let teams = self.store.teams(tournament.id)?;
        Ok(rules::validate_match(
            &self.store,
            &tournament,
            &participants,
            &teams,
            input,
        )?)
    }

    /// Periodic sweep entry point.
    pub fn auto_finalize_expired_matches(&self) -> Result<SweepReport, TournamentError> {
        self.auto_finalize_expired_matches_at(Utc::now())
    }

    pub fn auto_finalize_expired_matches_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, TournamentError> {
        let report = lifecycle::auto_finalize_expired(&self.store, now)?;
        for id in &report.finalized {
            match self.store.get_match(*id) {
                Ok(Some(m)) => self.notify_finalized(&m),
                Ok(None) => {}
                Err(e) => log::warn!("could not reload swept match {id}: {e}"),
            }
        }
        Ok(report)
    }

    pub fn standings(
        &self,
        tournament_id: TournamentId,
        view: StandingsView,
    ) -> Result<Vec<StandingsEntry>, TournamentError> {
        let tournament = self.load(tournament_id)?;
        let entrants: Vec<(Uuid, String)> = match tournament.team_mode {
            TeamMode::Static => self
                .store
                .teams(tournament.id)?
                .into_iter()
                .map(|t| (t.id, t.name))
                .collect(),
            TeamMode::Flex => self
                .store
                .participants(tournament.id)?
                .into_iter()
                .map(|p| (p.id, p.name))
                .collect(),
        };
        let matches = self.store.matches(tournament.id, view.statuses())?;
        let participations = match tournament.team_mode {
            TeamMode::Flex => self.store.tournament_participations(tournament.id)?,
            TeamMode::Static => Vec::new(),
        };
        Ok(compute_standings(
            &tournament,
            &entrants,
            &matches,
            &participations,
            view,
        ))
    }

    pub fn official_standings(
        &self,
        tournament_id: TournamentId,
    ) -> Result<Vec<StandingsEntry>, TournamentError> {
        self.standings(tournament_id, StandingsView::Official)
    }

    pub fn provisional_standings(
        &self,
        tournament_id: TournamentId,
    ) -> Result<Vec<StandingsEntry>, TournamentError> {
        self.standings(tournament_id, StandingsView::Provisional)
    }
}
