//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use tourney_engine::{
    Actor, ChannelRegistry, LifecycleSettings, MemoryStore, Participant, Team, TeamMode,
    Tournament, TournamentService,
};
use uuid::Uuid;

pub struct Fixture {
    pub service: TournamentService<MemoryStore>,
    pub registry: Arc<ChannelRegistry>,
    pub owner: Actor,
    pub tournament: Tournament,
}

impl Fixture {
    /// A fresh tournament, tweaked by `configure` before it is stored.
    pub fn new(mode: TeamMode, configure: impl FnOnce(&mut Tournament)) -> Self {
        Self::with_settings(mode, LifecycleSettings::default(), configure)
    }

    pub fn with_settings(
        mode: TeamMode,
        settings: LifecycleSettings,
        configure: impl FnOnce(&mut Tournament),
    ) -> Self {
        let registry = Arc::new(ChannelRegistry::new());
        let service = TournamentService::new(MemoryStore::new(), registry.clone(), settings);
        let owner = Actor::user(Uuid::new_v4());
        let mut draft = Tournament::new("Spring Cup", owner.user_id, mode);
        configure(&mut draft);
        let tournament = service.create_tournament(draft, &owner).unwrap();
        Self {
            service,
            registry,
            owner,
            tournament,
        }
    }

    pub fn id(&self) -> Uuid {
        self.tournament.id
    }

    /// Register a new user under `name`.
    pub fn join(&self, name: &str) -> (Actor, Participant) {
        let actor = Actor::user(Uuid::new_v4());
        let participant = self
            .service
            .join_tournament(self.tournament.id, name, &actor)
            .unwrap();
        (actor, participant)
    }

    /// Register `n` players named `P0`, `P1`, ...
    pub fn players(&self, n: usize) -> Vec<(Actor, Participant)> {
        (0..n).map(|i| self.join(&format!("P{i}"))).collect()
    }

    /// Static mode: one team per group of players, named `T0`, `T1`, ...
    pub fn teams(&self, count: usize, size: usize) -> Vec<(Vec<Actor>, Team)> {
        (0..count)
            .map(|i| {
                let members: Vec<(Actor, Participant)> = (0..size)
                    .map(|j| self.join(&format!("T{i}P{j}")))
                    .collect();
                let team = self
                    .service
                    .create_team(
                        self.tournament.id,
                        &format!("T{i}"),
                        members.iter().map(|(_, p)| p.id).collect(),
                        &self.owner,
                    )
                    .unwrap();
                (members.into_iter().map(|(a, _)| a).collect(), team)
            })
            .collect()
    }
}
