//! Connection registry: fan-out of match events to live user channels.

use crate::models::{FinalizationReason, MatchId, MatchStatus, TournamentId, UserId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Something a match participant should hear about.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEvent {
    ResultReported {
        tournament_id: TournamentId,
        match_id: MatchId,
    },
    MatchContested {
        tournament_id: TournamentId,
        match_id: MatchId,
    },
    MatchFinalized {
        tournament_id: TournamentId,
        match_id: MatchId,
        reason: FinalizationReason,
    },
    StatusChanged {
        tournament_id: TournamentId,
        match_id: MatchId,
        status: MatchStatus,
    },
}

/// userId → set of live channels.
pub trait ConnectionRegistry: Send + Sync {
    /// Deliver to every live channel of the user. Returns how many received it.
    fn publish(&self, user_id: UserId, event: &MatchEvent) -> usize;
}

/// Registry backed by unbounded tokio channels. Closed channels are dropped on publish.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<UserId, Vec<UnboundedSender<MatchEvent>>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new channel for the user.
    pub fn subscribe(&self, user_id: UserId) -> UnboundedReceiver<MatchEvent> {
        let (tx, rx) = unbounded_channel();
        match self.channels.write() {
            Ok(mut g) => g.entry(user_id).or_default().push(tx),
            Err(_) => log::error!("connection registry lock poisoned, dropping subscription"),
        }
        rx
    }

    pub fn connections(&self, user_id: UserId) -> usize {
        self.channels
            .read()
            .map(|g| g.get(&user_id).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl ConnectionRegistry for ChannelRegistry {
    fn publish(&self, user_id: UserId, event: &MatchEvent) -> usize {
        let Ok(mut g) = self.channels.write() else {
            log::error!("connection registry lock poisoned");
            return 0;
        };
        let Some(senders) = g.get_mut(&user_id) else {
            return 0;
        };
        senders.retain(|tx| tx.send(event.clone()).is_ok());
        let delivered = senders.len();
        if senders.is_empty() {
            g.remove(&user_id);
        }
        delivered
    }
}
