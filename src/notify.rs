//! Fire-and-forget notifications for formed groups
//!
//! Dispatchers never block the caller and never report delivery failure;
//! what happens to an event after `dispatch` returns is out of our hands.

use crate::types::{GuildId, SquadId, UserId};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SquadEvent {
    /// A compatible group was found in the waiting pool
    GroupIdentified {
        guild_id: GuildId,
        user_ids: Vec<UserId>,
        average_similarity: f32,
    },
    /// A squad was created from a group
    SquadFormed {
        guild_id: GuildId,
        squad_id: SquadId,
        user_ids: Vec<UserId>,
    },
}

impl SquadEvent {
    pub fn user_ids(&self) -> &[UserId] {
        match self {
            SquadEvent::GroupIdentified { user_ids, .. }
            | SquadEvent::SquadFormed { user_ids, .. } => user_ids,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        match self {
            SquadEvent::GroupIdentified { guild_id, .. }
            | SquadEvent::SquadFormed { guild_id, .. } => *guild_id,
        }
    }
}

pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, event: SquadEvent);
}

/// Logs events and drops them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn dispatch(&self, event: SquadEvent) {
        match &event {
            SquadEvent::GroupIdentified {
                guild_id,
                user_ids,
                average_similarity,
            } => info!(
                guild = %guild_id,
                members = user_ids.len(),
                average_similarity,
                "compatible group identified"
            ),
            SquadEvent::SquadFormed {
                guild_id,
                squad_id,
                user_ids,
            } => info!(
                guild = %guild_id,
                squad = %squad_id,
                members = user_ids.len(),
                "squad formed, notifying members"
            ),
        }
    }
}

/// Queues events on a bounded channel for a consumer elsewhere.
///
/// A full queue or a dropped receiver drops the event with a warning.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: Sender<SquadEvent>,
}

impl ChannelDispatcher {
    /// Create a dispatcher and the receiving end of its queue
    pub fn new(capacity: usize) -> (Self, Receiver<SquadEvent>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (Self { sender }, receiver)
    }

    /// Unbounded variant, for tests and batch tools
    pub fn unbounded() -> (Self, Receiver<SquadEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }
}

impl NotificationDispatcher for ChannelDispatcher {
    fn dispatch(&self, event: SquadEvent) {
        let guild = event.guild_id();
        match self.sender.try_send(event) {
            Ok(()) => debug!(guild = %guild, "queued squad notification"),
            Err(TrySendError::Full(event)) => {
                warn!(guild = %guild, ?event, "notification queue full, event dropped")
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(guild = %guild, "no notification consumer, event dropped")
            }
        }
    }
}
