//! Room state: roster, append-only conversation log and the active turn
//!
//! Rooms share nothing with each other. Each holds its own locks, so turns
//! in different rooms never contend.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::agents::{Agent, validate_roster};
use crate::error::{RosterError, TurnError};
use crate::types::Message;

/// Observable turn phase of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingResponders { queued: usize },
}

/// Ephemeral state of the turn in flight
#[derive(Debug, Default)]
struct TurnState {
    /// Set once responders are queued; a claimed room stays `Idle` until then
    awaiting: bool,
    queue: VecDeque<String>,
    thinking: BTreeSet<String>,
    last_error: Option<String>,
}

/// A discussion room
pub struct Room {
    id: String,
    name: String,
    agents: RwLock<Vec<Agent>>,
    log: RwLock<Vec<Message>>,
    last_activity: RwLock<DateTime<Utc>>,
    turn: Mutex<Option<TurnState>>,
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl Room {
    /// Create a room with a validated roster and an empty log
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        agents: Vec<Agent>,
    ) -> Result<Self, RosterError> {
        validate_roster(&agents)?;
        let room = Self {
            id: id.into(),
            name: name.into(),
            agents: RwLock::new(agents),
            log: RwLock::new(Vec::new()),
            last_activity: RwLock::new(Utc::now()),
            turn: Mutex::new(None),
        };
        info!("Created room '{}' ({})", room.name, room.id);
        Ok(room)
    }

    /// Seed the log with earlier messages, oldest first
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        if let Some(last) = history.last() {
            *self.last_activity.get_mut() = last.timestamp;
        }
        *self.log.get_mut() = history;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the current roster, in roster order
    pub async fn agents(&self) -> Vec<Agent> {
        self.agents.read().await.clone()
    }

    /// Replace the roster. Turns already in flight keep the roster they started with.
    pub async fn set_agents(&self, agents: Vec<Agent>) -> Result<(), RosterError> {
        validate_roster(&agents)?;
        let count = agents.len();
        *self.agents.write().await = agents;
        info!("Room '{}' roster updated ({} agents)", self.id, count);
        Ok(())
    }

    /// Snapshot of the conversation log
    pub async fn messages(&self) -> Vec<Message> {
        self.log.read().await.clone()
    }

    pub async fn message_count(&self) -> usize {
        self.log.read().await.len()
    }

    pub async fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.read().await
    }

    /// Append a complete message. The log is never edited in place.
    pub(crate) async fn append(&self, message: Message) {
        let timestamp = message.timestamp;
        let mut log = self.log.write().await;
        log.push(message);
        debug!("Room '{}' log now has {} messages", self.id, log.len());
        drop(log);
        *self.last_activity.write().await = timestamp;
    }

    pub fn phase(&self) -> TurnPhase {
        match self.turn_state().as_ref() {
            Some(state) if state.awaiting => TurnPhase::AwaitingResponders {
                queued: state.queue.len(),
            },
            _ => TurnPhase::Idle,
        }
    }

    /// Whether a turn has claimed the room, including before responders are known
    pub fn is_busy(&self) -> bool {
        self.turn_state().is_some()
    }

    /// Names of agents currently waiting on the backend
    pub fn thinking(&self) -> Vec<String> {
        self.turn_state()
            .as_ref()
            .map(|state| state.thinking.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Most recent failure notice of the turn in flight
    pub fn last_error(&self) -> Option<String> {
        self.turn_state()
            .as_ref()
            .and_then(|state| state.last_error.clone())
    }

    /// Claim the room for a new turn; fails if one is already running
    pub(crate) fn begin_turn(&self) -> Result<TurnGuard<'_>, TurnError> {
        let mut turn = self.turn_state();
        if turn.is_some() {
            return Err(TurnError::TurnInProgress {
                room_id: self.id.clone(),
            });
        }
        *turn = Some(TurnState::default());
        Ok(TurnGuard { room: self })
    }

    fn turn_state(&self) -> MutexGuard<'_, Option<TurnState>> {
        // Turn state stays consistent even if a holder panicked
        self.turn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exclusive handle on a room's turn. Dropping it returns the room to idle,
/// including when the turn future is dropped mid-call.
pub(crate) struct TurnGuard<'a> {
    room: &'a Room,
}

impl TurnGuard<'_> {
    fn with_state(&self, f: impl FnOnce(&mut TurnState)) {
        if let Some(state) = self.room.turn_state().as_mut() {
            f(state);
        }
    }

    pub(crate) fn enqueue(&self, names: impl IntoIterator<Item = String>) {
        self.with_state(|state| {
            state.awaiting = true;
            state.queue.extend(names);
        });
    }

    pub(crate) fn start_thinking(&self, name: &str) {
        self.with_state(|state| {
            state.thinking.insert(name.to_string());
        });
    }

    pub(crate) fn record_error(&self, notice: &str) {
        self.with_state(|state| state.last_error = Some(notice.to_string()));
    }

    /// Unmark the agent and drop it from the queue, whatever the outcome
    pub(crate) fn finish(&self, name: &str) {
        self.with_state(|state| {
            state.thinking.remove(name);
            if let Some(pos) = state.queue.iter().position(|queued| queued == name) {
                state.queue.remove(pos);
            }
        });
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        *self.room.turn_state() = None;
        debug!("Room '{}' back to idle", self.room.id);
    }
}
