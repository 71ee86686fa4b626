//! Per-game fan-out of state updates to observers.
//!
//! Each observer owns a bounded channel. Broadcasting never waits on an
//! observer: if its buffer is full the update is dropped for that observer
//! only. Observers must tolerate gaps and treat an update carrying a
//! terminal status as final.

use crate::game::GameSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::debug;

/// Buffer size of an observer channel when none is configured
pub const DEFAULT_OBSERVER_BUFFER: usize = 10;

/// Identifies one observer within the hub
pub type ObserverId = u64;

/// A state change pushed to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameUpdate {
    pub game: GameSnapshot,
    pub message: String,
}

impl GameUpdate {
    pub fn new(game: GameSnapshot, message: impl Into<String>) -> Self {
        Self {
            game,
            message: message.into(),
        }
    }

    /// True when no further updates can follow this one
    pub fn is_final(&self) -> bool {
        self.game.status.is_finished()
    }
}

/// Receiving side of a subscription.
///
/// Once unsubscribed, buffered updates can still be drained, after which
/// `recv` returns `None`.
#[derive(Debug)]
pub struct Observer {
    id: ObserverId,
    game_id: String,
    receiver: mpsc::Receiver<GameUpdate>,
}

impl Observer {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Wait for the next update; `None` once the subscription is closed
    pub async fn recv(&mut self) -> Option<GameUpdate> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<GameUpdate, TryRecvError> {
        self.receiver.try_recv()
    }
}

type ObserverSet = HashMap<ObserverId, mpsc::Sender<GameUpdate>>;

/// Registry of observers keyed by game id
#[derive(Debug)]
pub struct UpdateHub {
    buffer: usize,
    next_id: AtomicU64,
    observers: RwLock<HashMap<String, ObserverSet>>,
}

impl UpdateHub {
    /// Create a hub whose observer channels hold `buffer` pending updates
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            next_id: AtomicU64::new(1),
            observers: RwLock::new(HashMap::new()),
        }
    }

    /// Start observing `game_id`
    pub fn subscribe(&self, game_id: &str) -> Observer {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.write()
            .entry(game_id.to_string())
            .or_default()
            .insert(id, sender);

        debug!(game_id, observer_id = id, "Observer subscribed");
        Observer {
            id,
            game_id: game_id.to_string(),
            receiver,
        }
    }

    /// Stop delivering to an observer and close its channel.
    ///
    /// Returns false if the observer was not registered.
    pub fn unsubscribe(&self, game_id: &str, observer_id: ObserverId) -> bool {
        let mut observers = self.write();
        let Some(set) = observers.get_mut(game_id) else {
            return false;
        };

        // Dropping the only sender closes the channel
        let removed = set.remove(&observer_id).is_some();
        if set.is_empty() {
            observers.remove(game_id);
        }

        if removed {
            debug!(game_id, observer_id, "Observer unsubscribed");
        }
        removed
    }

    /// Offer `update` to every observer of `game_id` without blocking.
    ///
    /// Returns the number of observers that accepted it.
    pub fn broadcast(&self, game_id: &str, update: &GameUpdate) -> usize {
        let observers = self.read();
        let Some(set) = observers.get(game_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (&observer_id, sender) in set {
            match sender.try_send(update.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(game_id, observer_id, "Observer buffer full, update dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(game_id, observer_id, "Observer gone, update dropped");
                }
            }
        }
        delivered
    }

    /// Number of observers currently registered for `game_id`
    pub fn observer_count(&self, game_id: &str) -> usize {
        self.read().get(game_id).map_or(0, HashMap::len)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ObserverSet>> {
        self.observers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ObserverSet>> {
        self.observers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for UpdateHub {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVER_BUFFER)
    }
}
